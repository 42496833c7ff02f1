use std::time::Duration;

use crate::error::BridgeError;
use crate::normalize::CommandOutput;

/// Step logger hook: sees every command the bridge is asked to run.
pub trait CommandObserver: Send + Sync {
    fn on_start(&self, command: &str) {
        let _ = command;
    }

    fn on_finish(
        &self,
        command: &str,
        outcome: &Result<CommandOutput, BridgeError>,
        elapsed: Duration,
    ) {
        let _ = (command, outcome, elapsed);
    }
}
