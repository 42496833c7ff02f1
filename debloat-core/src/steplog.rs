use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use debloat_bridge::{BridgeError, CommandObserver, CommandOutput};
use tracing::debug;

pub const DEFAULT_CAPACITY: usize = 50;

// Save commands carry the whole document as base64.
const COMMAND_PREVIEW: usize = 160;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    pub command: String,
    /// `None` when the bridge never produced an exit code.
    pub exit_code: Option<i32>,
    pub error: Option<String>,
    pub elapsed: Duration,
}

impl Step {
    pub fn succeeded(&self) -> bool {
        self.error.is_none() && self.exit_code == Some(0)
    }
}

/// Bounded ring of the most recent bridge calls, for the diagnostics panel.
#[derive(Debug)]
pub struct StepLog {
    capacity: usize,
    steps: Mutex<VecDeque<Step>>,
}

impl Default for StepLog {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl StepLog {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            steps: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    /// Oldest first.
    pub fn steps(&self) -> Vec<Step> {
        self.lock().iter().cloned().collect()
    }

    pub fn last(&self) -> Option<Step> {
        self.lock().back().cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn record(&self, step: Step) {
        let mut steps = self.lock();
        if steps.len() == self.capacity {
            steps.pop_front();
        }
        steps.push_back(step);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<Step>> {
        self.steps.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl CommandObserver for StepLog {
    fn on_finish(
        &self,
        command: &str,
        outcome: &Result<CommandOutput, BridgeError>,
        elapsed: Duration,
    ) {
        let (exit_code, error) = match outcome {
            Ok(output) => (Some(output.exit_code), None),
            Err(BridgeError::CommandFailed { exit_code, message }) => {
                (Some(*exit_code), Some(message.clone()))
            }
            Err(err) => (None, Some(err.to_string())),
        };
        debug!(exit_code, elapsed_ms = elapsed.as_millis() as u64, "step recorded");
        self.record(Step {
            command: preview_command(command),
            exit_code,
            error,
            elapsed,
        });
    }
}

fn preview_command(command: &str) -> String {
    match command.char_indices().nth(COMMAND_PREVIEW) {
        Some((cut, _)) => format!("{}...", &command[..cut]),
        None => command.to_string(),
    }
}
