//! # Debloat Bridge
//!
//! Root managers (KernelSU, APatch, MMRL, ...) inject an `exec` function into
//! the WebUI's global scope, each with its own calling convention and result
//! shape. This crate hides all of that behind one operation:
//! `execute(command) -> stdout`, failing uniformly.
//!
//! - `host`: the global scope the host attaches to, plus named callbacks
//! - `adapter`: direct / Node-callback / named-callback conventions
//! - `normalize`: any result shape → `{stdout, stderr, exit_code}`
//! - `bridge`: discovery, caching and the `CommandRunner` impl

use async_trait::async_trait;

pub mod adapter;
pub mod bridge;
pub mod error;
pub mod host;
pub mod normalize;
pub mod observer;

pub use adapter::{Convention, HostAdapter};
pub use bridge::{Bridge, DiscoveryConfig, GlobalBridge, NAMESPACES};
pub use error::{BridgeError, HostError};
pub use host::{ExecCallback, HostCall, HostExec, HostGlobals, HostValue};
pub use normalize::{CommandOutput, normalize};
pub use observer::CommandObserver;

/// Anything that can run a shell command for the editor.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Whether a call would reach a host right now.
    fn is_available(&self) -> bool;

    /// Run a command and return the normalized result, whatever its exit code.
    async fn run(&self, command: &str) -> Result<CommandOutput, BridgeError>;

    /// Run a command and return its stdout; a non-zero exit code is an error.
    async fn execute(&self, command: &str) -> Result<String, BridgeError> {
        self.run(command).await?.into_stdout()
    }
}
