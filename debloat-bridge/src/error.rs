use thiserror::Error;

/// What a host `exec` can do wrong at the call site.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum HostError {
    /// The host function threw.
    #[error("{0}")]
    Thrown(String),
    /// The host does not speak this calling convention.
    #[error("calling convention not supported by host")]
    Unsupported,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BridgeError {
    /// No host exec API was discovered.
    #[error("no root manager exec API available")]
    Unavailable,

    /// The command ran and exited non-zero.
    #[error("{message}")]
    CommandFailed { exit_code: i32, message: String },

    /// The host failed before producing a result.
    #[error("host exec error: {0}")]
    Host(String),
}

impl BridgeError {
    /// Failure carrying stderr, or `exit <code>` when stderr is empty.
    pub fn command_failed(exit_code: i32, stderr: &str) -> Self {
        let stderr = stderr.trim();
        let message = if stderr.is_empty() {
            format!("exit {exit_code}")
        } else {
            stderr.to_string()
        };
        Self::CommandFailed { exit_code, message }
    }
}

impl From<HostError> for BridgeError {
    fn from(err: HostError) -> Self {
        Self::Host(err.to_string())
    }
}
