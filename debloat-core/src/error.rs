use debloat_bridge::BridgeError;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EditorError {
    #[error("no root manager exec API found")]
    BridgeUnavailable,

    #[error("command failed: {message}")]
    CommandFailed {
        exit_code: Option<i32>,
        message: String,
    },

    #[error("fetch failed: {message}")]
    FetchFailed { status: Option<u16>, message: String },

    #[error("no groups found in document: {preview}")]
    ParseEmpty { preview: String },

    #[error("no document loaded")]
    NothingLoaded,

    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    #[error("invalid config: {0}")]
    Config(String),
}

impl From<BridgeError> for EditorError {
    fn from(err: BridgeError) -> Self {
        match err {
            BridgeError::Unavailable => EditorError::BridgeUnavailable,
            BridgeError::CommandFailed { exit_code, message } => EditorError::CommandFailed {
                exit_code: Some(exit_code),
                message,
            },
            BridgeError::Host(message) => EditorError::CommandFailed {
                exit_code: None,
                message,
            },
        }
    }
}
