use crate::engine::EngineError;
use crate::tools::ToolError;
use thiserror::Error;

/// Why a decode failed, used to pick the loader's fallback path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeFailure {
    /// The bytes are not in the format the identifier claimed.
    Format,
    /// The decoded sample buffer would not fit the configured budget.
    Memory,
    /// The format was recognized but the pixel data could not be read.
    Corrupt,
}

/// Errors that can reach the host of a viewport.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ViewerError {
    #[error("viewer initialization failed: {0}")]
    Initialization(String),

    #[error("image load aborted")]
    Aborted,

    #[error("failed to decode image ({kind:?}): {message}")]
    Decode { kind: DecodeFailure, message: String },

    #[error("failed to fetch image: {0}")]
    Fetch(String),

    #[error("tool activation failed: {0}")]
    ToolActivation(String),

    #[error("rendering engine error: {0}")]
    Engine(String),
}

impl ViewerError {
    pub fn is_aborted(&self) -> bool {
        matches!(self, ViewerError::Aborted)
    }
}

impl From<EngineError> for ViewerError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Format(message) => ViewerError::Decode {
                kind: DecodeFailure::Format,
                message,
            },
            EngineError::Memory(message) => ViewerError::Decode {
                kind: DecodeFailure::Memory,
                message,
            },
            EngineError::Decode(message) => ViewerError::Decode {
                kind: DecodeFailure::Corrupt,
                message,
            },
            EngineError::Fetch(message) => ViewerError::Fetch(message),
            EngineError::Environment(message) | EngineError::DependencyUnavailable(message) => {
                ViewerError::Initialization(message)
            }
            other => ViewerError::Engine(other.to_string()),
        }
    }
}

impl From<ToolError> for ViewerError {
    fn from(err: ToolError) -> Self {
        ViewerError::ToolActivation(err.to_string())
    }
}
