//! Protocol error types.

/// Errors raised while reading or writing frames.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Frame exceeds the maximum line length")]
    FrameTooLong,

    #[error("Connection closed by peer")]
    Closed,

    #[error("Unexpected frame: expected {expected}, got {got}")]
    UnexpectedFrame { expected: String, got: String },

    #[error("Malformed payload: {0}")]
    Malformed(String),
}

impl From<tokio_util::codec::LinesCodecError> for ProtocolError {
    fn from(e: tokio_util::codec::LinesCodecError) -> Self {
        match e {
            tokio_util::codec::LinesCodecError::MaxLineLengthExceeded => Self::FrameTooLong,
            tokio_util::codec::LinesCodecError::Io(io) => Self::Io(io),
        }
    }
}

impl From<serde_json::Error> for ProtocolError {
    fn from(e: serde_json::Error) -> Self {
        Self::Malformed(e.to_string())
    }
}

impl ProtocolError {
    /// Whether the underlying stream is unusable after this error.
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::Io(_) | Self::Closed | Self::FrameTooLong)
    }
}
