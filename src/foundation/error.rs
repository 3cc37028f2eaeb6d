/// Convenience result type used across monoframe.
pub type MonoframeResult<T> = Result<T, MonoframeError>;

/// Top-level error taxonomy used by the dithering engine and its collaborators.
#[derive(thiserror::Error, Debug)]
pub enum MonoframeError {
    /// Caller-correctable input (bad scale, out-of-range parameter, mismatched geometry).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A source could not be read or recognized.
    #[error("decode error: {0}")]
    Decode(String),

    /// An output artifact could not be written.
    #[error("encode error: {0}")]
    Encode(String),

    /// Temporary storage or another local resource was unavailable.
    #[error("resource error: {0}")]
    Resource(String),

    /// The run was abandoned between frames.
    #[error("cancelled")]
    Cancelled,

    /// Wrapped lower-level error from dependencies or IO.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl MonoframeError {
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode(msg.into())
    }

    pub fn encode(msg: impl Into<String>) -> Self {
        Self::Encode(msg.into())
    }

    pub fn resource(msg: impl Into<String>) -> Self {
        Self::Resource(msg.into())
    }
}
