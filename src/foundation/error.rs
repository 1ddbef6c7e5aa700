/// Convenience result type used across panostitch.
pub type StitchResult<T> = Result<T, StitchError>;

/// Top-level error taxonomy used by engine APIs.
///
/// Transient per-cycle conditions (an incomplete frame set, an input reaching end of stream) are
/// not errors; see [`crate::Cycle`].
#[derive(thiserror::Error, Debug)]
pub enum StitchError {
    /// A template stream failed structural validation.
    #[error("malformed template: {0}")]
    MalformedTemplate(String),

    /// A frame or buffer does not match the size the configuration expects.
    #[error("size mismatch: {0}")]
    SizeMismatch(String),

    /// A frame or working buffer could not be allocated.
    #[error("resource exhaustion: {0}")]
    ResourceExhaustion(String),

    /// Invalid configuration values.
    #[error("validation error: {0}")]
    Validation(String),

    /// Submit/retrieve protocol misuse or a dead pipeline worker.
    #[error("pipeline error: {0}")]
    Pipeline(String),

    /// IO failure while reading or writing a stream.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Wrapped lower-level error from dependencies.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl StitchError {
    /// Build a [`StitchError::MalformedTemplate`] value.
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedTemplate(msg.into())
    }

    /// Build a [`StitchError::SizeMismatch`] value.
    pub fn size_mismatch(msg: impl Into<String>) -> Self {
        Self::SizeMismatch(msg.into())
    }

    /// Build a [`StitchError::ResourceExhaustion`] value.
    pub fn exhausted(msg: impl Into<String>) -> Self {
        Self::ResourceExhaustion(msg.into())
    }

    /// Build a [`StitchError::Validation`] value.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Build a [`StitchError::Pipeline`] value.
    pub fn pipeline(msg: impl Into<String>) -> Self {
        Self::Pipeline(msg.into())
    }

    /// `true` for failures the host may retry after backing off.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ResourceExhaustion(_))
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/error.rs"]
mod tests;
