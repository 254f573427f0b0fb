/// Convenience result type used across Layercast.
pub type LayercastResult<T> = Result<T, LayercastError>;

/// Top-level error taxonomy used by compositor, recorder and capture APIs.
#[derive(thiserror::Error, Debug)]
pub enum LayercastError {
    /// Fatal setup defect: degenerate projection, malformed region, shader
    /// compile/link failure or an incomplete framebuffer.
    #[error("configuration error: {0}")]
    Config(String),

    /// Recoverable recording lifecycle failure.
    #[error("recording error: {0}")]
    Recording(#[from] RecordingError),

    /// Encoder-side failure (spawn, append, finalize).
    #[error("encode error: {0}")]
    Encode(String),

    /// Pixel readback or still-image capture failure.
    #[error("capture error: {0}")]
    Capture(String),

    /// Bitmap decode or rasterization failure.
    #[error("asset error: {0}")]
    Asset(String),

    /// Errors when serializing or deserializing configuration.
    #[error("serialization error: {0}")]
    Serde(String),

    /// Wrapped lower-level error from dependencies or IO.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl LayercastError {
    /// Build a [`LayercastError::Config`] value.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Build a [`LayercastError::Encode`] value.
    pub fn encode(msg: impl Into<String>) -> Self {
        Self::Encode(msg.into())
    }

    /// Build a [`LayercastError::Capture`] value.
    pub fn capture(msg: impl Into<String>) -> Self {
        Self::Capture(msg.into())
    }

    /// Build a [`LayercastError::Asset`] value.
    pub fn asset(msg: impl Into<String>) -> Self {
        Self::Asset(msg.into())
    }

    /// Build a [`LayercastError::Serde`] value.
    pub fn serde(msg: impl Into<String>) -> Self {
        Self::Serde(msg.into())
    }

    /// True for the fatal configuration class of errors.
    pub fn is_config(&self) -> bool {
        matches!(self, Self::Config(_))
    }
}

/// Reasons a recording start/stop request is refused.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum RecordingError {
    /// `start` while a session is already recording.
    #[error("a recording session is already active")]
    AlreadyRecording,
    /// `start` while the previous session is still finalizing.
    #[error("the previous recording session is still draining")]
    Busy,
    /// `start` before any surface size was configured.
    #[error("recording size is not configured")]
    NotConfigured,
    /// `stop` without an active session.
    #[error("no recording session is active")]
    NotRecording,
    /// The output container could not be prepared.
    #[error("output unavailable: {0}")]
    Output(String),
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/error.rs"]
mod tests;
