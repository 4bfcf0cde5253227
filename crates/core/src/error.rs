/// Result alias that carries the custom [`KaraokeError`] type.
pub type Result<T> = std::result::Result<T, KaraokeError>;

/// Common error type for the core crate.
///
/// Degraded-but-usable situations (a backing track that failed to decode, a
/// denied microphone, nothing to mix) are not errors; the session reports
/// them as status values instead.
#[derive(Debug, thiserror::Error)]
pub enum KaraokeError {
    /// Free-form message, mostly used by the command line host.
    #[error("{0}")]
    Message(String),
    /// An argument violated a documented precondition.
    #[error("invalid input: {0}")]
    InvalidInput(&'static str),
    /// WAV bytes could not be read back.
    #[error("malformed WAV data: {0}")]
    Wav(&'static str),
    /// The live audio host refused to open or run a stream.
    #[error("audio device: {0}")]
    Device(String),
    /// Wrapper around standard IO errors.
    #[error("{0}")]
    Io(#[from] std::io::Error),
    /// Settings file (de)serialization failure.
    #[error("{0}")]
    Json(#[from] serde_json::Error),
}

impl KaraokeError {
    /// Creates a new error that simply wraps the provided message.
    pub fn msg<T: Into<String>>(msg: T) -> Self {
        Self::Message(msg.into())
    }
}

impl From<&str> for KaraokeError {
    fn from(value: &str) -> Self {
        Self::msg(value)
    }
}

impl From<String> for KaraokeError {
    fn from(value: String) -> Self {
        Self::Message(value)
    }
}
