/// Result alias that carries the custom [`Ilda2WavError`] type.
pub type Result<T> = std::result::Result<T, Ilda2WavError>;

/// Common error type for the core crate.
#[derive(Debug, thiserror::Error)]
pub enum Ilda2WavError {
    /// The animation stream is not valid ILDA: wrong magic, unknown table
    /// type or a record cut short by the end of the stream.
    #[error("corrupt input: {0}")]
    CorruptInput(String),
    /// The channel mapping string could not be parsed. Carries the whole
    /// offending string.
    #[error("malformed channel descriptor `{0}`")]
    MalformedDescriptor(String),
    /// Conversion parameters that cannot produce audio.
    #[error("invalid conversion request: {0}")]
    InvalidRequest(String),
    /// Configuration file could not be read or failed validation.
    #[error("configuration error: {0}")]
    Config(String),
    /// Wrapper around standard IO errors.
    #[error("{0}")]
    Io(#[from] std::io::Error),
    /// Free-form error for failures outside the taxonomy above.
    #[error("{0}")]
    Message(String),
}

impl Ilda2WavError {
    /// Creates a new error that simply wraps the provided message.
    pub fn msg<T: Into<String>>(msg: T) -> Self {
        Self::Message(msg.into())
    }

    pub fn corrupt<T: Into<String>>(msg: T) -> Self {
        Self::CorruptInput(msg.into())
    }

    pub fn config<T: Into<String>>(msg: T) -> Self {
        Self::Config(msg.into())
    }
}
