use thiserror::Error;

pub type SeclogResult<T> = Result<T, SeclogError>;

#[derive(Debug, Error)]
pub enum SeclogError {
    #[error("invalid option '{option}': {reason}")]
    InvalidOption { option: String, reason: String },

    #[error("install secret unavailable: {0}")]
    KeyUnavailable(String),

    #[error("cipher finalize failure: {0}")]
    CipherFinalize(String),

    #[error("cipher error: {0}")]
    Cipher(String),

    #[error("log cache has been destroyed")]
    Destroyed,

    #[error("config error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl SeclogError {
    pub fn invalid_option(option: impl Into<String>, reason: impl Into<String>) -> Self {
        SeclogError::InvalidOption {
            option: option.into(),
            reason: reason.into(),
        }
    }
}
