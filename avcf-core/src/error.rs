use thiserror::Error;

#[derive(Error, Debug)]
pub enum AvcfError {
    #[error("key error: {0}")]
    Key(String),

    #[error("crypto error: {0}")]
    Crypto(String),

    #[error("container error: {0}")]
    Container(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, AvcfError>;
