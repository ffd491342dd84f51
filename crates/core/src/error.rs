use thiserror::Error;

#[derive(Debug, Error)]
pub enum PerflogError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("unexpected response status: {status}")]
    RemoteRequest { status: u16 },

    #[error("request failed: {0}")]
    Transport(String),

    #[error("extraction error: {0}")]
    Extraction(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("time error: {0}")]
    Time(String),

    #[error("io error: {0}")]
    Io(String),
}

pub type Result<T> = std::result::Result<T, PerflogError>;
