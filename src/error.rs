use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Invalid common name: {0}")]
    InvalidCommonName(String),

    #[error("Cryptographic toolkit unavailable: {0}")]
    ToolkitNotFound(String),

    #[error("Certificate issuance failed: {0}")]
    Issuance(String),

    #[error("Command failed: {0}")]
    Command(String),

    #[error("Trust store installation failed: {0}")]
    TrustStore(String),

    #[error("Unsupported platform: {0}")]
    UnsupportedPlatform(&'static str),

    #[error("Invalid glob pattern: {0}")]
    Glob(#[from] glob::PatternError),
}

pub type Result<T> = std::result::Result<T, Error>;
