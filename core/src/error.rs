//! Error types for the tunnel-config-core crate

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Proxy '{0}' already exists")]
    DuplicateName(String),

    #[error("Invalid {field}: {value} (must be between 1 and 65535)")]
    InvalidPort { field: &'static str, value: u32 },

    #[error("Proxy '{0}' not found")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Failed to restart '{unit}': {message}")]
    Process { unit: String, message: String },

    #[error("Command not found: {0}")]
    CommandNotFound(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("Deserialization error: {0}")]
    Deserialization(#[from] toml::de::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn validation(msg: impl Into<String>) -> Self {
        Error::Validation(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    pub fn process(unit: impl Into<String>, msg: impl Into<String>) -> Self {
        Error::Process {
            unit: unit.into(),
            message: msg.into(),
        }
    }

    /// Stable tag for the error kind, used by callers for presentation
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Io(_) => "io",
            Error::DuplicateName(_) => "duplicate-name",
            Error::InvalidPort { .. } => "invalid-port",
            Error::NotFound(_) => "not-found",
            Error::Validation(_) => "validation",
            Error::Process { .. } => "process",
            Error::CommandNotFound(_) => "command-not-found",
            Error::Config(_) => "config",
            Error::Serialization(_) | Error::Deserialization(_) => "config",
        }
    }
}
