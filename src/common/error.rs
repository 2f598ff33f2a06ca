//! Error types for ringdht

use std::net::SocketAddr;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    // === I/O Errors ===
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // === Wire Errors ===
    #[error("Malformed datagram: {0}")]
    Malformed(String),

    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    #[error("Datagram too large: {size} bytes (max {max})")]
    DatagramTooLarge { size: usize, max: usize },

    // === Network Errors ===
    #[error("Peer unreachable: {0}")]
    Unreachable(SocketAddr),

    #[error("Registration timed out after {0:?}")]
    RegistrationTimeout(std::time::Duration),

    // === Membership Errors ===
    #[error("No peers registered")]
    EmptyRegistry,

    #[error("Invalid node state: {0}")]
    InvalidState(String),

    #[error("Registry unavailable")]
    Unavailable,

    // === Dataset Errors ===
    #[error("Dataset error at line {line}: {reason}")]
    Dataset { line: usize, reason: String },

    // === Config Errors ===
    #[error("Config error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // === Generic ===
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Errors caused by a single bad datagram; the listener drops it and moves on.
    pub fn is_discardable(&self) -> bool {
        matches!(self, Error::Malformed(_) | Error::UnknownCommand(_))
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Malformed(e.to_string())
    }
}

impl From<&str> for Error {
    fn from(s: &str) -> Self {
        Error::Other(s.to_string())
    }
}

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::Other(s)
    }
}
