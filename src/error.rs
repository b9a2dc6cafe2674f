use std::net::SocketAddr;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, DialError>;

#[derive(Error, Debug)]
pub enum DialError {
    #[error("DIAL service is not initialized")]
    NotInitialized,

    #[error("Application '{0}' is already registered")]
    DuplicateApp(String),

    #[error("Application name must not be empty")]
    InvalidAppName,

    #[error("Unknown application: {0}")]
    UnknownApp(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to bind {what} on {addr}: {source}")]
    Bind {
        what: &'static str,
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("Discovery unavailable: {0}")]
    DiscoveryUnavailable(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("XML error: {0}")]
    Xml(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl DialError {
    pub(crate) fn bind(what: &'static str, addr: SocketAddr, source: std::io::Error) -> Self {
        DialError::Bind { what, addr, source }
    }
}
