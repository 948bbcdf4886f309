//! Client error types

use std::path::PathBuf;

use thiserror::Error;
use tunlink_proto::ProtoError;

/// Errors raised by the WebSocket transport
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Transport is not connected")]
    NotConnected,

    #[error("Transport operation timed out")]
    Timeout,

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
}

/// Errors raised by the virtual interface
#[derive(Debug, Error)]
pub enum InterfaceError {
    #[error("Invalid interface name {0:?}")]
    InvalidName(String),

    #[error("Interface address is not set")]
    NoAddress,

    #[error("Interface is not up")]
    NotUp,

    #[error("Interface is already up")]
    AlreadyUp,

    #[error("Interface IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors loading the configuration file
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

/// Errors surfaced by the client API
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Invalid WebSocket server {uri}: {source}")]
    InvalidEndpoint {
        uri: String,
        source: url::ParseError,
    },

    #[error("Invalid WebSocket scheme {0:?} (expected ws or wss)")]
    UnsupportedScheme(String),

    #[error("WebSocket server is not configured")]
    MissingEndpoint,

    #[error("Invalid address {0:?}")]
    InvalidAddress(String),

    #[error("Effective local address is not known yet")]
    NoLocalAddress,

    #[error("Client is already running")]
    AlreadyRunning,

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Interface(#[from] InterfaceError),

    #[error(transparent)]
    Proto(#[from] ProtoError),
}
