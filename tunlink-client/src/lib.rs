//! tunlink client
//!
//! Joins a virtual network: a TUN device on this host, an address
//! negotiated with a coordinator over WebSocket, and IPv4 packets forwarded
//! both ways between them.

pub mod cli;
pub mod client;
pub mod config;
pub mod error;
pub mod inbound;
pub mod outbound;
pub mod session;
pub mod transport;
pub mod tun;
pub mod utils;

pub use client::{Client, SessionEnd};
pub use config::ClientConfig;
pub use error::{ClientError, InterfaceError, TransportError};
pub use session::{ExitReason, SessionState, Terminator};
pub use transport::{Envelope, Transport, WebSocketTransport};
pub use tun::{Interface, TunInterface};
