//! tunlink Protocol Definitions
//!
//! This crate defines the binary records exchanged between a tunlink
//! client and its coordinator, plus the filter applied to packets read
//! from the local TUN device before they are forwarded.

mod error;
mod message;
mod packet;

pub use error::*;
pub use message::*;
pub use packet::*;
