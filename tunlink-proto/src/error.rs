//! Protocol error types

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtoError {
    #[error("Unknown message type: {0}")]
    UnknownType(u8),

    #[error("Unexpected message type {actual} (expected {expected})")]
    UnexpectedType { expected: u8, actual: u8 },

    #[error("Empty message")]
    EmptyMessage,

    #[error("Invalid {kind} record length: {actual} bytes (expected {expected})")]
    InvalidLength {
        kind: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("CIDR text too long: {0} bytes (max {max})", max = crate::CIDR_FIELD_SIZE - 1)]
    CidrTooLong(usize),

    #[error("Invalid UTF-8 in CIDR field")]
    InvalidUtf8,
}
