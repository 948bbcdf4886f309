//! tunlink Protocol Messages
//!
//! Every WebSocket binary frame carries one record whose first byte is the
//! message type:
//! - AUTH: announce the client's virtual address to the coordinator
//! - FORWARD: a raw IPv4 packet to relay
//! - DYNAMIC_ADDRESS: address request (client) or assignment (coordinator)
//!
//! AUTH and DYNAMIC_ADDRESS are fixed-size and end with an integrity tag,
//! an HMAC-SHA256 over every preceding byte keyed with the shared password.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::io::Cursor;
use std::net::Ipv4Addr;

use crate::ProtoError;

type HmacSha256 = Hmac<Sha256>;

/// Size of the integrity tag appended to fixed records
pub const TAG_SIZE: usize = 32;

/// Width of the NUL-padded CIDR text field
pub const CIDR_FIELD_SIZE: usize = 32;

/// AUTH record: [type:1][ipv4:4][tag:32]
pub const AUTH_SIZE: usize = 1 + 4 + TAG_SIZE;

/// DYNAMIC_ADDRESS record: [type:1][cidr:32][tag:32]
pub const DYNAMIC_ADDRESS_SIZE: usize = 1 + CIDR_FIELD_SIZE + TAG_SIZE;

pub type Tag = [u8; TAG_SIZE];

/// Message types for the tunnel protocol
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    /// Client authentication
    Auth = 0x00,
    /// Forwarded IPv4 packet
    Forward = 0x01,
    /// Dynamic address request/response
    DynamicAddress = 0x02,
}

impl TryFrom<u8> for MessageType {
    type Error = ProtoError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x00 => Ok(Self::Auth),
            0x01 => Ok(Self::Forward),
            0x02 => Ok(Self::DynamicAddress),
            _ => Err(ProtoError::UnknownType(value)),
        }
    }
}

/// Compute the integrity tag of `fields` keyed with `password`.
pub fn compute_tag(password: &[u8], fields: &[u8]) -> Tag {
    let mut mac = HmacSha256::new_from_slice(password).expect("HMAC accepts keys of any length");
    mac.update(fields);
    let mut tag = [0u8; TAG_SIZE];
    tag.copy_from_slice(&mac.finalize().into_bytes());
    tag
}

fn verify_tag(password: &[u8], fields: &[u8], tag: &Tag) -> bool {
    let mut mac = HmacSha256::new_from_slice(password).expect("HMAC accepts keys of any length");
    mac.update(fields);
    mac.verify_slice(tag).is_ok()
}

fn check_type(data: &[u8], expected: MessageType) -> Result<(), ProtoError> {
    let actual = MessageType::try_from(data[0])?;
    if actual != expected {
        return Err(ProtoError::UnexpectedType {
            expected: expected as u8,
            actual: actual as u8,
        });
    }
    Ok(())
}

fn check_length(kind: &'static str, data: &[u8], expected: usize) -> Result<(), ProtoError> {
    if data.len() != expected {
        return Err(ProtoError::InvalidLength {
            kind,
            expected,
            actual: data.len(),
        });
    }
    Ok(())
}

/// AUTH record sent once the TUN device is up
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthHeader {
    pub address: Ipv4Addr,
    pub tag: Tag,
}

impl AuthHeader {
    /// Build a record for `address` tagged with `password`
    pub fn new(address: Ipv4Addr, password: &str) -> Self {
        let tag = compute_tag(password.as_bytes(), &Self::fields(address));
        Self { address, tag }
    }

    fn fields(address: Ipv4Addr) -> [u8; AUTH_SIZE - TAG_SIZE] {
        let mut fields = [0u8; AUTH_SIZE - TAG_SIZE];
        fields[0] = MessageType::Auth as u8;
        fields[1..].copy_from_slice(&address.octets());
        fields
    }

    /// Recompute the tag with `password` and compare in constant time
    pub fn verify(&self, password: &str) -> bool {
        verify_tag(password.as_bytes(), &Self::fields(self.address), &self.tag)
    }

    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(AUTH_SIZE);
        buf.put_slice(&Self::fields(self.address));
        buf.put_slice(&self.tag);
        buf.freeze()
    }

    pub fn decode(data: &[u8]) -> Result<Self, ProtoError> {
        check_length("auth", data, AUTH_SIZE)?;
        check_type(data, MessageType::Auth)?;

        let mut cursor = Cursor::new(&data[1..]);
        let address = Ipv4Addr::from(cursor.get_u32());
        let mut tag = [0u8; TAG_SIZE];
        cursor.copy_to_slice(&mut tag);

        Ok(Self { address, tag })
    }
}

/// DYNAMIC_ADDRESS record, used for both the request and the assignment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DynamicAddressHeader {
    /// CIDR text, e.g. "10.0.0.7/24"
    pub cidr: String,
    pub tag: Tag,
}

impl DynamicAddressHeader {
    /// Build a record for `cidr` tagged with `password`.
    ///
    /// The CIDR text must leave room for a terminating NUL in its field.
    pub fn new(cidr: &str, password: &str) -> Result<Self, ProtoError> {
        let fields = Self::fields(cidr)?;
        let tag = compute_tag(password.as_bytes(), &fields);
        Ok(Self {
            cidr: cidr.to_string(),
            tag,
        })
    }

    fn fields(cidr: &str) -> Result<[u8; DYNAMIC_ADDRESS_SIZE - TAG_SIZE], ProtoError> {
        let text = cidr.as_bytes();
        if text.len() >= CIDR_FIELD_SIZE {
            return Err(ProtoError::CidrTooLong(text.len()));
        }
        let mut fields = [0u8; DYNAMIC_ADDRESS_SIZE - TAG_SIZE];
        fields[0] = MessageType::DynamicAddress as u8;
        fields[1..1 + text.len()].copy_from_slice(text);
        Ok(fields)
    }

    pub fn verify(&self, password: &str) -> bool {
        match Self::fields(&self.cidr) {
            Ok(fields) => verify_tag(password.as_bytes(), &fields, &self.tag),
            Err(_) => false,
        }
    }

    pub fn encode(&self) -> Result<Bytes, ProtoError> {
        let mut buf = BytesMut::with_capacity(DYNAMIC_ADDRESS_SIZE);
        buf.put_slice(&Self::fields(&self.cidr)?);
        buf.put_slice(&self.tag);
        Ok(buf.freeze())
    }

    /// Decode a record; the length must match exactly.
    pub fn decode(data: &[u8]) -> Result<Self, ProtoError> {
        check_length("dynamic address", data, DYNAMIC_ADDRESS_SIZE)?;
        check_type(data, MessageType::DynamicAddress)?;

        let mut cursor = Cursor::new(&data[1..]);
        let mut field = [0u8; CIDR_FIELD_SIZE];
        cursor.copy_to_slice(&mut field);
        let mut tag = [0u8; TAG_SIZE];
        cursor.copy_to_slice(&mut tag);

        let end = field.iter().position(|&b| b == 0).unwrap_or(CIDR_FIELD_SIZE);
        let cidr = std::str::from_utf8(&field[..end])
            .map_err(|_| ProtoError::InvalidUtf8)?
            .to_string();

        Ok(Self { cidr, tag })
    }
}

/// A decoded protocol record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Auth(AuthHeader),
    DynamicAddress(DynamicAddressHeader),
    /// Raw IPv4 packet, type byte already stripped
    Forward(Bytes),
}

impl Message {
    /// Frame a raw packet as FORWARD: [type:1][packet:N]
    pub fn forward(packet: &[u8]) -> Bytes {
        let mut buf = BytesMut::with_capacity(1 + packet.len());
        buf.put_u8(MessageType::Forward as u8);
        buf.put_slice(packet);
        buf.freeze()
    }

    /// Decode a record by its leading type byte
    pub fn decode(data: &[u8]) -> Result<Self, ProtoError> {
        let Some(&first) = data.first() else {
            return Err(ProtoError::EmptyMessage);
        };

        match MessageType::try_from(first)? {
            MessageType::Auth => AuthHeader::decode(data).map(Message::Auth),
            MessageType::DynamicAddress => {
                DynamicAddressHeader::decode(data).map(Message::DynamicAddress)
            }
            MessageType::Forward => Ok(Message::Forward(Bytes::copy_from_slice(&data[1..]))),
        }
    }

    /// Decode an owned record; a FORWARD payload shares `data`'s buffer
    pub fn decode_bytes(data: Bytes) -> Result<Self, ProtoError> {
        match data.first() {
            Some(&first) if first == MessageType::Forward as u8 => {
                Ok(Message::Forward(data.slice(1..)))
            }
            _ => Self::decode(&data),
        }
    }
}
