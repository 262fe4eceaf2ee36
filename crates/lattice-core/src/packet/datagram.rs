//! Reliable-datagram control header.
//!
//! The retransmission window itself lives above this crate; only the header
//! and the SYN/ACK sub-payloads are defined here.

use super::{PeerAddress, RootTag, expect_root, field, push_opt, read};
use crate::error::PacketError;
use crate::frame::Frame;

const SENDER: u8 = 0x10;
const TARGET: u8 = 0x20;
const KIND: u8 = 0x30;
const CONNECTION_ID: u8 = 0x40;
const SEQUENCE: u8 = 0x50;
const TO: u8 = 0x60;
const FROM: u8 = 0x70;
const IDENT: u8 = 0x80;

/// Datagram kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum DatagramKind {
    /// Connection open
    #[default]
    Syn = 0x00,
    /// Acknowledgement
    Ack = 0x10,
    /// Keep-alive probe
    Ping = 0x20,
    /// Keep-alive reply
    Pong = 0x30,
    /// Stream data
    Data = 0x40,
    /// Connection close
    Fin = 0x50,
}

impl DatagramKind {
    /// Diagnostic name
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Syn => "Syn",
            Self::Ack => "Ack",
            Self::Ping => "Ping",
            Self::Pong => "Pong",
            Self::Data => "Data",
            Self::Fin => "Fin",
        }
    }
}

impl TryFrom<u8> for DatagramKind {
    type Error = PacketError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x00 => Ok(Self::Syn),
            0x10 => Ok(Self::Ack),
            0x20 => Ok(Self::Ping),
            0x30 => Ok(Self::Pong),
            0x40 => Ok(Self::Data),
            0x50 => Ok(Self::Fin),
            _ => Err(PacketError::UnknownTag(value)),
        }
    }
}

/// Diagnostic name of a datagram header child
#[must_use]
pub fn field_name(child: u8) -> Option<&'static str> {
    Some(match child {
        SENDER => "Sender",
        TARGET => "Target",
        KIND => "Kind",
        CONNECTION_ID => "ConnectionId",
        SEQUENCE => "Sequence",
        TO => "To",
        FROM => "From",
        IDENT => "Ident",
        _ => return None,
    })
}

/// Datagram header plus opaque payload
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DatagramPacket {
    /// Sending node
    pub sender: u64,
    /// Receiving node
    pub target: u64,
    /// Datagram kind
    pub kind: DatagramKind,
    /// Per-peer connection id
    pub connection_id: u16,
    /// Sequence number
    pub sequence: u8,
    /// Final destination when relayed
    pub to: Option<PeerAddress>,
    /// Original sender when relayed
    pub from: Option<PeerAddress>,
    /// Session identity; omitted on the wire when zero
    pub ident: u32,
    /// Kind-specific payload
    pub payload: Vec<u8>,
}

impl DatagramPacket {
    /// Encode as a root `Datagram` frame
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut frame = Frame::leaf(RootTag::Datagram as u8, self.payload.clone());
        frame.push_child(field(SENDER, &self.sender));
        frame.push_child(field(TARGET, &self.target));
        frame.push_child(field(KIND, &(self.kind as u8)));
        frame.push_child(field(CONNECTION_ID, &self.connection_id));
        frame.push_child(field(SEQUENCE, &self.sequence));
        if self.ident != 0 {
            frame.push_child(field(IDENT, &self.ident));
        }
        push_opt(&mut frame, TO, self.to.as_ref());
        push_opt(&mut frame, FROM, self.from.as_ref());
        frame.encode()
    }

    /// Decode a root `Datagram` frame.
    ///
    /// # Errors
    ///
    /// Returns a [`PacketError`] for malformed frames, a wrong root, or an unknown kind.
    pub fn decode(data: &[u8]) -> Result<Self, PacketError> {
        let view = expect_root(data, RootTag::Datagram)?;
        let mut packet = Self {
            payload: view.payload().unwrap_or_default().to_vec(),
            ..Self::default()
        };

        for child in view.children() {
            let child = child?;
            match child.tag() {
                SENDER => packet.sender = read(&child).unwrap_or(0),
                TARGET => packet.target = read(&child).unwrap_or(0),
                KIND => {
                    if let Some(kind) = read::<u8>(&child) {
                        packet.kind = DatagramKind::try_from(kind)?;
                    }
                }
                CONNECTION_ID => packet.connection_id = read(&child).unwrap_or(0),
                SEQUENCE => packet.sequence = read(&child).unwrap_or(0),
                TO => packet.to = read(&child),
                FROM => packet.from = read(&child),
                IDENT => packet.ident = read(&child).unwrap_or(0),
                _ => {}
            }
        }

        Ok(packet)
    }
}

/// Payload of a `Syn` datagram
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SynPayload {
    /// Protocol version
    pub version: u16,
    /// Sending node
    pub sender: u64,
    /// Sender's client instance
    pub client_id: u16,
    /// Proposed connection id
    pub connection_id: u16,
}

impl SynPayload {
    /// Encoded size
    pub const WIRE_SIZE: usize = 14;

    /// Encode to 14 bytes
    #[must_use]
    pub fn encode(&self) -> [u8; Self::WIRE_SIZE] {
        let mut out = [0u8; Self::WIRE_SIZE];
        out[0..2].copy_from_slice(&self.version.to_le_bytes());
        out[2..10].copy_from_slice(&self.sender.to_le_bytes());
        out[10..12].copy_from_slice(&self.client_id.to_le_bytes());
        out[12..14].copy_from_slice(&self.connection_id.to_le_bytes());
        out
    }

    /// Decode; `None` when shorter than 14 bytes
    #[must_use]
    pub fn decode(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < Self::WIRE_SIZE {
            return None;
        }
        Some(Self {
            version: u16::from_le_bytes([bytes[0], bytes[1]]),
            sender: u64::from_le_bytes(bytes[2..10].try_into().ok()?),
            client_id: u16::from_le_bytes([bytes[10], bytes[11]]),
            connection_id: u16::from_le_bytes([bytes[12], bytes[13]]),
        })
    }
}

/// Payload of an `Ack` datagram
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AckPayload {
    /// First sequence acknowledged
    pub start: u8,
    /// Receive window space
    pub space: u8,
}

impl AckPayload {
    /// Encode to two bytes
    #[must_use]
    pub fn encode(&self) -> [u8; 2] {
        [self.start, self.space]
    }

    /// Decode; `None` when shorter than two bytes
    #[must_use]
    pub fn decode(bytes: &[u8]) -> Option<Self> {
        match bytes {
            [start, space, ..] => Some(Self {
                start: *start,
                space: *space,
            }),
            _ => None,
        }
    }
}
