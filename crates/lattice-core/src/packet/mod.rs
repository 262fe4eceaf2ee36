//! Packet taxonomy built on the frame codec.
//!
//! Every packet is a frame tree whose root tag names its family:
//!
//! | Root | Tag | Contents |
//! |------|-----|----------|
//! | `Network` | 0x10 | bootstrap/relay envelope, see [`network`] |
//! | `Channel` | 0x20 | one channel packet as a child, or an encrypted record as payload, see [`channel`] |
//! | `Datagram` | 0x30 | reliable-datagram control header, see [`datagram`] |
//! | `Padding` | 0x40 | random filler, ignored |
//! | `CachedContact` | 0x50 | persisted bootstrap contact, see [`cache`] |
//! | `CachedWebCache` | 0x60 | persisted web-cache entry, see [`cache`] |
//!
//! Field values are fixed-width little-endian. Decoders skip child tags they
//! do not know and treat a known child with the wrong width as absent, so
//! packet versions can evolve independently of peer software.

pub mod cache;
pub mod channel;
pub mod datagram;
pub mod inspect;
pub mod network;
pub mod relay;

use crate::error::PacketError;
use crate::frame::{Frame, FrameView};
use std::fmt;
use std::net::Ipv4Addr;

/// Top-level packet families
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum RootTag {
    /// Bootstrap and relay control packets
    Network = 0x10,
    /// Encrypted-channel handshake and data
    Channel = 0x20,
    /// Reliable-datagram control header
    Datagram = 0x30,
    /// Traffic-shaping filler
    Padding = 0x40,
    /// Persisted bootstrap contact
    CachedContact = 0x50,
    /// Persisted web-cache entry
    CachedWebCache = 0x60,
}

impl RootTag {
    /// Diagnostic name
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Network => "Network",
            Self::Channel => "Channel",
            Self::Datagram => "Datagram",
            Self::Padding => "Padding",
            Self::CachedContact => "CachedContact",
            Self::CachedWebCache => "CachedWebCache",
        }
    }
}

impl TryFrom<u8> for RootTag {
    type Error = PacketError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x10 => Ok(Self::Network),
            0x20 => Ok(Self::Channel),
            0x30 => Ok(Self::Datagram),
            0x40 => Ok(Self::Padding),
            0x50 => Ok(Self::CachedContact),
            0x60 => Ok(Self::CachedWebCache),
            _ => Err(PacketError::UnexpectedRoot(value)),
        }
    }
}

/// Parse `data` as a single frame whose tag must be `root`.
pub(crate) fn expect_root(data: &[u8], root: RootTag) -> Result<FrameView<'_>, PacketError> {
    let view = FrameView::parse(data)?;
    if view.tag() != root as u8 {
        return Err(PacketError::UnexpectedRoot(view.tag()));
    }
    Ok(view)
}

/// Fixed-width encoding of a single field value
pub trait WireValue: Sized {
    /// Encode as a payload
    fn encode_value(&self) -> Vec<u8>;

    /// Decode a payload; `None` if the width or content is wrong
    fn decode_value(bytes: &[u8]) -> Option<Self>;
}

macro_rules! le_wire_value {
    ($($t:ty),*) => {
        $(
            impl WireValue for $t {
                fn encode_value(&self) -> Vec<u8> {
                    self.to_le_bytes().to_vec()
                }

                fn decode_value(bytes: &[u8]) -> Option<Self> {
                    bytes.try_into().ok().map(<$t>::from_le_bytes)
                }
            }
        )*
    };
}

le_wire_value!(u8, u16, u32, u64, i16, i32, i64);

impl WireValue for bool {
    fn encode_value(&self) -> Vec<u8> {
        vec![u8::from(*self)]
    }

    fn decode_value(bytes: &[u8]) -> Option<Self> {
        match bytes {
            [b] => Some(*b != 0),
            _ => None,
        }
    }
}

impl WireValue for Ipv4Addr {
    fn encode_value(&self) -> Vec<u8> {
        self.octets().to_vec()
    }

    fn decode_value(bytes: &[u8]) -> Option<Self> {
        <[u8; 4]>::try_from(bytes).ok().map(Ipv4Addr::from)
    }
}

impl WireValue for String {
    fn encode_value(&self) -> Vec<u8> {
        self.as_bytes().to_vec()
    }

    fn decode_value(bytes: &[u8]) -> Option<Self> {
        String::from_utf8(bytes.to_vec()).ok()
    }
}

impl WireValue for Vec<u8> {
    fn encode_value(&self) -> Vec<u8> {
        self.clone()
    }

    fn decode_value(bytes: &[u8]) -> Option<Self> {
        Some(bytes.to_vec())
    }
}

/// Child frame carrying `value`
pub(crate) fn field<T: WireValue>(tag: u8, value: &T) -> Frame {
    Frame::leaf(tag, value.encode_value())
}

/// Push a child only when the value is present
pub(crate) fn push_opt<T: WireValue>(frame: &mut Frame, tag: u8, value: Option<&T>) {
    if let Some(value) = value {
        frame.push_child(field(tag, value));
    }
}

/// Push a zero-length marker child when `set`
pub(crate) fn push_flag(frame: &mut Frame, tag: u8, set: bool) {
    if set {
        frame.push_child(Frame::marker(tag));
    }
}

/// Decode a child's payload as `T`
pub(crate) fn read<T: WireValue>(child: &FrameView<'_>) -> Option<T> {
    child.payload().and_then(T::decode_value)
}

/// Local reachability classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum FirewallState {
    /// Directly reachable over TCP and UDP
    #[default]
    Open = 0,
    /// Behind a NAT that allows UDP hole punching
    Nat = 1,
    /// No inbound connectivity; needs a TCP proxy
    Blocked = 2,
}

impl FirewallState {
    /// Wire byte to state; unknown values read as `Blocked`
    #[must_use]
    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Open,
            1 => Self::Nat,
            _ => Self::Blocked,
        }
    }
}

impl fmt::Display for FirewallState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Open => "open",
            Self::Nat => "nat",
            Self::Blocked => "blocked",
        })
    }
}

/// One endpoint: node id plus its UDP address.
///
/// Wire form is 14 bytes: id (u64), IPv4 (4), UDP port (u16).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PeerAddress {
    /// 64-bit node identifier
    pub peer_id: u64,
    /// IPv4 address
    pub ip: Ipv4Addr,
    /// UDP port
    pub udp_port: u16,
}

impl PeerAddress {
    /// Encoded size
    pub const WIRE_SIZE: usize = 14;

    /// Create an address
    #[must_use]
    pub fn new(peer_id: u64, ip: Ipv4Addr, udp_port: u16) -> Self {
        Self {
            peer_id,
            ip,
            udp_port,
        }
    }

    fn write(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.peer_id.to_le_bytes());
        out.extend_from_slice(&self.ip.octets());
        out.extend_from_slice(&self.udp_port.to_le_bytes());
    }

    fn read(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < Self::WIRE_SIZE {
            return None;
        }
        Some(Self {
            peer_id: u64::from_le_bytes(bytes[0..8].try_into().ok()?),
            ip: Ipv4Addr::new(bytes[8], bytes[9], bytes[10], bytes[11]),
            udp_port: u16::from_le_bytes([bytes[12], bytes[13]]),
        })
    }
}

impl WireValue for PeerAddress {
    fn encode_value(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(Self::WIRE_SIZE);
        self.write(&mut out);
        out
    }

    fn decode_value(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != Self::WIRE_SIZE {
            return None;
        }
        Self::read(bytes)
    }
}

impl fmt::Display for PeerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}@{}:{}", self.peer_id, self.ip, self.udp_port)
    }
}

/// Sender's reachability descriptor.
///
/// Wire form is 15 bytes: id (u64), client id (u16), TCP (u16), UDP (u16), firewall (u8).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct DhtSource {
    /// Node identifier
    pub peer_id: u64,
    /// Client instance id, distinguishing several instances of one identity
    pub client_id: u16,
    /// TCP listen port
    pub tcp_port: u16,
    /// UDP listen port
    pub udp_port: u16,
    /// Observed firewall state
    pub firewall: FirewallState,
}

impl DhtSource {
    /// Encoded size
    pub const WIRE_SIZE: usize = 15;

    /// Address of this source when seen from `ip`
    #[must_use]
    pub fn address(&self, ip: Ipv4Addr) -> PeerAddress {
        PeerAddress::new(self.peer_id, ip, self.udp_port)
    }
}

impl WireValue for DhtSource {
    fn encode_value(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(Self::WIRE_SIZE);
        out.extend_from_slice(&self.peer_id.to_le_bytes());
        out.extend_from_slice(&self.client_id.to_le_bytes());
        out.extend_from_slice(&self.tcp_port.to_le_bytes());
        out.extend_from_slice(&self.udp_port.to_le_bytes());
        out.push(self.firewall as u8);
        out
    }

    fn decode_value(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != Self::WIRE_SIZE {
            return None;
        }
        Some(Self {
            peer_id: u64::from_le_bytes(bytes[0..8].try_into().ok()?),
            client_id: u16::from_le_bytes([bytes[8], bytes[9]]),
            tcp_port: u16::from_le_bytes([bytes[10], bytes[11]]),
            udp_port: u16::from_le_bytes([bytes[12], bytes[13]]),
            firewall: FirewallState::from_u8(bytes[14]),
        })
    }
}

/// Contact record carried in contact lists.
///
/// Wire form is 18 bytes: [`PeerAddress`] (14), TCP port (u16), client id (u16).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContactInfo {
    /// UDP endpoint
    pub address: PeerAddress,
    /// TCP listen port
    pub tcp_port: u16,
    /// Client instance id
    pub client_id: u16,
}

impl ContactInfo {
    /// Encoded size
    pub const WIRE_SIZE: usize = 18;

    fn write(&self, out: &mut Vec<u8>) {
        self.address.write(out);
        out.extend_from_slice(&self.tcp_port.to_le_bytes());
        out.extend_from_slice(&self.client_id.to_le_bytes());
    }

    fn read(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != Self::WIRE_SIZE {
            return None;
        }
        Some(Self {
            address: PeerAddress::read(&bytes[..PeerAddress::WIRE_SIZE])?,
            tcp_port: u16::from_le_bytes([bytes[14], bytes[15]]),
            client_id: u16::from_le_bytes([bytes[16], bytes[17]]),
        })
    }
}

/// A list of contacts, packed back to back in one payload
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ContactList(pub Vec<ContactInfo>);

impl WireValue for ContactList {
    fn encode_value(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.0.len() * ContactInfo::WIRE_SIZE);
        for contact in &self.0 {
            contact.write(&mut out);
        }
        out
    }

    fn decode_value(bytes: &[u8]) -> Option<Self> {
        if bytes.len() % ContactInfo::WIRE_SIZE != 0 {
            return None;
        }
        bytes
            .chunks_exact(ContactInfo::WIRE_SIZE)
            .map(ContactInfo::read)
            .collect::<Option<Vec<_>>>()
            .map(Self)
    }
}

impl WireValue for ContactInfo {
    fn encode_value(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(Self::WIRE_SIZE);
        self.write(&mut out);
        out
    }

    fn decode_value(bytes: &[u8]) -> Option<Self> {
        Self::read(bytes)
    }
}
