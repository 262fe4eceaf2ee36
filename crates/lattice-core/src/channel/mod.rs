//! Encrypted channels between peers.
//!
//! A channel is negotiated over an unreliable datagram transport:
//!
//! ```text
//! Idle -> KeyExchanging -> EncryptionStarting -> Established -> Closing -> Closed
//! ```
//!
//! [`ChannelSession`] is the per-peer state machine and performs no I/O.
//! [`ChannelManager`] owns the sessions, the peer key directory and the
//! pending send queues, and hands outgoing datagrams to a [`DatagramSink`].

mod manager;
mod session;

pub use manager::{ChannelManager, TickReport};
pub use session::{ChannelSession, RemoteInfo, SessionOutput, SubChannelStats};

use crate::packet::channel::FEATURE_RICH_TEXT;
use std::time::Duration;

/// Component id reserved for the channel's own confirmation packets
pub const CONTROL_COMPONENT: u16 = 0;

/// Which request an initiator sends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeyExchange {
    /// `SessionRequest` carrying the sealed key and IV
    #[default]
    Session,
    /// `KeyRequest` naming its algorithm, answered with the responder's identity
    Key,
}

/// Channel configuration
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// Time allowed to reach `Established`
    pub handshake_timeout: Duration,
    /// Established sessions with no traffic for this long are closed
    pub idle_timeout: Duration,
    /// Reliable sends queued per peer while the handshake runs
    pub max_pending: usize,
    /// Upper bound on padding packets after `EncryptionStart`
    pub max_padding_packets: usize,
    /// Smallest padding filler
    pub min_padding_size: usize,
    /// Largest padding filler
    pub max_padding_size: usize,
    /// Name advertised in `KeyAck`
    pub local_name: String,
    /// Feature bits advertised in `SessionAck`
    pub features: u8,
    /// Local offset from UTC in minutes, advertised in `SessionAck`
    pub gmt_offset_minutes: i16,
    /// Request type used when initiating
    pub key_exchange: KeyExchange,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            handshake_timeout: Duration::from_secs(20),
            idle_timeout: Duration::from_secs(180),
            max_pending: 64,
            max_padding_packets: 3,
            min_padding_size: 16,
            max_padding_size: 256,
            local_name: String::new(),
            features: FEATURE_RICH_TEXT,
            gmt_offset_minutes: 0,
            key_exchange: KeyExchange::Session,
        }
    }
}

/// Session lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    /// No handshake yet
    Idle,
    /// Request sent or received, waiting for the key to settle
    KeyExchanging,
    /// Key settled; our records are encrypted, waiting for the peer's first data
    EncryptionStarting,
    /// Both directions confirmed
    Established,
    /// Close in progress
    Closing,
    /// Keys destroyed
    Closed,
}

impl SessionState {
    /// Diagnostic name
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::KeyExchanging => "KeyExchanging",
            Self::EncryptionStarting => "EncryptionStarting",
            Self::Established => "Established",
            Self::Closing => "Closing",
            Self::Closed => "Closed",
        }
    }

    /// Whether a handshake is in flight
    #[must_use]
    pub fn is_handshaking(self) -> bool {
        matches!(self, Self::KeyExchanging | Self::EncryptionStarting)
    }
}

/// One payload delivered from a peer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// Sending peer
    pub peer_id: u64,
    /// Destination component
    pub component: u16,
    /// Sub-channel within the component
    pub sub_channel: u16,
    /// Payload bytes
    pub payload: Vec<u8>,
}

/// Upstream receive contract
pub trait ReceiveHandler {
    /// Called once per delivered payload, in receipt order per peer
    fn on_receive(&mut self, delivery: Delivery);
}

impl<F: FnMut(Delivery)> ReceiveHandler for F {
    fn on_receive(&mut self, delivery: Delivery) {
        self(delivery);
    }
}

/// Outgoing side of the unreliable datagram transport
pub trait DatagramSink {
    /// Hand one datagram to the transport; delivery is not guaranteed
    fn send_datagram(&mut self, peer_id: u64, datagram: Vec<u8>);
}

impl DatagramSink for Vec<(u64, Vec<u8>)> {
    fn send_datagram(&mut self, peer_id: u64, datagram: Vec<u8>) {
        self.push((peer_id, datagram));
    }
}
