//! Per-peer channel state machine.

use super::{CONTROL_COMPONENT, ChannelConfig, Delivery, KeyExchange, SessionState};
use crate::error::ChannelError;
use crate::packet::channel::{ChannelFrame, ChannelPacket};
use lattice_crypto::record::{RecordCipher, Role};
use lattice_crypto::x25519::{PrivateKey, PublicKey};
use lattice_crypto::{
    CHANNEL_ALGORITHM, CryptoError, SESSION_IV_SIZE, SESSION_KEY_SIZE, hash, random, seal,
};
use rand::Rng;
use rand::rngs::OsRng;
use std::collections::HashMap;
use std::fmt;
use std::time::Instant;
use tracing::debug;
use zeroize::Zeroizing;

/// Encrypted records held while the key is still unknown
const MAX_EARLY_RECORDS: usize = 16;

/// Negotiated or proposed session key and IV
struct KeyMaterial {
    key: Zeroizing<[u8; SESSION_KEY_SIZE]>,
    iv: [u8; SESSION_IV_SIZE],
}

impl KeyMaterial {
    fn generate() -> Result<Self, CryptoError> {
        Ok(Self {
            key: Zeroizing::new(random::random_array()?),
            iv: random::random_array()?,
        })
    }

    fn from_parts(key_bytes: &[u8], iv_bytes: &[u8]) -> Result<Self, CryptoError> {
        let key: [u8; SESSION_KEY_SIZE] =
            key_bytes
                .try_into()
                .map_err(|_| CryptoError::InvalidKeyLength {
                    expected: SESSION_KEY_SIZE,
                    actual: key_bytes.len(),
                })?;
        let iv: [u8; SESSION_IV_SIZE] =
            iv_bytes
                .try_into()
                .map_err(|_| CryptoError::InvalidKeyLength {
                    expected: SESSION_IV_SIZE,
                    actual: iv_bytes.len(),
                })?;
        Ok(Self {
            key: Zeroizing::new(key),
            iv,
        })
    }

    fn cipher(&self, role: Role) -> RecordCipher {
        RecordCipher::new(&self.key, &self.iv, role)
    }
}

/// Borrowed node state a session needs while handling packets
pub(crate) struct HandshakeContext<'a> {
    pub local_id: u64,
    pub identity: &'a PrivateKey,
    pub peer_key: Option<&'a PublicKey>,
    pub config: &'a ChannelConfig,
}

/// What the peer told us about itself during the handshake
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteInfo {
    /// Peer's offset from UTC in minutes
    pub gmt_offset: Option<i16>,
    /// Peer's feature bits
    pub features: Option<u8>,
    /// Peer's advertised name
    pub name: Option<String>,
    /// Peer's public key, when sent in `KeyAck`
    pub public_key: Option<PublicKey>,
}

/// Side effects of one session call
#[derive(Debug, Default)]
pub struct SessionOutput {
    /// Encoded datagrams to send to the peer, in order
    pub outgoing: Vec<Vec<u8>>,
    /// Payloads for the upstream receive handler, in receipt order
    pub deliveries: Vec<Delivery>,
    /// Set when the session reached `Established` during this call
    pub established: bool,
    /// Peer public key learned from a `KeyAck`
    pub learned_key: Option<PublicKey>,
}

/// Per sub-channel traffic counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SubChannelStats {
    /// Data packets sent
    pub sent: u64,
    /// Data packets delivered
    pub received: u64,
}

/// Handshake and record state for one peer
pub struct ChannelSession {
    peer_id: u64,
    state: SessionState,
    role: Option<Role>,
    proposal: Option<KeyMaterial>,
    cipher: Option<RecordCipher>,
    peer_encrypting: bool,
    accepted_request: Option<u64>,
    remote: RemoteInfo,
    early_records: Vec<Vec<u8>>,
    sub_channels: HashMap<(u16, u16), SubChannelStats>,
    started_at: Instant,
    established_at: Option<Instant>,
    last_activity: Instant,
}

impl ChannelSession {
    /// Fresh idle session
    #[must_use]
    pub fn new(peer_id: u64, now: Instant) -> Self {
        Self {
            peer_id,
            state: SessionState::Idle,
            role: None,
            proposal: None,
            cipher: None,
            peer_encrypting: false,
            accepted_request: None,
            remote: RemoteInfo::default(),
            early_records: Vec::new(),
            sub_channels: HashMap::new(),
            started_at: now,
            established_at: None,
            last_activity: now,
        }
    }

    /// Remote peer id
    #[must_use]
    pub fn peer_id(&self) -> u64 {
        self.peer_id
    }

    /// Current state
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Whose key won; `None` before the key settles
    #[must_use]
    pub fn role(&self) -> Option<Role> {
        self.role
    }

    /// Information the peer sent during the handshake
    #[must_use]
    pub fn remote(&self) -> &RemoteInfo {
        &self.remote
    }

    /// Whether the peer has announced that its records are encrypted
    #[must_use]
    pub fn peer_encrypting(&self) -> bool {
        self.peer_encrypting
    }

    /// When the session was established
    #[must_use]
    pub fn established_at(&self) -> Option<Instant> {
        self.established_at
    }

    /// Traffic counters keyed by `(component, sub_channel)`
    #[must_use]
    pub fn sub_channels(&self) -> &HashMap<(u16, u16), SubChannelStats> {
        &self.sub_channels
    }

    /// Check if a state transition is valid
    #[must_use]
    pub fn can_transition(&self, to: SessionState) -> bool {
        use SessionState::{Closed, Closing, EncryptionStarting, Established, Idle, KeyExchanging};
        match (self.state, to) {
            (Idle, KeyExchanging)
            | (KeyExchanging, EncryptionStarting)
            | (EncryptionStarting, Established)
            | (_, Closed) => true,
            (from, Closing) => from != Closed && from != Closing,
            _ => false,
        }
    }

    fn transition_to(&mut self, to: SessionState) -> Result<(), ChannelError> {
        if !self.can_transition(to) {
            return Err(ChannelError::InvalidTransition {
                from: self.state.name(),
                to: to.name(),
            });
        }
        debug!(
            peer = %format_args!("{:016x}", self.peer_id),
            "channel state {} -> {}",
            self.state.name(),
            to.name()
        );
        self.state = to;
        Ok(())
    }

    /// Whether the handshake has run longer than `timeout`
    #[must_use]
    pub fn handshake_expired(&self, now: Instant, timeout: std::time::Duration) -> bool {
        self.state.is_handshaking() && now.saturating_duration_since(self.started_at) >= timeout
    }

    /// Whether a session that never started a handshake has outlived `timeout`.
    ///
    /// Stray `EncryptionStart` markers and early records open an idle session
    /// in case the matching request is still in flight.
    #[must_use]
    pub fn stale_expired(&self, now: Instant, timeout: std::time::Duration) -> bool {
        self.state == SessionState::Idle && now.saturating_duration_since(self.started_at) >= timeout
    }

    /// Whether an established session has been quiet for `timeout`
    #[must_use]
    pub fn idle_expired(&self, now: Instant, timeout: std::time::Duration) -> bool {
        self.state == SessionState::Established
            && now.saturating_duration_since(self.last_activity) >= timeout
    }

    /// Start a handshake by proposing a fresh key. No-op unless idle.
    pub(crate) fn initiate(
        &mut self,
        ctx: &HandshakeContext<'_>,
        now: Instant,
        out: &mut SessionOutput,
    ) -> Result<(), ChannelError> {
        if self.state != SessionState::Idle {
            return Ok(());
        }
        let peer_key = ctx
            .peer_key
            .ok_or(ChannelError::UnknownPeerKey(self.peer_id))?;

        let material = KeyMaterial::generate()?;
        let packet = match ctx.config.key_exchange {
            KeyExchange::Session => {
                let mut blob = Zeroizing::new(Vec::with_capacity(SESSION_KEY_SIZE + SESSION_IV_SIZE));
                blob.extend_from_slice(material.key.as_slice());
                blob.extend_from_slice(&material.iv);
                ChannelPacket::SessionRequest {
                    sealed_key: seal::seal(&mut OsRng, peer_key, &blob)?,
                }
            }
            KeyExchange::Key => ChannelPacket::KeyRequest {
                algorithm: CHANNEL_ALGORITHM.to_string(),
                sealed_key: seal::seal(&mut OsRng, peer_key, material.key.as_slice())?,
                iv: material.iv.to_vec(),
            },
        };

        self.transition_to(SessionState::KeyExchanging)?;
        self.started_at = now;
        self.last_activity = now;
        self.proposal = Some(material);
        out.outgoing.push(ChannelFrame::Plain(packet).encode());
        Ok(())
    }

    /// Handle one datagram from the peer
    pub(crate) fn handle(
        &mut self,
        data: &[u8],
        ctx: &HandshakeContext<'_>,
        now: Instant,
        out: &mut SessionOutput,
    ) -> Result<(), ChannelError> {
        if self.state == SessionState::Closed {
            return Err(ChannelError::Closed);
        }

        let frame = ChannelFrame::decode(data)?;
        self.last_activity = now;
        match frame {
            ChannelFrame::Plain(packet) => self.handle_plain(packet, ctx, now, out),
            ChannelFrame::Encrypted(record) => self.handle_record(&record, out),
        }
    }

    fn handle_plain(
        &mut self,
        packet: ChannelPacket,
        ctx: &HandshakeContext<'_>,
        now: Instant,
        out: &mut SessionOutput,
    ) -> Result<(), ChannelError> {
        match packet {
            ChannelPacket::SessionRequest { sealed_key } => {
                if !self.should_accept(&sealed_key, ctx.local_id) {
                    return Ok(());
                }
                let opened = Zeroizing::new(seal::open(ctx.identity, &sealed_key)?);
                if opened.len() != SESSION_KEY_SIZE + SESSION_IV_SIZE {
                    return Err(CryptoError::InvalidKeyLength {
                        expected: SESSION_KEY_SIZE + SESSION_IV_SIZE,
                        actual: opened.len(),
                    }
                    .into());
                }
                let material =
                    KeyMaterial::from_parts(&opened[..SESSION_KEY_SIZE], &opened[SESSION_KEY_SIZE..])?;
                self.accept(&material, &sealed_key, now)?;

                let ack = ChannelPacket::SessionAck {
                    gmt_offset: Some(ctx.config.gmt_offset_minutes),
                    features: Some(ctx.config.features),
                };
                out.outgoing.push(ChannelFrame::Plain(ack).encode());
                self.start_encryption(ctx, out)
            }

            ChannelPacket::KeyRequest {
                algorithm,
                sealed_key,
                iv,
            } => {
                if algorithm != CHANNEL_ALGORITHM {
                    return Err(ChannelError::UnsupportedAlgorithm(algorithm));
                }
                if !self.should_accept(&sealed_key, ctx.local_id) {
                    return Ok(());
                }
                let key = Zeroizing::new(seal::open(ctx.identity, &sealed_key)?);
                let material = KeyMaterial::from_parts(&key, &iv)?;
                self.accept(&material, &sealed_key, now)?;

                let name = &ctx.config.local_name;
                let ack = ChannelPacket::KeyAck {
                    name: (!name.is_empty()).then(|| name.clone()),
                    public_key: Some(ctx.identity.public_key().as_bytes().to_vec()),
                };
                out.outgoing.push(ChannelFrame::Plain(ack).encode());
                self.start_encryption(ctx, out)
            }

            ChannelPacket::SessionAck {
                gmt_offset,
                features,
            } => {
                if !self.awaiting_ack() {
                    debug!(peer = %format_args!("{:016x}", self.peer_id), "ignoring stale session ack");
                    return Ok(());
                }
                self.remote.gmt_offset = gmt_offset;
                self.remote.features = features;
                self.adopt_own_proposal();
                self.start_encryption(ctx, out)
            }

            ChannelPacket::KeyAck { name, public_key } => {
                if !self.awaiting_ack() {
                    debug!(peer = %format_args!("{:016x}", self.peer_id), "ignoring stale key ack");
                    return Ok(());
                }
                if let Some(bytes) = public_key {
                    let key = PublicKey::from_slice(&bytes)?;
                    self.remote.public_key = Some(key);
                    out.learned_key = Some(key);
                }
                self.remote.name = name;
                self.adopt_own_proposal();
                self.start_encryption(ctx, out)
            }

            ChannelPacket::EncryptionStart => {
                self.peer_encrypting = true;
                Ok(())
            }

            ChannelPacket::Close { reason } if self.cipher.is_none() => {
                debug!(
                    peer = %format_args!("{:016x}", self.peer_id),
                    reason = reason.as_deref().unwrap_or(""),
                    "channel closed by peer during handshake"
                );
                self.shutdown();
                Ok(())
            }

            other => Err(ChannelError::UnexpectedPacket {
                packet: other.tag().name(),
                state: self.state.name(),
            }),
        }
    }

    fn handle_record(&mut self, record: &[u8], out: &mut SessionOutput) -> Result<(), ChannelError> {
        let Some(cipher) = self.cipher.as_mut() else {
            if self.early_records.len() < MAX_EARLY_RECORDS {
                self.early_records.push(record.to_vec());
            }
            return Ok(());
        };

        let plaintext = match cipher.open(record) {
            Ok(plaintext) => Zeroizing::new(plaintext),
            Err(CryptoError::ReplayDetected(counter)) => {
                debug!(peer = %format_args!("{:016x}", self.peer_id), counter, "dropping replayed record");
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };

        let packet = ChannelPacket::decode(&plaintext)?;
        self.handle_secure(packet, out)
    }

    fn handle_secure(
        &mut self,
        packet: ChannelPacket,
        out: &mut SessionOutput,
    ) -> Result<(), ChannelError> {
        match packet {
            ChannelPacket::Data {
                component,
                sub_channel,
                payload,
            } => {
                if self.state == SessionState::EncryptionStarting {
                    self.transition_to(SessionState::Established)?;
                    self.established_at = Some(self.last_activity);
                    out.established = true;
                }
                if self.state != SessionState::Established {
                    return Ok(());
                }
                if component == CONTROL_COMPONENT && payload.is_empty() {
                    return Ok(());
                }
                self.sub_channels
                    .entry((component, sub_channel))
                    .or_default()
                    .received += 1;
                out.deliveries.push(Delivery {
                    peer_id: self.peer_id,
                    component,
                    sub_channel,
                    payload,
                });
                Ok(())
            }
            ChannelPacket::EncryptionPadding { .. } => Ok(()),
            ChannelPacket::Close { reason } => {
                debug!(
                    peer = %format_args!("{:016x}", self.peer_id),
                    reason = reason.as_deref().unwrap_or(""),
                    "channel closed by peer"
                );
                self.shutdown();
                Ok(())
            }
            other => Err(ChannelError::UnexpectedPacket {
                packet: other.tag().name(),
                state: self.state.name(),
            }),
        }
    }

    /// Decide whether a peer's key proposal replaces whatever we have.
    ///
    /// When both sides propose at once the lower peer id's key wins.
    fn should_accept(&self, sealed_key: &[u8], local_id: u64) -> bool {
        if self.accepted_request == Some(hash::fingerprint(sealed_key)) {
            return false;
        }
        match self.state {
            SessionState::Idle => true,
            SessionState::KeyExchanging => {
                let ours_wins = local_id < self.peer_id;
                if ours_wins {
                    debug!(peer = %format_args!("{:016x}", self.peer_id), "simultaneous request, keeping our key");
                } else {
                    debug!(peer = %format_args!("{:016x}", self.peer_id), "simultaneous request, adopting peer key");
                }
                !ours_wins
            }
            // A late request from the losing side of a race
            SessionState::EncryptionStarting => false,
            SessionState::Established => {
                !(self.role == Some(Role::Initiator) && local_id < self.peer_id)
            }
            SessionState::Closing | SessionState::Closed => false,
        }
    }

    fn awaiting_ack(&self) -> bool {
        self.state == SessionState::KeyExchanging && self.proposal.is_some() && self.cipher.is_none()
    }

    fn accept(
        &mut self,
        material: &KeyMaterial,
        sealed_key: &[u8],
        now: Instant,
    ) -> Result<(), ChannelError> {
        if self.state == SessionState::Established {
            debug!(peer = %format_args!("{:016x}", self.peer_id), "peer restarted session");
            *self = Self::new(self.peer_id, now);
        }
        if self.state == SessionState::Idle {
            self.transition_to(SessionState::KeyExchanging)?;
            self.started_at = now;
        }

        self.proposal = None;
        self.accepted_request = Some(hash::fingerprint(sealed_key));
        self.cipher = Some(material.cipher(Role::Responder));
        self.role = Some(Role::Responder);
        Ok(())
    }

    fn adopt_own_proposal(&mut self) {
        if let Some(material) = self.proposal.take() {
            self.cipher = Some(material.cipher(Role::Initiator));
            self.role = Some(Role::Initiator);
        }
    }

    /// Mark the encryption boundary, pad, confirm, then drain records that
    /// arrived before the key was known.
    fn start_encryption(
        &mut self,
        ctx: &HandshakeContext<'_>,
        out: &mut SessionOutput,
    ) -> Result<(), ChannelError> {
        self.transition_to(SessionState::EncryptionStarting)?;
        out.outgoing
            .push(ChannelFrame::Plain(ChannelPacket::EncryptionStart).encode());

        let config = ctx.config;
        let count = OsRng.gen_range(0..=config.max_padding_packets);
        let max_size = config.max_padding_size.max(config.min_padding_size);
        for _ in 0..count {
            let len = OsRng.gen_range(config.min_padding_size..=max_size);
            let filler = random::random_vec(len)?;
            self.push_secure(&ChannelPacket::EncryptionPadding { filler }, out)?;
        }

        self.push_secure(
            &ChannelPacket::Data {
                component: CONTROL_COMPONENT,
                sub_channel: 0,
                payload: Vec::new(),
            },
            out,
        )?;

        for record in std::mem::take(&mut self.early_records) {
            if let Err(e) = self.handle_record(&record, out) {
                debug!(peer = %format_args!("{:016x}", self.peer_id), "dropping early record: {e}");
            }
        }
        Ok(())
    }

    fn push_secure(
        &mut self,
        packet: &ChannelPacket,
        out: &mut SessionOutput,
    ) -> Result<(), ChannelError> {
        let cipher = self
            .cipher
            .as_mut()
            .ok_or(ChannelError::NotEstablished(self.peer_id))?;
        let plaintext = Zeroizing::new(packet.encode());
        let record = cipher.seal(&plaintext)?;
        out.outgoing.push(ChannelFrame::Encrypted(record).encode());
        Ok(())
    }

    /// Encrypt one payload for the peer
    pub(crate) fn send_data(
        &mut self,
        component: u16,
        sub_channel: u16,
        payload: Vec<u8>,
        now: Instant,
        out: &mut SessionOutput,
    ) -> Result<(), ChannelError> {
        if self.state != SessionState::Established {
            return Err(ChannelError::NotEstablished(self.peer_id));
        }
        self.push_secure(
            &ChannelPacket::Data {
                component,
                sub_channel,
                payload,
            },
            out,
        )?;
        self.sub_channels
            .entry((component, sub_channel))
            .or_default()
            .sent += 1;
        self.last_activity = now;
        Ok(())
    }

    /// Tell the peer we are leaving, then destroy the keys
    pub(crate) fn close(&mut self, reason: Option<String>, out: &mut SessionOutput) {
        if matches!(self.state, SessionState::Closing | SessionState::Closed) {
            return;
        }
        let was_idle = self.state == SessionState::Idle;
        if self.transition_to(SessionState::Closing).is_err() {
            return;
        }

        let packet = ChannelPacket::Close { reason };
        if self.cipher.is_some() {
            if let Err(e) = self.push_secure(&packet, out) {
                debug!(peer = %format_args!("{:016x}", self.peer_id), "close not sent: {e}");
            }
        } else if !was_idle {
            out.outgoing.push(ChannelFrame::Plain(packet).encode());
        }
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.state = SessionState::Closed;
        self.cipher = None;
        self.proposal = None;
        self.early_records.clear();
        debug!(peer = %format_args!("{:016x}", self.peer_id), "channel keys destroyed");
    }

    /// Whether key material is still held
    #[must_use]
    pub fn has_keys(&self) -> bool {
        self.cipher.is_some() || self.proposal.is_some()
    }
}

impl fmt::Debug for ChannelSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelSession")
            .field("peer_id", &format_args!("{:016x}", self.peer_id))
            .field("state", &self.state)
            .field("role", &self.role)
            .field("keys", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    struct Node {
        id: u64,
        identity: PrivateKey,
        config: ChannelConfig,
    }

    impl Node {
        fn new(id: u64) -> Self {
            Self {
                id,
                identity: PrivateKey::generate(&mut OsRng),
                config: ChannelConfig::default(),
            }
        }

        fn ctx<'a>(&'a self, peer_key: Option<&'a PublicKey>) -> HandshakeContext<'a> {
            HandshakeContext {
                local_id: self.id,
                identity: &self.identity,
                peer_key,
                config: &self.config,
            }
        }
    }

    fn deliver(
        to: &mut ChannelSession,
        node: &Node,
        datagrams: Vec<Vec<u8>>,
        now: Instant,
    ) -> SessionOutput {
        let mut out = SessionOutput::default();
        for datagram in datagrams {
            to.handle(&datagram, &node.ctx(None), now, &mut out).unwrap();
        }
        out
    }

    fn establish(a: &Node, b: &Node) -> (ChannelSession, ChannelSession) {
        let now = Instant::now();
        let b_pub = b.identity.public_key();
        let mut sa = ChannelSession::new(b.id, now);
        let mut sb = ChannelSession::new(a.id, now);

        let mut out = SessionOutput::default();
        sa.initiate(&a.ctx(Some(&b_pub)), now, &mut out).unwrap();
        assert_eq!(sa.state(), SessionState::KeyExchanging);

        let to_a = deliver(&mut sb, b, out.outgoing, now);
        assert_eq!(sb.state(), SessionState::EncryptionStarting);
        let to_b = deliver(&mut sa, a, to_a.outgoing, now);
        assert!(to_b.established);
        let back = deliver(&mut sb, b, to_b.outgoing, now);
        assert!(back.established);
        (sa, sb)
    }

    #[test]
    fn test_session_handshake() {
        let a = Node::new(1);
        let b = Node::new(2);
        let (sa, sb) = establish(&a, &b);
        assert_eq!(sa.state(), SessionState::Established);
        assert_eq!(sb.state(), SessionState::Established);
        assert_eq!(sa.role(), Some(Role::Initiator));
        assert_eq!(sb.role(), Some(Role::Responder));
        assert_eq!(sa.remote().features, Some(b.config.features));
        assert!(sb.peer_encrypting());
    }

    #[test]
    fn test_data_after_establish() {
        let a = Node::new(1);
        let b = Node::new(2);
        let (mut sa, mut sb) = establish(&a, &b);
        let now = Instant::now();

        let mut out = SessionOutput::default();
        sa.send_data(5, 1, b"first".to_vec(), now, &mut out).unwrap();
        sa.send_data(5, 1, b"second".to_vec(), now, &mut out).unwrap();
        let received = deliver(&mut sb, &b, out.outgoing, now);

        let payloads: Vec<_> = received.deliveries.iter().map(|d| d.payload.clone()).collect();
        assert_eq!(payloads, vec![b"first".to_vec(), b"second".to_vec()]);
        assert_eq!(sb.sub_channels()[&(5, 1)].received, 2);
        assert_eq!(sa.sub_channels()[&(5, 1)].sent, 2);
    }

    #[test]
    fn test_duplicate_record_dropped() {
        let a = Node::new(1);
        let b = Node::new(2);
        let (mut sa, mut sb) = establish(&a, &b);
        let now = Instant::now();

        let mut out = SessionOutput::default();
        sa.send_data(9, 0, b"once".to_vec(), now, &mut out).unwrap();
        let datagram = out.outgoing.remove(0);
        let received = deliver(&mut sb, &b, vec![datagram.clone(), datagram], now);
        assert_eq!(received.deliveries.len(), 1);
    }

    #[test]
    fn test_key_request_exchange() {
        let mut a = Node::new(1);
        a.config.key_exchange = KeyExchange::Key;
        let mut b = Node::new(2);
        b.config.local_name = "bob".into();

        let (sa, _sb) = establish(&a, &b);
        assert_eq!(sa.remote().name.as_deref(), Some("bob"));
        assert_eq!(sa.remote().public_key, Some(b.identity.public_key()));
    }

    #[test]
    fn test_unsupported_algorithm() {
        let a = Node::new(1);
        let b = Node::new(2);
        let now = Instant::now();
        let sealed = seal::seal(&mut OsRng, &b.identity.public_key(), &[0u8; 32]).unwrap();
        let request = ChannelFrame::Plain(ChannelPacket::KeyRequest {
            algorithm: "rot13".into(),
            sealed_key: sealed,
            iv: vec![0; 16],
        })
        .encode();

        let mut sb = ChannelSession::new(a.id, now);
        let mut out = SessionOutput::default();
        assert!(matches!(
            sb.handle(&request, &b.ctx(None), now, &mut out),
            Err(ChannelError::UnsupportedAlgorithm(_))
        ));
    }

    #[test]
    fn test_plaintext_data_rejected() {
        let b = Node::new(2);
        let now = Instant::now();
        let mut sb = ChannelSession::new(1, now);
        let data = ChannelFrame::Plain(ChannelPacket::Data {
            component: 1,
            sub_channel: 0,
            payload: b"sneaky".to_vec(),
        })
        .encode();
        let mut out = SessionOutput::default();
        assert!(matches!(
            sb.handle(&data, &b.ctx(None), now, &mut out),
            Err(ChannelError::UnexpectedPacket { packet: "Data", .. })
        ));
    }

    #[test]
    fn test_initiate_requires_key() {
        let a = Node::new(1);
        let mut sa = ChannelSession::new(2, Instant::now());
        let mut out = SessionOutput::default();
        assert!(matches!(
            sa.initiate(&a.ctx(None), Instant::now(), &mut out),
            Err(ChannelError::UnknownPeerKey(2))
        ));
        assert_eq!(sa.state(), SessionState::Idle);
    }

    #[test]
    fn test_close_zeroizes() {
        let a = Node::new(1);
        let b = Node::new(2);
        let (mut sa, mut sb) = establish(&a, &b);

        let mut out = SessionOutput::default();
        sa.close(Some("bye".into()), &mut out);
        assert_eq!(sa.state(), SessionState::Closed);
        assert!(!sa.has_keys());

        deliver(&mut sb, &b, out.outgoing, Instant::now());
        assert_eq!(sb.state(), SessionState::Closed);
        assert!(!sb.has_keys());
    }

    #[test]
    fn test_timeouts() {
        let a = Node::new(1);
        let b = Node::new(2);
        let start = Instant::now();
        let mut sa = ChannelSession::new(b.id, start);
        let mut out = SessionOutput::default();
        sa.initiate(&a.ctx(Some(&b.identity.public_key())), start, &mut out)
            .unwrap();

        let timeout = a.config.handshake_timeout;
        assert!(!sa.handshake_expired(start + timeout - Duration::from_secs(1), timeout));
        assert!(sa.handshake_expired(start + timeout, timeout));
        assert!(!sa.idle_expired(start + Duration::from_secs(3600), a.config.idle_timeout));
    }

    #[test]
    fn test_transition_rules() {
        let mut session = ChannelSession::new(1, Instant::now());
        assert!(session.can_transition(SessionState::KeyExchanging));
        assert!(!session.can_transition(SessionState::Established));
        assert!(session.transition_to(SessionState::Established).is_err());
        assert!(session.can_transition(SessionState::Closed));
    }
}
