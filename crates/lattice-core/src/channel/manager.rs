//! Channel manager: sessions by peer, reliable send queues, timers.

use super::session::{ChannelSession, HandshakeContext, SessionOutput};
use super::{ChannelConfig, DatagramSink, Delivery, ReceiveHandler, SessionState};
use crate::error::ChannelError;
use lattice_crypto::x25519::{PrivateKey, PublicKey};
use std::collections::{HashMap, VecDeque};
use std::time::Instant;
use tracing::{debug, info};

/// A reliable send waiting for its channel
#[derive(Debug, Clone)]
struct PendingSend {
    component: u16,
    sub_channel: u16,
    payload: Vec<u8>,
}

/// Result of a timer pass
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TickReport {
    /// Peers whose handshake timed out; their queued sends were dropped
    pub unreachable: Vec<u64>,
    /// Peers whose established channel was closed for inactivity
    pub idle_closed: Vec<u64>,
    /// Peers whose idle session never saw a request and was discarded
    pub discarded: Vec<u64>,
}

impl TickReport {
    /// `PeerUnreachable` for each failed handshake
    pub fn errors(&self) -> impl Iterator<Item = ChannelError> + '_ {
        self.unreachable
            .iter()
            .map(|&peer| ChannelError::PeerUnreachable(peer))
    }
}

/// Owns every channel session of the local node
pub struct ChannelManager<S: DatagramSink> {
    local_id: u64,
    identity: PrivateKey,
    config: ChannelConfig,
    keys: HashMap<u64, PublicKey>,
    sessions: HashMap<u64, ChannelSession>,
    pending: HashMap<u64, VecDeque<PendingSend>>,
    sink: S,
}

impl<S: DatagramSink> ChannelManager<S> {
    /// Create a manager for the node `local_id` holding `identity`
    pub fn new(local_id: u64, identity: PrivateKey, config: ChannelConfig, sink: S) -> Self {
        Self {
            local_id,
            identity,
            config,
            keys: HashMap::new(),
            sessions: HashMap::new(),
            pending: HashMap::new(),
            sink,
        }
    }

    /// Local node id
    #[must_use]
    pub fn local_id(&self) -> u64 {
        self.local_id
    }

    /// Local public key
    #[must_use]
    pub fn public_key(&self) -> PublicKey {
        self.identity.public_key()
    }

    /// Channel configuration
    #[must_use]
    pub fn config(&self) -> &ChannelConfig {
        &self.config
    }

    /// Record a peer's public key
    pub fn add_peer_key(&mut self, peer_id: u64, key: PublicKey) {
        self.keys.insert(peer_id, key);
    }

    /// Known public key of a peer
    #[must_use]
    pub fn peer_key(&self, peer_id: u64) -> Option<&PublicKey> {
        self.keys.get(&peer_id)
    }

    /// Session with a peer
    #[must_use]
    pub fn session(&self, peer_id: u64) -> Option<&ChannelSession> {
        self.sessions.get(&peer_id)
    }

    /// Session state with a peer
    #[must_use]
    pub fn state(&self, peer_id: u64) -> Option<SessionState> {
        self.sessions.get(&peer_id).map(ChannelSession::state)
    }

    /// Number of live sessions
    #[must_use]
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Reliable sends queued for a peer
    #[must_use]
    pub fn pending_count(&self, peer_id: u64) -> usize {
        self.pending.get(&peer_id).map_or(0, VecDeque::len)
    }

    /// Transport sink
    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Transport sink, mutably
    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    /// Send on the default sub-channel
    ///
    /// # Errors
    ///
    /// See [`ChannelManager::send_on`].
    pub fn send(
        &mut self,
        peer_id: u64,
        component: u16,
        payload: Vec<u8>,
        reliable: bool,
        now: Instant,
    ) -> Result<(), ChannelError> {
        self.send_on(peer_id, component, 0, payload, reliable, now)
    }

    /// Send a payload to a component on a peer.
    ///
    /// Established channels send immediately. Otherwise a reliable send is
    /// queued and starts a handshake, and an unreliable send fails.
    ///
    /// # Errors
    ///
    /// `NotEstablished` for an unreliable send without a channel, `QueueFull`
    /// when the per-peer queue is at capacity, `UnknownPeerKey` when a
    /// handshake is needed but the peer's key is unknown.
    pub fn send_on(
        &mut self,
        peer_id: u64,
        component: u16,
        sub_channel: u16,
        payload: Vec<u8>,
        reliable: bool,
        now: Instant,
    ) -> Result<(), ChannelError> {
        if self.state(peer_id) == Some(SessionState::Established) {
            let mut out = SessionOutput::default();
            if let Some(session) = self.sessions.get_mut(&peer_id) {
                session.send_data(component, sub_channel, payload, now, &mut out)?;
            }
            self.flush(peer_id, out.outgoing);
            return Ok(());
        }

        if !reliable {
            return Err(ChannelError::NotEstablished(peer_id));
        }

        let queued = self.pending_count(peer_id);
        if queued >= self.config.max_pending {
            return Err(ChannelError::QueueFull(peer_id));
        }

        self.connect(peer_id, now)?;
        self.pending.entry(peer_id).or_default().push_back(PendingSend {
            component,
            sub_channel,
            payload,
        });
        Ok(())
    }

    /// Start a handshake unless one is running or the channel is up.
    ///
    /// # Errors
    ///
    /// `UnknownPeerKey` if no public key is known for the peer.
    pub fn connect(&mut self, peer_id: u64, now: Instant) -> Result<(), ChannelError> {
        let reusable = self
            .sessions
            .get(&peer_id)
            .is_some_and(|s| !matches!(s.state(), SessionState::Closing | SessionState::Closed));
        if !reusable {
            self.sessions
                .insert(peer_id, ChannelSession::new(peer_id, now));
        }

        let ctx = HandshakeContext {
            local_id: self.local_id,
            identity: &self.identity,
            peer_key: self.keys.get(&peer_id),
            config: &self.config,
        };
        let mut out = SessionOutput::default();
        let result = match self.sessions.get_mut(&peer_id) {
            Some(session) => session.initiate(&ctx, now, &mut out),
            None => Ok(()),
        };
        if result.is_err() {
            self.sessions.remove(&peer_id);
        }
        result?;

        self.flush(peer_id, out.outgoing);
        Ok(())
    }

    /// Feed one datagram received from `peer_id` and return the payloads it
    /// delivered.
    ///
    /// # Errors
    ///
    /// Any [`ChannelError`] the session raises; the datagram is dropped.
    pub fn handle_datagram(
        &mut self,
        peer_id: u64,
        data: &[u8],
        now: Instant,
    ) -> Result<Vec<Delivery>, ChannelError> {
        let session = self
            .sessions
            .entry(peer_id)
            .or_insert_with(|| ChannelSession::new(peer_id, now));
        if session.state() == SessionState::Closed {
            *session = ChannelSession::new(peer_id, now);
        }

        let ctx = HandshakeContext {
            local_id: self.local_id,
            identity: &self.identity,
            peer_key: self.keys.get(&peer_id),
            config: &self.config,
        };
        let mut out = SessionOutput::default();
        let result = session.handle(data, &ctx, now, &mut out);
        let state = session.state();

        if let Some(key) = out.learned_key {
            self.keys.insert(peer_id, key);
        }
        self.flush(peer_id, out.outgoing);

        if let Err(e) = result {
            debug!(peer = %format_args!("{:016x}", peer_id), "dropping channel datagram: {e}");
            if matches!(state, SessionState::Idle | SessionState::Closed) {
                self.sessions.remove(&peer_id);
            }
            return Err(e);
        }

        if out.established {
            info!(peer = %format_args!("{:016x}", peer_id), "channel established");
            self.drain_pending(peer_id, now)?;
        }
        if state == SessionState::Closed {
            self.sessions.remove(&peer_id);
        }

        Ok(out.deliveries)
    }

    /// Like [`ChannelManager::handle_datagram`], dispatching deliveries to `handler`.
    ///
    /// # Errors
    ///
    /// Any [`ChannelError`] the session raises.
    pub fn receive<H: ReceiveHandler + ?Sized>(
        &mut self,
        peer_id: u64,
        data: &[u8],
        now: Instant,
        handler: &mut H,
    ) -> Result<(), ChannelError> {
        for delivery in self.handle_datagram(peer_id, data, now)? {
            handler.on_receive(delivery);
        }
        Ok(())
    }

    /// Close the channel to a peer and drop anything queued for it
    pub fn close(&mut self, peer_id: u64, reason: Option<String>) {
        self.pending.remove(&peer_id);
        if let Some(mut session) = self.sessions.remove(&peer_id) {
            let mut out = SessionOutput::default();
            session.close(reason, &mut out);
            self.flush(peer_id, out.outgoing);
        }
    }

    /// Close every channel
    pub fn close_all(&mut self, reason: Option<&str>) {
        let peers: Vec<u64> = self.sessions.keys().copied().collect();
        for peer in peers {
            self.close(peer, reason.map(str::to_string));
        }
    }

    /// Expire handshakes and idle channels
    pub fn tick(&mut self, now: Instant) -> TickReport {
        let mut report = TickReport::default();

        let expired: Vec<u64> = self
            .sessions
            .iter()
            .filter(|(_, s)| s.handshake_expired(now, self.config.handshake_timeout))
            .map(|(&peer, _)| peer)
            .collect();
        for peer in expired {
            debug!(peer = %format_args!("{:016x}", peer), "handshake timed out");
            self.close(peer, None);
            report.unreachable.push(peer);
        }

        let timeout = self.config.handshake_timeout;
        self.sessions.retain(|&peer, session| {
            let stale = session.stale_expired(now, timeout);
            if stale {
                report.discarded.push(peer);
            }
            !stale
        });
        for peer in &report.discarded {
            self.pending.remove(peer);
        }

        let idle: Vec<u64> = self
            .sessions
            .iter()
            .filter(|(_, s)| s.idle_expired(now, self.config.idle_timeout))
            .map(|(&peer, _)| peer)
            .collect();
        for peer in idle {
            debug!(peer = %format_args!("{:016x}", peer), "closing idle channel");
            self.close(peer, Some("idle".to_string()));
            report.idle_closed.push(peer);
        }

        report
    }

    fn drain_pending(&mut self, peer_id: u64, now: Instant) -> Result<(), ChannelError> {
        let Some(queue) = self.pending.remove(&peer_id) else {
            return Ok(());
        };
        let Some(session) = self.sessions.get_mut(&peer_id) else {
            return Ok(());
        };

        let mut out = SessionOutput::default();
        for send in queue {
            session.send_data(send.component, send.sub_channel, send.payload, now, &mut out)?;
        }
        self.flush(peer_id, out.outgoing);
        Ok(())
    }

    fn flush(&mut self, peer_id: u64, datagrams: Vec<Vec<u8>>) {
        for datagram in datagrams {
            self.sink.send_datagram(peer_id, datagram);
        }
    }
}

impl<S: DatagramSink> std::fmt::Debug for ChannelManager<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelManager")
            .field("local_id", &format_args!("{:016x}", self.local_id))
            .field("sessions", &self.sessions.len())
            .finish_non_exhaustive()
    }
}
