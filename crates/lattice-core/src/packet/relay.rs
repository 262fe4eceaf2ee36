//! Helpers for nodes that relay network packets for others.

use super::PeerAddress;
use super::network::{NetworkPacket, SearchAck, SearchRequest, StoreRequest};
use super::DhtSource;
use std::collections::{HashSet, VecDeque};
use tracing::debug;

/// Storage contract the DHT layer provides
pub trait DhtStore {
    /// All values stored under `key` for `component`
    fn lookup(&self, key: u64, component: u16) -> Vec<Vec<u8>>;

    /// Store `value` under `key` with a remaining hop budget of `ttl`
    fn store(&mut self, key: u64, component: u16, value: Vec<u8>, ttl: u16);
}

/// Next-hop copy of a store request, or `None` once its TTL is spent
#[must_use]
pub fn forward_store(request: &StoreRequest) -> Option<StoreRequest> {
    if request.ttl == 0 {
        return None;
    }
    Some(StoreRequest {
        ttl: request.ttl - 1,
        ..request.clone()
    })
}

/// Store locally, then return the copy to forward, if any
pub fn apply_store<S: DhtStore + ?Sized>(
    store: &mut S,
    request: &StoreRequest,
) -> Option<StoreRequest> {
    store.store(
        request.key,
        request.component,
        request.value.clone(),
        request.ttl,
    );

    let next = forward_store(request);
    if next.is_none() {
        debug!(key = request.key, "store ttl expired, not forwarding");
    }
    next
}

/// Answer a search from local storage
#[must_use]
pub fn answer_search<S: DhtStore + ?Sized>(
    store: &S,
    local: DhtSource,
    request: &SearchRequest,
) -> SearchAck {
    SearchAck {
        source: local,
        search_id: request.search_id,
        proxied: false,
        contacts: Vec::new(),
        values: store.lookup(request.target, request.component),
        component: Some(request.component),
    }
}

/// Rewrite a packet a proxied client asked us to send on its behalf.
///
/// Returns the destination and the envelope to send there, with `to`
/// cleared and `from` naming the client. `None` if the packet has no `to`.
#[must_use]
pub fn forward_for_client(
    packet: &NetworkPacket,
    client: PeerAddress,
) -> Option<(PeerAddress, NetworkPacket)> {
    let destination = packet.to?;
    let forwarded = NetworkPacket {
        to: None,
        from: Some(client),
        ..packet.clone()
    };
    Some((destination, forwarded))
}

/// Rewrite a packet received for a proxied client so it can be handed on,
/// recording who originally sent it.
#[must_use]
pub fn deliver_to_client(packet: &NetworkPacket, origin: PeerAddress) -> NetworkPacket {
    NetworkPacket {
        to: None,
        from: Some(origin),
        ..packet.clone()
    }
}

/// Tracks searches a proxied client has ended, so the relay stops forwarding
/// matches for them. Memory is bounded; the oldest ids are forgotten first.
#[derive(Debug)]
pub struct ProxySearchFilter {
    ended: HashSet<u32>,
    order: VecDeque<u32>,
    capacity: usize,
}

impl ProxySearchFilter {
    /// Default number of remembered ids
    pub const DEFAULT_CAPACITY: usize = 256;

    /// Create a filter remembering at most `capacity` ended searches
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            ended: HashSet::new(),
            order: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    /// Whether `request` should be forwarded.
    ///
    /// A request carrying `end_proxy_search` is recorded and not forwarded.
    pub fn should_forward(&mut self, request: &SearchRequest) -> bool {
        if request.end_proxy_search {
            self.end(request.search_id);
            return false;
        }
        !self.ended.contains(&request.search_id)
    }

    /// Record `search_id` as ended
    pub fn end(&mut self, search_id: u32) {
        if !self.ended.insert(search_id) {
            return;
        }
        self.order.push_back(search_id);
        while self.order.len() > self.capacity {
            if let Some(old) = self.order.pop_front() {
                self.ended.remove(&old);
            }
        }
    }

    /// Number of remembered ids
    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Whether no ids are remembered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

impl Default for ProxySearchFilter {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CAPACITY)
    }
}
