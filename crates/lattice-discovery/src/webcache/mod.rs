//! Remote web caches.
//!
//! A web cache is an HTTP rendezvous point that remembers recently
//! published nodes of a network. Requests are single lines:
//!
//! ```text
//! query:<network_id>
//! publish:<network_id>/<peer_id>/<ip>/<tcp>/<udp>
//! ping:<network_id>
//! ```
//!
//! Decrypted responses are newline-separated `node:id/ip/tcp/udp`,
//! `remoteip:ip`, `timeout:minutes`, `load:low` or `pong` lines.

pub mod client;

pub use client::WebCacheClient;

use crate::clock::Timestamp;
use lattice_core::packet::cache::CachedWebCache;
use lattice_core::{ContactInfo, PeerAddress};
use std::fmt;
use std::net::Ipv4Addr;
use std::time::Duration;
use tracing::debug;

/// Default size bound of the cache set
pub const MAX_WEB_CACHES: usize = 20;

/// Caches tried more than this many whole days after they last answered are dropped
pub const PRUNE_GAP: Duration = Duration::from_secs(5 * 24 * 60 * 60);

const DAY_MS: i64 = 24 * 60 * 60 * 1000;

/// Publish interval used until a cache states its own
pub const DEFAULT_PUBLISH_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Floor for the publish interval a cache may request
pub const MIN_PUBLISH_INTERVAL: Duration = Duration::from_secs(15 * 60);

/// Where a cache entry came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CacheOrigin {
    /// Configured at startup
    #[default]
    Builtin,
    /// Learned from an invite or restored from disk
    Learned,
}

/// One remote web cache
#[derive(Debug, Clone)]
pub struct RemoteCache {
    /// Endpoint URL
    pub address: String,
    /// Pre-shared access key
    pub access_key: Vec<u8>,
    /// Last successful response
    pub last_seen: Option<Timestamp>,
    /// Last request made while we believed we were online
    pub last_tried: Option<Timestamp>,
    /// Earliest next query
    pub next_query: Timestamp,
    /// Earliest next publish
    pub next_publish: Timestamp,
    /// Our address as seen by the cache
    pub remote_ip: Option<Ipv4Addr>,
    /// Provenance
    pub origin: CacheOrigin,
}

impl PartialEq for RemoteCache {
    fn eq(&self, other: &Self) -> bool {
        self.address == other.address && self.access_key == other.access_key
    }
}

impl Eq for RemoteCache {}

impl RemoteCache {
    /// New cache; queryable now, first publish an hour out
    #[must_use]
    pub fn new(address: String, access_key: Vec<u8>, origin: CacheOrigin, now: Timestamp) -> Self {
        Self {
            address,
            access_key,
            last_seen: None,
            last_tried: None,
            next_query: Timestamp::ZERO,
            next_publish: now + DEFAULT_PUBLISH_INTERVAL,
            remote_ip: None,
            origin,
        }
    }

    /// `last_tried - last_seen` in milliseconds; "never" counts as the epoch
    #[must_use]
    pub fn unresponsive_gap(&self) -> i64 {
        self.last_tried
            .unwrap_or(Timestamp::ZERO)
            .millis_since(self.last_seen.unwrap_or(Timestamp::ZERO))
    }

    /// Persisted form
    #[must_use]
    pub fn to_cached(&self) -> CachedWebCache {
        CachedWebCache {
            address: self.address.clone(),
            access_key: self.access_key.clone(),
            last_seen: self.last_seen.map(Timestamp::as_millis),
            last_tried: self.last_tried.map(Timestamp::as_millis),
        }
    }

    /// Restore from the persisted form
    #[must_use]
    pub fn from_cached(cached: &CachedWebCache, now: Timestamp) -> Self {
        let mut cache = Self::new(
            cached.address.clone(),
            cached.access_key.clone(),
            CacheOrigin::Learned,
            now,
        );
        cache.last_seen = cached.last_seen.map(Timestamp::from_millis);
        cache.last_tried = cached.last_tried.map(Timestamp::from_millis);
        cache
    }
}

/// Bounded set of remote caches
#[derive(Debug, Clone)]
pub struct WebCacheSet {
    caches: Vec<RemoteCache>,
    max_caches: usize,
    prune_gap: Duration,
}

impl Default for WebCacheSet {
    fn default() -> Self {
        Self::new(MAX_WEB_CACHES, PRUNE_GAP)
    }
}

impl WebCacheSet {
    /// Empty set
    #[must_use]
    pub fn new(max_caches: usize, prune_gap: Duration) -> Self {
        Self {
            caches: Vec::new(),
            max_caches,
            prune_gap,
        }
    }

    /// Add a cache unless one with the same address and key exists.
    /// Returns `true` if added.
    pub fn add(&mut self, cache: RemoteCache) -> bool {
        if self.caches.contains(&cache) {
            return false;
        }
        self.caches.push(cache);
        true
    }

    /// Drop unresponsive caches.
    ///
    /// Repeatedly picks the cache with the largest `last_tried - last_seen`
    /// gap (later entries win ties) and removes it while that gap, counted in
    /// whole days, exceeds the prune gap's whole days or the set is over its
    /// bound. With the default gap a cache goes after six full days.
    pub fn prune(&mut self) -> Vec<RemoteCache> {
        let limit_days = i64::try_from(self.prune_gap.as_secs() / 86_400).unwrap_or(i64::MAX);
        let mut removed = Vec::new();

        loop {
            let mut worst: Option<(usize, i64)> = None;
            for (index, cache) in self.caches.iter().enumerate() {
                let gap = cache.unresponsive_gap();
                if gap >= worst.map_or(0, |(_, g)| g) {
                    worst = Some((index, gap));
                }
            }

            let Some((index, gap)) = worst else {
                break;
            };
            if gap / DAY_MS > limit_days || self.caches.len() > self.max_caches {
                let cache = self.caches.remove(index);
                debug!(address = %cache.address, gap_ms = gap, "dropping web cache");
                removed.push(cache);
            } else {
                break;
            }
        }

        removed
    }

    /// Look up by address
    #[must_use]
    pub fn get(&self, address: &str) -> Option<&RemoteCache> {
        self.caches.iter().find(|c| c.address == address)
    }

    /// Mutable lookup by address
    pub fn get_mut(&mut self, address: &str) -> Option<&mut RemoteCache> {
        self.caches.iter_mut().find(|c| c.address == address)
    }

    /// All caches in insertion order
    pub fn iter(&self) -> impl Iterator<Item = &RemoteCache> {
        self.caches.iter()
    }

    /// Mutable iteration
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut RemoteCache> {
        self.caches.iter_mut()
    }

    /// Number of caches
    #[must_use]
    pub fn len(&self) -> usize {
        self.caches.len()
    }

    /// Whether the set is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.caches.is_empty()
    }
}

/// Request kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestKind {
    /// Ask for nodes
    Query,
    /// Announce ourselves
    Publish,
    /// Liveness check
    Ping,
}

impl RequestKind {
    /// Request verb
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Query => "query",
            Self::Publish => "publish",
            Self::Ping => "ping",
        }
    }
}

/// One web-cache request line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheRequest {
    /// `query:<network_id>`
    Query {
        /// Network id
        network_id: u64,
    },
    /// `publish:<network_id>/<peer_id>/<ip>/<tcp>/<udp>`
    Publish {
        /// Network id
        network_id: u64,
        /// Our node id
        peer_id: u64,
        /// Our public address
        ip: Ipv4Addr,
        /// TCP listen port
        tcp_port: u16,
        /// UDP listen port
        udp_port: u16,
    },
    /// `ping:<network_id>`
    Ping {
        /// Network id
        network_id: u64,
    },
}

impl CacheRequest {
    /// Which kind of request this is
    #[must_use]
    pub fn kind(&self) -> RequestKind {
        match self {
            Self::Query { .. } => RequestKind::Query,
            Self::Publish { .. } => RequestKind::Publish,
            Self::Ping { .. } => RequestKind::Ping,
        }
    }
}

impl fmt::Display for CacheRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Query { network_id } => write!(f, "query:{network_id}"),
            Self::Publish {
                network_id,
                peer_id,
                ip,
                tcp_port,
                udp_port,
            } => write!(f, "publish:{network_id}/{peer_id}/{ip}/{tcp_port}/{udp_port}"),
            Self::Ping { network_id } => write!(f, "ping:{network_id}"),
        }
    }
}

/// Decoded response body
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CacheResponse {
    /// `node:` lines
    pub nodes: Vec<ContactInfo>,
    /// `remoteip:` line
    pub remote_ip: Option<Ipv4Addr>,
    /// `timeout:` line, minutes
    pub timeout_minutes: Option<f64>,
    /// `load:low` seen
    pub load_low: bool,
    /// `pong` seen
    pub pong: bool,
}

impl CacheResponse {
    /// Parse decrypted response text. Unrecognised or malformed lines are skipped.
    #[must_use]
    pub fn parse(text: &str) -> Self {
        let mut response = Self::default();

        for line in text.lines().map(str::trim) {
            if let Some(node) = line.strip_prefix("node:") {
                match parse_node(node) {
                    Some(contact) => response.nodes.push(contact),
                    None => debug!(line, "skipping malformed node line"),
                }
            } else if let Some(ip) = line.strip_prefix("remoteip:") {
                response.remote_ip = ip.trim().parse().ok();
            } else if let Some(minutes) = line.strip_prefix("timeout:") {
                response.timeout_minutes = minutes
                    .trim()
                    .parse::<f64>()
                    .ok()
                    .filter(|m| m.is_finite());
            } else if line.starts_with("load:low") {
                response.load_low = true;
            } else if line.starts_with("pong") {
                response.pong = true;
            }
        }

        response
    }

    /// Interval until the next publish to this cache: the stated timeout,
    /// but never below fifteen minutes
    #[must_use]
    pub fn publish_interval(&self) -> Duration {
        let floor = MIN_PUBLISH_INTERVAL.as_secs_f64();
        let stated = self.timeout_minutes.unwrap_or(0.0) * 60.0;
        Duration::from_secs_f64(stated.clamp(floor, f64::from(u32::MAX)))
    }
}

fn parse_node(text: &str) -> Option<ContactInfo> {
    let mut parts = text.trim().split('/');
    let peer_id = parts.next()?.parse().ok()?;
    let ip = parts.next()?.parse().ok()?;
    let tcp_port = parts.next()?.parse().ok()?;
    let udp_port = parts.next()?.parse().ok()?;
    Some(ContactInfo {
        address: PeerAddress::new(peer_id, ip, udp_port),
        tcp_port,
        client_id: 0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const DAY: i64 = 24 * 60 * 60 * 1000;

    fn cache(name: &str, seen: Option<i64>, tried: Option<i64>) -> RemoteCache {
        let mut cache = RemoteCache::new(
            format!("http://{name}.example.net/cache"),
            vec![1; 32],
            CacheOrigin::Builtin,
            Timestamp::ZERO,
        );
        cache.last_seen = seen.map(Timestamp::from_millis);
        cache.last_tried = tried.map(Timestamp::from_millis);
        cache
    }

    #[test]
    fn test_prune_removes_stale_keeps_recent() {
        let t = 100 * DAY;
        let mut set = WebCacheSet::default();
        set.add(cache("a", Some(t), Some(t + 6 * DAY)));
        set.add(cache("b", Some(t), Some(t + DAY)));

        let removed = set.prune();
        assert_eq!(removed.len(), 1);
        assert!(removed[0].address.contains("a."));
        assert_eq!(set.len(), 1);
        assert!(set.iter().next().unwrap().address.contains("b."));
    }

    #[test]
    fn test_prune_over_capacity_prefers_later_ties() {
        let mut set = WebCacheSet::new(2, PRUNE_GAP);
        set.add(cache("a", None, None));
        set.add(cache("b", None, None));
        set.add(cache("c", None, None));

        let removed = set.prune();
        assert_eq!(removed.len(), 1);
        assert!(removed[0].address.contains("c."));
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_prune_ignores_negative_gaps() {
        let mut set = WebCacheSet::new(1, PRUNE_GAP);
        set.add(cache("a", Some(10 * DAY), Some(DAY)));
        set.add(cache("b", Some(10 * DAY), Some(2 * DAY)));

        // Both answered after their last try; nothing qualifies
        assert!(set.prune().is_empty());
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_exactly_five_days_kept() {
        let mut set = WebCacheSet::default();
        set.add(cache("a", Some(DAY), Some(6 * DAY)));
        assert!(set.prune().is_empty());
    }

    #[test]
    fn test_prune_counts_whole_days() {
        let hour = DAY / 24;
        let mut set = WebCacheSet::default();
        set.add(cache("partial", Some(0), Some(5 * DAY + 23 * hour)));
        set.add(cache("sixth", Some(0), Some(6 * DAY)));

        let removed = set.prune();
        assert_eq!(removed.len(), 1);
        assert!(removed[0].address.contains("sixth."));
        assert!(set.get("http://partial.example.net/cache").is_some());
    }

    #[test]
    fn test_add_dedupes_on_address_and_key() {
        let mut set = WebCacheSet::default();
        assert!(set.add(cache("a", None, None)));
        assert!(!set.add(cache("a", Some(5), None)));

        let mut other_key = cache("a", None, None);
        other_key.access_key = vec![2; 32];
        assert!(set.add(other_key));
    }

    #[test]
    fn test_request_lines() {
        assert_eq!(CacheRequest::Query { network_id: 7 }.to_string(), "query:7");
        assert_eq!(CacheRequest::Ping { network_id: 0 }.to_string(), "ping:0");
        let publish = CacheRequest::Publish {
            network_id: 7,
            peer_id: 42,
            ip: Ipv4Addr::new(203, 0, 113, 7),
            tcp_port: 6881,
            udp_port: 6882,
        };
        assert_eq!(publish.to_string(), "publish:7/42/203.0.113.7/6881/6882");
        assert_eq!(publish.kind().name(), "publish");
    }

    #[test]
    fn test_parse_response() {
        let text = "node:42/198.51.100.4/6881/6882\nnode:bad\nremoteip:203.0.113.9\ntimeout:20\nload:low\n";
        let response = CacheResponse::parse(text);

        assert_eq!(response.nodes.len(), 1);
        assert_eq!(response.nodes[0].address.peer_id, 42);
        assert_eq!(response.nodes[0].address.udp_port, 6882);
        assert_eq!(response.nodes[0].tcp_port, 6881);
        assert_eq!(response.remote_ip, Some(Ipv4Addr::new(203, 0, 113, 9)));
        assert!(response.load_low);
        assert!(!response.pong);
        assert_eq!(response.publish_interval(), Duration::from_secs(20 * 60));
    }

    #[test]
    fn test_publish_interval_floor() {
        let response = CacheResponse::parse("timeout:3");
        assert_eq!(response.publish_interval(), MIN_PUBLISH_INTERVAL);
        assert_eq!(CacheResponse::parse("").publish_interval(), MIN_PUBLISH_INTERVAL);
        assert!(CacheResponse::parse("pong").pong);
    }

    #[test]
    fn test_cached_roundtrip() {
        let original = cache("a", Some(5), Some(9));
        let restored = RemoteCache::from_cached(&original.to_cached(), Timestamp::ZERO);
        assert_eq!(restored, original);
        assert_eq!(restored.last_seen, original.last_seen);
        assert_eq!(restored.last_tried, original.last_tried);
    }
}
