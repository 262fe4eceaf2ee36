//! Bootstrap state machine.
//!
//! [`Bootstrapper`] owns the contact cache, the web caches, the retry
//! schedules and online detection. It performs no I/O: the second and
//! minute ticks return [`BootstrapAction`]s for the caller to execute, and
//! results of remote calls are fed back through `on_*` methods. All
//! mutation therefore happens on whichever loop owns the bootstrapper.

use crate::clock::Timestamp;
use crate::config::{BootstrapConfig, NetworkRole};
use crate::contacts::{Contact, ContactCache};
use crate::online::{OnlineDetector, ProbeOutcome};
use crate::retry::RetrySchedule;
use crate::webcache::{
    CacheOrigin, CacheRequest, CacheResponse, DEFAULT_PUBLISH_INTERVAL, RemoteCache, RequestKind,
    WebCacheSet,
};
use crate::DiscoveryError;
use lattice_core::packet::cache::{CachedContact, CachedWebCache};
use lattice_core::{ContactInfo, FirewallState, FrameView, PacketError, RootTag};
use rand::seq::SliceRandom;
use std::net::Ipv4Addr;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Spacing between publishes to any cache after a successful one
pub const PUBLISH_ANY_INTERVAL: Duration = Duration::from_secs(30 * 60);

/// This node's own reachability, announced in publish requests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalEndpoint {
    /// Node id
    pub peer_id: u64,
    /// Local IPv4 address, used when no cache has told us our public one
    pub ip: Ipv4Addr,
    /// TCP listen port
    pub tcp_port: u16,
    /// UDP listen port
    pub udp_port: u16,
}

/// A web-cache call to run off the owning loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebJob {
    /// Cache endpoint
    pub address: String,
    /// Cache access key
    pub access_key: Vec<u8>,
    /// Request line
    pub request: CacheRequest,
}

/// Work requested by a tick
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BootstrapAction {
    /// Send a UDP ping to a cached contact
    Ping(ContactInfo),
    /// Open an outbound TCP connection to a cached contact
    ConnectTcp(ContactInfo),
    /// Ask the global network to search for this operation's members
    GlobalSearch {
        /// Operation network id
        network_id: u64,
    },
    /// Call a web cache
    WebRequest(WebJob),
    /// Probe a well-known host for online detection
    Probe(String),
    /// Snapshot contacts and caches for persistence
    Save,
}

/// Bootstrap core state
#[derive(Debug)]
pub struct Bootstrapper {
    config: BootstrapConfig,
    local: LocalEndpoint,
    contacts: ContactCache,
    caches: WebCacheSet,
    retry: RetrySchedule,
    search_retry: RetrySchedule,
    online: OnlineDetector,
    firewall: FirewallState,
    responsive: bool,
    global_responsive: bool,
    next_query_any: Timestamp,
    next_publish_any: Timestamp,
    next_global_search: Timestamp,
    next_save: Timestamp,
}

impl Bootstrapper {
    /// Create a bootstrapper with the configured web caches
    ///
    /// # Errors
    ///
    /// Returns `DiscoveryError::InvalidConfig` or `InvalidUrl` if the
    /// configuration does not validate.
    pub fn new(
        config: BootstrapConfig,
        local: LocalEndpoint,
        now: Timestamp,
    ) -> Result<Self, DiscoveryError> {
        config.validate()?;

        let mut caches = WebCacheSet::new(config.max_web_caches, config.prune_gap);
        for seed in &config.web_caches {
            caches.add(RemoteCache::new(
                seed.address.clone(),
                seed.decode_key()?,
                CacheOrigin::Builtin,
                now,
            ));
        }

        Ok(Self {
            contacts: ContactCache::new(config.max_contacts),
            caches,
            retry: RetrySchedule::new(now),
            search_retry: RetrySchedule::new(now),
            online: OnlineDetector::new(config.probe_hosts.clone()),
            firewall: FirewallState::Open,
            responsive: false,
            global_responsive: false,
            next_query_any: Timestamp::ZERO,
            next_publish_any: now + PUBLISH_ANY_INTERVAL,
            next_global_search: Timestamp::ZERO,
            next_save: now + config.save_interval,
            config,
            local,
        })
    }

    /// Configuration
    #[must_use]
    pub fn config(&self) -> &BootstrapConfig {
        &self.config
    }

    /// Local endpoint
    #[must_use]
    pub fn local(&self) -> &LocalEndpoint {
        &self.local
    }

    /// Contact cache
    #[must_use]
    pub fn contacts(&self) -> &ContactCache {
        &self.contacts
    }

    /// Web caches
    #[must_use]
    pub fn web_caches(&self) -> &WebCacheSet {
        &self.caches
    }

    /// Main retry schedule
    #[must_use]
    pub fn retry(&self) -> &RetrySchedule {
        &self.retry
    }

    /// Online detector
    #[must_use]
    pub fn online(&self) -> &OnlineDetector {
        &self.online
    }

    /// Whether the network currently has confirmed contacts
    #[must_use]
    pub fn is_responsive(&self) -> bool {
        self.responsive
    }

    /// Update network liveness. Losing it restarts the retry schedule so
    /// rediscovery begins at the shortest interval.
    pub fn set_responsive(&mut self, responsive: bool, now: Timestamp) {
        if self.responsive && !responsive {
            debug!("network unresponsive, restarting bootstrap");
            self.retry.reset(now);
        }
        self.responsive = responsive;
    }

    /// Update our firewall classification
    pub fn set_firewall(&mut self, firewall: FirewallState) {
        self.firewall = firewall;
    }

    /// Whether the global network is usable for operation searches
    pub fn set_global_responsive(&mut self, responsive: bool) {
        self.global_responsive = responsive;
    }

    /// Learn a new web cache
    pub fn add_web_cache(
        &mut self,
        address: String,
        access_key: Vec<u8>,
        origin: CacheOrigin,
        now: Timestamp,
    ) -> bool {
        self.caches
            .add(RemoteCache::new(address, access_key, origin, now))
    }

    /// Record a packet received from `info`
    pub fn on_packet(&mut self, info: ContactInfo, firewall: FirewallState, now: Timestamp) {
        if self.contacts.upsert(info, firewall, now) {
            debug!(peer = %info.address, "new contact");
        }
    }

    /// Once-per-second work
    pub fn second_tick(&mut self, now: Timestamp) -> Vec<BootstrapAction> {
        let mut actions = Vec::new();

        if now >= self.next_save {
            self.next_save = now + self.config.save_interval;
            actions.push(BootstrapAction::Save);
        }

        if self.responsive {
            return actions;
        }

        self.retry.advance(now);
        match self.config.role {
            NetworkRole::Global => self.check_online(now, &mut actions),
            NetworkRole::Operation => self.search_global(now, &mut actions),
        }
        self.try_web_caches(now, &mut actions);
        self.try_contacts(now, &mut actions);

        actions
    }

    /// Once-per-minute work: one publish, pruning, pinging untried caches
    pub fn minute_tick(&mut self, now: Timestamp) -> Vec<BootstrapAction> {
        let mut actions = Vec::new();

        if now > self.next_publish_any {
            let address = self
                .caches
                .iter()
                .find(|c| now > c.next_publish)
                .map(|c| c.address.clone());
            if let Some(address) = address {
                actions.extend(self.publish(&address, now));
            }
        }

        for cache in self.caches.prune() {
            info!(address = %cache.address, "removed unresponsive web cache");
        }

        if self.online.think_online() {
            let network_id = self.config.network_id;
            if let Some(cache) = self.caches.iter_mut().find(|c| c.last_tried.is_none()) {
                cache.last_tried = Some(now);
                actions.push(BootstrapAction::WebRequest(WebJob {
                    address: cache.address.clone(),
                    access_key: cache.access_key.clone(),
                    request: CacheRequest::Ping { network_id },
                }));
            }
        }

        actions
    }

    /// Feed back the result of a web-cache call
    pub fn on_web_result(
        &mut self,
        address: &str,
        kind: RequestKind,
        result: Result<CacheResponse, DiscoveryError>,
        now: Timestamp,
    ) -> Vec<BootstrapAction> {
        let response = match result {
            Ok(response) => response,
            Err(e) => {
                warn!(address, kind = kind.name(), error = %e, "web cache request failed");
                return Vec::new();
            }
        };
        if self.caches.get(address).is_none() {
            return Vec::new();
        }

        match kind {
            RequestKind::Query => self.on_query(address, response, now),
            RequestKind::Publish => {
                self.next_publish_any = now + PUBLISH_ANY_INTERVAL;
                if let Some(cache) = self.caches.get_mut(address) {
                    cache.last_seen = Some(now);
                    cache.next_publish = now + response.publish_interval();
                }
                if response.load_low {
                    self.next_publish_any = now;
                }
                Vec::new()
            }
            RequestKind::Ping => {
                if response.pong {
                    if let Some(cache) = self.caches.get_mut(address) {
                        cache.last_seen = Some(now);
                    }
                }
                Vec::new()
            }
        }
    }

    fn on_query(
        &mut self,
        address: &str,
        response: CacheResponse,
        now: Timestamp,
    ) -> Vec<BootstrapAction> {
        self.next_query_any = now + self.config.query_spacing;
        for node in &response.nodes {
            self.contacts.upsert(*node, FirewallState::Open, now);
        }
        debug!(address, nodes = response.nodes.len(), "web cache query answered");

        if let Some(cache) = self.caches.get_mut(address) {
            cache.last_seen = Some(now);
            if response.remote_ip.is_some() {
                cache.remote_ip = response.remote_ip;
            }
            cache.next_publish = now + response.publish_interval();
        }

        if response.load_low {
            self.publish(address, now).into_iter().collect()
        } else {
            Vec::new()
        }
    }

    /// Feed back a liveness probe result
    pub fn on_probe_result(&mut self, success: bool, now: Timestamp) -> Vec<BootstrapAction> {
        match self.online.record(success) {
            ProbeOutcome::Steady => Vec::new(),
            ProbeOutcome::Reconnected => {
                self.reset(now);
                Vec::new()
            }
            ProbeOutcome::Retry(host) => vec![BootstrapAction::Probe(host)],
        }
    }

    /// Make every schedule retry immediately
    pub fn reset(&mut self, now: Timestamp) {
        self.retry.reset(now);
        self.search_retry.reset(now);
        self.next_query_any = Timestamp::ZERO;
        for cache in self.caches.iter_mut() {
            cache.next_query = now;
            cache.next_publish = now + DEFAULT_PUBLISH_INTERVAL;
        }
        self.contacts.reset_retry_timers();
    }

    /// Contacts as persistable packets, in random order
    #[must_use]
    pub fn export_contacts(&self) -> Vec<CachedContact> {
        let mut out: Vec<CachedContact> = self.contacts.iter().map(Contact::to_cached).collect();
        out.shuffle(&mut rand::thread_rng());
        out
    }

    /// Web caches as persistable packets, in random order
    #[must_use]
    pub fn export_web_caches(&self) -> Vec<CachedWebCache> {
        let mut out: Vec<CachedWebCache> = self.caches.iter().map(RemoteCache::to_cached).collect();
        out.shuffle(&mut rand::thread_rng());
        out
    }

    /// Restore one persisted `CachedContact` or `CachedWebCache` packet
    ///
    /// # Errors
    ///
    /// Returns a [`PacketError`] for malformed data or another root tag.
    pub fn restore(&mut self, data: &[u8], now: Timestamp) -> Result<(), PacketError> {
        let tag = FrameView::parse(data)?.tag();
        match RootTag::try_from(tag)? {
            RootTag::CachedContact => {
                let cached = CachedContact::decode(data)?;
                self.contacts.insert(Contact::from_cached(&cached));
            }
            RootTag::CachedWebCache => {
                let cached = CachedWebCache::decode(data)?;
                self.caches.add(RemoteCache::from_cached(&cached, now));
            }
            _ => return Err(PacketError::UnexpectedRoot(tag)),
        }
        Ok(())
    }

    fn check_online(&mut self, now: Timestamp, actions: &mut Vec<BootstrapAction>) {
        if let Some(host) = self.online.poll(now) {
            actions.push(BootstrapAction::Probe(host));
        }
    }

    fn search_global(&mut self, now: Timestamp, actions: &mut Vec<BootstrapAction>) {
        if !self.global_responsive {
            return;
        }
        self.search_retry.advance(now);
        if now > self.next_global_search {
            self.next_global_search = self.search_retry.next_try(now);
            actions.push(BootstrapAction::GlobalSearch {
                network_id: self.config.network_id,
            });
        }
    }

    fn try_web_caches(&mut self, now: Timestamp, actions: &mut Vec<BootstrapAction>) {
        let allowed =
            self.contacts.is_empty() || now > self.retry.start() + self.config.web_query_delay;
        if !allowed || now <= self.next_query_any {
            return;
        }

        let online = self.online.think_online();
        let next_try = self.retry.next_try(now);
        let network_id = self.config.network_id;
        for cache in self.caches.iter_mut() {
            if now <= cache.next_query {
                continue;
            }
            if online {
                cache.last_tried = Some(now);
            }
            cache.next_query = next_try;
            actions.push(BootstrapAction::WebRequest(WebJob {
                address: cache.address.clone(),
                access_key: cache.access_key.clone(),
                request: CacheRequest::Query { network_id },
            }));
        }
    }

    fn try_contacts(&mut self, now: Timestamp, actions: &mut Vec<BootstrapAction>) {
        let next_try = self.retry.next_try(now);
        for contact in self
            .contacts
            .take_udp_due(now, self.config.pings_per_tick, next_try)
        {
            actions.push(BootstrapAction::Ping(contact));
        }

        if self.firewall == FirewallState::Blocked {
            if let Some(contact) = self.contacts.take_proxy_due(now, next_try) {
                actions.push(BootstrapAction::ConnectTcp(contact));
            }
        }
    }

    fn publish(&mut self, address: &str, now: Timestamp) -> Option<BootstrapAction> {
        let online = self.online.think_online();
        let local = self.local;
        let network_id = self.config.network_id;
        let cache = self.caches.get_mut(address)?;

        if online {
            cache.last_tried = Some(now);
        }
        cache.next_publish = now + DEFAULT_PUBLISH_INTERVAL;

        Some(BootstrapAction::WebRequest(WebJob {
            address: cache.address.clone(),
            access_key: cache.access_key.clone(),
            request: CacheRequest::Publish {
                network_id,
                peer_id: local.peer_id,
                ip: cache.remote_ip.unwrap_or(local.ip),
                tcp_port: local.tcp_port,
                udp_port: local.udp_port,
            },
        }))
    }
}
