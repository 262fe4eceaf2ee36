//! Bootstrap and UPnP configuration.

use crate::DiscoveryError;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::time::Duration;

/// SSDP multicast group and port
pub const SSDP_MULTICAST: SocketAddr =
    SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::new(239, 255, 255, 250), 1900));

/// Which network a bootstrapper serves
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkRole {
    /// The shared lookup network; runs online detection
    #[default]
    Global,
    /// A private operation network; also asks the global network to search
    /// for its members
    Operation,
}

/// A web cache known at startup
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebCacheSeed {
    /// Endpoint URL
    pub address: String,
    /// Pre-shared access key, base64
    pub access_key: String,
}

impl WebCacheSeed {
    /// Raw access key bytes
    ///
    /// # Errors
    ///
    /// Returns `DiscoveryError::InvalidConfig` if the key is not base64.
    pub fn decode_key(&self) -> Result<Vec<u8>, DiscoveryError> {
        STANDARD.decode(self.access_key.trim()).map_err(|e| {
            DiscoveryError::InvalidConfig(format!("access key for {}: {e}", self.address))
        })
    }
}

/// Bootstrap configuration
#[derive(Debug, Clone)]
pub struct BootstrapConfig {
    /// Network id sent in web-cache requests and global searches
    pub network_id: u64,
    /// Network role
    pub role: NetworkRole,
    /// Contact cache bound
    pub max_contacts: usize,
    /// Web cache set bound
    pub max_web_caches: usize,
    /// Caches unanswered for more whole days than this are dropped
    pub prune_gap: Duration,
    /// UDP pings per second while bootstrapping
    pub pings_per_tick: usize,
    /// Grace period after a retry reset before web caches are queried,
    /// unless the contact cache is empty
    pub web_query_delay: Duration,
    /// Minimum spacing between successful queries to any cache
    pub query_spacing: Duration,
    /// Interval between persistence snapshots
    pub save_interval: Duration,
    /// Timeout for one web-cache request
    pub web_timeout: Duration,
    /// Timeout for one liveness probe
    pub probe_timeout: Duration,
    /// Hosts (`host:port`) probed for online detection
    pub probe_hosts: Vec<String>,
    /// Web caches added at startup
    pub web_caches: Vec<WebCacheSeed>,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            network_id: 0,
            role: NetworkRole::Global,
            max_contacts: crate::contacts::MAX_CONTACTS,
            max_web_caches: crate::webcache::MAX_WEB_CACHES,
            prune_gap: crate::webcache::PRUNE_GAP,
            pings_per_tick: 10,
            web_query_delay: Duration::from_secs(5),
            query_spacing: Duration::from_secs(10),
            save_interval: Duration::from_secs(5 * 60),
            web_timeout: Duration::from_secs(30),
            probe_timeout: Duration::from_secs(5),
            probe_hosts: vec![
                "www.wikipedia.org:80".to_string(),
                "www.debian.org:80".to_string(),
                "www.kernel.org:80".to_string(),
                "www.rust-lang.org:80".to_string(),
            ],
            web_caches: Vec::new(),
        }
    }
}

impl BootstrapConfig {
    /// Check bounds and probe host syntax
    ///
    /// # Errors
    ///
    /// Returns `DiscoveryError::InvalidConfig` describing the first problem.
    pub fn validate(&self) -> Result<(), DiscoveryError> {
        if self.max_contacts == 0 {
            return Err(DiscoveryError::InvalidConfig(
                "max_contacts must be at least 1".to_string(),
            ));
        }
        if self.max_web_caches == 0 {
            return Err(DiscoveryError::InvalidConfig(
                "max_web_caches must be at least 1".to_string(),
            ));
        }
        if self.role == NetworkRole::Global && self.probe_hosts.is_empty() {
            return Err(DiscoveryError::InvalidConfig(
                "a global bootstrapper needs at least one probe host".to_string(),
            ));
        }
        for host in &self.probe_hosts {
            if !host.contains(':') {
                return Err(DiscoveryError::InvalidConfig(format!(
                    "probe host {host} must be host:port"
                )));
            }
        }
        for seed in &self.web_caches {
            url::Url::parse(&seed.address)?;
            let key = seed.decode_key()?;
            if key.len() != lattice_crypto::webcache::ACCESS_KEY_SIZE {
                return Err(DiscoveryError::InvalidConfig(format!(
                    "access key for {} must be {} bytes",
                    seed.address,
                    lattice_crypto::webcache::ACCESS_KEY_SIZE
                )));
            }
        }
        Ok(())
    }
}

/// UPnP configuration
#[derive(Debug, Clone)]
pub struct UpnpConfig {
    /// Wait for one SSDP response per interface
    pub search_timeout: Duration,
    /// Timeout for description fetches and SOAP calls
    pub http_timeout: Duration,
    /// Port mapping description shown in the router UI
    pub description: String,
    /// Pending actions before new ones are refused
    pub queue_capacity: usize,
    /// Where SSDP searches are sent
    pub ssdp_target: SocketAddr,
    /// Interfaces to search from; `None` means every non-loopback IPv4 interface
    pub interfaces: Option<Vec<Ipv4Addr>>,
}

impl Default for UpnpConfig {
    fn default() -> Self {
        Self {
            search_timeout: Duration::from_secs(3),
            http_timeout: Duration::from_secs(10),
            description: "Lattice".to_string(),
            queue_capacity: 16,
            ssdp_target: SSDP_MULTICAST,
            interfaces: None,
        }
    }
}
