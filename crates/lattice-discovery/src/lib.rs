//! # Lattice Discovery
//!
//! Finding the network again after startup or an outage.
//!
//! This crate provides:
//! - A bounded contact cache with per-contact retry timers
//! - Expanding retry intervals (`0, 1, 2, 5, 10, 15, 30` minutes)
//! - Encrypted query/publish/ping calls to remote web caches
//! - Online detection with a hysteresis counter
//! - A tokio driver that runs the bootstrap core on a second/minute scheduler
//! - UPnP IGD port mapping on a single-worker action queue
//!
//! ## Example
//!
//! ```rust
//! use lattice_discovery::{BootstrapAction, BootstrapConfig, Bootstrapper, LocalEndpoint, Timestamp};
//! use std::net::Ipv4Addr;
//!
//! let local = LocalEndpoint {
//!     peer_id: 42,
//!     ip: Ipv4Addr::new(192, 168, 1, 20),
//!     tcp_port: 6881,
//!     udp_port: 6881,
//! };
//! let now = Timestamp::now();
//! let mut boot = Bootstrapper::new(BootstrapConfig::default(), local, now).unwrap();
//!
//! // Nothing is known yet, so the first tick probes for connectivity
//! let actions = boot.second_tick(now + std::time::Duration::from_secs(1));
//! assert!(actions.iter().any(|a| matches!(a, BootstrapAction::Probe(_))));
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod bootstrap;
pub mod clock;
pub mod config;
pub mod contacts;
pub mod driver;
pub mod error;
pub mod online;
pub mod retry;
pub mod upnp;
pub mod webcache;

pub use bootstrap::{BootstrapAction, Bootstrapper, LocalEndpoint, WebJob};
pub use clock::Timestamp;
pub use config::{BootstrapConfig, NetworkRole, UpnpConfig, WebCacheSeed};
pub use contacts::{Contact, ContactCache};
pub use driver::{BootstrapDriver, DriverCommand, DriverHandle, NetworkHooks};
pub use error::{DiscoveryError, UpnpError};
pub use online::OnlineDetector;
pub use retry::RetrySchedule;
pub use upnp::{UpnpAction, UpnpEvent, UpnpHandler};
pub use webcache::{CacheRequest, CacheResponse, RemoteCache, WebCacheClient, WebCacheSet};
