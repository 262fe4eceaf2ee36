//! Configuration file for the Lattice CLI.
//!
//! The TOML sections map onto the library configs: `[node]` becomes the
//! [`LocalEndpoint`], `[bootstrap]` the [`BootstrapConfig`], `[upnp]` the
//! [`UpnpConfig`] and `[channel]` the [`ChannelConfig`].

use lattice_core::{ChannelConfig, KeyExchange};
use lattice_discovery::{BootstrapConfig, LocalEndpoint, NetworkRole, UpnpConfig, WebCacheSeed};
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Lattice configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Local node identity and ports
    pub node: NodeConfig,
    /// Bootstrap cache settings
    pub bootstrap: BootstrapSection,
    /// UPnP port mapping
    pub upnp: UpnpSection,
    /// Channel handshake
    pub channel: ChannelSection,
    /// Logging
    pub logging: LoggingConfig,
}

/// Node configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Node id; `config init` fills in a random one
    #[serde(default)]
    pub peer_id: u64,
    /// Address published to web caches until one reports our public IP
    #[serde(default = "default_address")]
    pub address: String,
    /// TCP listen port
    #[serde(default = "default_port")]
    pub tcp_port: u16,
    /// UDP listen port
    #[serde(default = "default_port")]
    pub udp_port: u16,
    /// Name advertised during key exchange
    #[serde(default)]
    pub name: String,
}

/// Bootstrap configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BootstrapSection {
    /// Network id
    #[serde(default)]
    pub network_id: u64,
    /// `global` or `operation`
    #[serde(default)]
    pub role: NetworkRole,
    /// Contact cache bound
    #[serde(default = "default_max_contacts")]
    pub max_contacts: usize,
    /// Web cache bound
    #[serde(default = "default_max_web_caches")]
    pub max_web_caches: usize,
    /// UDP pings per second while bootstrapping
    #[serde(default = "default_pings_per_tick")]
    pub pings_per_tick: usize,
    /// Web-cache request timeout in seconds
    #[serde(default = "default_web_timeout")]
    pub web_timeout_secs: u64,
    /// Liveness probe timeout in seconds
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_secs: u64,
    /// Hosts probed for online detection
    #[serde(default = "default_probe_hosts")]
    pub probe_hosts: Vec<String>,
    /// Web caches known at startup
    #[serde(default)]
    pub web_caches: Vec<WebCacheSeed>,
    /// Where cache snapshots are written
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_file: Option<PathBuf>,
}

/// UPnP configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpnpSection {
    /// Map the listen ports on startup
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Mapping description shown by the router
    #[serde(default = "default_description")]
    pub description: String,
    /// SSDP wait per interface in seconds
    #[serde(default = "default_search_timeout")]
    pub search_timeout_secs: u64,
    /// SOAP call timeout in seconds
    #[serde(default = "default_http_timeout")]
    pub http_timeout_secs: u64,
    /// Interfaces to search from; empty means all
    #[serde(default)]
    pub interfaces: Vec<String>,
}

/// Channel configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelSection {
    /// Handshake timeout in seconds
    #[serde(default = "default_handshake_timeout")]
    pub handshake_timeout_secs: u64,
    /// Idle channels are closed after this many seconds
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,
    /// Reliable sends queued per peer during a handshake
    #[serde(default = "default_max_pending")]
    pub max_pending: usize,
    /// `session` or `key`
    #[serde(default = "default_key_exchange")]
    pub key_exchange: String,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,
}

// Default values

fn default_address() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    6881
}

fn default_true() -> bool {
    true
}

fn default_max_contacts() -> usize {
    lattice_discovery::contacts::MAX_CONTACTS
}

fn default_max_web_caches() -> usize {
    lattice_discovery::webcache::MAX_WEB_CACHES
}

fn default_pings_per_tick() -> usize {
    10
}

fn default_web_timeout() -> u64 {
    30
}

fn default_probe_timeout() -> u64 {
    5
}

fn default_probe_hosts() -> Vec<String> {
    BootstrapConfig::default().probe_hosts
}

fn default_description() -> String {
    "Lattice".to_string()
}

fn default_search_timeout() -> u64 {
    3
}

fn default_http_timeout() -> u64 {
    10
}

fn default_handshake_timeout() -> u64 {
    20
}

fn default_idle_timeout() -> u64 {
    180
}

fn default_max_pending() -> usize {
    64
}

fn default_key_exchange() -> String {
    "session".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            peer_id: 0,
            address: default_address(),
            tcp_port: default_port(),
            udp_port: default_port(),
            name: String::new(),
        }
    }
}

impl Default for BootstrapSection {
    fn default() -> Self {
        Self {
            network_id: 0,
            role: NetworkRole::Global,
            max_contacts: default_max_contacts(),
            max_web_caches: default_max_web_caches(),
            pings_per_tick: default_pings_per_tick(),
            web_timeout_secs: default_web_timeout(),
            probe_timeout_secs: default_probe_timeout(),
            probe_hosts: default_probe_hosts(),
            web_caches: Vec::new(),
            cache_file: None,
        }
    }
}

impl Default for UpnpSection {
    fn default() -> Self {
        Self {
            enabled: true,
            description: default_description(),
            search_timeout_secs: default_search_timeout(),
            http_timeout_secs: default_http_timeout(),
            interfaces: Vec::new(),
        }
    }
}

impl Default for ChannelSection {
    fn default() -> Self {
        Self {
            handshake_timeout_secs: default_handshake_timeout(),
            idle_timeout_secs: default_idle_timeout(),
            max_pending: default_max_pending(),
            key_exchange: default_key_exchange(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    /// Load configuration from file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Self = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Save configuration to file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        let contents = toml::to_string_pretty(self)?;

        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent)?;
        }

        fs::write(path, contents)?;
        Ok(())
    }

    /// Get default config path
    #[must_use]
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("/tmp"))
            .join("lattice/config.toml")
    }

    /// Default cache snapshot path
    #[must_use]
    pub fn default_cache_path() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("/tmp"))
            .join("lattice/bootstrap.cache")
    }

    /// Load `path`, falling back to defaults when the default file is absent
    ///
    /// # Errors
    ///
    /// Returns an error if an explicitly named file is missing, or if any
    /// file that exists cannot be parsed.
    pub fn load_from(path: Option<&Path>) -> anyhow::Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => {
                let path = Self::default_path();
                if path.exists() {
                    Self::load(&path)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    /// Parsed `[node].address`
    ///
    /// # Errors
    ///
    /// Returns an error if the address is not IPv4.
    pub fn node_address(&self) -> anyhow::Result<Ipv4Addr> {
        self.node
            .address
            .parse()
            .map_err(|_| anyhow::anyhow!("node address '{}' is not IPv4", self.node.address))
    }

    /// Local endpoint for the bootstrapper
    ///
    /// # Errors
    ///
    /// Returns an error if the node address is invalid.
    pub fn local_endpoint(&self) -> anyhow::Result<LocalEndpoint> {
        Ok(LocalEndpoint {
            peer_id: self.node.peer_id,
            ip: self.node_address()?,
            tcp_port: self.node.tcp_port,
            udp_port: self.node.udp_port,
        })
    }

    /// Bootstrap core configuration
    #[must_use]
    pub fn bootstrap_config(&self) -> BootstrapConfig {
        let section = &self.bootstrap;
        BootstrapConfig {
            network_id: section.network_id,
            role: section.role,
            max_contacts: section.max_contacts,
            max_web_caches: section.max_web_caches,
            pings_per_tick: section.pings_per_tick,
            web_timeout: Duration::from_secs(section.web_timeout_secs),
            probe_timeout: Duration::from_secs(section.probe_timeout_secs),
            probe_hosts: section.probe_hosts.clone(),
            web_caches: section.web_caches.clone(),
            ..BootstrapConfig::default()
        }
    }

    /// UPnP worker configuration
    ///
    /// # Errors
    ///
    /// Returns an error if an interface address is not IPv4.
    pub fn upnp_config(&self) -> anyhow::Result<UpnpConfig> {
        let section = &self.upnp;
        let interfaces = if section.interfaces.is_empty() {
            None
        } else {
            let parsed = section
                .interfaces
                .iter()
                .map(|iface| {
                    iface
                        .parse::<Ipv4Addr>()
                        .map_err(|_| anyhow::anyhow!("UPnP interface '{iface}' is not IPv4"))
                })
                .collect::<anyhow::Result<Vec<_>>>()?;
            Some(parsed)
        };

        Ok(UpnpConfig {
            search_timeout: Duration::from_secs(section.search_timeout_secs),
            http_timeout: Duration::from_secs(section.http_timeout_secs),
            description: section.description.clone(),
            interfaces,
            ..UpnpConfig::default()
        })
    }

    /// Channel handshake configuration
    ///
    /// # Errors
    ///
    /// Returns an error if the key exchange name is unknown.
    pub fn channel_config(&self) -> anyhow::Result<ChannelConfig> {
        let section = &self.channel;
        let key_exchange = match section.key_exchange.to_lowercase().as_str() {
            "session" => KeyExchange::Session,
            "key" => KeyExchange::Key,
            other => anyhow::bail!("Invalid key exchange: {other}. Must be one of: session, key"),
        };

        Ok(ChannelConfig {
            handshake_timeout: Duration::from_secs(section.handshake_timeout_secs),
            idle_timeout: Duration::from_secs(section.idle_timeout_secs),
            max_pending: section.max_pending,
            local_name: self.node.name.clone(),
            key_exchange,
            ..ChannelConfig::default()
        })
    }

    /// Where cache snapshots live
    #[must_use]
    pub fn cache_path(&self) -> PathBuf {
        self.bootstrap
            .cache_file
            .clone()
            .unwrap_or_else(Self::default_cache_path)
    }

    /// Validate configuration
    ///
    /// # Errors
    ///
    /// Returns an error if configuration is invalid.
    pub fn validate(&self) -> anyhow::Result<()> {
        self.node_address()?;

        if self.node.tcp_port == 0 || self.node.udp_port == 0 {
            anyhow::bail!("Listen ports must be non-zero");
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            anyhow::bail!(
                "Invalid log level: {}. Must be one of: {}",
                self.logging.level,
                valid_log_levels.join(", ")
            );
        }

        if self.channel.handshake_timeout_secs == 0 {
            anyhow::bail!("Handshake timeout must be at least 1 second");
        }
        if self.channel.max_pending == 0 {
            anyhow::bail!("Max pending sends must be at least 1");
        }
        self.channel_config()?;

        if self.bootstrap.web_timeout_secs == 0 || self.bootstrap.probe_timeout_secs == 0 {
            anyhow::bail!("Web and probe timeouts must be at least 1 second");
        }
        self.bootstrap_config().validate()?;

        self.upnp_config()?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.node.tcp_port, 6881);
        assert_eq!(config.bootstrap.max_contacts, 200);
        assert_eq!(config.bootstrap.role, NetworkRole::Global);
        assert!(config.upnp.enabled);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();

        config.node.address = "not-an-ip".to_string();
        assert!(config.validate().is_err());

        config.node.address = "192.168.1.20".to_string();
        config.channel.key_exchange = "rsa".to_string();
        assert!(config.validate().is_err());

        config.channel.key_exchange = "key".to_string();
        config.bootstrap.probe_hosts = vec!["no-port".to_string()];
        assert!(config.validate().is_err());

        config.bootstrap.probe_hosts = vec!["example.org:80".to_string()];
        config.upnp.interfaces = vec!["eth0".to_string()];
        assert!(config.validate().is_err());

        config.upnp.interfaces = vec!["192.168.1.20".to_string()];
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_maps_onto_library_configs() {
        let mut config = Config::default();
        config.node.name = "relay-7".to_string();
        config.bootstrap.role = NetworkRole::Operation;
        config.bootstrap.network_id = 77;
        config.channel.key_exchange = "KEY".to_string();
        config.upnp.interfaces = vec!["10.0.0.2".to_string()];

        let bootstrap = config.bootstrap_config();
        assert_eq!(bootstrap.network_id, 77);
        assert_eq!(bootstrap.role, NetworkRole::Operation);
        assert_eq!(bootstrap.web_timeout, Duration::from_secs(30));

        let channel = config.channel_config().unwrap();
        assert_eq!(channel.key_exchange, KeyExchange::Key);
        assert_eq!(channel.local_name, "relay-7");

        let upnp = config.upnp_config().unwrap();
        assert_eq!(upnp.interfaces, Some(vec![Ipv4Addr::new(10, 0, 0, 2)]));
        assert_eq!(upnp.search_timeout, Duration::from_secs(3));
    }

    #[test]
    fn test_toml_serialization() {
        let mut config = Config::default();
        config.bootstrap.web_caches.push(WebCacheSeed {
            address: "http://cache.example.org/gwc".to_string(),
            access_key: "AAECAwQFBgcICQoLDA0ODxAREhMUFRYXGBkaGxwdHh8=".to_string(),
        });
        let toml_str = toml::to_string(&config).unwrap();
        let deserialized: Config = toml::from_str(&toml_str).unwrap();

        assert_eq!(config.node.tcp_port, deserialized.node.tcp_port);
        assert_eq!(deserialized.bootstrap.web_caches, config.bootstrap.web_caches);
        assert!(deserialized.validate().is_ok());
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: Config = toml::from_str("[node]\npeer_id = 99\n\n[bootstrap]\nrole = \"operation\"\n").unwrap();
        assert_eq!(config.node.peer_id, 99);
        assert_eq!(config.node.udp_port, 6881);
        assert_eq!(config.bootstrap.role, NetworkRole::Operation);
        assert_eq!(config.channel.max_pending, 64);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/config.toml");

        let mut config = Config::default();
        config.node.peer_id = 1234;
        config.save(&path).unwrap();

        let loaded = Config::load_from(Some(&path)).unwrap();
        assert_eq!(loaded.node.peer_id, 1234);
        assert!(Config::load_from(Some(&dir.path().join("missing.toml"))).is_err());
    }
}
