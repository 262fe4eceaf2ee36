//! Discovery error types.

use thiserror::Error;

/// Bootstrap and web-cache errors
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// Web cache answered with `error:<message>` or an unusable body
    #[error("web cache error: {0}")]
    WebCache(String),

    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Cache address is not a valid URL
    #[error("invalid cache address: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Request or response cipher failed
    #[error("web cache cipher: {0}")]
    Crypto(#[from] lattice_crypto::CryptoError),

    /// Remote call did not finish in time
    #[error("timed out")]
    Timeout,

    /// The driver loop is gone
    #[error("bootstrap driver stopped")]
    DriverStopped,

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    InvalidConfig(String),
}

/// UPnP errors. These stay inside the worker and surface as events.
#[derive(Debug, Error)]
pub enum UpnpError {
    /// Socket error during discovery
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Gateway search, description or schema fetch failed
    #[error("gateway search failed: {0}")]
    Search(#[from] igd::SearchError),

    /// Gateway refused `AddPortMapping`
    #[error("AddPortMapping failed: {0}")]
    AddPort(#[from] igd::AddPortError),

    /// Gateway refused `DeletePortMapping`
    #[error("DeletePortMapping failed: {0}")]
    RemovePort(#[from] igd::RemovePortError),

    /// Gateway refused `GetGenericPortMappingEntry`
    #[error("GetGenericPortMappingEntry failed: {0}")]
    ListEntry(#[from] igd::GetGenericPortMappingEntryError),

    /// The gateway did not answer in time
    #[error("no response within timeout")]
    Timeout,

    /// Action queue is full
    #[error("action queue full")]
    QueueFull,

    /// Worker has shut down
    #[error("worker stopped")]
    Stopped,
}
