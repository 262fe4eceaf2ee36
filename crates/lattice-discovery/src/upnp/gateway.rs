//! Gateways found by search and the rows of their mapping tables.

use crate::UpnpError;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, SocketAddrV4};
use std::time::Duration;

/// Transport protocol of a mapping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Protocol {
    /// TCP
    Tcp,
    /// UDP
    Udp,
}

impl From<Protocol> for igd::PortMappingProtocol {
    fn from(protocol: Protocol) -> Self {
        match protocol {
            Protocol::Tcp => Self::TCP,
            Protocol::Udp => Self::UDP,
        }
    }
}

impl From<igd::PortMappingProtocol> for Protocol {
    fn from(protocol: igd::PortMappingProtocol) -> Self {
        match protocol {
            igd::PortMappingProtocol::TCP => Self::Tcp,
            igd::PortMappingProtocol::UDP => Self::Udp,
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Tcp => "TCP",
            Self::Udp => "UDP",
        })
    }
}

/// A WAN connection service that accepted our search
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayDevice {
    /// Address the description was served from
    pub gateway: SocketAddrV4,
    /// Control path of the WAN service
    pub control_url: String,
    /// Our address on the gateway's network
    pub local_ip: Ipv4Addr,
}

impl GatewayDevice {
    fn from_igd(gateway: &igd::aio::Gateway, local_ip: Ipv4Addr) -> Self {
        Self {
            gateway: gateway.addr,
            control_url: gateway.control_url.clone(),
            local_ip,
        }
    }
}

impl fmt::Display for GatewayDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "http://{}{} via {}", self.gateway, self.control_url, self.local_ip)
    }
}

/// A searched gateway and the client that drives it
#[derive(Debug)]
pub(crate) struct KnownGateway {
    pub(crate) device: GatewayDevice,
    pub(crate) client: igd::aio::Gateway,
}

/// Search for a gateway from `local_ip`.
///
/// The whole search, including the description and schema fetches, is
/// bounded by `search_timeout + http_timeout`.
pub(crate) async fn search(
    local_ip: Ipv4Addr,
    target: SocketAddr,
    search_timeout: Duration,
    http_timeout: Duration,
) -> Result<KnownGateway, UpnpError> {
    let options = igd::SearchOptions {
        bind_addr: SocketAddr::new(IpAddr::V4(local_ip), 0),
        broadcast_address: target,
        timeout: Some(search_timeout),
    };
    let client = tokio::time::timeout(search_timeout + http_timeout, igd::aio::search_gateway(options))
        .await
        .map_err(|_| UpnpError::Timeout)??;
    Ok(KnownGateway {
        device: GatewayDevice::from_igd(&client, local_ip),
        client,
    })
}

/// One row of a gateway's mapping table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortMappingEntry {
    /// Table index
    pub index: u32,
    /// Mapping description
    pub description: String,
    /// Internal client address
    pub internal_client: String,
    /// Internal port
    pub internal_port: u16,
    /// External port
    pub external_port: u16,
    /// Protocol
    pub protocol: Protocol,
    /// Whether the gateway applies the mapping
    pub enabled: bool,
    /// Lease in seconds, 0 for indefinite
    pub lease_duration: u32,
}

impl PortMappingEntry {
    pub(crate) fn from_igd(index: u32, entry: igd::PortMappingEntry) -> Self {
        Self {
            index,
            description: entry.port_mapping_description,
            internal_client: entry.internal_client,
            internal_port: entry.internal_port,
            external_port: entry.external_port,
            protocol: entry.protocol.into(),
            enabled: entry.enabled,
            lease_duration: entry.lease_duration,
        }
    }
}

impl fmt::Display for PortMappingEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} - {}:{} {} (external {})",
            self.index,
            self.description,
            self.internal_client,
            self.internal_port,
            self.protocol,
            self.external_port
        )?;
        if !self.enabled {
            f.write_str(" disabled")?;
        }
        Ok(())
    }
}

/// Non-loopback IPv4 interface addresses
///
/// # Errors
///
/// Returns `UpnpError::Io` if interfaces cannot be listed.
pub fn local_ipv4_interfaces() -> Result<Vec<Ipv4Addr>, UpnpError> {
    let interfaces = get_if_addrs::get_if_addrs()?;
    Ok(interfaces
        .into_iter()
        .filter(|iface| !iface.is_loopback())
        .filter_map(|iface| match iface.addr {
            get_if_addrs::IfAddr::V4(v4) => Some(v4.ip),
            get_if_addrs::IfAddr::V6(_) => None,
        })
        .collect())
}
