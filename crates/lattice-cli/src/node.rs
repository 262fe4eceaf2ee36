//! `lattice bootstrap`: the bootstrap driver on a real UDP socket.
//!
//! Pings go out as network `Ping` packets, incoming `Ping`/`Pong` packets
//! refresh the contact cache, and snapshots are written to the cache file as
//! one hex-encoded cached entry per line.

use crate::config::Config;
use crate::output;
use lattice_core::packet::cache::{CachedContact, CachedWebCache};
use lattice_core::packet::network::{NetworkMessage, NetworkPacket, Ping};
use lattice_core::{ContactInfo, DhtSource, FirewallState};
use lattice_discovery::{
    BootstrapDriver, Bootstrapper, DriverCommand, NetworkHooks, Timestamp, WebCacheClient,
};
use std::fs;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::{TcpStream, UdpSocket};
use tracing::{debug, info, warn};

/// Without a packet for this long the network counts as unresponsive
const SILENCE_LIMIT: Duration = Duration::from_secs(60);

/// Outbound proxy connection attempt limit
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Driver hooks backed by the node's UDP socket
pub struct UdpHooks {
    socket: Arc<UdpSocket>,
    source: DhtSource,
    cache_path: PathBuf,
}

impl NetworkHooks for UdpHooks {
    fn send_ping(&mut self, contact: &ContactInfo) {
        let ping = Ping {
            source: self.source,
            remote_ip: Some(contact.address.ip),
        };
        let packet = NetworkPacket::wrap(self.source.peer_id, &NetworkMessage::Ping(ping)).encode();
        let target = SocketAddrV4::new(contact.address.ip, contact.address.udp_port);
        if let Err(e) = self.socket.try_send_to(&packet, target.into()) {
            debug!(%target, error = %e, "ping not sent");
        }
    }

    fn connect_tcp(&mut self, contact: &ContactInfo) {
        let target = SocketAddrV4::new(contact.address.ip, contact.tcp_port);
        tokio::spawn(async move {
            match tokio::time::timeout(CONNECT_TIMEOUT, TcpStream::connect(target)).await {
                Ok(Ok(_)) => info!(%target, "proxy connection opened"),
                Ok(Err(e)) => debug!(%target, error = %e, "proxy connection failed"),
                Err(_) => debug!(%target, "proxy connection timed out"),
            }
        });
    }

    fn start_global_search(&mut self, network_id: u64) {
        info!(network_id, "global search requested");
    }

    fn save(&mut self, contacts: Vec<CachedContact>, caches: Vec<CachedWebCache>) {
        match write_cache(&self.cache_path, &contacts, &caches) {
            Ok(()) => debug!(
                path = %self.cache_path.display(),
                contacts = contacts.len(),
                caches = caches.len(),
                "cache saved"
            ),
            Err(e) => warn!(path = %self.cache_path.display(), error = %e, "cache save failed"),
        }
    }
}

/// What an incoming datagram means for the driver
#[derive(Debug)]
pub struct Inbound {
    /// Command for the driver
    pub command: DriverCommand,
    /// Datagram to send back to the sender
    pub reply: Option<Vec<u8>>,
}

/// Interpret a datagram from `from`. Packets without a reachability
/// descriptor are ignored.
#[must_use]
pub fn handle_packet(data: &[u8], from: SocketAddr, local: DhtSource) -> Option<Inbound> {
    let SocketAddr::V4(from) = from else {
        return None;
    };
    let packet = match NetworkPacket::decode(data) {
        Ok(packet) => packet,
        Err(e) => {
            debug!(%from, error = %e, "dropping datagram");
            return None;
        }
    };

    let (body, reply) = match packet.message() {
        Ok(NetworkMessage::Ping(ping)) => {
            let pong = Ping {
                source: local,
                remote_ip: Some(*from.ip()),
            };
            let reply = NetworkPacket::wrap(local.peer_id, &NetworkMessage::Pong(pong)).encode();
            (ping, Some(reply))
        }
        Ok(NetworkMessage::Pong(pong)) => (pong, None),
        Ok(other) => {
            debug!(%from, kind = other.tag().name(), "ignoring packet");
            return None;
        }
        Err(e) => {
            debug!(%from, error = %e, "dropping network packet");
            return None;
        }
    };

    let contact = ContactInfo {
        address: body.source.address(*from.ip()),
        tcp_port: body.source.tcp_port,
        client_id: body.source.client_id,
    };
    Some(Inbound {
        command: DriverCommand::PacketReceived {
            contact,
            firewall: body.source.firewall,
        },
        reply,
    })
}

/// Write cached entries, one hex-encoded packet per line
///
/// # Errors
///
/// Returns an I/O error if the file cannot be written.
pub fn write_cache(
    path: &Path,
    contacts: &[CachedContact],
    caches: &[CachedWebCache],
) -> std::io::Result<()> {
    let mut text = String::new();
    for entry in contacts.iter().map(CachedContact::encode) {
        text.push_str(&hex::encode(entry));
        text.push('\n');
    }
    for entry in caches.iter().map(CachedWebCache::encode) {
        text.push_str(&hex::encode(entry));
        text.push('\n');
    }

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, text)
}

/// Feed every readable line of the cache file into `core`; returns how many
/// entries were restored
pub fn restore_cache(core: &mut Bootstrapper, path: &Path, now: Timestamp) -> usize {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) => {
            debug!(path = %path.display(), error = %e, "no cache file");
            return 0;
        }
    };

    let mut restored = 0;
    for (number, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let result = hex::decode(line)
            .map_err(|e| e.to_string())
            .and_then(|bytes| core.restore(&bytes, now).map_err(|e| e.to_string()));
        match result {
            Ok(()) => restored += 1,
            Err(e) => warn!(line = number + 1, error = %e, "skipping cache entry"),
        }
    }
    restored
}

/// Run the bootstrap driver for `duration` or until Ctrl+C
///
/// # Errors
///
/// Returns an error if the configuration is invalid, the socket cannot be
/// bound, or the driver dies.
pub async fn run(config: &Config, duration: Duration) -> anyhow::Result<()> {
    let local = config.local_endpoint()?;
    let source = DhtSource {
        peer_id: local.peer_id,
        client_id: 0,
        tcp_port: local.tcp_port,
        udp_port: local.udp_port,
        firewall: FirewallState::Open,
    };
    let socket = Arc::new(UdpSocket::bind((Ipv4Addr::UNSPECIFIED, local.udp_port)).await?);
    info!(addr = %socket.local_addr()?, "bootstrap socket bound");

    let now = Timestamp::now();
    let mut core = Bootstrapper::new(config.bootstrap_config(), local, now)?;
    let cache_path = config.cache_path();
    let restored = restore_cache(&mut core, &cache_path, now);
    info!(restored, path = %cache_path.display(), "cache loaded");

    let client = WebCacheClient::new(core.config().web_timeout)?;
    let hooks = UdpHooks {
        socket: socket.clone(),
        source,
        cache_path: cache_path.clone(),
    };
    let handle = BootstrapDriver::spawn(core, hooks, client);
    let commands = handle.commands();

    let deadline = tokio::time::sleep(duration);
    tokio::pin!(deadline);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut liveness = tokio::time::interval(Duration::from_secs(10));

    let mut buf = vec![0u8; 2048];
    let mut last_packet: Option<Instant> = None;
    let mut responsive = false;

    loop {
        tokio::select! {
            () = &mut deadline => break,
            _ = &mut ctrl_c => break,
            _ = liveness.tick() => {
                let now_responsive = last_packet.is_some_and(|t| t.elapsed() < SILENCE_LIMIT);
                if now_responsive != responsive {
                    responsive = now_responsive;
                    commands.send(DriverCommand::SetResponsive(responsive)).await?;
                }
            }
            received = socket.recv_from(&mut buf) => {
                let (len, from) = received?;
                let Some(inbound) = handle_packet(&buf[..len], from, source) else {
                    continue;
                };
                if let Some(reply) = inbound.reply {
                    if let Err(e) = socket.send_to(&reply, from).await {
                        debug!(%from, error = %e, "pong not sent");
                    }
                }
                commands.send(inbound.command).await?;
                last_packet = Some(Instant::now());
                if !responsive {
                    responsive = true;
                    commands.send(DriverCommand::SetResponsive(true)).await?;
                }
            }
        }
    }

    let core = handle.shutdown().await?;
    write_cache(&cache_path, &core.export_contacts(), &core.export_web_caches())?;

    output::heading("Bootstrap state");
    output::field("Contacts", core.contacts().len());
    output::field("Web caches", core.web_caches().len());
    output::field("Retry step", core.retry().step());
    output::field("Online", core.online().think_online());
    output::field("Cache file", cache_path.display());
    Ok(())
}
