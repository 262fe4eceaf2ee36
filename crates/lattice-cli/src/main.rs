//! Lattice CLI
//!
//! Diagnostics for the Lattice connectivity layer: packet inspection, a
//! loopback channel handshake, UPnP port mapping, web-cache calls and a
//! bootstrap run on a live socket.

mod config;
mod node;
mod output;

use clap::{Args, Parser, Subcommand};
use lattice_core::ChannelManager;
use lattice_core::packet::inspect;
use lattice_crypto::x25519::PrivateKey;
use lattice_discovery::webcache::CacheRequest;
use lattice_discovery::{UpnpAction, UpnpEvent, UpnpHandler, WebCacheClient};
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use config::Config;

/// Datagram exchanges allowed before the loopback handshake gives up
const MAX_HANDSHAKE_ROUNDS: usize = 16;

/// Lattice - peer-to-peer connectivity diagnostics
#[derive(Parser)]
#[command(name = "lattice")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Configuration file path (default: the user config directory)
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Decode a packet and print its annotated frame tree
    Inspect {
        /// Packet bytes as hex (whitespace ignored)
        #[arg(required_unless_present = "file")]
        hex: Option<String>,

        /// Read raw packet bytes from a file instead
        #[arg(short, long, conflicts_with = "hex")]
        file: Option<PathBuf>,
    },

    /// Run a channel handshake between two in-process peers
    Handshake {
        /// Payload sent once the channel is up
        #[arg(short, long, default_value = "hello")]
        message: String,

        /// Print every datagram exchanged
        #[arg(long)]
        trace: bool,
    },

    /// UPnP gateway discovery and port mapping
    Upnp {
        #[command(subcommand)]
        command: UpnpCommand,
    },

    /// Talk to a remote web cache
    Webcache {
        #[command(subcommand)]
        command: WebCacheCommand,
    },

    /// Run the bootstrap driver on the configured UDP port
    Bootstrap {
        /// Seconds to run before saving and exiting
        #[arg(short, long, default_value_t = 60)]
        seconds: u64,
    },

    /// Manage the configuration file
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[derive(Subcommand)]
enum UpnpCommand {
    /// Search for gateways
    Discover,
    /// Map the listen ports
    Map(PortArgs),
    /// Remove the listen port mappings
    Unmap(PortArgs),
    /// Print the gateways' mapping tables
    List,
}

#[derive(Args)]
struct PortArgs {
    /// TCP port (default: the configured listen port)
    #[arg(long)]
    tcp: Option<u16>,

    /// UDP port (default: the configured listen port)
    #[arg(long)]
    udp: Option<u16>,
}

#[derive(Subcommand)]
enum WebCacheCommand {
    /// Ask for nodes of the configured network
    Query(CacheTarget),
    /// Announce this node
    Publish {
        #[command(flatten)]
        target: CacheTarget,

        /// Address to publish (default: the configured node address)
        #[arg(long)]
        ip: Option<Ipv4Addr>,
    },
    /// Check that the cache answers
    Ping(CacheTarget),
}

#[derive(Args)]
struct CacheTarget {
    /// Cache URL
    url: String,

    /// Access key, base64 (default: the key configured for this URL)
    #[arg(short, long)]
    key: Option<String>,
}

#[derive(Subcommand)]
enum ConfigCommand {
    /// Print the effective configuration
    Show,
    /// Write a default configuration with a fresh node id
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Print the configuration file path
    Path,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config_path = cli.config.clone().unwrap_or_else(Config::default_path);

    // Init must work even when an existing file no longer parses
    if let Commands::Config {
        command: ConfigCommand::Init { force },
    } = &cli.command
    {
        init_logging(cli.verbose, "info");
        return init_config(&config_path, *force);
    }

    let config = Config::load_from(cli.config.as_deref())?;
    init_logging(cli.verbose, &config.logging.level);
    config.validate()?;

    match cli.command {
        Commands::Inspect { hex, file } => inspect_packet(hex.as_deref(), file.as_deref())?,
        Commands::Handshake { message, trace } => run_handshake(&config, message, trace)?,
        Commands::Upnp { command } => run_upnp(&config, command).await?,
        Commands::Webcache { command } => run_webcache(&config, command).await?,
        Commands::Bootstrap { seconds } => {
            node::run(&config, Duration::from_secs(seconds)).await?;
        }
        Commands::Config { command } => match command {
            ConfigCommand::Show => print!("{}", toml::to_string_pretty(&config)?),
            ConfigCommand::Path => println!("{}", config_path.display()),
            ConfigCommand::Init { .. } => {}
        },
    }

    Ok(())
}

fn init_logging(verbose: bool, level: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(if verbose { "debug" } else { level })
        .init();
}

/// Decode and describe one packet
fn inspect_packet(hex_input: Option<&str>, file: Option<&Path>) -> anyhow::Result<()> {
    let bytes = match (file, hex_input) {
        (Some(path), _) => std::fs::read(path)?,
        (None, Some(text)) => {
            let compact: String = text.chars().filter(|c| !c.is_whitespace()).collect();
            hex::decode(compact)?
        }
        (None, None) => anyhow::bail!("Nothing to inspect: pass hex bytes or --file"),
    };

    match inspect::describe(&bytes) {
        Ok(tree) => print!("{tree}"),
        Err(e) => {
            output::failure(format_args!("{} bytes do not decode: {e}", bytes.len()));
            anyhow::bail!("malformed packet");
        }
    }
    Ok(())
}

/// Two managers exchanging datagrams in memory until the payload arrives
fn run_handshake(config: &Config, message: String, trace: bool) -> anyhow::Result<()> {
    const INITIATOR: u64 = 5;
    const RESPONDER: u64 = 9;
    const COMPONENT: u16 = 1;

    let channel = config.channel_config()?;
    let mut rng = rand_core::OsRng;
    let mut initiator = ChannelManager::new(
        INITIATOR,
        PrivateKey::generate(&mut rng),
        channel.clone(),
        Vec::<(u64, Vec<u8>)>::new(),
    );
    let mut responder = ChannelManager::new(
        RESPONDER,
        PrivateKey::generate(&mut rng),
        channel,
        Vec::<(u64, Vec<u8>)>::new(),
    );
    initiator.add_peer_key(RESPONDER, responder.public_key());
    responder.add_peer_key(INITIATOR, initiator.public_key());

    let now = Instant::now();
    initiator.send(RESPONDER, COMPONENT, message.into_bytes(), true, now)?;

    let mut delivered = Vec::new();
    let mut rounds = 0;
    while rounds < MAX_HANDSHAKE_ROUNDS {
        let outbound: Vec<(u64, Vec<u8>)> = std::mem::take(initiator.sink_mut());
        let inbound: Vec<(u64, Vec<u8>)> = std::mem::take(responder.sink_mut());
        if outbound.is_empty() && inbound.is_empty() {
            break;
        }
        rounds += 1;

        for (_, datagram) in outbound {
            trace_datagram(trace, INITIATOR, RESPONDER, &datagram);
            match responder.handle_datagram(INITIATOR, &datagram, now) {
                Ok(deliveries) => delivered.extend(deliveries),
                Err(e) => output::failure(format_args!("responder dropped datagram: {e}")),
            }
        }
        for (_, datagram) in inbound {
            trace_datagram(trace, RESPONDER, INITIATOR, &datagram);
            if let Err(e) = initiator.handle_datagram(RESPONDER, &datagram, now) {
                output::failure(format_args!("initiator dropped datagram: {e}"));
            }
        }
    }

    output::heading("Channel handshake");
    output::field("Key exchange", &config.channel.key_exchange);
    output::field("Rounds", rounds);
    let state_name = |state: Option<lattice_core::SessionState>| state.map_or("none", |s| s.name());
    output::field("Initiator", state_name(initiator.state(RESPONDER)));
    output::field("Responder", state_name(responder.state(INITIATOR)));

    match delivered.first() {
        Some(delivery) => {
            output::success(format_args!(
                "component {} received {:?}",
                delivery.component,
                String::from_utf8_lossy(&delivery.payload)
            ));
            Ok(())
        }
        None => anyhow::bail!("payload was not delivered"),
    }
}

fn trace_datagram(enabled: bool, from: u64, to: u64, datagram: &[u8]) {
    if !enabled {
        return;
    }
    println!("{from} -> {to} ({} bytes)", datagram.len());
    match inspect::describe(datagram) {
        Ok(tree) => print!("{tree}"),
        Err(e) => println!("  <undecodable: {e}>"),
    }
}

async fn run_upnp(config: &Config, command: UpnpCommand) -> anyhow::Result<()> {
    let (handler, mut events) = UpnpHandler::spawn(config.upnp_config()?);
    handler.enqueue(UpnpAction::Refresh)?;

    let ports = |args: &PortArgs| {
        (
            args.tcp.unwrap_or(config.node.tcp_port),
            args.udp.unwrap_or(config.node.udp_port),
        )
    };

    let mut mappings = None;
    match &command {
        UpnpCommand::Discover => {}
        UpnpCommand::Map(args) => {
            let (tcp, udp) = ports(args);
            handler.enqueue(UpnpAction::OpenPorts { tcp, udp })?;
        }
        UpnpCommand::Unmap(args) => {
            let (tcp, udp) = ports(args);
            handler.close_ports(tcp, udp)?;
        }
        UpnpCommand::List => mappings = Some(handler.list_mappings().await?),
    }
    handler.join().await;

    let mut devices = 0;
    while let Some(event) = events.recv().await {
        match event {
            UpnpEvent::DeviceAdded(device) => {
                devices += 1;
                output::success(format_args!("gateway {device}"));
            }
            UpnpEvent::PortOpened {
                device,
                protocol,
                port,
            } => output::success(format_args!("mapped {protocol} {port} on {device}")),
            UpnpEvent::PortClosed {
                device,
                protocol,
                port,
            } => output::success(format_args!("unmapped {protocol} {port} on {device}")),
            UpnpEvent::Failed { action, reason } => {
                output::failure(format_args!("{action}: {reason}"));
            }
        }
    }

    if devices == 0 {
        anyhow::bail!("No UPnP gateway answered");
    }

    if let Some(entries) = mappings {
        output::heading("Port mappings");
        if entries.is_empty() {
            println!("  (none)");
        }
        for entry in entries {
            println!("  {entry}");
        }
    }
    Ok(())
}

async fn run_webcache(config: &Config, command: WebCacheCommand) -> anyhow::Result<()> {
    let network_id = config.bootstrap.network_id;
    let (target, request) = match command {
        WebCacheCommand::Query(target) => (target, CacheRequest::Query { network_id }),
        WebCacheCommand::Publish { target, ip } => {
            let ip = match ip {
                Some(ip) => ip,
                None => config.node_address()?,
            };
            let request = CacheRequest::Publish {
                network_id,
                peer_id: config.node.peer_id,
                ip,
                tcp_port: config.node.tcp_port,
                udp_port: config.node.udp_port,
            };
            (target, request)
        }
        WebCacheCommand::Ping(target) => (target, CacheRequest::Ping { network_id }),
    };

    let key = access_key(config, &target)?;
    let client = WebCacheClient::new(Duration::from_secs(config.bootstrap.web_timeout_secs))?;
    tracing::debug!(url = %target.url, %request, "web cache request");

    let response = client.request(&target.url, &key, &request).await?;

    output::heading(&format!("{} {}", request.kind().name(), target.url));
    if let Some(ip) = response.remote_ip {
        output::field("Remote IP", ip);
    }
    if let Some(minutes) = response.timeout_minutes {
        output::field("Timeout", format_args!("{minutes} min"));
    }
    output::field(
        "Next publish",
        output::format_duration(response.publish_interval()),
    );
    output::field("Load low", response.load_low);
    if response.pong {
        output::field("Pong", true);
    }
    output::field("Nodes", response.nodes.len());
    for node in &response.nodes {
        println!(
            "    {:016x} {}:{} tcp {}",
            node.address.peer_id, node.address.ip, node.address.udp_port, node.tcp_port
        );
    }
    Ok(())
}

/// `--key`, or the key configured for the URL
fn access_key(config: &Config, target: &CacheTarget) -> anyhow::Result<Vec<u8>> {
    if let Some(key) = &target.key {
        return Ok(STANDARD.decode(key.trim())?);
    }
    let seed = config
        .bootstrap
        .web_caches
        .iter()
        .find(|seed| seed.address == target.url)
        .ok_or_else(|| anyhow::anyhow!("No access key configured for {}; pass --key", target.url))?;
    Ok(seed.decode_key()?)
}

/// Write a default configuration file
fn init_config(path: &Path, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        anyhow::bail!(
            "{} already exists (use --force to overwrite)",
            path.display()
        );
    }

    let mut config = Config::default();
    config.node.peer_id = u64::from_le_bytes(lattice_crypto::random::random_array::<8>()?);
    config.bootstrap.cache_file = Some(Config::default_cache_path());
    config.save(path)?;

    output::success(format_args!("wrote {}", path.display()));
    output::field("Node id", format_args!("{:016x}", config.node.peer_id));
    Ok(())
}
