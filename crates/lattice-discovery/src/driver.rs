//! Async driver for the bootstrap core.
//!
//! The driver task owns the [`Bootstrapper`]. It polls a
//! [`lattice_core::Scheduler`], executes the actions each tick produces, and
//! runs web-cache calls and liveness probes on spawned tasks. Those tasks
//! only report results back over a channel; the bootstrapper itself is
//! touched by the driver loop alone.

use crate::bootstrap::{BootstrapAction, Bootstrapper, WebJob};
use crate::clock::Timestamp;
use crate::online::probe_host;
use crate::webcache::{CacheOrigin, CacheResponse, RequestKind, WebCacheClient};
use crate::DiscoveryError;
use lattice_core::packet::cache::{CachedContact, CachedWebCache};
use lattice_core::{ContactInfo, FirewallState, Scheduler};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// How often the driver polls its scheduler
const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Commands queued before the driver stops accepting more
const COMMAND_CAPACITY: usize = 256;

/// Network operations the bootstrapper asks for
pub trait NetworkHooks: Send + 'static {
    /// Send a UDP ping to a cached contact
    fn send_ping(&mut self, contact: &ContactInfo);

    /// Open an outbound TCP connection to a cached contact
    fn connect_tcp(&mut self, contact: &ContactInfo);

    /// Ask the global network to search for an operation's members
    fn start_global_search(&mut self, network_id: u64);

    /// Persist a snapshot of the caches
    fn save(&mut self, _contacts: Vec<CachedContact>, _caches: Vec<CachedWebCache>) {}
}

/// Input to the driver loop
#[derive(Debug, Clone)]
pub enum DriverCommand {
    /// A packet arrived from this contact
    PacketReceived {
        /// Sender
        contact: ContactInfo,
        /// Sender's firewall state
        firewall: FirewallState,
    },
    /// Network liveness changed
    SetResponsive(bool),
    /// Our firewall classification changed
    SetFirewall(FirewallState),
    /// Global network availability changed
    SetGlobalResponsive(bool),
    /// A web cache was learned
    AddWebCache {
        /// Endpoint URL
        address: String,
        /// Access key
        access_key: Vec<u8>,
    },
    /// Stop the loop and hand back the bootstrapper
    Shutdown,
}

#[derive(Debug)]
enum WorkerResult {
    Web {
        address: String,
        kind: RequestKind,
        result: Result<CacheResponse, DiscoveryError>,
    },
    Probe {
        success: bool,
    },
}

/// Handle to a running driver
#[derive(Debug)]
pub struct DriverHandle {
    commands: mpsc::Sender<DriverCommand>,
    task: JoinHandle<Bootstrapper>,
}

impl DriverHandle {
    /// Sender for feeding the driver from other tasks
    #[must_use]
    pub fn commands(&self) -> mpsc::Sender<DriverCommand> {
        self.commands.clone()
    }

    /// Queue a command
    ///
    /// # Errors
    ///
    /// Returns `DiscoveryError::DriverStopped` if the loop has exited.
    pub async fn send(&self, command: DriverCommand) -> Result<(), DiscoveryError> {
        self.commands
            .send(command)
            .await
            .map_err(|_| DiscoveryError::DriverStopped)
    }

    /// Stop the loop and return the final bootstrap state.
    ///
    /// In-flight web calls and probes are not cancelled; their results are
    /// discarded.
    ///
    /// # Errors
    ///
    /// Returns `DiscoveryError::DriverStopped` if the task panicked.
    pub async fn shutdown(self) -> Result<Bootstrapper, DiscoveryError> {
        let _ = self.commands.send(DriverCommand::Shutdown).await;
        self.task.await.map_err(|_| DiscoveryError::DriverStopped)
    }
}

/// Event loop owning a [`Bootstrapper`]
pub struct BootstrapDriver<H: NetworkHooks> {
    core: Bootstrapper,
    hooks: H,
    client: WebCacheClient,
    results_tx: mpsc::UnboundedSender<WorkerResult>,
}

impl<H: NetworkHooks> BootstrapDriver<H> {
    /// Spawn the loop on the current tokio runtime
    #[must_use]
    pub fn spawn(core: Bootstrapper, hooks: H, client: WebCacheClient) -> DriverHandle {
        let (commands_tx, commands_rx) = mpsc::channel(COMMAND_CAPACITY);
        let (results_tx, results_rx) = mpsc::unbounded_channel();

        let driver = Self {
            core,
            hooks,
            client,
            results_tx,
        };
        let task = tokio::spawn(driver.run(commands_rx, results_rx));

        DriverHandle {
            commands: commands_tx,
            task,
        }
    }

    async fn run(
        mut self,
        mut commands: mpsc::Receiver<DriverCommand>,
        mut results: mpsc::UnboundedReceiver<WorkerResult>,
    ) -> Bootstrapper {
        let mut scheduler = Scheduler::new(Instant::now());
        let mut poll = tokio::time::interval(POLL_INTERVAL);
        info!(network_id = self.core.config().network_id, "bootstrap driver started");

        loop {
            tokio::select! {
                _ = poll.tick() => {
                    let ticks = scheduler.poll(Instant::now());
                    let now = Timestamp::now();
                    if ticks.second {
                        let actions = self.core.second_tick(now);
                        self.execute(actions);
                    }
                    if ticks.minute {
                        let actions = self.core.minute_tick(now);
                        self.execute(actions);
                    }
                }
                command = commands.recv() => match command {
                    Some(DriverCommand::Shutdown) | None => break,
                    Some(command) => self.apply(command),
                },
                Some(result) = results.recv() => {
                    let now = Timestamp::now();
                    let actions = match result {
                        WorkerResult::Web { address, kind, result } => {
                            self.core.on_web_result(&address, kind, result, now)
                        }
                        WorkerResult::Probe { success } => self.core.on_probe_result(success, now),
                    };
                    self.execute(actions);
                }
            }
        }

        info!("bootstrap driver stopped");
        self.core
    }

    fn apply(&mut self, command: DriverCommand) {
        let now = Timestamp::now();
        match command {
            DriverCommand::PacketReceived { contact, firewall } => {
                self.core.on_packet(contact, firewall, now);
            }
            DriverCommand::SetResponsive(responsive) => self.core.set_responsive(responsive, now),
            DriverCommand::SetFirewall(firewall) => self.core.set_firewall(firewall),
            DriverCommand::SetGlobalResponsive(up) => self.core.set_global_responsive(up),
            DriverCommand::AddWebCache {
                address,
                access_key,
            } => {
                self.core
                    .add_web_cache(address, access_key, CacheOrigin::Learned, now);
            }
            DriverCommand::Shutdown => {}
        }
    }

    fn execute(&mut self, actions: Vec<BootstrapAction>) {
        for action in actions {
            match action {
                BootstrapAction::Ping(contact) => self.hooks.send_ping(&contact),
                BootstrapAction::ConnectTcp(contact) => self.hooks.connect_tcp(&contact),
                BootstrapAction::GlobalSearch { network_id } => {
                    self.hooks.start_global_search(network_id);
                }
                BootstrapAction::Save => {
                    self.hooks
                        .save(self.core.export_contacts(), self.core.export_web_caches());
                }
                BootstrapAction::WebRequest(job) => self.spawn_web(job),
                BootstrapAction::Probe(host) => self.spawn_probe(host),
            }
        }
    }

    fn spawn_web(&self, job: WebJob) {
        let client = self.client.clone();
        let results = self.results_tx.clone();
        tokio::spawn(async move {
            let result = client
                .request(&job.address, &job.access_key, &job.request)
                .await;
            let _ = results.send(WorkerResult::Web {
                address: job.address,
                kind: job.request.kind(),
                result,
            });
        });
    }

    fn spawn_probe(&self, host: String) {
        let timeout = self.core.config().probe_timeout;
        let results = self.results_tx.clone();
        tokio::spawn(async move {
            let success = probe_host(&host, timeout).await;
            debug!(host, success, "liveness probe finished");
            let _ = results.send(WorkerResult::Probe { success });
        });
    }
}
