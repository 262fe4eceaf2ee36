//! UPnP IGD port mapping.
//!
//! Gateway search and SOAP calls can take seconds, so they never run on the
//! caller's loop. [`UpnpHandler`] feeds a bounded action queue drained by a
//! single worker task, which reports what happened as [`UpnpEvent`]s.
//! Failures are logged and reported, never returned to the caller: without
//! UPnP a node simply stays behind its NAT.
//!
//! Shutdown enqueues the port-close action, closes the queue and waits for
//! the worker to drain it.

mod gateway;

pub use gateway::{GatewayDevice, PortMappingEntry, Protocol, local_ipv4_interfaces};

use crate::config::UpnpConfig;
use crate::UpnpError;
use gateway::KnownGateway;
use std::future::Future;
use std::net::{Ipv4Addr, SocketAddrV4};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Largest mapping index walked when listing
const MAX_LIST_ENTRIES: u32 = 256;

/// Work for the UPnP worker
#[derive(Debug)]
pub enum UpnpAction {
    /// Search for gateways, replacing the known device list
    Refresh,
    /// Map both listen ports on every known device
    OpenPorts {
        /// TCP listen port
        tcp: u16,
        /// UDP listen port
        udp: u16,
    },
    /// Remove both mappings from every known device
    ClosePorts {
        /// TCP listen port
        tcp: u16,
        /// UDP listen port
        udp: u16,
    },
    /// Read the mapping table of every known device
    ListMappings(oneshot::Sender<Vec<PortMappingEntry>>),
}

impl UpnpAction {
    fn name(&self) -> &'static str {
        match self {
            Self::Refresh => "refresh",
            Self::OpenPorts { .. } => "open",
            Self::ClosePorts { .. } => "close",
            Self::ListMappings(_) => "list",
        }
    }
}

/// Outcome reports from the worker
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpnpEvent {
    /// A gateway service was found
    DeviceAdded(GatewayDevice),
    /// A mapping was created
    PortOpened {
        /// Gateway device
        device: String,
        /// Protocol
        protocol: Protocol,
        /// Port
        port: u16,
    },
    /// A mapping was removed
    PortClosed {
        /// Gateway device
        device: String,
        /// Protocol
        protocol: Protocol,
        /// Port
        port: u16,
    },
    /// Something went wrong
    Failed {
        /// Action or step that failed
        action: &'static str,
        /// Error text
        reason: String,
    },
}

/// Front end of the UPnP worker
#[derive(Debug)]
pub struct UpnpHandler {
    actions: mpsc::Sender<UpnpAction>,
    worker: JoinHandle<()>,
}

impl UpnpHandler {
    /// Start the worker. Events arrive on the returned receiver.
    #[must_use]
    pub fn spawn(config: UpnpConfig) -> (Self, mpsc::UnboundedReceiver<UpnpEvent>) {
        let (actions_tx, actions_rx) = mpsc::channel(config.queue_capacity.max(1));
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let worker = UpnpWorker {
            config,
            gateways: Vec::new(),
            events: events_tx,
        };
        let worker = tokio::spawn(worker.run(actions_rx));

        (
            Self {
                actions: actions_tx,
                worker,
            },
            events_rx,
        )
    }

    /// Queue an action without waiting
    ///
    /// # Errors
    ///
    /// Returns `UpnpError::QueueFull` or `UpnpError::Stopped`.
    pub fn enqueue(&self, action: UpnpAction) -> Result<(), UpnpError> {
        self.actions.try_send(action).map_err(|e| match e {
            mpsc::error::TrySendError::Full(action) => {
                warn!(action = action.name(), "UPnP queue full, dropping action");
                UpnpError::QueueFull
            }
            mpsc::error::TrySendError::Closed(_) => UpnpError::Stopped,
        })
    }

    /// Discover gateways and map both listen ports
    ///
    /// # Errors
    ///
    /// Returns `UpnpError::QueueFull` or `UpnpError::Stopped`.
    pub fn initialize(&self, tcp: u16, udp: u16) -> Result<(), UpnpError> {
        self.enqueue(UpnpAction::Refresh)?;
        self.enqueue(UpnpAction::OpenPorts { tcp, udp })
    }

    /// Remove both mappings from every known device
    ///
    /// # Errors
    ///
    /// Returns `UpnpError::QueueFull` or `UpnpError::Stopped`.
    pub fn close_ports(&self, tcp: u16, udp: u16) -> Result<(), UpnpError> {
        self.enqueue(UpnpAction::ClosePorts { tcp, udp })
    }

    /// Read the mapping tables of every known device
    ///
    /// # Errors
    ///
    /// Returns `UpnpError::Stopped` if the worker is gone before answering.
    pub async fn list_mappings(&self) -> Result<Vec<PortMappingEntry>, UpnpError> {
        let (tx, rx) = oneshot::channel();
        self.actions
            .send(UpnpAction::ListMappings(tx))
            .await
            .map_err(|_| UpnpError::Stopped)?;
        rx.await.map_err(|_| UpnpError::Stopped)
    }

    /// Close the listen ports, stop accepting actions and wait for the
    /// worker to finish what is queued
    pub async fn shutdown(self, tcp: u16, udp: u16) {
        if let Err(e) = self.actions.send(UpnpAction::ClosePorts { tcp, udp }).await {
            debug!(error = %e, "UPnP worker already stopped");
        }
        self.join().await;
    }

    /// Stop accepting actions and wait for the queued ones, leaving any
    /// mappings in place
    pub async fn join(self) {
        drop(self.actions);
        if self.worker.await.is_err() {
            warn!("UPnP worker panicked");
        }
    }
}

struct UpnpWorker {
    config: UpnpConfig,
    gateways: Vec<KnownGateway>,
    events: mpsc::UnboundedSender<UpnpEvent>,
}

impl UpnpWorker {
    async fn run(mut self, mut actions: mpsc::Receiver<UpnpAction>) {
        while let Some(action) = actions.recv().await {
            debug!(action = action.name(), "UPnP action");
            match action {
                UpnpAction::Refresh => self.refresh().await,
                UpnpAction::OpenPorts { tcp, udp } => {
                    self.map_ports(&[(Protocol::Tcp, tcp), (Protocol::Udp, udp)], true)
                        .await;
                }
                UpnpAction::ClosePorts { tcp, udp } => {
                    self.map_ports(&[(Protocol::Tcp, tcp), (Protocol::Udp, udp)], false)
                        .await;
                }
                UpnpAction::ListMappings(reply) => {
                    let entries = self.list().await;
                    let _ = reply.send(entries);
                }
            }
        }
        debug!("UPnP worker drained");
    }

    fn report(&self, event: UpnpEvent) {
        let _ = self.events.send(event);
    }

    fn fail(&self, action: &'static str, error: &UpnpError) {
        warn!(action, error = %error, "UPnP step failed");
        self.report(UpnpEvent::Failed {
            action,
            reason: error.to_string(),
        });
    }

    /// Run one gateway call under the configured HTTP timeout
    async fn call<T, E>(&self, request: impl Future<Output = Result<T, E>>) -> Result<T, UpnpError>
    where
        UpnpError: From<E>,
    {
        tokio::time::timeout(self.config.http_timeout, request)
            .await
            .map_err(|_| UpnpError::Timeout)?
            .map_err(UpnpError::from)
    }

    async fn refresh(&mut self) {
        self.gateways.clear();

        let interfaces = match &self.config.interfaces {
            Some(list) => list.clone(),
            None => match local_ipv4_interfaces() {
                Ok(list) => list,
                Err(e) => {
                    self.fail("refresh", &e);
                    return;
                }
            },
        };

        for local_ip in interfaces {
            if let Err(e) = self.query_interface(local_ip).await {
                self.fail("search", &e);
            }
        }
    }

    async fn query_interface(&mut self, local_ip: Ipv4Addr) -> Result<(), UpnpError> {
        let found = gateway::search(
            local_ip,
            self.config.ssdp_target,
            self.config.search_timeout,
            self.config.http_timeout,
        )
        .await?;

        let known = self.gateways.iter().any(|g| {
            g.device.gateway == found.device.gateway && g.device.control_url == found.device.control_url
        });
        if known {
            debug!(device = %found.device, "gateway already known");
            return Ok(());
        }
        info!(device = %found.device, "UPnP device added");
        self.report(UpnpEvent::DeviceAdded(found.device.clone()));
        self.gateways.push(found);
        Ok(())
    }

    async fn map_ports(&self, ports: &[(Protocol, u16)], open: bool) {
        for gateway in &self.gateways {
            let device = &gateway.device;
            for &(protocol, port) in ports {
                let result = if open {
                    let local = SocketAddrV4::new(device.local_ip, port);
                    self.call(gateway.client.add_port(
                        protocol.into(),
                        port,
                        local,
                        0,
                        &self.config.description,
                    ))
                    .await
                } else {
                    self.call(gateway.client.remove_port(protocol.into(), port)).await
                };

                match result {
                    Ok(()) if open => {
                        info!(%device, %protocol, port, "port mapped");
                        self.report(UpnpEvent::PortOpened {
                            device: device.to_string(),
                            protocol,
                            port,
                        });
                    }
                    Ok(()) => {
                        info!(%device, %protocol, port, "port mapping removed");
                        self.report(UpnpEvent::PortClosed {
                            device: device.to_string(),
                            protocol,
                            port,
                        });
                    }
                    Err(e) => self.fail(if open { "open" } else { "close" }, &e),
                }
            }
        }
    }

    async fn list(&self) -> Vec<PortMappingEntry> {
        let mut entries = Vec::new();
        for gateway in &self.gateways {
            for index in 0..MAX_LIST_ENTRIES {
                match self.call(gateway.client.get_generic_port_mapping_entry(index)).await {
                    Ok(row) => entries.push(PortMappingEntry::from_igd(index, row)),
                    // The table ends with SpecifiedArrayIndexInvalid
                    Err(UpnpError::ListEntry(
                        igd::GetGenericPortMappingEntryError::SpecifiedArrayIndexInvalid,
                    )) => break,
                    Err(e) => {
                        self.fail("list", &e);
                        break;
                    }
                }
            }
        }
        entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::net::SocketAddr;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream, UdpSocket};

    const SERVICE: &str = "urn:schemas-upnp-org:service:WANIPConnection:1";

    const DESCRIPTION: &str = r#"<?xml version="1.0"?>
<root xmlns="urn:schemas-upnp-org:device-1-0">
  <device>
    <deviceType>urn:schemas-upnp-org:device:InternetGatewayDevice:1</deviceType>
    <deviceList><device>
      <deviceType>urn:schemas-upnp-org:device:WANDevice:1</deviceType>
      <deviceList><device>
        <deviceType>urn:schemas-upnp-org:device:WANConnectionDevice:1</deviceType>
        <serviceList><service>
          <serviceType>urn:schemas-upnp-org:service:WANIPConnection:1</serviceType>
          <serviceId>urn:upnp-org:serviceId:WANIPConn1</serviceId>
          <controlURL>/ctl/IPConn</controlURL>
          <SCPDURL>/WANIPCn.xml</SCPDURL>
        </service></serviceList>
      </device></deviceList>
    </device></deviceList>
  </device>
</root>"#;

    /// Mapping row with a typed attribute and an escaped description
    const FIRST_ROW: &str = "<NewRemoteHost></NewRemoteHost>\
        <NewExternalPort>6881</NewExternalPort>\
        <NewProtocol>TCP</NewProtocol>\
        <NewInternalPort xmlns:dt=\"urn:schemas-microsoft-com:datatypes\" dt:dt=\"ui2\">6881</NewInternalPort>\
        <NewInternalClient>127.0.0.1</NewInternalClient>\
        <NewEnabled>1</NewEnabled>\
        <NewPortMappingDescription>A &amp; B</NewPortMappingDescription>\
        <NewLeaseDuration>0</NewLeaseDuration>";

    fn scpd() -> String {
        let action = |name: &str, args: &[&str]| {
            let args: String = args
                .iter()
                .map(|a| format!("<argument><name>{a}</name><direction>in</direction></argument>"))
                .collect();
            format!("<action><name>{name}</name><argumentList>{args}</argumentList></action>")
        };
        format!(
            "<?xml version=\"1.0\"?><scpd xmlns=\"urn:schemas-upnp-org:service-1-0\"><actionList>{}{}{}</actionList></scpd>",
            action(
                "AddPortMapping",
                &[
                    "NewRemoteHost",
                    "NewExternalPort",
                    "NewProtocol",
                    "NewInternalPort",
                    "NewInternalClient",
                    "NewEnabled",
                    "NewPortMappingDescription",
                    "NewLeaseDuration",
                ],
            ),
            action("DeletePortMapping", &["NewRemoteHost", "NewExternalPort", "NewProtocol"]),
            action("GetGenericPortMappingEntry", &["NewPortMappingIndex"]),
        )
    }

    fn envelope(body: &str) -> String {
        format!(
            "<?xml version=\"1.0\"?><s:Envelope xmlns:s=\"http://schemas.xmlsoap.org/soap/envelope/\" \
             s:encodingStyle=\"http://schemas.xmlsoap.org/soap/encoding/\"><s:Body>{body}</s:Body></s:Envelope>"
        )
    }

    fn action_response(action: &str, fields: &str) -> String {
        envelope(&format!("<u:{action}Response xmlns:u=\"{SERVICE}\">{fields}</u:{action}Response>"))
    }

    fn fault(code: u16, description: &str) -> String {
        envelope(&format!(
            "<s:Fault><faultcode>s:Client</faultcode><faultstring>UPnPError</faultstring><detail>\
             <UPnPError xmlns=\"urn:schemas-upnp-org:control-1-0\"><errorCode>{code}</errorCode>\
             <errorDescription>{description}</errorDescription></UPnPError></detail></s:Fault>"
        ))
    }

    /// Minimal gateway: answers searches, serves its description and schema,
    /// and accepts mapping actions
    struct FakeGateway {
        ssdp: SocketAddr,
        actions: Arc<Mutex<Vec<String>>>,
    }

    async fn read_request(stream: &mut TcpStream) -> String {
        let mut data = Vec::new();
        let mut buf = [0u8; 2048];
        loop {
            let n = stream.read(&mut buf).await.unwrap();
            if n == 0 {
                break;
            }
            data.extend_from_slice(&buf[..n]);
            let text = String::from_utf8_lossy(&data);
            if let Some(end) = text.find("\r\n\r\n") {
                let length = text
                    .lines()
                    .find_map(|l| {
                        let (k, v) = l.split_once(':')?;
                        k.eq_ignore_ascii_case("content-length")
                            .then(|| v.trim().parse::<usize>().ok())
                            .flatten()
                    })
                    .unwrap_or(0);
                if data.len() >= end + 4 + length {
                    break;
                }
            }
        }
        String::from_utf8_lossy(&data).into_owned()
    }

    fn respond(request: &str, seen: &Mutex<Vec<String>>) -> (&'static str, String) {
        if request.starts_with("GET /rootDesc.xml") {
            return ("200 OK", DESCRIPTION.to_string());
        }
        if request.starts_with("GET /WANIPCn.xml") {
            return ("200 OK", scpd());
        }
        let Some(action) = ["GetGenericPortMappingEntry", "AddPortMapping", "DeletePortMapping"]
            .into_iter()
            .find(|a| request.contains(&format!("#{a}")))
        else {
            return ("404 Not Found", String::new());
        };
        seen.lock().push(action.to_string());
        match action {
            "GetGenericPortMappingEntry" if request.contains("<NewPortMappingIndex>0<") => {
                ("200 OK", action_response(action, FIRST_ROW))
            }
            "GetGenericPortMappingEntry" => (
                "500 Internal Server Error",
                fault(713, "SpecifiedArrayIndexInvalid"),
            ),
            _ => ("200 OK", action_response(action, "")),
        }
    }

    async fn fake_gateway() -> FakeGateway {
        let http = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let http_addr = http.local_addr().unwrap();
        let actions = Arc::new(Mutex::new(Vec::new()));

        let seen = actions.clone();
        tokio::spawn(async move {
            loop {
                let Ok((mut stream, _)) = http.accept().await else {
                    return;
                };
                let request = read_request(&mut stream).await;
                let (status, body) = respond(&request, &seen);
                let response = format!(
                    "HTTP/1.1 {status}\r\nContent-Type: text/xml\r\nContent-Length: {}\r\n\
                     Connection: close\r\n\r\n{body}",
                    body.len()
                );
                let _ = stream.write_all(response.as_bytes()).await;
            }
        });

        let ssdp = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let ssdp_addr = ssdp.local_addr().unwrap();
        tokio::spawn(async move {
            let mut buf = [0u8; 1024];
            while let Ok((_, from)) = ssdp.recv_from(&mut buf).await {
                let reply = format!(
                    "HTTP/1.1 200 OK\r\nCACHE-CONTROL: max-age=120\r\n\
                     ST: urn:schemas-upnp-org:device:InternetGatewayDevice:1\r\n\
                     Location: http://{http_addr}/rootDesc.xml\r\n\r\n"
                );
                let _ = ssdp.send_to(reply.as_bytes(), from).await;
            }
        });

        FakeGateway {
            ssdp: ssdp_addr,
            actions,
        }
    }

    fn config(ssdp: SocketAddr) -> UpnpConfig {
        UpnpConfig {
            search_timeout: Duration::from_secs(2),
            http_timeout: Duration::from_secs(5),
            ssdp_target: ssdp,
            interfaces: Some(vec![Ipv4Addr::LOCALHOST]),
            ..UpnpConfig::default()
        }
    }

    #[tokio::test]
    async fn test_open_list_and_close_against_fake_gateway() {
        let gateway = fake_gateway().await;
        let (handler, mut events) = UpnpHandler::spawn(config(gateway.ssdp));

        handler.initialize(6881, 6882).unwrap();
        let entries = handler.list_mappings().await.unwrap();
        handler.shutdown(6881, 6882).await;

        let mut opened = 0;
        let mut closed = 0;
        let mut devices = 0;
        while let Ok(event) = events.try_recv() {
            match event {
                UpnpEvent::DeviceAdded(device) => {
                    devices += 1;
                    assert_eq!(device.control_url, "/ctl/IPConn");
                    assert_eq!(device.local_ip, Ipv4Addr::LOCALHOST);
                }
                UpnpEvent::PortOpened { .. } => opened += 1,
                UpnpEvent::PortClosed { .. } => closed += 1,
                UpnpEvent::Failed { action, reason } => panic!("{action} failed: {reason}"),
            }
        }
        assert_eq!(devices, 1);
        assert_eq!(opened, 2);
        assert_eq!(closed, 2);

        let actions = gateway.actions.lock().clone();
        assert_eq!(actions.iter().filter(|a| *a == "AddPortMapping").count(), 2);
        assert_eq!(actions.iter().filter(|a| *a == "DeletePortMapping").count(), 2);
        assert_eq!(entries.len(), 1);
    }

    #[tokio::test]
    async fn test_listing_reads_attributed_and_escaped_fields() {
        let gateway = fake_gateway().await;
        let (handler, _events) = UpnpHandler::spawn(config(gateway.ssdp));

        handler.enqueue(UpnpAction::Refresh).unwrap();
        let entries = handler.list_mappings().await.unwrap();
        handler.join().await;

        assert_eq!(entries.len(), 1);
        let entry = &entries[0];
        assert_eq!(entry.internal_port, 6881);
        assert_eq!(entry.external_port, 6881);
        assert_eq!(entry.description, "A & B");
        assert_eq!(entry.protocol, Protocol::Tcp);
        assert!(entry.enabled);

        // Index 0 answered, index 1 ended the table
        let actions = gateway.actions.lock().clone();
        assert_eq!(actions, vec!["GetGenericPortMappingEntry"; 2]);
    }

    #[tokio::test]
    async fn test_no_gateway_reports_failure() {
        let silent = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let mut config = config(silent.local_addr().unwrap());
        config.search_timeout = Duration::from_millis(100);
        let (handler, mut events) = UpnpHandler::spawn(config);

        handler.initialize(1000, 1001).unwrap();
        handler.shutdown(1000, 1001).await;

        let event = events.recv().await.unwrap();
        assert!(matches!(event, UpnpEvent::Failed { action: "search", .. }));
        drop(silent);
    }

    #[tokio::test]
    async fn test_queue_bound() {
        let silent = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let mut config = config(silent.local_addr().unwrap());
        config.queue_capacity = 1;
        config.search_timeout = Duration::from_millis(200);
        let (handler, _events) = UpnpHandler::spawn(config);

        let mut refused = false;
        for _ in 0..8 {
            if matches!(handler.enqueue(UpnpAction::Refresh), Err(UpnpError::QueueFull)) {
                refused = true;
            }
        }
        assert!(refused);
        handler.shutdown(1, 2).await;
    }
}
