//! Internet reachability detection.
//!
//! A hysteresis counter between 0 and [`ONLINE_CONFIRMED`]: each successful
//! probe of a well-known host moves it up, each failure moves it down and
//! immediately re-probes another host. We consider ourselves online only at
//! the top. Probes run every minute while the counter is above zero and
//! every ten seconds at zero.

use crate::clock::Timestamp;
use rand::Rng;
use std::time::Duration;
use tracing::{debug, info};

/// Counter value meaning "online"
pub const ONLINE_CONFIRMED: u8 = 3;

/// Probe interval while the counter is above zero
pub const ONLINE_PROBE_INTERVAL: Duration = Duration::from_secs(60);

/// Probe interval at zero
pub const OFFLINE_PROBE_INTERVAL: Duration = Duration::from_secs(10);

/// What to do after a probe result
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// Nothing changed that needs action
    Steady,
    /// Success after believing we were offline; retry timers should reset
    Reconnected,
    /// Failure; probe this host next
    Retry(String),
}

/// Online hysteresis state
#[derive(Debug, Clone)]
pub struct OnlineDetector {
    hosts: Vec<String>,
    counter: u8,
    next_check: Timestamp,
    last_host: Option<usize>,
}

impl OnlineDetector {
    /// Start believing we are online
    #[must_use]
    pub fn new(hosts: Vec<String>) -> Self {
        Self {
            hosts,
            counter: ONLINE_CONFIRMED,
            next_check: Timestamp::ZERO,
            last_host: None,
        }
    }

    /// Whether the counter is at the top
    #[must_use]
    pub fn think_online(&self) -> bool {
        self.counter == ONLINE_CONFIRMED
    }

    /// Current counter value
    #[must_use]
    pub fn counter(&self) -> u8 {
        self.counter
    }

    /// Host to probe if a check is due at `now`
    pub fn poll(&mut self, now: Timestamp) -> Option<String> {
        if now <= self.next_check {
            return None;
        }
        let interval = if self.counter > 0 {
            ONLINE_PROBE_INTERVAL
        } else {
            OFFLINE_PROBE_INTERVAL
        };
        self.next_check = now + interval;
        self.pick_host()
    }

    /// Feed back a probe result
    pub fn record(&mut self, success: bool) -> ProbeOutcome {
        if success {
            let reconnected = self.counter == 0;
            if self.counter < ONLINE_CONFIRMED {
                self.counter += 1;
            }
            if reconnected {
                info!("connectivity restored");
                return ProbeOutcome::Reconnected;
            }
            return ProbeOutcome::Steady;
        }

        if self.counter == 0 {
            return ProbeOutcome::Steady;
        }
        self.counter -= 1;
        debug!(counter = self.counter, "liveness probe failed");
        if self.counter == 0 {
            info!("connectivity lost");
        }
        self.pick_host().map_or(ProbeOutcome::Steady, ProbeOutcome::Retry)
    }

    fn pick_host(&mut self) -> Option<String> {
        if self.hosts.is_empty() {
            return None;
        }
        let mut index = rand::thread_rng().gen_range(0..self.hosts.len());
        if self.hosts.len() > 1 && Some(index) == self.last_host {
            index = (index + 1) % self.hosts.len();
        }
        self.last_host = Some(index);
        Some(self.hosts[index].clone())
    }
}

/// Probe `host` (`host:port`) with a TCP connect
pub async fn probe_host(host: &str, timeout: Duration) -> bool {
    match tokio::time::timeout(timeout, tokio::net::TcpStream::connect(host)).await {
        Ok(Ok(_)) => true,
        Ok(Err(e)) => {
            debug!(host, error = %e, "probe failed");
            false
        }
        Err(_) => {
            debug!(host, "probe timed out");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detector() -> OnlineDetector {
        OnlineDetector::new(vec!["a:80".into(), "b:80".into(), "c:80".into()])
    }

    #[test]
    fn test_starts_online() {
        let d = detector();
        assert!(d.think_online());
        assert_eq!(d.counter(), ONLINE_CONFIRMED);
    }

    #[test]
    fn test_failures_walk_down_and_reprobe_other_host() {
        let mut d = detector();
        let first = d.poll(Timestamp::from_millis(1)).unwrap();

        let ProbeOutcome::Retry(second) = d.record(false) else {
            panic!("expected a re-probe");
        };
        assert_ne!(first, second);
        assert!(!d.think_online());

        assert!(matches!(d.record(false), ProbeOutcome::Retry(_)));
        assert!(matches!(d.record(false), ProbeOutcome::Retry(_)));
        assert_eq!(d.counter(), 0);
        assert_eq!(d.record(false), ProbeOutcome::Steady);
    }

    #[test]
    fn test_reconnect_from_zero() {
        let mut d = detector();
        for _ in 0..3 {
            d.record(false);
        }
        assert_eq!(d.record(true), ProbeOutcome::Reconnected);
        assert_eq!(d.record(true), ProbeOutcome::Steady);
        assert_eq!(d.record(true), ProbeOutcome::Steady);
        assert!(d.think_online());
        assert_eq!(d.record(true), ProbeOutcome::Steady);
        assert_eq!(d.counter(), ONLINE_CONFIRMED);
    }

    #[test]
    fn test_probe_intervals() {
        let mut d = detector();
        let t = Timestamp::from_millis(1_000);
        assert!(d.poll(t).is_some());
        assert!(d.poll(t + Duration::from_secs(59)).is_none());
        assert!(d.poll(t + Duration::from_secs(61)).is_some());

        for _ in 0..3 {
            d.record(false);
        }
        let t = t + Duration::from_secs(200);
        assert!(d.poll(t).is_some());
        assert!(d.poll(t + Duration::from_secs(11)).is_some());
    }

    #[test]
    fn test_no_hosts() {
        let mut d = OnlineDetector::new(Vec::new());
        assert!(d.poll(Timestamp::from_millis(1)).is_none());
        assert_eq!(d.record(false), ProbeOutcome::Steady);
    }

    #[tokio::test]
    async fn test_probe_local_listener() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        assert!(probe_host(&addr, Duration::from_secs(2)).await);
    }
}
