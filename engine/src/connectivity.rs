//! Connectivity monitor.
//!
//! Two inputs decide whether the engine treats the remote as reachable:
//!
//! - the host platform's reachability signal, and
//! - the outcome of real remote calls.
//!
//! The platform can claim to be online while every request fails (captive
//! portals, a dead backend). A network failure therefore forces the monitor
//! offline until the next remote success, a fresh platform "online" signal,
//! or a [`ConnectivityMonitor::probe`].

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::watch;

/// Effective reachability of the remote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Connectivity {
    Online,
    Offline,
}

impl Connectivity {
    pub fn is_online(&self) -> bool {
        matches!(self, Connectivity::Online)
    }
}

impl fmt::Display for Connectivity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Connectivity::Online => write!(f, "online"),
            Connectivity::Offline => write!(f, "offline"),
        }
    }
}

#[derive(Debug)]
struct Signals {
    platform_online: bool,
    remote_reachable: bool,
}

impl Signals {
    fn effective(&self) -> Connectivity {
        if self.platform_online && self.remote_reachable {
            Connectivity::Online
        } else {
            Connectivity::Offline
        }
    }
}

/// Tracks online/offline state and broadcasts transitions.
#[derive(Debug)]
pub struct ConnectivityMonitor {
    signals: Mutex<Signals>,
    tx: watch::Sender<Connectivity>,
}

impl ConnectivityMonitor {
    /// Create a monitor with the platform's current reachability.
    pub fn new(platform_online: bool) -> Self {
        let signals = Signals {
            platform_online,
            remote_reachable: true,
        };
        let (tx, _rx) = watch::channel(signals.effective());
        Self {
            signals: Mutex::new(signals),
            tx,
        }
    }

    /// Current effective state.
    pub fn state(&self) -> Connectivity {
        *self.tx.borrow()
    }

    pub fn is_online(&self) -> bool {
        self.state().is_online()
    }

    /// What the platform last reported, regardless of remote failures.
    pub fn platform_online(&self) -> bool {
        self.signals.lock().platform_online
    }

    /// Receive every state change. The receiver sees the current value as
    /// already seen; `changed()` resolves on the next transition.
    pub fn subscribe(&self) -> watch::Receiver<Connectivity> {
        self.tx.subscribe()
    }

    /// Host platform reachability changed. Going online also clears any
    /// earlier remote failure: the next remote call decides again.
    pub fn set_platform_online(&self, online: bool) {
        let mut signals = self.signals.lock();
        signals.platform_online = online;
        if online {
            signals.remote_reachable = true;
        }
        self.publish(&signals);
    }

    /// A remote call failed at the network level.
    pub fn report_unreachable(&self) {
        let mut signals = self.signals.lock();
        signals.remote_reachable = false;
        self.publish(&signals);
    }

    /// A remote call succeeded.
    pub fn report_reachable(&self) {
        let mut signals = self.signals.lock();
        signals.remote_reachable = true;
        self.publish(&signals);
    }

    /// Give the remote another chance after a forced offline. Returns true
    /// if this brought the monitor back online.
    pub fn probe(&self) -> bool {
        let mut signals = self.signals.lock();
        if signals.platform_online && !signals.remote_reachable {
            signals.remote_reachable = true;
            self.publish(&signals);
            return true;
        }
        false
    }

    fn publish(&self, signals: &Signals) {
        let next = signals.effective();
        let changed = self.tx.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            *current = next;
            true
        });
        if changed {
            tracing::info!(
                state = %next,
                platform_online = signals.platform_online,
                remote_reachable = signals.remote_reachable,
                "connectivity changed"
            );
        }
    }
}

impl Default for ConnectivityMonitor {
    fn default() -> Self {
        Self::new(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn follows_platform_signal() {
        let monitor = ConnectivityMonitor::new(false);
        assert_eq!(monitor.state(), Connectivity::Offline);

        monitor.set_platform_online(true);
        assert!(monitor.is_online());

        monitor.set_platform_online(false);
        assert!(!monitor.is_online());
    }

    #[test]
    fn false_online_is_corrected() {
        let monitor = ConnectivityMonitor::new(true);
        monitor.report_unreachable();

        assert!(!monitor.is_online());
        assert!(monitor.platform_online());

        monitor.report_reachable();
        assert!(monitor.is_online());
    }

    #[test]
    fn remote_success_cannot_override_platform_offline() {
        let monitor = ConnectivityMonitor::new(false);
        monitor.report_reachable();
        assert!(!monitor.is_online());
    }

    #[test]
    fn probe_only_recovers_forced_offline() {
        let monitor = ConnectivityMonitor::new(true);
        assert!(!monitor.probe());

        monitor.report_unreachable();
        assert!(monitor.probe());
        assert!(monitor.is_online());

        monitor.set_platform_online(false);
        assert!(!monitor.probe());
        assert!(!monitor.is_online());
    }

    #[tokio::test]
    async fn subscribers_see_transitions_once() {
        let monitor = ConnectivityMonitor::new(false);
        let mut rx = monitor.subscribe();

        monitor.set_platform_online(true);
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow_and_update(), Connectivity::Online);

        // Same state again: no notification.
        monitor.report_reachable();
        assert!(!rx.has_changed().unwrap());

        monitor.report_unreachable();
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow_and_update(), Connectivity::Offline);
    }
}
