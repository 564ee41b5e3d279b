//! Connectivity tracking
//!
//! The engine never probes the network itself; the embedding application
//! reports transitions from whatever host signal it has (OS callbacks,
//! heartbeats, a browser shell's online events). Transitions are
//! edge-triggered: setting the same state twice notifies nobody.

use tokio::sync::watch;
use tracing::info;

pub struct ConnectivityMonitor {
    tx: watch::Sender<bool>,
}

impl ConnectivityMonitor {
    pub fn new(initially_online: bool) -> Self {
        let (tx, _) = watch::channel(initially_online);
        Self { tx }
    }

    /// Current connectivity condition
    pub fn is_online(&self) -> bool {
        *self.tx.borrow()
    }

    /// Report a host connectivity signal; subscribers wake only on change
    pub fn set_online(&self, online: bool) {
        let changed = self.tx.send_if_modified(|current| {
            if *current != online {
                *current = online;
                true
            } else {
                false
            }
        });
        if changed {
            info!(online, "Connectivity changed");
        }
    }

    /// Watch for transitions; the receiver always holds the latest state
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_initial_state() {
        assert!(ConnectivityMonitor::new(true).is_online());
        assert!(!ConnectivityMonitor::new(false).is_online());
    }

    #[tokio::test]
    async fn test_transition_wakes_subscriber() {
        let monitor = ConnectivityMonitor::new(false);
        let mut rx = monitor.subscribe();

        monitor.set_online(true);
        rx.changed().await.unwrap();
        assert!(*rx.borrow());
    }

    #[tokio::test]
    async fn test_same_state_does_not_notify() {
        let monitor = ConnectivityMonitor::new(true);
        let mut rx = monitor.subscribe();
        rx.mark_unchanged();

        monitor.set_online(true);
        assert!(!rx.has_changed().unwrap());
    }
}
