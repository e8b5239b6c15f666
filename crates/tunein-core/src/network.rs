//! Network reachability signal.

use tokio::sync::watch;

/// Publishes online/offline transitions to subscribers.
#[derive(Debug)]
pub struct NetworkMonitor {
    sender: watch::Sender<bool>,
}

impl NetworkMonitor {
    #[must_use]
    pub fn new(initially_online: bool) -> Self {
        let (sender, _) = watch::channel(initially_online);
        Self { sender }
    }

    /// Record the current reachability; repeated values do not notify.
    pub fn set_online(&self, online: bool) {
        let changed = self.sender.send_if_modified(|current| {
            if *current == online {
                false
            } else {
                *current = online;
                true
            }
        });
        if changed {
            tracing::info!("Network is now {}", if online { "online" } else { "offline" });
        }
    }

    #[must_use]
    pub fn is_online(&self) -> bool {
        *self.sender.borrow()
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.sender.subscribe()
    }
}

impl Default for NetworkMonitor {
    fn default() -> Self {
        Self::new(true)
    }
}
