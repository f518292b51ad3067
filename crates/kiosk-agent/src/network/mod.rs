//! Connectivity tracking.
//!
//! [`ConnectivityState`] is the single writer of the process' online flag.
//! It is owned by the [`NetworkMonitor`]; everything else reads it through a
//! [`ConnectivityHandle`].

mod monitor;
mod probe;

use tokio::sync::watch;

pub use monitor::{MonitorConfig, NetworkMonitor, SignalSender};
pub use probe::{probe_once, spawn_probe_task};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connectivity {
    Online,
    Offline,
}

impl Connectivity {
    pub const fn is_online(self) -> bool {
        matches!(self, Self::Online)
    }
}

/// Owned connectivity flag with edge detection.
#[derive(Debug)]
pub struct ConnectivityState {
    tx: watch::Sender<Connectivity>,
}

impl ConnectivityState {
    pub fn new(initial: Connectivity) -> Self {
        let (tx, _) = watch::channel(initial);
        Self { tx }
    }

    pub fn current(&self) -> Connectivity {
        *self.tx.borrow()
    }

    /// Record an observation. Returns the new state only when it differs
    /// from the previous one; repeated observations are absorbed.
    pub fn observe(&self, observed: Connectivity) -> Option<Connectivity> {
        let changed = self.tx.send_if_modified(|current| {
            if *current == observed {
                false
            } else {
                *current = observed;
                true
            }
        });
        changed.then_some(observed)
    }

    pub fn handle(&self) -> ConnectivityHandle {
        ConnectivityHandle {
            rx: self.tx.subscribe(),
        }
    }
}

/// Read-only view of the connectivity flag.
#[derive(Debug, Clone)]
pub struct ConnectivityHandle {
    rx: watch::Receiver<Connectivity>,
}

impl ConnectivityHandle {
    pub fn current(&self) -> Connectivity {
        *self.rx.borrow()
    }

    pub fn is_online(&self) -> bool {
        self.current().is_online()
    }

    /// Wait for the next transition. `None` once the owning state is gone.
    pub async fn changed(&mut self) -> Option<Connectivity> {
        self.rx.changed().await.ok()?;
        Some(*self.rx.borrow_and_update())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn repeated_observations_are_not_edges() {
        let state = ConnectivityState::new(Connectivity::Online);
        assert_eq!(state.observe(Connectivity::Online), None);
        assert_eq!(
            state.observe(Connectivity::Offline),
            Some(Connectivity::Offline)
        );
        assert_eq!(state.observe(Connectivity::Offline), None);
        assert_eq!(state.observe(Connectivity::Online), Some(Connectivity::Online));
    }

    #[test]
    fn handles_see_current_state() {
        let state = ConnectivityState::new(Connectivity::Offline);
        let handle = state.handle();
        assert!(!handle.is_online());

        state.observe(Connectivity::Online);
        assert!(handle.is_online());
    }

    #[tokio::test]
    async fn changed_reports_edges_and_closes_with_state() {
        let state = ConnectivityState::new(Connectivity::Offline);
        let mut handle = state.handle();

        state.observe(Connectivity::Online);
        assert_eq!(handle.changed().await, Some(Connectivity::Online));

        drop(state);
        assert_eq!(handle.changed().await, None);
    }
}
