//! User-facing notices raised by the durability pipeline.
//!
//! The UI layer subscribes to a [`Notifier`] and renders each [`Notice`] as a
//! toast. Wording is the UI's business; the variants and their counts are
//! what callers rely on.

use tokio::sync::broadcast;
use tracing::{info, warn};

const NOTICE_CHANNEL_CAPACITY: usize = 64;

/// How a resend pass ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResendOutcome {
    /// Every envelope of the batch was accepted.
    AllSent,
    /// Some, but not all, envelopes were accepted.
    Partial,
    /// Nothing from a non-empty batch was accepted.
    NoneSent,
}

impl ResendOutcome {
    pub const fn classify(sent: usize, total: usize) -> Self {
        if sent >= total {
            Self::AllSent
        } else if sent == 0 {
            Self::NoneSent
        } else {
            Self::Partial
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    /// A check-in was deferred to the device queue.
    SavedOnDevice,
    /// A check-in could be neither sent nor stored.
    NotRecorded { reason: String },
    /// Connectivity came back. `pending` is informational.
    BackOnline { pending: usize },
    WentOffline { pending: usize },
    ResendStarted { pending: usize },
    ResendFinished {
        sent: usize,
        total: usize,
        outcome: ResendOutcome,
    },
}

/// Broadcast fan-out of notices. Cloning shares the channel.
#[derive(Debug, Clone)]
pub struct Notifier {
    tx: broadcast::Sender<Notice>,
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new()
    }
}

impl Notifier {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(NOTICE_CHANNEL_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notice> {
        self.tx.subscribe()
    }

    /// Publish a notice. Having no subscribers is not an error.
    pub fn notify(&self, notice: Notice) {
        match &notice {
            Notice::NotRecorded { reason } => warn!(%reason, "Check-in was not recorded"),
            Notice::ResendFinished {
                outcome: ResendOutcome::NoneSent,
                total,
                ..
            } => warn!(total, "No pending check-ins could be resent"),
            other => info!(notice = ?other, "Notice"),
        }
        let _ = self.tx.send(notice);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn classify_outcomes() {
        assert_eq!(ResendOutcome::classify(3, 3), ResendOutcome::AllSent);
        assert_eq!(ResendOutcome::classify(1, 3), ResendOutcome::Partial);
        assert_eq!(ResendOutcome::classify(0, 3), ResendOutcome::NoneSent);
    }

    #[tokio::test]
    async fn subscribers_receive_notices_in_order() {
        let notifier = Notifier::new();
        let mut rx = notifier.subscribe();

        notifier.notify(Notice::ResendStarted { pending: 2 });
        notifier.notify(Notice::SavedOnDevice);

        assert_eq!(rx.recv().await.unwrap(), Notice::ResendStarted { pending: 2 });
        assert_eq!(rx.recv().await.unwrap(), Notice::SavedOnDevice);
    }

    #[test]
    fn notify_without_subscribers_is_fine() {
        Notifier::new().notify(Notice::WentOffline { pending: 0 });
    }
}
