//! Stop signal shared by the file server and the rate-limit sweeper.
//!
//! A signal handler (or a test) fires the stop once. Every receiver handed
//! out by [`Shutdown::subscribe`] sees it, including receivers taken after
//! the stop already fired, so a sweeper started late during shutdown still
//! exits.

use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::broadcast;

pub struct Shutdown {
    tx: broadcast::Sender<()>,
    stopped: AtomicBool,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self {
            tx,
            stopped: AtomicBool::new(false),
        }
    }

    /// Receiver that resolves once the stop fires.
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        let rx = self.tx.subscribe();
        if self.is_stopped() {
            // The original send happened before this receiver existed.
            let _ = self.tx.send(());
        }
        rx
    }

    /// Fire the stop. Returns how many receivers were notified; repeated
    /// calls notify nobody.
    pub fn trigger(&self) -> usize {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return 0;
        }
        let notified = self.tx.send(()).unwrap_or(0);
        tracing::debug!(listeners = notified, "Stop signal sent");
        notified
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Receivers that have not been dropped yet.
    pub fn listeners(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}
