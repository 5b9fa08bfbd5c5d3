//! One-shot stop signal shared by the cache loop and notification subscriptions.

use tokio::sync::watch;

/// Owning side of a stop signal. Dropping it fires the signal too.
#[derive(Debug)]
pub struct StopHandle {
    tx: watch::Sender<bool>,
}

/// Observing side of a stop signal.
#[derive(Debug, Clone)]
pub struct StopSignal {
    rx: watch::Receiver<bool>,
}

/// Create a connected handle/signal pair.
pub fn stop_signal() -> (StopHandle, StopSignal) {
    let (tx, rx) = watch::channel(false);
    (StopHandle { tx }, StopSignal { rx })
}

impl StopHandle {
    pub fn stop(&self) {
        self.tx.send_replace(true);
    }

    pub fn signal(&self) -> StopSignal {
        StopSignal {
            rx: self.tx.subscribe(),
        }
    }
}

impl StopSignal {
    pub fn is_stopped(&self) -> bool {
        *self.rx.borrow() || self.rx.has_changed().is_err()
    }

    /// Resolve once the signal fires or its handle is dropped.
    pub async fn stopped(&mut self) {
        // `wait_for` errors only when the sender is gone, which also means stop.
        let _ = self.rx.wait_for(|stopped| *stopped).await;
    }
}
