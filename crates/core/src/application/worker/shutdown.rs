// Shutdown Token
// One signal, owned by the supervisor, observed by every consumer loop and in-flight forward

use tokio::sync::watch;

/// Shutdown signal for graceful termination
#[derive(Clone)]
pub struct ShutdownToken {
    rx: watch::Receiver<bool>,
}

impl ShutdownToken {
    /// Check if shutdown was requested
    pub fn is_shutdown(&self) -> bool {
        *self.rx.borrow()
    }

    /// Wait for shutdown signal.
    ///
    /// Returns immediately if shutdown already fired, and also when the
    /// sender is gone (nobody is left to keep the loops alive).
    pub async fn wait(&mut self) {
        let _ = self.rx.wait_for(|stop| *stop).await;
    }
}

/// Shutdown sender
pub struct ShutdownSender {
    tx: watch::Sender<bool>,
}

impl ShutdownSender {
    /// Signal shutdown to all workers.
    ///
    /// Returns true only for the call that actually fired the signal.
    pub fn shutdown(&self) -> bool {
        !self.tx.send_replace(true)
    }

    pub fn is_shutdown(&self) -> bool {
        *self.tx.borrow()
    }

    /// Hand out another token tied to this sender
    pub fn token(&self) -> ShutdownToken {
        ShutdownToken {
            rx: self.tx.subscribe(),
        }
    }
}

/// Create a shutdown channel
pub fn shutdown_channel() -> (ShutdownSender, ShutdownToken) {
    let (tx, rx) = watch::channel(false);
    (ShutdownSender { tx }, ShutdownToken { rx })
}
