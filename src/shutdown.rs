// src/shutdown.rs

//! The single cooperative shutdown signal shared by the fold loop, the event
//! source and every log reader.

use tokio::sync::watch;

/// Owner side. Dropping it counts as a shutdown request.
#[derive(Debug)]
pub struct ShutdownTrigger {
    tx: watch::Sender<bool>,
}

/// Observer side, cheap to clone.
#[derive(Debug, Clone)]
pub struct ShutdownToken {
    rx: watch::Receiver<bool>,
}

pub fn shutdown_channel() -> (ShutdownTrigger, ShutdownToken) {
    let (tx, rx) = watch::channel(false);
    (ShutdownTrigger { tx }, ShutdownToken { rx })
}

impl ShutdownTrigger {
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    pub fn token(&self) -> ShutdownToken {
        ShutdownToken {
            rx: self.tx.subscribe(),
        }
    }
}

impl ShutdownToken {
    pub fn is_shutdown(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once shutdown was requested.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        // An error means the trigger is gone, which is also a shutdown.
        let _ = rx.wait_for(|requested| *requested).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn token_observes_trigger() {
        let (trigger, token) = shutdown_channel();
        assert!(!token.is_shutdown());

        let waiter = {
            let token = token.clone();
            tokio::spawn(async move { token.cancelled().await })
        };
        trigger.trigger();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("cancelled() should resolve")
            .unwrap();
        assert!(token.is_shutdown());
    }

    #[tokio::test]
    async fn dropping_trigger_cancels() {
        let (trigger, token) = shutdown_channel();
        drop(trigger);
        tokio::time::timeout(Duration::from_secs(1), token.cancelled())
            .await
            .expect("dropped trigger should cancel");
    }
}
