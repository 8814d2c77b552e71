//! Periodic renewal task for private stream sessions.

use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::domain::VenueId;
use crate::error::VenueError;

/// Runs `renew` every `interval` until dropped or stopped.
#[derive(Debug)]
pub struct KeepAlive {
    handle: JoinHandle<()>,
}

impl KeepAlive {
    pub fn spawn<F, Fut>(venue: VenueId, name: &'static str, interval: Duration, mut renew: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), VenueError>> + Send + 'static,
    {
        let handle = tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                match renew().await {
                    Ok(()) => debug!(venue = %venue, task = name, "Keep-alive renewed"),
                    Err(err) => warn!(venue = %venue, task = name, error = %err, "Keep-alive failed"),
                }
            }
        });
        Self { handle }
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }

    pub fn stop(&self) {
        self.handle.abort();
    }
}

impl Drop for KeepAlive {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn renews_on_interval_until_stopped() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let keepalive = KeepAlive::spawn(VenueId::Binance, "listen_key", Duration::from_secs(60), move || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        });

        tokio::time::sleep(Duration::from_secs(185)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        keepalive.stop();
        tokio::time::sleep(Duration::from_secs(600)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn failures_do_not_stop_renewal() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let _keepalive = KeepAlive::spawn(VenueId::Binance, "listen_key", Duration::from_secs(10), move || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(VenueError::Network("reset".into()))
            }
        });

        tokio::time::sleep(Duration::from_secs(35)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
