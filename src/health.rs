//! Backend health monitor
//!
//! Polls the health endpoint on a fixed interval and publishes the latest
//! connectivity through a watch channel. The first check runs immediately.

use crate::backend::ChatBackend;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// Default polling interval
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(10);

/// Latest known backend connectivity
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HealthStatus {
    pub connected: bool,
    /// Model name reported by the last successful check
    pub model: Option<String>,
}

pub struct HealthMonitor {
    status: watch::Receiver<HealthStatus>,
    cancel: CancellationToken,
}

impl HealthMonitor {
    /// Start polling `backend` every `interval` until stopped or dropped
    pub fn spawn<B>(backend: B, interval: Duration) -> Self
    where
        B: ChatBackend + 'static,
    {
        let (tx, rx) = watch::channel(HealthStatus::default());
        let cancel = CancellationToken::new();
        let token = cancel.clone();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    biased;
                    () = token.cancelled() => break,
                    _ = ticker.tick() => check_once(&backend, &tx).await,
                }
            }
            tracing::debug!("Health monitor stopped");
        });

        Self {
            status: rx,
            cancel,
        }
    }

    pub fn status(&self) -> HealthStatus {
        self.status.borrow().clone()
    }

    pub fn is_connected(&self) -> bool {
        self.status.borrow().connected
    }

    pub fn subscribe(&self) -> watch::Receiver<HealthStatus> {
        self.status.clone()
    }

    pub fn stop(&self) {
        self.cancel.cancel();
    }
}

impl Drop for HealthMonitor {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Run one check and publish the result. Only changes wake subscribers.
pub async fn check_once<B>(backend: &B, tx: &watch::Sender<HealthStatus>)
where
    B: ChatBackend + ?Sized,
{
    let report = backend.check_health().await;

    tx.send_if_modified(|current| {
        let next = match &report {
            Ok(report) => HealthStatus {
                connected: true,
                model: Some(report.model.clone())
                    .filter(|m| !m.is_empty())
                    .or_else(|| current.model.clone()),
            },
            // Last known model stays visible while disconnected
            Err(_) => HealthStatus {
                connected: false,
                model: current.model.clone(),
            },
        };
        if *current == next {
            return false;
        }
        if current.connected != next.connected {
            match &report {
                Ok(_) => tracing::info!(model = ?next.model, "Backend connected"),
                Err(e) => tracing::warn!(error = %e, "Backend unreachable"),
            }
        }
        *current = next;
        true
    });
}
