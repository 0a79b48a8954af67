use anyhow::{bail, Context, Result};
use tokio::task::JoinHandle;
use tokio::time::{Duration, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::{service::RedirectAccountingService, stats::SyncReport};

const ENABLE_LOGS: bool = true;

use crate::{log_info, log_warn};

/// Background task that pushes pending redirects to the remote store on a
/// fixed period.
pub struct SyncWorker {
    handle: Option<JoinHandle<()>>,
    cancel_token: Option<CancellationToken>,
}

impl SyncWorker {
    pub fn new() -> Self {
        Self {
            handle: None,
            cancel_token: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }

    pub fn start(&mut self, service: RedirectAccountingService, period: Duration) -> Result<()> {
        if self.handle.is_some() {
            bail!("sync worker already running");
        }
        if period.is_zero() {
            bail!("sync period must be greater than zero");
        }

        let cancel_token = CancellationToken::new();
        let handle = tokio::spawn(sync_loop(service, period, cancel_token.clone()));

        self.handle = Some(handle);
        self.cancel_token = Some(cancel_token);
        Ok(())
    }

    pub async fn stop(&mut self) -> Result<()> {
        if let Some(token) = self.cancel_token.take() {
            token.cancel();
        }

        if let Some(handle) = self.handle.take() {
            handle.await.context("sync loop task failed to join")
        } else {
            Ok(())
        }
    }
}

impl Default for SyncWorker {
    fn default() -> Self {
        Self::new()
    }
}

async fn sync_loop(
    service: RedirectAccountingService,
    period: Duration,
    cancel_token: CancellationToken,
) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately; nothing has been recorded yet.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let SyncReport { synced, errors } = service.sync_pending_logs().await;
                if errors > 0 {
                    log_warn!("periodic sync left {errors} redirects pending");
                } else if synced > 0 {
                    log_info!("periodic sync pushed {synced} redirects");
                }
            }
            _ = cancel_token.cancelled() => {
                log_info!("sync loop shutting down");
                break;
            }
        }
    }
}
