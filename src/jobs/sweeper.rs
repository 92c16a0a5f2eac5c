use anyhow::Result;
use std::time::Duration;
use time::OffsetDateTime;
use tracing::{info, warn};

use crate::app::notifications::NotificationService;

const ERROR_BACKOFF_MS: u64 = 1000;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Scheduled notifications whose fan-out ran this pass.
    pub dispatched: usize,
    /// Expired rows removed this pass.
    pub purged: u64,
}

/// Periodic sweep loop: dispatch due scheduled notifications, then purge
/// expired ones. Each pass is idempotent, so any cadence (and overlapping
/// restarts) is safe.
pub async fn run(service: NotificationService, interval: Duration) -> Result<()> {
    info!("notification sweeper started");
    loop {
        match sweep_once(&service).await {
            Ok(report) => {
                if report.dispatched > 0 || report.purged > 0 {
                    info!(
                        dispatched = report.dispatched,
                        purged = report.purged,
                        "sweep completed"
                    );
                }
            }
            Err(err) => {
                warn!(error = ?err, "sweep failed, backing off");
                tokio::time::sleep(Duration::from_millis(ERROR_BACKOFF_MS)).await;
            }
        }
        tokio::time::sleep(interval).await;
    }
}

pub async fn sweep_once(service: &NotificationService) -> Result<SweepReport> {
    let now = OffsetDateTime::now_utc();
    let dispatched = service.dispatch_due(now).await?;
    let purged = service.purge_expired(now).await?;
    Ok(SweepReport { dispatched, purged })
}
