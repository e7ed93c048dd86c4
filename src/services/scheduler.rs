//! Periodic jobs. A trigger that finds its previous run still active is
//! skipped, never queued.

use chrono::{DateTime, Duration as ChronoDuration, FixedOffset, Utc};
use sea_orm::{ConnectionTrait, DatabaseConnection, DbErr, Statement};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::services::drip::bucket::LOCAL_OFFSET_SECS;
use crate::services::drip::DripState;
use crate::services::enrichment::EnrichOptions;
use crate::services::orchestration::{enrich_counters, Pipeline};
use crate::services::runs::{RunCounters, RunHandle};
use crate::services::scanner::{ScanMode, ScanOutcome};

pub const HEALTH_EVERY: Duration = Duration::from_secs(6 * 3600);
pub const TRENDING_EVERY: Duration = Duration::from_secs(3600);
pub const NIGHTLY_INGEST_CAP: u64 = 1000;
pub const NIGHTLY_INGEST_LANES: usize = 5;

/// Time from `now` until the next `hour:00` at the local offset.
pub fn until_local_hour(now: DateTime<Utc>, hour: u32) -> Duration {
    let next = FixedOffset::east_opt(LOCAL_OFFSET_SECS).and_then(|offset| {
        let local = now.with_timezone(&offset);
        let today = local.date_naive().and_hms_opt(hour, 0, 0)?.and_local_timezone(offset).single()?;
        Some(if today > local {
            today
        } else {
            today + ChronoDuration::days(1)
        })
    });
    next.and_then(|t| (t.with_timezone(&Utc) - now).to_std().ok())
        .unwrap_or(Duration::from_secs(24 * 3600))
}

/// Single-runner flag for one job.
#[derive(Default)]
pub struct JobGuard {
    running: AtomicBool,
}

struct Release<'a>(&'a AtomicBool);

impl Drop for Release<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl JobGuard {
    /// Runs `job` unless a previous run holds the flag. Returns whether it ran.
    pub async fn run<F, Fut>(&self, name: &str, job: F) -> bool
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = ()>,
    {
        if self.running.swap(true, Ordering::SeqCst) {
            tracing::info!("Scheduler | {} still running, skipping this trigger", name);
            return false;
        }
        let _release = Release(&self.running);
        job().await;
        true
    }
}

pub async fn refresh_trending(db: &DatabaseConnection) -> Result<(), DbErr> {
    db.execute(Statement::from_string(
        db.get_database_backend(),
        "REFRESH MATERIALIZED VIEW CONCURRENTLY trending_products".to_owned(),
    ))
    .await?;
    Ok(())
}

pub struct Scheduler {
    pipeline: Arc<Pipeline>,
    ingest_hour: u32,
    sync_hour: u32,
    sync_cap: u64,
    ingest: Arc<JobGuard>,
    sync: Arc<JobGuard>,
    health: Arc<JobGuard>,
    trending: Arc<JobGuard>,
}

impl Scheduler {
    pub fn new(pipeline: Arc<Pipeline>, ingest_hour: u32, sync_hour: u32, sync_cap: u64) -> Self {
        Self {
            pipeline,
            ingest_hour,
            sync_hour,
            sync_cap,
            ingest: Arc::default(),
            sync: Arc::default(),
            health: Arc::default(),
            trending: Arc::default(),
        }
    }

    /// Spawns every loop. The delta-scan watcher is started separately
    /// through the pipeline.
    pub fn spawn(self) {
        let this = Arc::new(self);
        tracing::info!(
            "Scheduler | Started (ingest at {:02}:00, sync at {:02}:00 local)",
            this.ingest_hour,
            this.sync_hour
        );

        let s = this.clone();
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(until_local_hour(Utc::now(), s.ingest_hour)).await;
                let job = s.clone();
                tokio::spawn(async move {
                    job.ingest.run("Nightly ingest", || job.nightly_ingest()).await;
                });
            }
        });

        let s = this.clone();
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(until_local_hour(Utc::now(), s.sync_hour)).await;
                let job = s.clone();
                tokio::spawn(async move {
                    job.sync.run("Nightly sync", || job.nightly_sync()).await;
                });
            }
        });

        let s = this.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(HEALTH_EVERY);
            loop {
                interval.tick().await;
                let job = s.clone();
                tokio::spawn(async move {
                    job.health.run("Health probe", || job.health_probe()).await;
                });
            }
        });

        let s = this;
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(TRENDING_EVERY);
            loop {
                interval.tick().await;
                let job = s.clone();
                tokio::spawn(async move {
                    job.trending.run("Trending refresh", || job.refresh_trending()).await;
                });
            }
        });
    }

    /// Delta scan, then a bounded enrichment and embedding top-up.
    pub async fn nightly_ingest(&self) {
        tracing::info!("Scheduler | Nightly ingest starting");
        match self.pipeline.scan(ScanMode::Delta).await {
            Ok(ScanOutcome::Completed(report)) => {
                tracing::info!("Scheduler | Nightly scan inserted {} assets", report.ingest.inserted)
            }
            Ok(ScanOutcome::AlreadyRunning) => tracing::info!("Scheduler | Scan already in flight"),
            Err(e) => tracing::warn!("Scheduler | Nightly scan skipped: {}", e),
        }

        let options = EnrichOptions {
            force: false,
            limit: Some(NIGHTLY_INGEST_CAP),
        };
        match self.pipeline.enrich_with_lanes(options, NIGHTLY_INGEST_LANES).await {
            Ok(report) => {
                let c = enrich_counters(&report);
                tracing::info!("Scheduler | Nightly enrichment: {} tagged, {} errors", c.succeeded, c.failed)
            }
            Err(e) => tracing::warn!("Scheduler | Nightly enrichment skipped: {}", e),
        }

        match self.pipeline.embed(Some(NIGHTLY_INGEST_CAP)).await {
            Ok(report) => tracing::info!("Scheduler | Nightly embeddings: {} stored", report.embedded),
            Err(e) => tracing::warn!("Scheduler | Nightly embeddings skipped: {}", e),
        }
    }

    pub async fn nightly_sync(&self) {
        let Some(drip) = self.pipeline.drip() else {
            tracing::warn!("Scheduler | Nightly sync skipped: catalog is not configured");
            return;
        };
        if drip.status().state != DripState::Stopped {
            tracing::info!("Scheduler | Drip already active, nightly sync skipped");
            return;
        }

        let run = RunHandle::start(self.pipeline.db(), "nightly_sync").await;
        match drip.run_once(Some(self.sync_cap)).await {
            Ok(status) => {
                let counters = RunCounters {
                    processed: status.synced + status.errors,
                    succeeded: status.synced,
                    failed: status.errors,
                };
                run.complete(counters, serde_json::to_value(&status).unwrap_or_default())
                    .await;
            }
            Err(e) => run.fail(RunCounters::default(), &e.to_string()).await,
        }
    }

    pub async fn health_probe(&self) {
        let run = RunHandle::start(self.pipeline.db(), "health_check").await;
        let mut report = self.pipeline.health().await;
        // The probe forces a token exchange; the endpoint only reads the cache.
        if let Some(drive) = self.pipeline.drive() {
            report.drive_auth = Some(drive.auth().access_token().await.is_ok());
        }
        tracing::info!(
            "Scheduler | Health: store={} drive_auth={:?} drip={:?} cached_folders={}",
            report.store,
            report.drive_auth,
            report.drip,
            report.cached_folders
        );
        let failed = u64::from(!report.store) + u64::from(report.drive_auth == Some(false));
        let counters = RunCounters {
            processed: 2,
            succeeded: 2 - failed,
            failed,
        };
        run.complete(counters, serde_json::to_value(&report).unwrap_or_default())
            .await;
    }

    pub async fn refresh_trending(&self) {
        match refresh_trending(self.pipeline.db()).await {
            Ok(()) => tracing::debug!("Scheduler | Trending view refreshed"),
            Err(e) => tracing::warn!("Scheduler | Trending refresh failed: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn next_local_hour_later_today() {
        // 22:30Z is 23:30 local; 02:00 local tomorrow is 2.5 hours away.
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 22, 30, 0).unwrap();
        assert_eq!(until_local_hour(now, 2), Duration::from_secs(9000));
    }

    #[test]
    fn the_current_hour_rolls_to_tomorrow() {
        // 03:00Z is exactly 04:00 local.
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 3, 0, 0).unwrap();
        assert_eq!(until_local_hour(now, 4), Duration::from_secs(24 * 3600));
        assert_eq!(until_local_hour(now, 5), Duration::from_secs(3600));
    }

    #[tokio::test]
    async fn overlapping_triggers_are_skipped() {
        let guard = Arc::new(JobGuard::default());
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();

        let first = {
            let guard = guard.clone();
            tokio::spawn(async move {
                guard
                    .run("job", || async move {
                        let _ = rx.await;
                    })
                    .await
            })
        };
        tokio::task::yield_now().await;

        assert!(!guard.run("job", || async {}).await);
        tx.send(()).unwrap();
        assert!(first.await.unwrap());
        assert!(guard.run("job", || async {}).await);
    }
}
