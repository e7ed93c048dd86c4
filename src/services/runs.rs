//! `pipeline_runs` bookkeeping shared by every scheduled or manual job.

use chrono::Utc;
use sea_orm::{ActiveModelTrait, DatabaseConnection, DbErr, Set};
use std::sync::Arc;
use uuid::Uuid;

use crate::entities::pipeline_run::{self, RunStatus};
use crate::utils::error_message;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunCounters {
    pub processed: u64,
    pub succeeded: u64,
    pub failed: u64,
}

impl RunCounters {
    pub fn status(&self) -> RunStatus {
        if self.failed > 0 {
            RunStatus::CompletedWithErrors
        } else {
            RunStatus::Completed
        }
    }
}

fn clamp(n: u64) -> i32 {
    i32::try_from(n).unwrap_or(i32::MAX)
}

/// An open `running` row. Dropping it without finishing leaves the row as
/// `running`, which is how a crashed job shows up.
pub struct RunHandle {
    db: Arc<DatabaseConnection>,
    id: Option<Uuid>,
    run_type: &'static str,
}

impl RunHandle {
    /// Opens a row. Bookkeeping failures are logged, never fatal to the job.
    pub async fn start(db: &Arc<DatabaseConnection>, run_type: &'static str) -> Self {
        let row = pipeline_run::ActiveModel {
            id: Set(Uuid::new_v4()),
            run_type: Set(run_type.to_string()),
            status: Set(RunStatus::Running),
            items_processed: Set(0),
            items_succeeded: Set(0),
            items_failed: Set(0),
            started_at: Set(Utc::now().naive_utc()),
            finished_at: Set(None),
            error: Set(None),
            metadata: Set(serde_json::json!({})),
        };
        let id = match row.insert(db.as_ref()).await {
            Ok(model) => Some(model.id),
            Err(e) => {
                tracing::warn!("Pipeline Runs | Could not open {} run: {}", run_type, e);
                None
            }
        };
        Self {
            db: Arc::clone(db),
            id,
            run_type,
        }
    }

    pub fn id(&self) -> Option<Uuid> {
        self.id
    }

    pub async fn complete(self, counters: RunCounters, metadata: serde_json::Value) {
        let status = counters.status();
        self.close(status, counters, None, metadata).await;
    }

    pub async fn fail(self, counters: RunCounters, error: &str) {
        self.close(RunStatus::Failed, counters, Some(error_message(error)), serde_json::json!({}))
            .await;
    }

    async fn close(
        self,
        status: RunStatus,
        counters: RunCounters,
        error: Option<String>,
        metadata: serde_json::Value,
    ) {
        let Some(id) = self.id else { return };
        let row = pipeline_run::ActiveModel {
            id: Set(id),
            status: Set(status),
            items_processed: Set(clamp(counters.processed)),
            items_succeeded: Set(clamp(counters.succeeded)),
            items_failed: Set(clamp(counters.failed)),
            finished_at: Set(Some(Utc::now().naive_utc())),
            error: Set(error),
            metadata: Set(metadata),
            ..Default::default()
        };
        if let Err(e) = update(self.db.as_ref(), row).await {
            tracing::warn!("Pipeline Runs | Could not close {} run {}: {}", self.run_type, id, e);
        }
    }
}

async fn update(db: &DatabaseConnection, row: pipeline_run::ActiveModel) -> Result<(), DbErr> {
    row.update(db).await.map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failures_downgrade_the_final_status() {
        let clean = RunCounters { processed: 3, succeeded: 3, failed: 0 };
        assert_eq!(clean.status(), RunStatus::Completed);
        let partial = RunCounters { processed: 3, succeeded: 2, failed: 1 };
        assert_eq!(partial.status(), RunStatus::CompletedWithErrors);
        assert_eq!(clamp(u64::MAX), i32::MAX);
    }
}
