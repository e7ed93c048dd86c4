//! Multi-process enrichment. The parent splits the untagged ids across
//! child processes (`enrich-worker`), each running its own lane pool. They
//! talk in JSON lines: one `ids` message in, `progress` messages and a final
//! `done` message out.

use serde::{Deserialize, Serialize};
use std::process::Stdio;
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use uuid::Uuid;

use super::{EnrichOptions, EnrichReport, EnrichmentStore, EnrichmentWorker};

pub const DEFAULT_WORKERS: usize = 10;

#[derive(Debug, Error)]
pub enum TurboError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("database error: {0}")]
    Database(#[from] sea_orm::DbErr),
    #[error("bad worker message: {0}")]
    Protocol(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkerMessage {
    Ids { ids: Vec<Uuid> },
    Progress { batches: u64, tagged: u64, errors: u64 },
    Done { batches: u64, tagged: u64, errors: u64 },
}

impl WorkerMessage {
    fn progress(r: EnrichReport) -> Self {
        WorkerMessage::Progress { batches: r.batches, tagged: r.tagged, errors: r.errors }
    }

    fn done(r: EnrichReport) -> Self {
        WorkerMessage::Done { batches: r.batches, tagged: r.tagged, errors: r.errors }
    }
}

async fn write_message<W: AsyncWrite + Unpin>(out: &mut W, message: &WorkerMessage) -> Result<(), TurboError> {
    let mut line = serde_json::to_vec(message).map_err(|e| TurboError::Protocol(e.to_string()))?;
    line.push(b'\n');
    out.write_all(&line).await?;
    out.flush().await?;
    Ok(())
}

/// Splits `ids` into at most `parts` contiguous, nearly equal shares.
pub fn split_ids(ids: &[Uuid], parts: usize) -> Vec<Vec<Uuid>> {
    if ids.is_empty() {
        return Vec::new();
    }
    let per = ids.len().div_ceil(parts.max(1));
    ids.chunks(per).map(|c| c.to_vec()).collect()
}

/// Child side: reads the assignment, enriches it, streams progress back.
pub async fn serve_worker<R, W>(worker: &EnrichmentWorker, input: R, mut output: W) -> Result<EnrichReport, TurboError>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = input.lines();
    let first = lines
        .next_line()
        .await?
        .ok_or_else(|| TurboError::Protocol("no assignment received".into()))?;
    let ids = match serde_json::from_str::<WorkerMessage>(&first) {
        Ok(WorkerMessage::Ids { ids }) => ids,
        Ok(other) => return Err(TurboError::Protocol(format!("expected ids, got {:?}", other))),
        Err(e) => return Err(TurboError::Protocol(e.to_string())),
    };

    let items = worker.store().by_ids(&ids).await?;
    let (tx, mut rx) = mpsc::unbounded_channel();
    let enrich = worker.enrich(items, move |r| {
        let _ = tx.send(r);
    });
    let forward = async {
        while let Some(report) = rx.recv().await {
            write_message(&mut output, &WorkerMessage::progress(report)).await?;
        }
        Ok::<_, TurboError>(())
    };
    let (report, forwarded) = tokio::join!(enrich, forward);
    forwarded?;

    write_message(&mut output, &WorkerMessage::done(report)).await?;
    Ok(report)
}

/// Parent side: follows one child's output until `done`, or `None` if the
/// stream ends first.
pub async fn follow_worker<R: AsyncBufRead + Unpin>(worker: usize, output: R) -> Result<Option<EnrichReport>, TurboError> {
    let mut lines = output.lines();
    while let Some(line) = lines.next_line().await? {
        match serde_json::from_str::<WorkerMessage>(&line) {
            Ok(WorkerMessage::Progress { batches, tagged, errors }) => tracing::info!(
                "Enrichment Turbo | worker {} | {} batches, {} tagged, {} errors",
                worker,
                batches,
                tagged,
                errors
            ),
            Ok(WorkerMessage::Done { batches, tagged, errors }) => {
                return Ok(Some(EnrichReport { batches, tagged, errors }));
            }
            Ok(WorkerMessage::Ids { .. }) => {
                return Err(TurboError::Protocol("worker echoed an assignment".into()))
            }
            // Anything else on stdout is a stray log line.
            Err(_) => tracing::debug!("Enrichment Turbo | worker {} | {}", worker, line),
        }
    }
    Ok(None)
}

async fn run_child(worker: usize, ids: Vec<Uuid>) -> Result<EnrichReport, TurboError> {
    let exe = std::env::current_exe()?;
    let mut child = Command::new(exe)
        .arg("enrich-worker")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        .kill_on_drop(true)
        .spawn()?;

    tracing::info!(
        "Enrichment Turbo | Spawned worker {} (pid {}) with {} assets",
        worker,
        child.id().unwrap_or(0),
        ids.len()
    );

    let assigned = ids.len() as u64;
    let mut stdin = child
        .stdin
        .take()
        .ok_or_else(|| TurboError::Protocol("child stdin unavailable".into()))?;
    write_message(&mut stdin, &WorkerMessage::Ids { ids }).await?;
    drop(stdin);

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| TurboError::Protocol("child stdout unavailable".into()))?;
    let report = follow_worker(worker, BufReader::new(stdout)).await?;
    let status = child.wait().await?;

    match report {
        Some(r) => Ok(r),
        None => {
            tracing::error!("Enrichment Turbo | Worker {} exited ({}) without finishing", worker, status);
            Ok(EnrichReport { batches: 0, tagged: 0, errors: assigned })
        }
    }
}

/// Parent entry point.
pub async fn run_turbo(
    store: &dyn EnrichmentStore,
    options: EnrichOptions,
    workers: usize,
) -> Result<EnrichReport, TurboError> {
    let items = store.untagged(options.force, options.limit).await?;
    let ids: Vec<Uuid> = items.iter().map(|i| i.id).collect();
    let shares = split_ids(&ids, workers);
    tracing::info!(
        "Enrichment Turbo | {} assets across {} workers",
        ids.len(),
        shares.len()
    );

    let results = futures::future::join_all(
        shares
            .into_iter()
            .enumerate()
            .map(|(i, share)| run_child(i + 1, share)),
    )
    .await;

    let mut total = EnrichReport::default();
    for (i, result) in results.into_iter().enumerate() {
        match result {
            Ok(r) => {
                total.batches += r.batches;
                total.tagged += r.tagged;
                total.errors += r.errors;
            }
            Err(e) => tracing::error!("Enrichment Turbo | Worker {} failed: {}", i + 1, e),
        }
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::super::tests::{items, MemoryStore};
    use super::super::classifier::{Classification, Classifier, ClassifierError, ClassifyItem, ItemResult};
    use super::*;
    use async_trait::async_trait;
    use std::sync::Arc;

    struct Plain;

    #[async_trait]
    impl Classifier for Plain {
        async fn classify(&self, items: &[ClassifyItem]) -> Result<Vec<ItemResult>, ClassifierError> {
            Ok(vec![Ok(Classification { style: Some("Abstract".into()), ..Default::default() }); items.len()])
        }
    }

    #[test]
    fn ids_split_evenly() {
        let ids: Vec<Uuid> = (0..25u128).map(Uuid::from_u128).collect();
        let shares = split_ids(&ids, 10);
        assert_eq!(shares.len(), 9);
        assert!(shares.iter().all(|s| s.len() <= 3));
        assert_eq!(shares.concat(), ids);
        assert!(split_ids(&[], 4).is_empty());
    }

    #[test]
    fn messages_are_tagged_json() {
        let line = serde_json::to_string(&WorkerMessage::Done { batches: 1, tagged: 2, errors: 0 }).unwrap();
        assert_eq!(line, r#"{"type":"done","batches":1,"tagged":2,"errors":0}"#);
    }

    #[tokio::test]
    async fn worker_protocol_round_trip() {
        let store = Arc::new(MemoryStore::default());
        let worker = EnrichmentWorker::new(Arc::new(Plain), store.clone());
        let ids: Vec<Uuid> = items(30).iter().map(|i| i.id).collect();
        let input = format!("{}\n", serde_json::to_string(&WorkerMessage::Ids { ids }).unwrap());

        let mut output = Vec::new();
        let report = serve_worker(&worker, input.as_bytes(), &mut output).await.unwrap();
        assert_eq!(report.tagged, 30);
        assert_eq!(store.written.lock().unwrap().len(), 30);

        let followed = follow_worker(1, output.as_slice()).await.unwrap();
        assert_eq!(followed, Some(report));
    }

    #[tokio::test]
    async fn truncated_stream_reports_nothing() {
        let partial = b"{\"type\":\"progress\",\"batches\":1,\"tagged\":25,\"errors\":0}\nwarming up\n";
        assert_eq!(follow_worker(1, &partial[..]).await.unwrap(), None);
    }
}
