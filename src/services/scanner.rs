//! Discovers artwork files under the root folder and feeds them into the
//! asset store.
//!
//! The tree is `ROOT/<artist>/<quality bucket>/<file>`. A full scan walks it
//! top-down; a delta scan replays the change feed from the persisted token
//! and resolves each changed file's ancestry back to the root.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Mutex;

use crate::entities::asset::QualityTier;
use crate::services::drive::{DriveError, DriveFile, FileTree, ListKind};
use crate::services::store::{AssetSink, FileRecord, NewAsset};
use crate::services::sync_state::{StateError, SyncStateStore};
use crate::utils::concurrency::bounded_pool;

/// Concurrent artist sub-scans during a full enumeration.
const LISTING_CONCURRENCY: usize = 30;
/// Ancestry lookups stop after this many levels.
const MAX_ANCESTRY_DEPTH: usize = 5;
const DEDUP_CHUNK: usize = 500;
const INSERT_BATCH: usize = 500;
const INSERT_CONCURRENCY: usize = 5;

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp", "tif", "tiff", "bmp", "gif"];

#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error(transparent)]
    Drive(#[from] DriveError),
    #[error(transparent)]
    State(#[from] StateError),
    #[error("database error: {0}")]
    Database(#[from] sea_orm::DbErr),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanMode {
    Full,
    Delta,
}

impl ScanMode {
    pub fn run_type(&self) -> &'static str {
        match self {
            ScanMode::Full => "full_scan",
            ScanMode::Delta => "delta_scan",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    pub received: usize,
    pub skipped_existing: usize,
    pub inserted: u64,
    pub failed: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScanReport {
    pub mode: ScanMode,
    pub discovered: usize,
    pub listing_errors: usize,
    pub ingest: IngestReport,
    pub token_saved: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ScanOutcome {
    AlreadyRunning,
    Completed(ScanReport),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedName {
    pub title: String,
    pub width: u32,
    pub height: u32,
}

fn stem(name: &str) -> &str {
    match name.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => name,
    }
}

fn extension(name: &str) -> Option<String> {
    name.rsplit_once('.').map(|(_, ext)| ext.to_ascii_lowercase())
}

/// `TITLE_WxH.ext` yields the title and both dimensions; anything else keeps
/// the readable basename and zero dimensions.
/// Largest side the asset table can hold.
const MAX_SIDE_PX: u32 = i32::MAX as u32;

pub fn parse_filename(name: &str) -> ParsedName {
    let stem = stem(name);

    if let Some((title, dims)) = stem.rsplit_once('_') {
        let parsed = dims
            .split_once(['x', 'X'])
            .and_then(|(w, h)| Some((w.trim().parse::<u32>().ok()?, h.trim().parse::<u32>().ok()?)));
        if let Some((width, height)) = parsed {
            if (1..=MAX_SIDE_PX).contains(&width) && (1..=MAX_SIDE_PX).contains(&height) && !title.trim().is_empty() {
                return ParsedName {
                    title: title.trim().to_string(),
                    width,
                    height,
                };
            }
        }
    }

    ParsedName {
        title: stem.replace(['-', '_'], " ").trim().to_string(),
        width: 0,
        height: 0,
    }
}

pub fn is_image_file(name: &str, mime_type: &str) -> bool {
    if name.starts_with("._") {
        return false;
    }
    let ext = extension(name);
    if ext.as_deref() == Some("csv") {
        return false;
    }
    mime_type.starts_with("image/") || ext.is_some_and(|e| IMAGE_EXTENSIONS.contains(&e.as_str()))
}

/// Builds the ingestion record. Dimensions from the filename win; the
/// service's image metadata fills in when the name carries none.
pub fn file_record(file: &DriveFile, artist: &str, bucket: &str, path: String) -> FileRecord {
    let parsed = parse_filename(&file.name);
    let (width_px, height_px) = match (parsed.width, parsed.height, file.image_width, file.image_height) {
        (w, h, _, _) if w > 0 && h > 0 => (w, h),
        (_, _, Some(w), Some(h)) if w > 0 && h > 0 => (w, h),
        _ => (0, 0),
    };

    FileRecord {
        drive_file_id: file.id.clone(),
        filename: file.name.clone(),
        mime_type: file.mime_type.clone(),
        size_bytes: file.size,
        md5_checksum: file.md5_checksum.clone(),
        path,
        artist: artist.to_string(),
        quality_tier: QualityTier::from_bucket_name(bucket),
        title: parsed.title,
        width_px,
        height_px,
    }
}

/// Dedup-then-insert: known ids are skipped, the rest are written in
/// parallel batches. A failed batch is retried row by row, and a row that
/// still fails is stored as an error placeholder.
pub async fn ingest(sink: &dyn AssetSink, records: Vec<FileRecord>) -> IngestReport {
    let mut report = IngestReport {
        received: records.len(),
        ..Default::default()
    };

    let mut seen = HashSet::new();
    let records: Vec<FileRecord> = records
        .into_iter()
        .filter(|r| seen.insert(r.drive_file_id.clone()))
        .collect();

    let ids: Vec<String> = records.iter().map(|r| r.drive_file_id.clone()).collect();
    let chunks: Vec<Vec<String>> = ids.chunks(DEDUP_CHUNK).map(|c| c.to_vec()).collect();
    let lookups = bounded_pool(chunks, INSERT_CONCURRENCY, |chunk| async move {
        sink.existing_ids(&chunk).await
    })
    .await;

    let mut existing = HashSet::new();
    for lookup in lookups {
        match lookup {
            Ok(found) => existing.extend(found),
            // The insert's conflict clause still keeps the row unique.
            Err(e) => tracing::warn!("Scanner | Dedup lookup failed: {}", e),
        }
    }

    let fresh: Vec<FileRecord> = records
        .into_iter()
        .filter(|r| !existing.contains(&r.drive_file_id))
        .collect();
    report.skipped_existing = report.received - fresh.len();
    if fresh.is_empty() {
        return report;
    }

    let batches: Vec<Vec<FileRecord>> = fresh.chunks(INSERT_BATCH).map(|c| c.to_vec()).collect();
    let results = bounded_pool(batches, INSERT_CONCURRENCY, |batch| async move {
        let rows: Vec<NewAsset> = batch.iter().map(NewAsset::from_record).collect();
        match sink.insert_batch(&rows).await {
            Ok(n) => (n, 0usize),
            Err(e) => {
                tracing::warn!(
                    "Scanner | Batch of {} failed, falling back to single inserts: {}",
                    rows.len(),
                    e
                );
                insert_individually(sink, &batch, rows).await
            }
        }
    })
    .await;

    for (inserted, failed) in results {
        report.inserted += inserted;
        report.failed += failed;
    }
    report
}

async fn insert_individually(
    sink: &dyn AssetSink,
    records: &[FileRecord],
    rows: Vec<NewAsset>,
) -> (u64, usize) {
    let mut inserted = 0;
    let mut failed = 0;
    for (record, row) in records.iter().zip(rows) {
        match sink.insert_batch(std::slice::from_ref(&row)).await {
            Ok(n) => inserted += n,
            Err(e) => {
                failed += 1;
                tracing::error!("Scanner | Could not ingest {}: {}", record.drive_file_id, e);
                let placeholder = NewAsset::failed(record, &e.to_string());
                if let Err(e) = sink.insert_batch(std::slice::from_ref(&placeholder)).await {
                    tracing::error!("Scanner | Could not record failure for {}: {}", record.drive_file_id, e);
                }
            }
        }
    }
    (inserted, failed)
}

struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

pub struct Scanner {
    tree: Arc<dyn FileTree>,
    sink: Arc<dyn AssetSink>,
    state: SyncStateStore,
    root_folder_id: String,
    running: AtomicBool,
    folders: Mutex<HashMap<String, DriveFile>>,
}

impl Scanner {
    pub fn new(
        tree: Arc<dyn FileTree>,
        sink: Arc<dyn AssetSink>,
        state: SyncStateStore,
        root_folder_id: impl Into<String>,
    ) -> Self {
        Self {
            tree,
            sink,
            state,
            root_folder_id: root_folder_id.into(),
            running: AtomicBool::new(false),
            folders: Mutex::new(HashMap::new()),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn tree(&self) -> &Arc<dyn FileTree> {
        &self.tree
    }

    /// Folder metadata cached while resolving ancestry.
    pub async fn cached_folders(&self) -> usize {
        self.folders.lock().await.len()
    }

    /// Runs one scan unless another is in flight. A delta scan without a
    /// stored token turns into a full scan.
    pub async fn scan(&self, mode: ScanMode) -> Result<ScanOutcome, ScanError> {
        if self.running.swap(true, Ordering::SeqCst) {
            tracing::info!("Scanner | Trigger ignored, a scan is already running");
            return Ok(ScanOutcome::AlreadyRunning);
        }
        let _guard = RunningGuard(&self.running);

        let report = match mode {
            ScanMode::Full => self.full_scan().await?,
            ScanMode::Delta => match self.state.load().await? {
                Some(state) => self.delta_scan(state.page_token).await?,
                None => {
                    tracing::info!("Scanner | No change token stored, running a full scan");
                    self.full_scan().await?
                }
            },
        };

        tracing::info!(
            "Scanner | {:?} scan done: {} discovered, {} inserted, {} existing, {} failed",
            report.mode,
            report.discovered,
            report.ingest.inserted,
            report.ingest.skipped_existing,
            report.ingest.failed
        );
        Ok(ScanOutcome::Completed(report))
    }

    async fn list_all(&self, folder_id: &str, kind: ListKind) -> Result<Vec<DriveFile>, DriveError> {
        let mut out = Vec::new();
        let mut token: Option<String> = None;
        loop {
            let page = self
                .tree
                .list_children(folder_id, kind, token.as_deref())
                .await?;
            out.extend(page.files);
            match page.next_page_token {
                Some(next) => token = Some(next),
                None => return Ok(out),
            }
        }
    }

    async fn scan_artist(&self, artist: DriveFile) -> (Vec<FileRecord>, usize) {
        let mut records = Vec::new();
        let mut errors = 0;

        let buckets = match self.list_all(&artist.id, ListKind::Folders).await {
            Ok(b) => b,
            Err(e) => {
                tracing::error!("Scanner | Listing buckets of {} failed: {}", artist.name, e);
                return (records, 1);
            }
        };

        for bucket in buckets {
            match self.list_all(&bucket.id, ListKind::Files).await {
                Ok(files) => records.extend(
                    files
                        .iter()
                        .filter(|f| !f.is_folder() && is_image_file(&f.name, &f.mime_type))
                        .map(|f| {
                            let path = format!("{}/{}/{}", artist.name, bucket.name, f.name);
                            file_record(f, &artist.name, &bucket.name, path)
                        }),
                ),
                Err(e) => {
                    errors += 1;
                    tracing::error!(
                        "Scanner | Listing files of {}/{} failed: {}",
                        artist.name,
                        bucket.name,
                        e
                    );
                }
            }
        }
        (records, errors)
    }

    async fn full_scan(&self) -> Result<ScanReport, ScanError> {
        let artists = self.list_all(&self.root_folder_id, ListKind::Folders).await?;
        tracing::info!("Scanner | Full scan over {} artist folders", artists.len());

        let results = bounded_pool(artists, LISTING_CONCURRENCY, |artist| self.scan_artist(artist)).await;

        let mut records = Vec::new();
        let mut listing_errors = 0;
        for (found, errors) in results {
            records.extend(found);
            listing_errors += errors;
        }

        let discovered = records.len();
        let ingest = ingest(self.sink.as_ref(), records).await;

        // A partial walk must not advance the cursor past files it never saw.
        let token_saved = if listing_errors == 0 {
            let token = self.tree.start_page_token().await?;
            self.state.save(&token).await?;
            true
        } else {
            tracing::warn!(
                "Scanner | {} listings failed, change token left untouched",
                listing_errors
            );
            false
        };

        Ok(ScanReport {
            mode: ScanMode::Full,
            discovered,
            listing_errors,
            ingest,
            token_saved,
        })
    }

    async fn folder(&self, id: &str) -> Result<DriveFile, DriveError> {
        if let Some(found) = self.folders.lock().await.get(id) {
            return Ok(found.clone());
        }
        let fetched = self.tree.get_file(id).await?;
        self.folders
            .lock()
            .await
            .insert(id.to_string(), fetched.clone());
        Ok(fetched)
    }

    /// Walks parents until the root, returning `(artist, bucket, path)`, or
    /// `None` when the root is not reached within the depth limit.
    async fn resolve_ancestry(&self, file: &DriveFile) -> Result<Option<(String, String, String)>, DriveError> {
        let mut chain: Vec<String> = Vec::new();
        let mut current = file.parents.first().cloned();

        for _ in 0..MAX_ANCESTRY_DEPTH {
            let Some(id) = current else {
                return Ok(None);
            };
            if id == self.root_folder_id {
                let (Some(artist), Some(bucket)) = (chain.last(), chain.first()) else {
                    return Ok(None);
                };
                let mut parts: Vec<&str> = chain.iter().rev().map(String::as_str).collect();
                parts.push(&file.name);
                return Ok(Some((artist.clone(), bucket.clone(), parts.join("/"))));
            }
            let folder = self.folder(&id).await?;
            chain.push(folder.name.clone());
            current = folder.parents.first().cloned();
        }
        Ok(None)
    }

    async fn delta_scan(&self, start_token: String) -> Result<ScanReport, ScanError> {
        let mut token = start_token;
        let mut candidates: Vec<DriveFile> = Vec::new();
        let new_start = loop {
            let page = self.tree.list_changes(&token).await?;
            candidates.extend(page.changes.into_iter().filter_map(|c| {
                if c.removed {
                    return None;
                }
                c.file
                    .filter(|f| !f.trashed && !f.is_folder() && is_image_file(&f.name, &f.mime_type))
            }));
            match (page.next_page_token, page.new_start_page_token) {
                (Some(next), _) => token = next,
                (None, new_start) => break new_start,
            }
        };

        let mut records = Vec::new();
        let mut listing_errors = 0;
        for file in &candidates {
            match self.resolve_ancestry(file).await {
                Ok(Some((artist, bucket, path))) => records.push(file_record(file, &artist, &bucket, path)),
                Ok(None) => tracing::debug!("Scanner | {} is outside the root, ignored", file.name),
                Err(e) => {
                    listing_errors += 1;
                    tracing::error!("Scanner | Resolving ancestry of {} failed: {}", file.name, e);
                }
            }
        }

        let discovered = records.len();
        let ingest = ingest(self.sink.as_ref(), records).await;

        let token_saved = match new_start {
            Some(t) => {
                self.state.save(&t).await?;
                true
            }
            None => false,
        };

        Ok(ScanReport {
            mode: ScanMode::Delta,
            discovered,
            listing_errors,
            ingest,
            token_saved,
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::services::drive::{ChangePage, Change, FilePage};
    use async_trait::async_trait;
    use sea_orm::DbErr;
    use std::sync::Mutex as StdMutex;

    #[derive(Default)]
    pub(crate) struct MemorySink {
        pub rows: StdMutex<HashMap<String, NewAsset>>,
        pub fail_batches: bool,
    }

    #[async_trait]
    impl AssetSink for MemorySink {
        async fn existing_ids(&self, ids: &[String]) -> Result<HashSet<String>, DbErr> {
            let rows = self.rows.lock().unwrap();
            Ok(ids.iter().filter(|id| rows.contains_key(*id)).cloned().collect())
        }

        async fn insert_batch(&self, batch: &[NewAsset]) -> Result<u64, DbErr> {
            if self.fail_batches && batch.len() > 1 {
                return Err(DbErr::Custom("batch rejected".into()));
            }
            let mut rows = self.rows.lock().unwrap();
            let mut n = 0;
            for row in batch {
                let key = row.asset.drive_file_id.clone().unwrap_or_default();
                if !rows.contains_key(&key) {
                    rows.insert(key, row.clone());
                    n += 1;
                }
            }
            Ok(n)
        }
    }

    fn file(id: &str, name: &str, parent: &str) -> DriveFile {
        DriveFile {
            id: id.into(),
            name: name.into(),
            mime_type: if name.contains('.') { "image/jpeg".into() } else { crate::services::drive::FOLDER_MIME.into() },
            parents: vec![parent.into()],
            ..Default::default()
        }
    }

    /// ROOT / Monet / Above 300 / two files, plus a change feed.
    #[derive(Default)]
    pub(crate) struct FakeTree {
        pub changes: Vec<Change>,
    }

    impl FakeTree {
        fn nodes() -> Vec<DriveFile> {
            vec![
                file("artist1", "Monet", "root"),
                file("bucket1", "Above 300 DPI", "artist1"),
                file("f1", "Water Lilies_4000x3000.jpg", "bucket1"),
                file("f2", "._Water Lilies_4000x3000.jpg", "bucket1"),
                file("f3", "notes.csv", "bucket1"),
                file("elsewhere", "Other", "shared"),
                DriveFile { parents: Vec::new(), ..file("shared", "Shared", "") },
            ]
        }
    }

    #[async_trait]
    impl FileTree for FakeTree {
        async fn list_children(&self, folder_id: &str, kind: ListKind, _page: Option<&str>) -> Result<FilePage, DriveError> {
            let files = Self::nodes()
                .into_iter()
                .filter(|f| f.parents.first().map(String::as_str) == Some(folder_id))
                .filter(|f| f.is_folder() == (kind == ListKind::Folders))
                .collect();
            Ok(FilePage { files, next_page_token: None })
        }

        async fn get_file(&self, id: &str) -> Result<DriveFile, DriveError> {
            Self::nodes()
                .into_iter()
                .find(|f| f.id == id)
                .ok_or_else(|| DriveError::Http { status: 404, body: id.into() })
        }

        async fn start_page_token(&self) -> Result<String, DriveError> {
            Ok("token-1".into())
        }

        async fn list_changes(&self, _token: &str) -> Result<ChangePage, DriveError> {
            Ok(ChangePage {
                changes: self.changes.clone(),
                next_page_token: None,
                new_start_page_token: Some("token-2".into()),
            })
        }
    }

    fn scanner(changes: Vec<Change>, sink: Arc<MemorySink>, dir: &tempfile::TempDir) -> Scanner {
        Scanner::new(
            Arc::new(FakeTree { changes }),
            sink,
            SyncStateStore::new(dir.path().join("state.json")),
            "root",
        )
    }

    #[test]
    fn filenames_with_dimensions() {
        assert_eq!(
            parse_filename("Midnight Sun 1930_10057x12926.jpg"),
            ParsedName { title: "Midnight Sun 1930".into(), width: 10057, height: 12926 }
        );
    }

    #[test]
    fn filenames_without_dimensions() {
        assert_eq!(
            parse_filename("abstract-work.png"),
            ParsedName { title: "abstract work".into(), width: 0, height: 0 }
        );
        assert_eq!(parse_filename("big_piece_final.jpg").title, "big piece final");
        assert_eq!(parse_filename("broken_12x.jpg").width, 0);
        assert_eq!(parse_filename("Huge_3000000000x2000.jpg").width, 0);
    }

    #[test]
    fn image_filter() {
        assert!(is_image_file("a.JPG", "application/octet-stream"));
        assert!(is_image_file("scan", "image/tiff"));
        assert!(!is_image_file("._a.jpg", "image/jpeg"));
        assert!(!is_image_file("prices.csv", "text/csv"));
        assert!(!is_image_file("readme.txt", "text/plain"));
    }

    #[test]
    fn image_metadata_fills_missing_dimensions() {
        let mut f = file("f9", "untitled.jpg", "bucket1");
        f.image_width = Some(3000);
        f.image_height = Some(3000);
        let record = file_record(&f, "Monet", "standard", "Monet/standard/untitled.jpg".into());
        assert_eq!((record.width_px, record.height_px), (3000, 3000));
        assert_eq!(record.quality_tier, QualityTier::Standard);
    }

    #[tokio::test]
    async fn ingesting_twice_keeps_one_row() {
        let sink = MemorySink::default();
        let f = file("X", "Sunrise_4000x6000.jpg", "bucket1");
        let record = file_record(&f, "Monet", "Above", "Monet/Above/Sunrise_4000x6000.jpg".into());

        let first = ingest(&sink, vec![record.clone()]).await;
        assert_eq!(first.inserted, 1);
        let stored = sink.rows.lock().unwrap().get("X").cloned().unwrap();
        assert_eq!(stored.asset.ingestion_status, crate::entities::asset::IngestionStatus::Analyzed);

        let second = ingest(&sink, vec![record.clone(), record]).await;
        assert_eq!(second.inserted, 0);
        assert_eq!(second.skipped_existing, 2);
        assert_eq!(sink.rows.lock().unwrap().len(), 1);
        assert_eq!(sink.rows.lock().unwrap().get("X").unwrap().asset.id, stored.asset.id);
    }

    #[tokio::test]
    async fn failed_batches_fall_back_to_single_rows() {
        let sink = MemorySink { fail_batches: true, ..Default::default() };
        let records: Vec<FileRecord> = (0..3)
            .map(|i| {
                let f = file(&format!("id{i}"), &format!("Piece {i}_1000x1000.jpg"), "bucket1");
                file_record(&f, "Monet", "Above", format!("Monet/Above/{}", f.name))
            })
            .collect();
        let report = ingest(&sink, records).await;
        assert_eq!(report.inserted, 3);
        assert_eq!(report.failed, 0);
    }

    #[tokio::test]
    async fn full_scan_persists_token_and_quiet_delta_adds_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let sink = Arc::new(MemorySink::default());
        let scanner = scanner(Vec::new(), Arc::clone(&sink), &dir);

        let ScanOutcome::Completed(full) = scanner.scan(ScanMode::Full).await.unwrap() else {
            panic!("scan did not run");
        };
        assert_eq!(full.discovered, 1);
        assert_eq!(full.ingest.inserted, 1);
        assert!(full.token_saved);
        let row = sink.rows.lock().unwrap().get("f1").cloned().unwrap();
        assert_eq!(row.asset.artist.as_deref(), Some("Monet"));
        assert_eq!(row.asset.quality_tier, Some(QualityTier::High));
        assert_eq!(row.asset.path.as_deref(), Some("Monet/Above 300 DPI/Water Lilies_4000x3000.jpg"));

        let ScanOutcome::Completed(delta) = scanner.scan(ScanMode::Delta).await.unwrap() else {
            panic!("scan did not run");
        };
        assert_eq!(delta.mode, ScanMode::Delta);
        assert_eq!(delta.ingest.inserted, 0);
        assert_eq!(sink.rows.lock().unwrap().len(), 1);
        assert!(!scanner.is_running());
    }

    #[tokio::test]
    async fn delta_resolves_ancestry_and_skips_outsiders() {
        let dir = tempfile::tempdir().unwrap();
        SyncStateStore::new(dir.path().join("state.json")).save("token-1").await.unwrap();
        let sink = Arc::new(MemorySink::default());

        let changes = vec![
            Change { file_id: "new".into(), removed: false, file: Some(file("new", "Haystacks_3000x2000.jpg", "bucket1")) },
            Change { file_id: "gone".into(), removed: true, file: None },
            Change { file_id: "out".into(), removed: false, file: Some(file("out", "Stray_100x100.jpg", "elsewhere")) },
        ];
        let scanner = scanner(changes, Arc::clone(&sink), &dir);

        let ScanOutcome::Completed(report) = scanner.scan(ScanMode::Delta).await.unwrap() else {
            panic!("scan did not run");
        };
        assert_eq!(report.discovered, 1);
        assert_eq!(report.ingest.inserted, 1);
        assert!(sink.rows.lock().unwrap().contains_key("new"));

        let saved = SyncStateStore::new(dir.path().join("state.json")).load().await.unwrap().unwrap();
        assert_eq!(saved.page_token, "token-2");
        assert!(scanner.cached_folders().await >= 2);
    }
}
