//! Incremental directory indexing.
//!
//! Walks a frame tree, skips files whose mtime matches the index, embeds the
//! rest in fixed-size batches and persists the index once per batch. An
//! interrupted run resumes from the mtime diff on the next invocation.

use std::path::{Path, PathBuf};
use std::time::Instant;

use globset::{Glob, GlobMatcher};
use serde::Serialize;
use thiserror::Error;
use walkdir::WalkDir;

use crate::cache::domain::cache_index::{CacheIndex, IndexEntry};
use crate::cache::error::CacheError;
use crate::cache::infrastructure::cache_store::{file_mtime_millis, CacheStore};
use crate::pipeline::batch_executor::{source_key, BatchExecutor, FileResult};
use crate::pipeline::batch_logger::{BatchLogger, NullBatchLogger};
use crate::shared::constants::{DEFAULT_BATCH_SIZE, FRAME_GLOB};

#[derive(Error, Debug)]
pub enum BatchError {
    #[error("cannot scan {root}: {reason}")]
    Discovery { root: PathBuf, reason: String },
    #[error("invalid frame pattern: {0}")]
    Pattern(#[from] globset::Error),
    #[error(transparent)]
    Cache(#[from] CacheError),
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchReport {
    /// Files embedded and indexed during this run.
    pub processed: usize,
    /// Files whose mtime matched the index.
    pub skipped: usize,
    /// Files left unindexed for the next run to retry.
    pub failed: usize,
    pub no_faces: usize,
}

/// Every `frame-blank*.{jpg,png,webp}` under `root`, sorted by path.
pub fn discover_frames(root: &Path) -> Result<Vec<PathBuf>, BatchError> {
    if !root.is_dir() {
        return Err(BatchError::Discovery {
            root: root.to_path_buf(),
            reason: "not a directory".into(),
        });
    }
    let matcher: GlobMatcher = Glob::new(FRAME_GLOB)?.compile_matcher();

    let mut frames: Vec<PathBuf> = WalkDir::new(root)
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                log::warn!("Skipping unreadable entry: {e}");
                None
            }
        })
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| matcher.is_match(entry.file_name()))
        .map(|entry| entry.into_path())
        .collect();
    frames.sort();
    Ok(frames)
}

pub struct BatchDriver {
    store: CacheStore,
    executor: Box<dyn BatchExecutor>,
    batch_size: usize,
    logger: Box<dyn BatchLogger>,
}

impl BatchDriver {
    pub fn new(store: CacheStore, executor: Box<dyn BatchExecutor>) -> Self {
        Self {
            store,
            executor,
            batch_size: DEFAULT_BATCH_SIZE,
            logger: Box::new(NullBatchLogger),
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_logger(mut self, logger: Box<dyn BatchLogger>) -> Self {
        self.logger = logger;
        self
    }

    pub fn store(&self) -> &CacheStore {
        &self.store
    }

    pub fn process_directory(&mut self, root: &Path) -> Result<BatchReport, BatchError> {
        let frames = discover_frames(root)?;
        let mut index = self.store.load();
        let mut report = BatchReport::default();

        let mut pending: Vec<(PathBuf, u64)> = Vec::new();
        for path in frames {
            let Some(mtime) = file_mtime_millis(&path) else {
                log::warn!("Cannot stat {}", path.display());
                report.failed += 1;
                continue;
            };
            let unchanged = index
                .get(&source_key(&path))
                .is_some_and(|entry| entry.mtime == mtime);
            if unchanged {
                report.skipped += 1;
            } else {
                pending.push((path, mtime));
            }
        }

        self.logger.info(&format!(
            "{} frames unchanged, {} to process in batches of {}",
            report.skipped,
            pending.len(),
            self.batch_size
        ));

        let total = pending.len();
        let mut done = 0;
        for batch in pending.chunks(self.batch_size) {
            self.run_batch(batch, &mut index, &mut report);
            done += batch.len();
            self.logger.progress(done, total);
        }

        self.logger.summary();
        log::info!(
            "Indexed {}: {} processed, {} skipped, {} without faces, {} failed",
            root.display(),
            report.processed,
            report.skipped,
            report.no_faces,
            report.failed
        );
        Ok(report)
    }

    /// Folds one batch into the index and persists it. A failed save is
    /// logged; the next batch's save writes the same entries again.
    fn run_batch(
        &mut self,
        batch: &[(PathBuf, u64)],
        index: &mut CacheIndex,
        report: &mut BatchReport,
    ) {
        let paths: Vec<PathBuf> = batch.iter().map(|(path, _)| path.clone()).collect();

        let started = Instant::now();
        let results = self.executor.process(&paths);
        self.logger
            .timing("embed", started.elapsed().as_secs_f64() * 1000.0);

        let started = Instant::now();
        for ((path, mtime), result) in batch.iter().zip(results) {
            let key = source_key(path);
            let previous = index.get(&key).and_then(|e| e.embedding_file.clone());
            match result {
                FileResult::Embedded(record) => match self.store.write_embedding(&record) {
                    Ok(file) => {
                        index.upsert(IndexEntry::embedded(key.clone(), *mtime, record.faces, file));
                        report.processed += 1;
                    }
                    Err(e) => {
                        log::warn!("Failed to store embedding for {}: {e}", path.display());
                        report.failed += 1;
                    }
                },
                FileResult::NoFaces => {
                    index.upsert(IndexEntry::no_faces(key.clone(), *mtime));
                    report.no_faces += 1;
                }
                FileResult::Failed(reason) => {
                    log::warn!("Failed to process {}: {reason}", path.display());
                    report.failed += 1;
                }
            }
            // A superseded embedding file would come back on the next rebuild.
            let current = index.get(&key).and_then(|e| e.embedding_file.as_deref());
            if let Some(old) = previous.filter(|old| current != Some(old.as_str())) {
                self.store.release_embedding(index, &key, &old);
            }
        }
        if let Err(e) = self.store.save(index) {
            log::warn!("Failed to persist index after batch: {e}");
        }
        self.logger
            .timing("persist", started.elapsed().as_secs_f64() * 1000.0);
    }

    pub fn rebuild_index_only(&mut self) -> Result<usize, BatchError> {
        let entries = rebuild_index_only(&self.store)?;
        self.logger.info(&format!("Index rebuilt with {entries} entries"));
        Ok(entries)
    }
}

/// Reconciles the index with the embedding files without embedding
/// anything. `noFaces` markers of the current index are carried over.
pub fn rebuild_index_only(store: &CacheStore) -> Result<usize, BatchError> {
    let previous = store.load();
    let mut index = store.rebuild_from_cache_files();
    for entry in previous.iter().filter(|e| e.no_faces) {
        if index.get(&entry.path).is_none() {
            index.upsert(entry.clone());
        }
    }
    store.save(&mut index)?;
    Ok(index.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::sync::{Arc, Mutex};
    use std::time::{Duration, SystemTime};

    use crate::cache::content_hash::embedding_file_name;

    use crate::embedding::domain::face_embedding::{FaceEmbedding, Prediction};

    /// Embeds files containing `face`, fails on `bad`, anything else has no face.
    struct ScriptedExecutor;

    impl BatchExecutor for ScriptedExecutor {
        fn process(&mut self, batch: &[PathBuf]) -> Vec<FileResult> {
            batch
                .iter()
                .map(|path| {
                    let bytes = fs::read(path).unwrap_or_default();
                    match bytes.as_slice() {
                        b"face" => FileResult::Embedded(record(&source_key(path))),
                        b"bad" => FileResult::Failed("decode failed".into()),
                        _ => FileResult::NoFaces,
                    }
                })
                .collect()
        }
    }

    fn record(path: &str) -> FaceEmbedding {
        FaceEmbedding {
            path: path.to_string(),
            embedding: vec![1.0, 0.0],
            faces: 1,
            cached: String::new(),
            predictions: vec![Prediction {
                top_left: [0.0, 0.0],
                bottom_right: [1.0, 1.0],
                probability: 0.9,
                attributes: None,
                attribute_confidence: None,
                landmarks: None,
            }],
        }
    }

    fn driver(cache: &Path, batch_size: usize) -> BatchDriver {
        BatchDriver::new(
            CacheStore::new(cache),
            Box::new(ScriptedExecutor),
        )
        .with_batch_size(batch_size)
    }

    fn write(root: &Path, rel: &str, contents: &str) -> PathBuf {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_discover_frames_matches_naming_convention() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "ep2/frame-blank2.jpg", "");
        write(dir.path(), "ep1/frame-blank1.png", "");
        write(dir.path(), "ep1/nested/frame-blank3.webp", "");
        write(dir.path(), "ep1/frame-1.jpg", "");
        write(dir.path(), "ep1/frame-blank4.gif", "");
        write(dir.path(), "ep1/thumb.jpg", "");

        let frames = discover_frames(dir.path()).unwrap();
        let names: Vec<String> = frames
            .iter()
            .map(|p| p.strip_prefix(dir.path()).unwrap().to_string_lossy().replace('\\', "/"))
            .collect();
        assert_eq!(
            names,
            vec![
                "ep1/frame-blank1.png",
                "ep1/nested/frame-blank3.webp",
                "ep2/frame-blank2.jpg"
            ]
        );
    }

    #[test]
    fn test_discover_frames_rejects_missing_root() {
        let dir = tempfile::tempdir().unwrap();
        let err = discover_frames(&dir.path().join("nope")).unwrap_err();
        assert!(matches!(err, BatchError::Discovery { .. }));
    }

    #[test]
    fn test_process_directory_counts_outcomes() {
        let frames = tempfile::tempdir().unwrap();
        let cache = tempfile::tempdir().unwrap();
        let face = write(frames.path(), "ep1/frame-blank1.jpg", "face");
        let blank = write(frames.path(), "ep1/frame-blank2.jpg", "blank");
        let bad = write(frames.path(), "ep1/frame-blank3.jpg", "bad");

        let mut driver = driver(cache.path(), 2);
        let report = driver.process_directory(frames.path()).unwrap();
        assert_eq!(
            report,
            BatchReport {
                processed: 1,
                skipped: 0,
                failed: 1,
                no_faces: 1,
            }
        );

        let index = driver.store().load();
        assert_eq!(index.len(), 2);
        assert!(!index.get(&source_key(&face)).unwrap().no_faces);
        assert!(index.get(&source_key(&blank)).unwrap().no_faces);
        assert!(index.get(&source_key(&bad)).is_none());
    }

    #[test]
    fn test_rerun_skips_unchanged_and_retries_failures() {
        let frames = tempfile::tempdir().unwrap();
        let cache = tempfile::tempdir().unwrap();
        write(frames.path(), "ep1/frame-blank1.jpg", "face");
        write(frames.path(), "ep1/frame-blank2.jpg", "blank");
        write(frames.path(), "ep1/frame-blank3.jpg", "bad");

        let mut driver = driver(cache.path(), 32);
        driver.process_directory(frames.path()).unwrap();
        let first = driver.store().load();

        let report = driver.process_directory(frames.path()).unwrap();
        assert_eq!(report.skipped, 2);
        assert_eq!(report.failed, 1);
        assert_eq!(report.processed, 0);

        let second = driver.store().load();
        let paths = |i: &CacheIndex| i.iter().map(|e| e.path.clone()).collect::<Vec<_>>();
        assert_eq!(paths(&first), paths(&second));
    }

    #[test]
    fn test_batches_are_chunked() {
        let frames = tempfile::tempdir().unwrap();
        let cache = tempfile::tempdir().unwrap();
        for i in 0..5 {
            write(frames.path(), &format!("ep/frame-blank{i}.jpg"), "face");
        }
        let calls = Arc::new(Mutex::new(Vec::new()));

        struct Recording(Arc<Mutex<Vec<usize>>>);
        impl BatchExecutor for Recording {
            fn process(&mut self, batch: &[PathBuf]) -> Vec<FileResult> {
                self.0.lock().unwrap().push(batch.len());
                batch
                    .iter()
                    .map(|p| FileResult::Embedded(record(&source_key(p))))
                    .collect()
            }
        }

        let mut driver = BatchDriver::new(
            CacheStore::new(cache.path()),
            Box::new(Recording(calls.clone())),
        )
        .with_batch_size(2);
        let report = driver.process_directory(frames.path()).unwrap();
        assert_eq!(report.processed, 5);
        assert_eq!(*calls.lock().unwrap(), vec![2, 2, 1]);
    }

    #[test]
    fn test_rebuild_index_only_keeps_no_face_markers() {
        let frames = tempfile::tempdir().unwrap();
        let cache = tempfile::tempdir().unwrap();
        write(frames.path(), "ep1/frame-blank1.jpg", "face");
        write(frames.path(), "ep1/frame-blank2.jpg", "blank");

        let mut driver = driver(cache.path(), 32);
        driver.process_directory(frames.path()).unwrap();
        fs::remove_file(driver.store().index_path()).unwrap();

        assert_eq!(driver.rebuild_index_only().unwrap(), 1);

        write(frames.path(), "ep1/frame-blank3.jpg", "blank");
        driver.process_directory(frames.path()).unwrap();
        assert_eq!(driver.rebuild_index_only().unwrap(), 3);
    }

    fn touch_later(path: &Path) {
        fs::File::options()
            .write(true)
            .open(path)
            .unwrap()
            .set_modified(SystemTime::now() + Duration::from_secs(5))
            .unwrap();
    }

    #[test]
    fn test_frame_losing_its_face_releases_embedding_file() {
        let frames = tempfile::tempdir().unwrap();
        let cache = tempfile::tempdir().unwrap();
        let frame = write(frames.path(), "ep1/frame-blank1.jpg", "face");

        let mut driver = driver(cache.path(), 32);
        driver.process_directory(frames.path()).unwrap();
        let file = embedding_file_name(&source_key(&frame));
        assert!(cache.path().join(&file).is_file());

        fs::write(&frame, "blank").unwrap();
        touch_later(&frame);
        let report = driver.process_directory(frames.path()).unwrap();
        assert_eq!(report.no_faces, 1);
        assert!(!cache.path().join(&file).exists());
        assert!(driver.store().validate(&driver.store().load()).is_empty());

        driver.rebuild_index_only().unwrap();
        let entry = driver.store().load();
        let entry = entry.get(&source_key(&frame)).unwrap();
        assert!(entry.no_faces);
        assert_eq!(entry.faces, 0);
    }

    #[test]
    fn test_unwritable_cache_still_completes_pass() {
        let frames = tempfile::tempdir().unwrap();
        let scratch = tempfile::tempdir().unwrap();
        let cache = scratch.path().join("cache");
        fs::write(&cache, "not a directory").unwrap();
        write(frames.path(), "ep1/frame-blank1.jpg", "face");
        write(frames.path(), "ep1/frame-blank2.jpg", "blank");
        write(frames.path(), "ep2/frame-blank1.jpg", "blank");

        let report = driver(&cache, 1).process_directory(frames.path()).unwrap();
        assert_eq!(report.failed, 1);
        assert_eq!(report.no_faces, 2);
    }
}
