//! On-disk embedding files and the `index.json` that tracks them.
//!
//! The store is the only component that writes to the cache directory.
//! Per-file failures are logged and skipped; a broken index is rebuilt from
//! the embedding files rather than reported.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use serde::Serialize;
use walkdir::WalkDir;

use crate::cache::content_hash::{embedding_file_name, is_valid_cache_file_name};
use crate::cache::domain::cache_defect::CacheDefect;
use crate::cache::domain::cache_index::{CacheIndex, IndexEntry};
use crate::cache::error::CacheError;
use crate::embedding::domain::face_embedding::FaceEmbedding;
use crate::embedding::embedding_generator::FaceEmbedder;
use crate::shared::config::FaceIndexConfig;
use crate::shared::constants::INDEX_FILE_NAME;

/// Modification time in milliseconds since the Unix epoch.
pub fn file_mtime_millis(path: &Path) -> Option<u64> {
    let modified = fs::metadata(path).ok()?.modified().ok()?;
    let since_epoch = modified.duration_since(UNIX_EPOCH).ok()?;
    Some(since_epoch.as_millis() as u64)
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupReport {
    /// Foreign and stale embedding files deleted from the cache directory.
    pub removed_files: Vec<String>,
    /// Unreferenced embedding files taken back into the index.
    pub adopted: usize,
    /// Entries dropped because their source image is gone.
    pub dropped_entries: usize,
    pub regenerated: usize,
    /// Entries replaced by a `noFaces` marker after regeneration found no face or failed.
    pub marked_no_faces: usize,
}

pub struct CacheStore {
    cache_dir: PathBuf,
    secondary_dirs: Vec<PathBuf>,
}

impl CacheStore {
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            secondary_dirs: Vec::new(),
        }
    }

    /// Extra read-only directories searched after the primary one.
    pub fn with_secondary_dirs(mut self, dirs: Vec<PathBuf>) -> Self {
        self.secondary_dirs = dirs;
        self
    }

    pub fn from_config(config: &FaceIndexConfig) -> Self {
        Self::new(&config.cache_dir).with_secondary_dirs(config.secondary_cache_dirs.clone())
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    pub fn index_path(&self) -> PathBuf {
        self.cache_dir.join(INDEX_FILE_NAME)
    }

    fn tmp_index_path(&self) -> PathBuf {
        self.cache_dir.join(format!("{INDEX_FILE_NAME}.tmp"))
    }

    fn search_dirs(&self) -> impl Iterator<Item = &PathBuf> {
        std::iter::once(&self.cache_dir).chain(self.secondary_dirs.iter())
    }

    /// First directory holding `file`, primary before secondaries.
    fn locate(&self, file: &str) -> Option<PathBuf> {
        self.search_dirs()
            .map(|dir| dir.join(file))
            .find(|path| path.is_file())
    }

    /// Removes entries whose embedding file is nowhere to be found.
    fn drop_missing(&self, index: &mut CacheIndex) -> usize {
        index.retain(|entry| match &entry.embedding_file {
            Some(file) => self.locate(file).is_some(),
            None => entry.no_faces,
        })
    }

    /// Loads the index. A missing index is empty; an unreadable one is
    /// rebuilt from the embedding files.
    pub fn load(&self) -> CacheIndex {
        let path = self.index_path();
        let json = match fs::read_to_string(&path) {
            Ok(json) => json,
            Err(e) if e.kind() == ErrorKind::NotFound => return CacheIndex::new(),
            Err(e) => {
                log::warn!("Cannot read {}: {e}; rebuilding from cache files", path.display());
                return self.rebuild_from_cache_files();
            }
        };

        let mut index: CacheIndex = match serde_json::from_str(&json) {
            Ok(index) => index,
            Err(e) => {
                let err = CacheError::Corruption {
                    path: path.clone(),
                    reason: e.to_string(),
                };
                log::warn!("{err}; rebuilding from cache files");
                return self.repair();
            }
        };

        let dropped = self.drop_missing(&mut index);
        if dropped > 0 {
            log::info!("Dropped {dropped} index entries with missing embedding files");
            if let Err(e) = self.save(&mut index) {
                log::warn!("Failed to persist repaired index: {e}");
            }
        }
        index
    }

    fn repair(&self) -> CacheIndex {
        let mut index = self.rebuild_from_cache_files();
        if let Err(e) = self.save(&mut index) {
            log::warn!("Failed to persist rebuilt index: {e}");
        }
        index
    }

    /// Filters dangling entries, stamps `lastUpdate` and writes the index
    /// through a temporary file and rename.
    pub fn save(&self, index: &mut CacheIndex) -> Result<(), CacheError> {
        fs::create_dir_all(&self.cache_dir).map_err(CacheError::io(&self.cache_dir))?;

        let dropped = self.drop_missing(index);
        if dropped > 0 {
            log::info!("Dropped {dropped} index entries with missing embedding files");
        }
        index.last_update = Some(chrono::Utc::now().to_rfc3339());

        let path = self.index_path();
        let tmp = self.tmp_index_path();
        let json = serde_json::to_string_pretty(index).map_err(CacheError::json(&path))?;
        fs::write(&tmp, json).map_err(CacheError::io(&tmp))?;
        fs::rename(&tmp, &path).map_err(CacheError::io(&path))?;
        log::debug!("Saved index with {} entries", index.len());
        Ok(())
    }

    pub fn read_embedding(&self, file: &str) -> Result<FaceEmbedding, CacheError> {
        let path = self.locate(file).ok_or_else(|| CacheError::Io {
            path: self.cache_dir.join(file),
            source: std::io::Error::new(ErrorKind::NotFound, "embedding file not found"),
        })?;
        read_record(&path)
    }

    /// Writes a record to `<hash of record.path>.json` in the primary
    /// directory, overwriting any previous version. Returns the file name.
    pub fn write_embedding(&self, record: &FaceEmbedding) -> Result<String, CacheError> {
        fs::create_dir_all(&self.cache_dir).map_err(CacheError::io(&self.cache_dir))?;
        let file = embedding_file_name(&record.path);
        let path = self.cache_dir.join(&file);
        let json = serde_json::to_string(record).map_err(CacheError::json(&path))?;
        fs::write(&path, json).map_err(CacheError::io(&path))?;
        Ok(file)
    }

    /// Every readable embedding in index order, skipping `noFaces` entries.
    pub fn load_embeddings(&self, index: &CacheIndex) -> Vec<FaceEmbedding> {
        index
            .iter()
            .filter(|entry| !entry.no_faces)
            .filter_map(|entry| {
                let file = entry.embedding_file.as_deref()?;
                match self.read_embedding(file) {
                    Ok(mut record) => {
                        record.path = entry.path.clone();
                        (record.faces > 0).then_some(record)
                    }
                    Err(e) => {
                        log::warn!("Skipping {}: {e}", entry.path);
                        None
                    }
                }
            })
            .collect()
    }

    /// Reconstructs the index from the embedding files alone, sorted by path.
    ///
    /// `mtime` comes from the source image when it still exists, else 0 so
    /// the next batch run re-checks it.
    pub fn rebuild_from_cache_files(&self) -> CacheIndex {
        let mut by_path: HashMap<String, IndexEntry> = HashMap::new();
        for dir in self.search_dirs() {
            for file in list_files(dir) {
                if !is_valid_cache_file_name(&file) {
                    continue;
                }
                let record = match read_record(&dir.join(&file)) {
                    Ok(record) => record,
                    Err(e) => {
                        log::warn!("Skipping {file} during rebuild: {e}");
                        continue;
                    }
                };
                if record.path.is_empty() {
                    log::warn!("Skipping {file} during rebuild: record has no path");
                    continue;
                }
                if by_path.contains_key(&record.path) {
                    continue;
                }
                let mtime = file_mtime_millis(Path::new(&record.path)).unwrap_or(0);
                let entry = IndexEntry::embedded(record.path.clone(), mtime, record.faces, file);
                by_path.insert(record.path, entry);
            }
        }

        let mut entries: Vec<IndexEntry> = by_path.into_values().collect();
        entries.sort_by(|a, b| a.path.cmp(&b.path));

        let mut index = CacheIndex::new();
        for entry in entries {
            index.upsert(entry);
        }
        log::info!("Rebuilt index with {} entries from cache files", index.len());
        index
    }

    /// Read-only integrity check of the primary directory and the index.
    pub fn validate(&self, index: &CacheIndex) -> Vec<CacheDefect> {
        let mut defects: Vec<CacheDefect> = list_files(&self.cache_dir)
            .into_iter()
            .filter(|file| is_foreign(file))
            .map(|file| CacheDefect::InvalidFileName { file })
            .collect();

        defects.extend(
            self.unreferenced_files(index)
                .into_iter()
                .map(|file| CacheDefect::UnreferencedFile { file }),
        );

        for entry in index.iter() {
            if !Path::new(&entry.path).exists() {
                defects.push(CacheDefect::SourceMissing {
                    path: entry.path.clone(),
                });
                continue;
            }
            defects.extend(self.check_embedding(entry));
        }
        defects
    }

    /// Embedding files in the primary directory that no entry points at.
    fn unreferenced_files(&self, index: &CacheIndex) -> Vec<String> {
        let referenced: HashSet<&str> = index
            .iter()
            .filter_map(|entry| entry.embedding_file.as_deref())
            .collect();
        list_files(&self.cache_dir)
            .into_iter()
            .filter(|file| is_valid_cache_file_name(file) && !referenced.contains(file.as_str()))
            .collect()
    }

    /// Entry for an unreferenced file whose source exists and is not indexed
    /// yet. `mtime` is 0 so the next batch run re-checks the source.
    fn adoptable(&self, index: &CacheIndex, file: &str) -> Option<IndexEntry> {
        let record = read_record(&self.cache_dir.join(file)).ok()?;
        let adopt = !record.path.is_empty()
            && index.get(&record.path).is_none()
            && embedding_file_name(&record.path) == file
            && Path::new(&record.path).exists();
        adopt.then(|| IndexEntry::embedded(record.path, 0, record.faces, file.to_string()))
    }

    fn check_embedding(&self, entry: &IndexEntry) -> Option<CacheDefect> {
        let file = entry.embedding_file.as_ref()?;
        let path = entry.path.clone();
        if self.locate(file).is_none() {
            return Some(CacheDefect::EmbeddingFileMissing {
                path,
                file: file.clone(),
            });
        }
        match self.read_embedding(file) {
            Err(e) => {
                return Some(CacheDefect::MalformedPayload {
                    path,
                    file: file.clone(),
                    reason: e.to_string(),
                })
            }
            Ok(record) if record.path != entry.path => {
                return Some(CacheDefect::MalformedPayload {
                    path,
                    file: file.clone(),
                    reason: format!("record belongs to {}", record.path),
                })
            }
            Ok(_) => {}
        }
        let expected = embedding_file_name(&entry.path);
        (*file != expected).then(|| CacheDefect::HashMismatch {
            path,
            file: file.clone(),
            expected,
        })
    }

    /// Repairs what `validate` reports, then saves the index.
    ///
    /// Entries whose embedding is missing, malformed or misnamed are
    /// regenerated from the source image; if that fails or finds no face
    /// they become `noFaces` markers. Unreferenced embedding files are
    /// re-indexed when their source is live and untracked, deleted otherwise.
    pub fn cleanup(
        &self,
        index: &mut CacheIndex,
        embedder: &mut dyn FaceEmbedder,
    ) -> Result<CleanupReport, CacheError> {
        let mut report = CleanupReport::default();

        for file in list_files(&self.cache_dir) {
            if !is_foreign(&file) {
                continue;
            }
            let path = self.cache_dir.join(&file);
            match fs::remove_file(&path) {
                Ok(()) => {
                    log::info!("Removed foreign cache file {file}");
                    report.removed_files.push(file);
                }
                Err(e) => log::warn!("Cannot remove {}: {e}", path.display()),
            }
        }

        let orphaned: Vec<IndexEntry> = index
            .iter()
            .filter(|entry| !Path::new(&entry.path).exists())
            .cloned()
            .collect();
        for entry in orphaned {
            index.remove(&entry.path);
            report.dropped_entries += 1;
            if let Some(file) = &entry.embedding_file {
                self.release_embedding(index, &entry.path, file);
            }
        }

        let broken: Vec<IndexEntry> = index
            .iter()
            .filter(|entry| self.check_embedding(entry).is_some())
            .cloned()
            .collect();
        for entry in broken {
            let replacement = self.regenerate(&entry, embedder);
            if replacement.no_faces {
                report.marked_no_faces += 1;
            } else {
                report.regenerated += 1;
            }
            let stale = entry
                .embedding_file
                .filter(|old| replacement.embedding_file.as_ref() != Some(old));
            index.upsert(replacement);
            if let Some(old) = stale {
                self.release_embedding(index, &entry.path, &old);
            }
        }

        for file in self.unreferenced_files(index) {
            if let Some(entry) = self.adoptable(index, &file) {
                log::info!("Re-indexed orphaned embedding {file} for {}", entry.path);
                index.upsert(entry);
                report.adopted += 1;
                continue;
            }
            let path = self.cache_dir.join(&file);
            match fs::remove_file(&path) {
                Ok(()) => {
                    log::info!("Removed stale embedding file {file}");
                    report.removed_files.push(file);
                }
                Err(e) => log::warn!("Cannot remove {}: {e}", path.display()),
            }
        }

        self.save(index)?;
        Ok(report)
    }

    fn regenerate(&self, entry: &IndexEntry, embedder: &mut dyn FaceEmbedder) -> IndexEntry {
        let source = Path::new(&entry.path);
        let mtime = file_mtime_millis(source).unwrap_or(entry.mtime);
        let no_faces = IndexEntry::no_faces(entry.path.clone(), mtime);

        let bytes = match fs::read(source) {
            Ok(bytes) => bytes,
            Err(e) => {
                log::warn!("Cannot read {}: {e}", entry.path);
                return no_faces;
            }
        };
        match embedder.generate(&bytes) {
            Ok(Some(mut record)) => {
                record.path = entry.path.clone();
                match self.write_embedding(&record) {
                    Ok(file) => IndexEntry::embedded(entry.path.clone(), mtime, record.faces, file),
                    Err(e) => {
                        log::warn!("Cannot write embedding for {}: {e}", entry.path);
                        no_faces
                    }
                }
            }
            Ok(None) => no_faces,
            Err(e) => {
                log::warn!("Regeneration failed for {}: {e}", entry.path);
                no_faces
            }
        }
    }

    /// Deletes the embedding file `owner` used to hold from the primary
    /// directory, unless another entry still uses it.
    pub fn release_embedding(&self, index: &CacheIndex, owner: &str, file: &str) {
        let in_use = index
            .iter()
            .any(|e| e.path != owner && e.embedding_file.as_deref() == Some(file));
        if in_use {
            return;
        }
        let path = self.cache_dir.join(file);
        if let Err(e) = fs::remove_file(&path) {
            if e.kind() != ErrorKind::NotFound {
                log::warn!("Cannot remove {}: {e}", path.display());
            }
        }
    }
}

fn read_record(path: &Path) -> Result<FaceEmbedding, CacheError> {
    let json = fs::read_to_string(path).map_err(CacheError::io(path))?;
    let record: FaceEmbedding = serde_json::from_str(&json).map_err(CacheError::json(path))?;
    if !record.is_well_formed() {
        return Err(CacheError::Corruption {
            path: path.to_path_buf(),
            reason: format!(
                "{} faces, {} predictions, {}-dim vector",
                record.faces,
                record.predictions.len(),
                record.embedding.len()
            ),
        });
    }
    Ok(record)
}

/// Plain file names directly inside `dir`, sorted. Missing dirs yield nothing.
fn list_files(dir: &Path) -> Vec<String> {
    if !dir.is_dir() {
        return Vec::new();
    }
    WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                log::warn!("Cannot list cache entry: {e}");
                None
            }
        })
        .filter(|entry| entry.file_type().is_file())
        .filter_map(|entry| entry.file_name().to_str().map(str::to_string))
        .collect()
}

/// Neither an embedding file nor the index (or its temporary sibling).
fn is_foreign(file: &str) -> bool {
    let reserved = file == INDEX_FILE_NAME || file == format!("{INDEX_FILE_NAME}.tmp");
    !reserved && !is_valid_cache_file_name(file)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::domain::face_embedding::Prediction;
    use crate::embedding::embedding_generator::EmbeddingError;
    use crate::shared::frame::FrameError;
    use rstest::rstest;
    use tempfile::TempDir;

    fn record(path: &str, faces: usize) -> FaceEmbedding {
        FaceEmbedding {
            path: path.to_string(),
            embedding: vec![0.6, 0.8],
            faces,
            cached: "2024-01-01T00:00:00+00:00".into(),
            predictions: (0..faces)
                .map(|_| Prediction {
                    top_left: [0.0, 0.0],
                    bottom_right: [10.0, 10.0],
                    probability: 0.9,
                    attributes: None,
                    attribute_confidence: None,
                    landmarks: None,
                })
                .collect(),
        }
    }

    struct Fixture {
        root: TempDir,
        sources: PathBuf,
        store: CacheStore,
    }

    fn fixture() -> Fixture {
        let root = tempfile::tempdir().unwrap();
        let sources = root.path().join("frames");
        fs::create_dir_all(&sources).unwrap();
        let store = CacheStore::new(root.path().join("cache"));
        Fixture {
            root,
            sources,
            store,
        }
    }

    impl Fixture {
        /// Creates a source image file and returns its path string.
        fn source(&self, name: &str) -> String {
            let path = self.sources.join(name);
            fs::write(&path, b"jpeg bytes").unwrap();
            path.to_string_lossy().into_owned()
        }

        /// Writes the embedding for `path` and indexes it.
        fn embed(&self, index: &mut CacheIndex, path: &str) -> String {
            let file = self.store.write_embedding(&record(path, 1)).unwrap();
            index.upsert(IndexEntry::embedded(path, 1, 1, file.clone()));
            file
        }
    }

    enum Mode {
        Faces,
        NoFaces,
        Fail,
    }

    struct StubEmbedder(Mode);

    impl FaceEmbedder for StubEmbedder {
        fn generate(&mut self, _bytes: &[u8]) -> Result<Option<FaceEmbedding>, EmbeddingError> {
            match self.0 {
                Mode::Faces => Ok(Some(record("", 2))),
                Mode::NoFaces => Ok(None),
                Mode::Fail => Err(EmbeddingError::InvalidImage(FrameError::EmptyCrop)),
            }
        }
    }

    #[test]
    fn test_load_without_index_is_empty() {
        let f = fixture();
        assert!(f.store.load().is_empty());
    }

    #[test]
    fn test_save_then_load_round_trip() {
        let f = fixture();
        let mut index = CacheIndex::new();
        let b = f.source("frame-blank2.jpg");
        let a = f.source("frame-blank1.jpg");
        f.embed(&mut index, &b);
        f.embed(&mut index, &a);
        index.upsert(IndexEntry::no_faces(f.source("frame-blank3.jpg"), 7));

        f.store.save(&mut index).unwrap();
        assert!(index.last_update.is_some());
        assert!(!f.store.tmp_index_path().exists());

        let loaded = f.store.load();
        assert_eq!(loaded, index);
        let order: Vec<&str> = loaded.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(order[0], b);
        assert_eq!(order[1], a);
    }

    #[test]
    fn test_every_saved_entry_has_its_file() {
        let f = fixture();
        let mut index = CacheIndex::new();
        let kept = f.source("frame-blank1.jpg");
        f.embed(&mut index, &kept);
        index.upsert(IndexEntry::embedded("ghost.jpg", 1, 1, "0badf00d.json".into()));

        f.store.save(&mut index).unwrap();
        assert_eq!(index.len(), 1);
        for entry in index.iter() {
            let file = entry.embedding_file.as_ref().unwrap();
            assert!(f.store.cache_dir().join(file).is_file());
        }
    }

    #[test]
    fn test_load_drops_missing_file_and_repersists() {
        let f = fixture();
        let mut index = CacheIndex::new();
        let a = f.source("frame-blank1.jpg");
        let b = f.source("frame-blank2.jpg");
        f.embed(&mut index, &a);
        let file_b = f.embed(&mut index, &b);
        f.store.save(&mut index).unwrap();

        fs::remove_file(f.store.cache_dir().join(file_b)).unwrap();
        let loaded = f.store.load();
        assert_eq!(loaded.len(), 1);
        assert!(loaded.get(&b).is_none());

        let on_disk: CacheIndex =
            serde_json::from_str(&fs::read_to_string(f.store.index_path()).unwrap()).unwrap();
        assert!(on_disk.get(&b).is_none());
    }

    #[test]
    fn test_corrupt_index_is_rebuilt_and_saved() {
        let f = fixture();
        let mut index = CacheIndex::new();
        let a = f.source("frame-blank1.jpg");
        f.embed(&mut index, &a);
        fs::create_dir_all(f.store.cache_dir()).unwrap();
        fs::write(f.store.index_path(), "{ not json").unwrap();

        let loaded = f.store.load();
        assert_eq!(loaded.len(), 1);
        assert!(loaded.get(&a).is_some());
        let on_disk = fs::read_to_string(f.store.index_path()).unwrap();
        assert!(serde_json::from_str::<CacheIndex>(&on_disk).is_ok());
    }

    #[test]
    fn test_rebuild_sorted_by_path_with_mtime_fallback() {
        let f = fixture();
        let mut index = CacheIndex::new();
        let z = f.source("z_frame-blank1.jpg");
        let a = f.source("a_frame-blank1.jpg");
        f.embed(&mut index, &z);
        f.embed(&mut index, &a);
        f.store.write_embedding(&record("/gone/frame-blank9.jpg", 1)).unwrap();

        let rebuilt = f.store.rebuild_from_cache_files();
        let order: Vec<&str> = rebuilt.iter().map(|e| e.path.as_str()).collect();
        let mut sorted = order.clone();
        sorted.sort();
        assert_eq!(order, sorted);
        assert_eq!(rebuilt.len(), 3);
        assert_eq!(rebuilt.get("/gone/frame-blank9.jpg").unwrap().mtime, 0);
        assert!(rebuilt.get(&a).unwrap().mtime > 0);
    }

    #[test]
    fn test_secondary_dir_satisfies_existence_check() {
        let f = fixture();
        let secondary = f.root.path().join("worker-cache");
        let other = CacheStore::new(&secondary);
        let path = f.source("frame-blank1.jpg");
        let file = other.write_embedding(&record(&path, 1)).unwrap();

        let store = CacheStore::new(f.store.cache_dir()).with_secondary_dirs(vec![secondary]);
        let mut index = CacheIndex::new();
        index.upsert(IndexEntry::embedded(path.clone(), 1, 1, file));
        store.save(&mut index).unwrap();
        assert_eq!(store.load().len(), 1);
        assert_eq!(store.load_embeddings(&index)[0].path, path);
    }

    #[test]
    fn test_validate_reports_each_defect() {
        let f = fixture();
        let mut index = CacheIndex::new();

        let healthy = f.source("frame-blank1.jpg");
        f.embed(&mut index, &healthy);

        index.upsert(IndexEntry::no_faces("/gone/frame-blank2.jpg", 1));

        let missing_file = f.source("frame-blank3.jpg");
        index.upsert(IndexEntry::embedded(missing_file.clone(), 1, 1, "00000000.json".into()));

        let malformed = f.source("frame-blank4.jpg");
        let malformed_file = embedding_file_name(&malformed);
        fs::write(f.store.cache_dir().join(&malformed_file), "{}").unwrap();
        index.upsert(IndexEntry::embedded(malformed.clone(), 1, 1, malformed_file));

        let misnamed = f.source("frame-blank5.jpg");
        let wrong = "abcdef01.json".to_string();
        let json = serde_json::to_string(&record(&misnamed, 1)).unwrap();
        fs::write(f.store.cache_dir().join(&wrong), json).unwrap();
        index.upsert(IndexEntry::embedded(misnamed.clone(), 1, 1, wrong.clone()));

        fs::write(f.store.cache_dir().join("notes.txt"), "x").unwrap();

        let defects = f.store.validate(&index);
        assert_eq!(defects.len(), 5, "{defects:?}");
        assert!(defects.contains(&CacheDefect::InvalidFileName {
            file: "notes.txt".into()
        }));
        assert!(defects.contains(&CacheDefect::SourceMissing {
            path: "/gone/frame-blank2.jpg".into()
        }));
        assert!(defects.contains(&CacheDefect::EmbeddingFileMissing {
            path: missing_file,
            file: "00000000.json".into()
        }));
        assert!(defects
            .iter()
            .any(|d| matches!(d, CacheDefect::MalformedPayload { path, .. } if *path == malformed)));
        assert!(defects.contains(&CacheDefect::HashMismatch {
            expected: embedding_file_name(&misnamed),
            path: misnamed,
            file: wrong,
        }));
    }

    #[test]
    fn test_validate_is_read_only() {
        let f = fixture();
        let mut index = CacheIndex::new();
        f.embed(&mut index, &f.source("frame-blank1.jpg"));
        fs::write(f.store.cache_dir().join("junk.bin"), "x").unwrap();
        f.store.validate(&index);
        assert!(f.store.cache_dir().join("junk.bin").exists());
    }

    #[test]
    fn test_cleanup_repairs_cache() {
        let f = fixture();
        let mut index = CacheIndex::new();

        let healthy = f.source("frame-blank1.jpg");
        f.embed(&mut index, &healthy);

        let gone = f.source("frame-blank2.jpg");
        let gone_file = f.embed(&mut index, &gone);
        fs::remove_file(&gone).unwrap();

        let misnamed = f.source("frame-blank3.jpg");
        let wrong = "abcdef01.json".to_string();
        let json = serde_json::to_string(&record(&misnamed, 1)).unwrap();
        fs::write(f.store.cache_dir().join(&wrong), json).unwrap();
        index.upsert(IndexEntry::embedded(misnamed.clone(), 1, 1, wrong.clone()));

        fs::write(f.store.cache_dir().join("stray.txt"), "x").unwrap();

        let report = f
            .store
            .cleanup(&mut index, &mut StubEmbedder(Mode::Faces))
            .unwrap();

        assert_eq!(report.removed_files, vec!["stray.txt".to_string()]);
        assert_eq!(report.dropped_entries, 1);
        assert_eq!(report.regenerated, 1);
        assert_eq!(report.marked_no_faces, 0);

        assert!(index.get(&gone).is_none());
        assert!(!f.store.cache_dir().join(gone_file).exists());
        let fixed = index.get(&misnamed).unwrap();
        assert_eq!(fixed.embedding_file, Some(embedding_file_name(&misnamed)));
        assert_eq!(fixed.faces, 2);
        assert!(!f.store.cache_dir().join(wrong).exists());
        assert_eq!(f.store.read_embedding(&embedding_file_name(&misnamed)).unwrap().path, misnamed);
        assert!(f.store.validate(&index).is_empty());
    }

    #[rstest]
    #[case(Mode::NoFaces)]
    #[case(Mode::Fail)]
    fn test_cleanup_falls_back_to_no_faces(#[case] mode: Mode) {
        let f = fixture();
        let mut index = CacheIndex::new();
        let path = f.source("frame-blank1.jpg");
        index.upsert(IndexEntry::embedded(path.clone(), 1, 1, "00000000.json".into()));

        let report = f.store.cleanup(&mut index, &mut StubEmbedder(mode)).unwrap();
        assert_eq!(report.marked_no_faces, 1);
        assert!(index.get(&path).unwrap().no_faces);
    }

    #[test]
    fn test_validate_reports_unreferenced_embedding() {
        let f = fixture();
        let mut index = CacheIndex::new();
        f.embed(&mut index, &f.source("frame-blank1.jpg"));
        let dropped = f.source("frame-blank2.jpg");
        let stale = f.store.write_embedding(&record(&dropped, 1)).unwrap();
        index.upsert(IndexEntry::no_faces(dropped, 1));

        assert_eq!(
            f.store.validate(&index),
            vec![CacheDefect::UnreferencedFile { file: stale }]
        );
    }

    #[test]
    fn test_cleanup_removes_stale_and_reindexes_orphans() {
        let f = fixture();
        let mut index = CacheIndex::new();

        let marked = f.source("frame-blank1.jpg");
        let stale = f.store.write_embedding(&record(&marked, 1)).unwrap();
        index.upsert(IndexEntry::no_faces(marked.clone(), 1));

        let dead = f.store.write_embedding(&record("/gone/frame-blank2.jpg", 1)).unwrap();

        let untracked = f.source("frame-blank3.jpg");
        let orphan = f.store.write_embedding(&record(&untracked, 1)).unwrap();

        let report = f
            .store
            .cleanup(&mut index, &mut StubEmbedder(Mode::Fail))
            .unwrap();

        assert_eq!(report.adopted, 1);
        let mut removed = report.removed_files.clone();
        removed.sort();
        let mut expected = vec![stale.clone(), dead.clone()];
        expected.sort();
        assert_eq!(removed, expected);

        assert!(!f.store.cache_dir().join(stale).exists());
        assert!(!f.store.cache_dir().join(dead).exists());
        assert!(index.get(&marked).unwrap().no_faces);
        let adopted = index.get(&untracked).unwrap();
        assert_eq!(adopted.embedding_file, Some(orphan));
        assert_eq!(adopted.mtime, 0);
        assert!(f.store.validate(&index).is_empty());
    }

    #[test]
    fn test_load_embeddings_skips_no_faces() {
        let f = fixture();
        let mut index = CacheIndex::new();
        let a = f.source("frame-blank1.jpg");
        f.embed(&mut index, &a);
        index.upsert(IndexEntry::no_faces(f.source("frame-blank2.jpg"), 1));
        let loaded = f.store.load_embeddings(&index);
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].path, a);
    }

    #[rstest]
    #[case("index.json", false)]
    #[case("index.json.tmp", false)]
    #[case("0123abcd.json", false)]
    #[case("index.json.bak", true)]
    #[case("README", true)]
    fn test_foreign_file_detection(#[case] name: &str, #[case] foreign: bool) {
        assert_eq!(is_foreign(name), foreign);
    }
}
