//! Content-addressed document cache.
//!
//! ## Layout
//!
//! ```text
//! <cache_dir>/
//!   cache_index.json        fingerprint → metadata (small, rewritten atomically)
//!   <fingerprint>.txt       merged text, one blob per document
//! ```
//!
//! ## Crash safety
//!
//! A store writes and fsyncs the text blob first, then publishes a new index
//! (temp file, fsync, rename, directory fsync). A crash at any point leaves
//! either the old index or the new one on disk. A blob without an index
//! entry is an orphan and is removed on the next [`DocumentCache::open`].
//!
//! ## Concurrency
//!
//! The in-memory index sits behind a `RwLock` that is only held for map
//! operations, never across I/O, so lookups do not wait for a store. Index
//! publication is serialised by a separate async mutex; blob writes for
//! distinct fingerprints run outside it.

use crate::error::Pdf2QaError;
use crate::fingerprint::DocumentFingerprint;
use crate::output::{CacheStats, CachedDocument, ExtractedDocument};
use crate::pipeline::extract::merge_pages;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

/// File name of the durable index inside the cache directory.
pub const INDEX_FILE: &str = "cache_index.json";

/// One record of `cache_index.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct IndexEntry {
    file_name: String,
    page_count: usize,
    ocr_page_count: usize,
    #[serde(default)]
    ocr_pages: BTreeSet<usize>,
    #[serde(default)]
    failed_pages: BTreeSet<usize>,
    /// Blob file name, relative to the cache directory.
    text_reference: String,
    #[serde(default)]
    text_bytes: u64,
    #[serde(default)]
    word_count: usize,
    #[serde(default)]
    char_count: usize,
    processed_at: DateTime<Utc>,
}

impl IndexEntry {
    fn to_document(&self, fingerprint: DocumentFingerprint, text: String) -> CachedDocument {
        CachedDocument {
            fingerprint,
            file_name: self.file_name.clone(),
            merged_text: Arc::from(text),
            page_count: self.page_count,
            pages_using_ocr: self.ocr_pages.clone(),
            failed_pages: self.failed_pages.clone(),
            word_count: self.word_count,
            char_count: self.char_count,
            created_at: self.processed_at,
        }
    }
}

type Index = HashMap<DocumentFingerprint, IndexEntry>;

/// Handle to an on-disk document cache.
///
/// Open once and share behind an `Arc`.
#[derive(Debug)]
pub struct DocumentCache {
    dir: PathBuf,
    index_path: PathBuf,
    entries: RwLock<Index>,
    publish: tokio::sync::Mutex<()>,
}

impl DocumentCache {
    /// Open (or create) the cache in `dir`.
    ///
    /// Fails with [`Pdf2QaError::CacheCorrupt`] when `cache_index.json`
    /// exists but cannot be parsed; the file is left untouched.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, Pdf2QaError> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir).map_err(|e| io_err(&dir, e))?;

        let index_path = dir.join(INDEX_FILE);
        let entries = load_index(&index_path)?;
        sweep(&dir, &entries);

        info!(
            "Cache opened at {} ({} entries)",
            dir.display(),
            entries.len()
        );
        Ok(Self {
            dir,
            index_path,
            entries: RwLock::new(entries),
            publish: tokio::sync::Mutex::new(()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn len(&self) -> usize {
        self.read_entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, fingerprint: &DocumentFingerprint) -> bool {
        self.read_entries().contains_key(fingerprint)
    }

    /// Look up a document by fingerprint.
    ///
    /// An entry whose blob is missing or unreadable is reported as a miss.
    pub async fn lookup(&self, fingerprint: &DocumentFingerprint) -> Option<CachedDocument> {
        let entry = self.read_entries().get(fingerprint).cloned()?;
        let blob = self.dir.join(&entry.text_reference);

        match tokio::fs::read_to_string(&blob).await {
            Ok(text) => {
                debug!("Cache hit {} ({})", fingerprint.short(), entry.file_name);
                Some(entry.to_document(*fingerprint, text))
            }
            Err(e) => {
                warn!(
                    "Cache entry {} has unreadable blob {}: {}",
                    fingerprint.short(),
                    blob.display(),
                    e
                );
                None
            }
        }
    }

    /// Store an extracted document.
    ///
    /// First writer wins: if the fingerprint is already cached, the existing
    /// entry is returned unchanged and nothing is written.
    pub async fn store(
        &self,
        fingerprint: DocumentFingerprint,
        document: &ExtractedDocument,
    ) -> Result<CachedDocument, Pdf2QaError> {
        if let Some(existing) = self.lookup(&fingerprint).await {
            debug!("Store {}: already cached", fingerprint.short());
            return Ok(existing);
        }

        let text = merge_pages(&document.pages);
        let entry = build_entry(fingerprint, document, &text);

        // Blob goes to a temp file outside the publish lock.
        let dir = self.dir.clone();
        let blob_text = text.clone();
        let staged = tokio::task::spawn_blocking(move || stage_blob(&dir, &blob_text))
            .await
            .map_err(|e| Pdf2QaError::Internal(format!("Cache write task panicked: {}", e)))??;

        let _guard = self.publish.lock().await;

        if let Some(existing) = self.lookup(&fingerprint).await {
            debug!("Store {}: lost race, keeping first entry", fingerprint.short());
            return Ok(existing);
        }

        let mut snapshot = self.read_entries().clone();
        snapshot.insert(fingerprint, entry.clone());

        let blob_path = self.dir.join(&entry.text_reference);
        let index_path = self.index_path.clone();
        let dir = self.dir.clone();
        tokio::task::spawn_blocking(move || -> Result<(), Pdf2QaError> {
            staged
                .persist(&blob_path)
                .map_err(|e| io_err(&blob_path, e.error))?;
            write_index(&dir, &index_path, &snapshot)
        })
        .await
        .map_err(|e| Pdf2QaError::Internal(format!("Cache write task panicked: {}", e)))??;

        self.write_entries().insert(fingerprint, entry.clone());
        info!(
            "Cached '{}' as {} ({} pages, {} OCR)",
            entry.file_name,
            fingerprint.short(),
            entry.page_count,
            entry.ocr_page_count
        );
        Ok(entry.to_document(fingerprint, text))
    }

    /// Remove every entry and blob. Returns the number of entries removed.
    pub async fn clear(&self) -> Result<usize, Pdf2QaError> {
        let _guard = self.publish.lock().await;

        let removed: Vec<IndexEntry> = self.read_entries().values().cloned().collect();
        let dir = self.dir.clone();
        let index_path = self.index_path.clone();

        // Publish the empty index before touching blobs, so a crash midway
        // leaves orphans (swept on open) rather than dangling entries.
        tokio::task::spawn_blocking(move || write_index(&dir, &index_path, &Index::new()))
            .await
            .map_err(|e| Pdf2QaError::Internal(format!("Cache clear task panicked: {}", e)))??;
        self.write_entries().clear();

        // The index is already empty; a blob that cannot be removed is an
        // orphan for the next open to sweep.
        let count = removed.len();
        let dir = self.dir.clone();
        tokio::task::spawn_blocking(move || {
            for entry in &removed {
                let path = dir.join(&entry.text_reference);
                match std::fs::remove_file(&path) {
                    Ok(()) => {}
                    Err(e) if e.kind() == ErrorKind::NotFound => {}
                    Err(e) => warn!("Could not remove cache blob {}: {}", path.display(), e),
                }
            }
        })
        .await
        .map_err(|e| Pdf2QaError::Internal(format!("Cache clear task panicked: {}", e)))?;

        info!("Cache cleared ({} entries)", count);
        Ok(count)
    }

    /// Read-only statistics.
    pub fn stats(&self) -> CacheStats {
        let entries = self.read_entries();
        CacheStats {
            entry_count: entries.len(),
            total_text_bytes: entries.values().map(|e| e.text_bytes).sum(),
            ocr_page_count: entries.values().map(|e| e.ocr_page_count).sum(),
            failed_page_count: entries.values().map(|e| e.failed_pages.len()).sum(),
            cache_dir: self.dir.display().to_string(),
        }
    }

    fn read_entries(&self) -> std::sync::RwLockReadGuard<'_, Index> {
        self.entries.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_entries(&self) -> std::sync::RwLockWriteGuard<'_, Index> {
        self.entries.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Describe a freshly extracted document as a [`CachedDocument`] without
/// storing it.
pub fn describe(fingerprint: DocumentFingerprint, document: &ExtractedDocument) -> CachedDocument {
    let text = merge_pages(&document.pages);
    build_entry(fingerprint, document, &text).to_document(fingerprint, text)
}

// ── Internal helpers ─────────────────────────────────────────────────────

fn io_err(path: &Path, source: std::io::Error) -> Pdf2QaError {
    Pdf2QaError::CacheIo {
        path: path.to_path_buf(),
        source,
    }
}

fn blob_name(fingerprint: &DocumentFingerprint) -> String {
    format!("{}.txt", fingerprint.to_hex())
}

fn build_entry(
    fingerprint: DocumentFingerprint,
    document: &ExtractedDocument,
    merged_text: &str,
) -> IndexEntry {
    let ocr_pages = document.ocr_pages();
    let word_count = document
        .pages
        .iter()
        .map(|p| p.text.split_whitespace().count())
        .sum();
    let char_count = document.pages.iter().map(|p| p.text.chars().count()).sum();

    IndexEntry {
        file_name: document.file_name.clone(),
        page_count: document.page_count(),
        ocr_page_count: ocr_pages.len(),
        ocr_pages,
        failed_pages: document.failed_pages(),
        text_reference: blob_name(&fingerprint),
        text_bytes: merged_text.len() as u64,
        word_count,
        char_count,
        processed_at: Utc::now(),
    }
}

fn load_index(path: &Path) -> Result<Index, Pdf2QaError> {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Index::new()),
        Err(e) => return Err(io_err(path, e)),
    };

    let on_disk: BTreeMap<String, IndexEntry> =
        serde_json::from_str(&raw).map_err(|e| Pdf2QaError::CacheCorrupt {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })?;

    on_disk
        .into_iter()
        .map(|(key, entry)| {
            let fp = key
                .parse::<DocumentFingerprint>()
                .map_err(|e| Pdf2QaError::CacheCorrupt {
                    path: path.to_path_buf(),
                    detail: format!("bad key '{}': {}", key, e),
                })?;
            Ok((fp, entry))
        })
        .collect()
}

/// Write `text` to a synced temp file in `dir`, ready to be persisted.
fn stage_blob(dir: &Path, text: &str) -> Result<NamedTempFile, Pdf2QaError> {
    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| io_err(dir, e))?;
    tmp.write_all(text.as_bytes())
        .map_err(|e| io_err(tmp.path(), e))?;
    tmp.as_file().sync_all().map_err(|e| io_err(tmp.path(), e))?;
    Ok(tmp)
}

/// Atomically replace the on-disk index with `entries`.
fn write_index(dir: &Path, index_path: &Path, entries: &Index) -> Result<(), Pdf2QaError> {
    let on_disk: BTreeMap<String, &IndexEntry> =
        entries.iter().map(|(fp, e)| (fp.to_hex(), e)).collect();
    let json = serde_json::to_vec_pretty(&on_disk)
        .map_err(|e| Pdf2QaError::Internal(format!("index serialisation: {}", e)))?;

    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| io_err(dir, e))?;
    tmp.write_all(&json).map_err(|e| io_err(tmp.path(), e))?;
    tmp.as_file().sync_all().map_err(|e| io_err(tmp.path(), e))?;
    tmp.persist(index_path)
        .map_err(|e| io_err(index_path, e.error))?;
    sync_dir(dir);
    Ok(())
}

#[cfg(unix)]
fn sync_dir(dir: &Path) {
    if let Err(e) = std::fs::File::open(dir).and_then(|d| d.sync_all()) {
        warn!("fsync of {} failed: {}", dir.display(), e);
    }
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) {}

/// Remove leftovers of interrupted writes: temp files and blobs with no
/// index entry.
fn sweep(dir: &Path, entries: &Index) {
    let referenced: BTreeSet<&str> = entries.values().map(|e| e.text_reference.as_str()).collect();
    let Ok(listing) = std::fs::read_dir(dir) else {
        return;
    };

    for item in listing.flatten() {
        let name = item.file_name();
        let Some(name) = name.to_str() else { continue };
        let is_temp = name.starts_with(".tmp");
        let is_orphan = name
            .strip_suffix(".txt")
            .is_some_and(|stem| stem.parse::<DocumentFingerprint>().is_ok())
            && !referenced.contains(name);
        if is_temp || is_orphan {
            debug!("Removing stale cache file {}", name);
            if let Err(e) = std::fs::remove_file(item.path()) {
                warn!("Could not remove {}: {}", item.path().display(), e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::fingerprint;
    use crate::output::PageRecord;

    fn doc(name: &str, pages: &[(&str, bool)]) -> ExtractedDocument {
        ExtractedDocument {
            file_name: name.to_string(),
            pages: pages
                .iter()
                .enumerate()
                .map(|(i, (text, ocr))| PageRecord {
                    page_num: i + 1,
                    text: text.to_string(),
                    used_ocr: *ocr,
                    error: None,
                })
                .collect(),
        }
    }

    #[tokio::test]
    async fn store_then_lookup_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DocumentCache::open(dir.path()).unwrap();
        let fp = fingerprint(b"%PDF-report");
        let d = doc("report.pdf", &[("Revenue grew 10%.", false), ("Signed: J. Doe", true)]);

        let stored = cache.store(fp, &d).await.unwrap();
        let found = cache.lookup(&fp).await.unwrap();
        assert_eq!(stored.merged_text, found.merged_text);
        assert_eq!(found.merged_text.as_ref(), merge_pages(&d.pages));
        assert_eq!(found.page_count, 2);
        assert_eq!(found.pages_using_ocr.iter().copied().collect::<Vec<_>>(), vec![2]);
        assert_eq!(found.word_count, 6);
    }

    #[tokio::test]
    async fn second_store_keeps_first_entry() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DocumentCache::open(dir.path()).unwrap();
        let fp = fingerprint(b"same bytes");

        let first = cache.store(fp, &doc("a.pdf", &[("one", false)])).await.unwrap();
        let second = cache.store(fp, &doc("b.pdf", &[("two", false)])).await.unwrap();
        assert_eq!(second.file_name, "a.pdf");
        assert_eq!(second.merged_text, first.merged_text);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn concurrent_stores_of_one_fingerprint() {
        let dir = tempfile::tempdir().unwrap();
        let cache = Arc::new(DocumentCache::open(dir.path()).unwrap());
        let fp = fingerprint(b"raced");

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let cache = Arc::clone(&cache);
                tokio::spawn(async move {
                    let d = doc(&format!("copy{i}.pdf"), &[("text", false)]);
                    cache.store(fp, &d).await.unwrap()
                })
            })
            .collect();
        let mut names = BTreeSet::new();
        for h in handles {
            names.insert(h.await.unwrap().file_name);
        }
        assert_eq!(names.len(), 1, "all callers see the same winner");
        assert_eq!(cache.len(), 1);

        let blobs = std::fs::read_dir(dir.path())
            .unwrap()
            .flatten()
            .filter(|e| e.file_name().to_string_lossy().ends_with(".txt"))
            .count();
        assert_eq!(blobs, 1);
    }

    #[tokio::test]
    async fn reopen_sees_persisted_entries() {
        let dir = tempfile::tempdir().unwrap();
        let fp = fingerprint(b"persist me");
        {
            let cache = DocumentCache::open(dir.path()).unwrap();
            cache.store(fp, &doc("p.pdf", &[("kept", false)])).await.unwrap();
        }
        let cache = DocumentCache::open(dir.path()).unwrap();
        let found = cache.lookup(&fp).await.unwrap();
        assert_eq!(found.file_name, "p.pdf");
        assert_eq!(found.merged_text.as_ref(), "[[page 1]]\nkept");
    }

    #[tokio::test]
    async fn clear_makes_every_lookup_miss() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DocumentCache::open(dir.path()).unwrap();
        let a = fingerprint(b"a");
        let b = fingerprint(b"b");
        cache.store(a, &doc("a.pdf", &[("x", false)])).await.unwrap();
        cache.store(b, &doc("b.pdf", &[("y", true)])).await.unwrap();

        assert_eq!(cache.clear().await.unwrap(), 2);
        assert!(cache.lookup(&a).await.is_none());
        assert!(cache.lookup(&b).await.is_none());
        assert_eq!(cache.stats().entry_count, 0);

        let reopened = DocumentCache::open(dir.path()).unwrap();
        assert!(reopened.is_empty());
    }

    #[tokio::test]
    async fn clear_forgets_entries_whose_blob_cannot_be_removed() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DocumentCache::open(dir.path()).unwrap();
        let fp = fingerprint(b"stuck");
        cache.store(fp, &doc("stuck.pdf", &[("x", false)])).await.unwrap();

        // A directory in the blob's place makes remove_file fail.
        let blob = dir.path().join(blob_name(&fp));
        std::fs::remove_file(&blob).unwrap();
        std::fs::create_dir(&blob).unwrap();
        std::fs::write(blob.join("keep"), b"x").unwrap();

        assert_eq!(cache.clear().await.unwrap(), 1);
        assert!(cache.is_empty());
        assert!(cache.lookup(&fp).await.is_none());
        assert!(DocumentCache::open(dir.path()).unwrap().is_empty());
    }

    #[test]
    fn corrupt_index_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let index = dir.path().join(INDEX_FILE);
        std::fs::write(&index, b"{ not json").unwrap();

        let err = DocumentCache::open(dir.path()).unwrap_err();
        assert!(matches!(err, Pdf2QaError::CacheCorrupt { .. }));
        assert_eq!(std::fs::read(&index).unwrap(), b"{ not json");
    }

    #[test]
    fn open_sweeps_orphans_and_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        let orphan = dir.path().join(format!("{}.txt", fingerprint(b"orphan").to_hex()));
        let temp = dir.path().join(".tmpAbC123");
        let unrelated = dir.path().join("notes.txt");
        std::fs::write(&orphan, "half-written").unwrap();
        std::fs::write(&temp, "junk").unwrap();
        std::fs::write(&unrelated, "keep me").unwrap();

        DocumentCache::open(dir.path()).unwrap();
        assert!(!orphan.exists());
        assert!(!temp.exists());
        assert!(unrelated.exists());
    }

    #[tokio::test]
    async fn missing_blob_is_a_miss() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DocumentCache::open(dir.path()).unwrap();
        let fp = fingerprint(b"blob goes away");
        cache.store(fp, &doc("g.pdf", &[("gone", false)])).await.unwrap();
        std::fs::remove_file(dir.path().join(blob_name(&fp))).unwrap();
        assert!(cache.lookup(&fp).await.is_none());
    }

    #[tokio::test]
    async fn stats_sum_entries() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DocumentCache::open(dir.path()).unwrap();
        let mut failed = doc("f.pdf", &[("ok", false), ("", false)]);
        failed.pages[1].error = Some(crate::error::PageError::OcrUnavailable {
            page: 2,
            detail: "missing".into(),
        });
        cache.store(fingerprint(b"1"), &doc("a.pdf", &[("x", true), ("y", true)])).await.unwrap();
        cache.store(fingerprint(b"2"), &failed).await.unwrap();

        let stats = cache.stats();
        assert_eq!(stats.entry_count, 2);
        assert_eq!(stats.ocr_page_count, 2);
        assert_eq!(stats.failed_page_count, 1);
        assert!(stats.total_text_bytes > 0);
    }
}
