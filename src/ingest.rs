//! Ingestion: input → fingerprint → cache lookup → extraction → cache store.
//!
//! ```text
//! path / URL / bytes
//!       │
//!       ▼
//! fingerprint ──▶ cache.lookup ──hit──▶ IngestedDocument { from_cache: true }
//!                     │ miss
//!                     ▼
//!            extract (spawn_blocking)
//!                     │
//!                     ▼
//!               cache.store ──────────▶ IngestedDocument { from_cache: false }
//! ```
//!
//! Extraction runs without any cache lock held, so several documents can be
//! extracted in parallel (`extract_concurrency`).

use crate::cache::{describe, DocumentCache};
use crate::config::DatasetConfig;
use crate::error::Pdf2QaError;
use crate::fingerprint::fingerprint;
use crate::output::{ExtractedDocument, IngestedDocument};
use crate::pipeline::extract::DocumentExtractor;
use crate::pipeline::input::resolve_input;
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use tracing::{info, warn};

/// Ingest one path or URL.
pub async fn ingest(
    input: &str,
    cache: &DocumentCache,
    extractor: Arc<dyn DocumentExtractor>,
    config: &DatasetConfig,
) -> Result<IngestedDocument, Pdf2QaError> {
    let resolved = resolve_input(input, config.download_timeout_secs).await?;
    ingest_bytes(resolved.bytes, &resolved.file_name, cache, extractor, config).await
}

/// Ingest an in-memory document.
///
/// On a cache hit the returned document carries `file_name` even when the
/// entry was first stored under another name.
pub async fn ingest_bytes(
    bytes: Vec<u8>,
    file_name: &str,
    cache: &DocumentCache,
    extractor: Arc<dyn DocumentExtractor>,
    config: &DatasetConfig,
) -> Result<IngestedDocument, Pdf2QaError> {
    let fp = fingerprint(&bytes);

    if !config.force_reprocess {
        if let Some(hit) = cache.lookup(&fp).await {
            info!("Using cached document '{}' ({})", file_name, fp.short());
            return Ok(IngestedDocument {
                document: hit.with_file_name(file_name),
                from_cache: true,
            });
        }
    }

    let name = file_name.to_string();
    let extracted = tokio::task::spawn_blocking(move || extractor.extract(&bytes, &name))
        .await
        .map_err(|e| Pdf2QaError::Internal(format!("Extraction task panicked: {}", e)))??;

    check_usable(&extracted)?;

    if config.force_reprocess && cache.contains(&fp) {
        info!(
            "Re-extracted '{}' ({}); cache entry kept",
            file_name,
            fp.short()
        );
        return Ok(IngestedDocument {
            document: describe(fp, &extracted),
            from_cache: false,
        });
    }

    let stored = cache.store(fp, &extracted).await?;
    Ok(IngestedDocument {
        document: stored.with_file_name(file_name),
        from_cache: false,
    })
}

/// Ingest several inputs, up to `extract_concurrency` at a time.
///
/// Results are returned in input order; one failing input does not affect
/// the others.
pub async fn ingest_all(
    inputs: &[String],
    cache: &DocumentCache,
    extractor: Arc<dyn DocumentExtractor>,
    config: &DatasetConfig,
) -> Vec<Result<IngestedDocument, Pdf2QaError>> {
    stream::iter(inputs.iter())
        .map(|input| {
            let extractor = Arc::clone(&extractor);
            async move {
                let result = ingest(input, cache, extractor, config).await;
                if let Err(ref e) = result {
                    warn!("Skipping '{}': {}", input, e);
                }
                result
            }
        })
        .buffered(config.extract_concurrency.max(1))
        .collect()
        .await
}

/// A document where every page failed is not worth caching: it would
/// pin an empty entry that blocks a later successful extraction.
fn check_usable(doc: &ExtractedDocument) -> Result<(), Pdf2QaError> {
    if doc.pages.is_empty() {
        return Err(Pdf2QaError::NoPagesExtracted {
            name: doc.file_name.clone(),
            pages: 0,
            first_error: "document has no pages".to_string(),
        });
    }
    if doc.pages.iter().all(|p| p.error.is_some()) {
        let first_error = doc
            .pages
            .iter()
            .find_map(|p| p.error.as_ref())
            .map(|e| e.to_string())
            .unwrap_or_default();
        return Err(Pdf2QaError::NoPagesExtracted {
            name: doc.file_name.clone(),
            pages: doc.pages.len(),
            first_error,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PageError;
    use crate::output::PageRecord;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingExtractor {
        calls: AtomicUsize,
        fail_all: bool,
    }

    impl DocumentExtractor for CountingExtractor {
        fn extract(&self, bytes: &[u8], file_name: &str) -> Result<ExtractedDocument, Pdf2QaError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let error = self.fail_all.then(|| PageError::OcrUnavailable {
                page: 1,
                detail: "tesseract missing".into(),
            });
            Ok(ExtractedDocument {
                file_name: file_name.to_string(),
                pages: vec![PageRecord {
                    page_num: 1,
                    text: String::from_utf8_lossy(bytes).into_owned(),
                    used_ocr: false,
                    error,
                }],
            })
        }
    }

    fn extractor(fail_all: bool) -> Arc<CountingExtractor> {
        Arc::new(CountingExtractor {
            calls: AtomicUsize::new(0),
            fail_all,
        })
    }

    #[tokio::test]
    async fn second_ingest_is_a_cache_hit_under_new_name() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DocumentCache::open(dir.path()).unwrap();
        let config = DatasetConfig::default();
        let ex = extractor(false);

        let first = ingest_bytes(b"%PDF a".to_vec(), "a.pdf", &cache, ex.clone(), &config)
            .await
            .unwrap();
        let second = ingest_bytes(b"%PDF a".to_vec(), "renamed.pdf", &cache, ex.clone(), &config)
            .await
            .unwrap();

        assert!(!first.from_cache);
        assert!(second.from_cache);
        assert_eq!(second.document.file_name, "renamed.pdf");
        assert_eq!(second.document.fingerprint, first.document.fingerprint);
        assert_eq!(ex.calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.lookup(&first.document.fingerprint).await.unwrap().file_name, "a.pdf");
    }

    #[tokio::test]
    async fn force_reprocess_extracts_again() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DocumentCache::open(dir.path()).unwrap();
        let ex = extractor(false);

        ingest_bytes(b"%PDF b".to_vec(), "b.pdf", &cache, ex.clone(), &DatasetConfig::default())
            .await
            .unwrap();
        let forced = DatasetConfig::builder().force_reprocess(true).build().unwrap();
        let again = ingest_bytes(b"%PDF b".to_vec(), "b.pdf", &cache, ex.clone(), &forced)
            .await
            .unwrap();

        assert!(!again.from_cache);
        assert_eq!(ex.calls.load(Ordering::SeqCst), 2);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn all_pages_failed_is_not_cached() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DocumentCache::open(dir.path()).unwrap();
        let err = ingest_bytes(
            b"%PDF scanned".to_vec(),
            "scan.pdf",
            &cache,
            extractor(true),
            &DatasetConfig::default(),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, Pdf2QaError::NoPagesExtracted { pages: 1, .. }));
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn ingest_all_keeps_order_and_isolates_failures() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DocumentCache::open(dir.path()).unwrap();
        let files = tempfile::tempdir().unwrap();
        let a = files.path().join("a.pdf");
        let b = files.path().join("b.pdf");
        std::fs::write(&a, b"%PDF-1.4 a").unwrap();
        std::fs::write(&b, b"%PDF-1.4 b").unwrap();

        let inputs = vec![
            a.display().to_string(),
            files.path().join("missing.pdf").display().to_string(),
            b.display().to_string(),
        ];
        let results = ingest_all(&inputs, &cache, extractor(false), &DatasetConfig::default()).await;

        assert_eq!(results.len(), 3);
        assert_eq!(results[0].as_ref().unwrap().document.file_name, "a.pdf");
        assert!(matches!(results[1], Err(Pdf2QaError::FileNotFound { .. })));
        assert_eq!(results[2].as_ref().unwrap().document.file_name, "b.pdf");
    }
}
