//! Data model: cached documents, questions, work items and results.

use crate::error::PageError;
use crate::fingerprint::DocumentFingerprint;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

// ── Documents ────────────────────────────────────────────────────────────

/// Outcome of extracting one page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRecord {
    /// 1-based page number.
    pub page_num: usize,
    /// Text produced for the page (native or OCR); empty when the page failed.
    pub text: String,
    /// `true` when the text came from optical recognition.
    pub used_ocr: bool,
    /// Set when extraction of this page failed.
    pub error: Option<PageError>,
}

/// A freshly extracted document, before it is cached.
#[derive(Debug, Clone)]
pub struct ExtractedDocument {
    pub file_name: String,
    pub pages: Vec<PageRecord>,
}

impl ExtractedDocument {
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// 1-based numbers of the pages whose text came from OCR.
    pub fn ocr_pages(&self) -> BTreeSet<usize> {
        self.pages
            .iter()
            .filter(|p| p.used_ocr)
            .map(|p| p.page_num)
            .collect()
    }

    /// 1-based numbers of the pages that failed.
    pub fn failed_pages(&self) -> BTreeSet<usize> {
        self.pages
            .iter()
            .filter(|p| p.error.is_some())
            .map(|p| p.page_num)
            .collect()
    }
}

/// A document as held by the cache.
///
/// Immutable once written. `merged_text` is shared read-only between
/// dispatcher tasks, hence the `Arc<str>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedDocument {
    pub fingerprint: DocumentFingerprint,
    pub file_name: String,
    pub merged_text: Arc<str>,
    pub page_count: usize,
    /// 1-based page numbers that went through OCR.
    pub pages_using_ocr: BTreeSet<usize>,
    /// 1-based page numbers whose extraction failed.
    pub failed_pages: BTreeSet<usize>,
    pub word_count: usize,
    pub char_count: usize,
    pub created_at: DateTime<Utc>,
}

impl CachedDocument {
    /// A copy of this document presented under another file name.
    ///
    /// Used when identical bytes are uploaded under a new name: the cache
    /// entry keeps its original name, the caller sees the one it uploaded.
    pub fn with_file_name(&self, file_name: impl Into<String>) -> Self {
        Self {
            file_name: file_name.into(),
            ..self.clone()
        }
    }

    pub fn ocr_page_count(&self) -> usize {
        self.pages_using_ocr.len()
    }
}

/// Result of ingesting one input.
#[derive(Debug, Clone)]
pub struct IngestedDocument {
    pub document: CachedDocument,
    /// `true` when the text came from the cache and no extraction ran.
    pub from_cache: bool,
}

/// Read-only cache diagnostics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub entry_count: usize,
    pub total_text_bytes: u64,
    pub ocr_page_count: usize,
    pub failed_page_count: usize,
    pub cache_dir: String,
}

impl CacheStats {
    pub fn total_text_mb(&self) -> f64 {
        self.total_text_bytes as f64 / (1024.0 * 1024.0)
    }
}

// ── Questions and work items ─────────────────────────────────────────────

/// One question of a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    /// 1-based, stable across a batch run.
    pub ordinal: usize,
    pub text: String,
}

impl Question {
    pub fn new(ordinal: usize, text: impl Into<String>) -> Self {
        Self {
            ordinal,
            text: text.into(),
        }
    }

    /// Number a list of question texts 1, 2, 3, …
    pub fn numbered<I, S>(texts: I) -> Vec<Question>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        texts
            .into_iter()
            .enumerate()
            .map(|(i, t)| Question::new(i + 1, t))
            .collect()
    }
}

/// One (document, question) pair: the unit of dispatch.
///
/// Indices point into the deduplicated document list and the question list
/// of the batch, so a work item is cheap to copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WorkItem {
    pub document_index: usize,
    pub question_index: usize,
}

// ── Results ──────────────────────────────────────────────────────────────

/// Whether a work item produced an answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultStatus {
    Success,
    Error,
}

impl fmt::Display for ResultStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResultStatus::Success => f.write_str("success"),
            ResultStatus::Error => f.write_str("error"),
        }
    }
}

/// One row of the dataset. Exactly one per work item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QAResult {
    pub document_name: String,
    pub question_number: usize,
    pub question: String,
    /// Empty when `status` is `Error`.
    pub answer: String,
    pub model: String,
    pub provider: String,
    pub status: ResultStatus,
    /// Present iff `status` is `Error`.
    pub error: Option<String>,
}

impl QAResult {
    pub fn success(
        document_name: impl Into<String>,
        question: &Question,
        answer: impl Into<String>,
        model: impl Into<String>,
        provider: impl Into<String>,
    ) -> Self {
        Self {
            document_name: document_name.into(),
            question_number: question.ordinal,
            question: question.text.clone(),
            answer: answer.into(),
            model: model.into(),
            provider: provider.into(),
            status: ResultStatus::Success,
            error: None,
        }
    }

    pub fn failure(
        document_name: impl Into<String>,
        question: &Question,
        error: impl Into<String>,
        model: impl Into<String>,
        provider: impl Into<String>,
    ) -> Self {
        Self {
            document_name: document_name.into(),
            question_number: question.ordinal,
            question: question.text.clone(),
            answer: String::new(),
            model: model.into(),
            provider: provider.into(),
            status: ResultStatus::Error,
            error: Some(error.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ResultStatus::Success
    }
}

/// Canonically ordered results of one batch.
///
/// Order is (document insertion order, question number ascending), never
/// completion order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchRun {
    pub results: Vec<QAResult>,
    /// Number of work items in the full cross product.
    pub total_items: usize,
    /// `true` when the run was cancelled before every item completed.
    pub cancelled: bool,
    pub duration_ms: u64,
}

impl BatchRun {
    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Work items that never completed (only non-zero after cancellation).
    pub fn pending(&self) -> usize {
        self.total_items.saturating_sub(self.results.len())
    }

    pub fn summary(&self) -> BatchSummary {
        let success = self.results.iter().filter(|r| r.is_success()).count();
        BatchSummary {
            total: self.results.len(),
            success,
            error: self.results.len() - success,
            pending: self.pending(),
        }
    }
}

/// Counts shown after a batch run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub total: usize,
    pub success: usize,
    pub error: usize,
    pub pending: usize,
}
