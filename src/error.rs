//! Error types for the edgequake-pdf2qa library.
//!
//! Three error types reflect three distinct failure modes:
//!
//! * [`Pdf2QaError`] — **Fatal**: the operation cannot proceed at all (bad
//!   input file, corrupt cache index, export destination not writable).
//!   Returned as `Err(Pdf2QaError)` from the top-level functions.
//!
//! * [`PageError`] — **Non-fatal**: a single page failed to extract (pdfium
//!   glitch, OCR engine missing) but the rest of the document is fine. Stored
//!   per page inside [`crate::output::PageRecord`].
//!
//! * [`ProviderError`] — **Per item**: one LLM call failed. Classified as
//!   transient (retried) or permanent (recorded immediately). Never escapes the
//!   dispatcher; it ends up as the `error` column of a [`crate::QAResult`].

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the edgequake-pdf2qa library.
///
/// Page-level and item-level failures use [`PageError`] and
/// [`ProviderError`] and are reported inline in the data model instead.
#[derive(Debug, Error)]
pub enum Pdf2QaError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("PDF file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The input string is not a valid file path or URL.
    #[error("Invalid input '{input}': not a file path or a valid HTTP/HTTPS URL")]
    InvalidInput { input: String },

    /// Only `.pdf` documents are accepted.
    #[error("Unsupported file format '{extension}' for '{path}' (supported: .pdf)")]
    UnsupportedFormat { path: PathBuf, extension: String },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'\nIncrease --download-timeout.")]
    DownloadTimeout { url: String, secs: u64 },

    /// The bytes were read, but they are not a PDF.
    #[error("'{name}' is not a valid PDF\nFirst bytes: {magic:?}")]
    NotAPdf { name: String, magic: [u8; 4] },

    // ── PDF errors ────────────────────────────────────────────────────────
    /// PDF header/trailer/xref is corrupt and cannot be parsed.
    #[error("PDF '{name}' is corrupt: {detail}\nTry repairing with: qpdf --decrypt input.pdf output.pdf")]
    CorruptPdf { name: String, detail: String },

    /// PDF requires a password but none was provided.
    #[error("PDF '{name}' is encrypted and requires a password.\nProvide it with --password <PASSWORD>.")]
    PasswordRequired { name: String },

    /// A password was provided but it is wrong.
    #[error("Wrong password for PDF '{name}'")]
    WrongPassword { name: String },

    /// Every page of the document failed to extract; nothing worth caching.
    #[error("No page of '{name}' could be extracted ({pages} pages).\nFirst error: {first_error}")]
    NoPagesExtracted {
        name: String,
        pages: usize,
        first_error: String,
    },

    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
Set PDFIUM_LIB_PATH=/path/to/libpdfium, or install pdfium on the system\n\
library path (LD_LIBRARY_PATH / DYLD_LIBRARY_PATH).\n"
    )]
    PdfiumBindingFailed(String),

    // ── Cache errors ──────────────────────────────────────────────────────
    /// The cache index exists but cannot be read or parsed.
    ///
    /// The cache refuses to start rather than overwrite the file with an
    /// empty index. Move or delete the file to start from scratch.
    #[error("Cache index '{path}' is corrupt: {detail}\nMove it aside (or delete the cache directory) to start a fresh cache.")]
    CacheCorrupt { path: PathBuf, detail: String },

    /// Reading or writing the cache directory failed.
    #[error("Cache I/O error on '{path}': {source}")]
    CacheIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── LLM errors ────────────────────────────────────────────────────────
    /// The configured provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    // ── Output errors ─────────────────────────────────────────────────────
    /// Could not create or write the exported dataset file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// An exported dataset file could not be parsed back.
    #[error("Failed to read dataset file '{path}': {detail}")]
    DatasetReadFailed { path: PathBuf, detail: String },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal error for a single page.
///
/// Stored alongside [`crate::output::PageRecord`] when a page fails. The
/// page is kept with whatever text could be recovered (possibly none) and
/// extraction continues with the next page.
#[derive(Debug, Clone, PartialEq, Eq, Error, serde::Serialize, serde::Deserialize)]
pub enum PageError {
    /// The native text layer could not be read.
    #[error("Page {page}: native text extraction failed: {detail}")]
    NativeTextFailed { page: usize, detail: String },

    /// Page rasterisation failed, so OCR could not run.
    #[error("Page {page}: rasterisation failed: {detail}")]
    RenderFailed { page: usize, detail: String },

    /// The OCR engine ran but failed.
    #[error("Page {page}: OCR failed: {detail}")]
    OcrFailed { page: usize, detail: String },

    /// The OCR engine could not be started at all.
    #[error("Page {page}: OCR engine unavailable: {detail}")]
    OcrUnavailable { page: usize, detail: String },
}

impl PageError {
    /// 1-based page number the error refers to.
    pub fn page(&self) -> usize {
        match self {
            PageError::NativeTextFailed { page, .. }
            | PageError::RenderFailed { page, .. }
            | PageError::OcrFailed { page, .. }
            | PageError::OcrUnavailable { page, .. } => *page,
        }
    }
}

/// A failed call to the LLM provider.
///
/// The variant decides whether the dispatcher retries: see
/// [`ProviderError::is_transient`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    /// HTTP 429 or an explicit rate-limit message.
    #[error("Rate limit exceeded for provider '{provider}'")]
    RateLimited {
        provider: String,
        retry_after_secs: Option<u64>,
    },

    /// The call did not complete within the per-call timeout.
    #[error("API call timed out after {secs}s")]
    Timeout { secs: u64 },

    /// Network blip, 5xx, overloaded backend, unknown failure.
    #[error("Transient provider error: {0}")]
    Transient(String),

    /// Authentication error (401/403); never retried.
    #[error("Authentication error from provider '{provider}': {detail}")]
    Auth { provider: String, detail: String },

    /// The request itself is invalid (400, context too long, content filter).
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl ProviderError {
    /// Whether the call may succeed if simply retried later.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ProviderError::RateLimited { .. }
                | ProviderError::Timeout { .. }
                | ProviderError::Transient(_)
        )
    }

    /// Server-requested delay before the next attempt, if any.
    pub fn retry_after_secs(&self) -> Option<u64> {
        match self {
            ProviderError::RateLimited {
                retry_after_secs, ..
            } => *retry_after_secs,
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_corrupt_display_mentions_path() {
        let e = Pdf2QaError::CacheCorrupt {
            path: PathBuf::from("/tmp/cache/cache_index.json"),
            detail: "expected value at line 1".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("cache_index.json"), "got: {msg}");
        assert!(msg.contains("expected value"), "got: {msg}");
    }

    #[test]
    fn transient_classification() {
        assert!(ProviderError::Timeout { secs: 5 }.is_transient());
        assert!(ProviderError::Transient("503".into()).is_transient());
        assert!(ProviderError::RateLimited {
            provider: "openai".into(),
            retry_after_secs: Some(3),
        }
        .is_transient());
        assert!(!ProviderError::InvalidRequest("bad".into()).is_transient());
        assert!(!ProviderError::Auth {
            provider: "anthropic".into(),
            detail: "invalid key".into(),
        }
        .is_transient());
    }

    #[test]
    fn retry_after_only_for_rate_limits() {
        let e = ProviderError::RateLimited {
            provider: "gemini".into(),
            retry_after_secs: Some(60),
        };
        assert_eq!(e.retry_after_secs(), Some(60));
        assert_eq!(ProviderError::Timeout { secs: 1 }.retry_after_secs(), None);
    }

    #[test]
    fn page_error_reports_page() {
        let e = PageError::OcrUnavailable {
            page: 4,
            detail: "tesseract not found".into(),
        };
        assert_eq!(e.page(), 4);
        assert!(e.to_string().contains("Page 4"));
    }

    #[test]
    fn auth_error_display() {
        let e = ProviderError::Auth {
            provider: "anthropic".into(),
            detail: "invalid key".into(),
        };
        assert!(e.to_string().contains("anthropic"));
        assert!(e.to_string().contains("invalid key"));
    }
}
