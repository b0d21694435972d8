//! # edgequake-pdf2qa
//!
//! Turn a corpus of PDF documents into a question/answer dataset using LLMs.
//!
//! ## Why this crate?
//!
//! Asking the same handful of questions about hundreds of reports, papers or
//! contracts is a batch job: extract each document once, fan the
//! (document, question) pairs out to a model, and collect one row per pair
//! in a spreadsheet-friendly file. This crate does exactly that, and keeps
//! going when individual pages, documents or provider calls fail.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDFs ──────────────────────────────────────────────────────────────────
//!  │
//!  ├─ 1. Input        resolve local file or download from URL
//!  ├─ 2. Fingerprint  SHA-256 of the raw bytes (the cache key)
//!  ├─ 3. Cache        hit → reuse text; miss → extract
//!  ├─ 4. Extract      native text per page, tesseract OCR for scanned pages
//!  ├─ 5. Dispatch     documents × questions, bounded concurrency, retries
//!  └─ 6. Export       one CSV row per pair, canonical order
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_pdf2qa::{generate, parse_questions, DatasetConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider auto-detected from OPENAI_API_KEY / ANTHROPIC_API_KEY / GEMINI_API_KEY
//!     let config = DatasetConfig::default();
//!     let questions = parse_questions("What is the revenue growth?\nWho signed?");
//!     let inputs = vec!["q3-report.pdf".to_string(), "contract.pdf".to_string()];
//!     let out = generate(&inputs, &questions, None, &config).await?;
//!     let summary = out.run.summary();
//!     eprintln!("{} ok / {} failed → {}", summary.success, summary.error, out.path.display());
//!     Ok(())
//! }
//! ```
//!
//! ## Runtime requirements
//!
//! * a pdfium shared library (`PDFIUM_LIB_PATH` or the system library path)
//! * `tesseract` on `PATH` for scanned pages (optional: without it scanned
//!   pages are recorded as failed and the rest of the document is used)
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `pdf2qa` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library to avoid pulling in CLI-only deps:
//! ```toml
//! edgequake-pdf2qa = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod cache;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod export;
pub mod fingerprint;
pub mod generate;
pub mod ingest;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod questions;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use cache::DocumentCache;
pub use config::{DatasetConfig, DatasetConfigBuilder, OcrMode};
pub use dispatch::BatchDispatcher;
pub use error::{PageError, Pdf2QaError, ProviderError};
pub use export::{default_output_path, export, read_results};
pub use fingerprint::{fingerprint, fingerprint_file, DocumentFingerprint};
pub use generate::{generate, generate_sync, generate_with_cancel, DatasetOutput, DatasetPipeline};
pub use ingest::{ingest, ingest_all, ingest_bytes};
pub use output::{
    BatchRun, BatchSummary, CacheStats, CachedDocument, ExtractedDocument, IngestedDocument,
    PageRecord, QAResult, Question, ResultStatus, WorkItem,
};
pub use pipeline::extract::{DocumentExtractor, OcrEngine, PageExtractor, PageSource};
pub use pipeline::llm::{Answerer, LlmAnswerer};
pub use progress::{BatchProgressCallback, NoopProgressCallback, ProgressCallback};
pub use questions::{parse_questions, QuestionTemplate};
