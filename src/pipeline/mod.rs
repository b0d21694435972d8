//! Pipeline stages for document ingestion and question answering.
//!
//! Each submodule implements exactly one step. External engines (pdfium,
//! tesseract, the LLM provider) sit behind narrow traits so each stage is
//! testable with stubs and the concrete engine can be swapped.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ render ──▶ extract ──▶ postprocess        (ingestion)
//! (URL/path) (pdfium)  (native|ocr)  (page cleanup)
//!
//! llm ──▶ postprocess                                  (dispatch)
//! (ask)   (answer cleanup)
//! ```
//!
//! 1. [`input`]   — canonicalise the user-supplied path or URL to raw bytes
//! 2. [`render`]  — open a PDF with pdfium; native text and rasterisation per page
//! 3. [`extract`] — per-page decision between native text and OCR; page merging
//! 4. [`ocr`]     — run tesseract on a rasterised page
//! 5. [`llm`]     — the provider boundary: ask one question about one document,
//!    with error classification; the only stage with provider network I/O
//! 6. [`postprocess`] — deterministic cleanup of page text and answers

pub mod extract;
pub mod input;
pub mod llm;
pub mod ocr;
pub mod postprocess;
pub mod render;
