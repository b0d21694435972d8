//! Configuration types for dataset generation.
//!
//! All behaviour (cache location, OCR policy, dispatch limits, provider
//! choice) is controlled through [`DatasetConfig`], built via its
//! [`DatasetConfigBuilder`].

use crate::error::Pdf2QaError;
use crate::progress::ProgressCallback;
use edgequake_llm::LLMProvider;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Default cache directory, relative to the working directory.
pub const DEFAULT_CACHE_DIR: &str = "document_cache";

/// Configuration for ingestion, dispatch and export.
///
/// Built via [`DatasetConfig::builder()`] or using
/// [`DatasetConfig::default()`].
///
/// # Example
/// ```rust
/// use edgequake_pdf2qa::{DatasetConfig, OcrMode};
///
/// let config = DatasetConfig::builder()
///     .cache_dir("/tmp/pdf2qa-cache")
///     .ocr_mode(OcrMode::Auto)
///     .ocr_min_text_chars(20)
///     .concurrency(8)
///     .max_retries(4)
///     .build()
///     .unwrap();
/// assert_eq!(config.concurrency, 8);
/// ```
#[derive(Clone)]
pub struct DatasetConfig {
    // ── Cache ────────────────────────────────────────────────────────────
    /// Directory holding `cache_index.json` and one text blob per document.
    /// Default: `document_cache`.
    pub cache_dir: PathBuf,

    /// Skip the cache lookup and extract again. Default: false.
    ///
    /// The caller gets the fresh extraction. The cache stays
    /// first-writer-wins: an existing entry is left as it is.
    pub force_reprocess: bool,

    // ── Extraction ───────────────────────────────────────────────────────
    /// When to fall back to optical recognition. Default: [`OcrMode::Auto`].
    pub ocr_mode: OcrMode,

    /// Density threshold for [`OcrMode::Auto`]. Default: 1.
    ///
    /// A page whose native text has fewer non-whitespace characters than
    /// this is treated as scanned and sent to OCR. The default of 1 means
    /// "only pages with no native text at all". Raise it (e.g. to 50) for
    /// scans that carry a stray page number or watermark in the text layer.
    pub ocr_min_text_chars: usize,

    /// Tesseract language code(s), e.g. `eng` or `eng+fra`. Default: `eng`.
    pub ocr_language: String,

    /// Tesseract executable. Default: `tesseract` (looked up on `PATH`).
    pub tesseract_cmd: String,

    /// Maximum rendered image dimension in pixels for OCR. Default: 2000.
    ///
    /// Caps either dimension, scaling the other proportionally, so a poster
    /// sized page never exhausts memory during rasterisation.
    pub max_rendered_pixels: u32,

    /// PDF user password for encrypted documents.
    pub password: Option<String>,

    /// Documents extracted in parallel during ingestion. Default: 2.
    ///
    /// Extraction is CPU-bound (pdfium + tesseract) and runs on the blocking
    /// pool, so this is kept small.
    pub extract_concurrency: usize,

    // ── Dispatch ─────────────────────────────────────────────────────────
    /// Maximum provider calls in flight at once. Default: 10.
    ///
    /// If you hit rate-limit errors (`429`), lower this.
    pub concurrency: usize,

    /// Maximum retry attempts on a transient provider failure. Default: 3.
    ///
    /// Permanent errors (bad API key, 400) are never retried.
    pub max_retries: u32,

    /// Initial retry delay in milliseconds. Default: 500.
    ///
    /// Doubles after each attempt: 500 ms → 1 s → 2 s, capped at
    /// [`Self::max_backoff_ms`].
    pub retry_backoff_ms: u64,

    /// Upper bound for a single backoff sleep, including one requested by a
    /// provider's retry-after. Default: 30 000.
    pub max_backoff_ms: u64,

    /// Per-call timeout in seconds. Default: 120.
    ///
    /// Whole documents go into the prompt, so calls are slower than a
    /// typical chat turn.
    pub api_timeout_secs: u64,

    /// LLM model identifier, e.g. "gpt-4.1-nano", "gemma2:2b".
    /// If None, uses the provider default.
    pub model: Option<String>,

    /// LLM provider name (e.g. "openai", "anthropic", "ollama").
    /// If None along with `provider`, the provider is auto-detected.
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Sampling temperature. Default: 0.1.
    pub temperature: f32,

    /// Maximum tokens generated per answer. Default: 1024.
    pub max_tokens: usize,

    /// Custom system prompt. If None, uses the built-in default.
    pub system_prompt: Option<String>,

    /// Collapse each answer into a single paragraph. Default: false.
    ///
    /// Off by default so answers are exported exactly as returned; CSV
    /// quoting already preserves embedded line breaks.
    pub flatten_answers: bool,

    // ── Input ────────────────────────────────────────────────────────────
    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// Batch progress events. Default: None.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            cache_dir: PathBuf::from(DEFAULT_CACHE_DIR),
            force_reprocess: false,
            ocr_mode: OcrMode::default(),
            ocr_min_text_chars: 1,
            ocr_language: "eng".to_string(),
            tesseract_cmd: "tesseract".to_string(),
            max_rendered_pixels: 2000,
            password: None,
            extract_concurrency: 2,
            concurrency: 10,
            max_retries: 3,
            retry_backoff_ms: 500,
            max_backoff_ms: 30_000,
            api_timeout_secs: 120,
            model: None,
            provider_name: None,
            provider: None,
            temperature: 0.1,
            max_tokens: 1024,
            system_prompt: None,
            flatten_answers: false,
            download_timeout_secs: 120,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for DatasetConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatasetConfig")
            .field("cache_dir", &self.cache_dir)
            .field("force_reprocess", &self.force_reprocess)
            .field("ocr_mode", &self.ocr_mode)
            .field("ocr_min_text_chars", &self.ocr_min_text_chars)
            .field("ocr_language", &self.ocr_language)
            .field("max_rendered_pixels", &self.max_rendered_pixels)
            .field("extract_concurrency", &self.extract_concurrency)
            .field("concurrency", &self.concurrency)
            .field("max_retries", &self.max_retries)
            .field("retry_backoff_ms", &self.retry_backoff_ms)
            .field("max_backoff_ms", &self.max_backoff_ms)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("flatten_answers", &self.flatten_answers)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<callback>"),
            )
            .finish()
    }
}

impl DatasetConfig {
    /// Create a new builder for `DatasetConfig`.
    pub fn builder() -> DatasetConfigBuilder {
        DatasetConfigBuilder {
            config: Self::default(),
        }
    }

    /// Backoff before retry number `attempt` (1-based).
    pub fn backoff_for_attempt(&self, attempt: u32) -> u64 {
        let factor = 2u64.saturating_pow(attempt.saturating_sub(1));
        self.retry_backoff_ms
            .saturating_mul(factor)
            .min(self.max_backoff_ms)
    }
}

/// Builder for [`DatasetConfig`].
#[derive(Debug)]
pub struct DatasetConfigBuilder {
    config: DatasetConfig,
}

impl DatasetConfigBuilder {
    pub fn cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.cache_dir = dir.into();
        self
    }

    pub fn force_reprocess(mut self, v: bool) -> Self {
        self.config.force_reprocess = v;
        self
    }

    pub fn ocr_mode(mut self, mode: OcrMode) -> Self {
        self.config.ocr_mode = mode;
        self
    }

    pub fn ocr_min_text_chars(mut self, n: usize) -> Self {
        self.config.ocr_min_text_chars = n;
        self
    }

    pub fn ocr_language(mut self, lang: impl Into<String>) -> Self {
        self.config.ocr_language = lang.into();
        self
    }

    pub fn tesseract_cmd(mut self, cmd: impl Into<String>) -> Self {
        self.config.tesseract_cmd = cmd.into();
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(100);
        self
    }

    pub fn password(mut self, pwd: impl Into<String>) -> Self {
        self.config.password = Some(pwd.into());
        self
    }

    pub fn extract_concurrency(mut self, n: usize) -> Self {
        self.config.extract_concurrency = n;
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn max_backoff_ms(mut self, ms: u64) -> Self {
        self.config.max_backoff_ms = ms;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = Some(prompt.into());
        self
    }

    pub fn flatten_answers(mut self, v: bool) -> Self {
        self.config.flatten_answers = v;
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<DatasetConfig, Pdf2QaError> {
        let c = &self.config;
        if c.concurrency == 0 {
            return Err(Pdf2QaError::InvalidConfig(
                "Concurrency must be ≥ 1".into(),
            ));
        }
        if c.extract_concurrency == 0 {
            return Err(Pdf2QaError::InvalidConfig(
                "Extraction concurrency must be ≥ 1".into(),
            ));
        }
        if c.max_backoff_ms < c.retry_backoff_ms {
            return Err(Pdf2QaError::InvalidConfig(format!(
                "max_backoff_ms ({}) must be ≥ retry_backoff_ms ({})",
                c.max_backoff_ms, c.retry_backoff_ms
            )));
        }
        if c.cache_dir.as_os_str().is_empty() {
            return Err(Pdf2QaError::InvalidConfig(
                "cache_dir must not be empty".into(),
            ));
        }
        if c.ocr_language.trim().is_empty() {
            return Err(Pdf2QaError::InvalidConfig(
                "ocr_language must not be empty".into(),
            ));
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// When pages are sent to optical recognition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OcrMode {
    /// Never OCR; scanned pages yield empty text.
    Off,
    /// OCR pages whose native text falls below the density threshold. (default)
    #[default]
    Auto,
    /// OCR every page regardless of its text layer.
    Force,
}
