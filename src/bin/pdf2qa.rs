//! CLI binary for edgequake-pdf2qa.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `DatasetConfig` and prints results.

use anyhow::{bail, Context, Result};
use clap::Parser;
use edgequake_pdf2qa::pipeline::ocr::TesseractOcr;
use edgequake_pdf2qa::{
    parse_questions, read_results, BatchProgressCallback, DatasetConfig, DatasetPipeline,
    DocumentCache, OcrMode, ProgressCallback, Question, QuestionTemplate, ResultStatus,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: one bar for the whole batch plus a log line
/// per item. Items complete out of order, so start times are keyed by
/// (document, question number).
struct CliProgressCallback {
    bar: ProgressBar,
    start_times: Mutex<HashMap<(String, usize), Instant>>,
    errors: AtomicUsize,
}

impl CliProgressCallback {
    /// Spinner until `on_batch_start` tells us the item count.
    fn new_dynamic() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);

        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Extracting documents…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            start_times: Mutex::new(HashMap::new()),
            errors: AtomicUsize::new(0),
        })
    }

    fn activate_bar(&self, total: usize) {
        let progress_style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>4}/{len} answers  \
             ⏱ {elapsed_precise}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.set_length(total as u64);
        self.bar.set_style(progress_style);
        self.bar.set_prefix("Asking");
        self.bar.reset_eta();
    }

    fn elapsed(&self, document: &str, question_number: usize) -> f64 {
        self.start_times
            .lock()
            .ok()
            .and_then(|mut m| m.remove(&(document.to_string(), question_number)))
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }
}

impl BatchProgressCallback for CliProgressCallback {
    fn on_batch_start(&self, total_items: usize) {
        self.activate_bar(total_items);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Answering {total_items} document/question pairs…"))
        ));
    }

    fn on_item_start(&self, document: &str, question_number: usize) {
        if let Ok(mut m) = self.start_times.lock() {
            m.insert((document.to_string(), question_number), Instant::now());
        }
        self.bar.set_message(format!("{document} Q{question_number}"));
    }

    fn on_item_retry(&self, document: &str, question_number: usize, attempt: u32, error: &str) {
        self.bar.println(format!(
            "  {} {document} Q{question_number}  retry {attempt}  {}",
            cyan("↻"),
            dim(&truncate(error, 70)),
        ));
    }

    fn on_item_complete(&self, document: &str, question_number: usize, answer_len: usize) {
        let secs = self.elapsed(document, question_number);
        self.bar.println(format!(
            "  {} {:<32} Q{:<3} {:<8}  {}",
            green("✓"),
            truncate(document, 32),
            question_number,
            dim(&format!("{answer_len:>5} chars")),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_item_error(&self, document: &str, question_number: usize, error: &str) {
        let secs = self.elapsed(document, question_number);
        self.errors.fetch_add(1, Ordering::SeqCst);
        self.bar.println(format!(
            "  {} {:<32} Q{:<3} {}  {}",
            red("✗"),
            truncate(document, 32),
            question_number,
            red(&truncate(error, 80)),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_batch_complete(&self, completed: usize, success_count: usize) {
        self.bar.finish_and_clear();
        let failed = completed.saturating_sub(success_count);
        if failed == 0 {
            eprintln!(
                "{} {} answers generated successfully",
                green("✔"),
                bold(&success_count.to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} answers generated  ({} failed)",
                if failed == completed { red("✘") } else { cyan("⚠") },
                bold(&success_count.to_string()),
                completed,
                red(&failed.to_string()),
            );
        }
    }
}

/// Shorten `s` to at most `max` characters, ending with an ellipsis.
fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let head: String = s.chars().take(max.saturating_sub(1)).collect();
        format!("{head}\u{2026}")
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Two questions over every PDF in a folder
  pdf2qa reports/*.pdf -q "What is the revenue growth?" -q "Who signed?"

  # Questions from a file (one per line), explicit output path
  pdf2qa papers/*.pdf --questions-file questions.txt -o dataset.csv

  # Built-in question set
  pdf2qa paper.pdf --template research

  # Use a specific model
  pdf2qa --provider ollama --model gemma2:2b report.pdf --template summary

  # Documents from URLs
  pdf2qa https://arxiv.org/pdf/1706.03762 -q "What architecture is proposed?"

  # Cache maintenance
  pdf2qa --cache-stats
  pdf2qa --clear-cache

  # Re-read an exported dataset and print its summary
  pdf2qa --summarize outputs/qa_results_20250101_120000.csv

TEMPLATES:
  research     objective, methodology, findings, conclusions, limitations
  summary      summary, main points, audience, recommendations
  extraction   dates, figures, people/organisations, locations

OUTPUT:
  CSV, every field quoted, columns:
  document_name,question_number,question,answer,model,provider,status,error
  Default path: outputs/qa_results_<YYYYmmdd_HHMMSS>.csv
  Ctrl-C stops the batch; answers collected so far are still exported.

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY          OpenAI API key
  ANTHROPIC_API_KEY       Anthropic API key
  GEMINI_API_KEY          Google Gemini API key
  EDGEQUAKE_LLM_PROVIDER  Override provider (openai, anthropic, gemini, ollama)
  EDGEQUAKE_MODEL         Override model ID
  PDFIUM_LIB_PATH         Path to libpdfium (file or directory)

SETUP:
  1. Install pdfium (or set PDFIUM_LIB_PATH) and, for scanned PDFs, tesseract.
  2. Set API key:     export OPENAI_API_KEY=sk-...
  3. Run:             pdf2qa document.pdf -q "What is this document about?"
"#;

/// Build a question/answer dataset from PDF documents using LLMs.
#[derive(Parser, Debug)]
#[command(
    name = "pdf2qa",
    version,
    about = "Build a question/answer CSV dataset from PDF documents using LLMs",
    long_about = "Extract the text of PDF documents (local files or URLs, with OCR for scanned \
pages), ask every question about every document through an LLM provider, and export one CSV \
row per document/question pair. Supports OpenAI, Anthropic, Google Gemini, Azure OpenAI, and \
any OpenAI-compatible endpoint (Ollama, vLLM, LiteLLM, etc.).",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local PDF file paths or HTTP/HTTPS URLs.
    inputs: Vec<String>,

    /// A question to ask about every document (repeatable).
    #[arg(short = 'q', long = "question")]
    questions: Vec<String>,

    /// File with one question per line.
    #[arg(long, env = "PDF2QA_QUESTIONS_FILE")]
    questions_file: Option<PathBuf>,

    /// Built-in question set: research, summary, extraction.
    #[arg(long, env = "PDF2QA_TEMPLATE", value_enum)]
    template: Option<TemplateArg>,

    /// Write the CSV here instead of outputs/qa_results_<timestamp>.csv.
    #[arg(short, long, env = "PDF2QA_OUTPUT")]
    output: Option<PathBuf>,

    /// Directory of the extracted-text cache.
    #[arg(long, env = "PDF2QA_CACHE_DIR", default_value = "document_cache")]
    cache_dir: PathBuf,

    /// Extract documents again even when cached.
    #[arg(long, env = "PDF2QA_FORCE_REPROCESS")]
    force_reprocess: bool,

    /// LLM model ID (e.g. gpt-4.1-nano, claude-sonnet-4-20250514, gemma2:2b).
    #[arg(long, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// LLM provider: openai, anthropic, gemini, ollama, azure.
    #[arg(
        long,
        env = "EDGEQUAKE_PROVIDER",
        long_help = "LLM provider. Auto-detected from API key env vars if not set.\n\
          Supported: openai, anthropic, gemini, azure, ollama, or any OpenAI-compatible URL."
    )]
    provider: Option<String>,

    /// Number of concurrent LLM calls.
    #[arg(short, long, env = "PDF2QA_CONCURRENCY", default_value_t = 10)]
    concurrency: usize,

    /// Number of documents extracted in parallel.
    #[arg(long, env = "PDF2QA_EXTRACT_CONCURRENCY", default_value_t = 2)]
    extract_concurrency: usize,

    /// Retries per question on transient LLM failures.
    #[arg(long, env = "PDF2QA_MAX_RETRIES", default_value_t = 3)]
    max_retries: u32,

    /// Base retry backoff in milliseconds (doubles on each retry).
    #[arg(long, env = "PDF2QA_RETRY_BACKOFF_MS", default_value_t = 500)]
    retry_backoff_ms: u64,

    /// Per-call LLM timeout in seconds.
    #[arg(long, env = "PDF2QA_API_TIMEOUT", default_value_t = 120)]
    api_timeout: u64,

    /// Max LLM output tokens per answer.
    #[arg(long, env = "PDF2QA_MAX_TOKENS", default_value_t = 1024)]
    max_tokens: usize,

    /// LLM temperature (0.0–2.0).
    #[arg(long, env = "PDF2QA_TEMPERATURE", default_value_t = 0.1)]
    temperature: f32,

    /// Path to a text file containing a custom system prompt.
    #[arg(long, env = "PDF2QA_SYSTEM_PROMPT")]
    system_prompt: Option<PathBuf>,

    /// Collapse every answer into a single paragraph.
    #[arg(long, env = "PDF2QA_FLATTEN_ANSWERS")]
    flatten_answers: bool,

    /// When to OCR pages: off, auto, force.
    #[arg(long, env = "PDF2QA_OCR", value_enum, default_value = "auto")]
    ocr: OcrArg,

    /// In auto mode, OCR pages with fewer native non-whitespace characters.
    #[arg(long, env = "PDF2QA_OCR_MIN_CHARS", default_value_t = 1)]
    ocr_min_chars: usize,

    /// Tesseract language(s), e.g. eng or eng+fra.
    #[arg(long, env = "PDF2QA_OCR_LANG", default_value = "eng")]
    ocr_lang: String,

    /// Tesseract executable.
    #[arg(long, env = "PDF2QA_TESSERACT", default_value = "tesseract")]
    tesseract: String,

    /// PDF user password for encrypted documents.
    #[arg(long, env = "PDF2QA_PASSWORD")]
    password: Option<String>,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "PDF2QA_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// Print cache statistics and exit.
    #[arg(long)]
    cache_stats: bool,

    /// Delete every cached document and exit.
    #[arg(long)]
    clear_cache: bool,

    /// Print the summary of an exported CSV and exit.
    #[arg(long, value_name = "CSV")]
    summarize: Option<PathBuf>,

    /// Disable progress bar.
    #[arg(long, env = "PDF2QA_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "PDF2QA_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(long, env = "PDF2QA_QUIET")]
    quiet: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum TemplateArg {
    Research,
    Summary,
    Extraction,
}

impl From<TemplateArg> for QuestionTemplate {
    fn from(v: TemplateArg) -> Self {
        match v {
            TemplateArg::Research => QuestionTemplate::Research,
            TemplateArg::Summary => QuestionTemplate::Summary,
            TemplateArg::Extraction => QuestionTemplate::Extraction,
        }
    }
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum OcrArg {
    Off,
    Auto,
    Force,
}

impl From<OcrArg> for OcrMode {
    fn from(v: OcrArg) -> Self {
        match v {
            OcrArg::Off => OcrMode::Off,
            OcrArg::Auto => OcrMode::Auto,
            OcrArg::Force => OcrMode::Force,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // Suppress INFO-level library logs when the progress bar is active;
    // the bar provides all the feedback that matters to the user.
    let show_progress = !cli.quiet && !cli.no_progress;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Maintenance modes ────────────────────────────────────────────────
    if let Some(ref path) = cli.summarize {
        return summarize(path);
    }

    if cli.cache_stats || cli.clear_cache {
        let cache = DocumentCache::open(&cli.cache_dir).context("Failed to open cache")?;
        if cli.clear_cache {
            let removed = cache.clear().await.context("Failed to clear cache")?;
            eprintln!("{} removed {} cached documents", green("✔"), removed);
        }
        if cli.cache_stats {
            let stats = cache.stats();
            println!("Cache dir:    {}", stats.cache_dir);
            println!("Documents:    {}", stats.entry_count);
            println!("Text size:    {:.2} MB", stats.total_text_mb());
            println!("OCR pages:    {}", stats.ocr_page_count);
            println!("Failed pages: {}", stats.failed_page_count);
        }
        return Ok(());
    }

    // ── Questions and inputs ─────────────────────────────────────────────
    let questions = collect_questions(&cli).await?;
    if cli.inputs.is_empty() {
        bail!("No input documents given");
    }
    if questions.is_empty() {
        bail!("No questions given: use --question, --questions-file or --template");
    }

    // ── Build config ─────────────────────────────────────────────────────
    let progress_cb: Option<ProgressCallback> = if show_progress {
        let cb = CliProgressCallback::new_dynamic();
        Some(cb as Arc<dyn BatchProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli, progress_cb).await?;
    if config.ocr_mode != OcrMode::Off && !TesseractOcr::from_config(&config).is_available() {
        eprintln!(
            "{} '{}' not found; scanned pages will be recorded as failed (--ocr off to silence)",
            cyan("⚠"),
            config.tesseract_cmd
        );
    }

    // ── Ctrl-C → cancel, keep partial results ────────────────────────────
    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("\n{} interrupted, exporting collected answers…", cyan("⚠"));
                cancel.cancel();
            }
        });
    }

    // ── Run ──────────────────────────────────────────────────────────────
    let pipeline = DatasetPipeline::from_config(&config).context("Failed to set up pipeline")?;
    let out = pipeline
        .run(&cli.inputs, &questions, cli.output.as_deref(), cancel)
        .await
        .context("Dataset generation failed")?;

    if !cli.quiet {
        for (input, err) in &out.skipped {
            eprintln!("{} skipped {}: {}", red("✗"), input, err);
        }
        let cached = out.documents.iter().filter(|d| d.from_cache).count();
        let summary = out.run.summary();
        eprintln!(
            "{}  {} documents ({} cached)  ×  {} questions  →  {} ok / {} failed{}  {}ms",
            if summary.error == 0 && !out.run.cancelled {
                green("✔")
            } else {
                cyan("⚠")
            },
            out.documents.len(),
            cached,
            questions.len(),
            summary.success,
            summary.error,
            if out.run.cancelled {
                format!(" / {} not run", summary.pending)
            } else {
                String::new()
            },
            out.run.duration_ms,
        );
        eprintln!("   {}", bold(&out.path.display().to_string()));
    }

    Ok(())
}

/// Gather questions from `--question`, `--questions-file` and `--template`,
/// in that order, numbered 1..n.
async fn collect_questions(cli: &Cli) -> Result<Vec<Question>> {
    let mut texts: Vec<String> = cli.questions.clone();

    if let Some(ref path) = cli.questions_file {
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read questions from {:?}", path))?;
        texts.extend(parse_questions(&content).into_iter().map(|q| q.text));
    }

    if let Some(t) = cli.template {
        let template: QuestionTemplate = t.into();
        texts.extend(template.texts().iter().map(|s| s.to_string()));
    }

    Ok(parse_questions(&texts.join("\n")))
}

/// Map CLI args to `DatasetConfig`.
async fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<DatasetConfig> {
    let system_prompt = if let Some(ref path) = cli.system_prompt {
        Some(
            tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read system prompt from {:?}", path))?,
        )
    } else {
        None
    };

    let mut builder = DatasetConfig::builder()
        .cache_dir(&cli.cache_dir)
        .force_reprocess(cli.force_reprocess)
        .ocr_mode(cli.ocr.into())
        .ocr_min_text_chars(cli.ocr_min_chars)
        .ocr_language(&cli.ocr_lang)
        .tesseract_cmd(&cli.tesseract)
        .extract_concurrency(cli.extract_concurrency)
        .concurrency(cli.concurrency)
        .max_retries(cli.max_retries)
        .retry_backoff_ms(cli.retry_backoff_ms)
        .api_timeout_secs(cli.api_timeout)
        .temperature(cli.temperature)
        .max_tokens(cli.max_tokens)
        .flatten_answers(cli.flatten_answers)
        .download_timeout_secs(cli.download_timeout);

    if let Some(ref model) = cli.model {
        builder = builder.model(model);
    }
    if let Some(ref provider) = cli.provider {
        builder = builder.provider_name(provider);
    }
    if let Some(ref pwd) = cli.password {
        builder = builder.password(pwd);
    }
    if let Some(prompt) = system_prompt {
        builder = builder.system_prompt(prompt);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

/// `--summarize`: re-read an exported dataset and print its counts.
fn summarize(path: &Path) -> Result<()> {
    let rows = read_results(path).with_context(|| format!("Failed to read {:?}", path))?;
    let success = rows.iter().filter(|r| r.status == ResultStatus::Success).count();
    let mut documents: Vec<&str> = rows.iter().map(|r| r.document_name.as_str()).collect();
    documents.sort_unstable();
    documents.dedup();

    println!("File:         {}", path.display());
    println!("Rows:         {}", rows.len());
    println!("Documents:    {}", documents.len());
    println!("Success:      {}", success);
    println!("Errors:       {}", rows.len() - success);
    if let Some(first) = rows.first() {
        println!("Model:        {} ({})", first.model, first.provider);
    }
    Ok(())
}
