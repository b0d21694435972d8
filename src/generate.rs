//! Top-level orchestration: inputs + questions → exported dataset.

use crate::cache::DocumentCache;
use crate::config::DatasetConfig;
use crate::dispatch::BatchDispatcher;
use crate::error::Pdf2QaError;
use crate::export::{default_output_path, export, DEFAULT_OUTPUT_DIR};
use crate::ingest::ingest_all;
use crate::output::{BatchRun, IngestedDocument, Question};
use crate::pipeline::extract::DocumentExtractor;
use crate::pipeline::render::PdfExtractor;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Everything a dataset run produced.
#[derive(Debug)]
pub struct DatasetOutput {
    /// Documents that made it into the batch, in input order.
    pub documents: Vec<IngestedDocument>,
    /// Inputs that could not be ingested, with the reason.
    pub skipped: Vec<(String, Pdf2QaError)>,
    pub run: BatchRun,
    /// Path of the exported CSV.
    pub path: PathBuf,
}

/// Ingest `inputs`, answer `questions` about each, and export the results.
///
/// `destination` defaults to `outputs/qa_results_<timestamp>.csv`.
///
/// # Example
/// ```rust,no_run
/// use edgequake_pdf2qa::{generate, parse_questions, DatasetConfig};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let config = DatasetConfig::builder().concurrency(8).build()?;
/// let questions = parse_questions("What is the revenue growth?\nWho signed?");
/// let inputs = vec!["report.pdf".to_string()];
/// let out = generate(&inputs, &questions, None, &config).await?;
/// println!("{} rows → {}", out.run.len(), out.path.display());
/// # Ok(())
/// # }
/// ```
pub async fn generate(
    inputs: &[String],
    questions: &[Question],
    destination: Option<&Path>,
    config: &DatasetConfig,
) -> Result<DatasetOutput, Pdf2QaError> {
    generate_with_cancel(inputs, questions, destination, config, CancellationToken::new()).await
}

/// [`generate`] with cancellation. A cancelled run still exports the rows
/// completed so far.
pub async fn generate_with_cancel(
    inputs: &[String],
    questions: &[Question],
    destination: Option<&Path>,
    config: &DatasetConfig,
    cancel: CancellationToken,
) -> Result<DatasetOutput, Pdf2QaError> {
    DatasetPipeline::from_config(config)?
        .run(inputs, questions, destination, cancel)
        .await
}

/// The assembled engine: cache, extractor and dispatcher.
///
/// Build it with [`DatasetPipeline::from_config`] for production engines,
/// or [`DatasetPipeline::new`] to plug in custom ones.
pub struct DatasetPipeline {
    cache: Arc<DocumentCache>,
    extractor: Arc<dyn DocumentExtractor>,
    dispatcher: BatchDispatcher,
    config: DatasetConfig,
}

impl DatasetPipeline {
    pub fn new(
        cache: Arc<DocumentCache>,
        extractor: Arc<dyn DocumentExtractor>,
        dispatcher: BatchDispatcher,
        config: DatasetConfig,
    ) -> Self {
        Self {
            cache,
            extractor,
            dispatcher,
            config,
        }
    }

    /// Resolve the provider first so a missing API key fails before any
    /// extraction work, then open the cache.
    pub fn from_config(config: &DatasetConfig) -> Result<Self, Pdf2QaError> {
        let dispatcher = BatchDispatcher::from_config(config.clone())?;
        let cache = Arc::new(DocumentCache::open(&config.cache_dir)?);
        let extractor = Arc::new(PdfExtractor::from_config(config));
        Ok(Self::new(cache, extractor, dispatcher, config.clone()))
    }

    pub fn cache(&self) -> &DocumentCache {
        &self.cache
    }

    pub fn dispatcher(&self) -> &BatchDispatcher {
        &self.dispatcher
    }

    /// Ingest `inputs`, splitting successes from skipped inputs.
    pub async fn ingest(
        &self,
        inputs: &[String],
    ) -> (Vec<IngestedDocument>, Vec<(String, Pdf2QaError)>) {
        let ingested = ingest_all(inputs, &self.cache, Arc::clone(&self.extractor), &self.config).await;

        let mut documents = Vec::with_capacity(ingested.len());
        let mut skipped = Vec::new();
        for (input, result) in inputs.iter().zip(ingested) {
            match result {
                Ok(doc) => documents.push(doc),
                Err(e) => skipped.push((input.clone(), e)),
            }
        }
        let cached_hits = documents.iter().filter(|d| d.from_cache).count();
        info!(
            "Ingested {} documents ({} from cache, {} skipped)",
            documents.len(),
            cached_hits,
            skipped.len()
        );
        (documents, skipped)
    }

    /// Ingest, dispatch and export.
    pub async fn run(
        &self,
        inputs: &[String],
        questions: &[Question],
        destination: Option<&Path>,
        cancel: CancellationToken,
    ) -> Result<DatasetOutput, Pdf2QaError> {
        let (documents, skipped) = self.ingest(inputs).await;
        if documents.is_empty() && !inputs.is_empty() {
            warn!("No document could be ingested; exporting an empty dataset");
        }

        let docs: Vec<_> = documents.iter().map(|d| d.document.clone()).collect();
        let run = self.dispatcher.run_with_cancel(&docs, questions, cancel).await;

        let path = match destination {
            Some(p) => p.to_path_buf(),
            None => default_output_path(DEFAULT_OUTPUT_DIR),
        };
        let path = export(&run, path)?;

        Ok(DatasetOutput {
            documents,
            skipped,
            run,
            path,
        })
    }
}

/// Synchronous wrapper around [`generate`].
///
/// Creates a temporary tokio runtime internally.
pub fn generate_sync(
    inputs: &[String],
    questions: &[Question],
    destination: Option<&Path>,
    config: &DatasetConfig,
) -> Result<DatasetOutput, Pdf2QaError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| Pdf2QaError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(generate(inputs, questions, destination, config))
}
