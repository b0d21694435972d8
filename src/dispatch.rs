//! Batch dispatch: answer every question about every document.
//!
//! The batch is the cross product of the (deduplicated) documents and the
//! questions. Each (document, question) pair is one work item and produces
//! exactly one [`QAResult`], success or error; no item can abort the batch.
//! Different documents that share a file name are reported under distinct
//! names (see [`unique_names`]), so (document_name, question_number) is a
//! key of the exported dataset.
//!
//! ## Concurrency
//!
//! Items flow through `buffer_unordered(concurrency)`, so at most
//! `concurrency` provider calls (including their retry sleeps) are in
//! flight at any moment. Each item owns one slot in a pre-sized result
//! vector indexed by its canonical position, which gives the canonical
//! (document order, question number) ordering for free no matter in which
//! order items complete.
//!
//! ## Cancellation
//!
//! [`BatchDispatcher::run_with_cancel`] stops at the token: in-flight calls
//! are dropped, completed results are kept and the run is marked
//! `cancelled`. A cancelled run exports like any other.

use crate::config::DatasetConfig;
use crate::error::Pdf2QaError;
use crate::output::{BatchRun, CachedDocument, QAResult, Question, WorkItem};
use crate::pipeline::llm::{ask_with_retry, Answerer, LlmAnswerer};
use crate::pipeline::postprocess::{clean_answer, flatten_answer};
use crate::progress::{NoopProgressCallback, ProgressCallback};
use futures::stream::{self, StreamExt};
use std::collections::HashSet;
use std::pin::pin;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Runs batches of questions against an [`Answerer`].
pub struct BatchDispatcher {
    answerer: Arc<dyn Answerer>,
    config: DatasetConfig,
}

impl BatchDispatcher {
    pub fn new(answerer: Arc<dyn Answerer>, config: DatasetConfig) -> Self {
        Self { answerer, config }
    }

    /// Dispatcher backed by the provider resolved from `config`.
    pub fn from_config(config: DatasetConfig) -> Result<Self, Pdf2QaError> {
        let answerer = LlmAnswerer::from_config(&config)?;
        Ok(Self::new(Arc::new(answerer), config))
    }

    pub fn answerer(&self) -> &dyn Answerer {
        self.answerer.as_ref()
    }

    /// Model written to result rows: the configured one, else the
    /// answerer's default.
    pub fn model(&self) -> String {
        self.config
            .model
            .clone()
            .unwrap_or_else(|| self.answerer.default_model().to_string())
    }

    /// Run the whole batch to completion.
    pub async fn run(&self, documents: &[CachedDocument], questions: &[Question]) -> BatchRun {
        self.run_with_cancel(documents, questions, CancellationToken::new())
            .await
    }

    /// Run the batch until it completes or `cancel` fires.
    pub async fn run_with_cancel(
        &self,
        documents: &[CachedDocument],
        questions: &[Question],
        cancel: CancellationToken,
    ) -> BatchRun {
        let start = Instant::now();
        let docs = dedup_documents(documents);
        let names = unique_names(&docs);
        let items = work_items(docs.len(), questions.len());
        let total = items.len();

        let callback: ProgressCallback = self
            .config
            .progress_callback
            .clone()
            .unwrap_or_else(|| Arc::new(NoopProgressCallback));

        if total == 0 {
            debug!("Empty batch: {} documents × {} questions", docs.len(), questions.len());
            callback.on_batch_start(0);
            callback.on_batch_complete(0, 0);
            return BatchRun::default();
        }

        let model = self.model();
        info!(
            "Dispatching {} items ({} documents × {} questions) to {}/{}, concurrency {}",
            total,
            docs.len(),
            questions.len(),
            self.answerer.provider(),
            model,
            self.config.concurrency
        );
        callback.on_batch_start(total);

        let mut slots: Vec<Option<QAResult>> = vec![None; total];
        let n_questions = questions.len();

        let completions = stream::iter(items)
            .map(|item| {
                let doc = docs[item.document_index];
                let name = names[item.document_index].as_str();
                let question = &questions[item.question_index];
                let slot = item.document_index * n_questions + item.question_index;
                let callback = &callback;
                let model = model.as_str();
                async move { (slot, self.process(doc, name, question, model, callback).await) }
            })
            .buffer_unordered(self.config.concurrency.max(1))
            .take_until(cancel.cancelled());
        let mut completions = pin!(completions);

        while let Some((slot, result)) = completions.next().await {
            slots[slot] = Some(result);
        }

        let results: Vec<QAResult> = slots.into_iter().flatten().collect();
        let cancelled = results.len() < total;
        let run = BatchRun {
            results,
            total_items: total,
            cancelled,
            duration_ms: start.elapsed().as_millis() as u64,
        };

        let summary = run.summary();
        callback.on_batch_complete(summary.total, summary.success);
        if cancelled {
            warn!(
                "Batch cancelled: {}/{} items completed ({} success, {} error)",
                summary.total, total, summary.success, summary.error
            );
        } else {
            info!(
                "Batch complete in {}ms: {} success, {} error",
                run.duration_ms, summary.success, summary.error
            );
        }
        run
    }

    /// Answer one work item. Never fails: errors become error rows.
    async fn process(
        &self,
        doc: &CachedDocument,
        name: &str,
        question: &Question,
        model: &str,
        callback: &ProgressCallback,
    ) -> QAResult {
        let provider = self.answerer.provider();
        callback.on_item_start(name, question.ordinal);

        let outcome = ask_with_retry(
            self.answerer.as_ref(),
            &doc.merged_text,
            &question.text,
            model,
            &self.config,
            |attempt, err| callback.on_item_retry(name, question.ordinal, attempt, &err.to_string()),
        )
        .await;

        let answer = outcome.map(|raw| {
            let cleaned = clean_answer(&raw);
            if self.config.flatten_answers {
                flatten_answer(&cleaned)
            } else {
                cleaned
            }
        });

        match answer {
            Ok(answer) if !answer.is_empty() => {
                debug!("{} Q{}: {} bytes", name, question.ordinal, answer.len());
                callback.on_item_complete(name, question.ordinal, answer.len());
                QAResult::success(name, question, answer, model, provider)
            }
            Ok(_) => {
                let msg = "Model returned an empty answer";
                warn!("{} Q{}: {}", name, question.ordinal, msg);
                callback.on_item_error(name, question.ordinal, msg);
                QAResult::failure(name, question, msg, model, provider)
            }
            Err(e) => {
                let msg = e.to_string();
                warn!("{} Q{}: {}", name, question.ordinal, msg);
                callback.on_item_error(name, question.ordinal, &msg);
                QAResult::failure(name, question, msg, model, provider)
            }
        }
    }
}

/// Keep the first occurrence of each fingerprint, in input order.
pub fn dedup_documents(documents: &[CachedDocument]) -> Vec<&CachedDocument> {
    let mut seen = HashSet::new();
    documents
        .iter()
        .filter(|d| {
            let fresh = seen.insert(d.fingerprint);
            if !fresh {
                debug!("Dropping duplicate document '{}'", d.file_name);
            }
            fresh
        })
        .collect()
}

/// Row names for `documents`, one per document, all distinct.
///
/// The first document keeps its file name. A later, different document with
/// the same name becomes `stem (2).ext`, `stem (3).ext`, … so that
/// (document_name, question_number) stays unique in the export.
pub fn unique_names(documents: &[&CachedDocument]) -> Vec<String> {
    let mut used: HashSet<String> = HashSet::new();
    documents
        .iter()
        .map(|d| {
            let name = if used.contains(&d.file_name) {
                let (stem, ext) = split_extension(&d.file_name);
                let renamed = (2..)
                    .map(|k| format!("{stem} ({k}){ext}"))
                    .find(|candidate| !used.contains(candidate))
                    .unwrap_or_else(|| format!("{}#{}", d.file_name, d.fingerprint.short()));
                debug!(
                    "Name '{}' already used by another document; reporting {} as '{}'",
                    d.file_name,
                    d.fingerprint.short(),
                    renamed
                );
                renamed
            } else {
                d.file_name.clone()
            };
            used.insert(name.clone());
            name
        })
        .collect()
}

/// `("report", ".pdf")` for `"report.pdf"`; no extension for dotfiles.
fn split_extension(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(i) if i > 0 => name.split_at(i),
        _ => (name, ""),
    }
}

/// The cross product in canonical order.
pub fn work_items(n_documents: usize, n_questions: usize) -> Vec<WorkItem> {
    (0..n_documents)
        .flat_map(|d| {
            (0..n_questions).map(move |q| WorkItem {
                document_index: d,
                question_index: q,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::fingerprint;
    use chrono::Utc;

    fn cached(name: &str, bytes: &[u8]) -> CachedDocument {
        CachedDocument {
            fingerprint: fingerprint(bytes),
            file_name: name.to_string(),
            merged_text: Arc::from("[[page 1]]\ntext"),
            page_count: 1,
            pages_using_ocr: Default::default(),
            failed_pages: Default::default(),
            word_count: 1,
            char_count: 4,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn work_items_are_canonical() {
        let items = work_items(2, 3);
        assert_eq!(items.len(), 6);
        assert_eq!(items[0], WorkItem { document_index: 0, question_index: 0 });
        assert_eq!(items[3], WorkItem { document_index: 1, question_index: 0 });
        assert_eq!(items[5], WorkItem { document_index: 1, question_index: 2 });
        assert!(work_items(0, 3).is_empty());
        assert!(work_items(3, 0).is_empty());
    }

    #[test]
    fn distinct_documents_sharing_a_name_are_renamed() {
        let docs = vec![
            cached("report.pdf", b"Q1"),
            cached("report.pdf", b"Q2"),
            cached("report (2).pdf", b"Q3"),
            cached("README", b"Q4"),
            cached("README", b"Q5"),
        ];
        let refs: Vec<_> = docs.iter().collect();
        assert_eq!(
            unique_names(&refs),
            vec![
                "report.pdf",
                "report (2).pdf",
                "report (2) (2).pdf",
                "README",
                "README (2)"
            ]
        );
    }

    #[test]
    fn duplicates_collapse_to_first() {
        let docs = vec![
            cached("a.pdf", b"A"),
            cached("b.pdf", b"B"),
            cached("a-copy.pdf", b"A"),
        ];
        let unique = dedup_documents(&docs);
        let names: Vec<_> = unique.iter().map(|d| d.file_name.as_str()).collect();
        assert_eq!(names, vec!["a.pdf", "b.pdf"]);
    }
}
