//! Dataset export: one CSV row per [`QAResult`], in canonical order.
//!
//! Every field is quoted, so answers containing commas, quotes or line
//! breaks round-trip exactly through [`export`] and [`read_results`].
//! The file is written to a temp file next to the destination and renamed
//! into place, so a failed export never leaves a truncated dataset behind.

use crate::error::Pdf2QaError;
use crate::output::{BatchRun, QAResult};
use chrono::Local;
use csv::{QuoteStyle, ReaderBuilder, WriterBuilder};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::info;

/// Column order of the exported file.
pub const COLUMNS: [&str; 8] = [
    "document_name",
    "question_number",
    "question",
    "answer",
    "model",
    "provider",
    "status",
    "error",
];

/// Directory used by [`default_output_path`] when no destination is given.
pub const DEFAULT_OUTPUT_DIR: &str = "outputs";

/// `<dir>/qa_results_<YYYYmmdd_HHMMSS>.csv`, local time.
pub fn default_output_path(dir: impl AsRef<Path>) -> PathBuf {
    let stamp = Local::now().format("%Y%m%d_%H%M%S");
    dir.as_ref().join(format!("qa_results_{}.csv", stamp))
}

/// Write `run` to `destination` as CSV and return the path written.
///
/// Parent directories are created. An empty run produces a header-only
/// file. Any I/O failure is returned as [`Pdf2QaError::OutputWriteFailed`].
pub fn export(run: &BatchRun, destination: impl AsRef<Path>) -> Result<PathBuf, Pdf2QaError> {
    let path = destination.as_ref().to_path_buf();
    let fail = |source: std::io::Error| Pdf2QaError::OutputWriteFailed {
        path: path.clone(),
        source,
    };

    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&parent).map_err(fail)?;

    let mut tmp = NamedTempFile::new_in(&parent).map_err(fail)?;
    {
        let mut writer = WriterBuilder::new()
            .quote_style(QuoteStyle::Always)
            .has_headers(false)
            .from_writer(&mut tmp);

        writer
            .write_record(COLUMNS)
            .map_err(|e| fail(std::io::Error::other(e)))?;
        for result in &run.results {
            writer
                .serialize(result)
                .map_err(|e| fail(std::io::Error::other(e)))?;
        }
        writer.flush().map_err(fail)?;
    }
    tmp.flush().map_err(fail)?;
    tmp.as_file().sync_all().map_err(fail)?;
    tmp.persist(&path).map_err(|e| fail(e.error))?;

    info!("Exported {} rows to {}", run.results.len(), path.display());
    Ok(path)
}

/// Parse an exported file back into results.
pub fn read_results(path: impl AsRef<Path>) -> Result<Vec<QAResult>, Pdf2QaError> {
    let path = path.as_ref();
    let fail = |detail: String| Pdf2QaError::DatasetReadFailed {
        path: path.to_path_buf(),
        detail,
    };

    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .from_path(path)
        .map_err(|e| fail(e.to_string()))?;

    let headers = reader.headers().map_err(|e| fail(e.to_string()))?;
    if headers.iter().ne(COLUMNS.iter().copied()) {
        return Err(fail(format!(
            "unexpected columns: {}",
            headers.iter().collect::<Vec<_>>().join(",")
        )));
    }

    reader
        .deserialize::<QAResult>()
        .map(|row| row.map_err(|e| fail(e.to_string())))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::Question;

    fn run_of(results: Vec<QAResult>) -> BatchRun {
        BatchRun {
            total_items: results.len(),
            results,
            cancelled: false,
            duration_ms: 1,
        }
    }

    #[test]
    fn empty_run_writes_header_only() {
        let dir = tempfile::tempdir().unwrap();
        let path = export(&BatchRun::default(), dir.path().join("empty.csv")).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(
            content.trim_end(),
            "\"document_name\",\"question_number\",\"question\",\"answer\",\"model\",\"provider\",\"status\",\"error\""
        );
        assert!(read_results(&path).unwrap().is_empty());
    }

    #[test]
    fn success_row_has_empty_error_column() {
        let dir = tempfile::tempdir().unwrap();
        let q = Question::new(1, "What grew?");
        let run = run_of(vec![QAResult::success("a.pdf", &q, "Revenue", "m", "p")]);
        let path = export(&run, dir.path().join("one.csv")).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        let row = content.lines().nth(1).unwrap();
        assert_eq!(
            row,
            "\"a.pdf\",\"1\",\"What grew?\",\"Revenue\",\"m\",\"p\",\"success\",\"\""
        );
    }

    #[test]
    fn tricky_answer_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let q = Question::new(2, "Who signed, and when?");
        let answer = "J. Doe, CEO; said \"approved\"\non line two\r\nand three";
        let run = run_of(vec![
            QAResult::success("report, final.pdf", &q, answer, "gpt-4.1-nano", "openai"),
            QAResult::failure("b.pdf", &q, "Rate limit exceeded for provider 'openai'", "gpt-4.1-nano", "openai"),
        ]);
        let path = export(&run, dir.path().join("nested/out.csv")).unwrap();
        let back = read_results(&path).unwrap();
        assert_eq!(back, run.results);
        assert_eq!(back[0].answer, answer);
    }

    #[test]
    fn unwritable_destination_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, "not a directory").unwrap();
        let err = export(&BatchRun::default(), blocker.join("out.csv")).unwrap_err();
        assert!(matches!(err, Pdf2QaError::OutputWriteFailed { .. }));
    }

    #[test]
    fn foreign_csv_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("other.csv");
        std::fs::write(&path, "a,b\n1,2\n").unwrap();
        assert!(matches!(
            read_results(&path),
            Err(Pdf2QaError::DatasetReadFailed { .. })
        ));
    }

    #[test]
    fn default_path_shape() {
        let p = default_output_path(DEFAULT_OUTPUT_DIR);
        let name = p.file_name().unwrap().to_string_lossy().into_owned();
        assert!(p.starts_with("outputs"));
        assert!(name.starts_with("qa_results_") && name.ends_with(".csv"));
        assert_eq!(name.len(), "qa_results_20240101_120000.csv".len());
    }
}
