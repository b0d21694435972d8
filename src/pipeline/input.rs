//! Input resolution: normalise a user-supplied path or URL to PDF bytes.
//!
//! Documents are identified by their content fingerprint, so the whole file
//! is needed in memory anyway; pdfium then opens it straight from the byte
//! slice. We validate the PDF magic bytes (`%PDF`) before returning so
//! callers get a meaningful error rather than a pdfium crash.

use crate::error::Pdf2QaError;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// A resolved input document.
#[derive(Debug, Clone)]
pub struct ResolvedInput {
    pub bytes: Vec<u8>,
    /// Display name: the file name of the path, or the last URL segment.
    pub file_name: String,
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// `true` for paths with a `.pdf` extension (any case).
pub fn is_supported(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("pdf"))
}

/// Resolve the input string to the bytes of a PDF.
///
/// If the input is a URL, download it. If the input is a local file,
/// validate it exists, is readable and looks like a PDF.
pub async fn resolve_input(input: &str, timeout_secs: u64) -> Result<ResolvedInput, Pdf2QaError> {
    if input.trim().is_empty() {
        return Err(Pdf2QaError::InvalidInput {
            input: input.to_string(),
        });
    }
    if is_url(input) {
        download_url(input, timeout_secs).await
    } else {
        resolve_local(input).await
    }
}

/// Read a local file, validating existence, extension and PDF magic bytes.
async fn resolve_local(path_str: &str) -> Result<ResolvedInput, Pdf2QaError> {
    let path = PathBuf::from(path_str);

    if !path.exists() {
        return Err(Pdf2QaError::FileNotFound { path });
    }
    if !is_supported(&path) {
        let extension = path
            .extension()
            .map(|e| e.to_string_lossy().into_owned())
            .unwrap_or_default();
        return Err(Pdf2QaError::UnsupportedFormat { path, extension });
    }

    let bytes = match tokio::fs::read(&path).await {
        Ok(b) => b,
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(Pdf2QaError::PermissionDenied { path });
        }
        Err(_) => return Err(Pdf2QaError::FileNotFound { path }),
    };

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path_str.to_string());

    check_magic(&bytes, &file_name)?;

    debug!("Resolved local PDF: {} ({} bytes)", path.display(), bytes.len());
    Ok(ResolvedInput { bytes, file_name })
}

/// Download a URL into memory.
async fn download_url(url: &str, timeout_secs: u64) -> Result<ResolvedInput, Pdf2QaError> {
    info!("Downloading PDF from: {}", url);

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| Pdf2QaError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            Pdf2QaError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            Pdf2QaError::DownloadFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    })?;

    if !response.status().is_success() {
        return Err(Pdf2QaError::DownloadFailed {
            url: url.to_string(),
            reason: format!("HTTP {}", response.status()),
        });
    }

    let file_name = filename_from_url(url);

    let bytes = response
        .bytes()
        .await
        .map_err(|e| Pdf2QaError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?
        .to_vec();

    check_magic(&bytes, &file_name)?;

    info!("Downloaded '{}' ({} bytes)", file_name, bytes.len());
    Ok(ResolvedInput { bytes, file_name })
}

fn check_magic(bytes: &[u8], name: &str) -> Result<(), Pdf2QaError> {
    if bytes.len() >= 4 && &bytes[..4] != b"%PDF" {
        let mut magic = [0u8; 4];
        magic.copy_from_slice(&bytes[..4]);
        return Err(Pdf2QaError::NotAPdf {
            name: name.to_string(),
            magic,
        });
    }
    if bytes.len() < 4 {
        return Err(Pdf2QaError::CorruptPdf {
            name: name.to_string(),
            detail: format!("file is only {} bytes", bytes.len()),
        });
    }
    Ok(())
}

/// Extract a reasonable filename from the URL path.
fn filename_from_url(url: &str) -> String {
    if let Ok(parsed) = reqwest::Url::parse(url) {
        if let Some(mut segments) = parsed.path_segments() {
            if let Some(last) = segments.next_back() {
                if !last.is_empty() && last.contains('.') {
                    return last.to_string();
                }
            }
        }
    }

    "downloaded.pdf".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_url() {
        assert!(is_url("https://example.com/doc.pdf"));
        assert!(is_url("http://example.com/doc.pdf"));
        assert!(!is_url("/tmp/doc.pdf"));
        assert!(!is_url("doc.pdf"));
        assert!(!is_url(""));
    }

    #[test]
    fn test_is_supported() {
        assert!(is_supported(Path::new("report.pdf")));
        assert!(is_supported(Path::new("SCAN.PDF")));
        assert!(!is_supported(Path::new("notes.txt")));
        assert!(!is_supported(Path::new("no_extension")));
    }

    #[test]
    fn test_filename_from_url() {
        assert_eq!(
            filename_from_url("https://example.com/files/annual-report.pdf"),
            "annual-report.pdf"
        );
        assert_eq!(filename_from_url("https://example.com/"), "downloaded.pdf");
    }

    #[tokio::test]
    async fn missing_file() {
        let err = resolve_input("/definitely/not/here.pdf", 5).await.unwrap_err();
        assert!(matches!(err, Pdf2QaError::FileNotFound { .. }));
    }

    #[tokio::test]
    async fn wrong_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, b"%PDF-1.7").unwrap();
        let err = resolve_input(path.to_str().unwrap(), 5).await.unwrap_err();
        assert!(matches!(err, Pdf2QaError::UnsupportedFormat { .. }));
    }

    #[tokio::test]
    async fn bad_magic() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fake.pdf");
        std::fs::write(&path, b"PK\x03\x04zip").unwrap();
        let err = resolve_input(path.to_str().unwrap(), 5).await.unwrap_err();
        assert!(matches!(err, Pdf2QaError::NotAPdf { magic, .. } if &magic == b"PK\x03\x04"));
    }

    #[tokio::test]
    async fn local_pdf_bytes_and_name() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.pdf");
        std::fs::write(&path, b"%PDF-1.4\n%%EOF").unwrap();
        let resolved = resolve_input(path.to_str().unwrap(), 5).await.unwrap();
        assert_eq!(resolved.file_name, "a.pdf");
        assert!(resolved.bytes.starts_with(b"%PDF"));
    }
}
