//! Per-page text extraction: native text layer first, OCR when the page is
//! effectively scanned.
//!
//! The engines are reached through two narrow traits so they can be stubbed:
//!
//! * [`PageSource`] — one opened document: page count, native text, and a
//!   rasterised image per page (pdfium in production, see
//!   [`crate::pipeline::render`]).
//! * [`OcrEngine`] — image → text (tesseract in production, see
//!   [`crate::pipeline::ocr`]).
//!
//! A failure on one page never aborts the document: the page is recorded
//! with whatever text survived and a [`PageError`], and the loop moves on.
//!
//! Everything here is blocking; callers run it inside `spawn_blocking`.

use crate::config::{DatasetConfig, OcrMode};
use crate::error::{PageError, Pdf2QaError};
use crate::output::{ExtractedDocument, PageRecord};
use crate::pipeline::postprocess::{clean_page_text, non_whitespace_char_count};
use image::DynamicImage;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, info, warn};

/// An opened document whose pages can be read one at a time.
///
/// Page indices are 0-based.
pub trait PageSource {
    fn page_count(&self) -> usize;

    /// Text of the page's native text layer (may be empty).
    fn native_text(&self, index: usize) -> Result<String, PageError>;

    /// The page rendered to an image, for OCR.
    fn rasterize(&self, index: usize) -> Result<DynamicImage, PageError>;
}

/// An optical-recognition engine.
pub trait OcrEngine: Send + Sync {
    /// Recognise the text of a rendered page. `page_num` is 1-based and only
    /// used for error reporting.
    fn recognize(&self, page_num: usize, image: &DynamicImage) -> Result<String, PageError>;
}

/// Turns the raw bytes of one document into per-page records.
///
/// Blocking. Page-level failures are reported inside the returned document;
/// `Err` is reserved for documents that cannot be opened at all.
pub trait DocumentExtractor: Send + Sync {
    fn extract(&self, bytes: &[u8], file_name: &str) -> Result<ExtractedDocument, Pdf2QaError>;
}

/// OCR decision policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OcrPolicy {
    pub mode: OcrMode,
    /// Pages with fewer non-whitespace characters than this are OCR'd in
    /// [`OcrMode::Auto`].
    pub min_text_chars: usize,
}

impl OcrPolicy {
    pub fn from_config(config: &DatasetConfig) -> Self {
        Self {
            mode: config.ocr_mode,
            min_text_chars: config.ocr_min_text_chars,
        }
    }

    /// Whether a page with this native text should go to OCR.
    pub fn needs_ocr(&self, native_text: &str) -> bool {
        match self.mode {
            OcrMode::Off => false,
            OcrMode::Force => true,
            OcrMode::Auto => non_whitespace_char_count(native_text) < self.min_text_chars,
        }
    }
}

impl Default for OcrPolicy {
    fn default() -> Self {
        Self {
            mode: OcrMode::Auto,
            min_text_chars: 1,
        }
    }
}

/// Produces the text of single pages, choosing between the native text layer
/// and OCR.
pub struct PageExtractor<'a> {
    ocr: &'a dyn OcrEngine,
    policy: OcrPolicy,
}

impl<'a> PageExtractor<'a> {
    pub fn new(ocr: &'a dyn OcrEngine, policy: OcrPolicy) -> Self {
        Self { ocr, policy }
    }

    /// Extract page `index` (0-based) of `source`.
    ///
    /// Always returns a record; failures are carried in `record.error`.
    pub fn extract(&self, source: &dyn PageSource, index: usize) -> PageRecord {
        let page_num = index + 1;

        let (native, native_err) = match source.native_text(index) {
            Ok(text) => (clean_page_text(&text), None),
            Err(e) => {
                warn!("{}", e);
                (String::new(), Some(e))
            }
        };

        if !self.policy.needs_ocr(&native) {
            debug!(
                "Page {}: native text ({} chars)",
                page_num,
                native.chars().count()
            );
            return PageRecord {
                page_num,
                text: native,
                used_ocr: false,
                error: native_err,
            };
        }

        debug!("Page {}: little or no native text, running OCR", page_num);
        let recognized = source
            .rasterize(index)
            .and_then(|image| self.ocr.recognize(page_num, &image));

        match recognized {
            Ok(text) => PageRecord {
                page_num,
                text: clean_page_text(&text),
                used_ocr: true,
                error: None,
            },
            Err(e) => {
                // A sparse text layer is not a usable page. When the text
                // layer itself failed, that error is the one recorded.
                warn!("{}", e);
                PageRecord {
                    page_num,
                    text: String::new(),
                    used_ocr: false,
                    error: Some(native_err.unwrap_or(e)),
                }
            }
        }
    }
}

/// Extract every page of `source` in order.
pub fn extract_pages(
    source: &dyn PageSource,
    extractor: &PageExtractor<'_>,
    file_name: &str,
) -> ExtractedDocument {
    let total = source.page_count();
    let pages: Vec<PageRecord> = (0..total).map(|i| extractor.extract(source, i)).collect();

    let doc = ExtractedDocument {
        file_name: file_name.to_string(),
        pages,
    };
    info!(
        "Extracted '{}': {} pages, {} via OCR, {} failed",
        file_name,
        total,
        doc.ocr_pages().len(),
        doc.failed_pages().len()
    );
    doc
}

// ── Page merging ─────────────────────────────────────────────────────────

/// Boundary line written before each page's text in `merged_text`.
pub fn page_marker(page_num: usize) -> String {
    format!("[[page {}]]", page_num)
}

static RE_PAGE_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^\[\[page (\d+)\]\]\n?").expect("static regex"));

/// Merge pages into one text, in page order, each preceded by its marker.
pub fn merge_pages(pages: &[PageRecord]) -> String {
    let mut sorted: Vec<&PageRecord> = pages.iter().collect();
    sorted.sort_by_key(|p| p.page_num);

    let mut out = String::new();
    for (i, page) in sorted.iter().enumerate() {
        if i > 0 {
            out.push_str("\n\n");
        }
        out.push_str(&page_marker(page.page_num));
        out.push('\n');
        out.push_str(&page.text);
    }
    out
}

/// Recover `(page_num, text)` pairs from a merged text.
///
/// Inverse of [`merge_pages`] for page text that does not itself contain a
/// marker line.
pub fn split_pages(merged: &str) -> Vec<(usize, String)> {
    let markers: Vec<(usize, usize, usize)> = RE_PAGE_MARKER
        .captures_iter(merged)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let num = caps[1].parse().ok()?;
            Some((num, whole.start(), whole.end()))
        })
        .collect();

    markers
        .iter()
        .enumerate()
        .map(|(i, &(num, _, body_start))| {
            let body_end = markers.get(i + 1).map(|m| m.1).unwrap_or(merged.len());
            let body = &merged[body_start..body_end];
            let body = if i + 1 < markers.len() {
                body.strip_suffix("\n\n").unwrap_or(body)
            } else {
                body
            };
            (num, body.to_string())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    struct FakeSource {
        pages: Vec<Result<String, ()>>,
        render_ok: bool,
    }

    impl PageSource for FakeSource {
        fn page_count(&self) -> usize {
            self.pages.len()
        }

        fn native_text(&self, index: usize) -> Result<String, PageError> {
            self.pages[index].clone().map_err(|_| PageError::NativeTextFailed {
                page: index + 1,
                detail: "damaged object stream".into(),
            })
        }

        fn rasterize(&self, index: usize) -> Result<DynamicImage, PageError> {
            if self.render_ok {
                Ok(DynamicImage::ImageRgba8(RgbaImage::from_pixel(
                    4,
                    4,
                    Rgba([255, 255, 255, 255]),
                )))
            } else {
                Err(PageError::RenderFailed {
                    page: index + 1,
                    detail: "bitmap allocation failed".into(),
                })
            }
        }
    }

    struct StubOcr(&'static str);

    impl OcrEngine for StubOcr {
        fn recognize(&self, _page_num: usize, _image: &DynamicImage) -> Result<String, PageError> {
            Ok(self.0.to_string())
        }
    }

    struct MissingOcr;

    impl OcrEngine for MissingOcr {
        fn recognize(&self, page_num: usize, _image: &DynamicImage) -> Result<String, PageError> {
            Err(PageError::OcrUnavailable {
                page: page_num,
                detail: "tesseract: not found".into(),
            })
        }
    }

    fn source(pages: &[&str]) -> FakeSource {
        FakeSource {
            pages: pages.iter().map(|p| Ok(p.to_string())).collect(),
            render_ok: true,
        }
    }

    #[test]
    fn threshold_boundary() {
        let policy = OcrPolicy {
            mode: OcrMode::Auto,
            min_text_chars: 5,
        };
        assert!(policy.needs_ocr(""));
        assert!(policy.needs_ocr("a b c d")); // 4 chars
        assert!(!policy.needs_ocr("a b c d e")); // exactly 5
        assert!(!policy.needs_ocr("plenty of native text"));
    }

    #[test]
    fn off_and_force_modes() {
        let off = OcrPolicy {
            mode: OcrMode::Off,
            min_text_chars: 100,
        };
        assert!(!off.needs_ocr(""));
        let force = OcrPolicy {
            mode: OcrMode::Force,
            min_text_chars: 0,
        };
        assert!(force.needs_ocr("lots of text here"));
    }

    #[test]
    fn native_page_skips_ocr() {
        let ocr = StubOcr("should not be used");
        let ex = PageExtractor::new(&ocr, OcrPolicy::default());
        let rec = ex.extract(&source(&["Revenue grew 10%."]), 0);
        assert_eq!(rec.text, "Revenue grew 10%.");
        assert!(!rec.used_ocr);
        assert!(rec.error.is_none());
    }

    #[test]
    fn empty_page_uses_ocr() {
        let ocr = StubOcr("Signed: J. Doe\n\x0c");
        let ex = PageExtractor::new(&ocr, OcrPolicy::default());
        let rec = ex.extract(&source(&["  \n "]), 0);
        assert_eq!(rec.text, "Signed: J. Doe");
        assert!(rec.used_ocr);
        assert_eq!(rec.page_num, 1);
    }

    #[test]
    fn ocr_unavailable_is_page_level() {
        let ocr = MissingOcr;
        let ex = PageExtractor::new(&ocr, OcrPolicy::default());
        let doc = extract_pages(&source(&["native page", ""]), &ex, "a.pdf");
        assert_eq!(doc.page_count(), 2);
        assert!(doc.pages[0].error.is_none());
        assert_eq!(doc.pages[0].text, "native page");
        assert!(matches!(
            doc.pages[1].error,
            Some(PageError::OcrUnavailable { page: 2, .. })
        ));
        assert!(doc.pages[1].text.is_empty());
        assert_eq!(doc.failed_pages().into_iter().collect::<Vec<_>>(), vec![2]);
    }

    #[test]
    fn damaged_page_does_not_abort_document() {
        let src = FakeSource {
            pages: vec![Ok("first".into()), Err(()), Ok("third".into())],
            render_ok: false,
        };
        let ocr = StubOcr("unused");
        let ex = PageExtractor::new(&ocr, OcrPolicy::default());
        let doc = extract_pages(&src, &ex, "b.pdf");
        assert_eq!(doc.pages.len(), 3);
        assert_eq!(doc.pages[0].text, "first");
        assert!(doc.pages[1].error.is_some());
        assert_eq!(doc.pages[2].text, "third");
    }

    #[test]
    fn failed_ocr_discards_sparse_native_text() {
        let ocr = MissingOcr;
        let policy = OcrPolicy {
            mode: OcrMode::Auto,
            min_text_chars: 50,
        };
        let ex = PageExtractor::new(&ocr, policy);
        let rec = ex.extract(&source(&["p. 3"]), 0);
        assert!(rec.text.is_empty());
        assert!(!rec.used_ocr);
        assert!(matches!(
            rec.error,
            Some(PageError::OcrUnavailable { page: 1, .. })
        ));
    }

    #[test]
    fn text_layer_error_wins_when_ocr_also_fails() {
        let src = FakeSource {
            pages: vec![Err(())],
            render_ok: true,
        };
        let ocr = MissingOcr;
        let ex = PageExtractor::new(&ocr, OcrPolicy::default());
        let rec = ex.extract(&src, 0);
        assert!(rec.text.is_empty());
        assert!(matches!(
            rec.error,
            Some(PageError::NativeTextFailed { page: 1, .. })
        ));
    }

    #[test]
    fn merge_then_split_restores_pages() {
        let pages = vec![
            PageRecord {
                page_num: 2,
                text: "Signed: J. Doe".into(),
                used_ocr: true,
                error: None,
            },
            PageRecord {
                page_num: 1,
                text: "Revenue grew 10%.\nCosts fell.".into(),
                used_ocr: false,
                error: None,
            },
            PageRecord {
                page_num: 3,
                text: String::new(),
                used_ocr: false,
                error: None,
            },
        ];
        let merged = merge_pages(&pages);
        assert!(merged.starts_with("[[page 1]]\nRevenue grew 10%."));
        let split = split_pages(&merged);
        assert_eq!(
            split,
            vec![
                (1, "Revenue grew 10%.\nCosts fell.".to_string()),
                (2, "Signed: J. Doe".to_string()),
                (3, String::new()),
            ]
        );
    }
}
