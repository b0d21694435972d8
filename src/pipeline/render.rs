//! PDF access via pdfium: open a document from bytes, read each page's text
//! layer, and rasterise pages for OCR.
//!
//! ## Why spawn_blocking?
//!
//! The `pdfium-render` crate wraps the pdfium C++ library, which uses
//! thread-local state internally and is not safe to call from async contexts.
//! Everything in this module is blocking; [`crate::ingest`] moves it onto
//! the blocking pool with `tokio::task::spawn_blocking`.
//!
//! ## Why cap pixels?
//!
//! Pages are rendered at twice their nominal size, which is what tesseract
//! needs to read body text reliably. A poster-sized page at that scale would
//! produce an enormous bitmap, so `max_rendered_pixels` caps the longest edge
//! regardless of physical size.

use crate::config::DatasetConfig;
use crate::error::{PageError, Pdf2QaError};
use crate::output::ExtractedDocument;
use crate::pipeline::extract::{
    extract_pages, DocumentExtractor, OcrEngine, OcrPolicy, PageExtractor, PageSource,
};
use crate::pipeline::ocr::TesseractOcr;
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

/// Rasterisation scale relative to the page's nominal size.
const RENDER_SCALE: f32 = 2.0;

/// Bind to a pdfium shared library.
///
/// Search order: `PDFIUM_LIB_PATH` (a file or a directory containing the
/// platform library), the current directory, then the system library path.
pub fn bind_pdfium() -> Result<Pdfium, Pdf2QaError> {
    if let Ok(custom) = std::env::var("PDFIUM_LIB_PATH") {
        let path = PathBuf::from(&custom);
        let lib = if path.is_dir() {
            Pdfium::pdfium_platform_library_name_at_path(&path)
        } else {
            path
        };
        debug!("Binding pdfium from PDFIUM_LIB_PATH: {}", lib.display());
        return Pdfium::bind_to_library(&lib)
            .map(Pdfium::new)
            .map_err(|e| Pdf2QaError::PdfiumBindingFailed(format!("{}: {:?}", lib.display(), e)));
    }

    Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
        .or_else(|_| Pdfium::bind_to_system_library())
        .map(Pdfium::new)
        .map_err(|e| Pdf2QaError::PdfiumBindingFailed(format!("{:?}", e)))
}

/// One open PDF document.
pub struct PdfiumSource<'a> {
    document: PdfDocument<'a>,
    render_config: PdfRenderConfig,
}

impl<'a> PdfiumSource<'a> {
    /// Open `bytes` as a PDF.
    pub fn open(
        pdfium: &'a Pdfium,
        bytes: &'a [u8],
        file_name: &str,
        password: Option<&str>,
        max_pixels: u32,
    ) -> Result<Self, Pdf2QaError> {
        let document = pdfium
            .load_pdf_from_byte_slice(bytes, password)
            .map_err(|e| {
                let err_str = format!("{:?}", e);
                if err_str.contains("Password") || err_str.contains("password") {
                    if password.is_some() {
                        Pdf2QaError::WrongPassword {
                            name: file_name.to_string(),
                        }
                    } else {
                        Pdf2QaError::PasswordRequired {
                            name: file_name.to_string(),
                        }
                    }
                } else {
                    Pdf2QaError::CorruptPdf {
                        name: file_name.to_string(),
                        detail: err_str,
                    }
                }
            })?;

        let render_config = PdfRenderConfig::new()
            .scale_page_by_factor(RENDER_SCALE)
            .set_maximum_width(max_pixels as i32)
            .set_maximum_height(max_pixels as i32);

        Ok(Self {
            document,
            render_config,
        })
    }

    fn page(&self, index: usize) -> Result<PdfPage<'_>, String> {
        let idx = PdfPageIndex::try_from(index).map_err(|e| e.to_string())?;
        self.document
            .pages()
            .get(idx)
            .map_err(|e| format!("{:?}", e))
    }
}

impl PageSource for PdfiumSource<'_> {
    fn page_count(&self) -> usize {
        self.document.pages().len() as usize
    }

    fn native_text(&self, index: usize) -> Result<String, PageError> {
        let to_err = |detail: String| PageError::NativeTextFailed {
            page: index + 1,
            detail,
        };
        let page = self.page(index).map_err(to_err)?;
        let text = page.text().map_err(|e| to_err(format!("{:?}", e)))?;
        Ok(text.all())
    }

    fn rasterize(&self, index: usize) -> Result<DynamicImage, PageError> {
        let to_err = |detail: String| PageError::RenderFailed {
            page: index + 1,
            detail,
        };
        let page = self.page(index).map_err(to_err)?;
        let bitmap = page
            .render_with_config(&self.render_config)
            .map_err(|e| to_err(format!("{:?}", e)))?;

        let image = bitmap.as_image();
        debug!(
            "Rendered page {} → {}x{} px",
            index + 1,
            image.width(),
            image.height()
        );
        Ok(image)
    }
}

/// Production [`DocumentExtractor`]: pdfium for text and rendering, an
/// [`OcrEngine`] (tesseract by default) for scanned pages.
pub struct PdfExtractor {
    ocr: Arc<dyn OcrEngine>,
    policy: OcrPolicy,
    max_rendered_pixels: u32,
    password: Option<String>,
}

impl PdfExtractor {
    pub fn new(config: &DatasetConfig, ocr: Arc<dyn OcrEngine>) -> Self {
        Self {
            ocr,
            policy: OcrPolicy::from_config(config),
            max_rendered_pixels: config.max_rendered_pixels,
            password: config.password.clone(),
        }
    }

    /// Extractor using tesseract as configured.
    pub fn from_config(config: &DatasetConfig) -> Self {
        Self::new(config, Arc::new(TesseractOcr::from_config(config)))
    }
}

impl DocumentExtractor for PdfExtractor {
    fn extract(&self, bytes: &[u8], file_name: &str) -> Result<ExtractedDocument, Pdf2QaError> {
        let pdfium = bind_pdfium()?;
        let source = PdfiumSource::open(
            &pdfium,
            bytes,
            file_name,
            self.password.as_deref(),
            self.max_rendered_pixels,
        )?;
        info!("PDF '{}' loaded: {} pages", file_name, source.page_count());

        let extractor = PageExtractor::new(self.ocr.as_ref(), self.policy);
        Ok(extract_pages(&source, &extractor, file_name))
    }
}
