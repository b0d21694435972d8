//! Optical character recognition via the `tesseract` command-line tool.
//!
//! The rendered page is written to a temporary PNG and passed to
//! `tesseract <png> stdout -l <lang>`. A missing binary is reported as
//! [`PageError::OcrUnavailable`] so the caller can tell "install tesseract"
//! apart from "this page was unreadable".

use crate::config::DatasetConfig;
use crate::error::PageError;
use crate::pipeline::extract::OcrEngine;
use image::{DynamicImage, ImageFormat};
use std::io::ErrorKind;
use std::process::Command;
use tracing::debug;

/// [`OcrEngine`] backed by the tesseract CLI.
#[derive(Debug, Clone)]
pub struct TesseractOcr {
    cmd: String,
    language: String,
}

impl TesseractOcr {
    pub fn new(cmd: impl Into<String>, language: impl Into<String>) -> Self {
        Self {
            cmd: cmd.into(),
            language: language.into(),
        }
    }

    pub fn from_config(config: &DatasetConfig) -> Self {
        Self::new(&config.tesseract_cmd, &config.ocr_language)
    }

    /// `true` when the configured binary can be executed.
    pub fn is_available(&self) -> bool {
        Command::new(&self.cmd)
            .arg("--version")
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }
}

impl OcrEngine for TesseractOcr {
    fn recognize(&self, page_num: usize, image: &DynamicImage) -> Result<String, PageError> {
        let failed = |detail: String| PageError::OcrFailed {
            page: page_num,
            detail,
        };

        let png = tempfile::Builder::new()
            .prefix("pdf2qa-page-")
            .suffix(".png")
            .tempfile()
            .map_err(|e| failed(format!("temp file: {}", e)))?;
        image
            .save_with_format(png.path(), ImageFormat::Png)
            .map_err(|e| failed(format!("PNG encode: {}", e)))?;

        let output = Command::new(&self.cmd)
            .arg(png.path())
            .arg("stdout")
            .arg("-l")
            .arg(&self.language)
            .output()
            .map_err(|e| {
                if e.kind() == ErrorKind::NotFound {
                    PageError::OcrUnavailable {
                        page: page_num,
                        detail: format!("'{}' not found on PATH", self.cmd),
                    }
                } else {
                    failed(e.to_string())
                }
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(failed(format!(
                "{} exited with {}: {}",
                self.cmd,
                output.status,
                stderr.trim()
            )));
        }

        let text = String::from_utf8_lossy(&output.stdout).into_owned();
        debug!("OCR page {}: {} bytes", page_num, text.len());
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    #[test]
    fn missing_binary_is_unavailable() {
        let ocr = TesseractOcr::new("pdf2qa-no-such-tesseract-binary", "eng");
        assert!(!ocr.is_available());

        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(8, 8, Rgba([255; 4])));
        let err = ocr.recognize(3, &img).unwrap_err();
        assert!(matches!(err, PageError::OcrUnavailable { page: 3, .. }));
    }

    #[test]
    fn from_config_uses_language() {
        let config = DatasetConfig::builder()
            .ocr_language("deu")
            .tesseract_cmd("/opt/tesseract")
            .build()
            .unwrap();
        let ocr = TesseractOcr::from_config(&config);
        assert_eq!(ocr.language, "deu");
        assert_eq!(ocr.cmd, "/opt/tesseract");
    }
}
