//! OCR engine interface.

use std::sync::Arc;

use crate::{config::OcrConfig, page_iter::Page, prelude::*};

pub mod tesseract;

/// One page to OCR.
pub struct OcrPageInput {
    /// Zero-based index of the page within its document.
    pub page_idx: usize,

    /// The preprocessed page image.
    pub page: Page,
}

/// Something that can turn a page image into text.
///
/// Engines are created once per run and shared by every page worker, so any
/// expensive setup belongs in the constructor.
#[async_trait]
pub trait OcrPageEngine: Send + Sync + 'static {
    /// OCR a single page.
    async fn ocr_page(&self, input: OcrPageInput) -> Result<String>;
}

/// Create the OCR engine for a run.
pub async fn ocr_engine(config: &OcrConfig) -> Result<Arc<dyn OcrPageEngine>> {
    Ok(Arc::new(tesseract::TesseractOcrEngine::new(config).await?))
}
