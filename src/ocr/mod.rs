//! OCR a whole document: load pages, preprocess them, recognize them in
//! parallel and join the text in page order.

use std::sync::{Arc, LazyLock};

use futures::StreamExt as _;
use regex::Regex;

use crate::{
    async_utils::blocking_iter_streams::{BlockingIterStream, spawn_blocking_propagating_panics},
    config::OcrConfig,
    page_iter::{Page, PageIter},
    preprocess::{ThresholdMethod, preprocess_page},
    prelude::*,
    ui::Ui,
};

pub mod engines;

use self::engines::{OcrPageEngine, OcrPageInput};

/// Separator between pages in joined OCR text.
pub const PAGE_BREAK: &str = "\n\n--- PAGE BREAK ---\n\n";

/// A page-break marker line, or a form feed.
static PAGE_BREAK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^[ \t]*--- PAGE BREAK ---[ \t]*$|\x0C").expect("failed to compile regex")
});

/// Split joined OCR text back into pages.
pub fn split_pages(text: &str) -> Vec<&str> {
    PAGE_BREAK_RE.split(text).collect()
}

/// How did a document's OCR go?
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OcrStatus {
    /// Every page was recognized.
    Ok,
    /// Some pages failed or were skipped.
    Incomplete,
    /// Nothing was recognized.
    Failed,
}

/// The result of OCRing a document.
#[derive(Debug)]
pub struct OcrOutput {
    pub status: OcrStatus,
    /// Pages we attempted.
    pub page_count: usize,
    /// 1-based numbers of pages that failed. Their text is empty.
    pub failed_pages: Vec<usize>,
    /// Page errors and tool warnings.
    pub errors: Vec<String>,
    /// Page texts joined with [`PAGE_BREAK`].
    pub text: String,
}

/// Two workers, or four on machines with more than four cores, but never
/// more than there are pages.
pub fn default_worker_count(page_count: usize) -> usize {
    let workers = if num_cpus::get() > 4 { 4 } else { 2 };
    workers.min(page_count).max(1)
}

/// OCR every page of a document.
///
/// Individual page failures are recorded in the output, not returned as
/// errors. Errors mean the document couldn't be opened at all.
#[instrument(level = "debug", skip_all, fields(path = %path.display()))]
pub async fn ocr_document(
    ui: &Ui,
    path: &Path,
    config: &OcrConfig,
    engine: Arc<dyn OcrPageEngine>,
    workers: Option<usize>,
) -> Result<OcrOutput> {
    let page_iter = PageIter::from_path(path, config)
        .await
        .with_context(|| format!("Failed to split {:?} into pages", path))?;
    let page_count = page_iter.pages_to_process();
    let check_complete_result = page_iter.check_complete();
    let mut errors = page_iter.warnings().to_owned();
    let workers = workers
        .unwrap_or_else(|| default_worker_count(page_count))
        .max(1);
    info!(pages = page_count, workers, "Starting OCR");

    let document = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let pb = ui.page_progress(&document, page_count);
    let threshold = config.threshold;
    let results = BlockingIterStream::new(page_iter)
        .enumerate()
        .map(|(page_idx, page)| {
            let engine = engine.clone();
            async move { ocr_page(engine.as_ref(), page_idx, page, threshold).await }
        })
        // `buffered` keeps results in page order.
        .buffered(workers)
        .inspect(|_| pb.inc(1))
        .collect::<Vec<_>>()
        .await;

    let mut pages = Vec::with_capacity(results.len());
    let mut failed_pages = vec![];
    for (page_idx, result) in results.into_iter().enumerate() {
        match result {
            Ok(text) => pages.push(text),
            Err(err) => {
                warn!(page = page_idx + 1, "OCR failed: {:#}", err);
                failed_pages.push(page_idx + 1);
                errors.push(format!("page {}: {:#}", page_idx + 1, err));
                pages.push(String::new());
            }
        }
    }
    if let Err(err) = &check_complete_result {
        errors.push(err.to_string());
    }

    let status = if pages.is_empty() || failed_pages.len() == pages.len() {
        OcrStatus::Failed
    } else if !failed_pages.is_empty() || check_complete_result.is_err() {
        OcrStatus::Incomplete
    } else {
        OcrStatus::Ok
    };
    Ok(OcrOutput {
        status,
        page_count: pages.len(),
        failed_pages,
        errors,
        text: pages.join(PAGE_BREAK),
    })
}

/// Preprocess and recognize one page.
async fn ocr_page(
    engine: &dyn OcrPageEngine,
    page_idx: usize,
    page: Result<Page>,
    threshold: ThresholdMethod,
) -> Result<String> {
    let page = page?;
    let page =
        spawn_blocking_propagating_panics(move || preprocess_page(&page, threshold)).await?;
    engine.ocr_page(OcrPageInput { page_idx, page }).await
}
