//! The `ocr` subcommand.

use clap::Args;

use crate::{
    async_utils::io::{write_json, write_jsonl, write_text},
    cmd::{LabelOpts, parse_pages},
    config::OcrConfig,
    ocr::{OcrStatus, engines::ocr_engine, ocr_document},
    prelude::*,
    ui::Ui,
};

/// Directory for OCR text when `--out` isn't given.
const DEFAULT_RESULTS_DIR: &str = "results";

/// OCR command line arguments.
#[derive(Debug, Args)]
pub struct OcrOpts {
    /// The PDF or image to OCR.
    #[clap(value_name = "INPUT")]
    pub input_path: PathBuf,

    /// Where to write the OCR text. Defaults to `results/<input name>.txt`.
    #[clap(short = 'o', long = "out")]
    pub output_path: Option<PathBuf>,

    /// How many pages to OCR at once. Defaults to 2, or 4 on machines with
    /// more than 4 cores, and never more than the page count.
    #[clap(short = 'w', long)]
    pub workers: Option<usize>,

    /// Also parse the text and write a financial report (JSON) here.
    #[clap(long = "report", value_name = "PATH")]
    pub report_path: Option<PathBuf>,

    /// Write one report per page to `--report` (JSONL), instead of one
    /// report for the whole document.
    #[clap(long, requires = "report_path")]
    pub per_page: bool,

    #[clap(flatten)]
    pub labels: LabelOpts,

    #[clap(flatten)]
    pub ocr: OcrConfig,
}

impl OcrOpts {
    /// The text output path, with the default applied.
    fn resolved_output_path(&self) -> Result<PathBuf> {
        match &self.output_path {
            Some(path) => Ok(path.clone()),
            None => {
                let stem = self
                    .input_path
                    .file_stem()
                    .ok_or_else(|| anyhow!("cannot get file name from {:?}", self.input_path))?;
                Ok(Path::new(DEFAULT_RESULTS_DIR)
                    .join(format!("{}.txt", stem.to_string_lossy())))
            }
        }
    }
}

/// The `ocr` subcommand.
#[instrument(level = "debug", skip_all, fields(input = %opts.input_path.display()))]
pub async fn cmd_ocr(ui: &Ui, opts: &OcrOpts) -> Result<()> {
    // Load the vocabulary up front, so a bad file fails before slow OCR.
    let parser = match &opts.report_path {
        Some(_) => Some(opts.labels.parser().await?),
        None => None,
    };
    let output_path = opts.resolved_output_path()?;

    let engine = ocr_engine(&opts.ocr).await?;
    let output =
        ocr_document(ui, &opts.input_path, &opts.ocr, engine, opts.workers).await?;
    for error in &output.errors {
        warn!("{}", error);
    }

    write_text(Some(&output_path), &output.text).await?;
    ui.notice(
        "💾",
        &format!(
            "Wrote {} pages of text to {}",
            output.page_count,
            output_path.display()
        ),
    );

    if let (Some(parser), Some(report_path)) = (parser, &opts.report_path) {
        if opts.per_page {
            let reports = parse_pages(&parser, &output.text);
            write_jsonl(Some(report_path), &reports).await?;
            ui.notice(
                "📊",
                &format!(
                    "Wrote {} page reports to {}",
                    reports.len(),
                    report_path.display()
                ),
            );
        } else {
            debug!(pages = output.page_count, "Parsing all pages as one report");
            let report = parser.parse(&output.text);
            write_json(Some(report_path), &report, true).await?;
            ui.notice(
                "📊",
                &format!("Wrote report {} to {}", report.report_id(), report_path.display()),
            );
        }
    }

    match output.status {
        OcrStatus::Ok => Ok(()),
        OcrStatus::Incomplete => {
            warn!(failed_pages = ?output.failed_pages, "OCR output is incomplete");
            Ok(())
        }
        OcrStatus::Failed => Err(anyhow!(
            "could not OCR any pages of {:?}",
            opts.input_path
        )),
    }
}
