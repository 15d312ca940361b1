//! Command-line entry points.

use clap::Args;

use crate::{
    ocr::split_pages,
    prelude::*,
    report::{FinancialReport, ReportParser},
};

pub mod ocr;
pub mod parse;
pub mod schema;

/// Options for choosing the caption vocabulary.
#[derive(Debug, Clone, Args)]
pub struct LabelOpts {
    /// TOML or JSON file with period captions, line-item captions and
    /// metrics. Sections it sets replace the built-in ones.
    #[clap(long = "labels", value_name = "PATH")]
    pub labels_path: Option<PathBuf>,
}

impl LabelOpts {
    /// Build a parser from these options.
    pub async fn parser(&self) -> Result<ReportParser> {
        ReportParser::from_config_path(self.labels_path.as_deref()).await
    }
}

/// Parse joined OCR text as one report per page.
pub fn parse_pages(parser: &ReportParser, text: &str) -> Vec<FinancialReport> {
    let reports = split_pages(text)
        .into_iter()
        .map(|page| parser.parse(page))
        .collect::<Vec<_>>();
    debug!(pages = reports.len(), "Parsed pages");
    reports
}
