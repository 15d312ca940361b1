use std::str::FromStr;

use clap::{Parser, Subcommand};
use tracing_subscriber::{
    EnvFilter, Layer as _, filter::Directive, fmt::format::FmtSpan, layer::SubscriberExt,
    util::SubscriberInitExt as _,
};

use self::{prelude::*, ui::Ui};

mod async_utils;
mod cmd;
mod config;
mod cpu_limit;
mod ocr;
mod page_iter;
mod prelude;
mod preprocess;
mod report;
mod toml_utils;
mod ui;

/// Log level used when `RUST_LOG` is unset.
const DEFAULT_LOG_DIRECTIVE: &str = "info";

/// OCR scanned financial reports and extract period figures and metrics.
#[derive(Debug, Parser)]
#[clap(
    version,
    author,
    after_help = r#"
Environment Variables:
  - TESSERACT_CMD (optional): Path to the tesseract executable.
  - POPPLER_PATH (optional): Directory containing pdfinfo and pdftocairo.
  - OCR_LANG (optional): Tesseract languages (default: vie+eng).
  - RUST_LOG (optional): Log filter, e.g. "debug" (default: info).

  These variables may be set in a `.env` file.
"#
)]
struct Opts {
    #[clap(subcommand)]
    subcmd: Cmd,
}

#[derive(Debug, Subcommand)]
enum Cmd {
    /// OCR a PDF or image and save the text, optionally parsing a report.
    Ocr(cmd::ocr::OcrOpts),
    /// Parse OCR text into a financial report (JSON).
    Parse(cmd::parse::ParseOpts),
    /// Print schemas for output and configuration formats.
    Schema(cmd::schema::SchemaOpts),
}

impl Cmd {
    /// Does this command write its result to stdout?
    fn writes_to_stdout(&self) -> bool {
        match self {
            Cmd::Ocr(_) => false,
            Cmd::Parse(opts) => opts.output_path.is_none(),
            Cmd::Schema(opts) => opts.output_path.is_none(),
        }
    }

    async fn run(&self, ui: &Ui) -> Result<()> {
        match self {
            Cmd::Ocr(opts) => cmd::ocr::cmd_ocr(ui, opts).await,
            Cmd::Parse(opts) => cmd::parse::cmd_parse(opts).await,
            Cmd::Schema(opts) => cmd::schema::cmd_schema(opts).await,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // A `.env` file is optional, and may set `RUST_LOG`.
    dotenvy::dotenv().ok();

    let ui = Ui::init();
    init_tracing(&ui)?;

    let opts = Opts::parse();
    run(&ui, &opts).await
}

/// Send logs to stderr, filtered by `RUST_LOG`.
fn init_tracing(ui: &Ui) -> Result<()> {
    let directive = Directive::from_str(DEFAULT_LOG_DIRECTIVE)
        .context("invalid default log directive")?;
    let env_filter = EnvFilter::builder()
        .with_default_directive(directive)
        .from_env_lossy();
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_span_events(FmtSpan::CLOSE)
        .with_writer(ui.stderr_writer())
        .with_filter(env_filter);
    tracing_subscriber::registry().with(fmt_layer).init();
    Ok(())
}

#[instrument(level = "debug", name = "main", skip_all)]
async fn run(ui: &Ui, opts: &Opts) -> Result<()> {
    debug!(?opts, "Parsed options");
    if opts.subcmd.writes_to_stdout() {
        ui.hide_progress_bars();
    }
    opts.subcmd.run(ui).await
}
