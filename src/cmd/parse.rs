//! The `parse` subcommand.

use clap::Args;

use crate::{
    async_utils::io::{read_text, write_json, write_jsonl},
    cmd::{LabelOpts, parse_pages},
    prelude::*,
    report::period::Period,
};

/// Parse command line arguments.
#[derive(Debug, Args)]
pub struct ParseOpts {
    /// OCR text to parse. Reads standard input if omitted.
    #[clap(value_name = "INPUT")]
    pub input_path: Option<PathBuf>,

    /// Where to write JSON. Defaults to standard output.
    #[clap(short = 'o', long = "out")]
    pub output_path: Option<PathBuf>,

    #[clap(flatten)]
    pub labels: LabelOpts,

    /// Parse each page separately and write one report per line (JSONL).
    /// Pages are separated by `--- PAGE BREAK ---` lines or form feeds.
    #[clap(long, conflicts_with = "period")]
    pub per_page: bool,

    /// Only extract this period (`start` or `end`) and write its snapshot.
    #[clap(long, value_name = "PERIOD")]
    pub period: Option<Period>,

    /// Pretty-print the JSON.
    #[clap(long)]
    pub pretty: bool,
}

/// The `parse` subcommand.
#[instrument(level = "debug", skip_all)]
pub async fn cmd_parse(opts: &ParseOpts) -> Result<()> {
    let parser = opts.labels.parser().await?;
    let text = read_text(opts.input_path.as_deref()).await?;
    let output_path = opts.output_path.as_deref();

    if let Some(period) = opts.period {
        let snapshot = parser.extract_period(&text, period);
        if snapshot.is_empty() {
            info!(%period, "No figures found for period");
        }
        write_json(output_path, &snapshot, opts.pretty).await
    } else if opts.per_page {
        write_jsonl(output_path, &parse_pages(&parser, &text)).await
    } else {
        let report = parser.parse(&text);
        write_json(output_path, &report, opts.pretty).await
    }
}
