//! The `schema` subcommand.

use clap::{Args, ValueEnum};
use schemars::schema_for;

use crate::{
    async_utils::io::write_json,
    prelude::*,
    report::{FinancialReport, config::ParserConfig, period::PeriodSnapshot},
};

/// Types we can print a JSON schema for. Spelled like the Rust types.
#[derive(Debug, Clone, Copy, ValueEnum)]
#[clap(rename_all = "PascalCase")]
pub enum SchemaType {
    /// Output of `parse` and `ocr --report`.
    FinancialReport,
    /// Output of `parse --period`.
    PeriodSnapshot,
    /// The `--labels` file.
    ParserConfig,
}

/// `schema` command line arguments.
#[derive(Debug, Args)]
pub struct SchemaOpts {
    /// Which type to describe.
    #[clap(value_enum, value_name = "TYPE")]
    pub schema_type: SchemaType,

    /// Where to write the schema. Defaults to standard output.
    #[clap(short = 'o', long = "out")]
    pub output_path: Option<PathBuf>,
}

/// The `schema` subcommand.
#[instrument(level = "debug", skip_all)]
pub async fn cmd_schema(schema_opts: &SchemaOpts) -> Result<()> {
    let schema = match schema_opts.schema_type {
        SchemaType::FinancialReport => schema_for!(FinancialReport),
        SchemaType::PeriodSnapshot => schema_for!(PeriodSnapshot),
        SchemaType::ParserConfig => schema_for!(ParserConfig),
    };
    write_json(schema_opts.output_path.as_deref(), &schema, true).await
}
