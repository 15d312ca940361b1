//! Turning raw OCR text into a [`FinancialReport`].
//!
//! The parser is pure: no I/O, no shared mutable state, and it never fails.
//! Missing sections, unrecognized rows and uncomputable metrics all show up as
//! absent data.

use std::{collections::BTreeMap, sync::Arc};

use schemars::JsonSchema;
use uuid::Uuid;

use crate::prelude::*;

pub mod config;
pub mod metrics;
pub mod normalize;
pub mod period;

use self::{
    config::{MetricCatalog, ParserConfig},
    metrics::calculate_metrics,
    period::{Period, PeriodSnapshot, Vocabulary, extract_period},
};

/// The two periods of a report.
#[derive(Clone, Debug, JsonSchema, PartialEq, Serialize)]
pub struct FinancialPeriod {
    /// Figures at the beginning of the year.
    pub start_of_period: PeriodSnapshot,

    /// Figures at the end of the year.
    pub end_of_period: PeriodSnapshot,
}

/// Everything we extracted from one text.
#[derive(Clone, Debug, JsonSchema, Serialize)]
pub struct FinancialReport {
    /// Fresh for every parse, even of identical text.
    report_id: Uuid,

    /// Start and end snapshots.
    financial_period: FinancialPeriod,

    /// Derived metrics by name.
    calculated_metrics: BTreeMap<String, f64>,
}

impl FinancialReport {
    /// The report's unique ID.
    pub fn report_id(&self) -> Uuid {
        self.report_id
    }

    /// Both periods.
    pub fn financial_period(&self) -> &FinancialPeriod {
        &self.financial_period
    }

    /// The snapshot for one period.
    pub fn period(&self, period: Period) -> &PeriodSnapshot {
        match period {
            Period::Start => &self.financial_period.start_of_period,
            Period::End => &self.financial_period.end_of_period,
        }
    }

    /// Derived metrics.
    pub fn calculated_metrics(&self) -> &BTreeMap<String, f64> {
        &self.calculated_metrics
    }
}

/// Parses OCR text using one [`ParserConfig`].
///
/// Cheap to clone and safe to share between threads.
#[derive(Clone, Debug)]
pub struct ReportParser {
    vocabulary: Arc<Vocabulary>,
    metrics: Arc<MetricCatalog>,
}

impl Default for ReportParser {
    fn default() -> Self {
        Self::new(&ParserConfig::default())
    }
}

impl ReportParser {
    /// Create a parser for a configuration.
    pub fn new(config: &ParserConfig) -> Self {
        Self {
            vocabulary: Arc::new(Vocabulary::new(config)),
            metrics: Arc::new(config.metrics.clone()),
        }
    }

    /// Load a configuration file, or use the built-in vocabulary.
    pub async fn from_config_path(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Ok(Self::new(&ParserConfig::load(path).await?)),
            None => Ok(Self::default()),
        }
    }

    /// Extract a single period.
    pub fn extract_period(&self, text: &str, period: Period) -> PeriodSnapshot {
        extract_period(text, period, &self.vocabulary)
    }

    /// Parse text into a report with a new ID.
    #[instrument(level = "debug", skip_all, fields(len = text.len()))]
    pub fn parse(&self, text: &str) -> FinancialReport {
        let start_of_period = self.extract_period(text, Period::Start);
        let end_of_period = self.extract_period(text, Period::End);
        let calculated_metrics =
            calculate_metrics(&start_of_period, &end_of_period, &self.metrics);
        let report = FinancialReport {
            report_id: Uuid::new_v4(),
            financial_period: FinancialPeriod {
                start_of_period,
                end_of_period,
            },
            calculated_metrics,
        };
        debug!(report_id = %report.report_id, "Parsed report");
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCENARIO: &str = "\
Beginning of year
01/01/2023
Total assets: 1.000.000.000
Liabilities: 500.000.000

End of year
31/12/2023
Total assets: 1.200.000.000
";

    #[test]
    fn end_to_end_scenario() {
        let report = ReportParser::default().parse(SCENARIO);
        let start = report.period(Period::Start);
        let end = report.period(Period::End);
        assert_eq!(start.date(), Some("01/01/2023"));
        assert_eq!(end.date(), Some("31/12/2023"));
        assert_eq!(start.value("total_assets"), Some(1_000_000_000.0));
        assert_eq!(start.value("liabilities"), Some(500_000_000.0));
        assert_eq!(end.value("total_assets"), Some(1_200_000_000.0));
        let growth = report.calculated_metrics()["growth_rate_total_assets"];
        assert!((growth - 0.2).abs() < 1e-9);
        assert_eq!(report.calculated_metrics()["growth_rate"], growth);
    }

    #[test]
    fn parsing_is_idempotent_except_for_the_id() {
        let parser = ReportParser::default();
        let a = parser.parse(SCENARIO);
        let b = parser.parse(SCENARIO);
        assert_ne!(a.report_id(), b.report_id());
        assert_eq!(a.financial_period(), b.financial_period());
        assert_eq!(a.calculated_metrics(), b.calculated_metrics());
    }

    #[test]
    fn empty_text_gives_an_empty_report() {
        let report = ReportParser::default().parse("");
        assert!(report.period(Period::Start).is_empty());
        assert!(report.period(Period::End).is_empty());
        assert!(report.calculated_metrics().is_empty());
    }

    #[test]
    fn json_shape() {
        let report = ReportParser::default().parse(SCENARIO);
        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["report_id"], json!(report.report_id().to_string()));
        assert_eq!(
            value["financial_period"]["start_of_period"],
            json!({
                "date": "01/01/2023",
                "data": {
                    "liabilities": 500_000_000.0,
                    "total_assets": 1_000_000_000.0,
                },
            })
        );
        assert_eq!(
            value["financial_period"]["end_of_period"]["data"]["total_assets"],
            json!(1_200_000_000.0)
        );
        assert!(value["calculated_metrics"]["growth_rate_total_assets"].is_f64());
    }

    #[test]
    fn parser_is_shareable() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<ReportParser>();
    }
}
