//! Parser vocabulary: period captions, line-item captions and metrics.
//!
//! Everything has built-in defaults covering Vietnamese (VAS, form B 01-DN)
//! and English balance sheets. A TOML or JSON file can replace any top-level
//! section:
//!
//! ```toml
//! min_label_similarity = 0.9
//!
//! [periods]
//! start = ["Số đầu năm", "Beginning of year"]
//! end = ["Số cuối năm", "End of year"]
//!
//! [[line_items]]
//! key = "tong_tai_san"
//! labels = ["Tổng tài sản", "Tổng cộng tài sản"]
//!
//! [metrics]
//! headline_growth = ["tong_tai_san"]
//!
//! [[metrics.ratios]]
//! name = "debt_to_assets"
//! numerator = ["no_phai_tra"]
//! denominator = ["tong_tai_san"]
//! ```

use schemars::JsonSchema;
use toml_span::{DeserError, de_helpers::TableHelper};

use super::normalize::{fold_text, normalize_key};
use crate::{async_utils::io::read_json_or_toml, prelude::*, toml_utils::custom_deser_error};

/// Default threshold for fuzzy caption matching.
const DEFAULT_MIN_LABEL_SIMILARITY: f64 = 0.88;

/// Complete parser configuration. Immutable once loaded.
#[derive(Clone, Debug, Deserialize, JsonSchema, PartialEq, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct ParserConfig {
    /// Captions that introduce each period's column or section.
    pub periods: PeriodLabels,

    /// Row captions recognized as line items.
    pub line_items: Vec<LineItemLabels>,

    /// Metrics derived from the two periods.
    pub metrics: MetricCatalog,

    /// Minimum similarity, in `(0, 1]`, for a fuzzy caption match. `1.0`
    /// disables fuzzy matching.
    pub min_label_similarity: f64,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            periods: PeriodLabels::default(),
            line_items: default_line_items(),
            metrics: MetricCatalog::default(),
            min_label_similarity: DEFAULT_MIN_LABEL_SIMILARITY,
        }
    }
}

impl ParserConfig {
    /// Load a configuration file (`.json` or TOML) and validate it.
    #[instrument(level = "debug", skip_all, fields(path = %path.display()))]
    pub async fn load(path: &Path) -> Result<Self> {
        let config = read_json_or_toml::<Self>(path).await?;
        config
            .validate()
            .with_context(|| format!("invalid parser configuration in {:?}", path))?;
        debug!(
            line_items = config.line_items.len(),
            ratios = config.metrics.ratios.len(),
            "Loaded parser configuration"
        );
        Ok(config)
    }

    /// Check the invariants the extractor relies on.
    pub fn validate(&self) -> Result<()> {
        if !(self.min_label_similarity > 0.0 && self.min_label_similarity <= 1.0) {
            return Err(anyhow!(
                "min_label_similarity must be in (0, 1], got {}",
                self.min_label_similarity
            ));
        }
        for (name, labels) in [("start", &self.periods.start), ("end", &self.periods.end)] {
            if labels.iter().all(|l| fold_text(l).is_empty()) {
                return Err(anyhow!("periods.{name} needs at least one non-empty label"));
            }
        }
        for item in &self.line_items {
            if normalize_key(&item.key).is_empty() {
                return Err(anyhow!("line item key {:?} is empty once normalized", item.key));
            }
            if item.labels.iter().all(|l| fold_text(l).is_empty()) {
                return Err(anyhow!("line item {:?} has no usable labels", item.key));
            }
        }
        for ratio in &self.metrics.ratios {
            if ratio.name.trim().is_empty()
                || ratio.numerator.is_empty()
                || ratio.denominator.is_empty()
            {
                return Err(anyhow!(
                    "ratio metric {:?} needs a name, a numerator and a denominator",
                    ratio.name
                ));
            }
        }
        Ok(())
    }
}

impl<'de> toml_span::Deserialize<'de> for ParserConfig {
    fn deserialize(value: &mut toml_span::Value<'de>) -> Result<Self, DeserError> {
        let defaults = Self::default();
        let mut th = TableHelper::new(value)?;
        let periods = th.optional("periods").unwrap_or(defaults.periods);
        let line_items = th.optional("line_items").unwrap_or(defaults.line_items);
        let metrics = th.optional("metrics").unwrap_or(defaults.metrics);
        let min_label_similarity = th.optional_s::<f64>("min_label_similarity");
        th.finalize(None)?;

        let min_label_similarity = match min_label_similarity {
            Some(spanned) if !(spanned.value > 0.0 && spanned.value <= 1.0) => {
                return Err(custom_deser_error(
                    spanned.span,
                    "min_label_similarity must be in (0, 1]",
                ));
            }
            Some(spanned) => spanned.value,
            None => defaults.min_label_similarity,
        };
        Ok(Self {
            periods,
            line_items,
            metrics,
            min_label_similarity,
        })
    }
}

/// Captions for the start and end periods.
#[derive(Clone, Debug, Deserialize, JsonSchema, PartialEq, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct PeriodLabels {
    /// Captions for the beginning-of-year column or section.
    pub start: Vec<String>,

    /// Captions for the end-of-year column or section.
    pub end: Vec<String>,
}

impl Default for PeriodLabels {
    fn default() -> Self {
        Self {
            start: strings(&[
                "Số đầu năm",
                "Đầu năm",
                "Số đầu kỳ",
                "Đầu kỳ",
                "Beginning of year",
                "Beginning of the year",
                "Start of year",
                "Opening balance",
            ]),
            end: strings(&[
                "Số cuối năm",
                "Cuối năm",
                "Số cuối kỳ",
                "Cuối kỳ",
                "End of year",
                "End of the year",
                "Closing balance",
            ]),
        }
    }
}

impl<'de> toml_span::Deserialize<'de> for PeriodLabels {
    fn deserialize(value: &mut toml_span::Value<'de>) -> Result<Self, DeserError> {
        let defaults = Self::default();
        let mut th = TableHelper::new(value)?;
        let start = th.optional("start").unwrap_or(defaults.start);
        let end = th.optional("end").unwrap_or(defaults.end);
        th.finalize(None)?;
        Ok(Self { start, end })
    }
}

/// Captions that all map to one line-item key.
#[derive(Clone, Debug, Deserialize, JsonSchema, PartialEq, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LineItemLabels {
    /// The output key. Normalized to lowercase ASCII with underscores.
    pub key: String,

    /// Row captions, including OCR-prone or abbreviated variants.
    pub labels: Vec<String>,
}

impl<'de> toml_span::Deserialize<'de> for LineItemLabels {
    fn deserialize(value: &mut toml_span::Value<'de>) -> Result<Self, DeserError> {
        let mut th = TableHelper::new(value)?;
        let key = th.required("key")?;
        let labels = th.required("labels")?;
        th.finalize(None)?;
        Ok(Self { key, labels })
    }
}

/// Metrics computed from the two periods.
#[derive(Clone, Debug, Deserialize, JsonSchema, PartialEq, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct MetricCatalog {
    /// Keys tried in order for the headline `growth_rate` metric.
    pub headline_growth: Vec<String>,

    /// Ratios computed within each period.
    pub ratios: Vec<RatioMetric>,
}

impl Default for MetricCatalog {
    fn default() -> Self {
        Self {
            headline_growth: strings(&["tong_tai_san", "total_assets"]),
            ratios: vec![
                RatioMetric {
                    name: "debt_to_assets".to_owned(),
                    numerator: strings(&["no_phai_tra", "liabilities"]),
                    denominator: strings(&["tong_tai_san", "total_assets"]),
                },
                RatioMetric {
                    name: "equity_to_assets".to_owned(),
                    numerator: strings(&["von_chu_so_huu", "owners_equity"]),
                    denominator: strings(&["tong_tai_san", "total_assets"]),
                },
            ],
        }
    }
}

impl<'de> toml_span::Deserialize<'de> for MetricCatalog {
    fn deserialize(value: &mut toml_span::Value<'de>) -> Result<Self, DeserError> {
        let defaults = Self::default();
        let mut th = TableHelper::new(value)?;
        let headline_growth = th
            .optional("headline_growth")
            .unwrap_or(defaults.headline_growth);
        let ratios = th.optional("ratios").unwrap_or(defaults.ratios);
        th.finalize(None)?;
        Ok(Self {
            headline_growth,
            ratios,
        })
    }
}

/// A ratio of two line items within one period, emitted as `<name>_start`
/// and `<name>_end`.
#[derive(Clone, Debug, Deserialize, JsonSchema, PartialEq, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RatioMetric {
    /// Metric name prefix.
    pub name: String,

    /// Candidate numerator keys; the first one present is used.
    pub numerator: Vec<String>,

    /// Candidate denominator keys; the first one present is used.
    pub denominator: Vec<String>,
}

impl<'de> toml_span::Deserialize<'de> for RatioMetric {
    fn deserialize(value: &mut toml_span::Value<'de>) -> Result<Self, DeserError> {
        let mut th = TableHelper::new(value)?;
        let name = th.required("name")?;
        let numerator = th.required("numerator")?;
        let denominator = th.required("denominator")?;
        th.finalize(None)?;
        Ok(Self {
            name,
            numerator,
            denominator,
        })
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| (*s).to_owned()).collect()
}

fn line_item(key: &str, labels: &[&str]) -> LineItemLabels {
    LineItemLabels {
        key: key.to_owned(),
        labels: strings(labels),
    }
}

/// Built-in caption table. Vietnamese captions map to Vietnamese keys and
/// English captions to English keys, so output keys follow the document.
fn default_line_items() -> Vec<LineItemLabels> {
    vec![
        // Vietnamese balance sheet (B 01-DN).
        line_item("tong_tai_san", &["Tổng tài sản", "Tổng cộng tài sản"]),
        line_item("tai_san_ngan_han", &["Tài sản ngắn hạn"]),
        line_item("tai_san_dai_han", &["Tài sản dài hạn"]),
        line_item(
            "tien_va_tuong_duong_tien",
            &[
                "Tiền và các khoản tương đương tiền",
                "Tiền và tương đương tiền",
            ],
        ),
        line_item(
            "dau_tu_tai_chinh_ngan_han",
            &["Đầu tư tài chính ngắn hạn", "Các khoản đầu tư tài chính ngắn hạn"],
        ),
        line_item(
            "phai_thu_ngan_han",
            &["Các khoản phải thu ngắn hạn", "Phải thu ngắn hạn"],
        ),
        line_item("hang_ton_kho", &["Hàng tồn kho"]),
        line_item("tai_san_co_dinh", &["Tài sản cố định"]),
        line_item("no_phai_tra", &["Nợ phải trả", "Tổng nợ phải trả"]),
        line_item("no_ngan_han", &["Nợ ngắn hạn"]),
        line_item("no_dai_han", &["Nợ dài hạn"]),
        line_item("von_chu_so_huu", &["Vốn chủ sở hữu"]),
        line_item(
            "von_gop_cua_chu_so_huu",
            &["Vốn góp của chủ sở hữu", "Vốn đầu tư của chủ sở hữu"],
        ),
        line_item(
            "loi_nhuan_sau_thue_chua_phan_phoi",
            &["Lợi nhuận sau thuế chưa phân phối"],
        ),
        line_item(
            "tong_nguon_von",
            &["Tổng nguồn vốn", "Tổng cộng nguồn vốn"],
        ),
        // English statements.
        line_item("total_assets", &["Total assets"]),
        line_item("current_assets", &["Current assets", "Short-term assets"]),
        line_item(
            "non_current_assets",
            &["Non-current assets", "Long-term assets"],
        ),
        line_item(
            "cash_and_cash_equivalents",
            &["Cash and cash equivalents"],
        ),
        line_item("inventories", &["Inventories", "Inventory"]),
        line_item("liabilities", &["Liabilities", "Total liabilities"]),
        line_item(
            "current_liabilities",
            &["Current liabilities", "Short-term liabilities"],
        ),
        line_item(
            "non_current_liabilities",
            &["Non-current liabilities", "Long-term liabilities"],
        ),
        line_item(
            "owners_equity",
            &["Owner's equity", "Owners' equity", "Equity", "Total equity"],
        ),
        line_item(
            "total_resources",
            &["Total resources", "Total liabilities and equity"],
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::toml_utils::from_toml_str;

    #[test]
    fn defaults_are_valid() {
        let config = ParserConfig::default();
        config.validate().unwrap();
        assert!(config.line_items.iter().any(|i| i.key == "tong_tai_san"));
        assert!(config.line_items.iter().any(|i| i.key == "total_assets"));
    }

    #[test]
    fn default_keys_are_already_normalized() {
        for item in ParserConfig::default().line_items {
            assert_eq!(normalize_key(&item.key), item.key);
        }
    }

    #[test]
    fn toml_sections_replace_defaults() {
        let config: ParserConfig = from_toml_str(
            r#"
min_label_similarity = 0.95

[[line_items]]
key = "cash"
labels = ["Cash on hand"]
"#,
        )
        .unwrap();
        assert_eq!(config.min_label_similarity, 0.95);
        assert_eq!(config.line_items.len(), 1);
        assert_eq!(config.line_items[0].key, "cash");
        // Untouched sections keep their defaults.
        assert_eq!(config.periods, PeriodLabels::default());
        assert_eq!(config.metrics, MetricCatalog::default());
    }

    #[test]
    fn toml_ratios_parse() {
        let config: ParserConfig = from_toml_str(
            r#"
[metrics]
headline_growth = ["cash"]

[[metrics.ratios]]
name = "cash_share"
numerator = ["cash"]
denominator = ["total_assets"]
"#,
        )
        .unwrap();
        assert_eq!(config.metrics.headline_growth, vec!["cash"]);
        assert_eq!(config.metrics.ratios.len(), 1);
        assert_eq!(config.metrics.ratios[0].name, "cash_share");
    }

    #[test]
    fn toml_rejects_bad_similarity_and_unknown_keys() {
        assert!(from_toml_str::<ParserConfig>("min_label_similarity = 1.5").is_err());
        assert!(from_toml_str::<ParserConfig>("surprise = true").is_err());
    }

    #[test]
    fn json_config_uses_serde_defaults() {
        let config: ParserConfig = serde_json::from_value(json!({
            "periods": { "start": ["Opening"], "end": ["Closing"] }
        }))
        .unwrap();
        assert_eq!(config.periods.start, vec!["Opening"]);
        assert_eq!(config.line_items, ParserConfig::default().line_items);
    }

    #[test]
    fn validate_catches_unusable_entries() {
        let mut config = ParserConfig::default();
        config.line_items.push(LineItemLabels {
            key: "---".to_owned(),
            labels: vec!["Something".to_owned()],
        });
        assert!(config.validate().is_err());

        let mut config = ParserConfig::default();
        config.periods.end = vec!["   ".to_owned()];
        assert!(config.validate().is_err());

        let config = ParserConfig {
            min_label_similarity: 0.0,
            ..ParserConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
