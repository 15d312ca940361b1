//! Comparative metrics derived from two period snapshots.
//!
//! Nothing here fails. A metric whose inputs are missing, or whose result
//! would divide by zero or overflow, is simply left out.

use std::collections::BTreeMap;

use super::{config::MetricCatalog, period::PeriodSnapshot};
use crate::prelude::*;

/// Name of the headline growth metric.
pub const HEADLINE_GROWTH: &str = "growth_rate";

/// Prefix for per-line-item growth metrics.
const GROWTH_PREFIX: &str = "growth_rate_";

/// `(end - start) / start`, or `None` if that isn't a finite number.
pub fn growth_rate(start: f64, end: f64) -> Option<f64> {
    if start == 0.0 {
        return None;
    }
    finite((end - start) / start)
}

fn ratio(numerator: f64, denominator: f64) -> Option<f64> {
    if denominator == 0.0 {
        return None;
    }
    finite(numerator / denominator)
}

fn finite(value: f64) -> Option<f64> {
    value.is_finite().then_some(value)
}

/// The first key from `candidates` that has a value in `snapshot`.
fn first_value(snapshot: &PeriodSnapshot, candidates: &[String]) -> Option<f64> {
    candidates.iter().find_map(|key| snapshot.value(key))
}

/// Compute every metric the catalog allows for these snapshots.
///
/// - `growth_rate_<key>` for each key present in both periods.
/// - `growth_rate` for the first computable headline key.
/// - `<ratio>_start` and `<ratio>_end` for each catalog ratio.
pub fn calculate_metrics(
    start: &PeriodSnapshot,
    end: &PeriodSnapshot,
    catalog: &MetricCatalog,
) -> BTreeMap<String, f64> {
    let mut metrics = BTreeMap::new();

    for (key, &start_value) in start.values() {
        let Some(end_value) = end.value(key) else {
            continue;
        };
        match growth_rate(start_value, end_value) {
            Some(rate) => {
                metrics.insert(format!("{GROWTH_PREFIX}{key}"), rate);
            }
            None => trace!(key, start_value, end_value, "Growth rate not computable"),
        }
    }

    if let Some(rate) = catalog
        .headline_growth
        .iter()
        .find_map(|key| metrics.get(&format!("{GROWTH_PREFIX}{key}")).copied())
    {
        metrics.insert(HEADLINE_GROWTH.to_owned(), rate);
    }

    for metric in &catalog.ratios {
        for (suffix, snapshot) in [("start", start), ("end", end)] {
            let value = first_value(snapshot, &metric.numerator)
                .zip(first_value(snapshot, &metric.denominator))
                .and_then(|(n, d)| ratio(n, d));
            if let Some(value) = value {
                metrics.insert(format!("{}_{suffix}", metric.name), value);
            }
        }
    }

    debug!(count = metrics.len(), "Calculated metrics");
    metrics
}
