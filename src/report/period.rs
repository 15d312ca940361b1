//! Period extraction: find the figures for one reporting period in raw OCR
//! text.
//!
//! Balance sheets come in two shapes. Either each period has its own section:
//!
//! ```text
//! Beginning of year (01/01/2023)
//! Total assets: 1.000.000.000
//! End of year (31/12/2023)
//! Total assets: 1.200.000.000
//! ```
//!
//! or both periods are columns of one table:
//!
//! ```text
//! Chỉ tiêu            Mã số   Số cuối năm      Số đầu năm
//!                              31/12/2023       01/01/2023
//! Tổng tài sản        270     1.200.000.000    1.000.000.000
//! ```
//!
//! Extraction never fails. A period we can't find yields an empty snapshot.

use std::{collections::BTreeMap, fmt, str::FromStr, sync::LazyLock};

use regex::Regex;
use schemars::JsonSchema;

use super::{
    config::ParserConfig,
    normalize::{
        NumericWord, classify_numeric_word, close_up_parentheses, collapse_separator_spacing,
        find_dates, fold_text, normalize_key, remove_dates, similarity,
    },
};
use crate::prelude::*;

/// Fuzzy caption matching is only attempted for labels at least this long.
/// Short captions are too easy to confuse.
const MIN_FUZZY_LABEL_LEN: usize = 6;

/// How many lines after a column header may hold the column dates.
const COLUMN_DATE_LOOKAHEAD: usize = 3;

/// Noise words around an exact caption match may be at most this long.
const MAX_NOISE_WORD_LEN: usize = 2;

/// Which reporting period to extract.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, JsonSchema, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Period {
    /// Beginning of the year.
    Start,
    /// End of the year.
    End,
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Period::Start => write!(f, "start"),
            Period::End => write!(f, "end"),
        }
    }
}

impl FromStr for Period {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "start" => Ok(Period::Start),
            "end" => Ok(Period::End),
            _ => Err(anyhow!(
                "unknown period {:?} (expected \"start\" or \"end\")",
                s
            )),
        }
    }
}

/// The figures found for one period.
#[derive(Clone, Debug, Default, JsonSchema, PartialEq, Serialize)]
pub struct PeriodSnapshot {
    /// The period's date as `DD/MM/YYYY`, if the document states one.
    date: Option<String>,

    /// Line-item values by normalized key.
    #[serde(rename = "data")]
    values: BTreeMap<String, f64>,
}

impl PeriodSnapshot {
    /// Create a snapshot.
    pub fn new(date: Option<String>, values: BTreeMap<String, f64>) -> Self {
        Self { date, values }
    }

    /// The period's date, if any.
    pub fn date(&self) -> Option<&str> {
        self.date.as_deref()
    }

    /// Line-item values by key.
    pub fn values(&self) -> &BTreeMap<String, f64> {
        &self.values
    }

    /// Look up one line item.
    pub fn value(&self, key: &str) -> Option<f64> {
        self.values.get(key).copied()
    }

    /// Did we find anything at all?
    pub fn is_empty(&self) -> bool {
        self.date.is_none() && self.values.is_empty()
    }
}

/// [`ParserConfig`] folded and sorted for matching against OCR lines.
#[derive(Debug)]
pub struct Vocabulary {
    /// Folded period captions, padded with spaces for whole-word search.
    start_labels: Vec<String>,
    end_labels: Vec<String>,

    /// `(folded caption, key)`, longest caption first.
    line_items: Vec<(String, String)>,

    min_label_similarity: f64,
}

impl Vocabulary {
    /// Build a vocabulary from a configuration.
    pub fn new(config: &ParserConfig) -> Self {
        let padded = |labels: &[String]| {
            let mut labels = labels
                .iter()
                .map(|l| fold_text(l))
                .filter(|l| !l.is_empty())
                .map(|l| format!(" {l} "))
                .collect::<Vec<_>>();
            labels.sort_by(|a, b| b.len().cmp(&a.len()));
            labels.dedup();
            labels
        };

        let mut line_items = config
            .line_items
            .iter()
            .flat_map(|item| {
                let key = normalize_key(&item.key);
                item.labels
                    .iter()
                    .map(move |label| (fold_text(label), key.clone()))
            })
            .filter(|(label, key)| !label.is_empty() && !key.is_empty())
            .collect::<Vec<_>>();
        // Stable, so earlier table entries win ties.
        line_items.sort_by(|a, b| b.0.len().cmp(&a.0.len()));

        Self {
            start_labels: padded(&config.periods.start[..]),
            end_labels: padded(&config.periods.end[..]),
            line_items,
            min_label_similarity: config.min_label_similarity,
        }
    }

    /// Which period captions appear in a folded line, in reading order.
    fn periods_in_line(&self, folded: &str) -> Vec<Period> {
        let padded = format!(" {folded} ");
        let mut found = [
            (Period::Start, &self.start_labels),
            (Period::End, &self.end_labels),
        ]
        .into_iter()
        .filter_map(|(period, labels)| {
            labels
                .iter()
                .filter_map(|label| padded.find(label.as_str()))
                .min()
                .map(|pos| (pos, period))
        })
        .collect::<Vec<_>>();
        found.sort_by_key(|(pos, _)| *pos);
        found.into_iter().map(|(_, period)| period).collect()
    }

    /// The periods a line is a header for. A line that mentions a period but
    /// also carries figures, like `Cash at end of year 50 40`, is a data row.
    fn header_periods(&self, line: &str) -> Vec<Period> {
        let periods = self.periods_in_line(&fold_text(line));
        if !periods.is_empty() && holds_figures(line) {
            trace!(line, "Period caption inside a data row");
            return vec![];
        }
        periods
    }

    /// Map a folded row label to a line-item key.
    fn match_line_item(&self, folded: &str) -> Option<&str> {
        if folded.is_empty() {
            return None;
        }
        let words = folded.split(' ').collect::<Vec<_>>();
        for (label, key) in &self.line_items {
            if exact_match_with_noise(&words, label) {
                return Some(key.as_str());
            }
        }

        if folded.len() < MIN_FUZZY_LABEL_LEN {
            return None;
        }
        let mut best: Option<(f64, &str)> = None;
        for (label, key) in &self.line_items {
            let score = similarity(folded, label);
            if score >= self.min_label_similarity
                && best.is_none_or(|(best_score, _)| score > best_score)
            {
                best = Some((score, key.as_str()));
            }
        }
        if let Some((score, key)) = best {
            trace!(label = folded, key, score, "Fuzzy caption match");
        }
        best.map(|(_, key)| key)
    }
}

/// Does `label` occur as a whole-word sequence in `words`, with only short
/// noise words around it?
fn exact_match_with_noise(words: &[&str], label: &str) -> bool {
    let label_words = label.split(' ').collect::<Vec<_>>();
    if label_words.len() > words.len() {
        return false;
    }
    (0..=words.len() - label_words.len()).any(|start| {
        let end = start + label_words.len();
        words[start..end] == label_words[..]
            && words[..start]
                .iter()
                .chain(&words[end..])
                .all(|w| w.len() <= MAX_NOISE_WORD_LEN)
    })
}

/// A bare year, which headers like `Số cuối năm 2023` may carry.
static YEAR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\(?(?:19|20)\d{2}\)?$").expect("failed to compile regex")
});

/// Does a line hold figures, not counting dates and bare years?
fn holds_figures(line: &str) -> bool {
    tidy_numbers(&remove_dates(strip_enumerator(line)))
        .split_whitespace()
        .any(|word| {
            matches!(
                classify_numeric_word(word),
                Some(NumericWord::Amount(_) | NumericWord::Malformed)
            ) && !YEAR_RE.is_match(word.trim_end_matches([':', ';']))
        })
}

/// Undo OCR spacing inside figures: `1. 000` and `( 500.000 )`.
fn tidy_numbers(line: &str) -> String {
    close_up_parentheses(&collapse_separator_spacing(line))
}

/// How the target period is laid out.
#[derive(Clone, Copy, Debug, PartialEq)]
enum Layout {
    /// The period has its own section; rows hold one value.
    Section,
    /// The period is column `index` of `count` value columns.
    Columns { index: usize, count: usize },
}

/// Leading enumerators: `I.`, `IV.`, `1.`, `1.2.`, `a)`, bullets.
static ENUMERATOR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:(?:[IVXivx]+|[A-Za-z]|\d{1,2}(?:\.\d{1,2})*)[.)]|[-•*+·–—])\s*")
        .expect("failed to compile regex")
});

/// Strip an enumerator, but only when a caption follows it.
fn strip_enumerator(line: &str) -> &str {
    if let Some(m) = ENUMERATOR_RE.find(line) {
        let rest = &line[m.end()..];
        if rest.chars().next().is_some_and(char::is_alphabetic) {
            return rest;
        }
    }
    line
}

/// One table row, split into its caption and its numeric cells.
#[derive(Debug)]
struct Row {
    /// Folded caption.
    label: String,
    /// Numeric words after the caption, in order.
    cells: Vec<NumericWord>,
}

impl Row {
    fn parse(line: &str) -> Self {
        let line = tidy_numbers(strip_enumerator(line));
        let mut label_words = vec![];
        let mut cells = vec![];
        for word in line.split_whitespace() {
            match classify_numeric_word(word) {
                Some(cell) => cells.push(cell),
                None if cells.is_empty() => label_words.push(word),
                // Text after the first number (units, notes) isn't a caption.
                None => {}
            }
        }
        Self {
            label: fold_text(&label_words.join(" ")),
            cells,
        }
    }

    /// The value this row holds for the target period.
    ///
    /// A section row holds one figure, so a lone minus right before its last
    /// cell is that figure's sign. In a table it is an empty cell.
    fn value(&self, layout: Layout) -> Option<f64> {
        match layout {
            Layout::Section => {
                let (last, rest) = self.cells.split_last()?;
                let value = last.amount()?;
                match rest.last() {
                    Some(NumericWord::Minus) => Some(-value),
                    _ => Some(value),
                }
            }
            Layout::Columns { index, count } => {
                if self.cells.len() < count {
                    trace!(
                        cells = self.cells.len(),
                        columns = count,
                        "Row has fewer cells than columns"
                    );
                    return None;
                }
                self.cells[self.cells.len() - count + index].amount()
            }
        }
    }
}

/// Extract one period's date and line items from OCR text.
#[instrument(level = "debug", skip_all, fields(period = %period))]
pub fn extract_period(text: &str, period: Period, vocabulary: &Vocabulary) -> PeriodSnapshot {
    let lines = text.lines().collect::<Vec<_>>();

    // The first header mentioning our period decides the layout.
    let Some((header_idx, columns)) = lines.iter().enumerate().find_map(|(idx, line)| {
        let periods = vocabulary.header_periods(line);
        periods.contains(&period).then_some((idx, periods))
    }) else {
        debug!("No header for period");
        return PeriodSnapshot::default();
    };
    let layout = match columns.iter().position(|p| *p == period) {
        Some(index) if columns.len() > 1 => Layout::Columns {
            index,
            count: columns.len(),
        },
        _ => Layout::Section,
    };
    debug!(header_line = header_idx + 1, ?layout, "Found period header");

    // The region ends at a header for some other set of periods. Repeats of
    // our own header are skipped.
    let mut region = vec![];
    for line in &lines[header_idx + 1..] {
        let periods = vocabulary.header_periods(line);
        if periods.is_empty() {
            region.push(*line);
        } else if periods != columns {
            break;
        }
    }

    let header = lines[header_idx];
    let date = match layout {
        Layout::Section => std::iter::once(header)
            .chain(region.iter().copied())
            .find_map(|line| find_dates(line).into_iter().next()),
        Layout::Columns { index, count } => std::iter::once(header)
            .chain(region.iter().copied().take(COLUMN_DATE_LOOKAHEAD))
            .map(find_dates)
            .find(|dates| dates.len() == count)
            .map(|mut dates| dates.swap_remove(index)),
    };

    let mut values = BTreeMap::new();
    let mut pending_key: Option<&str> = None;
    for line in region {
        let row = Row::parse(line);
        let key = match vocabulary.match_line_item(&row.label) {
            Some(key) => Some(key),
            None if row.label.is_empty() => pending_key,
            None => None,
        };
        pending_key = None;
        let Some(key) = key else {
            continue;
        };
        if row.cells.is_empty() {
            // The caption wrapped; the numbers are on the next line.
            pending_key = Some(key);
            continue;
        }
        if let Some(value) = row.value(layout) {
            trace!(key, value, "Line item");
            values.entry(key.to_owned()).or_insert(value);
        }
    }

    debug!(?date, items = values.len(), "Extracted period");
    PeriodSnapshot::new(date, values)
}
