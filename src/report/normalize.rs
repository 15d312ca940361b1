//! Text, number and date normalization for noisy OCR output.
//!
//! Everything in here is pure and infallible. Inputs that can't be understood
//! come back as `None`, and callers treat that as "nothing found".

use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;
use unicode_normalization::{UnicodeNormalization as _, char::is_combining_mark};

/// Fold text for matching.
///
/// Diacritics are stripped (including Vietnamese `đ`), letters are lowercased,
/// and every run of characters that isn't an ASCII letter or digit becomes a
/// single space. `"Tổng tài sản:"` folds to `"tong tai san"`.
pub fn fold_text(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut pending_space = false;
    for c in s.nfd() {
        if is_combining_mark(c) {
            continue;
        }
        let c = match c {
            'đ' | 'Đ' => 'd',
            other => other,
        };
        if c.is_ascii_alphanumeric() {
            if pending_space && !out.is_empty() {
                out.push(' ');
            }
            pending_space = false;
            out.push(c.to_ascii_lowercase());
        } else {
            pending_space = true;
        }
    }
    out
}

/// Normalize a caption into a line-item key, e.g. `"Tổng tài sản"` becomes
/// `"tong_tai_san"`.
pub fn normalize_key(s: &str) -> String {
    fold_text(s).replace(' ', "_")
}

/// A whitespace-delimited word that looks like a number.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum NumericWord {
    /// A figure we could parse.
    Amount(f64),
    /// A dash standing in for an empty cell.
    Placeholder,
    /// A lone `-` or `−`. Either an empty cell, or the sign of the next
    /// figure when OCR put a space after it.
    Minus,
    /// Something digit-like that doesn't survive normalization.
    Malformed,
}

impl NumericWord {
    /// The figure, if this is one.
    pub fn amount(self) -> Option<f64> {
        match self {
            NumericWord::Amount(value) => Some(value),
            NumericWord::Placeholder | NumericWord::Minus | NumericWord::Malformed => None,
        }
    }
}

/// Classify one word of an OCR line. Returns `None` for ordinary text.
///
/// Words with an unmatched parenthesis, like the `5)` of `(note 5)`, are
/// text.
pub fn classify_numeric_word(word: &str) -> Option<NumericWord> {
    let word = word.trim_end_matches([':', ';']);
    match word {
        "-" | "−" => return Some(NumericWord::Minus),
        "–" | "—" => return Some(NumericWord::Placeholder),
        _ => {}
    }
    if (word.contains('(') || word.contains(')'))
        && !(word.len() >= 2 && word.starts_with('(') && word.ends_with(')'))
    {
        return None;
    }
    let (_, body) = split_sign(word);
    let mut digits = 0;
    let mut confusables = 0;
    for c in body.chars() {
        if c.is_ascii_digit() {
            digits += 1;
        } else if fix_confusable(c) != c {
            confusables += 1;
        } else if c != '.' && c != ',' {
            return None;
        }
    }
    let starts_like_number = body
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_digit() || fix_confusable(c) != c);
    if digits == 0 || confusables > digits || !starts_like_number {
        return None;
    }
    Some(match parse_amount(word) {
        Some(value) => NumericWord::Amount(value),
        None => NumericWord::Malformed,
    })
}

/// Parse an amount written with either locale convention.
///
/// - `"1.234.567,89"` and `"1,234,567.89"` are both `1234567.89`.
/// - A single separator followed by exactly three digits is a thousands
///   separator (`"500.000"` is `500000`); otherwise it is a decimal marker.
/// - `"(500.000)"` and `"-500.000"` are negative.
/// - `O`/`o` and `I`/`l`/`|` inside the number are read as `0` and `1`.
pub fn parse_amount(raw: &str) -> Option<f64> {
    let compact = raw
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>();
    let (negative, body) = split_sign(&compact);
    let body = body.chars().map(fix_confusable).collect::<String>();
    let canonical = canonical_decimal(&body)?;
    let value = canonical.parse::<f64>().ok()?;
    if !value.is_finite() {
        return None;
    }
    Some(if negative { -value } else { value })
}

/// Strip accounting sign markers, returning `(is_negative, rest)`.
///
/// Only a matched pair of parentheses means "negative". A stray single
/// parenthesis is OCR debris and is dropped.
fn split_sign(s: &str) -> (bool, &str) {
    let parenthesized = s.len() >= 2 && s.starts_with('(') && s.ends_with(')');
    let s = s.trim_start_matches('(').trim_end_matches(')');
    if let Some(rest) = s
        .strip_prefix('-')
        .or_else(|| s.strip_prefix('−'))
        .or_else(|| s.strip_prefix('–'))
    {
        (true, rest)
    } else {
        (parenthesized, s)
    }
}

/// Map characters OCR commonly produces instead of digits.
fn fix_confusable(c: char) -> char {
    match c {
        'O' | 'o' => '0',
        'I' | 'l' | '|' => '1',
        other => other,
    }
}

/// Turn digits with `.`/`,` separators into a string `f64::from_str` accepts.
fn canonical_decimal(s: &str) -> Option<String> {
    if !s.chars().all(|c| c.is_ascii_digit() || c == '.' || c == ',') {
        return None;
    }
    let first = s.chars().next()?;
    let last = s.chars().last()?;
    if !first.is_ascii_digit() || !last.is_ascii_digit() {
        return None;
    }

    match (s.rfind('.'), s.rfind(',')) {
        (None, None) => Some(s.to_owned()),
        (Some(dot), Some(comma)) => {
            let decimal_at = dot.max(comma);
            let thousands = if decimal_at == dot { ',' } else { '.' };
            let integer = join_thousands(&s[..decimal_at], thousands)?;
            let fraction = &s[decimal_at + 1..];
            if fraction.chars().all(|c| c.is_ascii_digit()) {
                Some(format!("{integer}.{fraction}"))
            } else {
                None
            }
        }
        (Some(at), None) | (None, Some(at)) => {
            let separator = if s.as_bytes()[at] == b'.' { '.' } else { ',' };
            let occurrences = s.matches(separator).count();
            let trailing_digits = s.len() - at - 1;
            if occurrences > 1 {
                join_thousands(s, separator)
            } else if trailing_digits == 3 {
                // "1234.567" has a bad thousands group, so read it as a
                // decimal instead.
                join_thousands(s, separator)
                    .or_else(|| Some(format!("{}.{}", &s[..at], &s[at + 1..])))
            } else {
                Some(format!("{}.{}", &s[..at], &s[at + 1..]))
            }
        }
    }
}

/// Remove thousands separators, checking the grouping is plausible.
fn join_thousands(s: &str, separator: char) -> Option<String> {
    let mut out = String::with_capacity(s.len());
    for (idx, group) in s.split(separator).enumerate() {
        let valid = !group.is_empty()
            && group.chars().all(|c| c.is_ascii_digit())
            && if idx == 0 {
                group.len() <= 3
            } else {
                group.len() == 3
            };
        if !valid {
            return None;
        }
        out.push_str(group);
    }
    Some(out)
}

/// Spaces OCR inserts around separators, as in `"1. 000 .000"`. Only matches
/// when there is whitespace to remove.
static SEPARATOR_SPACING_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d)(?:\s+([.,])\s*|([.,])\s+)(\d{3})\b")
        .expect("failed to compile regex")
});

/// Remove whitespace next to `.`/`,` between digit groups, so that
/// `"1. 000. 000"` reads as `"1.000.000"`.
pub fn collapse_separator_spacing(line: &str) -> String {
    let mut current = line.to_owned();
    loop {
        let next = SEPARATOR_SPACING_RE
            .replace_all(&current, "$1$2$3$4")
            .into_owned();
        if next == current {
            return current;
        }
        current = next;
    }
}

/// A figure with spaces inside its parentheses, as in `( 500.000 )`.
static SPACED_PARENTHESES_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\(\s*(\d[\d.,]*)\s*\)").expect("failed to compile regex")
});

/// Close up `( 500.000 )` to `(500.000)`, so the figure stays negative once
/// the line is split into words.
pub fn close_up_parentheses(line: &str) -> String {
    SPACED_PARENTHESES_RE.replace_all(line, "($1)").into_owned()
}

static NUMERIC_DATE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d{1,2})\s?[/.\-]\s?(\d{1,2})\s?[/.\-]\s?(\d{4})")
        .expect("failed to compile regex")
});

/// Vietnamese long form, matched against folded text.
static LONG_DATE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\bngay (\d{1,2}) thang (\d{1,2}) nam (\d{4})\b")
        .expect("failed to compile regex")
});

/// Vietnamese long form in unfolded text. OCR sometimes loses the
/// diacritics.
static RAW_LONG_DATE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)ng[àa]y\s+\d{1,2}\s+th[áa]ng\s+\d{1,2}\s+n[ăa]m\s+\d{4}")
        .expect("failed to compile regex")
});

/// Blank out anything that looks like a date, so its digits aren't mistaken
/// for figures.
pub fn remove_dates(line: &str) -> String {
    let line = NUMERIC_DATE_RE.replace_all(line, " ");
    RAW_LONG_DATE_RE.replace_all(&line, " ").into_owned()
}

/// Find valid day/month/year dates in a line, in order, formatted as
/// `DD/MM/YYYY`.
///
/// Numeric dates (`31/12/2023`, `31.12.2023`, `31-12-2023`) are preferred.
/// If a line has none, the long form `ngày 31 tháng 12 năm 2023` is tried.
pub fn find_dates(line: &str) -> Vec<String> {
    let mut dates = vec![];
    for caps in NUMERIC_DATE_RE.captures_iter(line) {
        let whole = caps.get(0).expect("capture 0 always exists");
        let before = line[..whole.start()].chars().next_back();
        let after = line[whole.end()..].chars().next();
        let glued = |c: Option<char>| {
            c.is_some_and(|c| c.is_ascii_digit() || c == '.' || c == ',')
        };
        if glued(before) || after.is_some_and(|c| c.is_ascii_digit()) {
            continue;
        }
        if let Some(date) = format_date(&caps[1], &caps[2], &caps[3]) {
            dates.push(date);
        }
    }
    if dates.is_empty() {
        let folded = fold_text(line);
        for caps in LONG_DATE_RE.captures_iter(&folded) {
            if let Some(date) = format_date(&caps[1], &caps[2], &caps[3]) {
                dates.push(date);
            }
        }
    }
    dates
}

/// Validate a day/month/year triple and format it.
fn format_date(day: &str, month: &str, year: &str) -> Option<String> {
    let day = day.parse::<u32>().ok()?;
    let month = month.parse::<u32>().ok()?;
    let year = year.parse::<i32>().ok()?;
    NaiveDate::from_ymd_opt(year, month, day)?;
    Some(format!("{day:02}/{month:02}/{year:04}"))
}

/// Similarity between two strings as `1 - levenshtein / longest_length`.
pub fn similarity(a: &str, b: &str) -> f64 {
    let a = a.chars().collect::<Vec<_>>();
    let b = b.chars().collect::<Vec<_>>();
    let longest = a.len().max(b.len());
    if longest == 0 {
        return 1.0;
    }

    let mut prev = (0..=b.len()).collect::<Vec<_>>();
    let mut curr = vec![0; b.len() + 1];
    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        prev.clone_from(&curr);
    }
    1.0 - prev[b.len()] as f64 / longest as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fold_text_strips_vietnamese_diacritics() {
        assert_eq!(fold_text("Tổng tài sản:"), "tong tai san");
        assert_eq!(fold_text("  NỢ PHẢI TRẢ  (300)"), "no phai tra 300");
        assert_eq!(fold_text("Đầu năm"), "dau nam");
        assert_eq!(fold_text("Owner's equity"), "owner s equity");
        assert_eq!(fold_text("***"), "");
    }

    #[test]
    fn normalize_key_uses_underscores() {
        assert_eq!(normalize_key("Tổng tài sản"), "tong_tai_san");
        assert_eq!(normalize_key("Total assets"), "total_assets");
        assert_eq!(normalize_key("  Vốn chủ sở hữu "), "von_chu_so_huu");
    }

    #[test]
    fn both_locale_conventions_parse_the_same() {
        assert_eq!(parse_amount("1.234.567,89"), Some(1234567.89));
        assert_eq!(parse_amount("1,234,567.89"), Some(1234567.89));
    }

    #[test]
    fn parenthesized_amounts_are_negative() {
        assert_eq!(parse_amount("(500.000)"), Some(-500000.0));
        assert_eq!(parse_amount("-1.250"), Some(-1250.0));
        assert_eq!(parse_amount("−42,5"), Some(-42.5));
    }

    #[test]
    fn single_separator_rules() {
        assert_eq!(parse_amount("500.000"), Some(500000.0));
        assert_eq!(parse_amount("1,234"), Some(1234.0));
        assert_eq!(parse_amount("12,5"), Some(12.5));
        assert_eq!(parse_amount("0.25"), Some(0.25));
        assert_eq!(parse_amount("1234.567"), Some(1234.567));
        assert_eq!(parse_amount("1000000000"), Some(1_000_000_000.0));
    }

    #[test]
    fn ocr_confusables_are_repaired() {
        assert_eq!(parse_amount("1.OOO.000"), Some(1_000_000.0));
        assert_eq!(parse_amount("l2.500"), Some(12500.0));
        assert_eq!(parse_amount("1 . 000 . 000"), Some(1_000_000.0));
    }

    #[test]
    fn malformed_amounts_are_rejected() {
        assert_eq!(parse_amount("1.000.00"), None);
        assert_eq!(parse_amount("1.2345.678"), None);
        assert_eq!(parse_amount("1.000,000,5"), None);
        assert_eq!(parse_amount("."), None);
        assert_eq!(parse_amount(""), None);
        assert_eq!(parse_amount("abc"), None);
    }

    #[test]
    fn classify_numeric_words() {
        assert_eq!(
            classify_numeric_word("1.000.000:"),
            Some(NumericWord::Amount(1_000_000.0))
        );
        assert_eq!(classify_numeric_word("-"), Some(NumericWord::Minus));
        assert_eq!(classify_numeric_word("–"), Some(NumericWord::Placeholder));
        assert_eq!(
            classify_numeric_word("(500.000)"),
            Some(NumericWord::Amount(-500_000.0))
        );
        assert_eq!(
            classify_numeric_word("1.000.00"),
            Some(NumericWord::Malformed)
        );
        assert_eq!(classify_numeric_word("assets:"), None);
        assert_eq!(classify_numeric_word("Total"), None);
        assert_eq!(classify_numeric_word("V.1"), None);
        assert_eq!(classify_numeric_word("31/12/2023"), None);
        assert_eq!(classify_numeric_word("Il"), None);
    }

    #[test]
    fn unmatched_parentheses_are_text() {
        assert_eq!(classify_numeric_word("5)"), None);
        assert_eq!(classify_numeric_word("(5"), None);
        assert_eq!(classify_numeric_word("(note"), None);
        assert_eq!(classify_numeric_word("("), None);
    }

    #[test]
    fn spaced_parentheses_are_closed_up() {
        assert_eq!(
            close_up_parentheses("Lỗ ( 500.000 ) ( 1.250 )"),
            "Lỗ (500.000) (1.250)"
        );
        assert_eq!(close_up_parentheses("(note 5)"), "(note 5)");
    }

    #[test]
    fn dates_are_removed() {
        assert_eq!(remove_dates("Số cuối năm 31/12/2023").trim(), "Số cuối năm");
        assert_eq!(
            remove_dates("Cuối năm (ngày 31 tháng 12 năm 2023)"),
            "Cuối năm ( )"
        );
        assert_eq!(remove_dates("Tiền 1.000.000"), "Tiền 1.000.000");
    }

    #[test]
    fn separator_spacing_is_collapsed() {
        assert_eq!(
            collapse_separator_spacing("Tiền 1. 000 .000 2.500"),
            "Tiền 1.000.000 2.500"
        );
        assert_eq!(collapse_separator_spacing("no numbers"), "no numbers");
    }

    #[test]
    fn find_dates_in_numeric_and_long_forms() {
        assert_eq!(
            find_dates("Số đầu năm 01/01/2023 Số cuối năm 31.12.2023"),
            vec!["01/01/2023", "31/12/2023"]
        );
        assert_eq!(find_dates("as at 1-1-2023"), vec!["01/01/2023"]);
        assert_eq!(
            find_dates("Tại ngày 31 tháng 12 năm 2023"),
            vec!["31/12/2023"]
        );
        assert!(find_dates("32/13/2023").is_empty());
        assert!(find_dates("Total assets: 1.000.000.000").is_empty());
        assert!(find_dates("").is_empty());
    }

    #[test]
    fn similarity_is_normalized() {
        assert_eq!(similarity("tong tai san", "tong tai san"), 1.0);
        assert!(similarity("tong tal san", "tong tai san") > 0.9);
        assert!(similarity("no phai tra", "von chu so huu") < 0.5);
        assert_eq!(similarity("", ""), 1.0);
    }
}
