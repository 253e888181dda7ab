//! Deterministic parsing of time expressions and numeric text
//!
//! Everything in this module is pure: the same input and the same `today`
//! produce the same output on every call. The language model never computes
//! dates, amounts or limits; the values it would have to guess are derived
//! here before any SQL is built.
//!
//! Quarter boundaries are calendar quarters (Q1 = Jan-Mar through Q4 =
//! Oct-Dec) with inclusive end dates. "Last/next N months" is exact
//! calendar-month arithmetic, not a thirty-day approximation. Expressions
//! with no recognizable time content return `None` so that no default
//! window is ever invented.

use chrono::{Datelike, Days, Months, NaiveDate};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::model::DateRange;

// =============================================================================
// PATTERN TABLES
// =============================================================================

/// Written numbers normalized to digits before any numeric extraction.
static WRITTEN_NUMBERS: &[(&str, &str)] = &[
    ("one", "1"),
    ("two", "2"),
    ("three", "3"),
    ("four", "4"),
    ("five", "5"),
    ("six", "6"),
    ("seven", "7"),
    ("eight", "8"),
    ("nine", "9"),
    ("ten", "10"),
    ("eleven", "11"),
    ("twelve", "12"),
    ("thirteen", "13"),
    ("fourteen", "14"),
    ("fifteen", "15"),
    ("sixteen", "16"),
    ("seventeen", "17"),
    ("eighteen", "18"),
    ("nineteen", "19"),
    ("twenty", "20"),
    ("thirty", "30"),
    ("forty", "40"),
    ("fifty", "50"),
    ("sixty", "60"),
    ("seventy", "70"),
    ("eighty", "80"),
    ("ninety", "90"),
];

static WRITTEN_NUMBER_RES: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    WRITTEN_NUMBERS
        .iter()
        .map(|(word, digits)| {
            (
                Regex::new(&format!(r"(?i)\b{}\b", word)).unwrap(),
                *digits,
            )
        })
        .collect()
});

/// Quantity plus unit: "6 months", "2 weeks", "10 days".
static NUMERIC_TIMEFRAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d+)\s*(day|week|month|quarter|year)s?\b").unwrap());

/// Compact quarter form: "q3 2024".
static QUARTER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\bq([1-4])\s*(\d{4})\b").unwrap());

/// Spelled quarter form: "third quarter 2024", "3rd quarter of 2024".
static QUARTER_WORD_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(first|1st|second|2nd|third|3rd|fourth|4th)\s+quarter\s+(?:of\s+)?(\d{4})")
        .unwrap()
});

const MONTH_NAMES: &str = "january|february|march|april|may|june|july|august|september|october|\
november|december|jan|feb|mar|apr|jun|jul|aug|sep|oct|nov|dec";

/// Month range: "between january and march 2026", "from january to march 2024".
static MONTH_RANGE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(?:between|from)\s+([a-z]+)\s+(?:and|to)\s+([a-z]+)\s+(\d{4})").unwrap()
});

/// Named month with a year: "march 2024".
static MONTH_YEAR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(&format!(r"\b({})\s+(\d{{4}})\b", MONTH_NAMES)).unwrap());

/// Named month without a year needs a preposition so that "may" the modal
/// verb does not turn into a date filter.
static MONTH_ONLY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(&format!(r"\b(?:in|during|for)\s+({})\b", MONTH_NAMES)).unwrap());

/// Four-digit years in the 2000s.
static YEAR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(20\d{2})\b").unwrap());

static FEE_MILLION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d+\.?\d*)\s*(?:million|m)(?:\s|$)").unwrap());
static FEE_BILLION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d+\.?\d*)\s*(?:billion|b)(?:\s|$)").unwrap());
static FEE_THOUSAND_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d+\.?\d*)\s*(?:thousand|k)(?:\s|$)").unwrap());
static PLAIN_NUMBER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(\d+\.?\d*)\b").unwrap());

static FEE_BETWEEN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"between\s+\$?(\d+\.?\d*)\s+and\s+\$?(\d+\.?\d*)\s+(million|billion|thousand|m|b|k)")
        .unwrap()
});
static FEE_TO_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\$?(\d+\.?\d*)\s+to\s+\$?(\d+\.?\d*)\s+(million|billion|thousand|m|b|k)").unwrap()
});
static FEE_OVER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:over|above|more than|greater than)\s+\$?(\d+\.?\d*)\s*(million|billion|thousand|m|b|k)?")
        .unwrap()
});
static FEE_UNDER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:under|below|less than)\s+\$?(\d+\.?\d*)\s*(million|billion|thousand|m|b|k)?")
        .unwrap()
});

static LIMIT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:top|first|largest|biggest|smallest)\s+(\d+)").unwrap());

const PAST_WORDS: &[&str] = &["last", "past", "previous", "recent"];
const FUTURE_WORDS: &[&str] = &["next", "coming", "upcoming", "future"];

/// Vague phrases with fixed day windows, negative offsets reaching back.
/// Entries are checked in order, so longer phrases come first.
static VAGUE_WINDOWS: &[(&str, i64, i64)] = &[
    ("near future", 0, 180),
    ("short term", 0, 180),
    ("medium term", 180, 730),
    ("long term", 730, 1825),
    ("little while", 0, 90),
    ("immediately", 0, 30),
    ("recently", -90, 0),
    ("shortly", 0, 60),
    ("soon", 0, 90),
];

// =============================================================================
// TIME RESOLUTION
// =============================================================================

/// Resolve a natural-language time expression to a concrete date range.
///
/// Returns `None` when the text carries no recognizable time reference;
/// callers must not substitute a default window in that case.
pub fn resolve_time_reference(text: &str, today: NaiveDate) -> Option<DateRange> {
    let normalized = normalize_written_numbers(&text.to_lowercase());
    let text = normalized.trim();
    if text.is_empty() {
        return None;
    }

    if let Some((year, quarter)) = extract_quarter(text) {
        return quarter_range(year, quarter);
    }
    if let Some(range) = extract_month_window(text) {
        return Some(range);
    }

    // A bare month name is only a window inside an isolated time phrase; on
    // question text it would collide with place and project names.
    if let Some(caps) = MONTH_ONLY_RE.captures(text) {
        let month = month_number(&caps[1])?;
        return Some(DateRange::new(
            month_start(today.year(), month)?,
            month_end(today.year(), month)?,
        ));
    }

    if let Some(range) = extract_relative_window(text, today) {
        return Some(range);
    }

    if let Some(caps) = YEAR_RE.captures(text) {
        let year: i32 = caps[1].parse().ok()?;
        return year_range(year);
    }

    None
}

/// Explicit quarter with a year: "Q3 2024", "third quarter of 2024".
pub fn extract_quarter(text: &str) -> Option<(i32, u32)> {
    let text = text.to_lowercase();
    if let Some(caps) = QUARTER_RE.captures(&text) {
        let quarter: u32 = caps[1].parse().ok()?;
        let year: i32 = caps[2].parse().ok()?;
        return Some((year, quarter));
    }
    if let Some(caps) = QUARTER_WORD_RE.captures(&text) {
        let quarter = match &caps[1] {
            "first" | "1st" => 1,
            "second" | "2nd" => 2,
            "third" | "3rd" => 3,
            _ => 4,
        };
        let year: i32 = caps[2].parse().ok()?;
        return Some((year, quarter));
    }
    None
}

/// Month window spelled with month names and an explicit year: a span like
/// "between january and march 2026" or a single month like "march 2024".
pub fn extract_month_window(text: &str) -> Option<DateRange> {
    let text = text.to_lowercase();
    if let Some(caps) = MONTH_RANGE_RE.captures(&text) {
        let start_month = month_number(&caps[1]);
        let end_month = month_number(&caps[2]);
        let year: i32 = caps[3].parse().ok()?;
        if let (Some(start_month), Some(end_month)) = (start_month, end_month) {
            return Some(DateRange::new(
                month_start(year, start_month)?,
                month_end(year, end_month)?,
            ));
        }
    }
    if let Some(caps) = MONTH_YEAR_RE.captures(&text) {
        let month = month_number(&caps[1])?;
        let year: i32 = caps[2].parse().ok()?;
        return Some(DateRange::new(
            month_start(year, month)?,
            month_end(year, month)?,
        ));
    }
    None
}

/// Window anchored to today: "last 6 months", "this quarter", "recently".
/// Explicit quarters, named months and bare years are not relative and
/// return `None` here.
pub fn extract_relative_window(text: &str, today: NaiveDate) -> Option<DateRange> {
    let normalized = normalize_written_numbers(&text.to_lowercase());
    let text = normalized.trim();

    if text.contains("year to date") || text.contains("ytd") {
        return Some(DateRange::new(
            NaiveDate::from_ymd_opt(today.year(), 1, 1)?,
            today,
        ));
    }

    // Calendar quarters relative to today. Checked before the generic
    // past/future handling so "last quarter" means the previous calendar
    // quarter, not a trailing ninety-day window.
    if text.contains("this quarter") {
        return shifted_quarter(today, 0);
    }
    if text.contains("last quarter") || text.contains("previous quarter") {
        return shifted_quarter(today, -1);
    }
    if text.contains("next quarter") {
        return shifted_quarter(today, 1);
    }

    if text.contains("this year") {
        return year_range(today.year());
    }

    // Quantity plus unit, direction taken from surrounding words. An
    // expression like "in 6 months" with no direction word reads forward.
    if let Some(caps) = NUMERIC_TIMEFRAME_RE.captures(text) {
        let quantity: u32 = caps[1].parse().ok()?;
        let span = unit_span(quantity, &caps[2]);
        let future = !has_any(text, PAST_WORDS) || has_any(text, FUTURE_WORDS);
        return window(today, span, future);
    }

    // Direction word plus a bare unit: "last year", "coming months".
    let past = has_any(text, PAST_WORDS);
    let future = has_any(text, FUTURE_WORDS);
    if past || future {
        let span = if text.contains("quarter") {
            Some(Span::CalendarMonths(3))
        } else if text.contains("year") {
            Some(Span::CalendarMonths(12))
        } else if text.contains("months") {
            Some(Span::CalendarMonths(6))
        } else if text.contains("month") {
            Some(Span::CalendarMonths(1))
        } else if text.contains("week") {
            Some(Span::WholeDays(7))
        } else {
            None
        };
        if let Some(span) = span {
            return window(today, span, future);
        }
    }

    for (phrase, start_off, end_off) in VAGUE_WINDOWS {
        if text.contains(phrase) {
            return Some(DateRange::new(
                offset_days(today, *start_off)?,
                offset_days(today, *end_off)?,
            ));
        }
    }

    None
}

/// All four-digit years mentioned in the text, first occurrence order.
pub fn extract_years(text: &str) -> Vec<i32> {
    let mut years = Vec::new();
    for caps in YEAR_RE.captures_iter(text) {
        if let Ok(year) = caps[1].parse::<i32>() {
            if !years.contains(&year) {
                years.push(year);
            }
        }
    }
    years
}

/// Replace written numbers ("six") with digits ("6").
pub fn normalize_written_numbers(text: &str) -> String {
    let mut out = text.to_string();
    for (re, digits) in WRITTEN_NUMBER_RES.iter() {
        out = re.replace_all(&out, *digits).into_owned();
    }
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Span {
    WholeDays(u64),
    CalendarMonths(u32),
}

fn unit_span(quantity: u32, unit: &str) -> Span {
    match unit {
        "day" => Span::WholeDays(quantity as u64),
        "week" => Span::WholeDays(quantity as u64 * 7),
        "month" => Span::CalendarMonths(quantity),
        "quarter" => Span::CalendarMonths(quantity.saturating_mul(3)),
        _ => Span::CalendarMonths(quantity.saturating_mul(12)),
    }
}

fn window(today: NaiveDate, span: Span, future: bool) -> Option<DateRange> {
    let other = match (span, future) {
        (Span::WholeDays(d), true) => today.checked_add_days(Days::new(d))?,
        (Span::WholeDays(d), false) => today.checked_sub_days(Days::new(d))?,
        (Span::CalendarMonths(m), true) => today.checked_add_months(Months::new(m))?,
        (Span::CalendarMonths(m), false) => today.checked_sub_months(Months::new(m))?,
    };
    Some(if future {
        DateRange::new(today, other)
    } else {
        DateRange::new(other, today)
    })
}

fn offset_days(today: NaiveDate, offset: i64) -> Option<NaiveDate> {
    if offset >= 0 {
        today.checked_add_days(Days::new(offset as u64))
    } else {
        today.checked_sub_days(Days::new(offset.unsigned_abs()))
    }
}

fn has_any(text: &str, words: &[&str]) -> bool {
    words.iter().any(|w| text.contains(w))
}

fn month_number(name: &str) -> Option<u32> {
    let prefix = name.get(..3)?;
    Some(match prefix {
        "jan" => 1,
        "feb" => 2,
        "mar" => 3,
        "apr" => 4,
        "may" => 5,
        "jun" => 6,
        "jul" => 7,
        "aug" => 8,
        "sep" => 9,
        "oct" => 10,
        "nov" => 11,
        "dec" => 12,
        _ => return None,
    })
}

fn month_start(year: i32, month: u32) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(year, month, 1)
}

fn month_end(year: i32, month: u32) -> Option<NaiveDate> {
    let (next_year, next_month) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    NaiveDate::from_ymd_opt(next_year, next_month, 1)?.pred_opt()
}

/// Calendar quarter window, inclusive of the last day.
pub fn quarter_range(year: i32, quarter: u32) -> Option<DateRange> {
    if !(1..=4).contains(&quarter) {
        return None;
    }
    let start_month = (quarter - 1) * 3 + 1;
    Some(DateRange::new(
        month_start(year, start_month)?,
        month_end(year, start_month + 2)?,
    ))
}

fn year_range(year: i32) -> Option<DateRange> {
    Some(DateRange::new(
        NaiveDate::from_ymd_opt(year, 1, 1)?,
        NaiveDate::from_ymd_opt(year, 12, 31)?,
    ))
}

/// Quarter containing `today` shifted by `offset` quarters.
fn shifted_quarter(today: NaiveDate, offset: i32) -> Option<DateRange> {
    let absolute = today.year() * 4 + (today.month0() / 3) as i32 + offset;
    let year = absolute.div_euclid(4);
    let quarter = absolute.rem_euclid(4) as u32 + 1;
    quarter_range(year, quarter)
}

// =============================================================================
// FEE AND LIMIT PARSING
// =============================================================================

/// Parse a dollar amount: "5 million", "10M", "2.5 billion", "500k",
/// "1,000,000". Returns the amount in plain dollars.
pub fn parse_fee_amount(text: &str) -> Option<f64> {
    let text = text.to_lowercase().replace(',', "");

    for (re, multiplier) in [
        (&*FEE_MILLION_RE, 1_000_000.0),
        (&*FEE_BILLION_RE, 1_000_000_000.0),
        (&*FEE_THOUSAND_RE, 1_000.0),
    ] {
        if let Some(caps) = re.captures(&text) {
            return caps[1].parse::<f64>().ok().map(|v| v * multiplier);
        }
    }

    PLAIN_NUMBER_RE
        .captures(&text)
        .and_then(|caps| caps[1].parse().ok())
}

/// Parse a fee range. Open-ended upper bounds come back as `None`:
/// "over 5 million" is `(5000000.0, None)`, "under 5 million" is
/// `(0.0, Some(5000000.0))`.
pub fn parse_fee_range(text: &str) -> Option<(f64, Option<f64>)> {
    let text = text.to_lowercase().replace(',', "");

    for re in [&*FEE_BETWEEN_RE, &*FEE_TO_RE] {
        if let Some(caps) = re.captures(&text) {
            let multiplier = unit_multiplier(&caps[3]);
            let min: f64 = caps[1].parse().ok()?;
            let max: f64 = caps[2].parse().ok()?;
            return Some((min * multiplier, Some(max * multiplier)));
        }
    }

    if let Some(caps) = FEE_OVER_RE.captures(&text) {
        let multiplier = caps.get(2).map(|m| unit_multiplier(m.as_str())).unwrap_or(1.0);
        let min: f64 = caps[1].parse().ok()?;
        return Some((min * multiplier, None));
    }

    if let Some(caps) = FEE_UNDER_RE.captures(&text) {
        let multiplier = caps.get(2).map(|m| unit_multiplier(m.as_str())).unwrap_or(1.0);
        let max: f64 = caps[1].parse().ok()?;
        return Some((0.0, Some(max * multiplier)));
    }

    None
}

fn unit_multiplier(unit: &str) -> f64 {
    match unit.trim() {
        "million" | "m" => 1_000_000.0,
        "billion" | "b" => 1_000_000_000.0,
        "thousand" | "k" => 1_000.0,
        _ => 1.0,
    }
}

/// Parse a result limit from ranking language: "top 10", "first five".
/// Clamped to at most 500 rows.
pub fn parse_limit(text: &str) -> Option<i64> {
    let text = normalize_written_numbers(&text.to_lowercase());
    let caps = LIMIT_RE.captures(&text)?;
    let n: i64 = caps[1].parse().ok()?;
    if n < 1 {
        return None;
    }
    Some(n.min(500))
}

/// Split a multi-item phrase on "and", "&" and commas. Items are trimmed,
/// case-insensitively deduplicated keeping the first spelling, and capped
/// at five.
pub fn split_items(text: &str) -> Vec<String> {
    let text = text.replace(" and ", ",").replace(" & ", ",").replace('&', ",");

    let mut seen = Vec::new();
    let mut items = Vec::new();
    for raw in text.split(',') {
        let item = raw.trim();
        if item.is_empty() {
            continue;
        }
        let lower = item.to_lowercase();
        if !seen.contains(&lower) {
            seen.push(lower);
            items.push(item.to_string());
        }
        if items.len() == 5 {
            break;
        }
    }
    items
}

// =============================================================================
// TESTS
// =============================================================================


// =============================================================================
// PROPERTY TESTS
// =============================================================================
