// Utility helpers for cell coercion and presentation formatting.
//
// This module centralizes all the "dirty" CSV/number/date handling so the
// rest of the code can assume clean, typed values. Formatting lives here too
// because rounding is a presentation concern only.
use chrono::NaiveDate;
use num_format::{Locale, ToFormattedString};
use once_cell::sync::Lazy;
use regex::Regex;

/// Placeholder rendered for undefined values ("no data", not zero).
pub const NO_DATA: &str = "—";

static TIME_OF_DAY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:^|[^0-9])(\d{1,2}):(\d{2})").expect("valid time-of-day regex"));

/// Parse a cell into `f64` while being forgiving about the formatting found
/// in POS/payroll exports.
///
/// - Strips `$`, `,` thousands separators, `%` and any whitespace.
/// - Returns `None` for empty or unparseable input and for non-finite results
///   such as `inf` or `NaN`.
pub fn parse_number(s: Option<&str>) -> Option<f64> {
    let cleaned: String = s?
        .chars()
        .filter(|c| !matches!(c, '$' | ',' | '%') && !c.is_whitespace())
        .collect();
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Like [`parse_number`] but unparseable cells count as 0.
pub fn coerce_number(s: Option<&str>) -> f64 {
    parse_number(s).unwrap_or(0.0)
}

/// Header key used for case/whitespace-insensitive column matching.
pub fn normalize_header(s: &str) -> String {
    s.chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Hour of day from an explicit `Hour` cell: a whole number 0-23.
/// Fractional hours are rejected rather than rounded.
pub fn parse_hour(s: Option<&str>) -> Option<u32> {
    let v = s?.trim();
    if v.is_empty() {
        return None;
    }
    let n = v.parse::<f64>().ok()?;
    if n.fract() == 0.0 && (0.0..=23.0).contains(&n) {
        Some(n as u32)
    } else {
        None
    }
}

/// Hour of day from the first `H:MM`/`HH:MM` substring of a date/time cell.
pub fn extract_hour(s: Option<&str>) -> Option<u32> {
    let caps = TIME_OF_DAY.captures(s?)?;
    let hour = caps.get(1)?.as_str().parse::<u32>().ok()?;
    (hour <= 23).then_some(hour)
}

/// Parse the date part of a `Date` cell. Accepts ISO (`2024-03-01`, with or
/// without a trailing time) and US-style `03/01/2024`.
pub fn parse_date_safe(s: Option<&str>) -> Option<NaiveDate> {
    let s = s?.trim();
    let date_part = s.split(['T', ' ']).next().unwrap_or("");
    if date_part.is_empty() {
        return None;
    }
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(date_part, "%m/%d/%Y"))
        .ok()
}

pub fn format_number(n: f64, decimals: usize) -> String {
    // Fixed decimals plus locale-aware thousands separators (`1,234,567.89`).
    let neg = n.is_sign_negative() && n != 0.0;
    let s = format!("{:.*}", decimals, n.abs());
    let mut parts = s.split('.');
    let int_part = parts.next().unwrap_or("0");
    let frac_part = parts.next();
    let int_val: i64 = int_part.parse().unwrap_or(0);
    let mut res = int_val.to_formatted_string(&Locale::en);
    if let Some(frac) = frac_part {
        res.push('.');
        res.push_str(frac);
    }
    if neg && res.chars().any(|c| c.is_ascii_digit() && c != '0') {
        format!("-{}", res)
    } else {
        res
    }
}

pub fn format_int<T>(n: T) -> String
where
    T: ToFormattedString,
{
    n.to_formatted_string(&Locale::en)
}

/// `$1,234.56`, or [`NO_DATA`] when undefined.
pub fn format_money(n: Option<f64>) -> String {
    match n {
        Some(v) if v.is_finite() => {
            let body = format_number(v.abs(), 2);
            if v < 0.0 && body != "0.00" {
                format!("-${}", body)
            } else {
                format!("${}", body)
            }
        }
        _ => NO_DATA.to_string(),
    }
}

/// A fraction rendered as a percentage (`0.2571` -> `25.7%` at 1 decimal).
pub fn format_pct(n: Option<f64>, decimals: usize) -> String {
    match n {
        Some(v) if v.is_finite() => format!("{}%", format_number(v * 100.0, decimals)),
        _ => NO_DATA.to_string(),
    }
}
