// Utility helpers for parsing and formatting.
//
// The source export is hand-maintained, so every parser here is forgiving:
// bad cells become `None` (or NaN at the call site) and never abort a load.
use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime};
use num_format::{Locale, ToFormattedString};

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
    "%d/%m/%Y %H:%M:%S",
    "%d/%m/%Y %H:%M",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d/%m/%Y"];

/// Parse a number written either the plain way (`1234.5`) or the pt-BR way
/// (`1.234,5`). Whichever separator appears last is the decimal one.
///
/// Returns `None` for empty cells and anything containing letters, so words
/// like `NaN` or `inf` in the sheet never sneak in as floats.
pub fn parse_f64_safe(s: Option<&str>) -> Option<f64> {
    let s = s?.trim();
    if s.is_empty() {
        return None;
    }
    if s.chars().any(|c| c.is_ascii_alphabetic()) {
        return None;
    }
    let normalized = match (s.rfind(','), s.rfind('.')) {
        (Some(comma), Some(dot)) if comma > dot => s.replace('.', "").replace(',', "."),
        (Some(_), Some(_)) => s.replace(',', ""),
        (Some(_), None) => s.replace(',', "."),
        _ => s.to_string(),
    };
    normalized.parse::<f64>().ok()
}

/// Same as [`parse_f64_safe`] but maps failures to NaN, which sums skip.
pub fn parse_f64_or_nan(s: Option<&str>) -> f64 {
    parse_f64_safe(s).unwrap_or(f64::NAN)
}

pub fn parse_datetime_safe(s: Option<&str>) -> Option<NaiveDateTime> {
    let s = s?.trim();
    if s.is_empty() {
        return None;
    }
    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt);
        }
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.naive_local());
    }
    parse_date_safe(Some(s)).and_then(|d| d.and_hms_opt(0, 0, 0))
}

pub fn parse_date_safe(s: Option<&str>) -> Option<NaiveDate> {
    let s = s?.trim();
    if s.is_empty() {
        return None;
    }
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
}

/// `YYYY-MM` period a date belongs to.
pub fn competence_of(date: NaiveDate) -> String {
    date.format("%Y-%m").to_string()
}

/// Parse a ledger period (`YYYY/MM`, `YYYY-MM` or any full date) into `YYYY-MM`.
pub fn parse_competence(s: Option<&str>) -> Option<String> {
    let s = s?.trim();
    if s.is_empty() {
        return None;
    }
    // Bare periods have no day; pin them to the first.
    let pinned = format!("{}/01", s.replace('-', "/"));
    if let Ok(d) = NaiveDate::parse_from_str(&pinned, "%Y/%m/%d") {
        return Some(competence_of(d));
    }
    parse_datetime_safe(Some(s)).map(|dt| competence_of(dt.date()))
}

/// Trimmed text cell, `None` when blank.
pub fn clean_text(s: Option<String>) -> Option<String> {
    let s = s?;
    let t = s.trim();
    if t.is_empty() {
        None
    } else {
        Some(t.to_string())
    }
}

/// Sum that ignores NaN cells.
pub fn nan_sum<I>(values: I) -> f64
where
    I: IntoIterator<Item = f64>,
{
    values.into_iter().filter(|v| !v.is_nan()).sum()
}

/// `part / total * 100`, or 0 when there is nothing to divide by.
pub fn pct(part: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        (part as f64 / total as f64) * 100.0
    }
}

pub fn round_to(n: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (n * factor).round() / factor
}

/// Mean of a set of durations, truncated to whole milliseconds.
pub fn mean_duration(values: &[Duration]) -> Option<Duration> {
    if values.is_empty() {
        return None;
    }
    let total: i128 = values.iter().map(|d| d.num_milliseconds() as i128).sum();
    Some(Duration::milliseconds((total / values.len() as i128) as i64))
}

/// `HH:MM:SS`, hours not wrapped at 24.
pub fn format_hms(d: Duration) -> String {
    let s = d.num_seconds();
    format!("{:02}:{:02}:{:02}", s / 3600, (s % 3600) / 60, s % 60)
}

pub fn format_number(n: f64, decimals: usize) -> String {
    // pt-BR layout: `.` groups thousands, `,` separates decimals.
    let neg = n.is_sign_negative() && n != 0.0;
    let s = format!("{:.*}", decimals, n.abs());
    let mut parts = s.split('.');
    let int_part = parts.next().unwrap_or("0");
    let frac_part = parts.next();
    let mut res = match int_part.parse::<u128>() {
        Ok(v) => v.to_formatted_string(&Locale::en).replace(',', "."),
        Err(_) => int_part.to_string(),
    };
    if let Some(frac) = frac_part {
        res.push(',');
        res.push_str(frac);
    }
    if neg {
        format!("-{}", res)
    } else {
        res
    }
}

pub fn format_int<T>(n: T) -> String
where
    T: ToFormattedString,
{
    n.to_formatted_string(&Locale::en).replace(',', ".")
}

pub fn format_brl(n: f64) -> String {
    format!("R$ {}", format_number(n, 1))
}

pub fn format_pct(n: f64) -> String {
    format!("{}%", format_number(n, 1))
}
