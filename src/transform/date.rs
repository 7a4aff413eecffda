//! Date normalization.

use chrono::{Duration, NaiveDate};

use crate::error::TransformError;

/// Tokens that exports use for "no date".
const PLACEHOLDERS: &[&str] = &["0", "-", "null", "n/a", "00.00.0000", "0000-00-00"];

/// Largest serial a spreadsheet date can hold (9999-12-31).
const MAX_SERIAL: f64 = 2_958_465.0;

/// Converts ISO, dotted/slashed/dashed European and spreadsheet serial dates to a calendar date.
#[derive(Debug, Clone, Copy, Default)]
pub struct DateTransformer;

impl DateTransformer {
    /// Parse `raw` into a date. Empty input and placeholder tokens yield `Ok(None)`.
    ///
    /// Accepted shapes:
    /// - `yyyy-mm-dd` (optionally followed by a time after a space or `T`)
    /// - `dd.mm.yyyy`, `dd/mm/yyyy`, `dd-mm-yyyy`, single-digit parts, two-digit years,
    ///   a trailing dot (`15.01.2025.`)
    /// - `mm.yyyy` (first day of the month)
    /// - spreadsheet serials (`45672`, `45672.5`)
    pub fn transform(&self, raw: &str) -> Result<Option<NaiveDate>, TransformError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() || PLACEHOLDERS.contains(&trimmed.to_lowercase().as_str()) {
            return Ok(None);
        }

        let invalid = || TransformError::InvalidDate {
            raw: raw.to_string(),
        };

        // Drop any time-of-day part.
        let date_part = trimmed
            .split(|c: char| c == 'T' || c.is_whitespace())
            .next()
            .unwrap_or(trimmed)
            .trim_end_matches('.');

        if let Some(date) = parse_serial(date_part) {
            return Ok(Some(date));
        }

        let parts: Vec<&str> = date_part.split(['.', '/', '-']).collect();
        if parts.iter().any(|p| p.is_empty() || !p.bytes().all(|b| b.is_ascii_digit())) {
            return Err(invalid());
        }

        let date = match parts.as_slice() {
            [y, m, d] if y.len() == 4 => ymd(y, m, d),
            [d, m, y] if y.len() == 4 || y.len() == 2 => ymd(y, m, d),
            [m, y] if y.len() == 4 && m.len() <= 2 => ymd(y, m, "1"),
            _ => None,
        };
        date.map(Some).ok_or_else(invalid)
    }

    /// Convert a spreadsheet serial day number (1900 date system) to a date.
    pub fn from_serial(&self, serial: f64) -> Result<NaiveDate, TransformError> {
        serial_to_date(serial).ok_or_else(|| TransformError::InvalidDate {
            raw: serial.to_string(),
        })
    }

    /// Render an ISO date back into a local pattern such as `%d.%m.%Y`.
    pub fn reverse(&self, date: NaiveDate, pattern: &str) -> String {
        date.format(pattern).to_string()
    }
}

fn ymd(y: &str, m: &str, d: &str) -> Option<NaiveDate> {
    let mut year: i32 = y.parse().ok()?;
    if y.len() == 2 {
        year += if year < 70 { 2000 } else { 1900 };
    }
    if m.len() > 2 || d.len() > 2 {
        return None;
    }
    NaiveDate::from_ymd_opt(year, m.parse().ok()?, d.parse().ok()?)
}

fn parse_serial(s: &str) -> Option<NaiveDate> {
    // Plain digit runs of 5+ characters, or with a fractional time part.
    let (int_part, frac_part) = s.split_once('.').unwrap_or((s, ""));
    if int_part.len() < 5 || !int_part.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    if !frac_part.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    // `dd.mm.yyyy` never has a 5-digit first part, so this does not shadow dotted dates.
    serial_to_date(s.parse().ok()?)
}

pub(crate) fn serial_to_date(serial: f64) -> Option<NaiveDate> {
    if !serial.is_finite() || serial < 1.0 || serial > MAX_SERIAL {
        return None;
    }
    // 1899-12-30 absorbs the phantom 1900-02-29 for every serial from 61 on.
    let base = NaiveDate::from_ymd_opt(1899, 12, 30)?;
    let days = serial.trunc() as i64;
    let days = if days < 61 { days + 1 } else { days };
    base.checked_add_signed(Duration::days(days))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn iso(raw: &str) -> Option<String> {
        DateTransformer
            .transform(raw)
            .unwrap()
            .map(|d| d.format("%Y-%m-%d").to_string())
    }

    #[test]
    fn accepts_common_shapes() {
        for raw in ["15.01.2025", "15/01/2025", "2025-01-15", "15-01-2025", "15.1.2025"] {
            assert_eq!(iso(raw).as_deref(), Some("2025-01-15"), "{raw}");
        }
    }

    #[test]
    fn accepts_trailing_dot_time_and_short_year() {
        assert_eq!(iso("15.01.2025.").as_deref(), Some("2025-01-15"));
        assert_eq!(iso("2025-01-15 10:30:00").as_deref(), Some("2025-01-15"));
        assert_eq!(iso("2025-01-15T10:30:00").as_deref(), Some("2025-01-15"));
        assert_eq!(iso("31.12.23").as_deref(), Some("2023-12-31"));
        assert_eq!(iso("01.01.85").as_deref(), Some("1985-01-01"));
    }

    #[test]
    fn month_year_partial_is_first_of_month() {
        assert_eq!(iso("12.2023").as_deref(), Some("2023-12-01"));
    }

    #[test]
    fn spreadsheet_serials() {
        assert_eq!(iso("45672").as_deref(), Some("2025-01-15"));
        assert_eq!(iso("45672.75").as_deref(), Some("2025-01-15"));
        assert_eq!(
            DateTransformer.from_serial(1.0).unwrap(),
            NaiveDate::from_ymd_opt(1900, 1, 1).unwrap()
        );
        assert_eq!(
            DateTransformer.from_serial(61.0).unwrap(),
            NaiveDate::from_ymd_opt(1900, 3, 1).unwrap()
        );
    }

    #[test]
    fn placeholders_are_empty() {
        assert_eq!(iso(""), None);
        assert_eq!(iso("00.00.0000"), None);
        assert_eq!(iso("NULL"), None);
    }

    #[test]
    fn rejects_garbage() {
        assert!(DateTransformer.transform("not-a-date").is_err());
        assert!(DateTransformer.transform("31.02.2025").is_err());
        assert!(DateTransformer.transform("2025/13").is_err());
    }

    #[test]
    fn reverse_formats_dotted() {
        let d = NaiveDate::from_ymd_opt(2025, 1, 15).unwrap();
        assert_eq!(DateTransformer.reverse(d, "%d.%m.%Y"), "15.01.2025");
    }
}
