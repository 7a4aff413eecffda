//! Locale-aware decimal normalization.

use crate::config::AmbiguousGrouping;
use crate::error::TransformError;

/// Tokens that exports use for "no amount".
const PLACEHOLDERS: &[&str] = &["-", "n/a", "#n/a", "null", "none"];

/// Currency markers stripped before parsing, longest first.
const CURRENCY_MARKERS: &[&str] = &["денари", "ден.", "ден", "mkd", "eur", "usd", "€", "$", "£", "¥"];

/// Converts comma- or dot-decimal strings, with or without grouping, to `f64`.
///
/// Separator rules:
/// - both `.` and `,` present: the last one is the decimal point, the other groups thousands
/// - one separator kind repeated: every occurrence groups thousands
/// - one separator occurring once: decimal point, except that exactly three trailing digits
///   follow [`AmbiguousGrouping`]
///
/// Every thousands group must hold exactly three digits.
#[derive(Debug, Clone, Copy, Default)]
pub struct DecimalTransformer {
    grouping: AmbiguousGrouping,
}

impl DecimalTransformer {
    pub fn new(grouping: AmbiguousGrouping) -> Self {
        Self { grouping }
    }

    /// Parse `raw`. Empty input and placeholder tokens yield `Ok(None)`.
    pub fn transform(&self, raw: &str) -> Result<Option<f64>, TransformError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() || PLACEHOLDERS.contains(&trimmed.to_lowercase().as_str()) {
            return Ok(None);
        }
        let invalid = || TransformError::InvalidDecimal {
            raw: raw.to_string(),
        };

        let (negative, body) = strip_sign(&strip_decorations(trimmed));
        if body.is_empty() || !body.chars().all(|c| c.is_ascii_digit() || c == '.' || c == ',') {
            return Err(invalid());
        }
        if !body.chars().any(|c| c.is_ascii_digit()) {
            return Err(invalid());
        }

        let canonical = self.canonicalize(&body).ok_or_else(invalid)?;
        let value: f64 = canonical.parse().map_err(|_| invalid())?;
        if !value.is_finite() {
            return Err(invalid());
        }
        Ok(Some(if negative { -value } else { value }))
    }

    /// Render `value` in European form (`1.234,56`) with `decimals` fraction digits.
    pub fn reverse(&self, value: f64, decimals: usize) -> String {
        let formatted = format!("{:.*}", decimals, value.abs());
        let (int_part, frac_part) = formatted.split_once('.').unwrap_or((&formatted, ""));

        let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
        for (i, c) in int_part.chars().enumerate() {
            if i > 0 && (int_part.len() - i) % 3 == 0 {
                grouped.push('.');
            }
            grouped.push(c);
        }

        let sign = if value < 0.0 { "-" } else { "" };
        if frac_part.is_empty() {
            format!("{sign}{grouped}")
        } else {
            format!("{sign}{grouped},{frac_part}")
        }
    }

    /// Rewrite a digits-and-separators string into `1234.56` form.
    fn canonicalize(&self, body: &str) -> Option<String> {
        let last_dot = body.rfind('.');
        let last_comma = body.rfind(',');

        let (decimal_sep, group_sep) = match (last_dot, last_comma) {
            (None, None) => return Some(body.to_string()),
            (Some(d), Some(c)) => {
                if d > c {
                    (Some('.'), Some(','))
                } else {
                    (Some(','), Some('.'))
                }
            }
            (Some(_), None) => self.single_kind(body, '.'),
            (None, Some(_)) => self.single_kind(body, ','),
        };

        let (int_part, frac_part) = match decimal_sep {
            Some(sep) => {
                let idx = body.rfind(sep)?;
                (&body[..idx], Some(&body[idx + 1..]))
            }
            None => (body, None),
        };
        if let Some(frac) = frac_part {
            if frac.is_empty() || frac.contains(['.', ',']) {
                return None;
            }
        }

        let digits = match group_sep {
            Some(sep) => ungroup(int_part, sep)?,
            None => int_part.to_string(),
        };
        if digits.contains(['.', ',']) {
            return None;
        }

        let int_digits = if digits.is_empty() { "0".to_string() } else { digits };
        Some(match frac_part {
            Some(frac) => format!("{int_digits}.{frac}"),
            None => int_digits,
        })
    }

    /// Decide the role of a separator when only one kind appears.
    fn single_kind(&self, body: &str, sep: char) -> (Option<char>, Option<char>) {
        if body.matches(sep).count() > 1 {
            return (None, Some(sep));
        }
        let idx = body.rfind(sep).unwrap_or(0);
        let trailing = body.len() - idx - 1;
        let leading = idx;
        let ambiguous = trailing == 3 && (1..=3).contains(&leading);
        if ambiguous && self.grouping == AmbiguousGrouping::ThousandsSeparator {
            (None, Some(sep))
        } else {
            (Some(sep), None)
        }
    }
}

/// Remove grouping separators, checking every group after the first holds three digits.
fn ungroup(int_part: &str, sep: char) -> Option<String> {
    let mut groups = int_part.split(sep);
    let first = groups.next()?;
    if first.is_empty() && int_part.contains(sep) {
        return None;
    }
    if int_part.contains(sep) && first.len() > 3 {
        return None;
    }
    let mut out = first.to_string();
    for group in groups {
        if group.len() != 3 {
            return None;
        }
        out.push_str(group);
    }
    Some(out)
}

fn strip_decorations(s: &str) -> String {
    let mut lowered = s.to_lowercase();
    for marker in CURRENCY_MARKERS {
        lowered = lowered.replace(marker, "");
    }
    lowered
        .chars()
        .filter(|c| !c.is_whitespace() && !matches!(c, '\u{a0}' | '\u{202f}' | '\'' | '%'))
        .collect()
}

fn strip_sign(s: &str) -> (bool, String) {
    if let Some(inner) = s.strip_prefix('(').and_then(|r| r.strip_suffix(')')) {
        return (true, inner.to_string());
    }
    if let Some(rest) = s.strip_prefix('-') {
        return (true, rest.to_string());
    }
    if let Some(rest) = s.strip_suffix('-') {
        return (true, rest.to_string());
    }
    (false, s.strip_prefix('+').unwrap_or(s).to_string())
}
