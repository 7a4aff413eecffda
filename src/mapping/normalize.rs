//! Header-name normalization applied to both source names and alias tables.

use once_cell::sync::Lazy;
use regex::Regex;

static SEPARATORS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\s\-\./]+").unwrap());
static QUOTES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"[\[\]()"'\u{201C}\u{201D}\u{2018}\u{2019}]"#).unwrap());
static TRAILING_COUNTER: Lazy<Regex> = Lazy::new(|| Regex::new(r"_?\d+$").unwrap());
static NOISE_PREFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(field_|col_|column_|attr_)").unwrap());
static REPEATED_UNDERSCORE: Lazy<Regex> = Lazy::new(|| Regex::new(r"_{2,}").unwrap());

/// Normalize a header, element or attribute name for comparison.
///
/// `Фактура Број`, `faktura-broj` and `FakturaBroj` all become `faktura_broj`.
pub fn normalize_name(name: &str) -> String {
    let name = name.trim();
    let name = strip_namespace_prefix(name).trim_start_matches('@');

    let folded = transliterate(&split_camel_case(name).to_lowercase());
    let s = SEPARATORS.replace_all(&folded, "_");
    let s = QUOTES.replace_all(&s, "");
    let s = TRAILING_COUNTER.replace(&s, "");
    let s = NOISE_PREFIX.replace(&s, "");
    let s = REPEATED_UNDERSCORE.replace_all(&s, "_");
    s.trim_matches('_').to_string()
}

/// `cbc:InvoicedQuantity` -> `InvoicedQuantity`; `Datum:` and `Iznos: MKD` are left alone.
fn strip_namespace_prefix(name: &str) -> &str {
    match name.split_once(':') {
        Some((prefix, local))
            if !prefix.is_empty()
                && !local.is_empty()
                && !local.starts_with(char::is_whitespace)
                && prefix.chars().all(|c| c.is_alphanumeric() || c == '_' || c == '-') =>
        {
            local
        }
        _ => name,
    }
}

/// Insert `_` at lower-to-upper case boundaries (`TaxID` -> `Tax_ID`).
fn split_camel_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    let mut prev_lower = false;
    for c in name.chars() {
        if c.is_uppercase() && prev_lower {
            out.push('_');
        }
        prev_lower = c.is_lowercase() || c.is_ascii_digit();
        out.push(c);
    }
    out
}

/// Fold Macedonian/Serbian Cyrillic and Latin diacritics to plain ASCII Latin.
///
/// Input is expected to be lowercase already.
pub fn transliterate(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        let mapped = match c {
            'а' => "a",
            'б' => "b",
            'в' => "v",
            'г' | 'ѓ' => "g",
            'д' => "d",
            'ђ' | 'đ' => "dj",
            'е' | 'ѐ' => "e",
            'ж' | 'ž' => "z",
            'з' => "z",
            'ѕ' | 'џ' => "dz",
            'и' | 'ѝ' => "i",
            'ј' => "j",
            'к' | 'ќ' => "k",
            'л' => "l",
            'љ' => "lj",
            'м' => "m",
            'н' => "n",
            'њ' => "nj",
            'о' => "o",
            'п' => "p",
            'р' => "r",
            'с' | 'š' => "s",
            'т' => "t",
            'ћ' | 'ц' | 'ч' | 'č' | 'ć' => "c",
            'у' => "u",
            'ф' => "f",
            'х' => "h",
            'ш' => "s",
            _ => {
                out.push(c);
                continue;
            }
        };
        out.push_str(mapped);
    }
    out
}
