/// Tokens read as `true`, compared after trimming and lowercasing.
const TRUE_TOKENS: &[&str] = &["1", "true", "да", "yes", "y", "активен", "active"];

/// Tokens read as `false`, compared after trimming and lowercasing.
const FALSE_TOKENS: &[&str] = &["0", "false", "не", "no", "n", "неактивен", "inactive"];

/// Locale-aware boolean coercion. Never fails: unknown non-empty tokens are `true`.
#[derive(Debug, Clone, Copy, Default)]
pub struct BooleanTransformer;

impl BooleanTransformer {
    /// `None` for empty input.
    pub fn transform(&self, raw: &str) -> Option<bool> {
        let token = raw.trim().to_lowercase();
        if token.is_empty() {
            return None;
        }
        if FALSE_TOKENS.contains(&token.as_str()) {
            return Some(false);
        }
        if TRUE_TOKENS.contains(&token.as_str()) {
            return Some(true);
        }
        Some(true)
    }

    pub fn reverse(&self, value: bool) -> &'static str {
        if value { "да" } else { "не" }
    }
}
