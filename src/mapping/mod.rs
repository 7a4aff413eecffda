//! Header-to-canonical-field mapping.
//!
//! [`FieldMapper`] is a pure function of its input and the static tables in [`aliases`]:
//! the same name and hint always produce the same [`FieldMapping`]. Matching runs four
//! stages over the normalized name and keeps the most confident candidate:
//!
//! 1. exact alias lookup
//! 2. regex heuristics, vendor-profile patterns first when a [`SourceSoftware`] is known
//! 3. semantic word groups routed by context words (see [`semantic`])
//! 4. fuzzy similarity, scaled so that it never outranks an exact alias

pub mod aliases;
pub mod normalize;
pub mod semantic;
pub mod similarity;

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::types::{DataType, FieldMapping, FieldMappings, MatchAlgorithm, SourceFormat};

use self::aliases::{ALIAS_TABLE, EXACT_INDEX, GENERAL_PATTERNS, PatternRule};
pub use self::normalize::{normalize_name, transliterate};

/// Accounting application that produced an export.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceSoftware {
    Onivo,
    Megasoft,
    Pantheon,
}

/// Context passed along with a name to [`FieldMapper::map_field`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FormatHint {
    pub format: Option<SourceFormat>,
    pub software: Option<SourceSoftware>,
}

impl FormatHint {
    pub fn new(format: SourceFormat) -> Self {
        Self {
            format: Some(format),
            software: None,
        }
    }

    pub fn with_software(mut self, software: Option<SourceSoftware>) -> Self {
        self.software = software;
        self
    }
}

/// A ranked candidate returned by [`FieldMapper::suggestions`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MappingSuggestion {
    pub field: &'static str,
    pub data_type: DataType,
    pub confidence: f64,
    pub algorithm: MatchAlgorithm,
}

/// Outcome of [`FieldMapper::validate_mappings`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MappingValidation {
    pub valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    /// Share of required fields covered, in percent.
    pub coverage: f64,
}

/// Maps raw column/element names to canonical fields.
#[derive(Debug, Clone, Copy)]
pub struct FieldMapper {
    /// Minimum blended similarity for a fuzzy candidate.
    fuzzy_threshold: f64,
    /// Stricter threshold for names of four characters or fewer.
    short_name_threshold: f64,
    /// Fuzzy scores are multiplied by this, keeping them under exact matches.
    fuzzy_ceiling: f64,
}

impl Default for FieldMapper {
    fn default() -> Self {
        Self {
            fuzzy_threshold: 0.65,
            short_name_threshold: 0.8,
            fuzzy_ceiling: 0.85,
        }
    }
}

impl FieldMapper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Map one name. Never fails: unrecognized names yield confidence 0.
    pub fn map_field(&self, name: &str, hint: FormatHint) -> FieldMapping {
        match self.ranked(name, hint).into_iter().next() {
            Some(best) => FieldMapping {
                standard_field: Some(best.field.to_string()),
                data_type: best.data_type,
                confidence: best.confidence,
                algorithm: best.algorithm,
            },
            None => FieldMapping::unmapped(),
        }
    }

    /// Map every name, preserving order. Duplicate names map once.
    pub fn map_fields<S: AsRef<str>>(&self, names: &[S], hint: FormatHint) -> FieldMappings {
        let mut mappings = FieldMappings::new();
        for name in names {
            let name = name.as_ref();
            if !mappings.contains(name) {
                mappings.insert(name, self.map_field(name, hint));
            }
        }
        debug!(
            format = ?hint.format,
            software = ?hint.software,
            fields = names.len(),
            recognized = mappings.iter().filter(|(_, m)| m.standard_field.is_some()).count(),
            "mapped fields"
        );
        mappings
    }

    /// Up to `limit` candidates for `name`, best first, one per canonical field.
    pub fn suggestions(&self, name: &str, hint: FormatHint, limit: usize) -> Vec<MappingSuggestion> {
        let mut ranked = self.ranked(name, hint);
        ranked.truncate(limit);
        ranked
    }

    pub fn supported_fields(&self) -> Vec<&'static str> {
        aliases::canonical_fields().collect()
    }

    /// Aliases listed for a canonical field, as written in exports.
    pub fn field_variations(&self, field: &str) -> &'static [&'static str] {
        aliases::raw_aliases(field)
    }

    /// Check a mapping table against a set of required canonical fields.
    ///
    /// Only mappings at or above `floor` count. Unknown targets and missing required fields
    /// are errors; several headers mapped to one field is a warning.
    pub fn validate_mappings(
        &self,
        mappings: &FieldMappings,
        required: &[&str],
        floor: f64,
    ) -> MappingValidation {
        let supported = self.supported_fields();
        let mut errors = Vec::new();
        let mut warnings = Vec::new();
        let mut targets: Vec<&str> = Vec::new();
        let mut counts: HashMap<&str, usize> = HashMap::new();

        for (_, mapping) in mappings.iter() {
            let Some(field) = mapping.applied_field(floor) else {
                continue;
            };
            if !supported.contains(&field) {
                errors.push(format!("invalid target field: {field}"));
            }
            let count = counts.entry(field).or_insert(0);
            *count += 1;
            if *count == 1 {
                targets.push(field);
            }
        }

        for field in &targets {
            if counts.get(field).copied().unwrap_or(0) > 1 {
                warnings.push(format!("multiple fields mapped to: {field}"));
            }
        }

        let missing: Vec<&str> = required
            .iter()
            .copied()
            .filter(|r| !targets.contains(r))
            .collect();
        for field in &missing {
            errors.push(format!("required field missing: {field}"));
        }

        let coverage = if required.is_empty() {
            100.0
        } else {
            let covered = (required.len() - missing.len()) as f64;
            round2(covered / required.len() as f64 * 100.0)
        };

        MappingValidation {
            valid: errors.is_empty(),
            errors,
            warnings,
            coverage,
        }
    }

    /// All candidates for `name`, deduplicated per field and sorted by confidence.
    ///
    /// Ties keep stage order, so an exact alias beats a pattern of equal confidence.
    fn ranked(&self, name: &str, hint: FormatHint) -> Vec<MappingSuggestion> {
        let normalized = normalize_name(name);
        if normalized.is_empty() {
            return Vec::new();
        }

        let mut candidates = Vec::new();

        if let Some(rule) = EXACT_INDEX.get(&normalized).map(|i| &ALIAS_TABLE[*i]) {
            candidates.push(MappingSuggestion {
                field: rule.field,
                data_type: rule.data_type,
                confidence: rule.confidence,
                algorithm: MatchAlgorithm::ExactAlias,
            });
        }

        let vendor: &[PatternRule] = match hint.software {
            Some(software) => aliases::vendor_patterns(software),
            None => &[],
        };
        for rule in vendor.iter().chain(GENERAL_PATTERNS.iter()) {
            if rule.regex.is_match(&normalized) {
                candidates.push(MappingSuggestion {
                    field: rule.field,
                    data_type: aliases::data_type_of(rule.field),
                    confidence: rule.confidence,
                    algorithm: MatchAlgorithm::Pattern,
                });
            }
        }

        if let Some((field, confidence)) = semantic::semantic_match(&normalized) {
            candidates.push(MappingSuggestion {
                field,
                data_type: aliases::data_type_of(field),
                confidence,
                algorithm: MatchAlgorithm::Semantic,
            });
        }

        candidates.extend(self.fuzzy(&normalized));

        let mut seen: Vec<&str> = Vec::new();
        let mut best: Vec<MappingSuggestion> = Vec::new();
        for candidate in candidates {
            match seen.iter().position(|f| *f == candidate.field) {
                Some(i) if best[i].confidence >= candidate.confidence => {}
                Some(i) => best[i] = candidate,
                None => {
                    seen.push(candidate.field);
                    best.push(candidate);
                }
            }
        }
        best.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
        best
    }

    fn fuzzy(&self, normalized: &str) -> Vec<MappingSuggestion> {
        let short = normalized.chars().count() <= 4;
        let mut out: Vec<MappingSuggestion> = Vec::new();

        for rule in ALIAS_TABLE.iter() {
            let threshold = if short || rule.alias.len() <= 4 {
                self.short_name_threshold
            } else {
                self.fuzzy_threshold
            };
            let score = similarity::blended(normalized, &rule.alias);
            if score < threshold {
                continue;
            }
            let confidence = round2(score * self.fuzzy_ceiling * rule.confidence);
            match out.iter_mut().find(|c| c.field == rule.field) {
                Some(existing) if existing.confidence >= confidence => {}
                Some(existing) => existing.confidence = confidence,
                None => out.push(MappingSuggestion {
                    field: rule.field,
                    data_type: rule.data_type,
                    confidence,
                    algorithm: MatchAlgorithm::Fuzzy,
                }),
            }
        }
        out
    }
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn csv() -> FormatHint {
        FormatHint::new(SourceFormat::Csv)
    }

    #[test]
    fn exact_aliases_across_scripts() {
        let mapper = FieldMapper::new();
        for (name, field) in [
            ("Број Фактура", "invoice_number"),
            ("broj_faktura", "invoice_number"),
            ("Датум", "date"),
            ("Klient", "customer_name"),
            ("Купувач", "customer_name"),
            ("Количина", "quantity"),
            ("Износ", "amount"),
            ("ЕДБ", "tax_id"),
            ("PIB", "tax_id"),
            ("E-mail", "email"),
        ] {
            let m = mapper.map_field(name, csv());
            assert_eq!(m.standard_field.as_deref(), Some(field), "{name}");
            assert_eq!(m.confidence, 1.0, "{name}");
            assert_eq!(m.algorithm, MatchAlgorithm::ExactAlias);
        }
    }

    #[test]
    fn data_type_follows_field() {
        let mapper = FieldMapper::new();
        assert_eq!(mapper.map_field("Datum faktura", csv()).data_type, DataType::Date);
        assert_eq!(mapper.map_field("Kolicina", csv()).data_type, DataType::Integer);
        assert_eq!(mapper.map_field("Vkupno", csv()).data_type, DataType::Currency);
        assert_eq!(mapper.map_field("Naziv", csv()).data_type, DataType::String);
    }

    #[test]
    fn patterns_catch_unlisted_variants() {
        let m = FieldMapper::new().map_field("Broj na faktura", csv());
        assert_eq!(m.standard_field.as_deref(), Some("invoice_number"));
        assert_eq!(m.algorithm, MatchAlgorithm::Pattern);
        assert_eq!(m.confidence, 0.9);
    }

    #[test]
    fn vendor_patterns_need_the_software_hint() {
        let mapper = FieldMapper::new();
        let hint = csv().with_software(Some(SourceSoftware::Megasoft));
        let m = mapper.map_field("Adresa kupca", hint);
        assert_eq!(m.standard_field.as_deref(), Some("address"));
        assert!(m.confidence >= 0.8);
    }

    #[test]
    fn fuzzy_matches_stay_below_exact() {
        let m = FieldMapper::new().map_field("Kolicna", csv());
        assert_eq!(m.standard_field.as_deref(), Some("quantity"));
        assert_eq!(m.algorithm, MatchAlgorithm::Fuzzy);
        assert!(m.confidence < 1.0 && m.confidence >= 0.3, "{}", m.confidence);
    }

    #[test]
    fn bare_tax_headers_and_discounts() {
        let mapper = FieldMapper::new();
        for (name, field) in [
            ("ДДВ", "vat_amount"),
            ("PDV", "vat_amount"),
            ("ДДВ %", "vat_rate"),
            ("PDV stopa", "vat_rate"),
            ("Попуст", "discount"),
            ("Rabat", "discount"),
        ] {
            let m = mapper.map_field(name, csv());
            assert_eq!(m.standard_field.as_deref(), Some(field), "{name}");
            assert!(m.confidence >= 0.9, "{name}: {}", m.confidence);
        }
        assert_eq!(mapper.map_field("ДДВ %", csv()).data_type, DataType::Decimal);
        assert_eq!(mapper.map_field("Попуст", csv()).data_type, DataType::Decimal);
    }

    #[test]
    fn word_groups_route_unlisted_names() {
        let mapper = FieldMapper::new();
        let m = mapper.map_field("Naziv artikla", csv());
        assert_eq!(m.standard_field.as_deref(), Some("item_name"));
        assert_eq!(m.algorithm, MatchAlgorithm::Semantic);
        assert_eq!(m.confidence, 0.6);

        let m = mapper.map_field("Datum uplata", csv());
        assert_eq!(m.standard_field.as_deref(), Some("payment_date"));
        assert_eq!(m.data_type, DataType::Date);
    }

    #[test]
    fn unknown_names_are_unmapped() {
        let mapper = FieldMapper::new();
        for name in ["Qqq", "", "   ", "###"] {
            let m = mapper.map_field(name, csv());
            assert_eq!(m.standard_field, None, "{name}");
            assert_eq!(m.confidence, 0.0);
        }
    }

    #[test]
    fn mapping_is_deterministic() {
        let mapper = FieldMapper::new();
        let names = ["Datum", "Iznos", "Kupac", "Opis stavke"];
        assert_eq!(mapper.map_fields(&names, csv()), mapper.map_fields(&names, csv()));
    }

    #[test]
    fn suggestions_are_ranked_and_unique() {
        let list = FieldMapper::new().suggestions("iznos_pdv", csv(), 5);
        assert_eq!(list[0].field, "vat_amount");
        assert!(list.windows(2).all(|w| w[0].confidence >= w[1].confidence));
        let mut fields: Vec<_> = list.iter().map(|s| s.field).collect();
        fields.dedup();
        assert_eq!(fields.len(), list.len());
    }

    #[test]
    fn validation_reports_missing_and_duplicates() {
        let mapper = FieldMapper::new();
        let mappings = mapper.map_fields(&["Iznos", "Suma", "Datum"], csv());
        let report = mapper.validate_mappings(&mappings, &["amount", "customer_name"], 0.3);
        assert!(!report.valid);
        assert_eq!(report.errors, vec!["required field missing: customer_name".to_string()]);
        assert_eq!(report.warnings, vec!["multiple fields mapped to: amount".to_string()]);
        assert_eq!(report.coverage, 50.0);
    }

    #[test]
    fn variations_and_supported_fields() {
        let mapper = FieldMapper::new();
        assert!(mapper.supported_fields().contains(&"invoice_number"));
        assert!(mapper.field_variations("tax_id").contains(&"едб"));
        assert!(mapper.field_variations("nope").is_empty());
    }
}
