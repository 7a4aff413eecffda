//! Engine-wide configuration and per-call parse options.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ImportResult, ParseError};
use crate::ingestion::observability::Severity;
use crate::mapping::SourceSoftware;
use crate::types::SourceFormat;

/// How to read a lone separator followed by exactly three digits (`"1,234"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AmbiguousGrouping {
    /// `"1,234"` is `1.234`.
    #[default]
    DecimalPoint,
    /// `"1,234"` is `1234`.
    ThousandsSeparator,
}

/// Static knobs shared by every parse. Read-only once the engine is built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Hard cap on input size, in bytes.
    pub max_file_size: u64,
    /// Records per chunk when the caller does not set one.
    pub default_chunk_size: usize,
    /// Mappings below this confidence are not applied.
    pub confidence_floor: f64,
    /// XML inputs above this size are streamed instead of loaded.
    pub large_xml_threshold: u64,
    /// Head slice used to estimate streamed XML record counts.
    pub xml_sample_bytes: usize,
    /// Head slice used for encoding and delimiter detection.
    pub encoding_sample_bytes: usize,
    pub delimiter_sample_lines: usize,
    pub preview_rows: usize,
    pub decimal_grouping: AmbiguousGrouping,
    /// Parse errors at or above this severity are also raised as alerts.
    pub alert_at_or_above: Severity,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_file_size: 1024 * 1024 * 1024,
            default_chunk_size: 1000,
            confidence_floor: 0.3,
            large_xml_threshold: 50 * 1024 * 1024,
            xml_sample_bytes: 1024 * 1024,
            encoding_sample_bytes: 8192,
            delimiter_sample_lines: 5,
            preview_rows: 10,
            decimal_grouping: AmbiguousGrouping::default(),
            alert_at_or_above: Severity::Critical,
        }
    }
}

impl EngineConfig {
    /// Parse a JSON document; missing keys fall back to defaults.
    pub fn from_json_str(json: &str) -> ImportResult<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| ParseError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> ImportResult<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|e| {
            ParseError::InvalidConfig(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_json_str(&raw)
    }

    fn validate(&self) -> ImportResult<()> {
        if !(0.0..=1.0).contains(&self.confidence_floor) {
            return Err(ParseError::InvalidConfig(format!(
                "confidence_floor must be within [0, 1], got {}",
                self.confidence_floor
            )));
        }
        if self.default_chunk_size == 0 {
            return Err(ParseError::InvalidConfig(
                "default_chunk_size must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// How to choose the worksheet of a workbook.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorksheetSelector {
    /// Score every sheet and pick the best candidate (default).
    #[default]
    Auto,
    /// A single named sheet.
    Name(String),
    /// A sheet by zero-based position.
    Index(usize),
}

/// Per-call options. Everything left unset is resolved by structure detection.
///
/// Row and column bounds are 1-based and inclusive, as shown in spreadsheet tools.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParseOptions {
    /// If `None`, the format is inferred from the file extension.
    pub format: Option<SourceFormat>,
    pub delimiter: Option<char>,
    /// Encoding label such as `utf-8` or `windows-1251`.
    pub encoding: Option<String>,
    pub has_headers: bool,
    /// Physical records skipped before the header (text only).
    pub skip_rows: usize,
    /// Falls back to [`EngineConfig::default_chunk_size`].
    pub chunk_size: Option<usize>,
    pub worksheet: WorksheetSelector,
    pub header_row: usize,
    pub data_start_row: Option<usize>,
    pub data_end_row: Option<usize>,
    pub data_start_column: Option<usize>,
    pub data_end_column: Option<usize>,
    /// Extra XML `prefix -> uri` bindings merged over the detected ones.
    pub namespaces: Vec<(String, String)>,
    /// Exporting application, enabling vendor-specific header patterns.
    pub software: Option<SourceSoftware>,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            format: None,
            delimiter: None,
            encoding: None,
            has_headers: true,
            skip_rows: 0,
            chunk_size: None,
            worksheet: WorksheetSelector::Auto,
            header_row: 1,
            data_start_row: None,
            data_end_row: None,
            data_start_column: None,
            data_end_column: None,
            namespaces: Vec::new(),
            software: None,
        }
    }
}

impl ParseOptions {
    pub(crate) fn chunk_size(&self, config: &EngineConfig) -> usize {
        self.chunk_size
            .filter(|n| *n > 0)
            .unwrap_or(config.default_chunk_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults_fill_missing_keys() {
        let cfg = EngineConfig::from_json_str(r#"{"confidence_floor": 0.5}"#).unwrap();
        assert_eq!(cfg.confidence_floor, 0.5);
        assert_eq!(cfg.default_chunk_size, 1000);
        assert_eq!(cfg.max_file_size, 1024 * 1024 * 1024);
    }

    #[test]
    fn config_rejects_out_of_range_floor() {
        let err = EngineConfig::from_json_str(r#"{"confidence_floor": 1.5}"#).unwrap_err();
        assert!(err.to_string().contains("confidence_floor"));
    }

    #[test]
    fn config_reads_decimal_grouping() {
        let cfg =
            EngineConfig::from_json_str(r#"{"decimal_grouping": "thousands_separator"}"#).unwrap();
        assert_eq!(cfg.decimal_grouping, AmbiguousGrouping::ThousandsSeparator);
    }

    #[test]
    fn zero_chunk_size_falls_back_to_default() {
        let opts = ParseOptions {
            chunk_size: Some(0),
            ..Default::default()
        };
        assert_eq!(opts.chunk_size(&EngineConfig::default()), 1000);
    }
}
