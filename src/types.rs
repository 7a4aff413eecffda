//! Core data model types shared by the parsers.
//!
//! Every entity here is created fresh per `parse()` call and handed to the caller by value.

use std::collections::BTreeMap;
use std::fmt;

use chrono::NaiveDate;
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};

/// Declared data type of a canonical field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    /// Free text, trimmed.
    String,
    /// Whole number.
    Integer,
    /// Locale-aware decimal number.
    Decimal,
    /// Monetary amount; normalized like [`DataType::Decimal`].
    Currency,
    /// Calendar date, emitted as ISO-8601.
    Date,
    /// Locale-aware boolean token.
    Boolean,
}

impl DataType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataType::String => "string",
            DataType::Integer => "integer",
            DataType::Decimal => "decimal",
            DataType::Currency => "currency",
            DataType::Date => "date",
            DataType::Boolean => "boolean",
        }
    }
}

/// A single scalar (or nested, for XML) value in a [`Record`].
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Missing/empty value.
    Null,
    /// 64-bit signed integer.
    Int64(i64),
    /// 64-bit float.
    Float64(f64),
    /// Boolean.
    Bool(bool),
    /// UTF-8 string.
    Utf8(String),
    /// Calendar date; displays and serializes as `yyyy-mm-dd`.
    Date(NaiveDate),
    /// Nested element content (XML only).
    Map(Record),
}

impl Value {
    /// True for [`Value::Null`] and for strings that are empty after trimming.
    pub fn is_empty(&self) -> bool {
        match self {
            Value::Null => true,
            Value::Utf8(s) => s.trim().is_empty(),
            Value::Map(m) => m.is_empty(),
            _ => false,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Utf8(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float64(f) => Some(*f),
            Value::Int64(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// Short type label used in diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Int64(_) => "integer",
            Value::Float64(_) => "float",
            Value::Bool(_) => "boolean",
            Value::Utf8(_) => "string",
            Value::Date(_) => "date",
            Value::Map(_) => "map",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Int64(i) => write!(f, "{i}"),
            Value::Float64(v) => write!(f, "{v}"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Utf8(s) => f.write_str(s),
            Value::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            Value::Map(m) => write!(f, "{{{} fields}}", m.len()),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Utf8(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Utf8(s)
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_none(),
            Value::Int64(i) => serializer.serialize_i64(*i),
            Value::Float64(v) => serializer.serialize_f64(*v),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Utf8(s) => serializer.serialize_str(s),
            Value::Date(d) => serializer.collect_str(&d.format("%Y-%m-%d")),
            Value::Map(m) => m.serialize(serializer),
        }
    }
}

/// Ordered map of field name to [`Value`].
///
/// Insertion order is preserved. Rows that hit a transform failure keep their raw values and
/// carry the failure messages in [`Record::errors`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    entries: Vec<(String, Value)>,
    errors: Vec<String>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
            errors: Vec::new(),
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.iter().any(|(k, _)| k == key)
    }

    /// Insert or replace `key`, keeping the original position on replace.
    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        let key = key.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    /// Insert only when `key` is absent.
    pub fn insert_if_absent(&mut self, key: impl Into<String>, value: Value) {
        let key = key.into();
        if !self.contains_key(&key) {
            self.entries.push((key, value));
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// True when every value is empty.
    pub fn is_blank(&self) -> bool {
        self.entries.iter().all(|(_, v)| v.is_empty())
    }

    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub(crate) fn push_error(&mut self, message: String) {
        self.errors.push(message);
    }
}

impl FromIterator<(String, Value)> for Record {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        let mut record = Record::new();
        for (k, v) in iter {
            record.insert(k, v);
        }
        record
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let extra = usize::from(self.has_errors());
        let mut map = serializer.serialize_map(Some(self.entries.len() + extra))?;
        for (k, v) in &self.entries {
            map.serialize_entry(k, v)?;
        }
        if self.has_errors() {
            map.serialize_entry("_errors", &self.errors)?;
        }
        map.end()
    }
}

/// Which matcher produced a [`FieldMapping`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchAlgorithm {
    ExactAlias,
    Pattern,
    Semantic,
    Fuzzy,
    None,
}

/// Mapping of one source header to a canonical field.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldMapping {
    /// Canonical field, `None` when unrecognized.
    pub standard_field: Option<String>,
    pub data_type: DataType,
    /// Certainty in `[0, 1]`.
    pub confidence: f64,
    pub algorithm: MatchAlgorithm,
}

impl FieldMapping {
    pub fn unmapped() -> Self {
        Self {
            standard_field: None,
            data_type: DataType::String,
            confidence: 0.0,
            algorithm: MatchAlgorithm::None,
        }
    }

    /// Canonical field when the mapping clears `floor`.
    pub fn applied_field(&self, floor: f64) -> Option<&str> {
        match &self.standard_field {
            Some(field) if self.confidence >= floor => Some(field.as_str()),
            _ => None,
        }
    }
}

/// Ordered `source header -> FieldMapping` table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldMappings {
    entries: Vec<(String, FieldMapping)>,
}

impl FieldMappings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, header: &str) -> Option<&FieldMapping> {
        self.entries.iter().find(|(h, _)| h == header).map(|(_, m)| m)
    }

    pub fn contains(&self, header: &str) -> bool {
        self.get(header).is_some()
    }

    pub fn insert(&mut self, header: impl Into<String>, mapping: FieldMapping) {
        let header = header.into();
        match self.entries.iter_mut().find(|(h, _)| *h == header) {
            Some(slot) => slot.1 = mapping,
            None => self.entries.push((header, mapping)),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldMapping)> {
        self.entries.iter().map(|(h, m)| (h.as_str(), m))
    }

    pub fn headers(&self) -> Vec<String> {
        self.entries.iter().map(|(h, _)| h.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of mappings at or above `floor`.
    pub fn applied_count(&self, floor: f64) -> usize {
        self.entries
            .iter()
            .filter(|(_, m)| m.applied_field(floor).is_some())
            .count()
    }
}

impl Serialize for FieldMappings {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (h, m) in &self.entries {
            map.serialize_entry(h, m)?;
        }
        map.end()
    }
}

/// Input family handled by a parser.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceFormat {
    /// Delimited text (`csv`, `txt`).
    Csv,
    /// Spreadsheet workbooks (`xlsx`, `xls`, `ods`, ...).
    Excel,
    /// XML documents.
    Xml,
}

impl SourceFormat {
    /// Parse a source format from a file extension (case-insensitive).
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "csv" | "txt" => Some(Self::Csv),
            "xlsx" | "xls" | "xlsm" | "xlsb" | "ods" => Some(Self::Excel),
            "xml" => Some(Self::Xml),
            _ => None,
        }
    }
}

/// Recognized XML document families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum XmlFormat {
    UblInvoice,
    UblCreditNote,
    OnivoExport,
    Eslog,
    MegasoftExport,
    PantheonExport,
    GenericAccounting,
    Unknown,
}

/// Resolved delimited-text parameters.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DelimitedStructure {
    pub encoding: String,
    pub delimiter: char,
    pub has_headers: bool,
    pub skip_rows: usize,
}

/// Resolved worksheet and bounds (1-based, inclusive).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SheetStructure {
    pub worksheet: String,
    pub has_headers: bool,
    pub header_row: usize,
    pub data_start_row: usize,
    pub data_end_row: usize,
    pub data_start_column: usize,
    pub data_end_column: usize,
}

/// Resolved XML document shape.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct XmlStructure {
    pub format: XmlFormat,
    pub root_element: String,
    /// `prefix -> uri`; the default namespace uses an empty prefix.
    pub namespaces: BTreeMap<String, String>,
    /// Candidate record elements in priority order.
    pub record_elements: Vec<String>,
    /// True when the forward-only cursor strategy is used.
    pub streaming: bool,
}

/// Format-specific part of a [`DetectedStructure`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StructureDetail {
    Delimited(DelimitedStructure),
    Spreadsheet(SheetStructure),
    Xml(XmlStructure),
}

/// Structural parameters resolved once before any record is read.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectedStructure {
    pub format: SourceFormat,
    pub file_size: u64,
    /// Exact for text and spreadsheets; sampled estimate for streamed XML.
    pub estimated_rows: usize,
    pub detail: StructureDetail,
}

/// Per-call counters; discarded once the result is returned.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ParseStatistics {
    pub total_rows: usize,
    pub processed_rows: usize,
    pub error_rows: usize,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParseMetadata {
    pub total_rows: usize,
    pub processed_rows: usize,
    pub structure: DetectedStructure,
    pub processing_time_seconds: f64,
    pub statistics: ParseStatistics,
}

/// Uniform output of every parser.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParseResult {
    pub headers: Vec<String>,
    pub field_mappings: FieldMappings,
    pub rows: Vec<Record>,
    pub metadata: ParseMetadata,
}

/// Side-effect-free inspection result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Preview {
    pub headers: Vec<String>,
    /// Raw (untransformed) records.
    pub sample_rows: Vec<Record>,
    pub detected_structure: DetectedStructure,
}

/// Progress update delivered at chunk boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Progress {
    pub processed: usize,
    pub total: usize,
    pub percentage: f64,
}

impl Progress {
    pub fn new(processed: usize, total: usize) -> Self {
        let percentage = if total == 0 {
            100.0
        } else {
            ((processed as f64 / total as f64) * 10_000.0).round() / 100.0
        };
        Self {
            processed,
            total,
            percentage: percentage.min(100.0),
        }
    }

    pub fn complete(processed: usize, total: usize) -> Self {
        Self {
            processed,
            total,
            percentage: 100.0,
        }
    }
}

/// Caller-supplied import job context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImportJob {
    pub id: String,
}

impl ImportJob {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}
