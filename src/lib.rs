//! `bookkeeping-import` parses bookkeeping exports whose layout is not known in advance and turns
//! them into uniformly keyed, typed records.
//!
//! The primary entrypoint is [`ingestion::ImportEngine`], which selects a parser from the file
//! extension (or [`ParseOptions::format`]), detects the file's structure, maps every source
//! header to a canonical field and normalizes values.
//!
//! ## What you can import
//!
//! **File formats (auto-detected by extension):**
//!
//! - **Delimited text**: `.csv`, `.txt` (UTF-8, Windows-1251 or Windows-1252; `,` `;` tab `|`)
//! - **Workbooks** (requires the Cargo feature `excel`, on by default): `.xlsx`, `.xls`, `.xlsm`,
//!   `.xlsb`, `.ods`
//! - **XML**: UBL invoices and credit notes, Onivo, eSlog, Megasoft and Pantheon exports, and
//!   any document with a repeating record element
//!
//! **Field mapping:** headers in Macedonian or Serbian (Cyrillic or Latin) and English are
//! mapped to canonical fields such as `invoice_number`, `invoice_date`, `customer_name` or
//! `vat_rate`, each with a confidence in `[0, 1]`. Mappings under
//! [`EngineConfig::confidence_floor`] are reported but not applied.
//!
//! **Value normalization:** dates (`15.01.2025`, `15/01/2025`, spreadsheet serials, ...) become
//! ISO dates, decimals in either locale (`1.234,56`, `1234.56`) become numbers, and boolean
//! tokens (`да`/`не`, `yes`/`no`, ...) become booleans. A value that cannot be converted is kept
//! as-is and the row is flagged instead of failing the import.
//!
//! ## Quick example
//!
//! ```no_run
//! use bookkeeping_import::ingestion::ImportEngine;
//! use bookkeeping_import::{ImportJob, ParseOptions, Value};
//!
//! # fn main() -> Result<(), bookkeeping_import::ParseError> {
//! let engine = ImportEngine::default();
//! let result = engine.parse(&ImportJob::new("42"), "fakturi.csv", &ParseOptions::default(), None)?;
//!
//! for row in &result.rows {
//!     if let Some(Value::Date(date)) = row.get("invoice_date") {
//!         println!("invoice dated {date}");
//!     }
//! }
//! println!(
//!     "{} rows, {} flagged",
//!     result.metadata.processed_rows, result.metadata.statistics.error_rows
//! );
//! # Ok(())
//! # }
//! ```
//!
//! ## Mapping a single header
//!
//! ```rust
//! use bookkeeping_import::mapping::{FieldMapper, FormatHint};
//! use bookkeeping_import::types::{DataType, SourceFormat};
//!
//! let mapper = FieldMapper::new();
//! let mapping = mapper.map_field("Датум на фактура", FormatHint::new(SourceFormat::Csv));
//! assert_eq!(mapping.standard_field.as_deref(), Some("invoice_date"));
//! assert_eq!(mapping.data_type, DataType::Date);
//! ```
//!
//! ## Modules
//!
//! - [`ingestion`]: the engine, the three parsers, progress reporting and event sinks
//! - [`mapping`]: header normalization and the field mapper
//! - [`transform`]: date, decimal and boolean transformers
//! - [`config`]: engine configuration and per-call options
//! - [`types`]: records, mappings and parse results
//! - [`error`]: fatal and row-level error types

pub mod config;
pub mod error;
pub mod ingestion;
pub mod mapping;
pub mod transform;
pub mod types;

pub use config::{AmbiguousGrouping, EngineConfig, ParseOptions, WorksheetSelector};
pub use error::{ImportResult, ParseError, ProgressError, TransformError};
pub use types::{
    DataType, FieldMapping, FieldMappings, ImportJob, ParseResult, Preview, Progress, Record,
    Value,
};
