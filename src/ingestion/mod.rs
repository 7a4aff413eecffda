//! Parsers and the unified import entrypoint.
//!
//! Most callers should use [`ImportEngine`] (from [`unified`]) which:
//!
//! - selects the parser by file extension (or [`crate::ParseOptions::format`])
//! - returns a uniform [`crate::types::ParseResult`] with mapped, transformed rows
//! - reports every parse to an [`ImportEventSink`]
//!
//! Format-specific parsers are also available under:
//! - [`csv`]
//! - [`excel`] (feature `excel`)
//! - [`xml`]

pub mod csv;
#[cfg(feature = "excel")]
pub mod excel;
pub mod observability;
pub mod pipeline;
pub mod unified;
mod validate;
pub mod xml;

pub use csv::CsvParser;
#[cfg(feature = "excel")]
pub use excel::ExcelParser;
pub use observability::{
    CompositeSink, ImportEvent, ImportEventSink, JsonLinesSink, MappingCompleteEvent, MemorySink,
    NoopSink, ParseCompleteEvent, ParseErrorEvent, ParseStartEvent, Severity, TracingSink,
    severity_for_error,
};
pub use pipeline::ProgressCallback;
pub use unified::{ImportEngine, Parser, ParserServices};
pub use xml::XmlParser;
