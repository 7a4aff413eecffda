//! Unified import entrypoint.
//!
//! Most callers should build one [`ImportEngine`] and call [`ImportEngine::parse`] per file:
//!
//! - If [`ParseOptions::format`] is `None`, the parser is selected from the file extension.
//! - Every call reports `parse-start`, `mapping-complete`, `parse-complete` or `parse-error` to
//!   the engine's [`ImportEventSink`]. Failures at or above
//!   [`EngineConfig::alert_at_or_above`] are additionally raised through `on_alert`.
//!
//! # Examples
//!
//! ## Parse with defaults (auto-detect by extension)
//!
//! ```no_run
//! use bookkeeping_import::ingestion::ImportEngine;
//! use bookkeeping_import::{ImportJob, ParseOptions};
//!
//! # fn main() -> Result<(), bookkeeping_import::ParseError> {
//! let engine = ImportEngine::default();
//! let job = ImportJob::new("job-1");
//! let result = engine.parse(&job, "fakturi.csv", &ParseOptions::default(), None)?;
//! println!("rows={} errors={}", result.rows.len(), result.metadata.statistics.error_rows);
//! # Ok(())
//! # }
//! ```
//!
//! ## Progress reporting
//!
//! ```no_run
//! use bookkeeping_import::ingestion::ImportEngine;
//! use bookkeeping_import::{ImportJob, ParseOptions, Progress, ProgressError};
//!
//! # fn main() -> Result<(), bookkeeping_import::ParseError> {
//! let engine = ImportEngine::default();
//! let mut report = |p: Progress| -> Result<(), ProgressError> {
//!     println!("{}/{} ({:.1}%)", p.processed, p.total, p.percentage);
//!     Ok(())
//! };
//! engine.parse(&ImportJob::new("job-2"), "export.xml", &ParseOptions::default(), Some(&mut report))?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Events as JSON lines
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use bookkeeping_import::ingestion::{ImportEngine, JsonLinesSink};
//! use bookkeeping_import::EngineConfig;
//!
//! let engine = ImportEngine::with_sink(
//!     EngineConfig::default(),
//!     Arc::new(JsonLinesSink::new("import-events.jsonl")),
//! );
//! # let _ = engine;
//! ```

use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info};

use crate::config::{EngineConfig, ParseOptions};
use crate::error::{ImportResult, ParseError};
use crate::mapping::{FieldMapper, FormatHint};
use crate::transform::Transformers;
use crate::types::{DetectedStructure, ImportJob, ParseResult, Preview, SourceFormat};

use super::csv::CsvParser;
#[cfg(feature = "excel")]
use super::excel::ExcelParser;
use super::observability::{
    EventReporter, ImportEventSink, ParseErrorEvent, TracingSink, severity_for_error,
};
use super::pipeline::ProgressCallback;
use super::validate::extension_of;
use super::xml::XmlParser;

/// One file-format parser.
///
/// Implementations validate the file, detect its structure, map headers, and stream transformed
/// records in chunks. File-level problems are returned as [`ParseError`] (and reported to the
/// sink); row-level problems are counted in the result statistics.
pub trait Parser: Send + Sync {
    /// Input family this parser handles.
    fn format(&self) -> SourceFormat;

    /// Lowercased extensions accepted by [`Parser::parse`].
    fn supported_extensions(&self) -> &'static [&'static str];

    fn parse(
        &self,
        job: &ImportJob,
        path: &Path,
        options: &ParseOptions,
        progress: Option<&mut ProgressCallback<'_>>,
    ) -> ImportResult<ParseResult>;

    /// Validate `path` and resolve its layout without reading records into the pipeline.
    /// Emits no events.
    fn detect_structure(
        &self,
        path: &Path,
        options: &ParseOptions,
    ) -> ImportResult<DetectedStructure>;

    /// Headers, a few raw records and the detected structure. Emits no events.
    fn preview(&self, path: &Path, options: &ParseOptions) -> ImportResult<Preview>;
}

/// Collaborators shared by every parser of an engine.
///
/// Everything here is read-only once built, so one instance serves concurrent parses.
#[derive(Clone)]
pub struct ParserServices {
    pub mapper: Arc<FieldMapper>,
    pub transformers: Arc<Transformers>,
    pub sink: Arc<dyn ImportEventSink>,
    pub config: Arc<EngineConfig>,
}

impl fmt::Debug for ParserServices {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParserServices")
            .field("mapper", &self.mapper)
            .field("transformers", &self.transformers)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl ParserServices {
    pub fn new(
        mapper: Arc<FieldMapper>,
        transformers: Arc<Transformers>,
        sink: Arc<dyn ImportEventSink>,
        config: Arc<EngineConfig>,
    ) -> Self {
        Self {
            mapper,
            transformers,
            sink,
            config,
        }
    }

    /// Services built from `config`, with transformers honoring its decimal policy.
    pub fn from_config(config: EngineConfig, sink: Arc<dyn ImportEventSink>) -> Self {
        let transformers = Transformers::new(config.decimal_grouping);
        Self::new(
            Arc::new(FieldMapper::new()),
            Arc::new(transformers),
            sink,
            Arc::new(config),
        )
    }

    pub(crate) fn reporter<'a>(
        &'a self,
        job: &'a ImportJob,
        path: &'a Path,
        format: SourceFormat,
    ) -> EventReporter<'a> {
        EventReporter::new(
            self.sink.as_ref(),
            job,
            path,
            format,
            self.config.alert_at_or_above,
            self.config.confidence_floor,
        )
    }

    /// Wrap one parse with start/complete/error reporting and wall-clock timing.
    pub(crate) fn run_observed<F>(
        &self,
        job: &ImportJob,
        path: &Path,
        format: SourceFormat,
        options: &ParseOptions,
        body: F,
    ) -> ImportResult<ParseResult>
    where
        F: FnOnce(&EventReporter<'_>) -> ImportResult<ParseResult>,
    {
        let reporter = self.reporter(job, path, format);
        reporter.start(options);
        let started = Instant::now();

        match body(&reporter) {
            Ok(mut result) => {
                result.metadata.processing_time_seconds = started.elapsed().as_secs_f64();
                info!(
                    job = %job.id,
                    path = %path.display(),
                    rows = result.metadata.processed_rows,
                    error_rows = result.metadata.statistics.error_rows,
                    seconds = result.metadata.processing_time_seconds,
                    "parse complete"
                );
                reporter.complete(&result);
                Ok(result)
            }
            Err(err) => {
                reporter.error(&err);
                Err(err)
            }
        }
    }
}

/// Format-dispatching facade over the three parsers.
pub struct ImportEngine {
    services: ParserServices,
    csv: CsvParser,
    #[cfg(feature = "excel")]
    excel: ExcelParser,
    xml: XmlParser,
}

impl fmt::Debug for ImportEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImportEngine")
            .field("services", &self.services)
            .finish_non_exhaustive()
    }
}

impl Default for ImportEngine {
    /// Default configuration, events forwarded to `tracing`.
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl ImportEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self::with_sink(config, Arc::new(TracingSink))
    }

    pub fn with_sink(config: EngineConfig, sink: Arc<dyn ImportEventSink>) -> Self {
        Self::from_services(ParserServices::from_config(config, sink))
    }

    pub fn from_services(services: ParserServices) -> Self {
        Self {
            csv: CsvParser::new(services.clone()),
            #[cfg(feature = "excel")]
            excel: ExcelParser::new(services.clone()),
            xml: XmlParser::new(services.clone()),
            services,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.services.config
    }

    pub fn mapper(&self) -> &FieldMapper {
        &self.services.mapper
    }

    pub fn transformers(&self) -> &Transformers {
        &self.services.transformers
    }

    /// Resolve the parser for `path`: explicit `options.format` first, then the extension.
    pub fn parser_for(&self, path: &Path, options: &ParseOptions) -> ImportResult<&dyn Parser> {
        let format = match options.format {
            Some(f) => f,
            None => infer_format_from_path(path)?,
        };
        match format {
            SourceFormat::Csv => Ok(&self.csv),
            SourceFormat::Xml => Ok(&self.xml),
            #[cfg(feature = "excel")]
            SourceFormat::Excel => Ok(&self.excel),
            #[cfg(not(feature = "excel"))]
            SourceFormat::Excel => Err(ParseError::UnsupportedFormat {
                path: path.to_path_buf(),
                extension: extension_of(path),
            }),
        }
    }

    /// Parse `path` with the matching parser.
    ///
    /// An unresolvable format is reported to the sink before it is returned.
    pub fn parse(
        &self,
        job: &ImportJob,
        path: impl AsRef<Path>,
        options: &ParseOptions,
        progress: Option<&mut ProgressCallback<'_>>,
    ) -> ImportResult<ParseResult> {
        let path = path.as_ref();
        let parser = match self.parser_for(path, options) {
            Ok(parser) => parser,
            Err(err) => {
                self.report_unroutable(job, path, &err);
                return Err(err);
            }
        };
        debug!(job = %job.id, path = %path.display(), format = ?parser.format(), "dispatching parse");
        parser.parse(job, path, options, progress)
    }

    /// Structure of `path` as the matching parser sees it: encoding and delimiter, worksheet
    /// bounds, or XML format and record elements.
    pub fn detect_structure(
        &self,
        path: impl AsRef<Path>,
        options: &ParseOptions,
    ) -> ImportResult<DetectedStructure> {
        let path = path.as_ref();
        self.parser_for(path, options)?.detect_structure(path, options)
    }

    pub fn preview(&self, path: impl AsRef<Path>, options: &ParseOptions) -> ImportResult<Preview> {
        let path = path.as_ref();
        self.parser_for(path, options)?.preview(path, options)
    }

    fn report_unroutable(&self, job: &ImportJob, path: &Path, err: &ParseError) {
        let severity = severity_for_error(err);
        let event = ParseErrorEvent {
            job_id: job.id.clone(),
            path: path.to_path_buf(),
            format: None,
            severity,
            message: err.to_string(),
            location: err.location(),
        };
        self.services.sink.on_parse_error(&event);
        if severity >= self.services.config.alert_at_or_above {
            self.services.sink.on_alert(&event);
        }
    }
}

fn infer_format_from_path(path: &Path) -> ImportResult<SourceFormat> {
    let extension = extension_of(path);
    SourceFormat::from_extension(&extension).ok_or_else(|| ParseError::UnsupportedFormat {
        path: path.to_path_buf(),
        extension,
    })
}

/// Hint handed to the mapper for one parse.
pub(crate) fn hint_for(format: SourceFormat, options: &ParseOptions) -> FormatHint {
    FormatHint::new(format).with_software(options.software)
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::ingestion::observability::{ImportEvent, MemorySink};

    #[test]
    fn infers_format_from_extension() {
        assert_eq!(
            infer_format_from_path(Path::new("a/B.CSV")).unwrap(),
            SourceFormat::Csv
        );
        assert_eq!(
            infer_format_from_path(Path::new("x.ods")).unwrap(),
            SourceFormat::Excel
        );
        assert!(matches!(
            infer_format_from_path(Path::new("x.pdf")),
            Err(ParseError::UnsupportedFormat { extension, .. }) if extension == "pdf"
        ));
        assert!(infer_format_from_path(Path::new("noext")).is_err());
    }

    #[test]
    fn unsupported_extension_is_logged_without_format() {
        let sink = Arc::new(MemorySink::new());
        let engine = ImportEngine::with_sink(EngineConfig::default(), sink.clone());
        let path = PathBuf::from("report.pdf");

        let err = engine
            .parse(&ImportJob::new("j"), &path, &ParseOptions::default(), None)
            .unwrap_err();
        assert!(matches!(err, ParseError::UnsupportedFormat { .. }));

        let events = sink.events();
        assert_eq!(events.len(), 1);
        match &events[0] {
            ImportEvent::ParseError(e) => {
                assert_eq!(e.format, None);
                assert!(e.message.contains("pdf"));
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn explicit_format_overrides_extension() {
        let engine = ImportEngine::default();
        let opts = ParseOptions {
            format: Some(SourceFormat::Xml),
            ..Default::default()
        };
        let parser = engine.parser_for(Path::new("data.bin"), &opts).unwrap();
        assert_eq!(parser.format(), SourceFormat::Xml);
    }
}
