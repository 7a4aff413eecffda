use std::fmt;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::config::ParseOptions;
use crate::error::ParseError;
use crate::types::{DetectedStructure, FieldMappings, ImportJob, ParseResult, SourceFormat};

/// Severity classification used for sink callbacks and alerting thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Informational event.
    Info,
    /// Warning-level event (non-fatal).
    Warning,
    /// Error-level event (parse failed).
    Error,
    /// Critical error (I/O and other infrastructure failures).
    Critical,
}

/// Severity of a fatal parse error. I/O problems are critical, everything else is an error.
pub fn severity_for_error(e: &ParseError) -> Severity {
    match e {
        ParseError::Io(_) | ParseError::NotReadable { .. } => Severity::Critical,
        ParseError::Csv(err) => match err.kind() {
            ::csv::ErrorKind::Io(_) => Severity::Critical,
            _ => Severity::Error,
        },
        ParseError::Xml(quick_xml::Error::Io(_)) => Severity::Critical,
        _ => Severity::Error,
    }
}

/// A parse is starting; emitted before validation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParseStartEvent {
    pub job_id: String,
    pub path: PathBuf,
    pub format: SourceFormat,
    /// Size from file metadata; 0 when the file cannot be stat'ed.
    pub file_size: u64,
    pub options: ParseOptions,
}

/// Headers have been mapped to canonical fields.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MappingCompleteEvent {
    pub job_id: String,
    pub path: PathBuf,
    pub total_fields: usize,
    /// Mappings at or above the confidence floor.
    pub mapped_fields: usize,
    pub field_mappings: FieldMappings,
}

/// A parse finished and produced a result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParseCompleteEvent {
    pub job_id: String,
    pub path: PathBuf,
    pub total_rows: usize,
    pub processed_rows: usize,
    pub error_rows: usize,
    pub warnings: usize,
    pub processing_time_seconds: f64,
    pub structure: DetectedStructure,
    pub field_mappings: FieldMappings,
}

/// A parse failed with a file-level error.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParseErrorEvent {
    pub job_id: String,
    pub path: PathBuf,
    pub format: Option<SourceFormat>,
    pub severity: Severity,
    pub message: String,
    /// Byte offset or line context, when the error carries one.
    pub location: Option<String>,
}

/// Any event, as recorded by [`MemorySink`] and written by [`JsonLinesSink`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ImportEvent {
    ParseStart(ParseStartEvent),
    MappingComplete(MappingCompleteEvent),
    ParseComplete(ParseCompleteEvent),
    ParseError(ParseErrorEvent),
    Alert(ParseErrorEvent),
}

/// Receiver for the events of every parse.
///
/// Implementors can persist import logs, record metrics, or trigger alerts. Callbacks run
/// synchronously on the parsing thread.
pub trait ImportEventSink: Send + Sync {
    fn on_parse_start(&self, _event: &ParseStartEvent) {}

    fn on_mapping_complete(&self, _event: &MappingCompleteEvent) {}

    fn on_parse_complete(&self, _event: &ParseCompleteEvent) {}

    fn on_parse_error(&self, _event: &ParseErrorEvent) {}

    /// Called when a parse error meets the alert threshold.
    ///
    /// Default behavior forwards to [`Self::on_parse_error`].
    fn on_alert(&self, event: &ParseErrorEvent) {
        self.on_parse_error(event)
    }
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl ImportEventSink for NoopSink {}

/// A sink that fans out callbacks to a list of sinks.
#[derive(Default)]
pub struct CompositeSink {
    sinks: Vec<Arc<dyn ImportEventSink>>,
}

impl CompositeSink {
    pub fn new(sinks: Vec<Arc<dyn ImportEventSink>>) -> Self {
        Self { sinks }
    }
}

impl fmt::Debug for CompositeSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompositeSink")
            .field("sinks_len", &self.sinks.len())
            .finish()
    }
}

impl ImportEventSink for CompositeSink {
    fn on_parse_start(&self, event: &ParseStartEvent) {
        for s in &self.sinks {
            s.on_parse_start(event);
        }
    }

    fn on_mapping_complete(&self, event: &MappingCompleteEvent) {
        for s in &self.sinks {
            s.on_mapping_complete(event);
        }
    }

    fn on_parse_complete(&self, event: &ParseCompleteEvent) {
        for s in &self.sinks {
            s.on_parse_complete(event);
        }
    }

    fn on_parse_error(&self, event: &ParseErrorEvent) {
        for s in &self.sinks {
            s.on_parse_error(event);
        }
    }

    fn on_alert(&self, event: &ParseErrorEvent) {
        for s in &self.sinks {
            s.on_alert(event);
        }
    }
}

/// Forwards events to `tracing` under the `import` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl ImportEventSink for TracingSink {
    fn on_parse_start(&self, event: &ParseStartEvent) {
        info!(
            target: "import",
            job = %event.job_id,
            path = %event.path.display(),
            format = ?event.format,
            file_size = event.file_size,
            "parse started"
        );
    }

    fn on_mapping_complete(&self, event: &MappingCompleteEvent) {
        info!(
            target: "import",
            job = %event.job_id,
            path = %event.path.display(),
            total_fields = event.total_fields,
            mapped_fields = event.mapped_fields,
            "field mapping complete"
        );
    }

    fn on_parse_complete(&self, event: &ParseCompleteEvent) {
        info!(
            target: "import",
            job = %event.job_id,
            path = %event.path.display(),
            total_rows = event.total_rows,
            processed_rows = event.processed_rows,
            error_rows = event.error_rows,
            seconds = event.processing_time_seconds,
            "parse complete"
        );
    }

    fn on_parse_error(&self, event: &ParseErrorEvent) {
        warn!(
            target: "import",
            job = %event.job_id,
            path = %event.path.display(),
            severity = ?event.severity,
            location = event.location.as_deref().unwrap_or(""),
            "parse failed: {}",
            event.message
        );
    }

    fn on_alert(&self, event: &ParseErrorEvent) {
        error!(
            target: "import",
            job = %event.job_id,
            path = %event.path.display(),
            severity = ?event.severity,
            "ALERT parse failed: {}",
            event.message
        );
    }
}

/// Appends one JSON object per event to a local file.
#[derive(Debug)]
pub struct JsonLinesSink {
    path: PathBuf,
    lock: Mutex<()>,
}

#[derive(Serialize)]
struct Stamped<'a> {
    ts: u64,
    #[serde(flatten)]
    event: &'a ImportEvent,
}

impl JsonLinesSink {
    /// Create a sink that appends events to `path`.
    ///
    /// Writes are best-effort; failures to open/write the log file are ignored.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            lock: Mutex::new(()),
        }
    }

    fn append(&self, event: ImportEvent) {
        let Ok(line) = serde_json::to_string(&Stamped {
            ts: unix_ts(),
            event: &event,
        }) else {
            return;
        };
        let _guard = self.lock.lock().ok();
        if let Ok(mut f) = OpenOptions::new().create(true).append(true).open(&self.path) {
            let _ = writeln!(f, "{line}");
        }
    }
}

impl ImportEventSink for JsonLinesSink {
    fn on_parse_start(&self, event: &ParseStartEvent) {
        self.append(ImportEvent::ParseStart(event.clone()));
    }

    fn on_mapping_complete(&self, event: &MappingCompleteEvent) {
        self.append(ImportEvent::MappingComplete(event.clone()));
    }

    fn on_parse_complete(&self, event: &ParseCompleteEvent) {
        self.append(ImportEvent::ParseComplete(event.clone()));
    }

    fn on_parse_error(&self, event: &ParseErrorEvent) {
        self.append(ImportEvent::ParseError(event.clone()));
    }

    fn on_alert(&self, event: &ParseErrorEvent) {
        self.append(ImportEvent::Alert(event.clone()));
    }
}

/// Keeps every event in memory, in arrival order.
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<ImportEvent>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the events recorded so far.
    pub fn events(&self) -> Vec<ImportEvent> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn push(&self, event: ImportEvent) {
        match self.events.lock() {
            Ok(mut events) => events.push(event),
            Err(poisoned) => poisoned.into_inner().push(event),
        }
    }
}

impl ImportEventSink for MemorySink {
    fn on_parse_start(&self, event: &ParseStartEvent) {
        self.push(ImportEvent::ParseStart(event.clone()));
    }

    fn on_mapping_complete(&self, event: &MappingCompleteEvent) {
        self.push(ImportEvent::MappingComplete(event.clone()));
    }

    fn on_parse_complete(&self, event: &ParseCompleteEvent) {
        self.push(ImportEvent::ParseComplete(event.clone()));
    }

    fn on_parse_error(&self, event: &ParseErrorEvent) {
        self.push(ImportEvent::ParseError(event.clone()));
    }

    fn on_alert(&self, event: &ParseErrorEvent) {
        self.push(ImportEvent::Alert(event.clone()));
    }
}

/// Per-call event emitter bound to one job, path and format.
pub(crate) struct EventReporter<'a> {
    sink: &'a dyn ImportEventSink,
    job: &'a ImportJob,
    path: &'a Path,
    format: SourceFormat,
    alert_at_or_above: Severity,
    floor: f64,
}

impl<'a> EventReporter<'a> {
    pub(crate) fn new(
        sink: &'a dyn ImportEventSink,
        job: &'a ImportJob,
        path: &'a Path,
        format: SourceFormat,
        alert_at_or_above: Severity,
        floor: f64,
    ) -> Self {
        Self {
            sink,
            job,
            path,
            format,
            alert_at_or_above,
            floor,
        }
    }

    pub(crate) fn start(&self, options: &ParseOptions) {
        let file_size = std::fs::metadata(self.path).map(|m| m.len()).unwrap_or(0);
        self.sink.on_parse_start(&ParseStartEvent {
            job_id: self.job.id.clone(),
            path: self.path.to_path_buf(),
            format: self.format,
            file_size,
            options: options.clone(),
        });
    }

    pub(crate) fn mapping_complete(&self, mappings: &FieldMappings) {
        self.sink.on_mapping_complete(&MappingCompleteEvent {
            job_id: self.job.id.clone(),
            path: self.path.to_path_buf(),
            total_fields: mappings.len(),
            mapped_fields: mappings.applied_count(self.floor),
            field_mappings: mappings.clone(),
        });
    }

    pub(crate) fn complete(&self, result: &ParseResult) {
        let meta = &result.metadata;
        self.sink.on_parse_complete(&ParseCompleteEvent {
            job_id: self.job.id.clone(),
            path: self.path.to_path_buf(),
            total_rows: meta.total_rows,
            processed_rows: meta.processed_rows,
            error_rows: meta.statistics.error_rows,
            warnings: meta.statistics.warnings.len(),
            processing_time_seconds: meta.processing_time_seconds,
            structure: meta.structure.clone(),
            field_mappings: result.field_mappings.clone(),
        });
    }

    /// Report a fatal error, escalating to `on_alert` at or above the threshold.
    pub(crate) fn error(&self, err: &ParseError) {
        let severity = severity_for_error(err);
        let event = ParseErrorEvent {
            job_id: self.job.id.clone(),
            path: self.path.to_path_buf(),
            format: Some(self.format),
            severity,
            message: err.to_string(),
            location: err.location(),
        };
        self.sink.on_parse_error(&event);
        if severity >= self.alert_at_or_above {
            self.sink.on_alert(&event);
        }
    }
}

fn unix_ts() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
