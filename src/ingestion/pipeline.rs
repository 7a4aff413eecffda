//! Chunked record post-processing shared by the parsers.
//!
//! Parsers hand raw records to a [`RecordPipeline`] one at a time. The pipeline maps any
//! header it has not seen before, transforms the record, buffers it into a chunk, and on
//! every flush moves the chunk into the result and reports progress.

use tracing::{debug, warn};

use crate::error::{ImportResult, ProgressError};
use crate::mapping::FormatHint;
use crate::types::{
    DetectedStructure, FieldMappings, ParseMetadata, ParseResult, ParseStatistics, Progress, Record,
};

use super::unified::ParserServices;

/// Progress callback invoked at chunk boundaries and once more at 100% unless the last chunk
/// boundary already reported it.
///
/// Returning an error aborts the parse.
pub type ProgressCallback<'a> = dyn FnMut(Progress) -> Result<(), ProgressError> + 'a;

/// Everything the pipeline accumulated, handed back by [`RecordPipeline::finish`].
pub(crate) struct PipelineOutput {
    pub headers: Vec<String>,
    pub field_mappings: FieldMappings,
    pub rows: Vec<Record>,
    pub statistics: ParseStatistics,
}

impl PipelineOutput {
    /// Assemble the caller-facing result. Timing is filled in by the caller.
    pub(crate) fn into_result(self, structure: DetectedStructure) -> ParseResult {
        ParseResult {
            headers: self.headers,
            field_mappings: self.field_mappings,
            rows: self.rows,
            metadata: ParseMetadata {
                total_rows: self.statistics.total_rows,
                processed_rows: self.statistics.processed_rows,
                structure,
                processing_time_seconds: 0.0,
                statistics: self.statistics,
            },
        }
    }
}

pub(crate) struct RecordPipeline<'a, 'p> {
    services: &'a ParserServices,
    hint: FormatHint,
    chunk_size: usize,
    total: usize,
    headers: Vec<String>,
    mappings: FieldMappings,
    rows: Vec<Record>,
    chunk: Vec<Record>,
    stats: ParseStatistics,
    progress: Option<&'a mut ProgressCallback<'p>>,
    last_reported: Option<Progress>,
}

impl<'a, 'p> RecordPipeline<'a, 'p> {
    pub(crate) fn new(
        services: &'a ParserServices,
        hint: FormatHint,
        chunk_size: usize,
        total: usize,
        progress: Option<&'a mut ProgressCallback<'p>>,
    ) -> Self {
        Self {
            services,
            hint,
            chunk_size: chunk_size.max(1),
            total,
            headers: Vec::new(),
            mappings: FieldMappings::new(),
            rows: Vec::new(),
            chunk: Vec::with_capacity(chunk_size.max(1)),
            stats: ParseStatistics {
                total_rows: total,
                ..Default::default()
            },
            progress,
            last_reported: None,
        }
    }

    /// Register headers up front, mapping them in order.
    pub(crate) fn register_headers<S: AsRef<str>>(&mut self, headers: &[S]) {
        for header in headers {
            self.observe(header.as_ref());
        }
    }

    pub(crate) fn mappings(&self) -> &FieldMappings {
        &self.mappings
    }

    /// Update the row denominator (streamed inputs only know an estimate up front).
    pub(crate) fn set_total(&mut self, total: usize) {
        self.total = total;
        self.stats.total_rows = total;
    }

    /// Transform and buffer one raw record. Blank records are skipped.
    pub(crate) fn push(&mut self, row_number: usize, raw: Record) -> ImportResult<()> {
        if raw.is_blank() {
            return Ok(());
        }
        for key in raw.keys() {
            if !self.mappings.contains(key) {
                self.observe(key);
            }
        }

        let floor = self.services.config.confidence_floor;
        let record = self.services.transformers.transform_record(&raw, &self.mappings, floor);
        if record.has_errors() {
            let message = format!("Row {row_number}: {}", record.errors().join("; "));
            warn!(row = row_number, "{message}");
            self.stats.error_rows += 1;
            self.stats.warnings.push(message);
        }

        self.chunk.push(record);
        if self.chunk.len() >= self.chunk_size {
            self.flush()?;
        }
        Ok(())
    }

    /// Count a record that could not be extracted at all; it is not emitted.
    pub(crate) fn reject(&mut self, row_number: usize, reason: impl std::fmt::Display) {
        let message = format!("Row {row_number}: {reason}");
        warn!(row = row_number, "{message}");
        self.stats.error_rows += 1;
        self.stats.warnings.push(message);
    }

    /// Flush the tail chunk, report 100% and hand back the accumulated output.
    pub(crate) fn finish(mut self) -> ImportResult<PipelineOutput> {
        self.flush()?;
        let done = Progress::complete(self.stats.processed_rows, self.total);
        if self.last_reported != Some(done) {
            self.report(done)?;
        }
        Ok(PipelineOutput {
            headers: self.headers,
            field_mappings: self.mappings,
            rows: self.rows,
            statistics: self.stats,
        })
    }

    fn observe(&mut self, header: &str) {
        if self.mappings.contains(header) {
            return;
        }
        let mapping = self.services.mapper.map_field(header, self.hint);
        self.headers.push(header.to_string());
        self.mappings.insert(header, mapping);
    }

    fn flush(&mut self) -> ImportResult<()> {
        if self.chunk.is_empty() {
            return Ok(());
        }
        let flushed = self.chunk.len();
        self.stats.processed_rows += flushed;
        if self.total < self.stats.processed_rows {
            self.set_total(self.stats.processed_rows);
        }
        self.rows.append(&mut self.chunk);
        debug!(
            flushed,
            processed = self.stats.processed_rows,
            total = self.total,
            "chunk flushed"
        );
        self.report(Progress::new(self.stats.processed_rows, self.total))
    }

    fn report(&mut self, progress: Progress) -> ImportResult<()> {
        if let Some(cb) = self.progress.as_mut() {
            cb(progress)?;
            self.last_reported = Some(progress);
        }
        Ok(())
    }
}
