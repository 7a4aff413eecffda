#![cfg(feature = "excel")]

//! Spreadsheet parser (`.xlsx`, `.xls`, `.xlsm`, `.xlsb`, `.ods`).
//!
//! The selected worksheet is loaded in one go from cached cell values and the workbook is
//! dropped before records are streamed through the pipeline. `.csv` inputs are handed to the
//! delimited-text parser.

use std::path::Path;

use calamine::{Data, Range, Reader, open_workbook_auto};
use chrono::Duration;
use tracing::debug;

use crate::config::{ParseOptions, WorksheetSelector};
use crate::error::{ImportResult, ParseError};
use crate::mapping::normalize::transliterate;
use crate::transform::date::serial_to_date;
use crate::types::{
    DetectedStructure, ImportJob, ParseResult, Preview, Record, SheetStructure, SourceFormat,
    StructureDetail, Value,
};

use super::csv::{CsvParser, header_names};
use super::observability::EventReporter;
use super::pipeline::{ProgressCallback, RecordPipeline};
use super::unified::{Parser, ParserServices, hint_for};
use super::validate::{extension_of, validate_file};

/// Extensions accepted by [`ExcelParser`]; `csv` is delegated.
pub const EXCEL_EXTENSIONS: &[&str] = &["xlsx", "xls", "xlsm", "xlsb", "ods", "csv"];

/// Sheet-name keywords (transliterated, lowercase) that mark data sheets.
const PRIORITY_KEYWORDS: &[&str] = &[
    // Macedonian
    "klienti", "kupci", "fakturi", "smetki", "stavki", "proizvodi", "artikli", "plakanja",
    "placanja", "trosoci", "rashodi",
    // Serbian
    "klijenti", "musterije", "fakture", "racuni", "stavke", "artikali", "uplate", "troskovi",
    // English
    "customers", "clients", "invoices", "bills", "items", "products", "payments", "expenses",
];

/// Sheet-name keywords of metadata sheets.
const PENALTY_KEYWORDS: &[&str] = &["config", "settings", "meta", "info", "summary"];

/// Score a worksheet for auto-selection.
///
/// A priority keyword is worth 10, more than 100 rows 5, more than 1000 rows another 3, and a
/// metadata-like name costs 5.
pub fn score_sheet(name: &str, rows: usize) -> i32 {
    let name = transliterate(&name.to_lowercase());
    let mut score = 0;
    if PRIORITY_KEYWORDS.iter().any(|k| name.contains(k)) {
        score += 10;
    }
    if rows > 100 {
        score += 5;
    }
    if rows > 1000 {
        score += 3;
    }
    if PENALTY_KEYWORDS.iter().any(|k| name.contains(k)) {
        score -= 5;
    }
    score
}

/// Parser for spreadsheet workbooks.
#[derive(Debug, Clone)]
pub struct ExcelParser {
    services: ParserServices,
    csv: CsvParser,
}

struct LoadedSheet {
    name: String,
    cells: Range<Data>,
    formulas: Option<Range<String>>,
}

/// Resolved 1-based, inclusive bounds in sheet coordinates. `header_row` is 0 when headerless.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Bounds {
    header_row: usize,
    first_row: usize,
    last_row: usize,
    first_column: usize,
    last_column: usize,
}

impl Bounds {
    /// Explicit options win; anything unset comes from the used range.
    fn resolve(cells: &Range<Data>, options: &ParseOptions) -> Self {
        let (used_start, used_end) = match (cells.start(), cells.end()) {
            (Some(start), Some(end)) => (start, end),
            _ => ((0, 0), (0, 0)),
        };
        let first_used_row = used_start.0 as usize + 1;
        let last_used_row = if cells.is_empty() { 0 } else { used_end.0 as usize + 1 };

        let header_row = if options.has_headers {
            options.header_row.max(first_used_row)
        } else {
            0
        };
        let first_row = options
            .data_start_row
            .unwrap_or(if options.has_headers {
                header_row + 1
            } else {
                first_used_row
            })
            .max(1);

        Self {
            header_row,
            first_row,
            last_row: options.data_end_row.unwrap_or(last_used_row),
            first_column: options
                .data_start_column
                .unwrap_or(used_start.1 as usize + 1)
                .max(1),
            last_column: options.data_end_column.unwrap_or(if cells.is_empty() {
                0
            } else {
                used_end.1 as usize + 1
            }),
        }
    }

    fn columns(&self) -> std::ops::RangeInclusive<usize> {
        self.first_column..=self.last_column
    }

    fn rows(&self) -> std::ops::RangeInclusive<usize> {
        self.first_row..=self.last_row
    }
}

impl LoadedSheet {
    fn cell(&self, row: usize, column: usize) -> Value {
        let position = ((row - 1) as u32, (column - 1) as u32);
        let cached = self.cells.get_value(position).unwrap_or(&Data::Empty);
        if matches!(cached, Data::Empty | Data::Error(_)) {
            if let Some(formula) = self
                .formulas
                .as_ref()
                .and_then(|f| f.get_value(position))
                .filter(|f| !f.trim().is_empty())
            {
                return Value::Utf8(format!("={}", formula.trim()));
            }
        }
        cell_value(cached)
    }

    fn headers(&self, bounds: &Bounds) -> Vec<String> {
        let raw: Vec<String> = bounds
            .columns()
            .map(|column| match bounds.header_row {
                0 => String::new(),
                row => self.cell(row, column).to_string(),
            })
            .collect();
        header_names(&raw)
    }

    fn record(&self, headers: &[String], bounds: &Bounds, row: usize) -> Record {
        let mut record = Record::with_capacity(headers.len());
        for (header, column) in headers.iter().zip(bounds.columns()) {
            record.insert(header.clone(), self.cell(row, column));
        }
        record
    }

    fn data_rows(&self, bounds: &Bounds) -> usize {
        bounds
            .rows()
            .filter(|row| bounds.columns().any(|c| !self.cell(*row, c).is_empty()))
            .count()
    }

    fn describe(&self, bounds: &Bounds, file_size: u64, rows: usize) -> DetectedStructure {
        DetectedStructure {
            format: SourceFormat::Excel,
            file_size,
            estimated_rows: rows,
            detail: StructureDetail::Spreadsheet(SheetStructure {
                worksheet: self.name.clone(),
                has_headers: bounds.header_row > 0,
                header_row: bounds.header_row,
                data_start_row: bounds.first_row,
                data_end_row: bounds.last_row,
                data_start_column: bounds.first_column,
                data_end_column: bounds.last_column,
            }),
        }
    }
}

impl ExcelParser {
    pub fn new(services: ParserServices) -> Self {
        Self {
            csv: CsvParser::new(services.clone()),
            services,
        }
    }

    fn load(&self, path: &Path, selector: &WorksheetSelector) -> ImportResult<LoadedSheet> {
        let mut workbook = open_workbook_auto(path)?;
        let names = workbook.sheet_names();
        if names.is_empty() {
            return Err(ParseError::NoWorksheets);
        }

        let (name, cells) = match selector {
            WorksheetSelector::Name(name) => {
                if !names.contains(name) {
                    return Err(ParseError::WorksheetNotFound {
                        name: name.clone(),
                        available: names,
                    });
                }
                let cells = workbook.worksheet_range(name)?;
                (name.clone(), cells)
            }
            WorksheetSelector::Index(index) => {
                let name = names
                    .get(*index)
                    .cloned()
                    .ok_or(ParseError::WorksheetIndexOutOfRange {
                        index: *index,
                        count: names.len(),
                    })?;
                let cells = workbook.worksheet_range(&name)?;
                (name, cells)
            }
            WorksheetSelector::Auto => {
                let mut best: Option<(i32, usize, String, Range<Data>)> = None;
                for name in names {
                    let cells = workbook.worksheet_range(&name)?;
                    let rows = non_empty_rows(&cells);
                    let score = score_sheet(&name, rows);
                    debug!(sheet = %name, rows, score, "scored worksheet");
                    let better = match &best {
                        None => true,
                        Some((s, r, _, _)) => score > *s || (score == *s && rows > *r),
                    };
                    if better {
                        best = Some((score, rows, name, cells));
                    }
                }
                match best {
                    Some((_, _, name, cells)) => (name, cells),
                    None => return Err(ParseError::NoWorksheets),
                }
            }
        };

        let formulas = match workbook.worksheet_formula(&name) {
            Ok(formulas) => Some(formulas),
            Err(e) => {
                debug!(sheet = %name, error = %e, "formula text unavailable");
                None
            }
        };

        Ok(LoadedSheet {
            name,
            cells,
            formulas,
        })
    }

    fn parse_observed(
        &self,
        path: &Path,
        options: &ParseOptions,
        progress: Option<&mut ProgressCallback<'_>>,
        reporter: &EventReporter<'_>,
    ) -> ImportResult<ParseResult> {
        let size = validate_file(path, &self.services.config, EXCEL_EXTENSIONS)?;
        let sheet = self.load(path, &options.worksheet)?;
        let bounds = Bounds::resolve(&sheet.cells, options);
        let total = sheet.data_rows(&bounds);
        debug!(sheet = %sheet.name, ?bounds, total, "resolved worksheet bounds");

        let headers = sheet.headers(&bounds);
        let mut pipeline = RecordPipeline::new(
            &self.services,
            hint_for(SourceFormat::Excel, options),
            options.chunk_size(&self.services.config),
            total,
            progress,
        );
        pipeline.register_headers(&headers);
        reporter.mapping_complete(pipeline.mappings());

        for row in bounds.rows() {
            let record = sheet.record(&headers, &bounds, row);
            if record.is_blank() {
                continue;
            }
            pipeline.push(row, record)?;
        }

        let output = pipeline.finish()?;
        let structure = sheet.describe(&bounds, size, total);
        Ok(output.into_result(structure))
    }
}

impl Parser for ExcelParser {
    fn format(&self) -> SourceFormat {
        SourceFormat::Excel
    }

    fn supported_extensions(&self) -> &'static [&'static str] {
        EXCEL_EXTENSIONS
    }

    fn parse(
        &self,
        job: &ImportJob,
        path: &Path,
        options: &ParseOptions,
        progress: Option<&mut ProgressCallback<'_>>,
    ) -> ImportResult<ParseResult> {
        if extension_of(path) == "csv" {
            return self.csv.parse(job, path, options, progress);
        }
        self.services
            .run_observed(job, path, SourceFormat::Excel, options, |reporter| {
                self.parse_observed(path, options, progress, reporter)
            })
    }

    fn detect_structure(
        &self,
        path: &Path,
        options: &ParseOptions,
    ) -> ImportResult<DetectedStructure> {
        if extension_of(path) == "csv" {
            return self.csv.detect_structure(path, options);
        }
        let size = validate_file(path, &self.services.config, EXCEL_EXTENSIONS)?;
        let sheet = self.load(path, &options.worksheet)?;
        let bounds = Bounds::resolve(&sheet.cells, options);
        Ok(sheet.describe(&bounds, size, sheet.data_rows(&bounds)))
    }

    fn preview(&self, path: &Path, options: &ParseOptions) -> ImportResult<Preview> {
        if extension_of(path) == "csv" {
            return self.csv.preview(path, options);
        }
        let size = validate_file(path, &self.services.config, EXCEL_EXTENSIONS)?;
        let sheet = self.load(path, &options.worksheet)?;
        let bounds = Bounds::resolve(&sheet.cells, options);
        let headers = sheet.headers(&bounds);

        let limit = self.services.config.preview_rows;
        let sample_rows: Vec<Record> = bounds
            .rows()
            .map(|row| sheet.record(&headers, &bounds, row))
            .filter(|record| !record.is_blank())
            .take(limit)
            .collect();

        Ok(Preview {
            detected_structure: sheet.describe(&bounds, size, sheet.data_rows(&bounds)),
            headers,
            sample_rows,
        })
    }
}

fn non_empty_rows(cells: &Range<Data>) -> usize {
    cells
        .rows()
        .filter(|row| row.iter().any(|c| !cell_value(c).is_empty()))
        .count()
}

/// Convert one cached cell value.
///
/// Integral numbers become integers, date cells ISO dates (or `YYYY-MM-DDTHH:MM:SS` when the
/// serial carries a time), text is trimmed.
pub fn cell_value(cell: &Data) -> Value {
    match cell {
        Data::Empty => Value::Null,
        Data::String(s) => match s.trim() {
            "" => Value::Null,
            trimmed => Value::Utf8(trimmed.to_string()),
        },
        Data::Int(i) => Value::Int64(*i),
        Data::Float(f) => {
            if f.fract() == 0.0 && f.abs() < i64::MAX as f64 {
                Value::Int64(*f as i64)
            } else {
                Value::Float64(*f)
            }
        }
        Data::Bool(b) => Value::Bool(*b),
        Data::DateTime(dt) => serial_value(dt.as_f64()),
        Data::DateTimeIso(s) | Data::DurationIso(s) => Value::Utf8(s.trim().to_string()),
        Data::Error(e) => Value::Utf8(e.to_string()),
    }
}

fn serial_value(serial: f64) -> Value {
    let Some(date) = serial_to_date(serial) else {
        return Value::Float64(serial);
    };
    let seconds = (serial.fract() * 86_400.0).round() as i64;
    if seconds == 0 {
        return Value::Date(date);
    }
    match date.and_hms_opt(0, 0, 0) {
        Some(midnight) => {
            let at = midnight + Duration::seconds(seconds);
            Value::Utf8(at.format("%Y-%m-%dT%H:%M:%S").to_string())
        }
        None => Value::Date(date),
    }
}
