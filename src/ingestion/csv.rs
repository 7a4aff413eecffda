//! Delimited-text parser.
//!
//! Structure detection runs once on a head sample: the encoding is resolved by trial decoding
//! (UTF-8, then Windows-1251, then Windows-1252) and the delimiter by counting candidates outside
//! quotes over the first few lines. The file is then streamed twice: a counting pass for the
//! progress denominator and the transform pass.

use std::collections::HashSet;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use csv::ByteRecord;
use encoding_rs::{Encoding, UTF_8, WINDOWS_1251, WINDOWS_1252};
use tracing::debug;

use crate::config::ParseOptions;
use crate::error::{ImportResult, ParseError};
use crate::types::{
    DelimitedStructure, DetectedStructure, ImportJob, ParseResult, Preview, Record, SourceFormat,
    StructureDetail, Value,
};

use super::observability::EventReporter;
use super::pipeline::{ProgressCallback, RecordPipeline};
use super::unified::{Parser, ParserServices, hint_for};
use super::validate::validate_file;

/// Extensions accepted by [`CsvParser`].
pub const CSV_EXTENSIONS: &[&str] = &["csv", "txt"];

/// Delimiter candidates in tie-break order.
pub const DELIMITER_CANDIDATES: [u8; 4] = [b',', b';', b'\t', b'|'];

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Parser for `csv`/`txt` files.
#[derive(Debug, Clone)]
pub struct CsvParser {
    services: ParserServices,
}

/// Resolved reading parameters.
#[derive(Debug, Clone, Copy)]
struct Layout {
    encoding: &'static Encoding,
    delimiter: u8,
    has_headers: bool,
    skip_rows: usize,
}

impl Layout {
    fn describe(&self, file_size: u64, estimated_rows: usize) -> DetectedStructure {
        DetectedStructure {
            format: SourceFormat::Csv,
            file_size,
            estimated_rows,
            detail: StructureDetail::Delimited(DelimitedStructure {
                encoding: self.encoding.name().to_string(),
                delimiter: char::from(self.delimiter),
                has_headers: self.has_headers,
                skip_rows: self.skip_rows,
            }),
        }
    }
}

impl CsvParser {
    pub fn new(services: ParserServices) -> Self {
        Self { services }
    }

    fn detect(&self, path: &Path, options: &ParseOptions) -> ImportResult<Layout> {
        let config = &self.services.config;
        let sample = read_head(path, config.encoding_sample_bytes)?;
        let encoding = detect_encoding(&sample, options.encoding.as_deref())?;

        let delimiter = match options.delimiter {
            Some(c) => u8::try_from(c)
                .ok()
                .filter(u8::is_ascii)
                .ok_or_else(|| {
                    ParseError::InvalidConfig(format!("delimiter {c:?} is not a single-byte character"))
                })?,
            None => {
                let (text, _) = encoding.decode_without_bom_handling(&sample);
                detect_delimiter(&text, config.delimiter_sample_lines)
            }
        };

        debug!(
            path = %path.display(),
            encoding = encoding.name(),
            delimiter = %char::from(delimiter).escape_default(),
            "detected delimited structure"
        );
        Ok(Layout {
            encoding,
            delimiter,
            has_headers: options.has_headers,
            skip_rows: options.skip_rows,
        })
    }

    fn parse_observed(
        &self,
        path: &Path,
        options: &ParseOptions,
        progress: Option<&mut ProgressCallback<'_>>,
        reporter: &EventReporter<'_>,
    ) -> ImportResult<ParseResult> {
        let size = validate_file(path, &self.services.config, CSV_EXTENSIONS)?;
        let layout = self.detect(path, options)?;
        let total = count_records(path, &layout)?;

        let mut stream = RecordStream::open(path, &layout)?;
        let (headers, pending) = stream.headers(layout.has_headers)?;

        let mut pipeline = RecordPipeline::new(
            &self.services,
            hint_for(SourceFormat::Csv, options),
            options.chunk_size(&self.services.config),
            total,
            progress,
        );
        pipeline.register_headers(&headers);
        reporter.mapping_complete(pipeline.mappings());

        let mut row_number = 0;
        let mut next = pending;
        loop {
            let decoded = match next.take() {
                Some(decoded) => decoded,
                None => match stream.next_record()? {
                    Some(decoded) => decoded,
                    None => break,
                },
            };
            row_number += 1;
            match decoded.invalid_column {
                Some(column) => pipeline.reject(
                    row_number,
                    format_args!(
                        "invalid {} byte sequence in column {column}",
                        layout.encoding.name()
                    ),
                ),
                None => pipeline.push(row_number, to_record(&headers, decoded.fields))?,
            }
        }

        let output = pipeline.finish()?;
        let structure = layout.describe(size, output.statistics.total_rows);
        Ok(output.into_result(structure))
    }
}

impl Parser for CsvParser {
    fn format(&self) -> SourceFormat {
        SourceFormat::Csv
    }

    fn supported_extensions(&self) -> &'static [&'static str] {
        CSV_EXTENSIONS
    }

    fn parse(
        &self,
        job: &ImportJob,
        path: &Path,
        options: &ParseOptions,
        progress: Option<&mut ProgressCallback<'_>>,
    ) -> ImportResult<ParseResult> {
        self.services
            .run_observed(job, path, SourceFormat::Csv, options, |reporter| {
                self.parse_observed(path, options, progress, reporter)
            })
    }

    /// Encoding, delimiter and record count.
    fn detect_structure(
        &self,
        path: &Path,
        options: &ParseOptions,
    ) -> ImportResult<DetectedStructure> {
        let size = validate_file(path, &self.services.config, CSV_EXTENSIONS)?;
        let layout = self.detect(path, options)?;
        let rows = count_records(path, &layout)?;
        Ok(layout.describe(size, rows))
    }

    fn preview(&self, path: &Path, options: &ParseOptions) -> ImportResult<Preview> {
        let size = validate_file(path, &self.services.config, CSV_EXTENSIONS)?;
        let layout = self.detect(path, options)?;
        let total = count_records(path, &layout)?;

        let mut stream = RecordStream::open(path, &layout)?;
        let (headers, mut pending) = stream.headers(layout.has_headers)?;
        let limit = self.services.config.preview_rows;

        let mut sample_rows = Vec::with_capacity(limit);
        while sample_rows.len() < limit {
            let decoded = match pending.take() {
                Some(decoded) => decoded,
                None => match stream.next_record()? {
                    Some(decoded) => decoded,
                    None => break,
                },
            };
            if decoded.invalid_column.is_none() {
                sample_rows.push(to_record(&headers, decoded.fields));
            }
        }

        Ok(Preview {
            headers,
            sample_rows,
            detected_structure: layout.describe(size, total),
        })
    }
}

/// Resolve the character encoding of a head `sample`.
///
/// An explicit `requested` label wins; it must name an ASCII-compatible encoding. Otherwise a
/// UTF-8 BOM or a clean UTF-8 decode selects UTF-8, then Windows-1251, then Windows-1252
/// (the WHATWG resolution of ISO-8859-1).
pub fn detect_encoding(sample: &[u8], requested: Option<&str>) -> ImportResult<&'static Encoding> {
    if let Some(label) = requested {
        return match Encoding::for_label(label.trim().as_bytes()) {
            Some(encoding) if encoding.is_ascii_compatible() => Ok(encoding),
            _ => Err(ParseError::UnsupportedEncoding(label.to_string())),
        };
    }

    if sample.starts_with(UTF8_BOM) {
        return Ok(UTF_8);
    }
    match std::str::from_utf8(sample) {
        Ok(_) => return Ok(UTF_8),
        // The sample may end inside a multi-byte sequence.
        Err(e) if e.error_len().is_none() => return Ok(UTF_8),
        Err(_) => {}
    }
    if let Some(text) = WINDOWS_1251.decode_without_bom_handling_and_without_replacement(sample) {
        if reads_as_cyrillic(&text) {
            return Ok(WINDOWS_1251);
        }
    }
    Ok(WINDOWS_1252)
}

/// Whether a Windows-1251 decode looks like real Cyrillic text.
///
/// Latin-1 accents decode to Cyrillic letters glued to ASCII ones (`Mьller`), so a sample where
/// most Cyrillic-bearing words also carry ASCII letters is rejected.
fn reads_as_cyrillic(text: &str) -> bool {
    let (mut cyrillic, mut mixed) = (0usize, 0usize);
    for word in text.split(|c: char| !c.is_alphabetic()) {
        if !word.chars().any(|c| ('\u{0400}'..='\u{04FF}').contains(&c)) {
            continue;
        }
        cyrillic += 1;
        if word.chars().any(|c| c.is_ascii_alphabetic()) {
            mixed += 1;
        }
    }
    mixed * 2 <= cyrillic
}

/// Pick the delimiter occurring most often outside quotes over the first `max_lines` lines.
///
/// Ties go to the earlier entry of [`DELIMITER_CANDIDATES`]; no hits at all falls back to `,`.
pub fn detect_delimiter(sample: &str, max_lines: usize) -> u8 {
    let mut counts = [0usize; DELIMITER_CANDIDATES.len()];
    for line in sample.lines().take(max_lines.max(1)) {
        let mut in_quotes = false;
        for b in line.bytes() {
            if b == b'"' {
                in_quotes = !in_quotes;
                continue;
            }
            if in_quotes {
                continue;
            }
            if let Some(idx) = DELIMITER_CANDIDATES.iter().position(|c| *c == b) {
                counts[idx] += 1;
            }
        }
    }

    let mut best = 0;
    for idx in 1..counts.len() {
        if counts[idx] > counts[best] {
            best = idx;
        }
    }
    if counts[best] == 0 {
        b','
    } else {
        DELIMITER_CANDIDATES[best]
    }
}

/// Header names with blanks replaced by `column_N` and duplicates suffixed `_2`, `_3`, ...
pub fn header_names(raw: &[String]) -> Vec<String> {
    let mut used = HashSet::with_capacity(raw.len());
    raw.iter()
        .enumerate()
        .map(|(idx, name)| {
            let base = match name.trim() {
                "" => synthetic_header(idx),
                trimmed => trimmed.to_string(),
            };
            let mut candidate = base.clone();
            let mut n = 1;
            while used.contains(&candidate) {
                n += 1;
                candidate = format!("{base}_{n}");
            }
            used.insert(candidate.clone());
            candidate
        })
        .collect()
}

fn synthetic_header(idx: usize) -> String {
    format!("column_{}", idx + 1)
}

fn to_record(headers: &[String], fields: Vec<String>) -> Record {
    let mut record = Record::with_capacity(fields.len());
    for (idx, value) in fields.into_iter().enumerate() {
        let key = match headers.get(idx) {
            Some(h) => h.clone(),
            None => synthetic_header(idx),
        };
        record.insert(key, Value::Utf8(value.trim().to_string()));
    }
    record
}

fn read_head(path: &Path, limit: usize) -> ImportResult<Vec<u8>> {
    let mut sample = Vec::with_capacity(limit);
    File::open(path)?
        .take(limit as u64)
        .read_to_end(&mut sample)?;
    Ok(sample)
}

/// Non-blank data records after `skip_rows` and the header.
fn count_records(path: &Path, layout: &Layout) -> ImportResult<usize> {
    let mut stream = RecordStream::open(path, layout)?;
    let mut count: usize = 0;
    while stream.advance_non_blank()? {
        count += 1;
    }
    if layout.has_headers {
        count = count.saturating_sub(1);
    }
    Ok(count)
}

struct Decoded {
    /// Lossy text of every field.
    fields: Vec<String>,
    /// 1-based column that failed strict decoding, if any.
    invalid_column: Option<usize>,
}

struct RecordStream {
    reader: csv::Reader<File>,
    encoding: &'static Encoding,
    buf: ByteRecord,
    at_start: bool,
}

impl RecordStream {
    fn open(path: &Path, layout: &Layout) -> ImportResult<Self> {
        let reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .delimiter(layout.delimiter)
            .from_reader(File::open(path)?);
        let mut stream = Self {
            reader,
            encoding: layout.encoding,
            buf: ByteRecord::new(),
            at_start: true,
        };
        for _ in 0..layout.skip_rows {
            if !stream.reader.read_byte_record(&mut stream.buf)? {
                break;
            }
            stream.at_start = false;
        }
        Ok(stream)
    }

    /// Split off the header record. Headerless input synthesizes names from the first record,
    /// which is handed back to be processed as data.
    fn headers(&mut self, has_headers: bool) -> ImportResult<(Vec<String>, Option<Decoded>)> {
        let Some(first) = self.next_record()? else {
            return Ok((Vec::new(), None));
        };
        if has_headers {
            return Ok((header_names(&first.fields), None));
        }
        let headers = (0..first.fields.len()).map(synthetic_header).collect();
        Ok((headers, Some(first)))
    }

    fn advance_non_blank(&mut self) -> ImportResult<bool> {
        loop {
            if !self.reader.read_byte_record(&mut self.buf)? {
                return Ok(false);
            }
            if !self.buf.iter().all(|f| f.trim_ascii().is_empty()) {
                return Ok(true);
            }
            self.at_start = false;
        }
    }

    fn next_record(&mut self) -> ImportResult<Option<Decoded>> {
        let first = self.at_start;
        if !self.advance_non_blank()? {
            return Ok(None);
        }
        self.at_start = false;

        let mut fields = Vec::with_capacity(self.buf.len());
        let mut invalid_column = None;
        for (idx, bytes) in self.buf.iter().enumerate() {
            match self
                .encoding
                .decode_without_bom_handling_and_without_replacement(bytes)
            {
                Some(text) => fields.push(text.into_owned()),
                None => {
                    invalid_column.get_or_insert(idx + 1);
                    let (text, _) = self.encoding.decode_without_bom_handling(bytes);
                    fields.push(text.into_owned());
                }
            }
        }
        if first {
            if let Some(head) = fields.first_mut() {
                if let Some(stripped) = head.strip_prefix('\u{feff}') {
                    *head = stripped.to_string();
                }
            }
        }

        Ok(Some(Decoded {
            fields,
            invalid_column,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn comma_wins_with_three_per_line() {
        let sample = "a,b,c,d\n1,2,3,4\n5,6,7,8\n9,10,11,12\n13,14,15,16\n";
        assert_eq!(detect_delimiter(sample, 5), b',');
    }

    #[test]
    fn semicolon_and_quotes() {
        let sample = "\"Naziv, firma\";Iznos\n\"A, B\";1,5\n\"C, D\";2,5\n";
        assert_eq!(detect_delimiter(sample, 5), b';');
        assert_eq!(detect_delimiter("a\tb\tc\n1\t2\t3", 5), b'\t');
        assert_eq!(detect_delimiter("a|b\n1|2", 5), b'|');
    }

    #[test]
    fn no_candidates_defaults_to_comma() {
        assert_eq!(detect_delimiter("single\ncolumn\n", 5), b',');
    }

    #[test]
    fn ties_follow_candidate_order() {
        assert_eq!(detect_delimiter("a;b,c\n", 5), b',');
    }

    #[test]
    fn only_sampled_lines_count() {
        let sample = "a;b\n1;2\nx,y,z,w,v,u\n";
        assert_eq!(detect_delimiter(sample, 2), b';');
    }

    #[test]
    fn encoding_detection() {
        assert_eq!(detect_encoding(b"abc,def", None).unwrap(), UTF_8);
        assert_eq!(detect_encoding(b"\xEF\xBB\xBFa,b", None).unwrap(), UTF_8);
        assert_eq!(detect_encoding("Фактура".as_bytes(), None).unwrap(), UTF_8);
        // "Фактура" in windows-1251
        let cp1251 = [0xD4, 0xE0, 0xEA, 0xF2, 0xF3, 0xF0, 0xE0];
        assert_eq!(detect_encoding(&cp1251, None).unwrap(), WINDOWS_1251);
        // Truncated multi-byte sequence at the end of the sample.
        let mut cut = "Износ".as_bytes().to_vec();
        cut.pop();
        assert_eq!(detect_encoding(&cut, None).unwrap(), UTF_8);
    }

    #[test]
    fn latin1_accents_are_not_taken_for_cyrillic() {
        let (latin1, _, _) = WINDOWS_1252.encode("Kupac;Grad\nCafé Müller;Zürich\nSoñar;Málaga\n");
        assert_eq!(detect_encoding(&latin1, None).unwrap(), WINDOWS_1252);

        let (cyrillic, _, _) = WINDOWS_1251.encode("Klient;Износ\nФирма Скопје;10,5\n");
        assert_eq!(detect_encoding(&cyrillic, None).unwrap(), WINDOWS_1251);
    }

    #[test]
    fn explicit_encoding_label() {
        assert_eq!(detect_encoding(b"", Some("cp1251")).unwrap(), WINDOWS_1251);
        assert_eq!(detect_encoding(b"", Some("ISO-8859-1")).unwrap(), WINDOWS_1252);
        assert!(matches!(
            detect_encoding(b"", Some("utf-16le")),
            Err(ParseError::UnsupportedEncoding(_))
        ));
        assert!(matches!(
            detect_encoding(b"", Some("klingon")),
            Err(ParseError::UnsupportedEncoding(label)) if label == "klingon"
        ));
    }

    #[test]
    fn header_names_fill_blanks_and_dedupe() {
        let raw: Vec<String> = ["Iznos", "", "Iznos", "Iznos_2", " Datum "]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(
            header_names(&raw),
            vec!["Iznos", "column_2", "Iznos_2", "Iznos_2_2", "Datum"]
        );
    }

    #[test]
    fn extra_fields_get_synthetic_names() {
        let headers = vec!["a".to_string()];
        let record = to_record(&headers, vec![" 1 ".to_string(), "2".to_string()]);
        assert_eq!(record.get("a"), Some(&Value::from("1")));
        assert_eq!(record.get("column_2"), Some(&Value::from("2")));
    }
}
