//! XML parser.
//!
//! Every document is validated and scanned once up front (see [`detect`]). Documents up to
//! [`EngineConfig::large_xml_threshold`](crate::EngineConfig) are then loaded as an element tree
//! and extracted with the format's rule table, or as nested maps when the format has none.
//! Larger documents are walked with a forward-only cursor that materializes one record element at
//! a time; their row total is a sampled estimate.

pub mod detect;
pub mod tree;

use std::collections::BTreeMap;
use std::io::BufRead;
use std::path::Path;

use quick_xml::Reader;
use quick_xml::events::Event;
use tracing::debug;

use crate::config::ParseOptions;
use crate::error::ImportResult;
use crate::types::{
    DetectedStructure, ImportJob, ParseResult, Preview, Record, SourceFormat, StructureDetail,
    XmlStructure,
};

use super::observability::EventReporter;
use super::pipeline::{ProgressCallback, RecordPipeline};
use super::unified::{Parser, ParserServices, hint_for};
use super::validate::validate_file;

use self::detect::{DocumentScan, local_name};
use self::tree::{Element, extract_maps, extract_with_rules, read_document, rules_for};

/// Extensions accepted by [`XmlParser`].
pub const XML_EXTENSIONS: &[&str] = &["xml"];

/// Parser for XML documents.
#[derive(Debug, Clone)]
pub struct XmlParser {
    services: ParserServices,
}

/// Everything resolved before the first record is read.
struct Plan {
    file_size: u64,
    structure: XmlStructure,
    /// Element that makes up one record.
    record_element: String,
    estimated_rows: usize,
}

impl Plan {
    fn describe(&self, estimated_rows: usize) -> DetectedStructure {
        DetectedStructure {
            format: SourceFormat::Xml,
            file_size: self.file_size,
            estimated_rows,
            detail: StructureDetail::Xml(self.structure.clone()),
        }
    }
}

impl XmlParser {
    pub fn new(services: ParserServices) -> Self {
        Self { services }
    }

    fn plan(&self, path: &Path, options: &ParseOptions) -> ImportResult<Plan> {
        let config = &self.services.config;
        let file_size = validate_file(path, config, XML_EXTENSIONS)?;
        let scan = detect::scan_document(path)?;

        let mut namespaces: BTreeMap<String, String> = scan.namespaces.clone();
        for (prefix, uri) in &options.namespaces {
            namespaces.insert(prefix.clone(), uri.clone());
        }
        let format = detect::detect_format(&scan.root, scan.root_namespace(&namespaces));
        let record_elements = detect::record_elements(format, &scan);
        let record_element = record_elements
            .first()
            .cloned()
            .unwrap_or_else(|| scan.root.clone());
        let streaming = file_size > config.large_xml_threshold;

        let estimated_rows = if streaming {
            detect::estimate_records(path, &record_element, file_size, config.xml_sample_bytes)?
        } else {
            exact_count(&scan, &record_element)
        };

        debug!(
            path = %path.display(),
            ?format,
            root = %scan.root,
            record_element = %record_element,
            streaming,
            estimated_rows,
            "detected xml structure"
        );

        Ok(Plan {
            file_size,
            structure: XmlStructure {
                format,
                root_element: scan.root,
                namespaces,
                record_elements,
                streaming,
            },
            record_element,
            estimated_rows,
        })
    }

    /// Load the whole document and extract its records.
    fn load_records(&self, path: &Path, plan: &Plan) -> ImportResult<Vec<Record>> {
        let mut reader = Reader::from_file(path)?;
        reader.config_mut().trim_text(true);
        let root = read_document(&mut reader)?;

        let rules = rules_for(plan.structure.format);
        if !rules.is_empty() {
            let records = extract_with_rules(&root, rules);
            if !records.is_empty() {
                return Ok(records);
            }
        }
        Ok(extract_maps(&root, &plan.record_element))
    }

    fn parse_observed(
        &self,
        path: &Path,
        options: &ParseOptions,
        progress: Option<&mut ProgressCallback<'_>>,
        reporter: &EventReporter<'_>,
    ) -> ImportResult<ParseResult> {
        let plan = self.plan(path, options)?;
        let mut pipeline = RecordPipeline::new(
            &self.services,
            hint_for(SourceFormat::Xml, options),
            options.chunk_size(&self.services.config),
            plan.estimated_rows,
            progress,
        );

        if plan.structure.streaming {
            let mut ordinal = 0;
            stream_records(path, &plan.record_element, |record| {
                ordinal += 1;
                pipeline.push(ordinal, record)?;
                Ok(true)
            })?;
            reporter.mapping_complete(pipeline.mappings());
        } else {
            let records = self.load_records(path, &plan)?;
            pipeline.set_total(records.len());
            pipeline.register_headers(&union_keys(&records));
            reporter.mapping_complete(pipeline.mappings());
            for (idx, record) in records.into_iter().enumerate() {
                pipeline.push(idx + 1, record)?;
            }
        }

        let output = pipeline.finish()?;
        let estimated = if plan.structure.streaming {
            plan.estimated_rows
        } else {
            output.statistics.total_rows
        };
        let structure = plan.describe(estimated);
        Ok(output.into_result(structure))
    }
}

impl Parser for XmlParser {
    fn format(&self) -> SourceFormat {
        SourceFormat::Xml
    }

    fn supported_extensions(&self) -> &'static [&'static str] {
        XML_EXTENSIONS
    }

    fn parse(
        &self,
        job: &ImportJob,
        path: &Path,
        options: &ParseOptions,
        progress: Option<&mut ProgressCallback<'_>>,
    ) -> ImportResult<ParseResult> {
        self.services
            .run_observed(job, path, SourceFormat::Xml, options, |reporter| {
                self.parse_observed(path, options, progress, reporter)
            })
    }

    /// Validate `path` and resolve its format, namespaces and record elements.
    fn detect_structure(
        &self,
        path: &Path,
        options: &ParseOptions,
    ) -> ImportResult<DetectedStructure> {
        let plan = self.plan(path, options)?;
        Ok(plan.describe(plan.estimated_rows))
    }

    fn preview(&self, path: &Path, options: &ParseOptions) -> ImportResult<Preview> {
        let plan = self.plan(path, options)?;
        let limit = self.services.config.preview_rows;

        let sample_rows = if plan.structure.streaming {
            let mut sample = Vec::with_capacity(limit);
            if limit > 0 {
                stream_records(path, &plan.record_element, |record| {
                    if !record.is_blank() {
                        sample.push(record);
                    }
                    Ok(sample.len() < limit)
                })?;
            }
            sample
        } else {
            let mut records = self.load_records(path, &plan)?;
            records.retain(|r| !r.is_blank());
            records.truncate(limit);
            records
        };

        Ok(Preview {
            headers: union_keys(&sample_rows),
            sample_rows,
            detected_structure: plan.describe(plan.estimated_rows),
        })
    }
}

fn exact_count(scan: &DocumentScan, element: &str) -> usize {
    scan.count(element).max(1)
}

/// Top-level keys of `records` in first-appearance order.
fn union_keys(records: &[Record]) -> Vec<String> {
    let mut keys: Vec<String> = Vec::new();
    for record in records {
        for key in record.keys() {
            if !keys.iter().any(|k| k == key) {
                keys.push(key.to_string());
            }
        }
    }
    keys
}

/// Walk `path` and hand every outermost `element` to `visit` as a nested-map record.
///
/// `visit` returns `false` to stop early.
fn stream_records<F>(path: &Path, element: &str, visit: F) -> ImportResult<()>
where
    F: FnMut(Record) -> ImportResult<bool>,
{
    let mut reader = Reader::from_file(path)?;
    reader.config_mut().trim_text(true);
    stream_from(&mut reader, element, visit)
}

fn stream_from<R, F>(reader: &mut Reader<R>, element: &str, mut visit: F) -> ImportResult<()>
where
    R: BufRead,
    F: FnMut(Record) -> ImportResult<bool>,
{
    let mut buf = Vec::new();
    let mut inner = Vec::new();
    loop {
        let record = match reader.read_event_into(&mut buf)? {
            Event::Start(e) if local_name(e.local_name().as_ref()) == element => {
                let start = e.into_owned();
                Some(Element::read(reader, &start, &mut inner)?.to_record())
            }
            Event::Empty(e) if local_name(e.local_name().as_ref()) == element => {
                Some(Element::from_start(&e)?.to_record())
            }
            Event::Eof => return Ok(()),
            _ => None,
        };
        buf.clear();
        if let Some(record) = record {
            if !visit(record)? {
                return Ok(());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect(doc: &str, element: &str) -> Vec<Record> {
        let mut reader = Reader::from_str(doc);
        reader.config_mut().trim_text(true);
        let mut out = Vec::new();
        stream_from(&mut reader, element, |r| {
            out.push(r);
            Ok(true)
        })
        .unwrap();
        out
    }

    #[test]
    fn cursor_emits_outermost_records_only() {
        let doc = "<x><Item><n>a</n><Item><n>inner</n></Item></Item><Item n2=\"b\"/></x>";
        let records = collect(doc, "Item");
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].get("@n2"), Some(&crate::types::Value::from("b")));
    }

    #[test]
    fn union_keeps_first_appearance_order() {
        let a: Record = [("b".to_string(), "1".into()), ("a".to_string(), "2".into())]
            .into_iter()
            .collect();
        let c: Record = [("c".to_string(), "3".into()), ("a".to_string(), "4".into())]
            .into_iter()
            .collect();
        assert_eq!(union_keys(&[a, c]), vec!["b", "a", "c"]);
    }
}
