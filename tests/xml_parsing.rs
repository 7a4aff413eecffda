use std::path::PathBuf;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use bookkeeping_import::ingestion::{ImportEngine, ImportEvent, MemorySink};
use bookkeeping_import::types::{StructureDetail, XmlFormat, XmlStructure};
use bookkeeping_import::{
    EngineConfig, ImportJob, ParseError, ParseOptions, Progress, ProgressError, Value,
};
use chrono::NaiveDate;

fn tmp_file(name: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    std::env::temp_dir().join(format!("bookkeeping-import-{name}-{nanos}.xml"))
}

fn write(name: &str, contents: &str) -> PathBuf {
    let path = tmp_file(name);
    std::fs::write(&path, contents).unwrap();
    path
}

fn engine_with(config: EngineConfig) -> (ImportEngine, Arc<MemorySink>) {
    let sink = Arc::new(MemorySink::new());
    (ImportEngine::with_sink(config, sink.clone()), sink)
}

fn xml_detail(detail: &StructureDetail) -> &XmlStructure {
    match detail {
        StructureDetail::Xml(x) => x,
        other => panic!("expected xml structure, got {other:?}"),
    }
}

const UBL_INVOICE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<Invoice xmlns="urn:oasis:names:specification:ubl:schema:xsd:Invoice-2"
         xmlns:cac="urn:oasis:names:specification:ubl:schema:xsd:CommonAggregateComponents-2"
         xmlns:cbc="urn:oasis:names:specification:ubl:schema:xsd:CommonBasicComponents-2">
  <cbc:ID>INV-2025-001</cbc:ID>
  <cbc:IssueDate>2025-01-15</cbc:IssueDate>
  <cac:InvoiceLine>
    <cbc:ID>1</cbc:ID>
    <cbc:InvoicedQuantity unitCode="C62">2</cbc:InvoicedQuantity>
    <cbc:LineExtensionAmount currencyID="MKD">21.00</cbc:LineExtensionAmount>
    <cac:Item><cbc:Name>Консултации</cbc:Name></cac:Item>
    <cac:Price><cbc:PriceAmount currencyID="MKD">10.50</cbc:PriceAmount></cac:Price>
  </cac:InvoiceLine>
  <cac:InvoiceLine>
    <cbc:ID>2</cbc:ID>
    <cbc:InvoicedQuantity unitCode="C62">1</cbc:InvoicedQuantity>
    <cbc:LineExtensionAmount currencyID="MKD">100.00</cbc:LineExtensionAmount>
    <cac:Item><cbc:Name>Hosting</cbc:Name><cbc:Description>Annual</cbc:Description></cac:Item>
    <cac:Price><cbc:PriceAmount currencyID="MKD">100.00</cbc:PriceAmount></cac:Price>
  </cac:InvoiceLine>
</Invoice>
"#;

const ONIVO_EXPORT: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<OnivoExport>
  <Customers>
    <Customer><Name>Acme ДООЕЛ</Name><TaxID>4030001234567</TaxID><City>Skopje</City></Customer>
  </Customers>
  <Invoices>
    <Invoice><Number>F-1</Number><Date>15.01.2025</Date><TotalAmount>1.234,56</TotalAmount></Invoice>
    <Invoice><Number>F-2</Number><Date>16.01.2025</Date><TotalAmount>99,90</TotalAmount></Invoice>
  </Invoices>
</OnivoExport>
"#;

const CATALOG: &str = r#"<catalog>
  <info><generated>2025-01-31</generated></info>
  <book id="b1"><title>Rust</title><price>39.90</price></book>
  <book id="b2"><title>XML</title><price>19.50</price></book>
  <book id="b3"><title>CSV</title><price>9.00</price><meta><pages>120</pages></meta></book>
</catalog>
"#;

#[test]
fn ubl_invoice_lines_are_extracted() {
    let path = write("ubl", UBL_INVOICE);
    let (engine, _) = engine_with(EngineConfig::default());

    let result = engine
        .parse(&ImportJob::new("1"), &path, &ParseOptions::default(), None)
        .unwrap();

    let detail = xml_detail(&result.metadata.structure.detail);
    assert_eq!(detail.format, XmlFormat::UblInvoice);
    assert_eq!(detail.root_element, "Invoice");
    assert_eq!(detail.record_elements.first().map(String::as_str), Some("InvoiceLine"));
    assert!(detail.namespaces.contains_key("cbc"));
    assert!(!detail.streaming);

    assert_eq!(result.rows.len(), 2);
    let line = &result.rows[0];
    assert_eq!(line.get("quantity"), Some(&Value::Int64(2)));
    assert_eq!(line.get("unit_price"), Some(&Value::Float64(10.5)));
    assert_eq!(line.get("amount"), Some(&Value::Float64(21.0)));
    assert_eq!(line.get("item_name"), Some(&Value::from("Консултации")));
    assert!(!line.contains_key("item_description"));
    assert_eq!(
        result.rows[1].get("item_description"),
        Some(&Value::from("Annual"))
    );
    assert_eq!(result.metadata.statistics.error_rows, 0);
}

#[test]
fn onivo_export_yields_customers_then_invoices() {
    let path = write("onivo", ONIVO_EXPORT);
    let (engine, _) = engine_with(EngineConfig::default());

    let result = engine
        .parse(&ImportJob::new("2"), &path, &ParseOptions::default(), None)
        .unwrap();

    assert_eq!(
        xml_detail(&result.metadata.structure.detail).format,
        XmlFormat::OnivoExport
    );
    assert_eq!(result.rows.len(), 3);
    assert_eq!(result.metadata.total_rows, 3);

    assert_eq!(result.rows[0].get("customer_name"), Some(&Value::from("Acme ДООЕЛ")));
    assert_eq!(result.rows[0].get("tax_id"), Some(&Value::from("4030001234567")));

    let invoice = &result.rows[1];
    assert_eq!(invoice.get("invoice_number"), Some(&Value::from("F-1")));
    assert_eq!(
        invoice.get("invoice_date"),
        Some(&Value::Date(NaiveDate::from_ymd_opt(2025, 1, 15).unwrap()))
    );
    assert_eq!(invoice.get("amount"), Some(&Value::Float64(1234.56)));
    assert_eq!(result.rows[2].get("amount"), Some(&Value::Float64(99.9)));
}

#[test]
fn unknown_document_discovers_repeating_element() {
    let path = write("catalog", CATALOG);
    let (engine, _) = engine_with(EngineConfig::default());

    let result = engine
        .parse(&ImportJob::new("3"), &path, &ParseOptions::default(), None)
        .unwrap();

    let detail = xml_detail(&result.metadata.structure.detail);
    assert_eq!(detail.format, XmlFormat::Unknown);
    assert_eq!(detail.record_elements.first().map(String::as_str), Some("book"));

    assert_eq!(result.rows.len(), 3);
    assert_eq!(result.rows[0].get("@id"), Some(&Value::from("b1")));
    assert_eq!(result.rows[0].get("title"), Some(&Value::from("Rust")));
    assert_eq!(result.rows[1].get("price"), Some(&Value::Float64(19.5)));
    match result.rows[2].get("meta") {
        Some(Value::Map(meta)) => assert_eq!(meta.get("pages"), Some(&Value::from("120"))),
        other => panic!("expected nested map, got {other:?}"),
    }
}

#[test]
fn large_documents_are_streamed() {
    let path = write("streamed", CATALOG);
    let (engine, _) = engine_with(EngineConfig {
        large_xml_threshold: 16,
        ..Default::default()
    });

    let result = engine
        .parse(&ImportJob::new("4"), &path, &ParseOptions::default(), None)
        .unwrap();

    assert!(xml_detail(&result.metadata.structure.detail).streaming);
    assert_eq!(result.rows.len(), 3);
    assert_eq!(result.metadata.processed_rows, 3);
    assert_eq!(result.metadata.total_rows, 3);
    assert_eq!(result.rows[2].get("title"), Some(&Value::from("CSV")));
    assert!(result.field_mappings.contains("title"));
}

#[test]
fn streamed_and_loaded_documents_agree() {
    let path = write("agree", CATALOG);
    let (tree_engine, _) = engine_with(EngineConfig::default());
    let (stream_engine, _) = engine_with(EngineConfig {
        large_xml_threshold: 16,
        ..Default::default()
    });
    let job = ImportJob::new("5");

    let loaded = tree_engine.parse(&job, &path, &ParseOptions::default(), None).unwrap();
    let streamed = stream_engine.parse(&job, &path, &ParseOptions::default(), None).unwrap();

    assert_eq!(loaded.rows, streamed.rows);
}

#[test]
fn malformed_document_is_reported_with_position() {
    let path = write("malformed", "<Invoices><Invoice><Number>1</Invoices>");
    let (engine, sink) = engine_with(EngineConfig::default());

    let err = engine
        .parse(&ImportJob::new("6"), &path, &ParseOptions::default(), None)
        .unwrap_err();

    assert!(matches!(err, ParseError::MalformedXml { .. }), "{err:?}");
    let events = sink.events();
    assert!(matches!(events.first(), Some(ImportEvent::ParseStart(_))));
    match events.last() {
        Some(ImportEvent::ParseError(e)) => {
            assert!(e.location.as_deref().is_some_and(|l| l.starts_with("byte ")));
        }
        other => panic!("expected parse error event, got {other:?}"),
    }
}

#[test]
fn preview_is_limited_and_raw() {
    let path = write("preview", CATALOG);
    let (engine, sink) = engine_with(EngineConfig {
        preview_rows: 2,
        ..Default::default()
    });

    let preview = engine.preview(&path, &ParseOptions::default()).unwrap();

    assert_eq!(preview.sample_rows.len(), 2);
    assert_eq!(preview.sample_rows[1].get("price"), Some(&Value::from("19.50")));
    assert_eq!(preview.headers, vec!["@id", "title", "price"]);
    assert!(sink.events().is_empty());
}

fn rows_with_bad_entity() -> String {
    let mut doc = String::from("<data>\n");
    for i in 1..=5 {
        let name = if i == 4 { "Acme &bogus; DOO".to_string() } else { format!("Firma {i}") };
        doc.push_str(&format!("  <row><naziv>{name}</naziv><iznos>{i}0</iznos></row>\n"));
    }
    doc.push_str("</data>\n");
    doc
}

#[test]
fn unknown_entity_is_rejected_before_any_record() {
    let path = write("bad-entity", &rows_with_bad_entity());
    for threshold in [u64::MAX, 16] {
        let (engine, sink) = engine_with(EngineConfig {
            large_xml_threshold: threshold,
            ..Default::default()
        });
        let options = ParseOptions {
            chunk_size: Some(1),
            ..Default::default()
        };
        let mut calls = 0;
        let mut cb = |_: Progress| -> Result<(), ProgressError> {
            calls += 1;
            Ok(())
        };

        let err = engine
            .parse(&ImportJob::new("8"), &path, &options, Some(&mut cb))
            .unwrap_err();

        assert!(matches!(err, ParseError::MalformedXml { .. }), "{threshold}: {err:?}");
        assert_eq!(calls, 0, "{threshold}");
        assert!(
            !sink
                .events()
                .iter()
                .any(|e| matches!(e, ImportEvent::MappingComplete(_)))
        );
    }
}

#[test]
fn invalid_utf8_text_is_rejected() {
    let path = tmp_file("bad-utf8");
    let mut doc = b"<data><row><naziv>".to_vec();
    doc.extend_from_slice(&[0xC8, 0xE7, 0xED]);
    doc.extend_from_slice(b"</naziv></row><row><naziv>B</naziv></row></data>");
    std::fs::write(&path, doc).unwrap();
    let (engine, _) = engine_with(EngineConfig::default());

    let err = engine
        .parse(&ImportJob::new("9"), &path, &ParseOptions::default(), None)
        .unwrap_err();

    assert!(matches!(err, ParseError::MalformedXml { .. }), "{err:?}");
}

#[test]
fn streamed_total_grows_past_a_low_estimate() {
    // Records sit after a long header, so the sampled head holds none of them.
    let padding = "x".repeat(400);
    let mut doc = format!("<catalog><info>{padding}</info>");
    for i in 1..=4 {
        doc.push_str(&format!("<book><title>T{i}</title><price>{i}.50</price></book>"));
    }
    doc.push_str("</catalog>");
    let path = write("low-estimate", &doc);
    let (engine, _) = engine_with(EngineConfig {
        large_xml_threshold: 16,
        xml_sample_bytes: 64,
        ..Default::default()
    });
    let options = ParseOptions {
        chunk_size: Some(1),
        ..Default::default()
    };

    let mut seen = Vec::new();
    let mut cb = |p: Progress| -> Result<(), ProgressError> {
        seen.push(p);
        Ok(())
    };
    let result = engine
        .parse(&ImportJob::new("10"), &path, &options, Some(&mut cb))
        .unwrap();

    assert_eq!(result.rows.len(), 4);
    assert_eq!(result.metadata.total_rows, 4);
    assert!(seen.iter().all(|p| p.percentage <= 100.0 && p.processed <= p.total), "{seen:?}");
    let last = seen.last().unwrap();
    assert_eq!((last.processed, last.total), (4, 4));
    assert_eq!(seen.iter().filter(|p| p.processed == 4).count(), 1);
}

#[test]
fn structure_detection_names_the_record_element() {
    let path = write("detect", UBL_INVOICE);
    let (engine, sink) = engine_with(EngineConfig::default());

    let structure = engine
        .detect_structure(&path, &ParseOptions::default())
        .unwrap();

    let detail = xml_detail(&structure.detail);
    assert_eq!(detail.format, XmlFormat::UblInvoice);
    assert_eq!(detail.record_elements.first().map(String::as_str), Some("InvoiceLine"));
    assert_eq!(structure.estimated_rows, 2);
    assert!(sink.events().is_empty());
}
