use std::path::PathBuf;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use bookkeeping_import::ingestion::{
    CompositeSink, ImportEngine, ImportEvent, ImportEventSink, JsonLinesSink, MemorySink,
    ParseErrorEvent, Severity,
};
use bookkeeping_import::{EngineConfig, ImportJob, ParseError, ParseOptions};

fn tmp_file(name: &str, ext: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    std::env::temp_dir().join(format!("bookkeeping-import-{name}-{nanos}.{ext}"))
}

fn write(name: &str, ext: &str, contents: &str) -> PathBuf {
    let path = tmp_file(name, ext);
    std::fs::write(&path, contents).unwrap();
    path
}

#[test]
fn successful_parse_emits_start_mapping_complete_in_order() {
    let path = write("events-ok", "csv", "Klient,Iznos,Nepoznato\nAcme,\"1,5\",x\n");
    let sink = Arc::new(MemorySink::new());
    let engine = ImportEngine::with_sink(EngineConfig::default(), sink.clone());

    engine
        .parse(&ImportJob::new("job-1"), &path, &ParseOptions::default(), None)
        .unwrap();

    let events = sink.events();
    assert_eq!(events.len(), 3, "{events:?}");
    match &events[0] {
        ImportEvent::ParseStart(e) => {
            assert_eq!(e.job_id, "job-1");
            assert_eq!(e.path, path);
            assert!(e.file_size > 0);
        }
        other => panic!("expected start, got {other:?}"),
    }
    match &events[1] {
        ImportEvent::MappingComplete(e) => {
            assert_eq!(e.total_fields, 3);
            assert!(e.mapped_fields >= 2);
            assert!(e.field_mappings.contains("Nepoznato"));
        }
        other => panic!("expected mapping complete, got {other:?}"),
    }
    match &events[2] {
        ImportEvent::ParseComplete(e) => {
            assert_eq!(e.total_rows, 1);
            assert_eq!(e.processed_rows, 1);
            assert_eq!(e.error_rows, 0);
            assert!(e.processing_time_seconds >= 0.0);
        }
        other => panic!("expected complete, got {other:?}"),
    }
}

#[test]
fn unsupported_extension_is_reported_without_format() {
    let path = write("events-unsupported", "json", "{}");
    let sink = Arc::new(MemorySink::new());
    let engine = ImportEngine::with_sink(EngineConfig::default(), sink.clone());

    let err = engine
        .parse(&ImportJob::new("job-2"), &path, &ParseOptions::default(), None)
        .unwrap_err();

    assert!(matches!(err, ParseError::UnsupportedFormat { ref extension, .. } if extension == "json"));
    let events = sink.events();
    assert_eq!(events.len(), 1);
    match &events[0] {
        ImportEvent::ParseError(e) => {
            assert_eq!(e.format, None);
            assert_eq!(e.severity, Severity::Error);
        }
        other => panic!("expected parse error, got {other:?}"),
    }
}

#[test]
fn errors_at_the_threshold_raise_alerts() {
    let path = write("events-alert", "xml", "<a><b></a>");
    let sink = Arc::new(MemorySink::new());
    let engine = ImportEngine::with_sink(
        EngineConfig {
            alert_at_or_above: Severity::Error,
            ..Default::default()
        },
        sink.clone(),
    );

    engine
        .parse(&ImportJob::new("job-3"), &path, &ParseOptions::default(), None)
        .unwrap_err();

    let events = sink.events();
    let kinds: Vec<&str> = events
        .iter()
        .map(|e| match e {
            ImportEvent::ParseStart(_) => "start",
            ImportEvent::MappingComplete(_) => "mapping",
            ImportEvent::ParseComplete(_) => "complete",
            ImportEvent::ParseError(_) => "error",
            ImportEvent::Alert(_) => "alert",
        })
        .collect();
    assert_eq!(kinds, vec!["start", "error", "alert"]);
}

#[test]
fn errors_below_the_threshold_do_not_alert() {
    let path = write("events-no-alert", "xml", "<a><b></a>");
    let sink = Arc::new(MemorySink::new());
    let engine = ImportEngine::with_sink(EngineConfig::default(), sink.clone());

    engine
        .parse(&ImportJob::new("job-4"), &path, &ParseOptions::default(), None)
        .unwrap_err();

    assert!(!sink.events().iter().any(|e| matches!(e, ImportEvent::Alert(_))));
}

#[test]
fn json_lines_sink_writes_one_object_per_event() {
    let log = tmp_file("events", "jsonl");
    let path = write("events-jsonl", "csv", "Klient;Iznos\nAcme;10\n");
    let engine = ImportEngine::with_sink(EngineConfig::default(), Arc::new(JsonLinesSink::new(&log)));

    engine
        .parse(&ImportJob::new("job-5"), &path, &ParseOptions::default(), None)
        .unwrap();

    let contents = std::fs::read_to_string(&log).unwrap();
    let lines: Vec<serde_json::Value> = contents
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert_eq!(lines.len(), 3);
    assert_eq!(lines[0]["event"], "parse_start");
    assert_eq!(lines[1]["event"], "mapping_complete");
    assert_eq!(lines[2]["event"], "parse_complete");
    assert_eq!(lines[2]["job_id"], "job-5");
    assert!(lines[2]["ts"].is_u64());
}

#[test]
fn composite_sink_fans_out() {
    let a = Arc::new(MemorySink::new());
    let b = Arc::new(MemorySink::new());
    let composite = CompositeSink::new(vec![
        a.clone() as Arc<dyn ImportEventSink>,
        b.clone() as Arc<dyn ImportEventSink>,
    ]);

    let event = ParseErrorEvent {
        job_id: "job-6".to_string(),
        path: PathBuf::from("x.csv"),
        format: None,
        severity: Severity::Critical,
        message: "disk".to_string(),
        location: None,
    };
    composite.on_alert(&event);

    assert_eq!(a.events(), vec![ImportEvent::Alert(event.clone())]);
    assert_eq!(b.events(), vec![ImportEvent::Alert(event)]);
}
