use std::hint::black_box;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use bookkeeping_import::ingestion::{ImportEngine, NoopSink};
use bookkeeping_import::mapping::{FieldMapper, FormatHint};
use bookkeeping_import::types::SourceFormat;
use bookkeeping_import::{EngineConfig, ImportJob, ParseOptions};
use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};

fn tmp_file(name: &str, ext: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    std::env::temp_dir().join(format!("bookkeeping-import-bench-{name}-{nanos}.{ext}"))
}

fn write_invoices_csv(rows: usize) -> PathBuf {
    let mut out = String::from("Broj faktura;Datum faktura;Klient;Kolicina;Iznos;Aktiven\n");
    for i in 0..rows {
        out.push_str(&format!(
            "F-{i:06};{:02}.{:02}.2025;Klient {i};{};{}.{:03},{:02};да\n",
            i % 28 + 1,
            i % 12 + 1,
            i % 50 + 1,
            i % 9 + 1,
            i % 1000,
            i % 100
        ));
    }
    let path = tmp_file("invoices", "csv");
    std::fs::write(&path, out).unwrap();
    path
}

fn write_catalog_xml(records: usize) -> PathBuf {
    let mut out = String::from("<Export>\n");
    for i in 0..records {
        out.push_str(&format!(
            "  <Record id=\"{i}\"><Naziv>Artikal {i}</Naziv><Cena>{}.50</Cena><Datum>2025-01-{:02}</Datum></Record>\n",
            i % 500,
            i % 28 + 1
        ));
    }
    out.push_str("</Export>\n");
    let path = tmp_file("records", "xml");
    std::fs::write(&path, out).unwrap();
    path
}

fn bench_csv(c: &mut Criterion) {
    let engine = ImportEngine::with_sink(EngineConfig::default(), Arc::new(NoopSink));
    let job = ImportJob::new("bench");
    let mut group = c.benchmark_group("csv_parse");
    for rows in [1_000usize, 10_000] {
        let path = write_invoices_csv(rows);
        group.throughput(Throughput::Elements(rows as u64));
        group.bench_with_input(BenchmarkId::from_parameter(rows), &path, |b, path| {
            b.iter(|| {
                let result = engine
                    .parse(&job, path, &ParseOptions::default(), None)
                    .unwrap();
                black_box(result.rows.len())
            })
        });
        std::fs::remove_file(&path).ok();
    }
    group.finish();
}

fn bench_xml(c: &mut Criterion) {
    let tree = ImportEngine::with_sink(EngineConfig::default(), Arc::new(NoopSink));
    let streamed = ImportEngine::with_sink(
        EngineConfig {
            large_xml_threshold: 0,
            ..Default::default()
        },
        Arc::new(NoopSink),
    );
    let job = ImportJob::new("bench");
    let path = write_catalog_xml(5_000);

    let mut group = c.benchmark_group("xml_parse");
    group.throughput(Throughput::Elements(5_000));
    for (label, engine) in [("tree", &tree), ("streamed", &streamed)] {
        group.bench_function(label, |b| {
            b.iter(|| {
                let result = engine
                    .parse(&job, &path, &ParseOptions::default(), None)
                    .unwrap();
                black_box(result.rows.len())
            })
        });
    }
    group.finish();
    std::fs::remove_file(&path).ok();
}

fn bench_mapping(c: &mut Criterion) {
    let mapper = FieldMapper::new();
    let hint = FormatHint::new(SourceFormat::Csv);
    let headers = [
        "Broj na faktura",
        "Датум на фактура",
        "Naziv kupca",
        "Edinicna cena",
        "PDV iznos",
        "Nepoznata kolona",
    ];
    c.bench_function("map_fields", |b| {
        b.iter(|| black_box(mapper.map_fields(&headers, hint)))
    });
}

criterion_group!(benches, bench_csv, bench_xml, bench_mapping);
criterion_main!(benches);
