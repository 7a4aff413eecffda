//! XML validation and structure detection.
//!
//! One forward pass over the document checks well-formedness and, at the same time, records the
//! root element, its namespace bindings and per-element statistics used for record discovery.

use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::Read;
use std::path::Path;

use quick_xml::Reader;
use quick_xml::events::Event;
use quick_xml::name::PrefixDeclaration;
use regex::Regex;

use crate::error::{ImportResult, ParseError};
use crate::types::XmlFormat;

/// Root element names (lowercase) of generic accounting exports.
pub const ACCOUNTING_ROOTS: &[&str] = &[
    "invoice", "faktura", "фактура", "customer", "klient", "клиент", "item", "stavka", "ставка",
    "payment", "plakanje", "плаќање", "export", "izvoz", "извоз", "data", "podatoci", "подаци",
    "accounting", "smetkovodstvo", "сметководство",
];

/// Depth window (root is depth 1) searched when discovering record elements.
const DISCOVERY_DEPTHS: std::ops::RangeInclusive<usize> = 2..=6;

#[derive(Debug, Clone, Copy, Default)]
struct ElementStat {
    total: usize,
    in_window: usize,
    min_depth: usize,
    first_seen: usize,
}

/// Facts gathered by [`scan_document`].
#[derive(Debug, Clone, Default)]
pub struct DocumentScan {
    /// Local name of the root element.
    pub root: String,
    /// Prefix of the root element, if it is qualified.
    pub root_prefix: Option<String>,
    /// `prefix -> uri` declared on the root; the default namespace uses `""`.
    pub namespaces: BTreeMap<String, String>,
    stats: HashMap<String, ElementStat>,
}

impl DocumentScan {
    /// Namespace URI of the root element under `namespaces`.
    pub fn root_namespace<'a>(&self, namespaces: &'a BTreeMap<String, String>) -> Option<&'a str> {
        let prefix = self.root_prefix.as_deref().unwrap_or("");
        namespaces.get(prefix).map(String::as_str)
    }

    /// Occurrences of elements with local name `name` anywhere in the document.
    pub fn count(&self, name: &str) -> usize {
        self.stats.get(name).map_or(0, |s| s.total)
    }

    /// Elements repeating more than once inside the discovery window, most frequent first.
    ///
    /// Ties prefer the shallower element, then the one seen first.
    pub fn repeating_elements(&self) -> Vec<String> {
        let mut candidates: Vec<(&String, &ElementStat)> =
            self.stats.iter().filter(|(_, s)| s.in_window > 1).collect();
        candidates.sort_by(|(_, a), (_, b)| {
            b.in_window
                .cmp(&a.in_window)
                .then(a.min_depth.cmp(&b.min_depth))
                .then(a.first_seen.cmp(&b.first_seen))
        });
        candidates.into_iter().map(|(name, _)| name.clone()).collect()
    }
}

pub(crate) fn malformed(message: impl Into<String>, position: u64) -> ParseError {
    ParseError::MalformedXml {
        message: message.into(),
        position,
    }
}

pub(crate) fn local_name(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw).into_owned()
}

/// Validate `path` and collect its structure.
///
/// Fails with [`ParseError::MalformedXml`] on any syntax problem: mismatched or unclosed tags,
/// bad attributes, undeclared entities or invalid UTF-8 in text and attribute values, several
/// roots, text outside the root or no root at all.
pub fn scan_document(path: &Path) -> ImportResult<DocumentScan> {
    let mut reader = Reader::from_file(path)?;
    reader.config_mut().trim_text(true);

    let mut scan = DocumentScan::default();
    let mut buf = Vec::new();
    let mut depth = 0usize;
    let mut seen = 0usize;
    let mut has_root = false;

    loop {
        let event = match reader.read_event_into(&mut buf) {
            Ok(event) => event,
            Err(quick_xml::Error::Io(e)) => return Err(ParseError::Xml(quick_xml::Error::Io(e))),
            Err(e) => return Err(malformed(e.to_string(), reader.error_position() as u64)),
        };

        match &event {
            Event::Start(start) | Event::Empty(start) => {
                let self_closing = matches!(event, Event::Empty(_));
                let position = reader.buffer_position() as u64;
                depth += 1;

                let name = local_name(start.local_name().as_ref());
                if depth == 1 {
                    if has_root {
                        return Err(malformed("multiple root elements", position));
                    }
                    has_root = true;
                    scan.root = name.clone();
                    scan.root_prefix = start.name().prefix().map(|p| local_name(p.as_ref()));
                }

                for attr in start.attributes() {
                    let attr = attr.map_err(|e| malformed(e.to_string(), position))?;
                    let value = attr
                        .unescape_value()
                        .map_err(|e| malformed(e.to_string(), position))?;
                    if depth != 1 {
                        continue;
                    }
                    let prefix = match attr.key.as_namespace_binding() {
                        Some(PrefixDeclaration::Default) => String::new(),
                        Some(PrefixDeclaration::Named(p)) => local_name(p),
                        None => continue,
                    };
                    scan.namespaces.insert(prefix, value.into_owned());
                }

                seen += 1;
                let stat = scan.stats.entry(name).or_insert(ElementStat {
                    min_depth: depth,
                    first_seen: seen,
                    ..Default::default()
                });
                stat.total += 1;
                stat.min_depth = stat.min_depth.min(depth);
                if DISCOVERY_DEPTHS.contains(&depth) {
                    stat.in_window += 1;
                }

                if self_closing {
                    depth -= 1;
                }
            }
            Event::End(_) => depth = depth.saturating_sub(1),
            Event::Text(text) => {
                let position = reader.buffer_position() as u64;
                let text = text
                    .unescape()
                    .map_err(|e| malformed(e.to_string(), position))?;
                if depth == 0
                    && !text
                        .trim_matches(|c: char| c.is_whitespace() || c == '\u{feff}')
                        .is_empty()
                {
                    return Err(malformed("text outside the root element", position));
                }
            }
            Event::CData(data) => {
                std::str::from_utf8(data).map_err(|e| {
                    malformed(
                        format!("invalid UTF-8 in CDATA: {e}"),
                        reader.buffer_position() as u64,
                    )
                })?;
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    if depth > 0 {
        return Err(malformed(
            format!("unexpected end of document: {depth} unclosed element(s)"),
            reader.buffer_position() as u64,
        ));
    }
    if !has_root {
        return Err(malformed("document has no root element", 0));
    }
    Ok(scan)
}

/// Classify a document by its root element and the root's namespace URI.
pub fn detect_format(root: &str, namespace: Option<&str>) -> XmlFormat {
    let ns = namespace.unwrap_or("").to_ascii_lowercase();
    if ns.contains("ubl") && root == "Invoice" {
        return XmlFormat::UblInvoice;
    }
    if ns.contains("ubl") && root == "CreditNote" {
        return XmlFormat::UblCreditNote;
    }
    if ns.contains("onivo") || root == "OnivoExport" {
        return XmlFormat::OnivoExport;
    }
    if ns.contains("eslog") || root.eq_ignore_ascii_case("eslog") {
        return XmlFormat::Eslog;
    }
    if ns.contains("megasoft") || root == "MegasoftExport" {
        return XmlFormat::MegasoftExport;
    }
    if ns.contains("pantheon") || root == "PantheonExport" {
        return XmlFormat::PantheonExport;
    }
    if ACCOUNTING_ROOTS.contains(&root.to_lowercase().as_str()) {
        return XmlFormat::GenericAccounting;
    }
    XmlFormat::Unknown
}

/// Known record elements of a format, in priority order.
pub fn format_record_elements(format: XmlFormat) -> &'static [&'static str] {
    match format {
        XmlFormat::UblInvoice => &["InvoiceLine", "PaymentTerms", "TaxSubtotal"],
        XmlFormat::UblCreditNote => &["CreditNoteLine", "PaymentTerms", "TaxSubtotal"],
        XmlFormat::OnivoExport => &["Customer", "Invoice", "Item", "Payment"],
        XmlFormat::MegasoftExport => &["Record", "Item", "Transaction"],
        XmlFormat::PantheonExport => &["Document", "Entry", "Line"],
        XmlFormat::Eslog => &["Invoice", "InvoiceItem"],
        XmlFormat::GenericAccounting | XmlFormat::Unknown => &[],
    }
}

/// Record elements present in the document: the format's known elements that occur, or the
/// discovered repeating elements when none do.
pub fn record_elements(format: XmlFormat, scan: &DocumentScan) -> Vec<String> {
    let known: Vec<String> = format_record_elements(format)
        .iter()
        .filter(|name| scan.count(name) > 0)
        .map(|name| name.to_string())
        .collect();
    if known.is_empty() {
        scan.repeating_elements()
    } else {
        known
    }
}

/// Extrapolate the number of `element` records from the tag density of the file head.
pub fn estimate_records(
    path: &Path,
    element: &str,
    file_size: u64,
    sample_bytes: usize,
) -> ImportResult<usize> {
    let mut sample = Vec::with_capacity(sample_bytes);
    File::open(path)?
        .take(sample_bytes as u64)
        .read_to_end(&mut sample)?;
    if sample.is_empty() {
        return Ok(1);
    }

    let pattern = format!(r"<(?:[A-Za-z_][\w.\-]*:)?{}[\s/>]", regex::escape(element));
    let Ok(tag) = Regex::new(&pattern) else {
        return Ok(1);
    };
    let hits = tag.find_iter(&String::from_utf8_lossy(&sample)).count();
    if hits == 0 {
        return Ok(1);
    }
    let estimate = (file_size as f64 / sample.len() as f64) * hits as f64;
    Ok((estimate.round() as usize).max(1))
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::time::{SystemTime, UNIX_EPOCH};

    use super::*;

    fn write_tmp(contents: &str) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        let path = std::env::temp_dir().join(format!("bookkeeping_import_detect_{nanos}.xml"));
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn ubl_invoice_is_detected_from_namespace() {
        let path = write_tmp(
            r#"<?xml version="1.0"?>
<Invoice xmlns="urn:oasis:names:specification:ubl:schema:xsd:Invoice-2"
         xmlns:cac="urn:oasis:names:specification:ubl:schema:xsd:CommonAggregateComponents-2">
  <cac:InvoiceLine><ID>1</ID></cac:InvoiceLine>
  <cac:InvoiceLine><ID>2</ID></cac:InvoiceLine>
</Invoice>"#,
        );
        let scan = scan_document(&path).unwrap();
        assert_eq!(scan.root, "Invoice");
        assert_eq!(scan.namespaces.len(), 2);
        assert_eq!(
            detect_format(&scan.root, scan.root_namespace(&scan.namespaces)),
            XmlFormat::UblInvoice
        );
        assert_eq!(
            record_elements(XmlFormat::UblInvoice, &scan),
            vec!["InvoiceLine".to_string()]
        );
        assert_eq!(scan.count("InvoiceLine"), 2);
        std::fs::remove_file(path).ok();
    }

    #[test]
    fn vendor_and_generic_roots() {
        assert_eq!(detect_format("OnivoExport", None), XmlFormat::OnivoExport);
        assert_eq!(
            detect_format("Export", Some("http://www.onivo.mk/export/schema")),
            XmlFormat::OnivoExport
        );
        assert_eq!(detect_format("eSlog", None), XmlFormat::Eslog);
        assert_eq!(detect_format("MegasoftExport", None), XmlFormat::MegasoftExport);
        assert_eq!(detect_format("PantheonExport", None), XmlFormat::PantheonExport);
        assert_eq!(detect_format("Faktura", None), XmlFormat::GenericAccounting);
        assert_eq!(detect_format("Извоз", None), XmlFormat::GenericAccounting);
        assert_eq!(detect_format("Invoice", None), XmlFormat::GenericAccounting);
        assert_eq!(detect_format("Catalog", None), XmlFormat::Unknown);
    }

    #[test]
    fn discovery_picks_most_frequent_then_shallowest() {
        let path = write_tmp(
            "<catalog><book><t>a</t><p>1</p></book><book><t>b</t><p>2</p></book>\
             <book><t>c</t><p>3</p></book><meta>x</meta></catalog>",
        );
        let scan = scan_document(&path).unwrap();
        let found = scan.repeating_elements();
        assert_eq!(found[0], "book");
        assert!(!found.contains(&"meta".to_string()));
        std::fs::remove_file(path).ok();
    }

    #[test]
    fn malformed_documents_are_rejected() {
        for doc in [
            "<a><b></a>",
            "<a><b>",
            "<a x=1></a>",
            "<a></a><b></b>",
            "just text",
            "<a><b>&bogus;</b></a>",
            "<a><b x=\"&nope;\"/></a>",
        ] {
            let path = write_tmp(doc);
            let err = scan_document(&path).unwrap_err();
            assert!(
                matches!(err, ParseError::MalformedXml { .. }),
                "{doc}: {err:?}"
            );
            std::fs::remove_file(path).ok();
        }
    }

    #[test]
    fn invalid_utf8_text_is_rejected() {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        let path = std::env::temp_dir().join(format!("bookkeeping_import_detect_bin_{nanos}.xml"));
        let mut doc = b"<a><b>".to_vec();
        doc.extend_from_slice(&[0xff, 0xfe, 0x41]);
        doc.extend_from_slice(b"</b></a>");
        std::fs::write(&path, doc).unwrap();
        let err = scan_document(&path).unwrap_err();
        assert!(matches!(err, ParseError::MalformedXml { .. }), "{err:?}");
        std::fs::remove_file(path).ok();
    }

    #[test]
    fn estimates_by_tag_density() {
        let body: String = (0..50).map(|i| format!("<Row><id>{i}</id></Row>")).collect();
        let doc = format!("<data>{body}</data>");
        let path = write_tmp(&doc);
        let size = doc.len() as u64;
        assert_eq!(estimate_records(&path, "Row", size, doc.len()).unwrap(), 50);
        let half = estimate_records(&path, "Row", size, doc.len() / 2).unwrap();
        assert!((40..=60).contains(&half), "{half}");
        assert_eq!(estimate_records(&path, "Missing", size, 64).unwrap(), 1);
        std::fs::remove_file(path).ok();
    }
}
