//! In-memory element tree and record extraction.

use std::io::BufRead;

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

use crate::error::ImportResult;
use crate::types::{Record, Value, XmlFormat};

use super::detect::{local_name, malformed};

/// A parsed element, namespace prefixes dropped.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Element {
    pub name: String,
    /// Attribute local names and unescaped values; namespace declarations are left out.
    pub attributes: Vec<(String, String)>,
    pub children: Vec<Element>,
    /// Concatenated direct text and CDATA.
    pub text: String,
}

impl Element {
    pub fn from_start(start: &BytesStart<'_>) -> ImportResult<Self> {
        let mut attributes = Vec::new();
        for attr in start.attributes() {
            let attr = attr.map_err(quick_xml::Error::from)?;
            if attr.key.as_namespace_binding().is_some() {
                continue;
            }
            let value = attr.unescape_value()?;
            attributes.push((local_name(attr.key.local_name().as_ref()), value.into_owned()));
        }
        Ok(Self {
            name: local_name(start.local_name().as_ref()),
            attributes,
            ..Default::default()
        })
    }

    /// Read the rest of the element opened by `start` from `reader`, up to its end tag.
    pub fn read<R: BufRead>(
        reader: &mut Reader<R>,
        start: &BytesStart<'_>,
        buf: &mut Vec<u8>,
    ) -> ImportResult<Self> {
        let mut stack = vec![Self::from_start(start)?];
        loop {
            buf.clear();
            match reader.read_event_into(buf)? {
                Event::Start(e) => stack.push(Self::from_start(&e)?),
                Event::Empty(e) => {
                    let leaf = Self::from_start(&e)?;
                    if let Some(parent) = stack.last_mut() {
                        parent.children.push(leaf);
                    }
                }
                Event::End(_) => {
                    let Some(done) = stack.pop() else {
                        return Err(malformed("unbalanced end tag", reader.buffer_position() as u64));
                    };
                    match stack.last_mut() {
                        Some(parent) => parent.children.push(done),
                        None => return Ok(done),
                    }
                }
                Event::Text(t) => {
                    let text = t.unescape()?;
                    if let Some(top) = stack.last_mut() {
                        top.text.push_str(&text);
                    }
                }
                Event::CData(c) => {
                    if let Some(top) = stack.last_mut() {
                        top.text.push_str(&String::from_utf8_lossy(&c));
                    }
                }
                Event::Eof => {
                    return Err(malformed(
                        "unexpected end of document",
                        reader.buffer_position() as u64,
                    ));
                }
                _ => {}
            }
        }
    }

    pub fn child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.name == name)
    }

    /// Follow a chain of child names.
    pub fn select(&self, path: &[&str]) -> Option<&Element> {
        path.iter().try_fold(self, |node, name| node.child(name))
    }

    /// Own text followed by descendant text, trimmed.
    pub fn text_content(&self) -> String {
        fn collect(node: &Element, out: &mut String) {
            out.push_str(&node.text);
            for child in &node.children {
                collect(child, out);
            }
        }
        let mut out = String::new();
        collect(self, &mut out);
        out.trim().to_string()
    }

    /// Outermost elements named `name`, in document order, including `self`.
    pub fn outermost<'a>(&'a self, name: &str, out: &mut Vec<&'a Element>) {
        if self.name == name {
            out.push(self);
            return;
        }
        for child in &self.children {
            child.outermost(name, out);
        }
    }

    /// Nested-map form: attributes as `@name`, leaf children as trimmed text, inner children as
    /// nested maps. Empty leaves are skipped; a repeated child name keeps the last occurrence.
    pub fn to_record(&self) -> Record {
        let mut record = Record::with_capacity(self.attributes.len() + self.children.len());
        for (name, value) in &self.attributes {
            record.insert(format!("@{name}"), Value::Utf8(value.clone()));
        }
        for child in &self.children {
            if child.children.is_empty() {
                let text = child.text.trim();
                if !text.is_empty() {
                    record.insert(child.name.clone(), Value::Utf8(text.to_string()));
                }
            } else {
                record.insert(child.name.clone(), Value::Map(child.to_record()));
            }
        }
        record
    }
}

/// Read the document element of `reader` in full.
pub fn read_document<R: BufRead>(reader: &mut Reader<R>) -> ImportResult<Element> {
    let mut buf = Vec::new();
    let mut inner = Vec::new();
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => {
                let start = e.into_owned();
                return Element::read(reader, &start, &mut inner);
            }
            Event::Empty(e) => return Element::from_start(&e),
            Event::Eof => return Err(malformed("document has no root element", 0)),
            _ => {}
        }
        buf.clear();
    }
}

/// One extracted field: output name and child path relative to the record element.
type FieldRule = (&'static str, &'static [&'static str]);

/// Field rules applied to every element named `container`.
pub struct RuleSet {
    pub container: &'static str,
    pub fields: &'static [FieldRule],
}

const UBL_INVOICE_RULES: &[RuleSet] = &[RuleSet {
    container: "InvoiceLine",
    fields: &[
        ("line_id", &["ID"]),
        ("quantity", &["InvoicedQuantity"]),
        ("unit_price", &["Price", "PriceAmount"]),
        ("line_total", &["LineExtensionAmount"]),
        ("item_name", &["Item", "Name"]),
        ("item_description", &["Item", "Description"]),
    ],
}];

const UBL_CREDIT_NOTE_RULES: &[RuleSet] = &[RuleSet {
    container: "CreditNoteLine",
    fields: &[
        ("line_id", &["ID"]),
        ("quantity", &["CreditedQuantity"]),
        ("unit_price", &["Price", "PriceAmount"]),
        ("line_total", &["LineExtensionAmount"]),
        ("item_name", &["Item", "Name"]),
        ("item_description", &["Item", "Description"]),
    ],
}];

const ONIVO_RULES: &[RuleSet] = &[
    RuleSet {
        container: "Customer",
        fields: &[
            ("customer_name", &["Name"]),
            ("tax_id", &["TaxID"]),
            ("address", &["Address"]),
            ("city", &["City"]),
        ],
    },
    RuleSet {
        container: "Invoice",
        fields: &[
            ("invoice_number", &["Number"]),
            ("invoice_date", &["Date"]),
            ("due_date", &["DueDate"]),
            ("total_amount", &["TotalAmount"]),
        ],
    },
];

/// Path-based extraction rules of a format; empty when records are converted as nested maps.
pub fn rules_for(format: XmlFormat) -> &'static [RuleSet] {
    match format {
        XmlFormat::UblInvoice => UBL_INVOICE_RULES,
        XmlFormat::UblCreditNote => UBL_CREDIT_NOTE_RULES,
        XmlFormat::OnivoExport => ONIVO_RULES,
        _ => &[],
    }
}

/// Apply `rules` to `root`: rule sets in order, matches in document order. Records where no
/// field yields text are dropped.
pub fn extract_with_rules(root: &Element, rules: &[RuleSet]) -> Vec<Record> {
    let mut records = Vec::new();
    for rule in rules {
        let mut nodes = Vec::new();
        for child in &root.children {
            child.outermost(rule.container, &mut nodes);
        }
        for node in nodes {
            let mut record = Record::with_capacity(rule.fields.len());
            for (field, path) in rule.fields {
                if let Some(value) = node.select(path).map(Element::text_content) {
                    if !value.is_empty() {
                        record.insert(*field, Value::Utf8(value));
                    }
                }
            }
            if !record.is_empty() {
                records.push(record);
            }
        }
    }
    records
}

/// Nested-map records of every outermost `element`.
pub fn extract_maps(root: &Element, element: &str) -> Vec<Record> {
    let mut nodes = Vec::new();
    root.outermost(element, &mut nodes);
    nodes.into_iter().map(Element::to_record).collect()
}
