//! Word-group scoring for names that no alias or pattern recognizes.
//!
//! A name containing a word of a group is routed to one of the group's fields by the other
//! words it carries, so `ddv_stopa` and `ddv` land on different VAT fields.

/// Confidence of a match on a group's everyday words.
pub const BASIC_CONFIDENCE: f64 = 0.6;
/// Confidence of a match on words taken from vendor export layouts.
pub const VENDOR_CONFIDENCE: f64 = 0.75;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Group {
    Financial,
    Identity,
    Temporal,
    Quantity,
    Descriptive,
    Tax,
    Payment,
}

struct WordGroup {
    group: Group,
    basic: &'static [&'static str],
    vendor: &'static [&'static str],
}

/// Groups in scoring order; an earlier group keeps a tie.
const GROUPS: &[WordGroup] = &[
    WordGroup {
        group: Group::Financial,
        basic: &["iznos", "suma", "cena", "amount", "price", "cost", "value", "vrednost"],
        vendor: &["total_price", "line_amount", "cena_robe", "iznos_stavke", "stavka_iznos"],
    },
    WordGroup {
        group: Group::Identity,
        basic: &["broj", "id", "sifra", "number", "code", "reference"],
        vendor: &["customer_id", "sifra_kupca", "partner_sifra", "dok_broj"],
    },
    WordGroup {
        group: Group::Temporal,
        basic: &["datum", "data", "date", "time", "period"],
        vendor: &["invoice_date", "datum_racuna", "dokument_datum", "uplata_datum"],
    },
    WordGroup {
        group: Group::Quantity,
        basic: &["kolicina", "broj", "count", "quantity", "amount"],
        vendor: &["item_quantity", "kolicina_robe", "stavka_kolicina"],
    },
    WordGroup {
        group: Group::Descriptive,
        basic: &["naziv", "ime", "opis", "name", "description", "title"],
        vendor: &["customer_name", "naziv_kupca", "partner_naziv", "item_name"],
    },
    WordGroup {
        group: Group::Tax,
        basic: &["pdv", "ddv", "vat", "tax", "porez"],
        vendor: &["vat_rate", "stopa_pdv", "stavka_pdv_stopa"],
    },
    WordGroup {
        group: Group::Payment,
        basic: &["plakanje", "uplata", "payment", "paid"],
        vendor: &["payment_date", "datum_placanja", "uplata_datum"],
    },
];

const VAT_WORDS: &[&str] = &["vat", "pdv", "ddv"];
const RATE_WORDS: &[&str] = &["rate", "stopa", "stapka", "percent", "procen", "%"];
const CUSTOMER_WORDS: &[&str] = &["customer", "kupac", "kupuvac", "klient", "partner"];
const ITEM_WORDS: &[&str] = &["item", "stavka", "proizvod", "artik", "roba"];

fn has_any(name: &str, words: &[&str]) -> bool {
    words.iter().any(|w| name.contains(w))
}

/// Field a name containing a word of `group` stands for.
fn route(group: Group, name: &str) -> &'static str {
    match group {
        Group::Financial => {
            if has_any(name, VAT_WORDS) {
                if has_any(name, RATE_WORDS) {
                    "vat_rate"
                } else {
                    "vat_amount"
                }
            } else if has_any(name, &["unit", "jedinic", "edinic"]) {
                "unit_price"
            } else if has_any(name, &["total", "ukupno", "vkupno"]) {
                "total"
            } else {
                "amount"
            }
        }
        Group::Identity => {
            if has_any(name, CUSTOMER_WORDS) {
                "customer_id"
            } else if has_any(name, &["invoice", "faktura", "racun"]) {
                "invoice_number"
            } else if has_any(name, ITEM_WORDS) {
                "item_code"
            } else if has_any(name, &["tax", "pib", "embs", "edb"]) {
                "tax_id"
            } else {
                "customer_id"
            }
        }
        Group::Temporal => {
            if has_any(name, &["due", "dospe", "valuta"]) {
                "due_date"
            } else if has_any(name, &["payment", "plac", "uplata"]) {
                "payment_date"
            } else if has_any(name, &["invoice", "faktura"]) {
                "invoice_date"
            } else {
                "date"
            }
        }
        Group::Quantity => "quantity",
        Group::Descriptive => {
            if has_any(name, CUSTOMER_WORDS) {
                "customer_name"
            } else if has_any(name, ITEM_WORDS) {
                "item_name"
            } else {
                "description"
            }
        }
        Group::Tax => {
            if has_any(name, RATE_WORDS) {
                "vat_rate"
            } else {
                "vat_amount"
            }
        }
        Group::Payment => {
            if has_any(name, &["amount", "iznos"]) {
                "payment_amount"
            } else if has_any(name, &["method", "nacin"]) {
                "payment_method"
            } else if has_any(name, &["reference", "referenc"]) {
                "payment_reference"
            } else {
                "payment_date"
            }
        }
    }
}

/// Best word-group candidate for an already normalized name: `(field, confidence)`.
pub fn semantic_match(normalized: &str) -> Option<(&'static str, f64)> {
    let mut best: Option<(&'static str, f64)> = None;
    for group in GROUPS {
        for (words, confidence) in [
            (group.basic, BASIC_CONFIDENCE),
            (group.vendor, VENDOR_CONFIDENCE),
        ] {
            if !has_any(normalized, words) {
                continue;
            }
            if best.is_none_or(|(_, c)| confidence > c) {
                best = Some((route(group.group, normalized), confidence));
            }
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tax_words_route_by_rate_context() {
        assert_eq!(semantic_match("ddv"), Some(("vat_amount", BASIC_CONFIDENCE)));
        assert_eq!(semantic_match("ddv_%"), Some(("vat_rate", BASIC_CONFIDENCE)));
        assert_eq!(semantic_match("porez_stopa"), Some(("vat_rate", BASIC_CONFIDENCE)));
    }

    #[test]
    fn descriptive_words_route_to_item_or_customer() {
        assert_eq!(semantic_match("naziv_artikla"), Some(("item_name", BASIC_CONFIDENCE)));
        assert_eq!(semantic_match("ime_partner"), Some(("customer_name", BASIC_CONFIDENCE)));
        assert_eq!(semantic_match("kratok_opis"), Some(("description", BASIC_CONFIDENCE)));
    }

    #[test]
    fn vendor_words_outrank_basic_words() {
        assert_eq!(semantic_match("uplata_datum_x"), Some(("payment_date", VENDOR_CONFIDENCE)));
        assert_eq!(semantic_match("nacin_uplata"), Some(("payment_method", BASIC_CONFIDENCE)));
    }

    #[test]
    fn earlier_group_keeps_a_tie() {
        // "amount" is both a financial and a quantity word.
        assert_eq!(semantic_match("gross_amount"), Some(("amount", BASIC_CONFIDENCE)));
    }

    #[test]
    fn names_without_group_words_do_not_match() {
        assert_eq!(semantic_match("zzz"), None);
        assert_eq!(semantic_match("qqq"), None);
    }
}
