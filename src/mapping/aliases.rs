//! Static alias corpus and heuristic patterns.
//!
//! Built once on first use and never mutated afterwards.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;

use super::SourceSoftware;
use super::normalize::normalize_name;
use crate::types::DataType;

/// One row of the priority-ordered alias table.
#[derive(Debug, Clone, PartialEq)]
pub struct AliasRule {
    /// Normalized alias.
    pub alias: String,
    pub field: &'static str,
    pub data_type: DataType,
    pub confidence: f64,
}

/// Confidence of an alias listed under more than one canonical field.
const SHARED_ALIAS_CONFIDENCE: f64 = 0.9;

/// Canonical fields with their declared type and source aliases, highest priority first.
///
/// Aliases are written as they appear in exports (Latin or Cyrillic); they are normalized
/// when the table is built.
const CORPUS: &[(&str, DataType, &[&str])] = &[
    (
        "customer_name",
        DataType::String,
        &[
            "naziv", "ime_klient", "klient", "kupuvach", "kupac", "ime_kupac", "imeto_na_klientot",
            "customer", "client", "customer_name", "client_name", "назив", "клиент", "купувач",
            "име_клиент", "име_купац", "customer_full_name", "naziv_kupca", "ime_klijenta",
            "klijent_naziv", "naziv_partnera", "ime_firme", "naz_kupca", "naziv_klijenta",
            "poslovni_partner", "kupac_naziv", "partner_naziv", "partner_ime", "prt_naziv",
            "partner_name", "kompanija_naziv", "firm_naziv", "organizacija_naziv",
        ],
    ),
    (
        "customer_id",
        DataType::String,
        &[
            "id_klient", "klient_id", "customer_id", "id_kupac", "kupac_id", "ид_клиент",
            "клиент_ид", "customer_code", "client_id", "client_code", "sifra_kupca", "kod_kupca",
            "id_partnera", "sifra_klijenta", "partner_sifra", "partner_id", "partner_kod",
            "prt_id", "prt_sifra",
        ],
    ),
    (
        "tax_id",
        DataType::String,
        &[
            "embs", "edb", "danocen_broj", "tax_number", "vat_number", "tax_id", "данок_број",
            "ембс", "едб", "customer_tax_id", "customer_vat_number", "vat_id", "tax_registration",
            "pib", "pib_kupca", "poreski_broj", "danocni_broj", "pdv_broj", "maticni_broj", "mb",
            "partner_pib", "partner_tax_id", "prt_pib", "porez_broj",
        ],
    ),
    (
        "company_id",
        DataType::String,
        &["firma_id", "kompanija_id", "company_id", "firm_id", "preduzece_id", "фирма_ид", "компанија_ид"],
    ),
    (
        "invoice_number",
        DataType::String,
        &[
            "broj_faktura", "faktura_broj", "invoice_no", "invoice_number", "број_фактура",
            "фактура_број", "invoice_id", "invoice_reference", "document_number", "doc_number",
            "broj_računa", "račun_broj", "br_računa", "broj_dokumenta", "dokument_broj",
            "faktura_id", "dok_broj", "dokument_id", "dok_id", "dokumenta_broj",
        ],
    ),
    (
        "invoice_date",
        DataType::Date,
        &[
            "datum_faktura", "faktura_datum", "invoice_date", "date_issued", "дата_фактура",
            "датум_фактура", "created_date", "issue_date", "document_date", "datum_računa",
            "račun_datum", "dat_računa", "datum_izdavanja", "datum_dokumenta", "dokument_datum",
            "dok_datum", "datum_dok",
        ],
    ),
    (
        "due_date",
        DataType::Date,
        &[
            "datum_dospeanos", "dospeanos", "due_date", "payment_due", "датум_доспевање",
            "доспевање", "invoice_due_date", "payment_due_date", "maturity_date", "datum_dospeća",
            "dospeće", "datum_valute", "rok_plaćanja", "dokument_valuta", "dok_valuta",
        ],
    ),
    (
        "invoice_status",
        DataType::String,
        &["status_faktura", "faktura_status", "invoice_status", "статус_фактура"],
    ),
    (
        "item_name",
        DataType::String,
        &[
            "naziv_stavka", "ime_proizvod", "proizvod", "stavka", "item_name", "product_name",
            "назив_ставка", "производ", "ставка", "service_name", "article_name", "goods_name",
            "naziv_robe", "ime_artikla", "artikal", "roba_naziv", "proizvod_naziv",
            "naziv_proizvoda", "stavka_naziv", "artikel_naziv", "stavka_ime", "stv_naziv",
        ],
    ),
    (
        "item_code",
        DataType::String,
        &[
            "kod_stavka", "sifra_proizvod", "item_code", "product_code", "sku", "код_ставка",
            "шифра_производ", "item_id", "product_id", "article_code", "sku_code", "šifra_robe",
            "kod_artikla", "šifra_artikla", "kod_robe", "šifra_proizvoda", "stavka_sifra",
            "stavka_kod", "stv_sifra", "artikel_sifra", "roba_sifra", "proizvod_kod",
        ],
    ),
    (
        "description",
        DataType::String,
        &["opis", "opis_stavka", "description", "item_description", "опис", "опис_ставка", "proizvod_opis"],
    ),
    (
        "quantity",
        DataType::Integer,
        &[
            "kolicina", "kolichestvo", "qty", "quantity", "количина", "количество",
            "item_quantity", "count", "pieces", "količina_robe", "kol", "broj_komada", "komada",
            "količina_artikla", "količina_proizvoda", "stavka_kolicina", "stavka_kol",
            "stv_kolicina", "kol_stavke",
        ],
    ),
    (
        "unit",
        DataType::String,
        &["edinica", "mera", "unit", "unit_of_measure", "uom", "единица", "мера", "jedinica_mere"],
    ),
    (
        "unit_price",
        DataType::Decimal,
        &[
            "edinichna_cena", "cena_po_edinica", "unit_price", "price_per_unit", "единична_цена",
            "цена_по_единица", "item_unit_price", "single_price", "base_price", "list_price",
            "cena_robe", "jedinična_cena", "cena_po_komadu", "cena_artikla", "osnovna_cena",
            "cena_proizvoda", "stavka_cena", "stv_cena", "cena_po_jedinici",
        ],
    ),
    (
        "price",
        DataType::Decimal,
        &["cena", "cenata", "price", "цена", "цената", "cost", "rate", "iznos_cene", "cena_stavke"],
    ),
    (
        "amount",
        DataType::Currency,
        &[
            "iznos", "suma", "amount", "vrednost", "износ", "сума", "вредност", "item_total_price",
            "line_amount", "total_amount", "sum", "line_total", "item_amount", "iznos_stavke",
            "ukupan_iznos_stavke", "vrednost_stavke", "suma_stavke", "ukupno_stavka", "iznos_robe",
            "stavka_iznos", "stavka_vrednost", "stv_iznos", "stavka_suma",
        ],
    ),
    (
        "subtotal",
        DataType::Currency,
        &["podvkupen_iznos", "subtotal", "osnovica", "net_amount", "подвкупен_износ", "основица"],
    ),
    (
        "total",
        DataType::Currency,
        &[
            "vkupen_iznos", "vkupno", "total", "grand_total", "вкупен_износ", "вкупно",
            "ukupan_iznos", "ukupno_iznos", "suma_ukupno", "ukupna_vrednost", "invoice_total",
        ],
    ),
    (
        "currency",
        DataType::String,
        &["valuta", "currency", "валута", "invoice_currency", "currency_code"],
    ),
    (
        "vat_rate",
        DataType::Decimal,
        &[
            "pdv_stapka", "ddv_stapka", "vat_rate", "tax_rate", "danocna_stapka", "пдв_стапка",
            "ддв_стапка", "данок_стапка", "item_vat_rate", "vat_percentage", "tax_percentage",
            "vat_percent", "stopa_pdv", "pdv_stopa", "procenat_pdv", "stopa_poreza",
            "porez_stopa", "pdv_procenat", "stavka_pdv_stopa", "stv_pdv",
        ],
    ),
    (
        "vat_amount",
        DataType::Currency,
        &[
            "pdv_iznos", "ddv_iznos", "vat_amount", "tax_amount", "danocen_iznos", "пдв_износ",
            "ддв_износ", "данок_износ", "item_vat_amount", "vat_sum", "tax_sum", "vat_value",
            "iznos_pdv", "pdv_vrednost", "suma_pdv", "ukupan_pdv", "porez_iznos", "vrednost_pdv",
            "stavka_pdv_iznos", "stv_pdv_iznos", "pdv", "ddv", "пдв", "ддв",
        ],
    ),
    (
        "discount",
        DataType::Decimal,
        &["popust", "rabat", "discount", "попуст", "рабат", "discount_val", "iznos_popust"],
    ),
    (
        "tax_inclusive",
        DataType::Currency,
        &["so_ddv", "vkluchuvajki_ddv", "tax_inclusive", "including_tax", "со_ддв", "вклучувајќи_ддв"],
    ),
    (
        "tax_exclusive",
        DataType::Currency,
        &["bez_ddv", "iskljuchuvajki_ddv", "tax_exclusive", "excluding_tax", "без_ддв", "исклучувајќи_ддв"],
    ),
    (
        "payment_date",
        DataType::Date,
        &[
            "datum_plakanje", "plakanje_datum", "payment_date", "paid_date", "датум_плаќање",
            "плаќање_датум", "payment_received_date", "transaction_date", "datum_plaćanja",
            "plaćanje_datum", "dat_plaćanja", "datum_uplate", "uplata_datum", "datum_transakcije",
            "uplata_dat", "upl_datum", "transakcija_datum",
        ],
    ),
    (
        "payment_method",
        DataType::String,
        &[
            "nachin_plakanje", "metod_plakanje", "payment_method", "pay_method", "начин_плаќање",
            "метод_плаќање", "payment_type", "pay_type", "payment_mode", "način_plaćanja",
            "metod_plaćanja", "tip_plaćanja", "vrsta_plaćanja", "način_uplate", "uplata_nacin",
            "uplata_tip", "upl_nacin", "tip_uplate",
        ],
    ),
    (
        "payment_amount",
        DataType::Currency,
        &[
            "iznos_plakanje", "platena_suma", "payment_amount", "paid_amount", "износ_плаќање",
            "платена_сума", "amount_paid", "payment_sum", "iznos_plaćanja", "plaćeni_iznos",
            "suma_plaćanja", "iznos_uplate", "uplata_iznos", "uplata_suma", "upl_iznos",
        ],
    ),
    (
        "payment_reference",
        DataType::String,
        &[
            "referenca_plakanje", "payment_reference", "reference_no", "референца_плаќање",
            "payment_id", "transaction_id", "reference_number", "referenca_plaćanja",
            "oznaka_plaćanja", "broj_plaćanja", "referenca_uplate", "uplata_referenca",
            "upl_referenca", "broj_uplate",
        ],
    ),
    (
        "bank_account",
        DataType::String,
        &["bankovska_smetka", "smetka", "account_number", "bank_account", "банковска_сметка", "сметка", "ziro_racun", "iban"],
    ),
    (
        "bank_name",
        DataType::String,
        &["ime_banka", "banka", "bank_name", "bank", "име_банка", "банка"],
    ),
    (
        "address",
        DataType::String,
        &["adresa", "address", "street", "ulica", "адреса", "улица", "customer_address"],
    ),
    ("city", DataType::String, &["grad", "city", "mesto", "место", "град", "customer_city"]),
    (
        "postal_code",
        DataType::String,
        &["postanski_broj", "zip", "postal_code", "zip_code", "поштански_број"],
    ),
    ("country", DataType::String, &["zemja", "drzava", "country", "земја", "држава"]),
    (
        "warehouse",
        DataType::String,
        &["skladiste", "magacin", "warehouse", "stock_location", "складиште", "магацин"],
    ),
    (
        "stock_quantity",
        DataType::Decimal,
        &["kolicina_skladiste", "zaliha", "stock_qty", "inventory", "количина_складиште", "залиха"],
    ),
    (
        "expense_category",
        DataType::String,
        &["kategorija_trosok", "vid_trosok", "expense_category", "cost_center", "категорија_трошок", "вид_трошок"],
    ),
    (
        "expense_date",
        DataType::Date,
        &["datum_trosok", "trosok_datum", "expense_date", "датум_трошок", "трошок_датум"],
    ),
    ("date", DataType::Date, &["datum", "data", "date", "датум", "дата"]),
    ("status", DataType::String, &["status", "sostojba", "condition", "статус", "состојба"]),
    (
        "is_active",
        DataType::Boolean,
        &["aktiven", "aktivan", "active", "is_active", "enabled", "активен"],
    ),
    (
        "notes",
        DataType::String,
        &["zabeleska", "komentar", "notes", "comments", "remarks", "napomena", "забелешка", "коментар"],
    ),
    (
        "email",
        DataType::String,
        &["email", "e_mail", "elektronska_posta", "mail", "електронска_пошта", "меил", "customer_email"],
    ),
    (
        "phone",
        DataType::String,
        &["telefon", "tel", "phone", "mobile", "телефон", "customer_phone"],
    ),
    (
        "contact_person",
        DataType::String,
        &["kontakt_lice", "odgovorno_lice", "contact_person", "representative", "контакт_лице", "одговорно_лице"],
    ),
];

/// The alias table with normalized aliases, in priority order.
pub static ALIAS_TABLE: Lazy<Vec<AliasRule>> = Lazy::new(|| {
    let mut fields_per_alias: HashMap<String, Vec<&'static str>> = HashMap::new();
    for (field, _, aliases) in CORPUS {
        for alias in *aliases {
            let entry = fields_per_alias.entry(normalize_name(alias)).or_default();
            if !entry.contains(field) {
                entry.push(*field);
            }
        }
    }

    CORPUS
        .iter()
        .flat_map(|(field, data_type, aliases)| {
            aliases.iter().map(move |alias| (*field, *data_type, normalize_name(alias)))
        })
        .map(|(field, data_type, alias)| {
            let shared = fields_per_alias.get(&alias).is_some_and(|f| f.len() > 1);
            AliasRule {
                alias,
                field,
                data_type,
                confidence: if shared { SHARED_ALIAS_CONFIDENCE } else { 1.0 },
            }
        })
        .collect()
});

/// Normalized alias -> index of its highest-priority rule.
pub static EXACT_INDEX: Lazy<HashMap<String, usize>> = Lazy::new(|| {
    let mut index = HashMap::with_capacity(ALIAS_TABLE.len());
    for (i, rule) in ALIAS_TABLE.iter().enumerate() {
        index.entry(rule.alias.clone()).or_insert(i);
    }
    index
});

/// Declared type of a canonical field; unknown fields are strings.
pub fn data_type_of(field: &str) -> DataType {
    CORPUS
        .iter()
        .find(|(f, _, _)| *f == field)
        .map_or(DataType::String, |(_, t, _)| *t)
}

pub fn canonical_fields() -> impl Iterator<Item = &'static str> {
    CORPUS.iter().map(|(f, _, _)| *f)
}

/// Raw (unnormalized) aliases listed for `field`.
pub fn raw_aliases(field: &str) -> &'static [&'static str] {
    match CORPUS.iter().find(|(f, _, _)| *f == field) {
        Some((_, _, aliases)) => *aliases,
        None => &[],
    }
}

/// A regex heuristic over normalized names.
#[derive(Debug)]
pub struct PatternRule {
    pub regex: Regex,
    pub field: &'static str,
    pub confidence: f64,
}

fn compile(rules: &[(&str, &'static str, f64)]) -> Vec<PatternRule> {
    rules
        .iter()
        .map(|(pattern, field, confidence)| PatternRule {
            regex: Regex::new(pattern).unwrap(),
            field,
            confidence: *confidence,
        })
        .collect()
}

/// Patterns that apply to every export.
pub static GENERAL_PATTERNS: Lazy<Vec<PatternRule>> = Lazy::new(|| {
    compile(&[
        (r"^(broj|br|no).*faktura", "invoice_number", 0.9),
        (r"^(datum|data).*faktura", "invoice_date", 0.9),
        (r"^(pdv|ddv|vat).*stapka", "vat_rate", 0.9),
        (r"^(pdv|ddv|vat).*iznos", "vat_amount", 0.9),
        (r"^(pdv|ddv|vat|porez)_?(%|stopa|procen|percent|rate)", "vat_rate", 0.9),
        (r"^(iznos|suma|amount)", "amount", 0.8),
        (r"^(kolicina|qty|quantity)", "quantity", 0.8),
        (r"^(cena|price)", "unit_price", 0.8),
        (r"^(klient|customer|kupuvac|kupac)", "customer_name", 0.8),
        (r"^embs$", "tax_id", 1.0),
        (r"^edb$", "tax_id", 1.0),
    ])
});

static ONIVO_PATTERNS: Lazy<Vec<PatternRule>> = Lazy::new(|| {
    compile(&[
        (r"^customer_name$", "customer_name", 0.95),
        (r"^customer_id$", "customer_id", 0.95),
        (r"^customer_tax_id$", "tax_id", 0.95),
        (r"^invoice_id$", "invoice_number", 0.95),
        (r"^invoice_date$", "invoice_date", 0.95),
        (r"^invoice_due_date$", "due_date", 0.95),
        (r"^item_name$", "item_name", 0.95),
        (r"^item_quantity$", "quantity", 0.95),
        (r"^item_unit_price$", "unit_price", 0.95),
        (r"^payment_date$", "payment_date", 0.95),
        (r"^payment_amount$", "payment_amount", 0.95),
        (r"^customer_.*address", "address", 0.8),
        (r"^customer_.*city", "city", 0.8),
        (r"^customer_.*email", "email", 0.8),
        (r"^customer_.*phone", "phone", 0.8),
        (r"invoice_total", "total", 0.8),
        (r"invoice_currency", "currency", 0.8),
        (r"item_description", "description", 0.8),
    ])
});

static MEGASOFT_PATTERNS: Lazy<Vec<PatternRule>> = Lazy::new(|| {
    compile(&[
        (r"^naziv_kupca$", "customer_name", 0.95),
        (r"^pib_?kupca?$", "tax_id", 0.95),
        (r"^broj_racuna$", "invoice_number", 0.95),
        (r"^datum_racuna$", "invoice_date", 0.95),
        (r"^naziv_robe$", "item_name", 0.95),
        (r"^sifra_robe$", "item_code", 0.95),
        (r"^kolicina_robe$", "quantity", 0.95),
        (r"^cena_robe$", "unit_price", 0.95),
        (r"^stopa_pdv$", "vat_rate", 0.95),
        (r"^iznos_pdv$", "vat_amount", 0.95),
        (r"^nacin_placanja$", "payment_method", 0.95),
        (r"adresa", "address", 0.8),
        (r"mesto", "city", 0.8),
        (r"uk_iznos", "total", 0.8),
    ])
});

static PANTHEON_PATTERNS: Lazy<Vec<PatternRule>> = Lazy::new(|| {
    compile(&[
        (r"^partner_naziv$", "customer_name", 0.95),
        (r"^partner_sifra$", "customer_id", 0.95),
        (r"^partner_pib$", "tax_id", 0.95),
        (r"^dokument_broj$", "invoice_number", 0.95),
        (r"^dokument_datum$", "invoice_date", 0.95),
        (r"^stavka_naziv$", "item_name", 0.95),
        (r"^stavka_sifra$", "item_code", 0.95),
        (r"^stavka_kolicina$", "quantity", 0.95),
        (r"^stavka_cena$", "unit_price", 0.95),
        (r"^stavka_pdv_stopa$", "vat_rate", 0.95),
        (r"^uplata_datum$", "payment_date", 0.95),
        (r"^uplata_iznos$", "payment_amount", 0.95),
        (r"^prt_naziv$", "customer_name", 0.9),
        (r"^dok_broj$", "invoice_number", 0.9),
        (r"^stv_naziv$", "item_name", 0.9),
        (r"^upl_datum$", "payment_date", 0.9),
    ])
});

/// Vendor-profile patterns, checked before the general ones.
pub fn vendor_patterns(software: SourceSoftware) -> &'static [PatternRule] {
    match software {
        SourceSoftware::Onivo => &ONIVO_PATTERNS,
        SourceSoftware::Megasoft => &MEGASOFT_PATTERNS,
        SourceSoftware::Pantheon => &PANTHEON_PATTERNS,
    }
}
