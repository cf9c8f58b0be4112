//! Reader for the sectioned `Key=Value` bank export ("1CClientBankExchange").
//!
//! ```text
//! РасчСчет=40702810000000012345
//! СекцияДокумент=Платежное поручение
//! Сумма=1 234,56
//! ...
//! КонецДокумента
//! ```
//!
//! Sections become [`RawDocument`]s, which are turned into [`Transaction`]s
//! relative to the home account declared by `РасчСчет=`.

use std::collections::HashMap;

use encoding_rs::WINDOWS_1251;
use rust_decimal::Decimal;

use crate::models::{new_id, BankDetails, StatementDate, Transaction};
use crate::names::clean_name;

const HOME_ACCOUNT: &str = "РасчСчет";
const SECTION_OPEN: &str = "СекцияДокумент";
const SECTION_CLOSE: &str = "КонецДокумента";
/// Reserved key under which a section's document type is stored.
const SECTION_TYPE_KEY: &str = "_SectionType";

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Statement files are Windows-1251; UTF-8 (with or without BOM) is accepted too.
pub fn decode(bytes: &[u8]) -> String {
    let bytes = bytes.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(bytes);
    if let Ok(s) = std::str::from_utf8(bytes) {
        return s.to_string();
    }
    let (decoded, _, _) = WINDOWS_1251.decode(bytes);
    decoded.into_owned()
}

/// `"1 234,56"` → `1234.56`. Anything unparsable is zero.
pub fn parse_amount(raw: &str) -> Decimal {
    let s: String = raw
        .chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| if c == ',' { '.' } else { c })
        .collect();
    if s.is_empty() {
        return Decimal::ZERO;
    }
    s.parse().unwrap_or(Decimal::ZERO)
}

// ---------------------------------------------------------------------------
// Documents
// ---------------------------------------------------------------------------

/// Flat key/value view of one closed section.
#[derive(Debug, Clone, Default)]
pub struct RawDocument {
    fields: HashMap<String, String>,
}

impl RawDocument {
    fn open(doctype: &str) -> Self {
        let mut fields = HashMap::new();
        fields.insert(SECTION_TYPE_KEY.to_string(), doctype.to_string());
        Self { fields }
    }

    pub fn get(&self, key: &str) -> &str {
        self.fields.get(key).map_or("", |v| v.trim())
    }

    /// First non-empty value among alternate header spellings.
    pub fn get_any(&self, keys: &[&str]) -> &str {
        keys.iter()
            .map(|k| self.get(k))
            .find(|v| !v.is_empty())
            .unwrap_or("")
    }

    pub fn doctype(&self) -> &str {
        self.get_any(&[SECTION_TYPE_KEY, SECTION_OPEN])
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Side {
    Payer,
    Payee,
}

/// Header variants per field; upstream exporters disagree on which they emit.
struct SideKeys {
    name: &'static [&'static str],
    tax_id: &'static [&'static str],
    kpp: &'static [&'static str],
    account: &'static [&'static str],
    bank: &'static [&'static str],
    bik: &'static [&'static str],
    corr_account: &'static [&'static str],
}

const PAYER_KEYS: SideKeys = SideKeys {
    name: &["Плательщик", "Плательщик1"],
    tax_id: &["ПлательщикИНН", "ПлательщикИНН1"],
    kpp: &["ПлательщикКПП", "ПлательщикКПП1"],
    account: &["ПлательщикСчет", "ПлательщикРасчСчет", "ПлательщикСчет1"],
    bank: &["ПлательщикБанк1", "ПлательщикБанк", "ПлательщикБанк2"],
    bik: &["ПлательщикБИК", "ПлательщикБИК1"],
    corr_account: &["ПлательщикКорСчет", "ПлательщикКорСчет1", "ПлательщикКС"],
};

const PAYEE_KEYS: SideKeys = SideKeys {
    name: &["Получатель", "Получатель1"],
    tax_id: &["ПолучательИНН", "ПолучательИНН1"],
    kpp: &["ПолучательКПП", "ПолучательКПП1"],
    account: &["ПолучательСчет", "ПолучательРасчСчет", "ПолучательСчет1"],
    bank: &["ПолучательБанк1", "ПолучательБанк", "ПолучательБанк2"],
    bik: &["ПолучательБИК", "ПолучательБИК1"],
    corr_account: &["ПолучательКорСчет", "ПолучательКорСчет1", "ПолучательКС"],
};

impl Side {
    fn keys(self) -> &'static SideKeys {
        match self {
            Self::Payer => &PAYER_KEYS,
            Self::Payee => &PAYEE_KEYS,
        }
    }

    /// Account used for direction detection (the primary spellings only).
    fn account<'a>(self, doc: &'a RawDocument) -> &'a str {
        doc.get_any(&self.keys().account[..2])
    }

    fn details(self, doc: &RawDocument) -> (String, BankDetails) {
        let keys = self.keys();
        let details = BankDetails {
            tax_id: doc.get_any(keys.tax_id).to_string(),
            kpp: doc.get_any(keys.kpp).to_string(),
            account: doc.get_any(keys.account).to_string(),
            bank: doc.get_any(keys.bank).to_string(),
            bik: doc.get_any(keys.bik).to_string(),
            corr_account: doc.get_any(keys.corr_account).to_string(),
        };
        (doc.get_any(keys.name).to_string(), details)
    }
}

impl RawDocument {
    /// Map the document to a transaction as seen from `home_account`.
    ///
    /// When neither side's account is the home account both amounts stay zero;
    /// the row is still produced so it can be reviewed by hand.
    pub fn to_transaction(&self, home_account: &str) -> Transaction {
        let home = home_account.trim();
        let amount = parse_amount(self.get("Сумма"));

        let mut incoming = Decimal::ZERO;
        let mut outgoing = Decimal::ZERO;
        let mut date = self.get("Дата");
        let mut counterparty = {
            let payee = self.get("Получатель");
            if payee.is_empty() { self.get("Плательщик") } else { payee }
        }
        .to_string();
        let mut details = BankDetails::default();

        let payee_account = Side::Payee.account(self);
        let payer_account = Side::Payer.account(self);

        if !payee_account.is_empty() && payee_account == home {
            incoming = amount;
            date = self.get_any(&["ДатаПоступило", "Дата"]);
            let (name, d) = Side::Payer.details(self);
            if !name.is_empty() {
                counterparty = name;
            }
            details = d;
        } else if !payer_account.is_empty() && payer_account == home {
            outgoing = amount;
            date = self.get_any(&["ДатаСписано", "Дата"]);
            let (name, d) = Side::Payee.details(self);
            if !name.is_empty() {
                counterparty = name;
            }
            details = d;
        }

        let (name, embedded_tax_id) = clean_name(&counterparty);
        if !embedded_tax_id.is_empty() && details.tax_id.is_empty() {
            details.tax_id = embedded_tax_id;
        }
        if !name.is_empty() {
            counterparty = name;
        }

        Transaction {
            id: new_id(),
            date: StatementDate::parse(date),
            incoming,
            outgoing,
            purpose: self.get("НазначениеПлатежа").to_string(),
            counterparty,
            doctype: self.doctype().to_string(),
            skip_outgoing: false,
            category: None,
            details,
        }
    }
}

// ---------------------------------------------------------------------------
// Reader
// ---------------------------------------------------------------------------

/// Single pass over statement text yielding closed sections in file order.
pub struct Documents<'a> {
    lines: std::str::Lines<'a>,
    home_account: Option<String>,
}

impl<'a> Documents<'a> {
    pub fn new(text: &'a str) -> Self {
        Self {
            lines: text.lines(),
            home_account: None,
        }
    }

    /// The first `РасчСчет=` seen so far, or empty.
    pub fn home_account(&self) -> &str {
        self.home_account.as_deref().unwrap_or("")
    }
}

impl Iterator for Documents<'_> {
    type Item = RawDocument;

    fn next(&mut self) -> Option<RawDocument> {
        let mut current: Option<RawDocument> = None;
        for raw in self.lines.by_ref() {
            let line = raw.trim();
            if line.is_empty() {
                continue;
            }
            if line == SECTION_CLOSE {
                if current.is_some() {
                    return current;
                }
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let (key, value) = (key.trim(), value.trim());
            if key == HOME_ACCOUNT && current.is_none() && self.home_account.is_none() {
                self.home_account = Some(value.to_string());
            }
            if key == SECTION_OPEN {
                current = Some(RawDocument::open(value));
                continue;
            }
            if let Some(doc) = current.as_mut() {
                doc.fields.insert(key.to_string(), value.to_string());
            }
        }
        None
    }
}

/// Lazily parse statement text into transactions, one per closed section.
///
/// Each yielded transaction has a fresh id and no category.
pub fn parse(text: &str) -> impl Iterator<Item = Transaction> + '_ {
    let mut docs = Documents::new(text);
    std::iter::from_fn(move || {
        let doc = docs.next()?;
        Some(doc.to_transaction(docs.home_account()))
    })
}
