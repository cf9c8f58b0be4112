use std::collections::BTreeMap;
use std::fmt;

use chrono::{Datelike, NaiveDate};
use rust_decimal::Decimal;

/// Fallback category when nothing else matches or a mapped value is blank.
pub const DEFAULT_CATEGORY: &str = "Прочее";

/// How a disputed classification is rendered in tables and exports.
pub const DISPUTED_LABEL: &str = "СПОРНАЯ";

/// Normalized counterparty fragment → single category. Replaced wholesale.
pub type ReferenceMap = BTreeMap<String, String>;

/// Normalized counterparty fragment → categories in insertion order, no duplicates.
pub type UserMap = BTreeMap<String, Vec<String>>;

/// Outcome of classification. A transaction without one is still unclassified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Category {
    Assigned(String),
    /// The counterparty carries two or more user-assigned categories.
    Disputed,
}

impl Category {
    pub fn label(&self) -> &str {
        match self {
            Self::Assigned(name) => name,
            Self::Disputed => DISPUTED_LABEL,
        }
    }

    pub fn is_disputed(&self) -> bool {
        matches!(self, Self::Disputed)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Statement dates are `DD.MM.YYYY`; anything else is kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatementDate {
    Day(NaiveDate),
    Unparsed(String),
}

impl StatementDate {
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        match parse_date_dmy(raw) {
            Some(day) => Self::Day(day),
            None => Self::Unparsed(raw.to_string()),
        }
    }

    pub fn day(&self) -> Option<NaiveDate> {
        match self {
            Self::Day(d) => Some(*d),
            Self::Unparsed(_) => None,
        }
    }

    /// `MM.YYYY`, or empty when the date could not be parsed.
    pub fn month_label(&self) -> String {
        match self {
            Self::Day(d) => format!("{:02}.{}", d.month(), d.year()),
            Self::Unparsed(_) => String::new(),
        }
    }
}

impl fmt::Display for StatementDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Day(d) => write!(f, "{}", d.format("%d.%m.%Y")),
            Self::Unparsed(raw) => f.write_str(raw),
        }
    }
}

pub fn parse_date_dmy(raw: &str) -> Option<NaiveDate> {
    let parts: Vec<&str> = raw.trim().split('.').collect();
    let digits = |p: &str, min: usize, max: usize| {
        (min..=max).contains(&p.len()) && p.bytes().all(|b| b.is_ascii_digit())
    };
    if parts.len() != 3
        || !digits(parts[0], 1, 2)
        || !digits(parts[1], 1, 2)
        || !digits(parts[2], 4, 4)
    {
        return None;
    }
    let d: u32 = parts[0].parse().ok()?;
    let m: u32 = parts[1].parse().ok()?;
    let y: i32 = parts[2].parse().ok()?;
    NaiveDate::from_ymd_opt(y, m, d)
}

/// Counterparty bank reference fields as they appear on payment documents.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BankDetails {
    pub tax_id: String,
    pub kpp: String,
    pub account: String,
    pub bank: String,
    pub bik: String,
    pub corr_account: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Transaction {
    pub id: String,
    pub date: StatementDate,
    pub incoming: Decimal,
    pub outgoing: Decimal,
    pub purpose: String,
    pub counterparty: String,
    pub doctype: String,
    /// Excludes the outgoing amount from profitability reports.
    pub skip_outgoing: bool,
    pub category: Option<Category>,
    pub details: BankDetails,
}

impl Transaction {
    pub fn month(&self) -> String {
        self.date.month_label()
    }

    pub fn is_disputed(&self) -> bool {
        self.category.as_ref().is_some_and(Category::is_disputed)
    }

    pub fn category_label(&self) -> &str {
        self.category.as_ref().map_or("", Category::label)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Counterparty {
    pub id: String,
    pub kind: String,
    pub name: String,
    pub details: BankDetails,
    pub is_own: bool,
}

/// One row of the import log.
#[derive(Debug, Clone, PartialEq)]
pub struct ImportRecord {
    pub source: String,
    pub checksum: String,
    pub parsed_count: usize,
    pub imported_count: usize,
    pub date_range_start: Option<String>,
    pub date_range_end: Option<String>,
}

pub fn new_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

// ---------------------------------------------------------------------------
// Normalization
// ---------------------------------------------------------------------------

/// Upper-case, trimmed, inner whitespace collapsed. Used for every name match.
pub fn norm_text(s: &str) -> String {
    norm_spaces(&s.to_uppercase())
}

pub fn norm_spaces(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Trimmed and collapsed; blank becomes [`DEFAULT_CATEGORY`].
pub fn norm_category(s: &str) -> String {
    let s = norm_spaces(s);
    if s.is_empty() {
        DEFAULT_CATEGORY.to_string()
    } else {
        s
    }
}
