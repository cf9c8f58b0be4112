use std::collections::BTreeMap;
use std::path::Path;

use chrono::NaiveDate;
use encoding_rs::WINDOWS_1251;
use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::Decimal;

use crate::error::Result;
use crate::fmt::plain_amount;
use crate::models::Transaction;
use crate::statement::parse_amount;
use crate::store::Store;

static COMMISSION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"ком[и\-]?сия[^0-9]*(\d+[.,]\d{2})").unwrap());

/// Income rows in this category carry a commission that is added back on top.
const COWORKING_MARKER: &str = "коворкинг";

const INVOICE_MARKER: &str = "оплата по счету";

pub const EXPORT_HEADER: [&str; 9] = [
    "Не учитывать",
    "Дата",
    "Месяц",
    "Поступление",
    "Списание",
    "Статья",
    "Назначение",
    "Контрагент",
    "Вид операции",
];

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Commission amount mentioned in a purpose text, zero when there is none.
pub fn extract_commission(purpose: &str) -> Decimal {
    COMMISSION
        .captures(&purpose.to_lowercase())
        .map(|caps| parse_amount(&caps[1]))
        .unwrap_or(Decimal::ZERO)
}

fn in_range(txn: &Transaction, from: NaiveDate, to: NaiveDate) -> bool {
    txn.date.day().is_some_and(|d| d >= from && d <= to)
}

// ---------------------------------------------------------------------------
// Period totals
// ---------------------------------------------------------------------------

pub struct CategoryTotal {
    pub name: String,
    pub total: Decimal,
}

pub struct PeriodReport {
    pub total: Decimal,
    pub by_category: Vec<CategoryTotal>,
    pub rows: usize,
    /// Disputed rows in range. Totals are unreliable until these are resolved.
    pub disputed: usize,
}

fn period_report<S, F>(store: &S, from: NaiveDate, to: NaiveDate, amount: F) -> Result<PeriodReport>
where
    S: Store,
    F: Fn(&Transaction) -> Decimal,
{
    let mut by_category: BTreeMap<String, Decimal> = BTreeMap::new();
    let mut report = PeriodReport {
        total: Decimal::ZERO,
        by_category: Vec::new(),
        rows: 0,
        disputed: 0,
    };
    for txn in store.list_transactions()?.iter().filter(|t| in_range(t, from, to)) {
        let value = amount(txn);
        if value <= Decimal::ZERO {
            continue;
        }
        report.rows += 1;
        if txn.is_disputed() {
            report.disputed += 1;
        }
        report.total += value;
        *by_category.entry(txn.category_label().to_string()).or_default() += value;
    }
    report.by_category = by_category
        .into_iter()
        .map(|(name, total)| CategoryTotal { name, total })
        .collect();
    Ok(report)
}

pub fn income_for_period<S: Store>(store: &S, from: NaiveDate, to: NaiveDate) -> Result<PeriodReport> {
    period_report(store, from, to, |t| {
        if t.incoming <= Decimal::ZERO {
            return Decimal::ZERO;
        }
        if t.category_label().to_lowercase().contains(COWORKING_MARKER) {
            t.incoming + extract_commission(&t.purpose)
        } else {
            t.incoming
        }
    })
}

/// Skipped rows are excluded.
pub fn expenses_for_period<S: Store>(store: &S, from: NaiveDate, to: NaiveDate) -> Result<PeriodReport> {
    period_report(store, from, to, |t| if t.skip_outgoing { Decimal::ZERO } else { t.outgoing })
}

// ---------------------------------------------------------------------------
// Lookups
// ---------------------------------------------------------------------------

pub fn find_invoice_payments<S: Store>(store: &S, number: &str) -> Result<Vec<Transaction>> {
    let number = number.trim().to_lowercase();
    if number.is_empty() {
        return Ok(Vec::new());
    }
    Ok(store
        .list_transactions()?
        .into_iter()
        .filter(|t| {
            let purpose = t.purpose.to_lowercase();
            purpose.contains(INVOICE_MARKER) && purpose.contains(&number)
        })
        .collect())
}

/// `month` is `MM.YYYY`; `None` lists everything.
pub fn transactions_for_month<S: Store>(store: &S, month: Option<&str>) -> Result<Vec<Transaction>> {
    let rows = store.list_transactions()?;
    Ok(match month.map(str::trim) {
        Some(m) => rows.into_iter().filter(|t| t.month() == m).collect(),
        None => rows,
    })
}

// ---------------------------------------------------------------------------
// Export
// ---------------------------------------------------------------------------

/// Write every transaction as a `;`-separated Windows-1251 CSV. Returns the row count.
pub fn export_csv<S: Store>(store: &S, path: &Path) -> Result<usize> {
    let rows = store.list_transactions()?;
    let mut writer = csv::WriterBuilder::new().delimiter(b';').from_writer(Vec::new());
    writer.write_record(EXPORT_HEADER)?;
    for t in &rows {
        let date = t.date.to_string();
        let month = t.month();
        let incoming = plain_amount(t.incoming);
        let outgoing = plain_amount(t.outgoing);
        writer.write_record([
            if t.skip_outgoing { "1" } else { "" },
            date.as_str(),
            month.as_str(),
            incoming.as_str(),
            outgoing.as_str(),
            t.category_label(),
            t.purpose.as_str(),
            t.counterparty.as_str(),
            t.doctype.as_str(),
        ])?;
    }
    let utf8 = writer
        .into_inner()
        .map_err(|e| crate::error::VypiskaError::Other(e.to_string()))?;
    let text = String::from_utf8_lossy(&utf8);
    let (encoded, _, _) = WINDOWS_1251.encode(&text);
    std::fs::write(path, &encoded)?;
    Ok(rows.len())
}
