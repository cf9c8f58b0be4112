use std::collections::HashSet;
use std::fmt;
use std::path::Path;

use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::categorizer::classify;
use crate::error::Result;
use crate::fingerprint::fingerprint;
use crate::models::{new_id, Counterparty, ImportRecord, Transaction};
use crate::names::clean_name;
use crate::statement;
use crate::store::{Store, TransactionField};

/// Directory kind given to counterparties created during import.
pub const AUTO_COUNTERPARTY_KIND: &str = "Юридическое лицо";

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn compute_checksum(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

fn date_range(rows: &[Transaction]) -> (Option<String>, Option<String>) {
    let days = rows.iter().filter_map(|t| t.date.day());
    let min = days.clone().min();
    let max = days.max();
    let fmt = |d: chrono::NaiveDate| d.format("%d.%m.%Y").to_string();
    (min.map(fmt), max.map(fmt))
}

/// Find the directory entry for the transaction's counterparty, creating one
/// seeded with the row's bank details when none matches.
fn upsert_counterparty<S: Store>(store: &S, txn: &Transaction) -> Result<()> {
    if txn.counterparty.trim().is_empty() {
        return Ok(());
    }
    if store.find_counterparty_by_name(&txn.counterparty)?.is_some() {
        return Ok(());
    }
    let cp = Counterparty {
        id: new_id(),
        kind: AUTO_COUNTERPARTY_KIND.to_string(),
        name: txn.counterparty.clone(),
        details: txn.details.clone(),
        is_own: false,
    };
    store.insert_counterparty(&cp)?;
    debug!(name = %cp.name, "created counterparty");
    Ok(())
}

// ---------------------------------------------------------------------------
// import
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    Empty,
    NoSections,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => f.write_str("file is empty"),
            Self::NoSections => f.write_str("no document sections found"),
        }
    }
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct ImportResult {
    pub parsed: usize,
    pub imported: usize,
    pub skipped: usize,
    /// The same bytes were imported before. Not an error: the fingerprint
    /// filter already makes the repeat a no-op.
    pub previously_imported: bool,
    pub rejected: Option<RejectReason>,
}

impl ImportResult {
    fn rejected(reason: RejectReason) -> Self {
        Self {
            rejected: Some(reason),
            ..Self::default()
        }
    }
}

/// Import one statement file's bytes.
///
/// Filtering by fingerprint and inserting run as one exclusive unit, so two
/// importers racing on the same store cannot both insert the same movement.
pub fn import_statement<S: Store>(store: &S, data: &[u8], source: &str) -> Result<ImportResult> {
    if data.iter().all(u8::is_ascii_whitespace) {
        warn!(source, "rejected statement: empty");
        return Ok(ImportResult::rejected(RejectReason::Empty));
    }

    let text = statement::decode(data);
    let candidates: Vec<Transaction> = statement::parse(&text).collect();
    if candidates.is_empty() {
        warn!(source, "rejected statement: no sections");
        return Ok(ImportResult::rejected(RejectReason::NoSections));
    }

    let checksum = compute_checksum(data);
    let (date_range_start, date_range_end) = date_range(&candidates);

    store.exclusive(|s| {
        let previously_imported = s.checksum_seen(&checksum)?;
        let existing: HashSet<String> = s.list_transactions()?.iter().map(fingerprint).collect();
        let reference = s.reference_map()?;
        let user = s.user_map()?;

        let mut result = ImportResult {
            parsed: candidates.len(),
            previously_imported,
            ..ImportResult::default()
        };

        for mut txn in candidates {
            if existing.contains(&fingerprint(&txn)) {
                debug!(date = %txn.date, counterparty = %txn.counterparty, "skipped duplicate");
                result.skipped += 1;
                continue;
            }
            txn.category = Some(classify(&txn.counterparty, &txn.purpose, &reference, &user));
            upsert_counterparty(s, &txn)?;
            if s.insert_transaction(&txn)? {
                result.imported += 1;
            }
        }

        s.record_import(&ImportRecord {
            source: source.to_string(),
            checksum: checksum.clone(),
            parsed_count: result.parsed,
            imported_count: result.imported,
            date_range_start,
            date_range_end,
        })?;
        sanitize_names(s)?;

        info!(
            source,
            parsed = result.parsed,
            imported = result.imported,
            skipped = result.skipped,
            "imported statement"
        );
        Ok(result)
    })
}

pub fn import_file<S: Store>(store: &S, path: &Path) -> Result<ImportResult> {
    let data = std::fs::read(path)?;
    let source = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    import_statement(store, &data, &source)
}

// ---------------------------------------------------------------------------
// sanitize
// ---------------------------------------------------------------------------

#[derive(Debug, Default, PartialEq, Eq)]
pub struct SanitizeResult {
    pub counterparties: usize,
    pub transactions: usize,
}

/// Re-split stored names, promoting tax ids that were left glued to the name.
pub fn sanitize_names<S: Store>(store: &S) -> Result<SanitizeResult> {
    store.exclusive(|s| {
        let mut result = SanitizeResult::default();

        for mut cp in s.list_counterparties()? {
            let (name, tax_id) = clean_name(&cp.name);
            let mut changed = false;
            if !name.is_empty() && name != cp.name {
                cp.name = name;
                changed = true;
            }
            if cp.details.tax_id.is_empty() && !tax_id.is_empty() {
                cp.details.tax_id = tax_id;
                changed = true;
            }
            if changed {
                s.update_counterparty(&cp)?;
                result.counterparties += 1;
            }
        }

        for txn in s.list_transactions()? {
            let (name, tax_id) = clean_name(&txn.counterparty);
            let mut changed = false;
            if !name.is_empty() && name != txn.counterparty {
                s.update_transaction(&txn.id, TransactionField::Counterparty(name))?;
                changed = true;
            }
            if txn.details.tax_id.is_empty() && !tax_id.is_empty() {
                s.update_transaction(&txn.id, TransactionField::TaxId(tax_id))?;
                changed = true;
            }
            if changed {
                result.transactions += 1;
            }
        }

        if result.counterparties + result.transactions > 0 {
            info!(
                counterparties = result.counterparties,
                transactions = result.transactions,
                "sanitized names"
            );
        }
        Ok(result)
    })
}
