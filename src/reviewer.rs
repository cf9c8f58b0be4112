use tracing::info;

use crate::categorizer::{best_match, recalculate, RecalcResult};
use crate::error::{Result, VypiskaError};
use crate::models::{new_id, norm_spaces, norm_text, BankDetails, Category, Counterparty, Transaction};
use crate::store::{Store, TransactionField};

/// Metadata key holding the id of the "our own organization" directory entry.
pub const OWN_COUNTERPARTY_KEY: &str = "own_counterparty_id";

fn category_name(raw: &str) -> Result<String> {
    let name = norm_spaces(raw);
    if name.is_empty() {
        return Err(VypiskaError::EmptyCategory);
    }
    Ok(name)
}

fn require_transaction<S: Store>(store: &S, id: &str) -> Result<Transaction> {
    store
        .get_transaction(id)?
        .ok_or_else(|| VypiskaError::UnknownTransaction(id.to_string()))
}

// ---------------------------------------------------------------------------
// User map
// ---------------------------------------------------------------------------

/// Remember `category` for the transaction's counterparty and recalculate.
/// A second distinct category for the same counterparty disputes all its rows.
pub fn assign_category<S: Store>(store: &S, txn_id: &str, category: &str) -> Result<RecalcResult> {
    let category = category_name(category)?;
    store.exclusive(|s| {
        let txn = require_transaction(s, txn_id)?;
        let key = norm_text(&txn.counterparty);
        if key.is_empty() {
            return Err(VypiskaError::Other(format!("transaction {txn_id} has no counterparty")));
        }
        s.add_user_category(&key, &category)?;
        info!(key = %key, category = %category, "assigned user category");
        recalculate(s)
    })
}

pub fn bulk_assign<S: Store>(store: &S, names: &[String], category: &str) -> Result<RecalcResult> {
    let category = category_name(category)?;
    store.exclusive(|s| {
        for name in names {
            let key = norm_text(name);
            if !key.is_empty() {
                s.add_user_category(&key, &category)?;
            }
        }
        recalculate(s)
    })
}

/// Returns `None` when the pair was not in the map; nothing is recalculated then.
pub fn remove_user_category<S: Store>(
    store: &S,
    key: &str,
    category: &str,
) -> Result<Option<RecalcResult>> {
    let key = norm_text(key);
    let category = norm_spaces(category);
    store.exclusive(|s| {
        if !s.remove_user_category(&key, &category)? {
            return Ok(None);
        }
        recalculate(s).map(Some)
    })
}

// ---------------------------------------------------------------------------
// Per-row actions
// ---------------------------------------------------------------------------

/// Set one row's category. The user map is left alone, so sibling rows of the
/// same counterparty stay disputed and the next recalculation re-derives this
/// row from the maps.
pub fn resolve_dispute<S: Store>(store: &S, txn_id: &str, category: &str) -> Result<()> {
    let category = category_name(category)?;
    let updated = store.update_transaction(
        txn_id,
        TransactionField::Category(Some(Category::Assigned(category))),
    )?;
    if !updated {
        return Err(VypiskaError::UnknownTransaction(txn_id.to_string()));
    }
    Ok(())
}

pub struct DisputedTxn {
    pub txn: Transaction,
    pub candidates: Vec<String>,
}

pub fn list_disputed<S: Store>(store: &S) -> Result<Vec<DisputedTxn>> {
    let user = store.user_map()?;
    Ok(store
        .list_transactions()?
        .into_iter()
        .filter(Transaction::is_disputed)
        .map(|txn| {
            let candidates = best_match(&txn.counterparty, &user)
                .map(|(_, cats)| cats.clone())
                .unwrap_or_default();
            DisputedTxn { txn, candidates }
        })
        .collect())
}

/// Only rows with money going out can be skipped. Returns whether the flag changed.
pub fn set_skip_outgoing<S: Store>(store: &S, txn_id: &str, skip: bool) -> Result<bool> {
    let txn = require_transaction(store, txn_id)?;
    if txn.outgoing <= rust_decimal::Decimal::ZERO || txn.skip_outgoing == skip {
        return Ok(false);
    }
    store.update_transaction(txn_id, TransactionField::SkipOutgoing(skip))
}

pub fn delete_transaction<S: Store>(store: &S, txn_id: &str) -> Result<()> {
    if !store.delete_transaction(txn_id)? {
        return Err(VypiskaError::UnknownTransaction(txn_id.to_string()));
    }
    info!(id = txn_id, "deleted transaction");
    Ok(())
}

// ---------------------------------------------------------------------------
// Counterparty directory
// ---------------------------------------------------------------------------

pub fn add_counterparty<S: Store>(store: &S, name: &str, kind: &str, details: BankDetails) -> Result<Counterparty> {
    let name = norm_spaces(name);
    if name.is_empty() {
        return Err(VypiskaError::Other("counterparty name is empty".to_string()));
    }
    let cp = Counterparty {
        id: new_id(),
        kind: kind.to_string(),
        name,
        details,
        is_own: false,
    };
    store.insert_counterparty(&cp)?;
    Ok(cp)
}

pub fn set_own<S: Store>(store: &S, id: &str) -> Result<()> {
    store.exclusive(|s| {
        if !s.set_own_counterparty(id)? {
            return Err(VypiskaError::UnknownCounterparty(id.to_string()));
        }
        s.set_metadata(OWN_COUNTERPARTY_KEY, id)
    })
}

/// Stored id first, then the flagged entry, then a name match on `configured`.
pub fn own_organization<S: Store>(store: &S, configured: &str) -> Result<Option<Counterparty>> {
    if let Some(id) = store.metadata(OWN_COUNTERPARTY_KEY)? {
        if let Some(cp) = store.get_counterparty(&id)? {
            return Ok(Some(cp));
        }
    }
    let all = store.list_counterparties()?;
    if let Some(cp) = all.iter().find(|c| c.is_own) {
        return Ok(Some(cp.clone()));
    }
    let wanted = norm_text(configured);
    if wanted.is_empty() {
        return Ok(None);
    }
    Ok(all.into_iter().find(|c| norm_text(&c.name).contains(&wanted)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::tests::{sample_txn, test_store};
    use rust_decimal_macros::dec;

    fn insert(store: &crate::store::SqliteStore, cp: &str) -> String {
        let txn = sample_txn(cp, "Оплата");
        store.insert_transaction(&txn).unwrap();
        txn.id
    }

    #[test]
    fn test_assign_category_updates_siblings() {
        let (_dir, store) = test_store();
        let a = insert(&store, "ООО Ромашка");
        let b = insert(&store, "ООО Ромашка");
        assign_category(&store, &a, "Аренда").unwrap();
        assert_eq!(store.get_transaction(&b).unwrap().unwrap().category_label(), "Аренда");
    }

    #[test]
    fn test_second_category_disputes() {
        let (_dir, store) = test_store();
        let a = insert(&store, "ООО Ромашка");
        insert(&store, "ООО Ромашка");
        assign_category(&store, &a, "Аренда").unwrap();
        let result = assign_category(&store, &a, "Услуги").unwrap();
        assert_eq!(result.disputed, 2);

        let disputed = list_disputed(&store).unwrap();
        assert_eq!(disputed.len(), 2);
        assert_eq!(disputed[0].candidates, vec!["Аренда".to_string(), "Услуги".to_string()]);
    }

    #[test]
    fn test_resolve_leaves_siblings_disputed() {
        let (_dir, store) = test_store();
        let a = insert(&store, "ООО Ромашка");
        let b = insert(&store, "ООО Ромашка");
        store.add_user_category("ООО РОМАШКА", "Аренда").unwrap();
        store.add_user_category("ООО РОМАШКА", "Услуги").unwrap();
        recalculate(&store).unwrap();

        resolve_dispute(&store, &a, "Аренда").unwrap();
        assert_eq!(store.get_transaction(&a).unwrap().unwrap().category_label(), "Аренда");
        assert!(store.get_transaction(&b).unwrap().unwrap().is_disputed());
        assert_eq!(store.user_map().unwrap()["ООО РОМАШКА"].len(), 2);
    }

    #[test]
    fn test_remove_user_category_recalculates() {
        let (_dir, store) = test_store();
        let a = insert(&store, "ООО Ромашка");
        assign_category(&store, &a, "Аренда").unwrap();
        assign_category(&store, &a, "Услуги").unwrap();
        let result = remove_user_category(&store, "ооо ромашка", "Услуги").unwrap();
        assert_eq!(result.map(|r| r.disputed), Some(0));
        assert_eq!(store.get_transaction(&a).unwrap().unwrap().category_label(), "Аренда");
        assert!(remove_user_category(&store, "ооо ромашка", "Услуги").unwrap().is_none());
    }

    #[test]
    fn test_bulk_assign() {
        let (_dir, store) = test_store();
        let a = insert(&store, "ООО Ромашка");
        let b = insert(&store, "ООО Вектор");
        bulk_assign(&store, &["Ромашка".to_string(), "Вектор".to_string()], "Услуги").unwrap();
        assert_eq!(store.get_transaction(&a).unwrap().unwrap().category_label(), "Услуги");
        assert_eq!(store.get_transaction(&b).unwrap().unwrap().category_label(), "Услуги");
    }

    #[test]
    fn test_empty_category_rejected() {
        let (_dir, store) = test_store();
        let a = insert(&store, "ООО Ромашка");
        assert!(matches!(assign_category(&store, &a, "  "), Err(VypiskaError::EmptyCategory)));
        assert!(matches!(resolve_dispute(&store, &a, ""), Err(VypiskaError::EmptyCategory)));
    }

    #[test]
    fn test_unknown_transaction() {
        let (_dir, store) = test_store();
        assert!(matches!(
            assign_category(&store, "missing", "Аренда"),
            Err(VypiskaError::UnknownTransaction(_))
        ));
        assert!(matches!(delete_transaction(&store, "missing"), Err(VypiskaError::UnknownTransaction(_))));
    }

    #[test]
    fn test_skip_only_for_outgoing() {
        let (_dir, store) = test_store();
        let incoming = insert(&store, "ООО Ромашка");
        assert!(!set_skip_outgoing(&store, &incoming, true).unwrap());

        let mut out = sample_txn("ООО Вектор", "Оплата");
        out.incoming = rust_decimal::Decimal::ZERO;
        out.outgoing = dec!(10);
        store.insert_transaction(&out).unwrap();
        assert!(set_skip_outgoing(&store, &out.id, true).unwrap());
        assert!(!set_skip_outgoing(&store, &out.id, true).unwrap());
        assert!(store.get_transaction(&out.id).unwrap().unwrap().skip_outgoing);
        assert!(set_skip_outgoing(&store, &out.id, false).unwrap());
    }

    #[test]
    fn test_delete_transaction() {
        let (_dir, store) = test_store();
        let a = insert(&store, "ООО Ромашка");
        delete_transaction(&store, &a).unwrap();
        assert!(store.get_transaction(&a).unwrap().is_none());
    }

    #[test]
    fn test_own_organization_resolution_order() {
        let (_dir, store) = test_store();
        let me = add_counterparty(&store, "ИП Селецкий А.В.", "ИП", BankDetails::default()).unwrap();
        let other = add_counterparty(&store, "ООО Ромашка", "Юридическое лицо", BankDetails::default()).unwrap();

        assert!(own_organization(&store, "").unwrap().is_none());
        assert_eq!(own_organization(&store, "ип селецкий").unwrap().unwrap().id, me.id);

        set_own(&store, &other.id).unwrap();
        assert_eq!(own_organization(&store, "ип селецкий").unwrap().unwrap().id, other.id);
        assert!(matches!(set_own(&store, "missing"), Err(VypiskaError::UnknownCounterparty(_))));
    }
}
