use std::cell::Cell;
use std::path::Path;

use rusqlite::{Connection, OptionalExtension, Row};
use rust_decimal::Decimal;

use crate::db::{get_connection, get_metadata, init_db, set_metadata};
use crate::error::Result;
use crate::models::{
    norm_text, BankDetails, Category, Counterparty, ImportRecord, ReferenceMap, StatementDate,
    Transaction, UserMap,
};

/// A single mutable column of a stored transaction.
#[derive(Debug, Clone, PartialEq)]
pub enum TransactionField {
    Category(Option<Category>),
    SkipOutgoing(bool),
    Counterparty(String),
    TaxId(String),
}

/// Keyed record store behind the ingestion engine.
pub trait Store {
    /// Run `f` holding the store's write lock. Nested calls join the outer lock.
    /// Importers and recalculation go through here so fingerprint reads and
    /// inserts cannot interleave with another writer.
    fn exclusive<T>(&self, f: impl FnOnce(&Self) -> Result<T>) -> Result<T>;

    /// Returns false when a row with the same id already exists.
    fn insert_transaction(&self, txn: &Transaction) -> Result<bool>;
    fn get_transaction(&self, id: &str) -> Result<Option<Transaction>>;
    fn list_transactions(&self) -> Result<Vec<Transaction>>;
    fn update_transaction(&self, id: &str, field: TransactionField) -> Result<bool>;
    fn delete_transaction(&self, id: &str) -> Result<bool>;

    fn get_counterparty(&self, id: &str) -> Result<Option<Counterparty>>;
    fn insert_counterparty(&self, cp: &Counterparty) -> Result<()>;
    fn update_counterparty(&self, cp: &Counterparty) -> Result<()>;
    fn list_counterparties(&self) -> Result<Vec<Counterparty>>;
    /// Flag `id` as our own organization and clear the flag everywhere else.
    fn set_own_counterparty(&self, id: &str) -> Result<bool>;

    fn reference_map(&self) -> Result<ReferenceMap>;
    fn replace_reference_map(&self, map: &ReferenceMap) -> Result<()>;

    fn user_map(&self) -> Result<UserMap>;
    /// Returns false when the pair was already present.
    fn add_user_category(&self, key: &str, category: &str) -> Result<bool>;
    fn remove_user_category(&self, key: &str, category: &str) -> Result<bool>;

    fn metadata(&self, key: &str) -> Result<Option<String>>;
    fn set_metadata(&self, key: &str, value: &str) -> Result<()>;

    fn record_import(&self, record: &ImportRecord) -> Result<()>;
    fn checksum_seen(&self, checksum: &str) -> Result<bool>;

    /// Exact normalized match first, then containment in either direction.
    fn find_counterparty_by_name(&self, name: &str) -> Result<Option<Counterparty>> {
        let wanted = norm_text(name);
        if wanted.is_empty() {
            return Ok(None);
        }
        let all = self.list_counterparties()?;
        if let Some(cp) = all.iter().find(|c| norm_text(&c.name) == wanted) {
            return Ok(Some(cp.clone()));
        }
        Ok(all.into_iter().find(|c| {
            let have = norm_text(&c.name);
            !have.is_empty() && (have.contains(&wanted) || wanted.contains(&have))
        }))
    }
}

// ---------------------------------------------------------------------------
// SQLite
// ---------------------------------------------------------------------------

pub struct SqliteStore {
    conn: Connection,
    lock_depth: Cell<u32>,
}

const TXN_COLUMNS: &str = "id, date_str, incoming, outgoing, purpose, counterparty, doctype, \
     skip_outgoing, category, is_disputed, cp_inn, cp_kpp, cp_account, cp_bank, cp_bik, cp_corr";

const CP_COLUMNS: &str = "id, kind, name, inn, kpp, bank, bik, corr, account, is_own";

fn row_to_transaction(row: &Row) -> rusqlite::Result<Transaction> {
    let date: String = row.get(1)?;
    let incoming: String = row.get(2)?;
    let outgoing: String = row.get(3)?;
    let category: Option<String> = row.get(8)?;
    let is_disputed: bool = row.get(9)?;
    let category = if is_disputed {
        Some(Category::Disputed)
    } else {
        category.map(Category::Assigned)
    };
    Ok(Transaction {
        id: row.get(0)?,
        date: StatementDate::parse(&date),
        incoming: incoming.parse().unwrap_or(Decimal::ZERO),
        outgoing: outgoing.parse().unwrap_or(Decimal::ZERO),
        purpose: row.get(4)?,
        counterparty: row.get(5)?,
        doctype: row.get(6)?,
        skip_outgoing: row.get(7)?,
        category,
        details: BankDetails {
            tax_id: row.get(10)?,
            kpp: row.get(11)?,
            account: row.get(12)?,
            bank: row.get(13)?,
            bik: row.get(14)?,
            corr_account: row.get(15)?,
        },
    })
}

fn row_to_counterparty(row: &Row) -> rusqlite::Result<Counterparty> {
    Ok(Counterparty {
        id: row.get(0)?,
        kind: row.get(1)?,
        name: row.get(2)?,
        details: BankDetails {
            tax_id: row.get(3)?,
            kpp: row.get(4)?,
            bank: row.get(5)?,
            bik: row.get(6)?,
            corr_account: row.get(7)?,
            account: row.get(8)?,
        },
        is_own: row.get(9)?,
    })
}

/// (category column, is_disputed column) for a stored classification.
fn category_columns(category: &Option<Category>) -> (Option<&str>, bool) {
    match category {
        None => (None, false),
        Some(c) => (Some(c.label()), c.is_disputed()),
    }
}

impl SqliteStore {
    pub fn open(db_path: &Path) -> Result<Self> {
        let conn = get_connection(db_path)?;
        init_db(&conn)?;
        Ok(Self::new(conn))
    }

    pub fn new(conn: Connection) -> Self {
        Self {
            conn,
            lock_depth: Cell::new(0),
        }
    }

    #[cfg(test)]
    pub fn conn(&self) -> &Connection {
        &self.conn
    }
}

impl Store for SqliteStore {
    fn exclusive<T>(&self, f: impl FnOnce(&Self) -> Result<T>) -> Result<T> {
        if self.lock_depth.get() > 0 {
            return f(self);
        }
        // IMMEDIATE takes the write lock up front; other writers wait on the busy timeout.
        self.conn.execute_batch("BEGIN IMMEDIATE")?;
        self.lock_depth.set(1);
        let result = f(self);
        self.lock_depth.set(0);
        match result {
            Ok(value) => match self.conn.execute_batch("COMMIT") {
                Ok(()) => Ok(value),
                Err(e) => {
                    let _ = self.conn.execute_batch("ROLLBACK");
                    Err(e.into())
                }
            },
            Err(e) => {
                let _ = self.conn.execute_batch("ROLLBACK");
                Err(e)
            }
        }
    }

    fn insert_transaction(&self, txn: &Transaction) -> Result<bool> {
        let (category, is_disputed) = category_columns(&txn.category);
        let changed = self.conn.execute(
            "INSERT INTO transactions (id, date_str, month, incoming, outgoing, purpose, counterparty, \
             doctype, skip_outgoing, category, is_disputed, cp_inn, cp_kpp, cp_account, cp_bank, cp_bik, cp_corr) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17) \
             ON CONFLICT(id) DO NOTHING",
            rusqlite::params![
                txn.id,
                txn.date.to_string(),
                txn.month(),
                txn.incoming.to_string(),
                txn.outgoing.to_string(),
                txn.purpose,
                txn.counterparty,
                txn.doctype,
                txn.skip_outgoing,
                category,
                is_disputed,
                txn.details.tax_id,
                txn.details.kpp,
                txn.details.account,
                txn.details.bank,
                txn.details.bik,
                txn.details.corr_account,
            ],
        )?;
        Ok(changed > 0)
    }

    fn get_transaction(&self, id: &str) -> Result<Option<Transaction>> {
        let sql = format!("SELECT {TXN_COLUMNS} FROM transactions WHERE id = ?1");
        Ok(self.conn.query_row(&sql, [id], row_to_transaction).optional()?)
    }

    fn list_transactions(&self) -> Result<Vec<Transaction>> {
        let sql = format!("SELECT {TXN_COLUMNS} FROM transactions ORDER BY created_at, rowid");
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map([], row_to_transaction)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn update_transaction(&self, id: &str, field: TransactionField) -> Result<bool> {
        let changed = match &field {
            TransactionField::Category(category) => {
                let (label, is_disputed) = category_columns(category);
                self.conn.execute(
                    "UPDATE transactions SET category = ?1, is_disputed = ?2 WHERE id = ?3",
                    rusqlite::params![label, is_disputed, id],
                )?
            }
            TransactionField::SkipOutgoing(skip) => self.conn.execute(
                "UPDATE transactions SET skip_outgoing = ?1 WHERE id = ?2",
                rusqlite::params![skip, id],
            )?,
            TransactionField::Counterparty(name) => self.conn.execute(
                "UPDATE transactions SET counterparty = ?1 WHERE id = ?2",
                rusqlite::params![name, id],
            )?,
            TransactionField::TaxId(tax_id) => self.conn.execute(
                "UPDATE transactions SET cp_inn = ?1 WHERE id = ?2",
                rusqlite::params![tax_id, id],
            )?,
        };
        Ok(changed > 0)
    }

    fn delete_transaction(&self, id: &str) -> Result<bool> {
        Ok(self.conn.execute("DELETE FROM transactions WHERE id = ?1", [id])? > 0)
    }

    fn get_counterparty(&self, id: &str) -> Result<Option<Counterparty>> {
        let sql = format!("SELECT {CP_COLUMNS} FROM counterparties WHERE id = ?1");
        Ok(self.conn.query_row(&sql, [id], row_to_counterparty).optional()?)
    }

    fn insert_counterparty(&self, cp: &Counterparty) -> Result<()> {
        self.conn.execute(
            "INSERT INTO counterparties (id, kind, name, inn, kpp, bank, bik, corr, account, is_own) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10) ON CONFLICT(id) DO NOTHING",
            rusqlite::params![
                cp.id,
                cp.kind,
                cp.name,
                cp.details.tax_id,
                cp.details.kpp,
                cp.details.bank,
                cp.details.bik,
                cp.details.corr_account,
                cp.details.account,
                cp.is_own,
            ],
        )?;
        Ok(())
    }

    fn update_counterparty(&self, cp: &Counterparty) -> Result<()> {
        self.conn.execute(
            "UPDATE counterparties SET kind = ?1, name = ?2, inn = ?3, kpp = ?4, bank = ?5, \
             bik = ?6, corr = ?7, account = ?8, is_own = ?9 WHERE id = ?10",
            rusqlite::params![
                cp.kind,
                cp.name,
                cp.details.tax_id,
                cp.details.kpp,
                cp.details.bank,
                cp.details.bik,
                cp.details.corr_account,
                cp.details.account,
                cp.is_own,
                cp.id,
            ],
        )?;
        Ok(())
    }

    fn list_counterparties(&self) -> Result<Vec<Counterparty>> {
        let sql = format!("SELECT {CP_COLUMNS} FROM counterparties ORDER BY name");
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map([], row_to_counterparty)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn set_own_counterparty(&self, id: &str) -> Result<bool> {
        self.exclusive(|s| {
            if s.get_counterparty(id)?.is_none() {
                return Ok(false);
            }
            s.conn.execute("UPDATE counterparties SET is_own = (id = ?1)", [id])?;
            Ok(true)
        })
    }

    fn reference_map(&self) -> Result<ReferenceMap> {
        let mut stmt = self
            .conn
            .prepare("SELECT counterparty_key, category FROM reference_map")?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?
            .collect::<std::result::Result<ReferenceMap, _>>()?;
        Ok(rows)
    }

    fn replace_reference_map(&self, map: &ReferenceMap) -> Result<()> {
        self.exclusive(|s| {
            s.conn.execute("DELETE FROM reference_map", [])?;
            let mut stmt = s
                .conn
                .prepare("INSERT INTO reference_map (counterparty_key, category) VALUES (?1, ?2)")?;
            for (key, category) in map {
                stmt.execute([key, category])?;
            }
            Ok(())
        })
    }

    fn user_map(&self) -> Result<UserMap> {
        let mut stmt = self
            .conn
            .prepare("SELECT counterparty_key, category FROM user_map ORDER BY id")?;
        let pairs = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let mut map = UserMap::new();
        for (key, category) in pairs {
            let cats = map.entry(key).or_default();
            if !category.is_empty() && !cats.contains(&category) {
                cats.push(category);
            }
        }
        Ok(map)
    }

    fn add_user_category(&self, key: &str, category: &str) -> Result<bool> {
        let changed = self.conn.execute(
            "INSERT INTO user_map (counterparty_key, category) VALUES (?1, ?2) \
             ON CONFLICT(counterparty_key, category) DO NOTHING",
            [key, category],
        )?;
        Ok(changed > 0)
    }

    fn remove_user_category(&self, key: &str, category: &str) -> Result<bool> {
        let changed = self.conn.execute(
            "DELETE FROM user_map WHERE counterparty_key = ?1 AND category = ?2",
            [key, category],
        )?;
        Ok(changed > 0)
    }

    fn metadata(&self, key: &str) -> Result<Option<String>> {
        Ok(get_metadata(&self.conn, key))
    }

    fn set_metadata(&self, key: &str, value: &str) -> Result<()> {
        set_metadata(&self.conn, key, value)
    }

    fn record_import(&self, record: &ImportRecord) -> Result<()> {
        self.conn.execute(
            "INSERT INTO imports (source, parsed_count, imported_count, date_range_start, date_range_end, checksum) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            rusqlite::params![
                record.source,
                record.parsed_count as i64,
                record.imported_count as i64,
                record.date_range_start,
                record.date_range_end,
                record.checksum,
            ],
        )?;
        Ok(())
    }

    fn checksum_seen(&self, checksum: &str) -> Result<bool> {
        let mut stmt = self.conn.prepare("SELECT 1 FROM imports WHERE checksum = ?1")?;
        Ok(stmt.exists([checksum])?)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::models::new_id;
    use rust_decimal_macros::dec;

    pub(crate) fn test_store() -> (tempfile::TempDir, SqliteStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::open(&dir.path().join("test.db")).unwrap();
        (dir, store)
    }

    pub(crate) fn sample_txn(counterparty: &str, purpose: &str) -> Transaction {
        Transaction {
            id: new_id(),
            date: StatementDate::parse("15.01.2024"),
            incoming: dec!(100.50),
            outgoing: Decimal::ZERO,
            purpose: purpose.to_string(),
            counterparty: counterparty.to_string(),
            doctype: "Платежное поручение".to_string(),
            skip_outgoing: false,
            category: None,
            details: BankDetails::default(),
        }
    }

    fn counterparty(name: &str) -> Counterparty {
        Counterparty {
            id: new_id(),
            kind: "Юридическое лицо".to_string(),
            name: name.to_string(),
            details: BankDetails::default(),
            is_own: false,
        }
    }

    #[test]
    fn test_transaction_roundtrip() {
        let (_dir, store) = test_store();
        let mut txn = sample_txn("ООО Ромашка", "Оплата");
        txn.details.tax_id = "7701234567".to_string();
        txn.category = Some(Category::Assigned("Аренда".to_string()));
        assert!(store.insert_transaction(&txn).unwrap());
        assert!(!store.insert_transaction(&txn).unwrap());
        let loaded = store.get_transaction(&txn.id).unwrap().unwrap();
        assert_eq!(loaded, txn);
        assert_eq!(store.list_transactions().unwrap().len(), 1);
    }

    #[test]
    fn test_disputed_flag_is_authoritative() {
        let (_dir, store) = test_store();
        let txn = sample_txn("ООО Ромашка", "Оплата");
        store.insert_transaction(&txn).unwrap();
        store
            .update_transaction(&txn.id, TransactionField::Category(Some(Category::Disputed)))
            .unwrap();
        assert!(store.get_transaction(&txn.id).unwrap().unwrap().is_disputed());

        // A real category that happens to be spelled like the sentinel.
        let label = Category::Disputed.label().to_string();
        store
            .update_transaction(&txn.id, TransactionField::Category(Some(Category::Assigned(label.clone()))))
            .unwrap();
        let loaded = store.get_transaction(&txn.id).unwrap().unwrap();
        assert_eq!(loaded.category, Some(Category::Assigned(label)));
    }

    #[test]
    fn test_update_unknown_id() {
        let (_dir, store) = test_store();
        assert!(!store.update_transaction("nope", TransactionField::SkipOutgoing(true)).unwrap());
        assert!(!store.delete_transaction("nope").unwrap());
    }

    #[test]
    fn test_find_counterparty_exact_before_substring() {
        let (_dir, store) = test_store();
        store.insert_counterparty(&counterparty("ООО Ромашка Плюс")).unwrap();
        store.insert_counterparty(&counterparty("ООО Ромашка")).unwrap();
        let found = store.find_counterparty_by_name("ооо  ромашка").unwrap().unwrap();
        assert_eq!(found.name, "ООО Ромашка");
    }

    #[test]
    fn test_find_counterparty_substring_either_way() {
        let (_dir, store) = test_store();
        store.insert_counterparty(&counterparty("Ромашка")).unwrap();
        assert!(store.find_counterparty_by_name("ООО Ромашка").unwrap().is_some());
        assert!(store.find_counterparty_by_name("Ромаш").unwrap().is_some());
        assert!(store.find_counterparty_by_name("Вектор").unwrap().is_none());
        assert!(store.find_counterparty_by_name("  ").unwrap().is_none());
    }

    #[test]
    fn test_set_own_counterparty_is_exclusive() {
        let (_dir, store) = test_store();
        let a = counterparty("ИП Селецкий");
        let b = counterparty("ООО Ромашка");
        store.insert_counterparty(&a).unwrap();
        store.insert_counterparty(&b).unwrap();
        assert!(store.set_own_counterparty(&a.id).unwrap());
        assert!(store.set_own_counterparty(&b.id).unwrap());
        let own: Vec<_> = store.list_counterparties().unwrap().into_iter().filter(|c| c.is_own).collect();
        assert_eq!(own.len(), 1);
        assert_eq!(own[0].id, b.id);
        assert!(!store.set_own_counterparty("missing").unwrap());
    }

    #[test]
    fn test_reference_map_replaced_wholesale() {
        let (_dir, store) = test_store();
        let mut first = ReferenceMap::new();
        first.insert("РОМАШКА".to_string(), "Аренда".to_string());
        first.insert("ВЕКТОР".to_string(), "Услуги".to_string());
        store.replace_reference_map(&first).unwrap();
        let mut second = ReferenceMap::new();
        second.insert("КОНТУР".to_string(), "Связь".to_string());
        store.replace_reference_map(&second).unwrap();
        assert_eq!(store.reference_map().unwrap(), second);
    }

    #[test]
    fn test_user_map_keeps_insertion_order_and_dedups() {
        let (_dir, store) = test_store();
        assert!(store.add_user_category("РОМАШКА", "Аренда").unwrap());
        assert!(store.add_user_category("РОМАШКА", "Услуги").unwrap());
        assert!(!store.add_user_category("РОМАШКА", "Аренда").unwrap());
        let map = store.user_map().unwrap();
        assert_eq!(map["РОМАШКА"], vec!["Аренда".to_string(), "Услуги".to_string()]);
        assert!(store.remove_user_category("РОМАШКА", "Аренда").unwrap());
        assert_eq!(store.user_map().unwrap()["РОМАШКА"], vec!["Услуги".to_string()]);
    }

    #[test]
    fn test_exclusive_rolls_back_on_error() {
        let (_dir, store) = test_store();
        let txn = sample_txn("ООО Ромашка", "Оплата");
        let result: Result<()> = store.exclusive(|s| {
            s.insert_transaction(&txn)?;
            Err(crate::error::VypiskaError::Other("boom".to_string()))
        });
        assert!(result.is_err());
        assert!(store.list_transactions().unwrap().is_empty());
    }

    #[test]
    fn test_exclusive_rolls_back_failed_commit() {
        let (_dir, store) = test_store();
        store
            .conn()
            .execute_batch(
                "PRAGMA foreign_keys = ON;
                 CREATE TABLE parent (id INTEGER PRIMARY KEY);
                 CREATE TABLE child (
                     parent_id INTEGER REFERENCES parent(id) DEFERRABLE INITIALLY DEFERRED
                 );",
            )
            .unwrap();

        let result = store.exclusive(|s| {
            s.conn().execute("INSERT INTO child (parent_id) VALUES (1)", [])?;
            Ok(())
        });
        assert!(result.is_err());
        assert!(store.conn().is_autocommit());

        store
            .exclusive(|s| s.set_metadata("after", "ok"))
            .unwrap();
        assert_eq!(store.metadata("after").unwrap().as_deref(), Some("ok"));
    }

    #[test]
    fn test_exclusive_nests() {
        let (_dir, store) = test_store();
        store
            .exclusive(|s| {
                let mut map = ReferenceMap::new();
                map.insert("A".to_string(), "B".to_string());
                s.replace_reference_map(&map)
            })
            .unwrap();
        assert_eq!(store.reference_map().unwrap().len(), 1);
    }

    #[test]
    fn test_import_log() {
        let (_dir, store) = test_store();
        assert!(!store.checksum_seen("abc").unwrap());
        store
            .record_import(&ImportRecord {
                source: "stmt.txt".to_string(),
                checksum: "abc".to_string(),
                parsed_count: 3,
                imported_count: 2,
                date_range_start: None,
                date_range_end: None,
            })
            .unwrap();
        assert!(store.checksum_seen("abc").unwrap());
    }
}
