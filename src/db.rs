use std::path::Path;
use std::time::Duration;

use rusqlite::{Connection, OptionalExtension};

use crate::error::Result;

pub const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS transactions (
    id TEXT PRIMARY KEY,
    date_str TEXT NOT NULL DEFAULT '',
    month TEXT NOT NULL DEFAULT '',
    incoming TEXT NOT NULL DEFAULT '0',
    outgoing TEXT NOT NULL DEFAULT '0',
    purpose TEXT NOT NULL DEFAULT '',
    counterparty TEXT NOT NULL DEFAULT '',
    doctype TEXT NOT NULL DEFAULT '',
    skip_outgoing INTEGER NOT NULL DEFAULT 0,
    category TEXT,
    is_disputed INTEGER NOT NULL DEFAULT 0,
    cp_inn TEXT NOT NULL DEFAULT '',
    cp_kpp TEXT NOT NULL DEFAULT '',
    cp_account TEXT NOT NULL DEFAULT '',
    cp_bank TEXT NOT NULL DEFAULT '',
    cp_bik TEXT NOT NULL DEFAULT '',
    cp_corr TEXT NOT NULL DEFAULT '',
    created_at TEXT DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS counterparties (
    id TEXT PRIMARY KEY,
    kind TEXT NOT NULL DEFAULT '',
    name TEXT NOT NULL,
    inn TEXT NOT NULL DEFAULT '',
    kpp TEXT NOT NULL DEFAULT '',
    bank TEXT NOT NULL DEFAULT '',
    bik TEXT NOT NULL DEFAULT '',
    corr TEXT NOT NULL DEFAULT '',
    account TEXT NOT NULL DEFAULT '',
    is_own INTEGER NOT NULL DEFAULT 0,
    created_at TEXT DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS reference_map (
    counterparty_key TEXT PRIMARY KEY,
    category TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS user_map (
    id INTEGER PRIMARY KEY,
    counterparty_key TEXT NOT NULL,
    category TEXT NOT NULL,
    UNIQUE (counterparty_key, category)
);
CREATE INDEX IF NOT EXISTS idx_user_map_key ON user_map (counterparty_key);

CREATE TABLE IF NOT EXISTS imports (
    id INTEGER PRIMARY KEY,
    source TEXT NOT NULL,
    import_date TEXT DEFAULT (datetime('now')),
    parsed_count INTEGER NOT NULL DEFAULT 0,
    imported_count INTEGER NOT NULL DEFAULT 0,
    date_range_start TEXT,
    date_range_end TEXT,
    checksum TEXT
);

CREATE TABLE IF NOT EXISTS metadata (
    key TEXT PRIMARY KEY,
    value TEXT
);
";

pub fn get_connection(db_path: &Path) -> Result<Connection> {
    let conn = Connection::open(db_path)?;
    conn.busy_timeout(Duration::from_secs(30))?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
    Ok(conn)
}

pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(SCHEMA)?;
    Ok(())
}

pub fn get_metadata(conn: &Connection, key: &str) -> Option<String> {
    conn.query_row("SELECT value FROM metadata WHERE key = ?1", [key], |r| r.get(0))
        .optional()
        .ok()
        .flatten()
}

pub fn set_metadata(conn: &Connection, key: &str, value: &str) -> Result<()> {
    conn.execute(
        "INSERT INTO metadata (key, value) VALUES (?1, ?2) \
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        rusqlite::params![key, value],
    )?;
    Ok(())
}
