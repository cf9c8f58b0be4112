pub mod categorize;
pub mod counterparties;
pub mod import;
pub mod init;
pub mod refmap;
pub mod report;
pub mod review;
pub mod rules;
pub mod status;
pub mod transactions;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use comfy_table::{Cell, Color};

use crate::error::{Result, VypiskaError};
use crate::models::{parse_date_dmy, Transaction};
use crate::settings::load_settings;
use crate::store::SqliteStore;

/// Open the configured database; it must have been created by `init`.
pub(crate) fn open_store() -> Result<SqliteStore> {
    let db_path = load_settings().db_path();
    if !db_path.exists() {
        return Err(VypiskaError::Other(
            "Database not found. Run `vypiska init` to set up.".to_string(),
        ));
    }
    SqliteStore::open(&db_path)
}

pub(crate) fn parse_day(raw: &str) -> Result<NaiveDate> {
    parse_date_dmy(raw).ok_or_else(|| VypiskaError::Other(format!("invalid date '{raw}', expected DD.MM.YYYY")))
}

pub(crate) fn category_cell(txn: &Transaction) -> Cell {
    let cell = Cell::new(txn.category_label());
    if txn.is_disputed() {
        cell.fg(Color::Red)
    } else {
        cell
    }
}

#[derive(Parser)]
#[command(name = "vypiska", about = "Bank statement import and categorization for small businesses.")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Choose a data directory and initialize the database.
    Init {
        /// Path for data (default: ~/Documents/vypiska)
        #[arg(long = "data-dir")]
        data_dir: Option<String>,
        /// Name fragment identifying your own organization
        #[arg(long = "own-organization")]
        own_organization: Option<String>,
    },
    /// Show settings and database counts.
    Status,
    /// Import one or more bank statement files.
    Import {
        /// Statement files (1C exchange format)
        #[arg(required = true)]
        files: Vec<String>,
    },
    /// Re-run categorization over every stored transaction.
    Categorize,
    /// Manage the reference category map.
    Refmap {
        #[command(subcommand)]
        command: RefmapCommands,
    },
    /// Manage per-counterparty user categories.
    Rules {
        #[command(subcommand)]
        command: RulesCommands,
    },
    /// Assign a category to a transaction's counterparty.
    Assign {
        /// Transaction ID
        id: String,
        #[arg(long)]
        category: String,
    },
    /// Resolve a disputed transaction without changing the rules.
    Resolve {
        /// Transaction ID
        id: String,
        #[arg(long)]
        category: String,
    },
    /// List disputed transactions.
    Disputed,
    /// List transactions.
    Transactions {
        /// Month filter (MM.YYYY)
        #[arg(long)]
        month: Option<String>,
    },
    /// Exclude an outgoing payment from reports.
    Skip {
        /// Transaction ID
        id: String,
        /// Include it again
        #[arg(long)]
        off: bool,
    },
    /// Delete a transaction.
    Delete {
        /// Transaction ID
        id: String,
    },
    /// Manage the counterparty directory.
    Counterparties {
        #[command(subcommand)]
        command: CounterpartiesCommands,
    },
    /// Income and expense totals for a period.
    Report {
        /// Start date (DD.MM.YYYY)
        #[arg(long = "from")]
        from_date: String,
        /// End date (DD.MM.YYYY)
        #[arg(long = "to")]
        to_date: String,
        /// Print totals even while disputed transactions remain
        #[arg(long)]
        force: bool,
    },
    /// Find payments for an invoice number.
    Invoice {
        number: String,
    },
    /// Export all transactions to a CSV file.
    Export {
        /// Output path
        output: String,
    },
}

#[derive(Subcommand)]
pub enum RefmapCommands {
    /// Replace the reference map from a CSV or XLSX file.
    Load {
        file: String,
    },
    /// Show the current reference map.
    List,
}

#[derive(Subcommand)]
pub enum RulesCommands {
    /// Add a category for a counterparty name.
    Add {
        counterparty: String,
        #[arg(long)]
        category: String,
    },
    /// Remove a category from a counterparty key.
    Remove {
        key: String,
        #[arg(long)]
        category: String,
    },
    /// List user categories.
    List,
}

#[derive(Subcommand)]
pub enum CounterpartiesCommands {
    /// List directory entries.
    List,
    /// Add a directory entry.
    Add {
        name: String,
        /// Kind label (default: Юридическое лицо)
        #[arg(long)]
        kind: Option<String>,
        #[arg(long = "tax-id")]
        tax_id: Option<String>,
        #[arg(long)]
        account: Option<String>,
    },
    /// Mark an entry as your own organization.
    SetOwn {
        id: String,
    },
}
