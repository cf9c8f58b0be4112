use thiserror::Error;

#[derive(Error, Debug)]
pub enum VypiskaError {
    #[error("Database error: {0}")]
    Db(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Unknown transaction: {0}")]
    UnknownTransaction(String),

    #[error("Unknown counterparty: {0}")]
    UnknownCounterparty(String),

    #[error("Category name cannot be empty")]
    EmptyCategory,

    #[error("Unsupported reference map format: {0} (expected .csv or .xlsx)")]
    UnsupportedMapFormat(String),

    #[error("Could not read reference map: {0}")]
    MapRead(String),

    #[error("Settings error: {0}")]
    Settings(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, VypiskaError>;
