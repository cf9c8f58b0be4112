use std::path::PathBuf;

use comfy_table::{Cell, Table};

use crate::cli::open_store;
use crate::error::Result;
use crate::refmap::{import_reference_map, REFMAP_SOURCE_KEY};
use crate::store::Store;

pub fn load(file: &str) -> Result<()> {
    let store = open_store()?;
    let result = import_reference_map(&store, &PathBuf::from(file))?;
    println!("Loaded {} entries from {file}", result.entries);
    println!(
        "{} transactions, {} changed, {} disputed",
        result.recalc.total, result.recalc.changed, result.recalc.disputed
    );
    Ok(())
}

pub fn list() -> Result<()> {
    let store = open_store()?;
    let map = store.reference_map()?;
    let source = store.metadata(REFMAP_SOURCE_KEY)?;

    let mut table = Table::new();
    table.set_header(vec!["Counterparty", "Category"]);
    for (key, category) in &map {
        table.add_row(vec![Cell::new(key), Cell::new(category)]);
    }
    println!("Reference map ({})\n{table}", source.as_deref().unwrap_or("not loaded"));
    Ok(())
}
