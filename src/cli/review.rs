use comfy_table::{Cell, Table};

use crate::cli::{category_cell, open_store};
use crate::error::Result;
use crate::fmt::money;
use crate::reviewer::{assign_category, list_disputed, resolve_dispute};

pub fn assign(id: &str, category: &str) -> Result<()> {
    let store = open_store()?;
    let result = assign_category(&store, id, category)?;
    println!("{} changed, {} disputed", result.changed, result.disputed);
    Ok(())
}

pub fn resolve(id: &str, category: &str) -> Result<()> {
    let store = open_store()?;
    resolve_dispute(&store, id, category)?;
    println!("Transaction {id} \u{2192} {}", category.trim());
    Ok(())
}

pub fn disputed() -> Result<()> {
    let store = open_store()?;
    let rows = list_disputed(&store)?;
    if rows.is_empty() {
        println!("No disputed transactions.");
        return Ok(());
    }

    let mut table = Table::new();
    table.set_header(vec!["ID", "Date", "Incoming", "Outgoing", "Counterparty", "Category", "Candidates"]);
    for row in &rows {
        let t = &row.txn;
        table.add_row(vec![
            Cell::new(&t.id),
            Cell::new(&t.date),
            Cell::new(money(t.incoming)),
            Cell::new(money(t.outgoing)),
            Cell::new(&t.counterparty),
            category_cell(t),
            Cell::new(row.candidates.join(", ")),
        ]);
    }
    println!("Disputed ({})\n{table}", rows.len());
    Ok(())
}
