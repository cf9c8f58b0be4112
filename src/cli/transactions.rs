use comfy_table::{Cell, Table};

use crate::cli::{category_cell, open_store};
use crate::error::Result;
use crate::fmt::money;
use crate::models::Transaction;
use crate::reports::{find_invoice_payments, transactions_for_month};
use crate::reviewer::{delete_transaction, set_skip_outgoing};

fn print_table(title: &str, rows: &[Transaction]) {
    let mut table = Table::new();
    table.set_header(vec!["ID", "Date", "Incoming", "Outgoing", "Skip", "Counterparty", "Category", "Purpose"]);
    for t in rows {
        table.add_row(vec![
            Cell::new(&t.id),
            Cell::new(&t.date),
            Cell::new(money(t.incoming)),
            Cell::new(money(t.outgoing)),
            Cell::new(if t.skip_outgoing { "yes" } else { "" }),
            Cell::new(&t.counterparty),
            category_cell(t),
            Cell::new(&t.purpose),
        ]);
    }
    println!("{title} ({})\n{table}", rows.len());
}

pub fn list(month: Option<&str>) -> Result<()> {
    let store = open_store()?;
    let rows = transactions_for_month(&store, month)?;
    print_table("Transactions", &rows);
    Ok(())
}

pub fn skip(id: &str, off: bool) -> Result<()> {
    let store = open_store()?;
    if set_skip_outgoing(&store, id, !off)? {
        println!("Transaction {id}: skip {}", if off { "off" } else { "on" });
    } else {
        println!("Transaction {id}: unchanged (only outgoing payments can be skipped)");
    }
    Ok(())
}

pub fn delete(id: &str) -> Result<()> {
    let store = open_store()?;
    delete_transaction(&store, id)?;
    println!("Deleted transaction {id}");
    Ok(())
}

pub fn invoice(number: &str) -> Result<()> {
    let store = open_store()?;
    let rows = find_invoice_payments(&store, number)?;
    if rows.is_empty() {
        println!("No payments found for invoice {number}");
        return Ok(());
    }
    print_table(&format!("Payments for invoice {number}"), &rows);
    Ok(())
}
