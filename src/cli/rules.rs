use comfy_table::{Cell, Color, Table};

use crate::cli::open_store;
use crate::error::{Result, VypiskaError};
use crate::models::norm_text;
use crate::reviewer::{bulk_assign, remove_user_category};
use crate::store::Store;

pub fn add(counterparty: &str, category: &str) -> Result<()> {
    let store = open_store()?;
    let result = bulk_assign(&store, &[counterparty.to_string()], category)?;
    println!("Added rule: '{}' \u{2192} {}", norm_text(counterparty), category.trim());
    if result.disputed > 0 {
        println!("{} disputed transaction(s)", result.disputed);
    }
    Ok(())
}

pub fn remove(key: &str, category: &str) -> Result<()> {
    let store = open_store()?;
    match remove_user_category(&store, key, category)? {
        Some(result) => {
            println!("Removed rule: '{}' \u{2192} {}", norm_text(key), category.trim());
            println!("{} changed, {} disputed", result.changed, result.disputed);
            Ok(())
        }
        None => Err(VypiskaError::Other(format!(
            "No rule '{}' \u{2192} {}",
            norm_text(key),
            category.trim()
        ))),
    }
}

pub fn list() -> Result<()> {
    let store = open_store()?;
    let mut table = Table::new();
    table.set_header(vec!["Counterparty", "Categories"]);
    for (key, categories) in store.user_map()? {
        let mut cell = Cell::new(categories.join(", "));
        if categories.len() > 1 {
            cell = cell.fg(Color::Red);
        }
        table.add_row(vec![Cell::new(key), cell]);
    }
    println!("Rules\n{table}");
    Ok(())
}
