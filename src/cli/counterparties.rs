use comfy_table::{Cell, Table};

use crate::cli::open_store;
use crate::error::Result;
use crate::importer::AUTO_COUNTERPARTY_KIND;
use crate::models::BankDetails;
use crate::reviewer::{add_counterparty, set_own};
use crate::store::Store;

pub fn list() -> Result<()> {
    let store = open_store()?;
    let mut table = Table::new();
    table.set_header(vec!["ID", "Name", "Kind", "INN", "Account", "Own"]);
    for cp in store.list_counterparties()? {
        table.add_row(vec![
            Cell::new(&cp.id),
            Cell::new(&cp.name),
            Cell::new(&cp.kind),
            Cell::new(&cp.details.tax_id),
            Cell::new(&cp.details.account),
            Cell::new(if cp.is_own { "*" } else { "" }),
        ]);
    }
    println!("Counterparties\n{table}");
    Ok(())
}

pub fn add(name: &str, kind: Option<&str>, tax_id: Option<&str>, account: Option<&str>) -> Result<()> {
    let store = open_store()?;
    let details = BankDetails {
        tax_id: tax_id.unwrap_or_default().trim().to_string(),
        account: account.unwrap_or_default().trim().to_string(),
        ..BankDetails::default()
    };
    let cp = add_counterparty(&store, name, kind.unwrap_or(AUTO_COUNTERPARTY_KIND), details)?;
    println!("Added counterparty {} ({})", cp.name, cp.id);
    Ok(())
}

pub fn set_own_organization(id: &str) -> Result<()> {
    let store = open_store()?;
    set_own(&store, id)?;
    println!("Counterparty {id} marked as own organization");
    Ok(())
}
