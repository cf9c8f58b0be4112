use crate::error::Result;
use crate::fmt::format_bytes;
use crate::refmap::REFMAP_SOURCE_KEY;
use crate::reviewer::own_organization;
use crate::settings::load_settings;
use crate::store::{SqliteStore, Store};

pub fn run() -> Result<()> {
    let settings = load_settings();
    let db_path = settings.db_path();

    println!("Data dir:   {}", settings.data_dir);
    println!("Database:   {}", db_path.display());

    if !db_path.exists() {
        println!();
        println!("Database not found. Run `vypiska init` to set up.");
        return Ok(());
    }

    println!("DB size:    {}", format_bytes(std::fs::metadata(&db_path)?.len()));
    let store = SqliteStore::open(&db_path)?;

    let own = own_organization(&store, &settings.own_organization)?;
    println!("Company:    {}", own.map_or("(not set)".to_string(), |c| c.name));
    let source = store.metadata(REFMAP_SOURCE_KEY)?;
    println!("Ref. map:   {}", source.as_deref().unwrap_or("(not loaded)"));

    let txns = store.list_transactions()?;
    let disputed = txns.iter().filter(|t| t.is_disputed()).count();
    let unclassified = txns.iter().filter(|t| t.category.is_none()).count();
    let user_keys = store.user_map()?.len();

    println!();
    println!("Transactions:    {}", txns.len());
    println!("Disputed:        {disputed}");
    println!("Unclassified:    {unclassified}");
    println!("Counterparties:  {}", store.list_counterparties()?.len());
    println!("Ref. map keys:   {}", store.reference_map()?.len());
    println!("User rule keys:  {user_keys}");
    Ok(())
}
