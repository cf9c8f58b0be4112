use crate::categorizer::recalculate;
use crate::cli::open_store;
use crate::error::Result;

pub fn run() -> Result<()> {
    let store = open_store()?;
    let result = recalculate(&store)?;
    println!(
        "{} transactions, {} changed, {} disputed",
        result.total, result.changed, result.disputed
    );
    Ok(())
}
