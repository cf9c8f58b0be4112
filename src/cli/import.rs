use std::path::PathBuf;

use colored::Colorize;

use crate::cli::open_store;
use crate::error::Result;
use crate::importer::import_file;

pub fn run(files: &[String]) -> Result<()> {
    let store = open_store()?;

    let mut any_imported = false;
    for file in files {
        let path = PathBuf::from(file);
        // Each file commits on its own; a failure later keeps earlier files.
        let result = import_file(&store, &path)?;

        if let Some(reason) = result.rejected {
            println!("{}: {} ({reason})", file, "rejected".yellow());
            continue;
        }
        if result.previously_imported {
            println!("{file}: this file was imported before (same checksum).");
        }
        println!(
            "{file}: {} parsed, {} imported, {} skipped (duplicates)",
            result.parsed, result.imported, result.skipped
        );
        any_imported |= result.imported > 0;
    }

    if any_imported {
        let disputed = crate::reviewer::list_disputed(&store)?.len();
        if disputed > 0 {
            println!("{}", format!("{disputed} disputed transaction(s). Run `vypiska disputed`.").yellow());
        }
    }
    Ok(())
}
