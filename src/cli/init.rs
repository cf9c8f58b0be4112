use std::path::PathBuf;

use crate::error::Result;
use crate::settings::{load_settings, save_settings, shellexpand_path};
use crate::store::SqliteStore;

pub fn run(data_dir: Option<String>, own_organization: Option<String>) -> Result<()> {
    let mut settings = load_settings();
    if let Some(dir) = data_dir {
        settings.data_dir = shellexpand_path(&dir);
    }
    if let Some(own) = own_organization {
        settings.own_organization = own.trim().to_string();
    }

    std::fs::create_dir_all(PathBuf::from(&settings.data_dir))?;
    SqliteStore::open(&settings.db_path())?;
    save_settings(&settings)?;

    println!("Data directory: {}", settings.data_dir);
    println!("Database:       {}", settings.db_path().display());
    Ok(())
}
