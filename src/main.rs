mod categorizer;
mod cli;
mod db;
mod error;
mod fingerprint;
mod fmt;
mod importer;
mod models;
mod names;
mod refmap;
mod reports;
mod reviewer;
mod settings;
mod statement;
mod store;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Commands, CounterpartiesCommands, RefmapCommands, RulesCommands};

fn main() {
    // Logs go to stderr so table output on stdout stays clean.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("vypiska=warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Init {
            data_dir,
            own_organization,
        } => cli::init::run(data_dir, own_organization),
        Commands::Status => cli::status::run(),
        Commands::Import { files } => cli::import::run(&files),
        Commands::Categorize => cli::categorize::run(),
        Commands::Refmap { command } => match command {
            RefmapCommands::Load { file } => cli::refmap::load(&file),
            RefmapCommands::List => cli::refmap::list(),
        },
        Commands::Rules { command } => match command {
            RulesCommands::Add {
                counterparty,
                category,
            } => cli::rules::add(&counterparty, &category),
            RulesCommands::Remove { key, category } => cli::rules::remove(&key, &category),
            RulesCommands::List => cli::rules::list(),
        },
        Commands::Assign { id, category } => cli::review::assign(&id, &category),
        Commands::Resolve { id, category } => cli::review::resolve(&id, &category),
        Commands::Disputed => cli::review::disputed(),
        Commands::Transactions { month } => cli::transactions::list(month.as_deref()),
        Commands::Skip { id, off } => cli::transactions::skip(&id, off),
        Commands::Delete { id } => cli::transactions::delete(&id),
        Commands::Counterparties { command } => match command {
            CounterpartiesCommands::List => cli::counterparties::list(),
            CounterpartiesCommands::Add {
                name,
                kind,
                tax_id,
                account,
            } => cli::counterparties::add(&name, kind.as_deref(), tax_id.as_deref(), account.as_deref()),
            CounterpartiesCommands::SetOwn { id } => cli::counterparties::set_own_organization(&id),
        },
        Commands::Report {
            from_date,
            to_date,
            force,
        } => cli::report::run(&from_date, &to_date, force),
        Commands::Invoice { number } => cli::transactions::invoice(&number),
        Commands::Export { output } => cli::report::export(&output),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
