use std::path::PathBuf;

use colored::Colorize;
use comfy_table::{Cell, CellAlignment, Table};

use crate::cli::{open_store, parse_day};
use crate::error::Result;
use crate::fmt::money;
use crate::reports::{expenses_for_period, export_csv, income_for_period, PeriodReport};

fn print_section(title: &str, report: &PeriodReport) {
    let mut table = Table::new();
    table.set_header(vec!["Category", "Amount"]);
    for item in &report.by_category {
        table.add_row(vec![
            Cell::new(&item.name),
            Cell::new(money(item.total)).set_alignment(CellAlignment::Right),
        ]);
    }
    table.add_row(vec![
        Cell::new("Total"),
        Cell::new(money(report.total)).set_alignment(CellAlignment::Right),
    ]);
    println!("{title}\n{table}");
}

pub fn run(from_date: &str, to_date: &str, force: bool) -> Result<()> {
    let from = parse_day(from_date)?;
    let to = parse_day(to_date)?;
    let store = open_store()?;

    let income = income_for_period(&store, from, to)?;
    let expenses = expenses_for_period(&store, from, to)?;
    let disputed = income.disputed + expenses.disputed;

    if disputed > 0 {
        let msg = format!("{disputed} disputed transaction(s) in this period. Run `vypiska disputed`.");
        if !force {
            println!("{}", msg.red());
            println!("Totals are withheld until they are resolved (use --force to print anyway).");
            return Ok(());
        }
        println!("{}", msg.yellow());
    }

    println!("Period {from_date} \u{2013} {to_date}");
    print_section("Income", &income);
    print_section("Expenses", &expenses);
    println!("Net: {}", money(income.total - expenses.total));
    Ok(())
}

pub fn export(output: &str) -> Result<()> {
    let store = open_store()?;
    let count = export_csv(&store, &PathBuf::from(output))?;
    println!("Exported {count} transactions to {output}");
    Ok(())
}
