use colored::Colorize;
use comfy_table::{Cell, Table};

use crate::budgets::{copy_budgets, list_budgets, set_budget};
use crate::categories::find_category;
use crate::error::Result;
use crate::fmt::yen;
use crate::period::YearMonth;

use super::{month_or_current, open_db};

pub fn set(category: &str, amount: i64, month: Option<&str>) -> Result<()> {
    let year_month = month_or_current(month)?;
    let conn = open_db()?;
    let category = find_category(&conn, category)?;
    set_budget(&conn, category.id, &year_month, amount)?;
    println!("Budget for {} in {year_month}: {}", category.name, yen(amount));
    Ok(())
}

pub fn list(month: Option<&str>) -> Result<()> {
    let year_month = month_or_current(month)?;
    let conn = open_db()?;
    let lines = list_budgets(&conn, &year_month)?;
    if lines.is_empty() {
        println!("No budgets set for {year_month}.");
        return Ok(());
    }

    let mut table = Table::new();
    table.set_header(vec!["Category", "Budget"]);
    let mut total = 0;
    for line in lines {
        total += line.budget.amount;
        table.add_row(vec![
            Cell::new(line.category_name),
            Cell::new(yen(line.budget.amount)),
        ]);
    }
    table.add_row(vec![
        Cell::new("Total".bold()),
        Cell::new(yen(total)),
    ]);
    println!("Budgets {year_month}\n{table}");
    Ok(())
}

pub fn copy(from: Option<&str>, to: &str) -> Result<()> {
    let to: YearMonth = to.parse()?;
    let from: YearMonth = match from {
        Some(raw) => raw.parse()?,
        None => to.previous(),
    };
    let conn = open_db()?;
    let result = copy_budgets(&conn, &from, &to)?;
    println!("From {from}: {} copied, {} kept (already set in {to})", result.copied, result.skipped);
    Ok(())
}
