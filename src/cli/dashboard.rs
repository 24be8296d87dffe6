use colored::Colorize;
use comfy_table::{Cell, Table};

use crate::dashboard::{monthly_summary, MonthlySummary};
use crate::error::Result;
use crate::fmt::{yen, yen_opt};

use super::{month_or_current, open_db, resolve_user_id};

pub fn run(month: Option<&str>, owner: Option<&str>, json: bool) -> Result<()> {
    let year_month = month_or_current(month)?;
    let conn = open_db()?;
    let owner_user_id = resolve_user_id(&conn, owner)?;
    let summary = monthly_summary(&conn, &year_month, owner_user_id)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!("{}", format_summary(&summary));
    }
    Ok(())
}

pub fn format_summary(summary: &MonthlySummary) -> String {
    let mut out = format!(
        "{}: spent {} of {} budgeted ({} expense(s), {} unconfirmed)\n",
        summary.year_month,
        yen(summary.total_spent),
        yen(summary.total_budget),
        summary.expense_count,
        summary.unconfirmed_count
    );

    if summary.categories.is_empty() {
        out.push_str("\nNothing recorded for this month.");
        return out;
    }

    let mut table = Table::new();
    table.set_header(vec!["Category", "Spent", "Budget", "Remaining"]);
    for line in &summary.categories {
        let remaining = match line.remaining {
            Some(r) if r < 0 => yen(r).red().to_string(),
            Some(r) => yen(r).green().to_string(),
            None => String::new(),
        };
        table.add_row(vec![
            Cell::new(&line.name),
            Cell::new(yen(line.spent)),
            Cell::new(yen_opt(line.budget)),
            Cell::new(remaining),
        ]);
    }
    table.add_row(vec![
        Cell::new("Total".bold()),
        Cell::new(yen(summary.total_spent)),
        Cell::new(yen(summary.total_budget)),
        Cell::new(""),
    ]);
    out.push_str(&format!("\nBy category\n{table}"));

    if !summary.top_descriptions.is_empty() {
        let mut top = Table::new();
        top.set_header(vec!["Description", "Amount", "Count"]);
        for d in &summary.top_descriptions {
            top.add_row(vec![Cell::new(&d.description), Cell::new(yen(d.total)), Cell::new(d.count)]);
        }
        out.push_str(&format!("\n\nTop spending\n{top}"));
    }
    out
}
