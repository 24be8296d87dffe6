use colored::Colorize;
use comfy_table::{Cell, Table};

use crate::categories::{find_category, list_categories};
use crate::error::Result;
use crate::expenses::{add_manual, delete_expense, list_expenses, set_category, set_confirmed, ExpenseFilter, NewExpense};
use crate::fmt::yen;
use crate::period::YearMonth;
use crate::users::list_users;

use super::{open_db, resolve_identity, resolve_user_id};

pub struct AddArgs<'a> {
    pub date: &'a str,
    pub description: &'a str,
    pub amount: i64,
    pub category: Option<&'a str>,
    pub memo: Option<&'a str>,
    pub as_user: &'a str,
    pub owner: Option<&'a str>,
}

pub fn add(args: &AddArgs<'_>) -> Result<()> {
    let conn = open_db()?;
    let identity = resolve_identity(&conn, args.as_user)?;
    let owner_user_id = resolve_user_id(&conn, args.owner)?.unwrap_or(identity.user_id);
    let category_id = args.category.map(|c| find_category(&conn, c).map(|c| c.id)).transpose()?;
    let expense = add_manual(
        &conn,
        &NewExpense {
            owner_user_id,
            date: args.date,
            description: args.description,
            amount: args.amount,
            category_id,
            memo: args.memo,
        },
        &identity,
    )?;
    println!("Added expense {}: {} {}", expense.id, expense.description, yen(expense.amount));
    Ok(())
}

pub fn list(month: Option<&str>, owner: Option<&str>, category: Option<&str>, unconfirmed: bool) -> Result<()> {
    let conn = open_db()?;
    let filter = ExpenseFilter {
        year_month: month.map(str::parse::<YearMonth>).transpose()?,
        owner_user_id: resolve_user_id(&conn, owner)?,
        category_id: category.map(|c| find_category(&conn, c).map(|c| c.id)).transpose()?,
        unconfirmed_only: unconfirmed,
    };
    let expenses = list_expenses(&conn, &filter)?;
    if expenses.is_empty() {
        println!("No expenses found.");
        return Ok(());
    }

    let users = list_users(&conn)?;
    let categories = list_categories(&conn)?;

    let mut table = Table::new();
    table.set_header(vec!["ID", "Date", "Member", "Description", "Amount", "Category", "Status"]);
    let mut total = 0;
    for e in &expenses {
        total += e.amount;
        let member = users.iter().find(|u| u.id == e.user_id).map(|u| u.name.as_str()).unwrap_or("");
        let category = e
            .category_id
            .and_then(|id| categories.iter().find(|c| c.id == id))
            .map(|c| c.name.as_str())
            .unwrap_or("");
        let status = if e.confirmed {
            "confirmed".green()
        } else {
            "unconfirmed".yellow()
        };
        table.add_row(vec![
            Cell::new(e.id),
            Cell::new(&e.date),
            Cell::new(member),
            Cell::new(&e.description),
            Cell::new(yen(e.amount)),
            Cell::new(category),
            Cell::new(status),
        ]);
    }
    println!("Expenses\n{table}");
    println!("{} expense(s), total {}", expenses.len(), yen(total));
    Ok(())
}

pub fn delete(id: i64, as_user: &str) -> Result<()> {
    let conn = open_db()?;
    let identity = resolve_identity(&conn, as_user)?;
    delete_expense(&conn, id, &identity)?;
    println!("Deleted expense {id}");
    Ok(())
}

pub fn categorize(id: i64, category: Option<&str>, as_user: &str) -> Result<()> {
    let conn = open_db()?;
    let identity = resolve_identity(&conn, as_user)?;
    let found = category.map(|c| find_category(&conn, c)).transpose()?;
    set_category(&conn, id, found.as_ref().map(|c| c.id), &identity)?;
    match found {
        Some(c) => println!("Expense {id} -> {}", c.name),
        None => println!("Expense {id} is now uncategorized"),
    }
    Ok(())
}

pub fn confirm(ids: &[i64], confirmed: bool, as_user: &str) -> Result<()> {
    let conn = open_db()?;
    let identity = resolve_identity(&conn, as_user)?;
    let result = set_confirmed(&conn, ids, confirmed, &identity)?;
    let verb = if confirmed { "Confirmed" } else { "Unconfirmed" };
    println!(
        "{verb} {} expense(s) across {} import(s)",
        result.updated, result.imports_recalculated
    );
    Ok(())
}
