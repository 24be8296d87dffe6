use log::info;
use rusqlite::Connection;
use serde::Serialize;

use crate::db::immediate_tx;
use crate::error::{KakeiboError, Result};
use crate::models::Budget;
use crate::period::YearMonth;

/// A budget row joined with its category name, for display.
#[derive(Debug, Clone, Serialize)]
pub struct BudgetLine {
    pub budget: Budget,
    pub category_name: String,
}

fn ensure_category(conn: &Connection, category_id: i64) -> Result<()> {
    let mut stmt = conn.prepare_cached("SELECT 1 FROM categories WHERE id = ?1")?;
    if stmt.exists([category_id])? {
        Ok(())
    } else {
        Err(KakeiboError::NotFound(format!("category {category_id}")))
    }
}

/// Create or replace the budget for one category and month.
pub fn set_budget(conn: &Connection, category_id: i64, year_month: &YearMonth, amount: i64) -> Result<Budget> {
    if amount < 0 {
        return Err(KakeiboError::Validation("Budget amount must not be negative".into()));
    }
    ensure_category(conn, category_id)?;
    let ym = year_month.to_string();
    conn.execute(
        "INSERT INTO budgets (category_id, year_month, amount) VALUES (?1, ?2, ?3) \
         ON CONFLICT (category_id, year_month) DO UPDATE SET amount = excluded.amount",
        rusqlite::params![category_id, ym, amount],
    )?;
    let id: i64 = conn.query_row(
        "SELECT id FROM budgets WHERE category_id = ?1 AND year_month = ?2",
        rusqlite::params![category_id, ym],
        |row| row.get(0),
    )?;
    Ok(Budget {
        id,
        category_id,
        year_month: ym,
        amount,
    })
}

pub fn list_budgets(conn: &Connection, year_month: &YearMonth) -> Result<Vec<BudgetLine>> {
    let mut stmt = conn.prepare(
        "SELECT b.id, b.category_id, b.year_month, b.amount, c.name \
         FROM budgets b JOIN categories c ON b.category_id = c.id \
         WHERE b.year_month = ?1 ORDER BY c.sort_order, c.id",
    )?;
    let lines = stmt
        .query_map([year_month.to_string()], |row| {
            Ok(BudgetLine {
                budget: Budget {
                    id: row.get(0)?,
                    category_id: row.get(1)?,
                    year_month: row.get(2)?,
                    amount: row.get(3)?,
                },
                category_name: row.get(4)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(lines)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CopyResult {
    pub copied: usize,
    pub skipped: usize,
}

/// Carry one month's budgets into another. Budgets already set in the target
/// month are left alone and counted as skipped.
pub fn copy_budgets(conn: &Connection, from: &YearMonth, to: &YearMonth) -> Result<CopyResult> {
    if from == to {
        return Err(KakeiboError::Validation("Source and target month are the same".into()));
    }
    let tx = immediate_tx(conn)?;
    let source: Vec<(i64, i64)> = {
        let mut stmt = tx.prepare("SELECT category_id, amount FROM budgets WHERE year_month = ?1 ORDER BY category_id")?;
        let rows = stmt
            .query_map([from.to_string()], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        rows
    };
    if source.is_empty() {
        return Err(KakeiboError::NotFound(format!("budgets for {from}")));
    }

    let mut result = CopyResult { copied: 0, skipped: 0 };
    {
        let mut stmt = tx.prepare_cached(
            "INSERT INTO budgets (category_id, year_month, amount) VALUES (?1, ?2, ?3) \
             ON CONFLICT (category_id, year_month) DO NOTHING",
        )?;
        for (category_id, amount) in &source {
            match stmt.execute(rusqlite::params![category_id, to.to_string(), amount])? {
                0 => result.skipped += 1,
                _ => result.copied += 1,
            }
        }
    }
    tx.commit()?;
    info!("Copied budgets {from} -> {to}: {} copied, {} skipped", result.copied, result.skipped);
    Ok(result)
}
