use std::collections::BTreeSet;

use chrono::NaiveDate;
use log::info;
use rusqlite::{Connection, OptionalExtension};

use crate::db::immediate_tx;
use crate::dedup::DATE_FORMAT;
use crate::error::{KakeiboError, Result};
use crate::models::{Expense, Identity};
use crate::parser::normalize_description;
use crate::period::YearMonth;
use crate::reconciler::{recalc_many, recalc_unconfirmed_count};

const EXPENSE_COLUMNS: &str =
    "id, user_id, category_id, date, description, amount, confirmed, csv_import_id, memo";

fn row_to_expense(row: &rusqlite::Row<'_>) -> rusqlite::Result<Expense> {
    Ok(Expense {
        id: row.get(0)?,
        user_id: row.get(1)?,
        category_id: row.get(2)?,
        date: row.get(3)?,
        description: row.get(4)?,
        amount: row.get(5)?,
        confirmed: row.get::<_, i64>(6)? != 0,
        csv_import_id: row.get(7)?,
        memo: row.get(8)?,
    })
}

pub fn get_expense(conn: &Connection, id: i64) -> Result<Option<Expense>> {
    Ok(conn
        .query_row(
            &format!("SELECT {EXPENSE_COLUMNS} FROM expenses WHERE id = ?1"),
            [id],
            row_to_expense,
        )
        .optional()?)
}

/// An expense the caller may act on. Someone else's expense is reported as
/// missing, exactly like one that does not exist.
fn visible_expense(conn: &Connection, id: i64, identity: &Identity) -> Result<Expense> {
    match get_expense(conn, id)? {
        Some(expense) if identity.can_act_for(expense.user_id) => Ok(expense),
        _ => Err(KakeiboError::NotFound(format!("expense {id}"))),
    }
}

fn ensure_category(conn: &Connection, category_id: i64) -> Result<()> {
    let mut stmt = conn.prepare_cached("SELECT 1 FROM categories WHERE id = ?1")?;
    if stmt.exists([category_id])? {
        Ok(())
    } else {
        Err(KakeiboError::NotFound(format!("category {category_id}")))
    }
}

// ---------------------------------------------------------------------------
// Manual entry
// ---------------------------------------------------------------------------

pub struct NewExpense<'a> {
    pub owner_user_id: i64,
    pub date: &'a str,
    pub description: &'a str,
    pub amount: i64,
    pub category_id: Option<i64>,
    pub memo: Option<&'a str>,
}

/// Record an expense by hand. Manual entries need no review, so they are
/// stored confirmed and belong to no import.
pub fn add_manual(conn: &Connection, new: &NewExpense<'_>, identity: &Identity) -> Result<Expense> {
    if !identity.can_act_for(new.owner_user_id) {
        return Err(KakeiboError::Forbidden(
            "only the owner or an admin may record expenses for this user".into(),
        ));
    }
    let date = NaiveDate::parse_from_str(new.date.trim(), DATE_FORMAT)
        .map_err(|_| KakeiboError::Validation(format!("Invalid date '{}' (expected YYYY-MM-DD)", new.date)))?;
    let description = normalize_description(new.description);
    if description.is_empty() {
        return Err(KakeiboError::Validation("Description is required".into()));
    }
    if new.amount == 0 {
        return Err(KakeiboError::Validation("Amount must not be zero".into()));
    }
    if let Some(category_id) = new.category_id {
        ensure_category(conn, category_id)?;
    }

    conn.execute(
        "INSERT INTO expenses (user_id, category_id, date, description, amount, confirmed, memo) \
         VALUES (?1, ?2, ?3, ?4, ?5, 1, ?6)",
        rusqlite::params![
            new.owner_user_id,
            new.category_id,
            date.format(DATE_FORMAT).to_string(),
            description,
            new.amount,
            new.memo,
        ],
    )?;
    let id = conn.last_insert_rowid();
    get_expense(conn, id)?.ok_or_else(|| KakeiboError::NotFound(format!("expense {id}")))
}

// ---------------------------------------------------------------------------
// Listing
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct ExpenseFilter {
    pub year_month: Option<YearMonth>,
    pub owner_user_id: Option<i64>,
    pub category_id: Option<i64>,
    pub unconfirmed_only: bool,
}

pub fn list_expenses(conn: &Connection, filter: &ExpenseFilter) -> Result<Vec<Expense>> {
    let (start, end) = match &filter.year_month {
        Some(ym) => {
            let (s, e) = ym.date_bounds();
            (Some(s), Some(e))
        }
        None => (None, None),
    };
    let mut stmt = conn.prepare(&format!(
        "SELECT {EXPENSE_COLUMNS} FROM expenses \
         WHERE (?1 IS NULL OR date >= ?1) AND (?2 IS NULL OR date < ?2) \
         AND (?3 IS NULL OR user_id = ?3) \
         AND (?4 IS NULL OR category_id = ?4) \
         AND (?5 = 0 OR confirmed = 0) \
         ORDER BY date, id"
    ))?;
    let expenses = stmt
        .query_map(
            rusqlite::params![start, end, filter.owner_user_id, filter.category_id, filter.unconfirmed_only as i32],
            row_to_expense,
        )?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(expenses)
}

// ---------------------------------------------------------------------------
// Mutations
// ---------------------------------------------------------------------------

pub fn delete_expense(conn: &Connection, id: i64, identity: &Identity) -> Result<()> {
    let tx = immediate_tx(conn)?;
    let expense = visible_expense(&tx, id, identity)?;
    tx.execute("DELETE FROM expenses WHERE id = ?1", [id])?;
    if let Some(import_id) = expense.csv_import_id {
        recalc_unconfirmed_count(&tx, import_id)?;
    }
    tx.commit()?;
    Ok(())
}

pub fn set_category(conn: &Connection, id: i64, category_id: Option<i64>, identity: &Identity) -> Result<()> {
    let tx = immediate_tx(conn)?;
    visible_expense(&tx, id, identity)?;
    if let Some(category_id) = category_id {
        ensure_category(&tx, category_id)?;
    }
    tx.execute(
        "UPDATE expenses SET category_id = ?1 WHERE id = ?2",
        rusqlite::params![category_id, id],
    )?;
    tx.commit()?;
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfirmResult {
    pub updated: usize,
    pub imports_recalculated: usize,
}

/// Mark a batch of expenses confirmed (or back to unconfirmed). The batch is
/// all-or-nothing: one missing or foreign id fails every row. Each affected
/// import is recalculated once.
pub fn set_confirmed(conn: &Connection, ids: &[i64], confirmed: bool, identity: &Identity) -> Result<ConfirmResult> {
    let distinct: BTreeSet<i64> = ids.iter().copied().collect();
    if distinct.is_empty() {
        return Err(KakeiboError::Validation("No expenses given".into()));
    }

    let tx = immediate_tx(conn)?;
    let mut touched_imports = Vec::new();
    {
        let mut stmt = tx.prepare_cached("UPDATE expenses SET confirmed = ?1 WHERE id = ?2")?;
        for id in &distinct {
            let expense = visible_expense(&tx, *id, identity)?;
            stmt.execute(rusqlite::params![confirmed as i32, id])?;
            if let Some(import_id) = expense.csv_import_id {
                touched_imports.push(import_id);
            }
        }
    }
    let imports_recalculated = recalc_many(&tx, touched_imports)?;
    tx.commit()?;

    info!(
        "Set confirmed={confirmed} on {} expense(s), recalculated {imports_recalculated} import(s)",
        distinct.len()
    );
    Ok(ConfirmResult {
        updated: distinct.len(),
        imports_recalculated,
    })
}
