use rusqlite::Connection;
use serde::Serialize;

use crate::error::Result;
use crate::period::YearMonth;

const TOP_DESCRIPTIONS: i64 = 5;

#[derive(Debug, Clone, Serialize)]
pub struct CategoryLine {
    /// `None` for the uncategorized bucket.
    pub category_id: Option<i64>,
    pub name: String,
    pub spent: i64,
    pub budget: Option<i64>,
    pub remaining: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DescriptionTotal {
    pub description: String,
    pub total: i64,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct MonthlySummary {
    pub year_month: YearMonth,
    pub owner_user_id: Option<i64>,
    pub total_spent: i64,
    pub total_budget: i64,
    pub expense_count: i64,
    pub unconfirmed_count: i64,
    pub categories: Vec<CategoryLine>,
    pub top_descriptions: Vec<DescriptionTotal>,
}

/// Spending for one month, optionally narrowed to one member. Budgets are
/// household-wide, so they are the same whichever member is selected.
pub fn monthly_summary(conn: &Connection, year_month: &YearMonth, owner_user_id: Option<i64>) -> Result<MonthlySummary> {
    let (start, end) = year_month.date_bounds();
    let ym = year_month.to_string();

    let (total_spent, expense_count, unconfirmed_count): (i64, i64, i64) = conn.query_row(
        "SELECT COALESCE(SUM(amount), 0), COUNT(*), COALESCE(SUM(confirmed = 0), 0) \
         FROM expenses WHERE date >= ?1 AND date < ?2 AND (?3 IS NULL OR user_id = ?3)",
        rusqlite::params![start, end, owner_user_id],
        |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
    )?;

    let mut stmt = conn.prepare(
        "SELECT c.id, c.name, COALESCE(s.spent, 0), b.amount \
         FROM categories c \
         LEFT JOIN (SELECT category_id, SUM(amount) AS spent FROM expenses \
                    WHERE date >= ?1 AND date < ?2 AND (?3 IS NULL OR user_id = ?3) \
                    GROUP BY category_id) s ON s.category_id = c.id \
         LEFT JOIN budgets b ON b.category_id = c.id AND b.year_month = ?4 \
         WHERE s.spent IS NOT NULL OR b.amount IS NOT NULL \
         ORDER BY c.sort_order, c.id",
    )?;
    let mut categories: Vec<CategoryLine> = stmt
        .query_map(rusqlite::params![start, end, owner_user_id, ym], |row| {
            let spent: i64 = row.get(2)?;
            let budget: Option<i64> = row.get(3)?;
            Ok(CategoryLine {
                category_id: Some(row.get(0)?),
                name: row.get(1)?,
                spent,
                budget,
                remaining: budget.map(|b| b - spent),
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let (uncategorized, uncategorized_count): (i64, i64) = conn.query_row(
        "SELECT COALESCE(SUM(amount), 0), COUNT(*) FROM expenses \
         WHERE category_id IS NULL AND date >= ?1 AND date < ?2 AND (?3 IS NULL OR user_id = ?3)",
        rusqlite::params![start, end, owner_user_id],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )?;
    if uncategorized_count > 0 {
        categories.push(CategoryLine {
            category_id: None,
            name: "Uncategorized".into(),
            spent: uncategorized,
            budget: None,
            remaining: None,
        });
    }

    let total_budget: i64 = conn.query_row(
        "SELECT COALESCE(SUM(amount), 0) FROM budgets WHERE year_month = ?1",
        [&ym],
        |row| row.get(0),
    )?;

    let mut top = conn.prepare(
        "SELECT description, SUM(amount) AS total, COUNT(*) FROM expenses \
         WHERE date >= ?1 AND date < ?2 AND (?3 IS NULL OR user_id = ?3) \
         GROUP BY description ORDER BY total DESC, description LIMIT ?4",
    )?;
    let top_descriptions = top
        .query_map(rusqlite::params![start, end, owner_user_id, TOP_DESCRIPTIONS], |row| {
            Ok(DescriptionTotal {
                description: row.get(0)?,
                total: row.get(1)?,
                count: row.get(2)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(MonthlySummary {
        year_month: *year_month,
        owner_user_id,
        total_spent,
        total_budget,
        expense_count,
        unconfirmed_count,
        categories,
        top_descriptions,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{get_connection, init_db};

    fn test_db() -> (tempfile::TempDir, Connection) {
        let dir = tempfile::tempdir().unwrap();
        let conn = get_connection(&dir.path().join("test.db")).unwrap();
        init_db(&conn).unwrap();
        conn.execute_batch("INSERT INTO users (id, name) VALUES (1, 'hana'), (2, 'ken');").unwrap();
        (dir, conn)
    }

    fn category_id(conn: &Connection, name: &str) -> i64 {
        conn.query_row("SELECT id FROM categories WHERE name = ?1", [name], |r| r.get(0)).unwrap()
    }

    fn expense(conn: &Connection, user: i64, cat: Option<i64>, date: &str, desc: &str, amount: i64, confirmed: bool) {
        conn.execute(
            "INSERT INTO expenses (user_id, category_id, date, description, amount, confirmed) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            rusqlite::params![user, cat, date, desc, amount, confirmed as i32],
        ).unwrap();
    }

    fn seed(conn: &Connection) -> (i64, i64) {
        let groceries = category_id(conn, "Groceries");
        let dining = category_id(conn, "Dining Out");
        conn.execute(
            "INSERT INTO budgets (category_id, year_month, amount) VALUES (?1, '2025-01', 40000), (?2, '2025-01', 10000)",
            [groceries, dining],
        ).unwrap();
        expense(conn, 1, Some(groceries), "2025-01-05", "AEON", 12000, true);
        expense(conn, 2, Some(groceries), "2025-01-20", "AEON", 8000, false);
        expense(conn, 1, None, "2025-01-31", "LAWSON", 540, false);
        expense(conn, 1, Some(groceries), "2025-02-01", "AEON", 9999, true);
        expense(conn, 2, Some(groceries), "2024-12-31", "AEON", 9999, true);
        (groceries, dining)
    }

    #[test]
    fn test_household_summary() {
        let (_dir, conn) = test_db();
        let (groceries, dining) = seed(&conn);
        let summary = monthly_summary(&conn, &"2025-01".parse().unwrap(), None).unwrap();

        assert_eq!(summary.total_spent, 20540);
        assert_eq!(summary.total_budget, 50000);
        assert_eq!(summary.expense_count, 3);
        assert_eq!(summary.unconfirmed_count, 2);

        let line = |id: Option<i64>| summary.categories.iter().find(|c| c.category_id == id).unwrap();
        assert_eq!(line(Some(groceries)).spent, 20000);
        assert_eq!(line(Some(groceries)).remaining, Some(20000));
        assert_eq!(line(Some(dining)).spent, 0);
        assert_eq!(line(Some(dining)).remaining, Some(10000));
        assert_eq!(line(None).spent, 540);
        assert_eq!(line(None).budget, None);
        assert_eq!(summary.categories.len(), 3);
    }

    #[test]
    fn test_owner_filter() {
        let (_dir, conn) = test_db();
        let (groceries, _) = seed(&conn);
        let summary = monthly_summary(&conn, &"2025-01".parse().unwrap(), Some(2)).unwrap();
        assert_eq!(summary.total_spent, 8000);
        assert_eq!(summary.expense_count, 1);
        let line = summary.categories.iter().find(|c| c.category_id == Some(groceries)).unwrap();
        assert_eq!(line.remaining, Some(32000));
        assert!(summary.categories.iter().all(|c| c.category_id.is_some()));
    }

    #[test]
    fn test_top_descriptions() {
        let (_dir, conn) = test_db();
        seed(&conn);
        let summary = monthly_summary(&conn, &"2025-01".parse().unwrap(), None).unwrap();
        assert_eq!(summary.top_descriptions[0].description, "AEON");
        assert_eq!(summary.top_descriptions[0].total, 20000);
        assert_eq!(summary.top_descriptions[0].count, 2);
    }

    #[test]
    fn test_empty_month() {
        let (_dir, conn) = test_db();
        let summary = monthly_summary(&conn, &"2030-06".parse().unwrap(), None).unwrap();
        assert_eq!(summary.total_spent, 0);
        assert_eq!(summary.expense_count, 0);
        assert!(summary.categories.is_empty());
        assert!(summary.top_descriptions.is_empty());
    }
}
