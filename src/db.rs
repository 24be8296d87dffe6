use std::path::Path;
use std::time::Duration;

use rusqlite::{Connection, Transaction, TransactionBehavior};

use crate::error::Result;

pub const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS users (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL UNIQUE,
    role TEXT NOT NULL DEFAULT 'member',
    created_at TEXT DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS categories (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL UNIQUE,
    sort_order INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS budgets (
    id INTEGER PRIMARY KEY,
    category_id INTEGER NOT NULL,
    year_month TEXT NOT NULL,
    amount INTEGER NOT NULL,
    UNIQUE (category_id, year_month),
    FOREIGN KEY (category_id) REFERENCES categories(id)
);

CREATE TABLE IF NOT EXISTS csv_imports (
    id INTEGER PRIMARY KEY,
    owner_user_id INTEGER NOT NULL,
    imported_by_user_id INTEGER NOT NULL,
    card_type TEXT NOT NULL,
    card_name TEXT NOT NULL,
    year_month TEXT NOT NULL,
    imported_at TEXT DEFAULT (datetime('now')),
    record_count INTEGER NOT NULL DEFAULT 0,
    unconfirmed_count INTEGER NOT NULL DEFAULT 0,
    checksum TEXT,
    FOREIGN KEY (owner_user_id) REFERENCES users(id),
    FOREIGN KEY (imported_by_user_id) REFERENCES users(id)
);

CREATE INDEX IF NOT EXISTS idx_csv_imports_owner_month ON csv_imports (owner_user_id, year_month);

CREATE TABLE IF NOT EXISTS expenses (
    id INTEGER PRIMARY KEY,
    user_id INTEGER NOT NULL,
    category_id INTEGER,
    date TEXT NOT NULL,
    description TEXT NOT NULL,
    amount INTEGER NOT NULL,
    confirmed INTEGER NOT NULL DEFAULT 0,
    csv_import_id INTEGER,
    memo TEXT,
    created_at TEXT DEFAULT (datetime('now')),
    FOREIGN KEY (user_id) REFERENCES users(id),
    FOREIGN KEY (category_id) REFERENCES categories(id),
    FOREIGN KEY (csv_import_id) REFERENCES csv_imports(id)
);

CREATE INDEX IF NOT EXISTS idx_expenses_import ON expenses (csv_import_id, confirmed);
CREATE INDEX IF NOT EXISTS idx_expenses_user_date ON expenses (user_id, date);
";

const DEFAULT_CATEGORIES: &[&str] = &[
    "Groceries",
    "Dining Out",
    "Daily Goods",
    "Utilities",
    "Housing",
    "Transport",
    "Medical",
    "Education",
    "Clothing",
    "Entertainment",
    "Communication",
    "Other",
];

pub fn get_connection(db_path: &Path) -> Result<Connection> {
    let conn = Connection::open(db_path)?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
    conn.busy_timeout(Duration::from_secs(5))?;
    Ok(conn)
}

pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(SCHEMA)?;

    let count: i64 = conn.query_row("SELECT count(*) FROM categories", [], |row| row.get(0))?;
    if count == 0 {
        for (i, name) in DEFAULT_CATEGORIES.iter().enumerate() {
            conn.execute(
                "INSERT INTO categories (name, sort_order) VALUES (?1, ?2)",
                rusqlite::params![name, i as i64],
            )?;
        }
    }
    Ok(())
}

/// Start a write transaction that takes the database lock up front, so
/// reads made inside it cannot be invalidated by a concurrent writer.
pub fn immediate_tx(conn: &Connection) -> Result<Transaction<'_>> {
    Ok(Transaction::new_unchecked(conn, TransactionBehavior::Immediate)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_db() -> (tempfile::TempDir, Connection) {
        let dir = tempfile::tempdir().unwrap();
        let conn = get_connection(&dir.path().join("test.db")).unwrap();
        init_db(&conn).unwrap();
        (dir, conn)
    }

    #[test]
    fn test_init_db_creates_tables() {
        let (_dir, conn) = test_db();
        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%'")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<std::result::Result<Vec<_>, _>>()
            .unwrap();
        for expected in &["users", "categories", "budgets", "csv_imports", "expenses"] {
            assert!(tables.contains(&expected.to_string()), "missing table: {expected}");
        }
    }

    #[test]
    fn test_init_db_is_idempotent() {
        let (_dir, conn) = test_db();
        init_db(&conn).unwrap();
        let count: i64 = conn.query_row("SELECT count(*) FROM categories", [], |r| r.get(0)).unwrap();
        assert_eq!(count, DEFAULT_CATEGORIES.len() as i64);
    }

    #[test]
    fn test_seeded_categories_are_ordered() {
        let (_dir, conn) = test_db();
        let first: String = conn.query_row(
            "SELECT name FROM categories ORDER BY sort_order LIMIT 1", [], |r| r.get(0),
        ).unwrap();
        assert_eq!(first, "Groceries");
    }

    #[test]
    fn test_immediate_tx_rolls_back_on_drop() {
        let (_dir, conn) = test_db();
        {
            let tx = immediate_tx(&conn).unwrap();
            tx.execute("INSERT INTO users (name, role) VALUES ('temp', 'member')", []).unwrap();
        }
        let count: i64 = conn.query_row("SELECT count(*) FROM users", [], |r| r.get(0)).unwrap();
        assert_eq!(count, 0);
    }
}
