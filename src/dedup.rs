use std::collections::HashSet;

use log::debug;
use rusqlite::Connection;
use serde::Serialize;

use crate::error::Result;
use crate::parser::NormalizedRow;
use crate::period::YearMonth;

pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Exact-match identity of a transaction: same day, same amount, same
/// normalized description. Two equal purchases on one day are only told apart
/// by their description.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DedupKey {
    pub date: String,
    pub amount: i64,
    pub description: String,
}

impl DedupKey {
    pub fn of(row: &NormalizedRow) -> Self {
        Self {
            date: row.transaction_date.format(DATE_FORMAT).to_string(),
            amount: row.amount,
            description: row.description.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicateReason {
    /// Matches a row already committed for the same owner and month.
    AlreadyImported,
    /// Repeats an earlier row of the same file; the first occurrence is kept.
    WithinBatch,
}

#[derive(Debug, Clone, Serialize)]
pub struct Duplicate {
    pub row: NormalizedRow,
    pub reason: DuplicateReason,
}

#[derive(Debug, Clone, Default)]
pub struct Classification {
    pub new_rows: Vec<NormalizedRow>,
    pub duplicates: Vec<Duplicate>,
}

/// Split parsed rows into new rows and duplicates, keeping file order in both.
pub fn classify(rows: &[NormalizedRow], existing: &HashSet<DedupKey>) -> Classification {
    let mut seen: HashSet<DedupKey> = HashSet::new();
    let mut result = Classification::default();

    for row in rows {
        let key = DedupKey::of(row);
        let reason = if existing.contains(&key) {
            Some(DuplicateReason::AlreadyImported)
        } else if seen.contains(&key) {
            Some(DuplicateReason::WithinBatch)
        } else {
            None
        };
        match reason {
            Some(reason) => result.duplicates.push(Duplicate {
                row: row.clone(),
                reason,
            }),
            None => {
                seen.insert(key);
                result.new_rows.push(row.clone());
            }
        }
    }

    debug!(
        "Classified {} row(s): {} new, {} duplicate",
        rows.len(),
        result.new_rows.len(),
        result.duplicates.len()
    );
    result
}

/// Keys of every expense already imported for `owner_user_id` in `year_month`.
pub fn existing_keys(conn: &Connection, owner_user_id: i64, year_month: &YearMonth) -> Result<HashSet<DedupKey>> {
    let mut stmt = conn.prepare_cached(
        "SELECT e.date, e.amount, e.description FROM expenses e \
         JOIN csv_imports i ON e.csv_import_id = i.id \
         WHERE i.owner_user_id = ?1 AND i.year_month = ?2",
    )?;
    let keys = stmt
        .query_map(rusqlite::params![owner_user_id, year_month.to_string()], |row| {
            Ok(DedupKey {
                date: row.get(0)?,
                amount: row.get(1)?,
                description: row.get(2)?,
            })
        })?
        .collect::<std::result::Result<HashSet<_>, _>>()?;
    Ok(keys)
}
