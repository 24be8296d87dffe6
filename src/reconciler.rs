use std::collections::BTreeSet;

use log::info;
use rusqlite::Connection;

use crate::error::{KakeiboError, Result};

/// Re-derive `unconfirmed_count` for one import from its child expenses.
///
/// This is the only writer of the column. The count is computed and stored in
/// a single statement, so concurrent recalculations of the same import are
/// serialized by SQLite's write lock and cannot lose an update.
pub fn recalc_unconfirmed_count(conn: &Connection, csv_import_id: i64) -> Result<i64> {
    let updated = conn.execute(
        "UPDATE csv_imports SET unconfirmed_count = \
         (SELECT count(*) FROM expenses WHERE csv_import_id = ?1 AND confirmed = 0) \
         WHERE id = ?1",
        [csv_import_id],
    )?;
    if updated == 0 {
        return Err(KakeiboError::NotFound(format!("import {csv_import_id}")));
    }
    let count: i64 = conn.query_row(
        "SELECT unconfirmed_count FROM csv_imports WHERE id = ?1",
        [csv_import_id],
        |row| row.get(0),
    )?;
    info!("Import {csv_import_id}: {count} unconfirmed expense(s)");
    Ok(count)
}

/// Recalculate each distinct import once, however many expenses touched it.
pub fn recalc_many<I>(conn: &Connection, import_ids: I) -> Result<usize>
where
    I: IntoIterator<Item = i64>,
{
    let distinct: BTreeSet<i64> = import_ids.into_iter().collect();
    for id in &distinct {
        recalc_unconfirmed_count(conn, *id)?;
    }
    Ok(distinct.len())
}
