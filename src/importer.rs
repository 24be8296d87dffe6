use log::info;
use rusqlite::{Connection, OptionalExtension};
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::card_format::CardType;
use crate::db::immediate_tx;
use crate::dedup::{classify, existing_keys, Duplicate, DATE_FORMAT};
use crate::error::{KakeiboError, Result};
use crate::models::{CsvImport, Identity};
use crate::parser::{parse, NormalizedRow};
use crate::period::YearMonth;
use crate::reconciler::recalc_unconfirmed_count;
use crate::users::get_user;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

pub fn compute_checksum(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

fn file_already_imported(conn: &Connection, owner_user_id: i64, checksum: &str) -> Result<bool> {
    let mut stmt = conn.prepare("SELECT 1 FROM csv_imports WHERE checksum = ?1 AND owner_user_id = ?2")?;
    Ok(stmt.exists(rusqlite::params![checksum, owner_user_id])?)
}

fn authorize(importer: &Identity, owner_user_id: i64) -> Result<()> {
    if importer.can_act_for(owner_user_id) {
        Ok(())
    } else {
        Err(KakeiboError::Forbidden(
            "only the owner or an admin may import statements for this user".into(),
        ))
    }
}

// ---------------------------------------------------------------------------
// analyze
// ---------------------------------------------------------------------------

pub struct AnalyzeRequest<'a> {
    pub bytes: &'a [u8],
    pub card_type: &'a str,
    /// Display name for the card; defaults to the format's name.
    pub card_name: Option<&'a str>,
    pub year_month: &'a str,
    pub owner_user_id: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ImportAnalysis {
    pub card_type: CardType,
    pub card_name: String,
    pub owner_user_id: i64,
    pub imported_by_user_id: i64,
    pub year_month: YearMonth,
    pub total_rows: usize,
    pub new_rows: Vec<NormalizedRow>,
    pub duplicate_count: usize,
    pub duplicates: Vec<Duplicate>,
    pub preview_rows: Vec<NormalizedRow>,
    pub checksum: String,
    pub file_already_imported: bool,
}

/// Parse a statement and classify its rows against what the owner already
/// imported for the month. Reads the store but never writes to it.
pub fn analyze(
    conn: &Connection,
    request: &AnalyzeRequest<'_>,
    importer: &Identity,
    preview_limit: usize,
) -> Result<ImportAnalysis> {
    authorize(importer, request.owner_user_id)?;
    let year_month: YearMonth = request.year_month.parse()?;
    let card_type = CardType::from_key(request.card_type)?;
    get_user(conn, request.owner_user_id)?;

    let rows = parse(request.bytes, card_type)?;
    let existing = existing_keys(conn, request.owner_user_id, &year_month)?;
    let classification = classify(&rows, &existing);

    let checksum = compute_checksum(request.bytes);
    let already = file_already_imported(conn, request.owner_user_id, &checksum)?;
    let card_name = request
        .card_name
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .unwrap_or(card_type.name())
        .to_string();

    Ok(ImportAnalysis {
        card_type,
        card_name,
        owner_user_id: request.owner_user_id,
        imported_by_user_id: importer.user_id,
        year_month,
        total_rows: rows.len(),
        preview_rows: classification.new_rows.iter().take(preview_limit).cloned().collect(),
        new_rows: classification.new_rows,
        duplicate_count: classification.duplicates.len(),
        duplicates: classification.duplicates,
        checksum,
        file_already_imported: already,
    })
}

// ---------------------------------------------------------------------------
// commit
// ---------------------------------------------------------------------------

/// Persist an analysis as one import and its unconfirmed expenses, all in one
/// transaction. Rows committed elsewhere since the preview are dropped.
pub fn commit(conn: &Connection, analysis: &ImportAnalysis, importer: &Identity) -> Result<CsvImport> {
    authorize(importer, analysis.owner_user_id)?;

    let tx = immediate_tx(conn)?;
    let existing = existing_keys(&tx, analysis.owner_user_id, &analysis.year_month)?;
    let fresh = classify(&analysis.new_rows, &existing);
    if !fresh.duplicates.is_empty() {
        info!(
            "{} row(s) were imported by another request since the preview and will be skipped",
            fresh.duplicates.len()
        );
    }
    if fresh.new_rows.is_empty() {
        return Err(KakeiboError::Conflict(
            "nothing to import: every row is already recorded".into(),
        ));
    }

    tx.execute(
        "INSERT INTO csv_imports (owner_user_id, imported_by_user_id, card_type, card_name, year_month, record_count, checksum) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        rusqlite::params![
            analysis.owner_user_id,
            importer.user_id,
            analysis.card_type.key(),
            analysis.card_name,
            analysis.year_month.to_string(),
            fresh.new_rows.len() as i64,
            analysis.checksum,
        ],
    )?;
    let import_id = tx.last_insert_rowid();

    {
        let mut stmt = tx.prepare_cached(
            "INSERT INTO expenses (user_id, date, description, amount, confirmed, csv_import_id) \
             VALUES (?1, ?2, ?3, ?4, 0, ?5)",
        )?;
        for row in &fresh.new_rows {
            stmt.execute(rusqlite::params![
                analysis.owner_user_id,
                row.transaction_date.format(DATE_FORMAT).to_string(),
                row.description,
                row.amount,
                import_id,
            ])?;
        }
    }

    recalc_unconfirmed_count(&tx, import_id)?;
    let record = get_import(&tx, import_id)?;
    tx.commit()?;

    info!(
        "Committed import {} for user {}: {} expense(s) from {}",
        record.id, record.owner_user_id, record.record_count, record.card_name
    );
    Ok(record)
}

// ---------------------------------------------------------------------------
// Import records
// ---------------------------------------------------------------------------

const IMPORT_COLUMNS: &str = "id, owner_user_id, imported_by_user_id, card_type, card_name, year_month, \
     imported_at, record_count, unconfirmed_count, checksum";

fn row_to_import(row: &rusqlite::Row<'_>) -> rusqlite::Result<CsvImport> {
    Ok(CsvImport {
        id: row.get(0)?,
        owner_user_id: row.get(1)?,
        imported_by_user_id: row.get(2)?,
        card_type: row.get(3)?,
        card_name: row.get(4)?,
        year_month: row.get(5)?,
        imported_at: row.get(6)?,
        record_count: row.get(7)?,
        unconfirmed_count: row.get(8)?,
        checksum: row.get(9)?,
    })
}

pub fn get_import(conn: &Connection, id: i64) -> Result<CsvImport> {
    conn.query_row(
        &format!("SELECT {IMPORT_COLUMNS} FROM csv_imports WHERE id = ?1"),
        [id],
        row_to_import,
    )
    .optional()?
    .ok_or_else(|| KakeiboError::NotFound(format!("import {id}")))
}

pub fn list_imports(conn: &Connection, owner_user_id: Option<i64>) -> Result<Vec<CsvImport>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {IMPORT_COLUMNS} FROM csv_imports \
         WHERE ?1 IS NULL OR owner_user_id = ?1 \
         ORDER BY year_month DESC, id DESC"
    ))?;
    let imports = stmt
        .query_map([owner_user_id], row_to_import)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(imports)
}

/// Remove an import together with its expenses. Imports the caller may not
/// act on are reported as missing.
pub fn delete_import(conn: &Connection, id: i64, identity: &Identity) -> Result<usize> {
    let tx = immediate_tx(conn)?;
    let import = get_import(&tx, id)?;
    if !identity.can_act_for(import.owner_user_id) {
        return Err(KakeiboError::NotFound(format!("import {id}")));
    }
    let removed = tx.execute("DELETE FROM expenses WHERE csv_import_id = ?1", [id])?;
    tx.execute("DELETE FROM csv_imports WHERE id = ?1", [id])?;
    tx.commit()?;
    info!("Deleted import {id} and {removed} expense(s)");
    Ok(removed)
}
