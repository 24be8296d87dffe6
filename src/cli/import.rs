use std::path::PathBuf;

use colored::Colorize;
use comfy_table::{Cell, Table};
use rusqlite::Connection;

use crate::card_format::{CardType, Leading};
use crate::dedup::{DuplicateReason, DATE_FORMAT};
use crate::error::Result;
use crate::fmt::yen;
use crate::importer::{analyze, commit as commit_analysis, AnalyzeRequest, ImportAnalysis};
use crate::models::Identity;
use crate::settings::load_settings;

use super::{open_db, resolve_identity, resolve_user_id, ImportArgs};

fn run_analysis(args: &ImportArgs) -> Result<(Connection, Identity, ImportAnalysis)> {
    let bytes = std::fs::read(PathBuf::from(&args.file))?;
    let conn = open_db()?;
    let identity = resolve_identity(&conn, &args.as_user)?;
    let owner_user_id = resolve_user_id(&conn, args.owner.as_deref())?.unwrap_or(identity.user_id);
    let request = AnalyzeRequest {
        bytes: &bytes,
        card_type: &args.card,
        card_name: args.name.as_deref(),
        year_month: &args.month,
        owner_user_id,
    };
    let analysis = analyze(&conn, &request, &identity, load_settings().preview_limit)?;
    Ok((conn, identity, analysis))
}

pub fn preview(args: &ImportArgs, json: bool) -> Result<()> {
    let (_conn, _identity, analysis) = run_analysis(args)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&analysis)?);
    } else {
        println!("{}", format_preview(&analysis));
    }
    Ok(())
}

pub fn commit(args: &ImportArgs) -> Result<()> {
    let (conn, identity, analysis) = run_analysis(args)?;
    if analysis.file_already_imported {
        println!("{}", "This file has been imported before (same checksum).".yellow());
    }
    let import = commit_analysis(&conn, &analysis, &identity)?;
    let skipped = skipped_count(analysis.duplicate_count, analysis.new_rows.len(), import.record_count);
    println!(
        "Import #{}: {} imported, {} skipped (duplicates)",
        import.id, import.record_count, skipped
    );
    println!("{} awaiting confirmation", import.unconfirmed_count);
    Ok(())
}

pub fn formats() -> Result<()> {
    let mut table = Table::new();
    table.set_header(vec!["Key", "Card", "Encoding", "Header", "Date Format"]);
    for card in CardType::all() {
        let spec = card.spec();
        let header = match spec.leading {
            Leading::Header(_) => "yes".to_string(),
            Leading::Skip(n) => format!("skip {n}"),
        };
        table.add_row(vec![
            Cell::new(spec.key),
            Cell::new(spec.name),
            Cell::new(spec.encoding.encoding().name()),
            Cell::new(header),
            Cell::new(spec.date_format),
        ]);
    }
    println!("Card formats\n{table}");
    Ok(())
}

/// Duplicates found at preview time plus rows another commit recorded
/// between the preview and this one.
fn skipped_count(previewed_duplicates: usize, planned: usize, inserted: i64) -> usize {
    let inserted = usize::try_from(inserted).unwrap_or(0);
    previewed_duplicates + planned.saturating_sub(inserted)
}

// ---------------------------------------------------------------------------
// Pure formatting (analysis → String)
// ---------------------------------------------------------------------------

pub fn format_preview(analysis: &ImportAnalysis) -> String {
    let mut out = format!(
        "{} for {}: {} row(s), {} new, {} duplicate\n",
        analysis.card_name,
        analysis.year_month,
        analysis.total_rows,
        analysis.new_rows.len(),
        analysis.duplicate_count
    );
    if analysis.file_already_imported {
        out.push_str(&format!("{}\n", "This file has been imported before (same checksum).".yellow()));
    }

    if !analysis.preview_rows.is_empty() {
        let mut table = Table::new();
        table.set_header(vec!["Line", "Date", "Description", "Amount"]);
        for row in &analysis.preview_rows {
            table.add_row(vec![
                Cell::new(row.raw_row_index),
                Cell::new(row.transaction_date.format(DATE_FORMAT)),
                Cell::new(&row.description),
                Cell::new(yen(row.amount)),
            ]);
        }
        let more = analysis.new_rows.len() - analysis.preview_rows.len();
        out.push_str(&format!("\nNew\n{table}"));
        if more > 0 {
            out.push_str(&format!("\n... and {more} more"));
        }
    }

    if !analysis.duplicates.is_empty() {
        let mut table = Table::new();
        table.set_header(vec!["Line", "Date", "Description", "Amount", "Reason"]);
        for dup in &analysis.duplicates {
            let reason = match dup.reason {
                DuplicateReason::AlreadyImported => "already imported",
                DuplicateReason::WithinBatch => "repeated in file",
            };
            table.add_row(vec![
                Cell::new(dup.row.raw_row_index),
                Cell::new(dup.row.transaction_date.format(DATE_FORMAT)),
                Cell::new(&dup.row.description),
                Cell::new(yen(dup.row.amount)),
                Cell::new(reason.dimmed()),
            ]);
        }
        out.push_str(&format!("\n\nDuplicates\n{table}"));
    }
    out
}
