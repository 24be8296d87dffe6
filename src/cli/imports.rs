use colored::Colorize;
use comfy_table::{Cell, Table};

use crate::error::Result;
use crate::importer::{delete_import, list_imports};
use crate::reconciler::recalc_unconfirmed_count;
use crate::users::list_users;

use super::{open_db, resolve_identity, resolve_user_id};

pub fn list(owner: Option<&str>) -> Result<()> {
    let conn = open_db()?;
    let owner_user_id = resolve_user_id(&conn, owner)?;
    let imports = list_imports(&conn, owner_user_id)?;
    if imports.is_empty() {
        println!("No imports yet.");
        return Ok(());
    }
    let users = list_users(&conn)?;
    let name_of = |id: i64| {
        users
            .iter()
            .find(|u| u.id == id)
            .map(|u| u.name.clone())
            .unwrap_or_else(|| id.to_string())
    };

    let mut table = Table::new();
    table.set_header(vec!["ID", "Month", "Card", "Owner", "Imported By", "Rows", "Unconfirmed"]);
    for import in imports {
        let pending = if import.unconfirmed_count > 0 {
            import.unconfirmed_count.to_string().yellow().to_string()
        } else {
            import.unconfirmed_count.to_string().green().to_string()
        };
        table.add_row(vec![
            Cell::new(import.id),
            Cell::new(&import.year_month),
            Cell::new(&import.card_name),
            Cell::new(name_of(import.owner_user_id)),
            Cell::new(name_of(import.imported_by_user_id)),
            Cell::new(import.record_count),
            Cell::new(pending),
        ]);
    }
    println!("Imports\n{table}");
    Ok(())
}

pub fn delete(id: i64, as_user: &str) -> Result<()> {
    let conn = open_db()?;
    let identity = resolve_identity(&conn, as_user)?;
    let removed = delete_import(&conn, id, &identity)?;
    println!("Deleted import {id} and {removed} expense(s)");
    Ok(())
}

pub fn recalc(id: i64) -> Result<()> {
    let conn = open_db()?;
    let count = recalc_unconfirmed_count(&conn, id)?;
    println!("Import {id}: {count} unconfirmed");
    Ok(())
}
