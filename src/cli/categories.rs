use comfy_table::{Cell, Table};

use crate::categories::{add_category, delete_category, list_categories, rename_category, reorder_categories};
use crate::error::Result;

use super::open_db;

pub fn add(name: &str) -> Result<()> {
    let conn = open_db()?;
    let category = add_category(&conn, name)?;
    println!("Added category {}: {}", category.id, category.name);
    Ok(())
}

pub fn list() -> Result<()> {
    let conn = open_db()?;
    let mut table = Table::new();
    table.set_header(vec!["ID", "Name", "Order"]);
    for cat in list_categories(&conn)? {
        table.add_row(vec![Cell::new(cat.id), Cell::new(cat.name), Cell::new(cat.sort_order)]);
    }
    println!("Categories\n{table}");
    Ok(())
}

pub fn rename(id: i64, new_name: &str) -> Result<()> {
    let conn = open_db()?;
    rename_category(&conn, id, new_name)?;
    println!("Renamed category {id} to: {}", new_name.trim());
    Ok(())
}

pub fn reorder(ids: &[i64]) -> Result<()> {
    let conn = open_db()?;
    reorder_categories(&conn, ids)?;
    println!("Reordered {} categories", ids.len());
    Ok(())
}

pub fn delete(id: i64) -> Result<()> {
    let conn = open_db()?;
    delete_category(&conn, id)?;
    println!("Deleted category {id}");
    Ok(())
}
