use comfy_table::{Cell, Table};

use crate::error::Result;
use crate::models::Role;
use crate::users::{add_user, list_users};

use super::open_db;

pub fn add(name: &str, role: &str) -> Result<()> {
    let role = Role::parse(role)?;
    let conn = open_db()?;
    let user = add_user(&conn, name, role)?;
    println!("Added {} {}: {}", role.as_str(), user.id, user.name);
    Ok(())
}

pub fn list() -> Result<()> {
    let conn = open_db()?;
    let mut table = Table::new();
    table.set_header(vec!["ID", "Name", "Role"]);
    for user in list_users(&conn)? {
        table.add_row(vec![
            Cell::new(user.id),
            Cell::new(user.name),
            Cell::new(user.role.as_str()),
        ]);
    }
    println!("Members\n{table}");
    Ok(())
}
