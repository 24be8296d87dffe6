use rusqlite::{Connection, OptionalExtension};

use crate::error::{KakeiboError, Result};
use crate::models::{Role, User};

fn row_to_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<(i64, String, String)> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?))
}

fn into_user((id, name, role): (i64, String, String)) -> Result<User> {
    Ok(User {
        id,
        name,
        role: Role::parse(&role)?,
    })
}

pub fn add_user(conn: &Connection, name: &str, role: Role) -> Result<User> {
    let name = name.trim();
    if name.is_empty() {
        return Err(KakeiboError::Validation("Name is required".into()));
    }
    if find_user(conn, name)?.is_some() {
        return Err(KakeiboError::Conflict(format!("User already exists: {name}")));
    }
    conn.execute(
        "INSERT INTO users (name, role) VALUES (?1, ?2)",
        rusqlite::params![name, role.as_str()],
    )?;
    Ok(User {
        id: conn.last_insert_rowid(),
        name: name.to_string(),
        role,
    })
}

pub fn list_users(conn: &Connection) -> Result<Vec<User>> {
    let mut stmt = conn.prepare("SELECT id, name, role FROM users ORDER BY id")?;
    let raw = stmt
        .query_map([], row_to_user)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    raw.into_iter().map(into_user).collect()
}

pub fn find_user(conn: &Connection, name: &str) -> Result<Option<User>> {
    let raw = conn
        .query_row(
            "SELECT id, name, role FROM users WHERE name = ?1",
            [name.trim()],
            row_to_user,
        )
        .optional()?;
    raw.map(into_user).transpose()
}

pub fn get_user_by_name(conn: &Connection, name: &str) -> Result<User> {
    find_user(conn, name)?.ok_or_else(|| KakeiboError::NotFound(format!("user {name}")))
}

pub fn get_user(conn: &Connection, id: i64) -> Result<User> {
    let raw = conn
        .query_row("SELECT id, name, role FROM users WHERE id = ?1", [id], row_to_user)
        .optional()?
        .ok_or_else(|| KakeiboError::NotFound(format!("user {id}")))?;
    into_user(raw)
}
