use std::collections::HashSet;

use log::info;
use rusqlite::{Connection, OptionalExtension};

use crate::db::immediate_tx;
use crate::error::{KakeiboError, Result};
use crate::models::Category;

fn row_to_category(row: &rusqlite::Row<'_>) -> rusqlite::Result<Category> {
    Ok(Category {
        id: row.get(0)?,
        name: row.get(1)?,
        sort_order: row.get(2)?,
    })
}

fn clean_name(name: &str) -> Result<&str> {
    let name = name.trim();
    if name.is_empty() {
        Err(KakeiboError::Validation("Category name is required".into()))
    } else {
        Ok(name)
    }
}

fn name_taken(conn: &Connection, name: &str, except_id: Option<i64>) -> Result<bool> {
    let existing: Option<i64> = conn
        .query_row("SELECT id FROM categories WHERE name = ?1", [name], |row| row.get(0))
        .optional()?;
    Ok(matches!(existing, Some(id) if Some(id) != except_id))
}

/// New categories go to the end of the list.
pub fn add_category(conn: &Connection, name: &str) -> Result<Category> {
    let name = clean_name(name)?;
    if name_taken(conn, name, None)? {
        return Err(KakeiboError::Conflict(format!("Category already exists: {name}")));
    }
    let next: i64 = conn.query_row(
        "SELECT COALESCE(MAX(sort_order) + 1, 0) FROM categories",
        [],
        |row| row.get(0),
    )?;
    conn.execute(
        "INSERT INTO categories (name, sort_order) VALUES (?1, ?2)",
        rusqlite::params![name, next],
    )?;
    Ok(Category {
        id: conn.last_insert_rowid(),
        name: name.to_string(),
        sort_order: next,
    })
}

pub fn list_categories(conn: &Connection) -> Result<Vec<Category>> {
    let mut stmt = conn.prepare("SELECT id, name, sort_order FROM categories ORDER BY sort_order, id")?;
    let categories = stmt
        .query_map([], row_to_category)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(categories)
}

pub fn find_category(conn: &Connection, name: &str) -> Result<Category> {
    conn.query_row(
        "SELECT id, name, sort_order FROM categories WHERE name = ?1",
        [name.trim()],
        row_to_category,
    )
    .optional()?
    .ok_or_else(|| KakeiboError::NotFound(format!("category {name}")))
}

pub fn rename_category(conn: &Connection, id: i64, new_name: &str) -> Result<()> {
    let new_name = clean_name(new_name)?;
    if name_taken(conn, new_name, Some(id))? {
        return Err(KakeiboError::Conflict(format!("Category already exists: {new_name}")));
    }
    let updated = conn.execute(
        "UPDATE categories SET name = ?1 WHERE id = ?2",
        rusqlite::params![new_name, id],
    )?;
    if updated == 0 {
        return Err(KakeiboError::NotFound(format!("category {id}")));
    }
    Ok(())
}

/// Rewrite the display order. `ids` must name every category exactly once.
pub fn reorder_categories(conn: &Connection, ids: &[i64]) -> Result<()> {
    let tx = immediate_tx(conn)?;
    let current: HashSet<i64> = {
        let mut stmt = tx.prepare("SELECT id FROM categories")?;
        let existing = stmt
            .query_map([], |row| row.get(0))?
            .collect::<std::result::Result<HashSet<_>, _>>()?;
        existing
    };
    let given: HashSet<i64> = ids.iter().copied().collect();
    if given.len() != ids.len() || given != current {
        return Err(KakeiboError::Validation(
            "Reorder must list every category exactly once".into(),
        ));
    }
    {
        let mut stmt = tx.prepare_cached("UPDATE categories SET sort_order = ?1 WHERE id = ?2")?;
        for (position, id) in ids.iter().enumerate() {
            stmt.execute(rusqlite::params![position as i64, id])?;
        }
    }
    tx.commit()?;
    info!("Reordered {} categories", ids.len());
    Ok(())
}

/// Delete a category and its budgets. Refused while any expense still uses it.
pub fn delete_category(conn: &Connection, id: i64) -> Result<()> {
    let tx = immediate_tx(conn)?;
    let in_use: i64 = tx.query_row(
        "SELECT count(*) FROM expenses WHERE category_id = ?1",
        [id],
        |row| row.get(0),
    )?;
    if in_use > 0 {
        return Err(KakeiboError::Conflict(format!(
            "Category {id} is used by {in_use} expense(s)"
        )));
    }
    tx.execute("DELETE FROM budgets WHERE category_id = ?1", [id])?;
    let deleted = tx.execute("DELETE FROM categories WHERE id = ?1", [id])?;
    if deleted == 0 {
        return Err(KakeiboError::NotFound(format!("category {id}")));
    }
    tx.commit()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{get_connection, init_db};

    fn test_db() -> (tempfile::TempDir, Connection) {
        let dir = tempfile::tempdir().unwrap();
        let conn = get_connection(&dir.path().join("test.db")).unwrap();
        init_db(&conn).unwrap();
        (dir, conn)
    }

    fn names(conn: &Connection) -> Vec<String> {
        list_categories(conn).unwrap().into_iter().map(|c| c.name).collect()
    }

    #[test]
    fn test_seeded_categories_in_order() {
        let (_dir, conn) = test_db();
        let all = names(&conn);
        assert_eq!(all.first().map(String::as_str), Some("Groceries"));
        assert_eq!(all.last().map(String::as_str), Some("Other"));
    }

    #[test]
    fn test_add_appends() {
        let (_dir, conn) = test_db();
        let pets = add_category(&conn, "Pets").unwrap();
        assert_eq!(names(&conn).last().map(String::as_str), Some("Pets"));
        assert_eq!(find_category(&conn, "Pets").unwrap().id, pets.id);
    }

    #[test]
    fn test_add_duplicate_conflicts() {
        let (_dir, conn) = test_db();
        assert!(matches!(add_category(&conn, "Groceries"), Err(KakeiboError::Conflict(_))));
        assert!(matches!(add_category(&conn, " "), Err(KakeiboError::Validation(_))));
    }

    #[test]
    fn test_rename() {
        let (_dir, conn) = test_db();
        let id = find_category(&conn, "Other").unwrap().id;
        rename_category(&conn, id, "Misc").unwrap();
        assert!(names(&conn).contains(&"Misc".to_string()));
        // Renaming to its own name is not a clash.
        rename_category(&conn, id, "Misc").unwrap();
        assert!(matches!(rename_category(&conn, id, "Groceries"), Err(KakeiboError::Conflict(_))));
        assert!(matches!(rename_category(&conn, 999, "Nope"), Err(KakeiboError::NotFound(_))));
    }

    #[test]
    fn test_reorder_full_set() {
        let (_dir, conn) = test_db();
        let mut ids: Vec<i64> = list_categories(&conn).unwrap().iter().map(|c| c.id).collect();
        ids.reverse();
        reorder_categories(&conn, &ids).unwrap();
        assert_eq!(names(&conn).first().map(String::as_str), Some("Other"));
    }

    #[test]
    fn test_reorder_rejects_partial_or_repeated() {
        let (_dir, conn) = test_db();
        let ids: Vec<i64> = list_categories(&conn).unwrap().iter().map(|c| c.id).collect();
        let before = names(&conn);

        assert!(matches!(reorder_categories(&conn, &ids[1..]), Err(KakeiboError::Validation(_))));
        let mut repeated = ids.clone();
        repeated[1] = repeated[0];
        assert!(matches!(reorder_categories(&conn, &repeated), Err(KakeiboError::Validation(_))));
        let mut stranger = ids.clone();
        stranger.push(999);
        assert!(matches!(reorder_categories(&conn, &stranger), Err(KakeiboError::Validation(_))));

        assert_eq!(names(&conn), before);
    }

    #[test]
    fn test_delete_unused_removes_budgets() {
        let (_dir, conn) = test_db();
        let id = find_category(&conn, "Clothing").unwrap().id;
        conn.execute(
            "INSERT INTO budgets (category_id, year_month, amount) VALUES (?1, '2025-01', 10000)",
            [id],
        ).unwrap();
        delete_category(&conn, id).unwrap();
        let budgets: i64 = conn.query_row("SELECT count(*) FROM budgets", [], |r| r.get(0)).unwrap();
        assert_eq!(budgets, 0);
        assert!(!names(&conn).contains(&"Clothing".to_string()));
    }

    #[test]
    fn test_delete_referenced_conflicts() {
        let (_dir, conn) = test_db();
        conn.execute("INSERT INTO users (id, name) VALUES (1, 'hana')", []).unwrap();
        let id = find_category(&conn, "Groceries").unwrap().id;
        conn.execute(
            "INSERT INTO expenses (user_id, category_id, date, description, amount, confirmed) \
             VALUES (1, ?1, '2025-01-05', 'AEON', 2200, 1)",
            [id],
        ).unwrap();
        assert!(matches!(delete_category(&conn, id), Err(KakeiboError::Conflict(_))));
        assert!(names(&conn).contains(&"Groceries".to_string()));
    }

    #[test]
    fn test_delete_missing() {
        let (_dir, conn) = test_db();
        assert!(matches!(delete_category(&conn, 999), Err(KakeiboError::NotFound(_))));
    }
}
