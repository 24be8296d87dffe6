use crate::db::get_connection;
use crate::error::Result;
use crate::settings::{db_path, load_settings};

pub fn run() -> Result<()> {
    let settings = load_settings();
    let db_path = db_path();

    println!("Data dir:   {}", settings.data_dir);
    println!("Database:   {}", db_path.display());
    println!("AI quota:   {} per feature per month", settings.ai_monthly_quota);

    if db_path.exists() {
        let size = std::fs::metadata(&db_path)?.len();
        println!("DB size:    {size} bytes");

        let conn = get_connection(&db_path)?;
        let count = |sql: &str| -> Result<i64> { Ok(conn.query_row(sql, [], |r| r.get(0))?) };
        let members = count("SELECT count(*) FROM users")?;
        let categories = count("SELECT count(*) FROM categories")?;
        let imports = count("SELECT count(*) FROM csv_imports")?;
        let expenses = count("SELECT count(*) FROM expenses")?;
        let unconfirmed = count("SELECT count(*) FROM expenses WHERE confirmed = 0")?;

        println!();
        println!("Members:       {members}");
        println!("Categories:    {categories}");
        println!("Imports:       {imports}");
        println!("Expenses:      {expenses}");
        println!("Unconfirmed:   {unconfirmed}");
    } else {
        println!();
        println!("Database not found. Run `kakeibo init` to set up.");
    }

    Ok(())
}
