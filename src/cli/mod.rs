pub mod ai;
pub mod budgets;
pub mod categories;
pub mod dashboard;
pub mod expenses;
pub mod import;
pub mod imports;
pub mod init;
pub mod status;
pub mod users;

use clap::{Parser, Subcommand};
use rusqlite::Connection;

use crate::db::get_connection;
use crate::error::Result;
use crate::models::Identity;
use crate::period::{Clock, SystemClock, YearMonth};
use crate::settings::{db_path, load_settings};
use crate::users::get_user_by_name;

pub(crate) fn open_db() -> Result<Connection> {
    get_connection(&db_path())
}

/// The acting user, as the session layer would supply it.
pub(crate) fn resolve_identity(conn: &Connection, name: &str) -> Result<Identity> {
    Ok(get_user_by_name(conn, name)?.identity())
}

pub(crate) fn resolve_user_id(conn: &Connection, name: Option<&str>) -> Result<Option<i64>> {
    name.map(|n| get_user_by_name(conn, n).map(|u| u.id)).transpose()
}

/// `--month` when given, otherwise the current period.
pub(crate) fn month_or_current(month: Option<&str>) -> Result<YearMonth> {
    match month {
        Some(m) => m.parse(),
        None => Ok(SystemClock::new(load_settings().period_basis).current_period()),
    }
}

#[derive(Parser)]
#[command(name = "kakeibo", about = "Shared household expense ledger with card-statement import.")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Set up kakeibo: choose a data directory and initialize the database.
    Init {
        /// Path for kakeibo data (default: ~/Documents/kakeibo)
        #[arg(long = "data-dir")]
        data_dir: Option<String>,
    },
    /// Manage household members.
    Users {
        #[command(subcommand)]
        command: UsersCommands,
    },
    /// Manage expense categories.
    Categories {
        #[command(subcommand)]
        command: CategoriesCommands,
    },
    /// Manage monthly budgets.
    Budgets {
        #[command(subcommand)]
        command: BudgetsCommands,
    },
    /// Preview or commit a card statement CSV.
    Import {
        #[command(subcommand)]
        command: ImportCommands,
    },
    /// Inspect and maintain committed imports.
    Imports {
        #[command(subcommand)]
        command: ImportsCommands,
    },
    /// Record, review and confirm expenses.
    Expenses {
        #[command(subcommand)]
        command: ExpensesCommands,
    },
    /// Monthly spending against budget.
    Dashboard {
        /// Month: YYYY-MM (default: current month)
        #[arg(long)]
        month: Option<String>,
        /// Only this member's spending
        #[arg(long)]
        owner: Option<String>,
        /// Print the summary as JSON
        #[arg(long)]
        json: bool,
    },
    /// Quota-limited AI features.
    Ai {
        #[command(subcommand)]
        command: AiCommands,
    },
    /// Show current database and summary statistics.
    Status,
}

#[derive(Subcommand)]
pub enum UsersCommands {
    /// Add a household member.
    Add {
        name: String,
        /// Role: member or admin
        #[arg(long, default_value = "member")]
        role: String,
    },
    /// List household members.
    List,
}

#[derive(Subcommand)]
pub enum CategoriesCommands {
    /// Add a category at the end of the list.
    Add { name: String },
    /// List categories in display order.
    List,
    /// Rename a category.
    Rename { id: i64, name: String },
    /// Set the display order; every category id, first to last.
    Reorder {
        #[arg(required = true, num_args = 1..)]
        ids: Vec<i64>,
    },
    /// Delete an unused category and its budgets.
    Delete { id: i64 },
}

#[derive(Subcommand)]
pub enum BudgetsCommands {
    /// Set the budget for a category and month.
    Set {
        /// Category name
        category: String,
        /// Amount in yen
        amount: i64,
        /// Month: YYYY-MM (default: current month)
        #[arg(long)]
        month: Option<String>,
    },
    /// List budgets for a month.
    List {
        #[arg(long)]
        month: Option<String>,
    },
    /// Copy one month's budgets into another, keeping any already set.
    Copy {
        /// Source month: YYYY-MM (defaults to the month before --to)
        #[arg(long)]
        from: Option<String>,
        /// Target month: YYYY-MM
        #[arg(long)]
        to: String,
    },
}

#[derive(clap::Args)]
pub struct ImportArgs {
    /// Path to the statement CSV
    pub file: String,
    /// Card format key (see `kakeibo import formats`)
    #[arg(long)]
    pub card: String,
    /// Statement month: YYYY-MM
    #[arg(long)]
    pub month: String,
    /// Acting user
    #[arg(long = "as")]
    pub as_user: String,
    /// Member the statement belongs to (default: the acting user)
    #[arg(long)]
    pub owner: Option<String>,
    /// Display name for the card
    #[arg(long)]
    pub name: Option<String>,
}

#[derive(Subcommand)]
pub enum ImportCommands {
    /// Parse and classify a statement without saving anything.
    Preview {
        #[command(flatten)]
        args: ImportArgs,
        /// Print the full analysis as JSON
        #[arg(long)]
        json: bool,
    },
    /// Save a statement's new rows as unconfirmed expenses.
    Commit {
        #[command(flatten)]
        args: ImportArgs,
    },
    /// List supported card formats.
    Formats,
}

#[derive(Subcommand)]
pub enum ImportsCommands {
    /// List committed imports.
    List {
        #[arg(long)]
        owner: Option<String>,
    },
    /// Delete an import and its expenses.
    Delete {
        id: i64,
        #[arg(long = "as")]
        as_user: String,
    },
    /// Recount an import's unconfirmed expenses.
    Recalc { id: i64 },
}

#[derive(Subcommand)]
pub enum ExpensesCommands {
    /// Record an expense by hand.
    Add {
        /// Date: YYYY-MM-DD
        date: String,
        description: String,
        /// Amount in yen (negative for a refund)
        #[arg(allow_hyphen_values = true)]
        amount: i64,
        /// Category name
        #[arg(long)]
        category: Option<String>,
        #[arg(long)]
        memo: Option<String>,
        #[arg(long = "as")]
        as_user: String,
        /// Member who spent it (default: the acting user)
        #[arg(long)]
        owner: Option<String>,
    },
    /// List expenses.
    List {
        #[arg(long)]
        month: Option<String>,
        #[arg(long)]
        owner: Option<String>,
        /// Category name
        #[arg(long)]
        category: Option<String>,
        /// Only expenses awaiting confirmation
        #[arg(long)]
        unconfirmed: bool,
    },
    /// Delete an expense.
    Delete {
        id: i64,
        #[arg(long = "as")]
        as_user: String,
    },
    /// Set or clear an expense's category.
    Categorize {
        id: i64,
        /// Category name; omit to clear
        #[arg(long)]
        category: Option<String>,
        #[arg(long = "as")]
        as_user: String,
    },
    /// Mark expenses as confirmed.
    Confirm {
        #[arg(required = true, num_args = 1..)]
        ids: Vec<i64>,
        #[arg(long = "as")]
        as_user: String,
    },
    /// Return expenses to unconfirmed.
    Unconfirm {
        #[arg(required = true, num_args = 1..)]
        ids: Vec<i64>,
        #[arg(long = "as")]
        as_user: String,
    },
}

#[derive(clap::Args)]
pub struct AiArgs {
    #[arg(long = "as")]
    pub as_user: String,
    /// Month: YYYY-MM (default: current month)
    #[arg(long)]
    pub month: Option<String>,
}

#[derive(Subcommand)]
pub enum AiCommands {
    /// Ask questions about the month, one prompt per stdin line.
    Chat {
        #[command(flatten)]
        args: AiArgs,
    },
    /// Produce the monthly report input.
    Report {
        #[command(flatten)]
        args: AiArgs,
    },
    /// Produce the spending insights input.
    Insights {
        #[command(flatten)]
        args: AiArgs,
    },
}
