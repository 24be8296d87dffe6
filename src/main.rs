mod ai;
mod budgets;
mod card_format;
mod categories;
mod cli;
mod dashboard;
mod db;
mod dedup;
mod error;
mod expenses;
mod fmt;
mod importer;
mod models;
mod parser;
mod period;
mod rate_limiter;
mod reconciler;
mod settings;
mod users;

use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::{fmt as tracing_fmt, prelude::*, EnvFilter};

use ai::AiFeature;
use cli::{
    AiCommands, BudgetsCommands, CategoriesCommands, Cli, Commands, ExpensesCommands, ImportCommands,
    ImportsCommands, UsersCommands,
};
use period::SystemClock;
use rate_limiter::RateLimiter;

/// Logs go to stderr so command output on stdout stays clean. `RUST_LOG`
/// overrides the default `warn` level; `KAKEIBO_LOG_FORMAT=json` switches to
/// JSON lines.
fn init_tracing() {
    let log_format = std::env::var("KAKEIBO_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let registry = tracing_subscriber::registry().with(filter);

    if log_format.eq_ignore_ascii_case("json") {
        registry
            .with(tracing_fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_fmt::layer().with_target(true).with_writer(std::io::stderr))
            .init();
    }
}

fn main() {
    init_tracing();

    let settings = settings::load_settings();
    let limiter = RateLimiter::new(Arc::new(SystemClock::new(settings.period_basis)), settings.ai_monthly_quota);
    let limiter = settings
        .ai_feature_quotas
        .iter()
        .fold(limiter, |limiter, (feature, quota)| limiter.with_quota(feature, *quota));
    rate_limiter::install(limiter);

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Init { data_dir } => cli::init::run(data_dir),
        Commands::Users { command } => match command {
            UsersCommands::Add { name, role } => cli::users::add(&name, &role),
            UsersCommands::List => cli::users::list(),
        },
        Commands::Categories { command } => match command {
            CategoriesCommands::Add { name } => cli::categories::add(&name),
            CategoriesCommands::List => cli::categories::list(),
            CategoriesCommands::Rename { id, name } => cli::categories::rename(id, &name),
            CategoriesCommands::Reorder { ids } => cli::categories::reorder(&ids),
            CategoriesCommands::Delete { id } => cli::categories::delete(id),
        },
        Commands::Budgets { command } => match command {
            BudgetsCommands::Set {
                category,
                amount,
                month,
            } => cli::budgets::set(&category, amount, month.as_deref()),
            BudgetsCommands::List { month } => cli::budgets::list(month.as_deref()),
            BudgetsCommands::Copy { from, to } => cli::budgets::copy(from.as_deref(), &to),
        },
        Commands::Import { command } => match command {
            ImportCommands::Preview { args, json } => cli::import::preview(&args, json),
            ImportCommands::Commit { args } => cli::import::commit(&args),
            ImportCommands::Formats => cli::import::formats(),
        },
        Commands::Imports { command } => match command {
            ImportsCommands::List { owner } => cli::imports::list(owner.as_deref()),
            ImportsCommands::Delete { id, as_user } => cli::imports::delete(id, &as_user),
            ImportsCommands::Recalc { id } => cli::imports::recalc(id),
        },
        Commands::Expenses { command } => match command {
            ExpensesCommands::Add {
                date,
                description,
                amount,
                category,
                memo,
                as_user,
                owner,
            } => cli::expenses::add(&cli::expenses::AddArgs {
                date: &date,
                description: &description,
                amount,
                category: category.as_deref(),
                memo: memo.as_deref(),
                as_user: &as_user,
                owner: owner.as_deref(),
            }),
            ExpensesCommands::List {
                month,
                owner,
                category,
                unconfirmed,
            } => cli::expenses::list(month.as_deref(), owner.as_deref(), category.as_deref(), unconfirmed),
            ExpensesCommands::Delete { id, as_user } => cli::expenses::delete(id, &as_user),
            ExpensesCommands::Categorize { id, category, as_user } => {
                cli::expenses::categorize(id, category.as_deref(), &as_user)
            }
            ExpensesCommands::Confirm { ids, as_user } => cli::expenses::confirm(&ids, true, &as_user),
            ExpensesCommands::Unconfirm { ids, as_user } => cli::expenses::confirm(&ids, false, &as_user),
        },
        Commands::Dashboard { month, owner, json } => {
            cli::dashboard::run(month.as_deref(), owner.as_deref(), json)
        }
        Commands::Ai { command } => match command {
            AiCommands::Chat { args } => cli::ai::chat(&args),
            AiCommands::Report { args } => cli::ai::run_once(AiFeature::Report, &args),
            AiCommands::Insights { args } => cli::ai::run_once(AiFeature::Insights, &args),
        },
        Commands::Status => cli::status::run(),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
