use std::io::BufRead;

use log::warn;

use crate::ai::{AiFeature, AiGate, HandoffGenerator};
use crate::error::{KakeiboError, Result};
use crate::rate_limiter;
use crate::settings::EscapeHatch;

use super::{month_or_current, open_db, resolve_identity, AiArgs};

/// Session command that clears every quota counter when the escape hatch is open.
const RESET_COMMAND: &str = "/reset";

pub fn run_once(feature: AiFeature, args: &AiArgs) -> Result<()> {
    let year_month = month_or_current(args.month.as_deref())?;
    let conn = open_db()?;
    let identity = resolve_identity(&conn, &args.as_user)?;
    let outcome = AiGate::process_wide().run(&conn, &identity, feature, &year_month, None, &HandoffGenerator)?;
    println!("{}", outcome.output);
    eprintln!("{} call(s) left this month", outcome.remaining);
    Ok(())
}

/// One prompt per stdin line, all charged against the same monthly quota.
/// Denied prompts are reported and the session carries on.
pub fn chat(args: &AiArgs) -> Result<()> {
    let year_month = month_or_current(args.month.as_deref())?;
    let conn = open_db()?;
    let identity = resolve_identity(&conn, &args.as_user)?;
    let gate = AiGate::process_wide();

    for line in std::io::stdin().lock().lines() {
        let line = line?;
        let prompt = line.trim();
        if prompt.is_empty() {
            continue;
        }
        if prompt == RESET_COMMAND {
            match rate_limiter::global().reset_guarded(&EscapeHatch::from_env()) {
                Ok(()) => eprintln!("Quotas cleared"),
                Err(e) => eprintln!("Error: {e}"),
            }
            continue;
        }
        match gate.run(&conn, &identity, AiFeature::Chat, &year_month, Some(prompt), &HandoffGenerator) {
            Ok(outcome) => println!("{}", outcome.output),
            Err(e @ KakeiboError::RateLimited { .. }) => {
                warn!("Chat prompt denied for user {}", identity.user_id);
                eprintln!("Error: {e}");
            }
            Err(e) => return Err(e),
        }
    }
    Ok(())
}
