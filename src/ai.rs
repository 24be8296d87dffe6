//! Quota-gated entry point for the AI features.
//!
//! Text generation happens outside this crate. The gate decides whether a call
//! may proceed, assembles the month's figures as input and hands them to a
//! [`Generator`].

use log::{debug, info};
use rusqlite::Connection;
use serde::Serialize;

use crate::dashboard::{monthly_summary, MonthlySummary};
use crate::error::{KakeiboError, Result};
use crate::models::Identity;
use crate::period::YearMonth;
use crate::rate_limiter::{self, RateLimitDecision, RateLimiter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AiFeature {
    Chat,
    Report,
    Insights,
}

impl AiFeature {
    pub fn key(&self) -> &'static str {
        match self {
            Self::Chat => rate_limiter::CHAT,
            Self::Report => rate_limiter::REPORT,
            Self::Insights => rate_limiter::INSIGHTS,
        }
    }

    fn consume_process_wide(&self, user_id: i64) -> RateLimitDecision {
        match self {
            Self::Chat => rate_limiter::consume_chat_rate_limit(user_id),
            Self::Report => rate_limiter::consume_report_rate_limit(user_id),
            Self::Insights => rate_limiter::consume_insights_rate_limit(user_id),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AiInput {
    pub feature: AiFeature,
    pub user_id: i64,
    pub summary: MonthlySummary,
    pub prompt: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AiOutcome {
    pub output: String,
    pub remaining: u32,
}

pub trait Generator {
    fn generate(&self, input: &AiInput) -> Result<String>;
}

/// Emits the assembled input as JSON for an external model tool to pick up.
pub struct HandoffGenerator;

impl Generator for HandoffGenerator {
    fn generate(&self, input: &AiInput) -> Result<String> {
        Ok(serde_json::to_string_pretty(input)?)
    }
}

pub struct AiGate<'a> {
    limiter: Option<&'a RateLimiter>,
}

impl<'a> AiGate<'a> {
    /// A gate backed by the process-wide limiter.
    pub fn process_wide() -> Self {
        Self { limiter: None }
    }

    pub fn with_limiter(limiter: &'a RateLimiter) -> Self {
        Self {
            limiter: Some(limiter),
        }
    }

    fn limiter(&self) -> &RateLimiter {
        self.limiter.unwrap_or_else(|| rate_limiter::global())
    }

    fn consume(&self, feature: AiFeature, user_id: i64) -> RateLimitDecision {
        match self.limiter {
            Some(limiter) => limiter.consume(feature.key(), user_id),
            None => feature.consume_process_wide(user_id),
        }
    }

    pub fn remaining(&self, feature: AiFeature, user_id: i64) -> u32 {
        self.limiter().remaining(feature.key(), user_id)
    }

    /// Run one AI call for `identity`. The quota is charged before anything
    /// else; a denied call reads nothing and never reaches the generator.
    /// Members see their own spending, admins the whole household.
    pub fn run(
        &self,
        conn: &Connection,
        identity: &Identity,
        feature: AiFeature,
        year_month: &YearMonth,
        prompt: Option<&str>,
        generator: &dyn Generator,
    ) -> Result<AiOutcome> {
        let decision = self.consume(feature, identity.user_id);
        if !decision.allowed {
            info!("User {} denied {} for {year_month}", identity.user_id, feature.key());
            return Err(KakeiboError::RateLimited {
                feature: feature.key().to_string(),
                quota: self.limiter().quota_for(feature.key()),
            });
        }

        let owner = if identity.role.is_elevated() {
            None
        } else {
            Some(identity.user_id)
        };
        let input = AiInput {
            feature,
            user_id: identity.user_id,
            summary: monthly_summary(conn, year_month, owner)?,
            prompt: prompt.map(str::to_string),
        };
        debug!("Handing {} input to generator", feature.key());
        let output = generator.generate(&input)?;
        Ok(AiOutcome {
            output,
            remaining: decision.remaining,
        })
    }
}
