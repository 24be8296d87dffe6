//! Per-user, per-calendar-month quotas for AI features.
//!
//! Each `(feature_key, user_id)` pair owns one counter tagged with the period
//! key (`YYYY-MM`) it was last touched in. A counter from an older period is
//! treated as zero on the next call, so months roll over without a sweep.
//! All check-then-increment work happens under one mutex.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};

use log::{info, warn};
use serde::Serialize;

use crate::error::{KakeiboError, Result};
use crate::period::{Clock, PeriodBasis, SystemClock};
use crate::settings::EscapeHatch;

pub const DEFAULT_MONTHLY_QUOTA: u32 = 5;

pub const CHAT: &str = "chat";
pub const REPORT: &str = "report";
pub const INSIGHTS: &str = "insights";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitRecord {
    pub period_key: String,
    pub count: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub remaining: u32,
}

pub struct RateLimiter {
    clock: Arc<dyn Clock>,
    default_quota: u32,
    quotas: HashMap<String, u32>,
    records: Mutex<HashMap<(String, i64), RateLimitRecord>>,
}

impl RateLimiter {
    pub fn new(clock: Arc<dyn Clock>, default_quota: u32) -> Self {
        Self {
            clock,
            default_quota,
            quotas: HashMap::new(),
            records: Mutex::new(HashMap::new()),
        }
    }

    /// Override the quota for one feature key.
    pub fn with_quota(mut self, feature_key: &str, quota: u32) -> Self {
        self.quotas.insert(feature_key.to_string(), quota);
        self
    }

    pub fn quota_for(&self, feature_key: &str) -> u32 {
        self.quotas.get(feature_key).copied().unwrap_or(self.default_quota)
    }

    fn lock_records(&self) -> MutexGuard<'_, HashMap<(String, i64), RateLimitRecord>> {
        self.records.lock().unwrap_or_else(|poisoned| {
            warn!("Rate limiter records mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    pub fn consume(&self, feature_key: &str, user_id: i64) -> RateLimitDecision {
        let quota = self.quota_for(feature_key);
        let period_key = self.clock.current_period().to_string();

        let mut records = self.lock_records();
        let record = records
            .entry((feature_key.to_string(), user_id))
            .or_insert_with(|| RateLimitRecord {
                period_key: period_key.clone(),
                count: 0,
            });
        if record.period_key != period_key {
            record.period_key = period_key;
            record.count = 0;
        }

        if record.count >= quota {
            return RateLimitDecision {
                allowed: false,
                remaining: 0,
            };
        }
        record.count += 1;
        RateLimitDecision {
            allowed: true,
            remaining: quota - record.count,
        }
    }

    /// Calls left for this period, without consuming one.
    pub fn remaining(&self, feature_key: &str, user_id: i64) -> u32 {
        let quota = self.quota_for(feature_key);
        let period_key = self.clock.current_period().to_string();
        let records = self.lock_records();
        match records.get(&(feature_key.to_string(), user_id)) {
            Some(record) if record.period_key == period_key => quota.saturating_sub(record.count),
            _ => quota,
        }
    }

    pub fn reset(&self) {
        let mut records = self.lock_records();
        let cleared = records.len();
        records.clear();
        info!("Cleared {cleared} rate limit record(s)");
    }

    /// Reset reachable from a request path. Without both escape-hatch flags the
    /// operation reports `NotFound` and leaves every counter in place.
    pub fn reset_guarded(&self, hatch: &EscapeHatch) -> Result<()> {
        if !hatch.is_open() {
            warn!("Rate limit reset requested without CI and test-mode flags");
            return Err(KakeiboError::NotFound("no such operation".into()));
        }
        self.reset();
        Ok(())
    }
}

static LIMITER: OnceLock<RateLimiter> = OnceLock::new();

/// Install the process-wide limiter. The first installation wins.
pub fn install(limiter: RateLimiter) -> &'static RateLimiter {
    if LIMITER.set(limiter).is_err() {
        warn!("Rate limiter already installed, keeping the existing instance");
    }
    global()
}

pub fn global() -> &'static RateLimiter {
    LIMITER.get_or_init(|| {
        let clock = Arc::new(SystemClock::new(PeriodBasis::default()));
        RateLimiter::new(clock, DEFAULT_MONTHLY_QUOTA)
    })
}

pub fn consume_chat_rate_limit(user_id: i64) -> RateLimitDecision {
    global().consume(CHAT, user_id)
}

pub fn consume_report_rate_limit(user_id: i64) -> RateLimitDecision {
    global().consume(REPORT, user_id)
}

pub fn consume_insights_rate_limit(user_id: i64) -> RateLimitDecision {
    global().consume(INSIGHTS, user_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::period::FixedClock;
    use chrono::NaiveDate;
    use std::sync::Barrier;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn limiter(quota: u32) -> (Arc<FixedClock>, RateLimiter) {
        let clock = Arc::new(FixedClock::new(date(2025, 1, 15)));
        let limiter = RateLimiter::new(clock.clone(), quota);
        (clock, limiter)
    }

    #[test]
    fn test_quota_of_five_counts_down() {
        let (_clock, limiter) = limiter(5);
        let remaining: Vec<u32> = (0..5)
            .map(|_| {
                let d = limiter.consume(CHAT, 1);
                assert!(d.allowed);
                d.remaining
            })
            .collect();
        assert_eq!(remaining, vec![4, 3, 2, 1, 0]);
        assert_eq!(
            limiter.consume(CHAT, 1),
            RateLimitDecision { allowed: false, remaining: 0 }
        );
        assert_eq!(
            limiter.consume(CHAT, 1),
            RateLimitDecision { allowed: false, remaining: 0 }
        );
    }

    #[test]
    fn test_users_and_features_are_independent() {
        let (_clock, limiter) = limiter(1);
        assert!(limiter.consume(CHAT, 1).allowed);
        assert!(!limiter.consume(CHAT, 1).allowed);
        assert!(limiter.consume(CHAT, 2).allowed);
        assert!(limiter.consume(REPORT, 1).allowed);
        assert!(limiter.consume(INSIGHTS, 1).allowed);
    }

    #[test]
    fn test_month_rollover_resets_without_explicit_reset() {
        let (clock, limiter) = limiter(2);
        assert!(limiter.consume(CHAT, 1).allowed);
        assert!(limiter.consume(CHAT, 1).allowed);
        assert!(limiter.consume(REPORT, 1).allowed);
        assert!(!limiter.consume(CHAT, 1).allowed);

        clock.set(date(2025, 2, 1));
        assert_eq!(limiter.remaining(CHAT, 1), 2);
        assert_eq!(
            limiter.consume(CHAT, 1),
            RateLimitDecision { allowed: true, remaining: 1 }
        );
        assert_eq!(
            limiter.consume(REPORT, 1),
            RateLimitDecision { allowed: true, remaining: 1 }
        );
    }

    #[test]
    fn test_rollover_across_year_boundary() {
        let (clock, limiter) = limiter(1);
        clock.set(date(2024, 12, 31));
        assert!(limiter.consume(INSIGHTS, 9).allowed);
        assert!(!limiter.consume(INSIGHTS, 9).allowed);
        clock.set(date(2025, 1, 1));
        assert!(limiter.consume(INSIGHTS, 9).allowed);
    }

    #[test]
    fn test_per_feature_quota_override() {
        let (_clock, limiter) = limiter(5);
        let limiter = limiter.with_quota(REPORT, 1);
        assert_eq!(limiter.quota_for(REPORT), 1);
        assert_eq!(limiter.quota_for(CHAT), 5);
        assert_eq!(
            limiter.consume(REPORT, 1),
            RateLimitDecision { allowed: true, remaining: 0 }
        );
        assert!(!limiter.consume(REPORT, 1).allowed);
    }

    #[test]
    fn test_zero_quota_always_denies() {
        let (_clock, limiter) = limiter(0);
        assert_eq!(
            limiter.consume(CHAT, 1),
            RateLimitDecision { allowed: false, remaining: 0 }
        );
    }

    #[test]
    fn test_remaining_does_not_consume() {
        let (_clock, limiter) = limiter(3);
        assert_eq!(limiter.remaining(CHAT, 1), 3);
        limiter.consume(CHAT, 1);
        assert_eq!(limiter.remaining(CHAT, 1), 2);
        assert_eq!(limiter.remaining(CHAT, 1), 2);
    }

    #[test]
    fn test_last_slot_is_granted_exactly_once_under_contention() {
        let (_clock, limiter) = limiter(5);
        for _ in 0..4 {
            assert!(limiter.consume(CHAT, 1).allowed);
        }
        let barrier = Barrier::new(2);
        let results: Vec<RateLimitDecision> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..2)
                .map(|_| {
                    s.spawn(|| {
                        barrier.wait();
                        limiter.consume(CHAT, 1)
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });
        assert_eq!(results.iter().filter(|d| d.allowed).count(), 1);
        assert_eq!(results.iter().filter(|d| !d.allowed).count(), 1);
        assert!(results.iter().all(|d| d.remaining == 0));
    }

    #[test]
    fn test_many_threads_never_exceed_quota() {
        let (_clock, limiter) = limiter(5);
        let barrier = Barrier::new(32);
        let allowed: usize = std::thread::scope(|s| {
            let handles: Vec<_> = (0..32)
                .map(|_| {
                    s.spawn(|| {
                        barrier.wait();
                        limiter.consume(REPORT, 7).allowed as usize
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).sum()
        });
        assert_eq!(allowed, 5);
    }

    #[test]
    fn test_reset_clears_all_features() {
        let (_clock, limiter) = limiter(1);
        limiter.consume(CHAT, 1);
        limiter.consume(REPORT, 2);
        limiter.reset();
        assert!(limiter.consume(CHAT, 1).allowed);
        assert!(limiter.consume(REPORT, 2).allowed);
    }

    #[test]
    fn test_guarded_reset_requires_both_flags() {
        let (_clock, limiter) = limiter(1);
        limiter.consume(CHAT, 1);

        for hatch in [
            EscapeHatch::default(),
            EscapeHatch { ci: true, test_mode: false },
            EscapeHatch { ci: false, test_mode: true },
        ] {
            let err = limiter.reset_guarded(&hatch).unwrap_err();
            assert!(matches!(err, KakeiboError::NotFound(_)));
            assert_eq!(limiter.remaining(CHAT, 1), 0);
        }

        limiter.reset_guarded(&EscapeHatch { ci: true, test_mode: true }).unwrap();
        assert_eq!(limiter.remaining(CHAT, 1), 1);
    }

    #[test]
    fn test_global_feature_entry_points_use_separate_namespaces() {
        // Ids unlikely to collide with any other test touching the global instance.
        let user = 9_000_001;
        let chat = consume_chat_rate_limit(user);
        let report = consume_report_rate_limit(user);
        let insights = consume_insights_rate_limit(user);
        assert!(chat.allowed && report.allowed && insights.allowed);
        assert_eq!(chat.remaining, report.remaining);
        assert_eq!(report.remaining, insights.remaining);
    }
}
