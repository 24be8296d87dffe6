use std::fmt;
use std::str::FromStr;
use std::sync::Mutex;

use chrono::{Datelike, Local, NaiveDate, Utc};
use serde::{Deserialize, Serialize, Serializer};

use crate::error::{KakeiboError, Result};

/// A calendar month, always rendered as `YYYY-MM`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct YearMonth {
    year: i32,
    month: u32,
}

impl YearMonth {
    pub fn new(year: i32, month: u32) -> Result<Self> {
        if !(1..=12).contains(&month) {
            return Err(KakeiboError::Validation(format!(
                "Month must be between 01 and 12, got {month:02}"
            )));
        }
        if !(1..=9999).contains(&year) {
            return Err(KakeiboError::Validation(format!("Year out of range: {year}")));
        }
        Ok(Self { year, month })
    }

    pub fn from_date(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    pub fn previous(&self) -> Self {
        if self.month == 1 {
            Self { year: self.year - 1, month: 12 }
        } else {
            Self { year: self.year, month: self.month - 1 }
        }
    }

    pub fn next(&self) -> Self {
        if self.month == 12 {
            Self { year: self.year + 1, month: 1 }
        } else {
            Self { year: self.year, month: self.month + 1 }
        }
    }

    /// Half-open `[start, end)` ISO date bounds, for range queries over `YYYY-MM-DD` text.
    pub fn date_bounds(&self) -> (String, String) {
        let next = self.next();
        (
            format!("{:04}-{:02}-01", self.year, self.month),
            format!("{:04}-{:02}-01", next.year, next.month),
        )
    }
}

impl fmt::Display for YearMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for YearMonth {
    type Err = KakeiboError;

    fn from_str(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        let invalid = || KakeiboError::Validation(format!("Invalid year-month '{raw}' (expected YYYY-MM)"));
        let (year, month) = raw.split_once('-').ok_or_else(invalid)?;
        if year.len() != 4 || month.len() != 2 {
            return Err(invalid());
        }
        if !year.bytes().chain(month.bytes()).all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        let year: i32 = year.parse().map_err(|_| invalid())?;
        let month: u32 = month.parse().map_err(|_| invalid())?;
        Self::new(year, month)
    }
}

impl Serialize for YearMonth {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Which calendar the period key follows. One basis is used for the whole process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PeriodBasis {
    #[default]
    Local,
    Utc,
}

pub trait Clock: Send + Sync {
    fn today(&self) -> NaiveDate;

    fn current_period(&self) -> YearMonth {
        YearMonth::from_date(self.today())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    basis: PeriodBasis,
}

impl SystemClock {
    pub fn new(basis: PeriodBasis) -> Self {
        Self { basis }
    }
}

impl Clock for SystemClock {
    fn today(&self) -> NaiveDate {
        match self.basis {
            PeriodBasis::Local => Local::now().date_naive(),
            PeriodBasis::Utc => Utc::now().date_naive(),
        }
    }
}

/// A settable clock for exercising month rollover.
#[derive(Debug)]
pub struct FixedClock {
    today: Mutex<NaiveDate>,
}

impl FixedClock {
    pub fn new(today: NaiveDate) -> Self {
        Self {
            today: Mutex::new(today),
        }
    }

    pub fn set(&self, today: NaiveDate) {
        let mut guard = self.today.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard = today;
    }
}

impl Clock for FixedClock {
    fn today(&self) -> NaiveDate {
        *self.today.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
