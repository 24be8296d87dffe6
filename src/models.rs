use serde::Serialize;

use crate::error::{KakeiboError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Member,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Member => "member",
            Self::Admin => "admin",
        }
    }

    pub fn parse(raw: &str) -> Result<Self> {
        match raw.trim() {
            "member" => Ok(Self::Member),
            "admin" => Ok(Self::Admin),
            other => Err(KakeiboError::Validation(format!(
                "Invalid role: {other} (must be 'member' or 'admin')"
            ))),
        }
    }

    /// Elevated roles may act on other members' data.
    pub fn is_elevated(&self) -> bool {
        matches!(self, Self::Admin)
    }
}

/// The authenticated caller, as handed over by the session layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Identity {
    pub user_id: i64,
    pub role: Role,
}

impl Identity {
    pub fn can_act_for(&self, owner_user_id: i64) -> bool {
        self.user_id == owner_user_id || self.role.is_elevated()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub role: Role,
}

impl User {
    pub fn identity(&self) -> Identity {
        Identity {
            user_id: self.id,
            role: self.role,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Category {
    pub id: i64,
    pub name: String,
    pub sort_order: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Expense {
    pub id: i64,
    pub user_id: i64,
    pub category_id: Option<i64>,
    pub date: String,
    pub description: String,
    pub amount: i64,
    pub confirmed: bool,
    pub csv_import_id: Option<i64>,
    pub memo: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CsvImport {
    pub id: i64,
    pub owner_user_id: i64,
    pub imported_by_user_id: i64,
    pub card_type: String,
    pub card_name: String,
    pub year_month: String,
    pub imported_at: String,
    pub record_count: i64,
    pub unconfirmed_count: i64,
    pub checksum: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Budget {
    pub id: i64,
    pub category_id: i64,
    pub year_month: String,
    pub amount: i64,
}
