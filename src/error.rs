use thiserror::Error;

#[derive(Error, Debug)]
pub enum KakeiboError {
    #[error("Database error: {0}")]
    Db(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Unknown card type: {0}")]
    UnknownCardType(String),

    #[error("Parse error at row {row}: {message}")]
    Parse { row: usize, message: String },

    #[error("Encoding error: {0}")]
    Encoding(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Monthly {feature} limit of {quota} reached")]
    RateLimited { feature: String, quota: u32 },

    #[error("Settings error: {0}")]
    Settings(String),

    #[error("{0}")]
    Other(String),
}

impl KakeiboError {
    /// HTTP-equivalent status for API-route callers.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Validation(_) | Self::UnknownCardType(_) | Self::Parse { .. } | Self::Encoding(_) => 400,
            Self::Forbidden(_) => 403,
            Self::NotFound(_) => 404,
            Self::Conflict(_) => 409,
            Self::RateLimited { .. } => 429,
            Self::Db(_) | Self::Io(_) | Self::Csv(_) | Self::Json(_) | Self::Settings(_) | Self::Other(_) => 500,
        }
    }

    pub(crate) fn parse(row: usize, message: impl Into<String>) -> Self {
        Self::Parse {
            row,
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, KakeiboError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(KakeiboError::Validation("x".into()).status_code(), 400);
        assert_eq!(KakeiboError::parse(3, "bad date").status_code(), 400);
        assert_eq!(KakeiboError::Forbidden("x".into()).status_code(), 403);
        assert_eq!(KakeiboError::NotFound("x".into()).status_code(), 404);
        assert_eq!(KakeiboError::Conflict("x".into()).status_code(), 409);
        let limited = KakeiboError::RateLimited { feature: "chat".into(), quota: 5 };
        assert_eq!(limited.status_code(), 429);
        assert_eq!(KakeiboError::Other("x".into()).status_code(), 500);
    }

    #[test]
    fn test_parse_error_message_names_row() {
        let e = KakeiboError::parse(7, "unparseable date '2025/13/01'");
        assert_eq!(e.to_string(), "Parse error at row 7: unparseable date '2025/13/01'");
    }
}
