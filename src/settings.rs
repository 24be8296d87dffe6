use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{KakeiboError, Result};
use crate::period::PeriodBasis;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub data_dir: String,
    #[serde(default)]
    pub period_basis: PeriodBasis,
    #[serde(default = "default_preview_limit")]
    pub preview_limit: usize,
    #[serde(default = "default_ai_monthly_quota")]
    pub ai_monthly_quota: u32,
    /// Per-feature overrides of `ai_monthly_quota`, keyed by feature (`chat`, `report`, `insights`).
    #[serde(default)]
    pub ai_feature_quotas: BTreeMap<String, u32>,
}

fn default_preview_limit() -> usize {
    10
}

fn default_ai_monthly_quota() -> u32 {
    5
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir().to_string_lossy().to_string(),
            period_basis: PeriodBasis::default(),
            preview_limit: default_preview_limit(),
            ai_monthly_quota: default_ai_monthly_quota(),
            ai_feature_quotas: BTreeMap::new(),
        }
    }
}

fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("kakeibo")
}

fn settings_path() -> PathBuf {
    config_dir().join("settings.json")
}

fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("Documents")
        .join("kakeibo")
}

pub fn load_settings() -> Settings {
    let path = settings_path();
    if path.exists() {
        let content = std::fs::read_to_string(&path).unwrap_or_default();
        serde_json::from_str(&content).unwrap_or_default()
    } else {
        Settings::default()
    }
}

pub fn save_settings(settings: &Settings) -> Result<()> {
    let dir = config_dir();
    std::fs::create_dir_all(&dir)?;
    let json = serde_json::to_string_pretty(settings)
        .map_err(|e| KakeiboError::Settings(e.to_string()))?;
    std::fs::write(settings_path(), format!("{json}\n"))?;
    Ok(())
}

pub fn get_data_dir() -> PathBuf {
    PathBuf::from(&load_settings().data_dir)
}

pub fn db_path() -> PathBuf {
    get_data_dir().join("kakeibo.db")
}

pub fn shellexpand_path(path: &str) -> String {
    if path.starts_with('~') {
        if let Some(home) = dirs::home_dir() {
            return path.replacen('~', &home.to_string_lossy(), 1);
        }
    }
    std::fs::canonicalize(path)
        .unwrap_or_else(|_| PathBuf::from(path))
        .to_string_lossy()
        .to_string()
}

/// Operator-controlled flags that unlock the rate-limit reset. Both must be set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EscapeHatch {
    pub ci: bool,
    pub test_mode: bool,
}

impl EscapeHatch {
    pub fn from_env() -> Self {
        Self {
            ci: env_flag("CI"),
            test_mode: env_flag("KAKEIBO_TEST_MODE"),
        }
    }

    pub fn is_open(&self) -> bool {
        self.ci && self.test_mode
    }
}

fn env_flag(name: &str) -> bool {
    std::env::var(name).map(|v| is_truthy(&v)).unwrap_or(false)
}

fn is_truthy(raw: &str) -> bool {
    matches!(raw.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes")
}
