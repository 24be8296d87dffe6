use std::path::PathBuf;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

const STATEMENT: &str = "\
利用日,利用店名・商品名,利用者,支払方法,利用金額,支払手数料,支払総額
2025/01/05,LAWSON,本人,1回払い,540,0,540
2025/01/07,AMAZON.CO.JP,本人,1回払い,\"3,500\",0,\"3,500\"
2025/01/12,STARBUCKS,本人,1回払い,500,0,500
2025/01/12,STARBUCKS,本人,1回払い,500,0,500
";

/// A kakeibo install under a throwaway HOME with two members.
struct Household {
    home: TempDir,
}

impl Household {
    fn new() -> Self {
        let household = Self {
            home: tempfile::tempdir().unwrap(),
        };
        let data_dir = household.data_dir();
        household
            .cmd()
            .args(["init", "--data-dir", data_dir.to_str().unwrap()])
            .assert()
            .success()
            .stdout(predicate::str::contains("Initialized kakeibo"));
        household.cmd().args(["users", "add", "hana", "--role", "admin"]).assert().success();
        household.cmd().args(["users", "add", "ken"]).assert().success();
        household
    }

    fn data_dir(&self) -> PathBuf {
        self.home.path().join("data")
    }

    fn cmd(&self) -> Command {
        let mut cmd = Command::cargo_bin("kakeibo").unwrap();
        cmd.env("HOME", self.home.path())
            .env_remove("RUST_LOG")
            .env_remove("KAKEIBO_LOG_FORMAT")
            .env_remove("CI")
            .env_remove("KAKEIBO_TEST_MODE");
        cmd
    }

    fn statement(&self) -> String {
        let path = self.home.path().join("rakuten-2025-01.csv");
        std::fs::write(&path, STATEMENT).unwrap();
        path.to_string_lossy().to_string()
    }

    fn set_ai_quota(&self, quota: u32) {
        let settings = serde_json::json!({
            "data_dir": self.data_dir(),
            "ai_monthly_quota": quota,
        });
        let path = self.home.path().join(".config").join("kakeibo").join("settings.json");
        std::fs::write(path, settings.to_string()).unwrap();
    }

    fn set_feature_quota(&self, feature: &str, quota: u32) {
        let settings = serde_json::json!({
            "data_dir": self.data_dir(),
            "ai_monthly_quota": 5,
            "ai_feature_quotas": { feature: quota },
        });
        let path = self.home.path().join(".config").join("kakeibo").join("settings.json");
        std::fs::write(path, settings.to_string()).unwrap();
    }

    fn commit_statement(&self, as_user: &str) {
        let file = self.statement();
        self.cmd()
            .args(["import", "commit", &file, "--card", "rakuten", "--month", "2025-01", "--as", as_user])
            .assert()
            .success();
    }
}

#[test]
fn status_before_init_points_to_init() {
    let home = tempfile::tempdir().unwrap();
    Command::cargo_bin("kakeibo")
        .unwrap()
        .env("HOME", home.path())
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("kakeibo init"));
}

#[test]
fn preview_writes_nothing() {
    let household = Household::new();
    let file = household.statement();
    household
        .cmd()
        .args(["import", "preview", &file, "--card", "rakuten", "--month", "2025-01", "--as", "ken"])
        .assert()
        .success()
        .stdout(predicate::str::contains("4 row(s), 3 new, 1 duplicate"));
    household
        .cmd()
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("Imports:       0"))
        .stdout(predicate::str::contains("Expenses:      0"));
}

#[test]
fn preview_json_reports_duplicates() {
    let household = Household::new();
    let file = household.statement();
    let output = household
        .cmd()
        .args(["import", "preview", &file, "--card", "rakuten", "--month", "2025-01", "--as", "ken", "--json"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let analysis: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(analysis["total_rows"], 4);
    assert_eq!(analysis["new_rows"].as_array().unwrap().len(), 3);
    assert_eq!(analysis["duplicates"][0]["reason"], "within_batch");
    assert_eq!(analysis["duplicates"][0]["row"]["raw_row_index"], 5);
}

#[test]
fn commit_then_recommit_is_rejected() {
    let household = Household::new();
    let file = household.statement();
    household
        .cmd()
        .args(["import", "commit", &file, "--card", "rakuten", "--month", "2025-01", "--as", "ken"])
        .assert()
        .success()
        .stdout(predicate::str::contains("3 imported, 1 skipped"))
        .stdout(predicate::str::contains("3 awaiting confirmation"));
    household
        .cmd()
        .args(["import", "commit", &file, "--card", "rakuten", "--month", "2025-01", "--as", "ken"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("nothing to import"));
}

#[test]
fn unknown_card_type_fails() {
    let household = Household::new();
    let file = household.statement();
    household
        .cmd()
        .args(["import", "preview", &file, "--card", "visa", "--month", "2025-01", "--as", "ken"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unknown card type: visa"));
}

#[test]
fn member_cannot_import_for_someone_else() {
    let household = Household::new();
    let file = household.statement();
    household
        .cmd()
        .args(["import", "commit", &file, "--card", "rakuten", "--month", "2025-01", "--as", "ken", "--owner", "hana"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Forbidden"));
}

#[test]
fn confirming_updates_unconfirmed_count() {
    let household = Household::new();
    household.commit_statement("ken");
    household
        .cmd()
        .args(["expenses", "confirm", "1", "2", "--as", "ken"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Confirmed 2 expense(s) across 1 import(s)"));
    household
        .cmd()
        .args(["imports", "recalc", "1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Import 1: 1 unconfirmed"));
}

#[test]
fn member_cannot_confirm_someone_elses_expense() {
    let household = Household::new();
    household.commit_statement("hana");
    household
        .cmd()
        .args(["expenses", "confirm", "1", "--as", "ken"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Not found: expense 1"));
}

#[test]
fn dashboard_json_totals() {
    let household = Household::new();
    household.commit_statement("ken");
    household.cmd().args(["budgets", "set", "Groceries", "30000", "--month", "2025-01"]).assert().success();
    let output = household
        .cmd()
        .args(["dashboard", "--month", "2025-01", "--json"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let summary: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(summary["total_spent"], 4540);
    assert_eq!(summary["total_budget"], 30000);
    assert_eq!(summary["unconfirmed_count"], 3);
}

#[test]
fn chat_session_stops_at_quota() {
    let household = Household::new();
    household.set_ai_quota(2);
    let output = household
        .cmd()
        .args(["ai", "chat", "--as", "ken", "--month", "2025-01"])
        .write_stdin("first\nsecond\nthird\n")
        .output()
        .unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert_eq!(stdout.matches("\"feature\": \"chat\"").count(), 2);
    assert!(stderr.contains("Monthly chat limit of 2 reached"));
}

#[test]
fn feature_quota_overrides_monthly_quota() {
    let household = Household::new();
    household.set_feature_quota("chat", 1);
    household
        .cmd()
        .args(["ai", "chat", "--as", "ken", "--month", "2025-01"])
        .write_stdin("first\nsecond\n")
        .assert()
        .success()
        .stderr(predicate::str::contains("Monthly chat limit of 1 reached"));
}

#[test]
fn budgets_copy_defaults_to_previous_month() {
    let household = Household::new();
    household.cmd().args(["budgets", "set", "Groceries", "30000", "--month", "2024-12"]).assert().success();
    household
        .cmd()
        .args(["budgets", "copy", "--to", "2025-01"])
        .assert()
        .success()
        .stdout(predicate::str::contains("From 2024-12: 1 copied, 0 kept"));
    household
        .cmd()
        .args(["budgets", "list", "--month", "2025-01"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Groceries"));
}

#[test]
fn chat_reset_needs_both_flags() {
    let household = Household::new();
    household.set_ai_quota(1);
    household
        .cmd()
        .args(["ai", "chat", "--as", "ken", "--month", "2025-01"])
        .env("CI", "1")
        .write_stdin("first\n/reset\nsecond\n")
        .assert()
        .success()
        .stderr(predicate::str::contains("Not found: no such operation"))
        .stderr(predicate::str::contains("Monthly chat limit of 1 reached"));

    let output = household
        .cmd()
        .args(["ai", "chat", "--as", "ken", "--month", "2025-01"])
        .env("CI", "true")
        .env("KAKEIBO_TEST_MODE", "1")
        .write_stdin("first\n/reset\nsecond\n")
        .output()
        .unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(stdout.matches("\"feature\": \"chat\"").count(), 2);
    assert!(String::from_utf8_lossy(&output.stderr).contains("Quotas cleared"));
}

#[test]
fn category_in_use_cannot_be_deleted() {
    let household = Household::new();
    household
        .cmd()
        .args(["expenses", "add", "2025-01-20", "Farmers market", "2400", "--category", "Groceries", "--as", "ken"])
        .assert()
        .success();
    household
        .cmd()
        .args(["categories", "delete", "1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Conflict"));
}
