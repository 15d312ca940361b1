//! CLI test cases.
//!
//! Parsing tests run against text fixtures. Tests that need `tesseract` or
//! Poppler installed are ignored by default.

use std::{fs, process::Command};

use assert_cmd::prelude::*;
use predicates::prelude::*;
use serde_json::Value;

/// Create a new `Command` with our binary.
fn cmd() -> Command {
    let mut cmd = Command::cargo_bin("fin-report-ocr").unwrap();
    // Keep log output quiet and predictable.
    cmd.env("RUST_LOG", "warn");
    cmd
}

/// Run `cmd` and parse its standard output as JSON.
fn json_output(cmd: &mut Command) -> Value {
    let output = cmd.assert().success().get_output().stdout.clone();
    serde_json::from_slice(&output).expect("output should be JSON")
}

#[test]
fn test_help() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("TESSERACT_CMD"));
}

#[test]
fn test_version() {
    cmd().arg("--version").assert().success();
}

#[test]
fn test_parse_sections() {
    let report = json_output(
        cmd()
            .arg("parse")
            .arg("tests/fixtures/reports/sections_en.txt"),
    );
    let period = &report["financial_period"];
    assert_eq!(period["start_of_period"]["date"], "01/01/2023");
    assert_eq!(period["end_of_period"]["date"], "31/12/2023");
    assert_eq!(
        period["start_of_period"]["data"]["total_assets"],
        1_000_000_000.0
    );
    assert_eq!(
        period["end_of_period"]["data"]["total_assets"],
        1_200_000_000.0
    );
    let growth = report["calculated_metrics"]["growth_rate_total_assets"]
        .as_f64()
        .unwrap();
    assert!((growth - 0.2).abs() < 1e-9);
    assert!(report["report_id"].as_str().unwrap().len() == 36);
}

#[test]
fn test_parse_vietnamese_columns() {
    let report = json_output(
        cmd()
            .arg("parse")
            .arg("tests/fixtures/reports/bang_can_doi_vi.txt")
            .arg("--pretty"),
    );
    let start = &report["financial_period"]["start_of_period"];
    let end = &report["financial_period"]["end_of_period"];
    assert_eq!(end["date"], "31/12/2023");
    assert_eq!(end["data"]["tong_tai_san"], 1_200_000_000.0);
    assert_eq!(end["data"]["tai_san_ngan_han"], 600_000_000.0);
    assert_eq!(end["data"]["tien_va_tuong_duong_tien"], 120_000_000.0);
    assert!(end["data"].get("hang_ton_kho").is_none());
    assert_eq!(start["data"]["hang_ton_kho"], 120_000_000.0);
    assert_eq!(start["data"]["no_phai_tra"], 500_000_000.0);
    let metrics = &report["calculated_metrics"];
    assert!((metrics["growth_rate"].as_f64().unwrap() - 0.2).abs() < 1e-9);
    assert!((metrics["debt_to_assets_end"].as_f64().unwrap() - 700.0 / 1200.0).abs() < 1e-9);
}

#[test]
fn test_parse_from_stdin_per_page() {
    let text = fs::read_to_string("tests/fixtures/reports/bang_can_doi_vi.txt").unwrap();
    let output = assert_cmd::Command::from_std(cmd())
        .arg("parse")
        .arg("--per-page")
        .write_stdin(text)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let reports = String::from_utf8(output)
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str::<Value>(line).unwrap())
        .collect::<Vec<_>>();
    assert_eq!(reports.len(), 2);
    assert_eq!(
        reports[1]["financial_period"]["start_of_period"]["data"]["tong_tai_san"],
        900_000_000.0
    );
    assert_ne!(reports[0]["report_id"], reports[1]["report_id"]);
}

#[test]
fn test_parse_single_period() {
    let snapshot = json_output(
        cmd()
            .arg("parse")
            .arg("tests/fixtures/reports/sections_en.txt")
            .arg("--period")
            .arg("end"),
    );
    assert_eq!(snapshot["date"], "31/12/2023");
    assert_eq!(snapshot["data"]["total_assets"], 1_200_000_000.0);
}

#[test]
fn test_parse_rejects_unknown_period() {
    cmd()
        .arg("parse")
        .arg("tests/fixtures/reports/sections_en.txt")
        .arg("--period")
        .arg("middle")
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown period"));
}

#[test]
fn test_parse_with_custom_labels() {
    let report = json_output(
        cmd()
            .arg("parse")
            .arg("tests/fixtures/reports/custom_labels.txt")
            .arg("--labels")
            .arg("tests/fixtures/config/labels.toml"),
    );
    assert_eq!(
        report["financial_period"]["start_of_period"]["data"]["cash"],
        -1000.0
    );
    assert_eq!(report["calculated_metrics"]["growth_rate"], -3.0);
    assert!(report["calculated_metrics"].get("debt_to_assets_start").is_none());
}

#[test]
fn test_parse_rejects_missing_labels_file() {
    cmd()
        .arg("parse")
        .arg("tests/fixtures/reports/sections_en.txt")
        .arg("--labels")
        .arg("tests/fixtures/config/does_not_exist.toml")
        .assert()
        .failure();
}

#[test]
fn test_parse_writes_output_file() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("reports/report.json");
    cmd()
        .arg("parse")
        .arg("tests/fixtures/reports/sections_en.txt")
        .arg("-o")
        .arg(&out)
        .assert()
        .success();
    let report: Value = serde_json::from_str(&fs::read_to_string(&out).unwrap()).unwrap();
    assert!(report["financial_period"].is_object());
}

#[test]
fn test_schema() {
    for schema_type in ["FinancialReport", "PeriodSnapshot", "ParserConfig"] {
        let schema = json_output(cmd().arg("schema").arg(schema_type));
        assert!(schema["properties"].is_object(), "{schema_type}");
    }
}

#[test]
fn test_ocr_missing_input_fails() {
    let dir = tempfile::tempdir().unwrap();
    cmd()
        .arg("ocr")
        .arg(dir.path().join("missing.pdf"))
        .arg("--tesseract-cmd")
        .arg("/nonexistent/tesseract")
        .assert()
        .failure();
}

#[test]
#[ignore = "Requires tesseract to be installed"]
fn test_ocr_image_with_report() {
    let dir = tempfile::tempdir().unwrap();
    let image_path = dir.path().join("blank.png");
    image_fixture(&image_path);
    let text_path = dir.path().join("blank.txt");
    let report_path = dir.path().join("blank.json");
    cmd()
        .arg("ocr")
        .arg(&image_path)
        .arg("-o")
        .arg(&text_path)
        .arg("--report")
        .arg(&report_path)
        .arg("--ocr-lang")
        .arg("eng")
        .assert()
        .success();
    assert!(text_path.exists());
    let report: Value =
        serde_json::from_str(&fs::read_to_string(&report_path).unwrap()).unwrap();
    assert!(report["report_id"].is_string());
}

/// Write a blank white page.
fn image_fixture(path: &std::path::Path) {
    image::GrayImage::from_pixel(200, 60, image::Luma([255]))
        .save(path)
        .unwrap();
}
