//! End-to-end tests for the `airq` binary.

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::{json, Value};
use std::fs;
use tempfile::TempDir;

fn airq(temp_dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("airq").unwrap();
    cmd.current_dir(temp_dir.path())
        .env("HOME", temp_dir.path())
        .env_remove("AIRQ_ARTIFACT_ROOT")
        .env_remove("AIRQ_LOG_LEVEL");
    cmd
}

/// Small forests keep the debug-build tests fast.
fn write_local_config(temp_dir: &TempDir) {
    fs::write(
        temp_dir.path().join("airq.toml"),
        "artifact_root = \"models\"\nlog_level = \"warn\"\n\n[trainer]\nn_estimators = 10\n",
    )
    .unwrap();
}

fn record(i: usize) -> Value {
    let x = i as f64;
    let condition = ["Clear", "Clouds", "Rain"][i % 3];
    json!({
        "current_weather": {
            "temperature": 15.0 + (x * 1.7) % 20.0,
            "humidity": 40.0 + (x * 3.1) % 50.0,
            "pressure": 1000.0 + x % 25.0,
            "wind_speed": 1.0 + (x * 0.37) % 6.0,
            "wind_direction": (x * 29.0) % 360.0,
            "visibility": 9000.0,
            "weather_condition": condition
        },
        "current_pollution": {
            "pm2_5": 12.0 + (x * 5.3) % 80.0,
            "pm10": 20.0 + (x * 7.1) % 120.0,
            "no2": 5.0 + (x * 2.3) % 40.0,
            "o3": 30.0 + (x * 4.9) % 60.0,
            "aqi": 1.0 + x % 5.0
        },
        "collected_at": format!("2024-03-{:02}T{:02}:00:00", 1 + i % 28, i % 24)
    })
}

fn write_jsonl(temp_dir: &TempDir, name: &str, count: usize) -> std::path::PathBuf {
    let lines: Vec<String> = (0..count).map(|i| record(i).to_string()).collect();
    let path = temp_dir.path().join(name);
    fs::write(&path, lines.join("\n")).unwrap();
    path
}

#[test]
fn test_help_lists_commands() {
    let temp_dir = TempDir::new().unwrap();
    airq(&temp_dir)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("train"))
        .stdout(predicate::str::contains("predict"))
        .stdout(predicate::str::contains("importance"));
}

#[test]
fn test_versions_empty_store() {
    let temp_dir = TempDir::new().unwrap();
    write_local_config(&temp_dir);

    let output = airq(&temp_dir).args(["versions", "--json"]).output().unwrap();
    assert!(output.status.success());
    let parsed: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(parsed, json!([]));
}

#[test]
fn test_predict_without_models_fails() {
    let temp_dir = TempDir::new().unwrap();
    write_local_config(&temp_dir);
    let input = temp_dir.path().join("obs.json");
    fs::write(&input, record(3).to_string()).unwrap();

    airq(&temp_dir)
        .arg("predict")
        .arg(&input)
        .assert()
        .failure()
        .stderr(predicate::str::contains("No trained models"));
}

#[test]
fn test_train_with_empty_buffer_fails() {
    let temp_dir = TempDir::new().unwrap();
    write_local_config(&temp_dir);

    airq(&temp_dir)
        .arg("train")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Observation buffer is empty"));
}

#[test]
fn test_importance_rejects_unknown_target() {
    let temp_dir = TempDir::new().unwrap();
    write_local_config(&temp_dir);

    airq(&temp_dir).args(["importance", "methane"]).assert().failure();
}

#[test]
fn test_collect_train_predict_flow() {
    let temp_dir = TempDir::new().unwrap();
    write_local_config(&temp_dir);
    let data = write_jsonl(&temp_dir, "history.jsonl", 30);

    airq(&temp_dir)
        .arg("collect")
        .arg(&data)
        .assert()
        .success()
        .stdout(predicate::str::contains("30 record(s)"));

    let output = airq(&temp_dir).args(["train", "--json"]).output().unwrap();
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    let report: Value = serde_json::from_slice(&output.stdout).unwrap();
    let version = report["version"].as_str().unwrap().to_string();
    assert_eq!(report["metrics"].as_object().unwrap().len(), 5);
    assert!(temp_dir.path().join("models").join(&version).join("manifest.json").exists());

    let input = temp_dir.path().join("obs.json");
    fs::write(&input, record(40).to_string()).unwrap();
    let output = airq(&temp_dir).arg("predict").arg(&input).arg("--json").output().unwrap();
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    let prediction: Value = serde_json::from_slice(&output.stdout).unwrap();
    for target in ["pm2_5", "pm10", "no2", "o3", "aqi"] {
        assert!(prediction[target].as_f64().unwrap() >= 0.0, "{target}");
    }

    let output = airq(&temp_dir).args(["versions", "--json"]).output().unwrap();
    let versions: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(versions[0]["version"], Value::String(version));
}

#[test]
fn test_importance_after_training() {
    let temp_dir = TempDir::new().unwrap();
    write_local_config(&temp_dir);
    let data = write_jsonl(&temp_dir, "history.jsonl", 25);

    airq(&temp_dir).arg("train").arg("--data").arg(&data).assert().success();

    let output = airq(&temp_dir).args(["importance", "pm2_5", "--top", "3", "--json"]).output().unwrap();
    assert!(output.status.success());
    let ranked: Value = serde_json::from_slice(&output.stdout).unwrap();
    let ranked = ranked.as_array().unwrap();
    assert_eq!(ranked.len(), 3);
    let first = ranked[0]["importance"].as_f64().unwrap();
    let last = ranked[2]["importance"].as_f64().unwrap();
    assert!(first >= last);
}

#[test]
fn test_batch_predicts_each_record() {
    let temp_dir = TempDir::new().unwrap();
    write_local_config(&temp_dir);
    let data = write_jsonl(&temp_dir, "history.jsonl", 25);
    airq(&temp_dir).arg("train").arg("--data").arg(&data).assert().success();

    let batch = write_jsonl(&temp_dir, "batch.jsonl", 4);
    let output = airq(&temp_dir).arg("batch").arg(&batch).arg("--json").output().unwrap();
    assert!(output.status.success());
    let results: Value = serde_json::from_slice(&output.stdout).unwrap();
    let results = results.as_array().unwrap();
    assert_eq!(results.len(), 4);
    assert!(results.iter().all(|r| r.get("prediction").is_some()));
}

#[test]
fn test_info_without_models() {
    let temp_dir = TempDir::new().unwrap();
    write_local_config(&temp_dir);

    airq(&temp_dir)
        .arg("info")
        .assert()
        .success()
        .stdout(predicate::str::contains("No trained models found"));
}

#[test]
fn test_info_reports_trained_version() {
    let temp_dir = TempDir::new().unwrap();
    write_local_config(&temp_dir);
    let data = write_jsonl(&temp_dir, "history.jsonl", 25);

    let output = airq(&temp_dir).args(["train", "--json"]).arg("--data").arg(&data).output().unwrap();
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    let report: Value = serde_json::from_slice(&output.stdout).unwrap();
    let version = report["version"].as_str().unwrap().to_string();

    airq(&temp_dir)
        .arg("info")
        .assert()
        .success()
        .stdout(predicate::str::contains(version))
        .stdout(predicate::str::contains("No trained models found").not());
}
