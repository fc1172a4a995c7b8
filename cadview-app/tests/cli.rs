use std::path::{Path, PathBuf};

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;

fn fixture() -> PathBuf {
    let mut path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    path.push("../cadview-io/tests/data/floor_plan.dxf");
    path
}

fn write_config(dir: &Path) -> PathBuf {
    let path = dir.join("cadview.toml");
    let output_dir = dir.join("rendered");
    std::fs::write(
        &path,
        format!(
            "[logging]\nlevel = \"warn\"\n\n[render]\noutput_dir = {:?}\nthumbnail_size = 64\n",
            output_dir.display().to_string()
        ),
    )
    .expect("写入配置失败");
    path
}

fn cadview(dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("cadview").expect("应能找到 cadview 可执行文件");
    cmd.current_dir(dir).env("CADVIEW_CONFIG", write_config(dir));
    cmd
}

fn stdout_json(output: &[u8]) -> Value {
    serde_json::from_slice(output).expect("stdout 应为 JSON")
}

#[test]
fn bounds_prints_json_record() {
    let dir = tempfile::tempdir().expect("应创建临时目录");
    let output = cadview(dir.path())
        .arg("bounds")
        .arg(fixture())
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let value = stdout_json(&output);
    assert_eq!(value["success"], Value::Bool(true));
    assert_eq!(value["bounds"]["max_x"], serde_json::json!(6000.0));
    assert_eq!(value["raw_entity_count"], serde_json::json!(4));
}

#[test]
fn missing_file_exits_with_failure_record() {
    let dir = tempfile::tempdir().expect("应创建临时目录");
    cadview(dir.path())
        .args(["bounds", "no-such-file.dxf"])
        .assert()
        .code(1)
        .stdout(predicate::str::contains("\"success\": false"))
        .stdout(predicate::str::contains("\"error\""));
}

#[test]
fn render_writes_requested_output() {
    let dir = tempfile::tempdir().expect("应创建临时目录");
    let target = dir.path().join("out").join("walls.png");
    let output = cadview(dir.path())
        .arg("render")
        .arg(fixture())
        .args(["--x", "-100", "--y", "-100", "--width", "6200", "--height", "2400"])
        .args(["--size", "310x120", "--layer", "WALL"])
        .arg("--output")
        .arg(&target)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let value = stdout_json(&output);
    assert_eq!(value["output_size"], serde_json::json!([310, 120]));
    assert_eq!(value["scale"], serde_json::json!(0.05));
    assert!(target.exists());
}

#[test]
fn invalid_region_is_reported() {
    let dir = tempfile::tempdir().expect("应创建临时目录");
    cadview(dir.path())
        .arg("inspect")
        .arg(fixture())
        .args(["--x", "0", "--y", "0", "--width", "0", "--height", "10"])
        .assert()
        .code(1)
        .stdout(predicate::str::contains("\"success\": false"));
}

#[test]
fn entities_honour_type_filter_and_limit() {
    let dir = tempfile::tempdir().expect("应创建临时目录");
    let output = cadview(dir.path())
        .arg("entities")
        .arg(fixture())
        .args(["--type", "line", "--limit", "1"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let value = stdout_json(&output);
    assert_eq!(value["total_count"], serde_json::json!(2));
    assert_eq!(value["entities"].as_array().map(Vec::len), Some(1));
    assert_eq!(value["entities"][0]["type"], serde_json::json!("LINE"));
}

#[test]
fn metadata_uses_configured_output_dir() {
    let dir = tempfile::tempdir().expect("应创建临时目录");
    let output = cadview(dir.path())
        .arg("metadata")
        .arg(fixture())
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let value = stdout_json(&output);
    assert_eq!(value["layer_count"], serde_json::json!(4));
    assert_eq!(value["bounds_source"], serde_json::json!("renderable_entities"));
    let thumbnail = value["thumbnail"].as_str().expect("应有缩略图路径");
    assert!(Path::new(thumbnail).starts_with(dir.path().join("rendered")));
    assert!(Path::new(thumbnail).exists());
}
