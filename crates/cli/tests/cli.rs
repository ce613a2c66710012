use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use serde_json::Value;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

const BASE_DIR_ENV: &str = "RECIPE_WRITER__GENERAL__BASE_DIR";

/// Lay out `oulib_tasks/{task}/derivative/{name}` with the given files
fn write_derivative(base: &Path, task: &str, name: &str, files: &[&str]) -> std::path::PathBuf {
    let dir = base
        .join("oulib_tasks")
        .join(task)
        .join("derivative")
        .join(name);
    fs::create_dir_all(&dir).expect("create derivative dir");
    for file in files {
        fs::write(dir.join(file), format!("contents of {}", file)).expect("write file");
    }
    dir
}

fn bag(base: &TempDir, task: &str) {
    let mut cmd = cargo_bin_cmd!("recipe-writer");
    cmd.current_dir(base.path())
        .env(BASE_DIR_ENV, base.path())
        .args(["bag", task])
        .assert()
        .success()
        .stdout(predicate::str::contains("Bagged"));
}

#[test]
fn config_init_writes_example_file() {
    let dir = TempDir::new().expect("temp dir");
    let config_path = dir.path().join("recipe-writer.toml");

    let mut cmd = cargo_bin_cmd!("recipe-writer");
    cmd.args(["config", "init", "--path"])
        .arg(&config_path)
        .assert()
        .success();

    let content = fs::read_to_string(&config_path).expect("read config");
    assert!(content.contains("base_dir"));
    assert!(content.contains("bucket = \"ul-bagit\""));
}

#[test]
fn config_init_refuses_to_overwrite() {
    let dir = TempDir::new().expect("temp dir");
    let config_path = dir.path().join("recipe-writer.toml");
    fs::write(&config_path, "# mine").expect("write config");

    let mut cmd = cargo_bin_cmd!("recipe-writer");
    cmd.args(["config", "init", "--path"])
        .arg(&config_path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));

    assert_eq!(fs::read_to_string(&config_path).expect("read config"), "# mine");
}

#[test]
fn bag_then_recipe_writes_recipe_file() {
    let base = TempDir::new().expect("temp dir");
    let package = write_derivative(base.path(), "t1", "bag1", &["002.tif", "001.tif", "notes.txt"]);

    bag(&base, "t1");
    assert!(package.join("bagit.txt").is_file());
    assert!(package.join("data").join("001.tif").is_file());

    let mut cmd = cargo_bin_cmd!("recipe-writer");
    let output = cmd
        .current_dir(base.path())
        .env(BASE_DIR_ENV, base.path())
        .args(["recipe", "t1", "--title", "Sidereus nuncius", "--json"])
        .output()
        .expect("run recipe");

    assert!(output.status.success());

    let lines: Value = serde_json::from_slice(&output.stdout).expect("valid json");
    assert_eq!(lines[0]["package"], "bag1");
    assert_eq!(lines[0]["status"], "written");
    assert_eq!(lines[0]["pages"], 2);

    let recipe: Value =
        serde_json::from_slice(&fs::read(package.join("bag1.json")).expect("read recipe"))
            .expect("recipe json");
    let pages = recipe["recipe"]["pages"].as_array().expect("pages");
    assert_eq!(recipe["recipe"]["label"], "Sidereus nuncius");
    assert_eq!(recipe["recipe"]["update"], "false");
    assert_eq!(pages.len(), 2);
    assert_eq!(pages[0]["label"], "Image 1");
    assert_eq!(
        pages[0]["file"],
        "https://bag.ou.edu/derivative/bag1/data/001.tif"
    );
    assert_eq!(pages[0]["exif"], "001.tif.exif.txt");
    assert!(pages[0].get("md5").is_some());
}

#[test]
fn recipe_fails_on_malformed_manifest() {
    let base = TempDir::new().expect("temp dir");
    let package = write_derivative(base.path(), "t1", "bag1", &["001.tif"]);

    bag(&base, "t1");
    fs::write(package.join("manifest-md5.txt"), "not a manifest line\n").expect("corrupt manifest");

    let mut cmd = cargo_bin_cmd!("recipe-writer");
    cmd.current_dir(base.path())
        .env(BASE_DIR_ENV, base.path())
        .args(["recipe", "t1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Malformed manifest line"));

    assert!(!package.join("bag1.json").exists());
}

#[test]
fn recipe_cookbook_writes_one_recipe_per_row() {
    let base = TempDir::new().expect("temp dir");
    let first = write_derivative(base.path(), "t1", "bag1", &["001.tif"]);
    let second = write_derivative(base.path(), "t1", "bag2", &["001.tif"]);
    let untouched = write_derivative(base.path(), "t1", "bag3", &["001.tif"]);
    bag(&base, "t1");

    let cookbook = base.path().join("cookbook.csv");
    fs::write(
        &cookbook,
        "MMS ID,Title,File name\n\
         9911,Sidereus nuncius,bag1\n\
         9922,Harmonices mundi,bag2\n\
         9933,,bag3\n",
    )
    .expect("write cookbook");

    let mut cmd = cargo_bin_cmd!("recipe-writer");
    let output = cmd
        .current_dir(base.path())
        .env(BASE_DIR_ENV, base.path())
        .env(
            "RECIPE_WRITER__BIBLIOGRAPHIC__API_KEY_PATH",
            base.path().join("no-key"),
        )
        .args(["recipe", "t1", "--json", "--cookbook"])
        .arg(&cookbook)
        .output()
        .expect("run recipe");

    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("Skipped 1 cookbook rows"));

    let lines: Value = serde_json::from_slice(&output.stdout).expect("valid json");
    assert_eq!(lines.as_array().expect("lines").len(), 2);
    assert_eq!(lines[0]["package"], "bag1");
    assert_eq!(lines[0]["label"], "Sidereus nuncius");
    assert_eq!(lines[1]["package"], "bag2");
    assert_eq!(lines[1]["label"], "Harmonices mundi");

    assert!(first.join("bag1.json").is_file());
    assert!(second.join("bag2.json").is_file());
    assert!(!untouched.join("bag3.json").exists());
}

#[test]
fn recipe_cookbook_conflicts_with_title() {
    let mut cmd = cargo_bin_cmd!("recipe-writer");
    cmd.args(["recipe", "t1", "--cookbook", "rows.csv", "--title", "x"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("cannot be used with"));
}

#[test]
fn process_dry_run_reports_recipe_urls() {
    let base = TempDir::new().expect("temp dir");
    write_derivative(base.path(), "t1", "bag1", &["001.tif"]);
    write_derivative(base.path(), "t1", "bag2", &["001.tif"]);

    let mut cmd = cargo_bin_cmd!("recipe-writer");
    let output = cmd
        .current_dir(base.path())
        .env(BASE_DIR_ENV, base.path())
        .args([
            "process",
            "--task-id",
            "t1",
            "--bags",
            "bag1,bag2",
            "--format-params",
            "jpeg_040_antialias",
            "--dry-run",
            "--json",
        ])
        .output()
        .expect("run process");

    assert!(output.status.success());

    let report: Value = serde_json::from_slice(&output.stdout).expect("valid json");
    assert_eq!(report["task_id"], "t1");
    assert_eq!(
        report["recipe_urls"],
        serde_json::json!([
            "https://bag.ou.edu/derivative/bag1/jpeg_040_antialias/bag1.json",
            "https://bag.ou.edu/derivative/bag2/jpeg_040_antialias/bag2.json"
        ])
    );
    assert!(report.get("error").is_none());
}

#[test]
fn process_unknown_package_fails() {
    let base = TempDir::new().expect("temp dir");
    write_derivative(base.path(), "t1", "bag1", &["001.tif"]);

    let mut cmd = cargo_bin_cmd!("recipe-writer");
    cmd.current_dir(base.path())
        .env(BASE_DIR_ENV, base.path())
        .args(["process", "--task-id", "t1", "--bags", "missing", "--dry-run"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("✗ missing"))
        .stderr(predicate::str::contains("1 of 1 packages failed"));
}

#[test]
fn process_input_without_task_id_fails() {
    let base = TempDir::new().expect("temp dir");
    let input = base.path().join("task.json");
    fs::write(&input, r#"{"s3_bags": ["bag1"]}"#).expect("write input");

    let mut cmd = cargo_bin_cmd!("recipe-writer");
    cmd.current_dir(base.path())
        .env(BASE_DIR_ENV, base.path())
        .args(["process", "--dry-run", "--input"])
        .arg(&input)
        .assert()
        .failure()
        .stderr(predicate::str::contains("missing task_id"));
}

#[test]
fn doctor_outputs_valid_json() {
    let base = TempDir::new().expect("temp dir");
    fs::create_dir_all(base.path().join("oulib_tasks")).expect("create tasks dir");

    let mut cmd = cargo_bin_cmd!("recipe-writer");
    let output = cmd
        .current_dir(base.path())
        .env(BASE_DIR_ENV, base.path())
        .args(["doctor", "--json"])
        .output()
        .expect("run doctor");

    assert!(output.status.success());

    let report: Value = serde_json::from_slice(&output.stdout).expect("valid json");
    assert_eq!(report["namespace"]["status"], "ok");
    assert_eq!(report["config"]["status"], "ok");
    assert_eq!(report["base_dir"]["status"], "ok");
    assert!(report.get("overall").is_some());
}

#[test]
fn doctor_fails_on_missing_base_dir() {
    let base = TempDir::new().expect("temp dir");

    let mut cmd = cargo_bin_cmd!("recipe-writer");
    cmd.current_dir(base.path())
        .env(BASE_DIR_ENV, base.path().join("nowhere"))
        .args(["doctor"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("Base directory does not exist"));
}
