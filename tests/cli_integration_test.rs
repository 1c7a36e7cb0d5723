mod common;

use std::path::Path;
use std::process::{Command, Output};

use tempfile::TempDir;

/// Run the binary from an empty directory so no stray config file is picked up
fn run(args: &[&str]) -> Output {
    let cwd = TempDir::new().unwrap();
    Command::new(env!("CARGO_BIN_EXE_xml-mapping"))
        .args(args)
        .current_dir(cwd.path())
        .env_remove("RUST_LOG")
        .output()
        .expect("Failed to execute xml-mapping")
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

#[test]
fn test_cli_help_output() {
    let output = run(&["--help"]);

    assert!(output.status.success());
    let help = stdout(&output);
    for expected in ["validate", "inspect", "check", "classes", "--mapping-dir", "--format"] {
        assert!(help.contains(expected), "help is missing {}", expected);
    }
}

#[test]
fn test_classes_lists_mapped_classes() {
    let mapping_dir = path_arg(&common::mapping_dir());
    let output = run(&["classes", "-m", &mapping_dir]);

    assert!(output.status.success(), "{}", stderr(&output));
    let listed = stdout(&output);
    assert_eq!(listed.lines().count(), 11);
    assert!(listed.starts_with("Models.Cache.City\n"));
}

#[test]
fn test_inspect_as_json() {
    let mapping_dir = path_arg(&common::mapping_dir());
    let output = run(&[
        "inspect",
        "Models.Translation.Translation",
        "-m",
        &mapping_dir,
        "--format",
        "json",
    ]);

    assert!(output.status.success(), "{}", stderr(&output));
    let metadata: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
    assert_eq!(metadata["name"], "Models.Translation.Translation");
    assert_eq!(metadata["identifier"], serde_json::json!(["article", "locale"]));
    assert_eq!(metadata["table"]["name"], "article_translations");
}

#[test]
fn test_inspect_unknown_class() {
    let mapping_dir = path_arg(&common::mapping_dir());
    let output = run(&["inspect", "Models.Cti.Unmapped", "-m", &mapping_dir]);

    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("No mapping file found named 'Models.Cti.Unmapped.orm.xml'"));
}

#[test]
fn test_check_exit_codes() {
    let mapping_dir = path_arg(&common::mapping_dir());
    let output = run(&["check", "-m", &mapping_dir]);
    assert!(output.status.success(), "{}", stdout(&output));
    assert!(stdout(&output).contains("11 classes checked"));

    let errors_dir = path_arg(&common::mapping_errors_dir());
    let output = run(&["check", "-m", &errors_dir, "--format", "summary"]);
    assert_eq!(output.status.code(), Some(1));
    assert_eq!(stdout(&output).trim(), "4 classes: 4 issues");
}

#[test]
fn test_validate_with_and_without_expectations() {
    let invalid_dir = common::schema_invalid_dir();

    let output = run(&["validate", &path_arg(&invalid_dir)]);
    assert_eq!(output.status.code(), Some(1));
    assert!(stdout(&output).contains("Invalid: 5"));

    let output = run(&[
        "validate",
        &path_arg(&invalid_dir),
        "--expect",
        &path_arg(&invalid_dir.join("expectations.toml")),
        "--format",
        "summary",
    ]);
    assert!(output.status.success(), "{}", stdout(&output));
    assert_eq!(
        stdout(&output).trim(),
        "6 files: 1 valid, 5 invalid, 0 errors, 0 skipped, 0 unmet expectations"
    );
}

#[test]
fn test_validate_defaults_to_mapping_dirs() {
    let mapping_dir = path_arg(&common::mapping_dir());
    let output = run(&["validate", "-m", &mapping_dir, "--format", "json"]);

    assert!(output.status.success(), "{}", stderr(&output));
    let report: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
    assert_eq!(report["summary"]["valid_files"], 11);
}

#[test]
fn test_invalid_config_file() {
    let dir = TempDir::new().unwrap();
    let config = dir.path().join("xml-mapping.toml");
    std::fs::write(&config, "[validation]\nthreads = 0\n").unwrap();

    let output = run(&["classes", "--config", &path_arg(&config)]);

    assert_eq!(output.status.code(), Some(2));
    assert!(stderr(&output).contains("Number of threads must be greater than 0"));
}

#[test]
fn test_missing_mapping_dir() {
    let output = run(&["classes", "-m", "/nonexistent/mappings"]);

    assert_eq!(output.status.code(), Some(2));
    assert!(stderr(&output).contains("/nonexistent/mappings"));
}
