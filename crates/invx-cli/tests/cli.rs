use assert_cmd::Command;
use predicates::prelude::*;

fn invx() -> Command {
    Command::cargo_bin("invx").unwrap()
}

fn write_config(dir: &std::path::Path, api_key_env: &str) -> std::path::PathBuf {
    let path = dir.join("config.json");
    let config = serde_json::json!({
        "service": { "api_key_env": api_key_env },
        "rate_limit": { "min_interval_ms": 0 }
    });
    std::fs::write(&path, config.to_string()).unwrap();
    path
}

#[test]
fn test_help_lists_subcommands() {
    invx()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("process"))
        .stdout(predicate::str::contains("analyze"))
        .stdout(predicate::str::contains("serve"));
}

#[test]
fn test_config_show_merges_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path(), "CUSTOM_KEY_VAR");

    invx()
        .arg("--config")
        .arg(&config)
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"api_key_env\": \"CUSTOM_KEY_VAR\""))
        .stdout(predicate::str::contains("\"interval_secs\": 10"));
}

#[test]
fn test_config_get_dotted_key() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path(), "CUSTOM_KEY_VAR");

    invx()
        .arg("--config")
        .arg(&config)
        .args(["config", "get", "rate_limit.min_interval_ms"])
        .assert()
        .success()
        .stdout(predicate::str::diff("0\n"));
}

#[test]
fn test_missing_api_key_fails_before_processing() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path(), "INVX_TEST_UNSET_API_KEY");
    let input = dir.path().join("invoice.pdf");
    std::fs::write(&input, b"%PDF-1.4").unwrap();

    invx()
        .env_remove("INVX_TEST_UNSET_API_KEY")
        .arg("--config")
        .arg(&config)
        .arg("process")
        .arg(&input)
        .assert()
        .failure()
        .stderr(predicate::str::contains("INVX_TEST_UNSET_API_KEY"));
}

#[test]
fn test_missing_input_file() {
    invx()
        .args(["process", "/nonexistent/invoice.pdf"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Input file not found"));
}

#[test]
fn test_explicit_config_must_exist() {
    invx()
        .args(["--config", "/nonexistent/invx.json", "process", "x.pdf"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Config file not found"));
}
