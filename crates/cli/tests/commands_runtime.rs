use std::env;
use std::sync::{Mutex, OnceLock};

use closeflow_cli::commands::{migrate, seed};
use serde_json::Value;

#[test]
fn migrate_returns_success_against_an_in_memory_database() {
    let attachment_dir = tempfile::tempdir().expect("tempdir");
    with_env(
        &[
            ("CLOSEFLOW_DATABASE_URL", "sqlite::memory:"),
            ("CLOSEFLOW_DB_MAX_CONNECTIONS", "1"),
            ("CLOSEFLOW_ATTACHMENT_DIR", attachment_dir.path().to_str().expect("utf8 path")),
        ],
        || {
            let result = migrate::run();
            assert_eq!(result.exit_code, 0, "expected successful migrate run");

            let payload = parse_payload(&result.output);
            assert_eq!(payload["command"], "migrate");
            assert_eq!(payload["status"], "ok");
        },
    );
}

#[test]
fn migrate_reports_connectivity_failures() {
    with_env(&[("CLOSEFLOW_DATABASE_URL", "sqlite:///nonexistent-dir/closeflow.db")], || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 4, "expected db connectivity failure code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "migrate");
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "db_connectivity");
    });
}

#[test]
fn migrate_reports_invalid_configuration() {
    with_env(&[("CLOSEFLOW_LOG_LEVEL", "verbose")], || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 2, "expected config validation failure code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "migrate");
        assert_eq!(payload["error_class"], "config_validation");
    });
}

#[test]
fn seed_loads_the_demo_dataset_and_reports_it() {
    let attachment_dir = tempfile::tempdir().expect("tempdir");
    with_env(
        &[
            ("CLOSEFLOW_DATABASE_URL", "sqlite::memory:"),
            ("CLOSEFLOW_DB_MAX_CONNECTIONS", "1"),
            ("CLOSEFLOW_ATTACHMENT_DIR", attachment_dir.path().to_str().expect("utf8 path")),
        ],
        || {
            let result = seed::run();
            assert_eq!(result.exit_code, 0, "expected deterministic seed success");

            let payload = parse_payload(&result.output);
            assert_eq!(payload["command"], "seed");
            assert_eq!(payload["status"], "ok");

            let message = payload["message"].as_str().unwrap_or("");
            assert!(message.contains("CT-DEMO-0001: Aurora Logistics (approved end to end)"));
            assert!(message
                .contains("CT-DEMO-0002: Borealis Mining (sent back, awaiting resubmission)"));
            assert!(message.contains("CT-DEMO-0003: Cascade Retail (waiting in manager review)"));
        },
    );
}

#[test]
fn seed_is_idempotent_across_runs_on_the_same_database() {
    let database_dir = tempfile::tempdir().expect("tempdir");
    let database_path = database_dir.path().join("closeflow-seed.db");
    let database_url = format!("sqlite://{}?mode=rwc", database_path.display());
    let attachment_dir = tempfile::tempdir().expect("tempdir");

    with_env(
        &[
            ("CLOSEFLOW_DATABASE_URL", database_url.as_str()),
            ("CLOSEFLOW_ATTACHMENT_DIR", attachment_dir.path().to_str().expect("utf8 path")),
        ],
        || {
            let first = seed::run();
            assert_eq!(first.exit_code, 0, "expected first seed invocation success");
            let first_payload = parse_payload(&first.output);
            assert_eq!(first_payload["status"], "ok");

            let second = seed::run();
            assert_eq!(second.exit_code, 0, "expected second seed invocation success");
            let second_payload = parse_payload(&second.output);
            assert_eq!(second_payload["status"], "ok");

            assert_eq!(first_payload["message"], second_payload["message"]);
        },
    );
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard =
        ENV_LOCK.get_or_init(|| Mutex::new(())).lock().expect("env mutex should not be poisoned");

    let keys = [
        "CLOSEFLOW_CONFIG",
        "CLOSEFLOW_DATABASE_URL",
        "CLOSEFLOW_DB_MAX_CONNECTIONS",
        "CLOSEFLOW_DB_TIMEOUT_SECS",
        "CLOSEFLOW_BIND_ADDRESS",
        "CLOSEFLOW_PORT",
        "CLOSEFLOW_ATTACHMENT_DIR",
        "CLOSEFLOW_LOG_LEVEL",
        "CLOSEFLOW_LOG_FORMAT",
    ];

    let previous_values: Vec<(&str, Option<String>)> =
        keys.iter().map(|key| (*key, env::var(key).ok())).collect();

    for key in &keys {
        env::remove_var(key);
    }
    // Tests must not pick up a developer's closeflow.toml from the
    // working directory.
    env::set_var("CLOSEFLOW_CONFIG", "/nonexistent/closeflow-test.toml");
    for (key, value) in vars {
        env::set_var(key, value);
    }

    test_fn();

    for (key, value) in previous_values {
        if let Some(value) = value {
            env::set_var(key, value);
        } else {
            env::remove_var(key);
        }
    }
}
