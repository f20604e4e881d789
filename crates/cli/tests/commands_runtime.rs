use std::env;
use std::sync::{Mutex, OnceLock};

use comanda_cli::commands::{migrate, sweep};
use serde_json::Value;

const SANDBOX_KEY: &str = "sq7HjrUOBfKmC576ILgskD5srU870gJ7";

#[test]
fn migrate_returns_success_with_valid_env() {
    with_env(&valid_env("sqlite::memory:"), || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 0, "expected successful migrate run: {}", result.output);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "migrate");
        assert_eq!(payload["status"], "ok");
    });
}

#[test]
fn migrate_returns_config_failure_without_secrets() {
    with_env(&[("COMANDA_DATABASE_URL", "sqlite::memory:")], || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 2, "expected config validation failure code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "config_validation");
    });
}

#[test]
fn sweep_runs_against_a_migrated_database() {
    let directory = tempfile::tempdir().expect("tempdir");
    let url = format!("sqlite://{}?mode=rwc", directory.path().join("comanda.db").display());

    with_env(&valid_env(&url), || {
        assert_eq!(migrate::run().exit_code, 0);

        let result = sweep::run(Some(48));
        assert_eq!(result.exit_code, 0, "expected successful sweep: {}", result.output);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "sweep");
        assert_eq!(payload["status"], "ok");
        assert_eq!(payload["message"], "purged 0 processed-message marker(s) older than 48h");
    });
}

#[test]
fn sweep_fails_before_migrations_are_applied() {
    with_env(&valid_env("sqlite::memory:"), || {
        let result = sweep::run(None);
        assert_eq!(result.exit_code, 5);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["error_class"], "sweep");
    });
}

#[test]
fn sweep_rejects_zero_retention() {
    with_env(&valid_env("sqlite::memory:"), || {
        let result = sweep::run(Some(0));
        assert_eq!(result.exit_code, 2);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["error_class"], "invalid_argument");
    });
}

fn valid_env(database_url: &str) -> Vec<(&'static str, String)> {
    vec![
        ("COMANDA_DATABASE_URL", database_url.to_string()),
        ("COMANDA_LLM_API_KEY", "sk-test".to_string()),
        ("COMANDA_WHATSAPP_VERIFY_TOKEN", "verify-me".to_string()),
        ("COMANDA_PAYMENT_SECRET_KEY", SANDBOX_KEY.to_string()),
    ]
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

fn with_env<V: AsRef<str>>(vars: &[(&str, V)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard =
        ENV_LOCK.get_or_init(|| Mutex::new(())).lock().expect("env mutex should not be poisoned");

    let keys = [
        "COMANDA_DATABASE_URL",
        "COMANDA_DATABASE_MAX_CONNECTIONS",
        "COMANDA_DATABASE_TIMEOUT_SECS",
        "COMANDA_WHATSAPP_VERIFY_TOKEN",
        "COMANDA_WHATSAPP_ACCESS_TOKEN",
        "COMANDA_LLM_API_KEY",
        "COMANDA_LLM_MODEL",
        "COMANDA_PAYMENT_SECRET_KEY",
        "COMANDA_IDEMPOTENCY_RETENTION_HOURS",
        "COMANDA_LLM_PROVIDER",
        "COMANDA_LOG_LEVEL",
        "COMANDA_LOG_FORMAT",
    ];

    let previous_values: Vec<(&str, Option<String>)> =
        keys.iter().map(|key| (*key, env::var(key).ok())).collect();

    for key in &keys {
        env::remove_var(key);
    }
    for (key, value) in vars {
        env::set_var(key, value.as_ref());
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
