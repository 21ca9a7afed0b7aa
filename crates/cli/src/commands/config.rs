use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use carecall_core::config::{AppConfig, LoadOptions};
use secrecy::ExposeSecret;
use toml::Value;

use crate::commands::CommandResult;

/// Prints the effective configuration with per-field provenance. Secrets are
/// redacted; the account SID is an identifier, not a secret, and prints as-is.
pub fn run() -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult {
                exit_code: 2,
                output: format!("config validation failed: {error}"),
            };
        }
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let auth_token = redact_secret(config.telephony.auth_token.expose_secret());
    let llm_api_key =
        if config.llm.api_key.is_some() { "<redacted>".to_string() } else { "<unset>".to_string() };

    let rows: Vec<(&str, String, &[&str])> = vec![
        ("database.url", config.database.url.clone(), &["CARECALL_DATABASE_URL"]),
        (
            "database.max_connections",
            config.database.max_connections.to_string(),
            &["CARECALL_DATABASE_MAX_CONNECTIONS"],
        ),
        (
            "database.timeout_secs",
            config.database.timeout_secs.to_string(),
            &["CARECALL_DATABASE_TIMEOUT_SECS"],
        ),
        (
            "telephony.account_sid",
            config.telephony.account_sid.clone(),
            &["CARECALL_TELEPHONY_ACCOUNT_SID"],
        ),
        ("telephony.auth_token", auth_token, &["CARECALL_TELEPHONY_AUTH_TOKEN"]),
        (
            "telephony.from_number",
            config.telephony.from_number.clone(),
            &["CARECALL_TELEPHONY_FROM_NUMBER"],
        ),
        (
            "telephony.api_base_url",
            config.telephony.api_base_url.clone(),
            &["CARECALL_TELEPHONY_API_BASE_URL"],
        ),
        ("llm.provider", format!("{:?}", config.llm.provider), &["CARECALL_LLM_PROVIDER"]),
        ("llm.model", config.llm.model.clone(), &["CARECALL_LLM_MODEL"]),
        (
            "llm.base_url",
            config.llm.base_url.clone().unwrap_or_else(|| "<unset>".to_string()),
            &["CARECALL_LLM_BASE_URL"],
        ),
        ("llm.api_key", llm_api_key, &["CARECALL_LLM_API_KEY"]),
        ("llm.timeout_secs", config.llm.timeout_secs.to_string(), &["CARECALL_LLM_TIMEOUT_SECS"]),
        ("llm.max_retries", config.llm.max_retries.to_string(), &["CARECALL_LLM_MAX_RETRIES"]),
        (
            "server.bind_address",
            config.server.bind_address.clone(),
            &["CARECALL_SERVER_BIND_ADDRESS"],
        ),
        ("server.port", config.server.port.to_string(), &["CARECALL_SERVER_PORT"]),
        (
            "server.graceful_shutdown_secs",
            config.server.graceful_shutdown_secs.to_string(),
            &["CARECALL_SERVER_GRACEFUL_SHUTDOWN_SECS"],
        ),
        (
            "intake.idle_ttl_secs",
            config.intake.idle_ttl_secs.to_string(),
            &["CARECALL_INTAKE_IDLE_TTL_SECS"],
        ),
        (
            "intake.sweep_interval_secs",
            config.intake.sweep_interval_secs.to_string(),
            &["CARECALL_INTAKE_SWEEP_INTERVAL_SECS"],
        ),
        (
            "intake.apology_line",
            config.intake.apology_line.clone(),
            &["CARECALL_INTAKE_APOLOGY_LINE"],
        ),
        (
            "logging.level",
            config.logging.level.clone(),
            &["CARECALL_LOGGING_LEVEL", "CARECALL_LOG_LEVEL"],
        ),
        (
            "logging.format",
            format!("{:?}", config.logging.format),
            &["CARECALL_LOGGING_FORMAT", "CARECALL_LOG_FORMAT"],
        ),
    ];

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for (key, value, env_keys) in rows {
        lines.push(render_line(
            key,
            &value,
            field_source(key, env_keys, config_file_doc.as_ref(), config_file_path.as_deref()),
        ));
    }

    CommandResult { exit_code: 0, output: lines.join("\n") }
}

fn detect_config_path() -> Option<PathBuf> {
    let root = PathBuf::from("carecall.toml");
    if root.exists() {
        return Some(root);
    }

    let nested = PathBuf::from("config/carecall.toml");
    if nested.exists() {
        return Some(nested);
    }

    None
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

/// Blank env vars do not override anything at load time, so they do not count
/// as a source here either.
fn field_source(
    key_path: &str,
    env_keys: &[&str],
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    for env_key in env_keys {
        let set = env::var(env_key).map(|value| !value.trim().is_empty()).unwrap_or(false);
        if set {
            return format!("env ({env_key})");
        }
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}

fn redact_secret(secret: &str) -> String {
    if secret.trim().is_empty() {
        "<empty>".to_string()
    } else {
        "<redacted>".to_string()
    }
}
