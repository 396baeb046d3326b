use std::env;
use std::fs;
use std::path::Path;

use budgetflow_core::config::{resolve_config_path, AppConfig, ConfigOverrides};
use secrecy::ExposeSecret;
use toml::Value;

use crate::commands::{load_config, CommandResult};

pub fn run(config_path: Option<&Path>) -> CommandResult {
    let config = match load_config("config", config_path, ConfigOverrides::default()) {
        Ok(config) => config,
        Err(failure) => return failure,
    };

    let file_path = resolve_config_path(config_path);
    let file_doc = load_config_file_doc(file_path.as_deref());

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for (key, value, env_keys) in effective_values(&config) {
        let source = field_source(key, env_keys, file_doc.as_ref(), file_path.as_deref());
        lines.push(format!("- {key} = {value} (source: {source})"));
    }

    CommandResult::report(lines.join("\n"))
}

fn effective_values(config: &AppConfig) -> Vec<(&'static str, String, &'static [&'static str])> {
    let token = match &config.api.token {
        Some(token) => redact_token(token.expose_secret()),
        None => "<unset>".to_string(),
    };

    vec![
        entry("api.base_url", config.api.base_url.clone(), &["BUDGETFLOW_API_BASE_URL"]),
        entry("api.token", token, &["BUDGETFLOW_API_TOKEN"]),
        entry(
            "api.timeout_secs",
            config.api.timeout_secs.to_string(),
            &["BUDGETFLOW_API_TIMEOUT_SECS"],
        ),
        entry(
            "api.max_attempts",
            config.api.max_attempts.to_string(),
            &["BUDGETFLOW_API_MAX_ATTEMPTS"],
        ),
        entry("api.backoff_ms", config.api.backoff_ms.to_string(), &["BUDGETFLOW_API_BACKOFF_MS"]),
        entry(
            "flow.rejection_policy",
            format!("{:?}", config.flow.rejection_policy).to_lowercase(),
            &["BUDGETFLOW_FLOW_REJECTION_POLICY"],
        ),
        entry(
            "logging.level",
            config.logging.level.clone(),
            &["BUDGETFLOW_LOGGING_LEVEL", "BUDGETFLOW_LOG_LEVEL"],
        ),
        entry(
            "logging.format",
            format!("{:?}", config.logging.format).to_lowercase(),
            &["BUDGETFLOW_LOGGING_FORMAT", "BUDGETFLOW_LOG_FORMAT"],
        ),
    ]
}

fn entry(
    key: &'static str,
    value: String,
    env_keys: &'static [&'static str],
) -> (&'static str, String, &'static [&'static str]) {
    (key, value, env_keys)
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let raw = fs::read_to_string(path?).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_keys: &[&str],
    file_doc: Option<&Value>,
    file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_keys.iter().find(|key| env::var_os(key).is_some()) {
        return format!("env ({env_key})");
    }

    if file_doc.map(|doc| contains_path(doc, key_path)).unwrap_or(false) {
        let file_path = file_path
            .map(|path| path.display().to_string())
            .unwrap_or_else(|| "config file".to_string());
        return format!("file ({file_path})");
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

/// Keeps at most the first four characters of a token.
fn redact_token(token: &str) -> String {
    let trimmed = token.trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }
    if trimmed.len() <= 8 {
        return "<redacted>".to_string();
    }

    let prefix: String = trimmed.chars().take(4).collect();
    format!("{prefix}***")
}
