use std::env;
use std::fs;
use std::path::Path;

use secrecy::ExposeSecret;
use toml::Value;
use vitrine_core::config::{resolve_config_path, AppConfig, LoadOptions};

struct Field {
    key: &'static str,
    env_keys: &'static [&'static str],
    value: String,
}

impl Field {
    fn new(key: &'static str, env_keys: &'static [&'static str], value: impl Into<String>) -> Self {
        Self { key, env_keys, value: value.into() }
    }
}

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = resolve_config_path(None);
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for field in fields(&config) {
        let source = field_source(field.key, field.env_keys, config_file_doc.as_ref(), config_file_path.as_deref());
        lines.push(render_line(field.key, &field.value, source));
    }
    lines.join("\n")
}

fn fields(config: &AppConfig) -> Vec<Field> {
    let path_or_bundled =
        |path: &Option<std::path::PathBuf>| path.as_ref().map(|path| path.display().to_string()).unwrap_or_else(|| "<bundled>".to_string());

    vec![
        Field::new("database.url", &["VITRINE_DATABASE_URL"], &config.database.url),
        Field::new(
            "database.max_connections",
            &["VITRINE_DATABASE_MAX_CONNECTIONS"],
            config.database.max_connections.to_string(),
        ),
        Field::new("database.timeout_secs", &["VITRINE_DATABASE_TIMEOUT_SECS"], config.database.timeout_secs.to_string()),
        Field::new("catalog.products_path", &["VITRINE_CATALOG_PRODUCTS_PATH"], path_or_bundled(&config.catalog.products_path)),
        Field::new(
            "catalog.histories_path",
            &["VITRINE_CATALOG_HISTORIES_PATH"],
            path_or_bundled(&config.catalog.histories_path),
        ),
        Field::new("llm.provider", &["VITRINE_LLM_PROVIDER"], format!("{:?}", config.llm.provider)),
        Field::new("llm.model", &["VITRINE_LLM_MODEL"], &config.llm.model),
        Field::new("llm.base_url", &["VITRINE_LLM_BASE_URL"], config.llm.base_url.as_deref().unwrap_or("<unset>")),
        Field::new(
            "llm.api_key",
            &["VITRINE_LLM_API_KEY"],
            config.llm.api_key.as_ref().map(|key| redact_token(key.expose_secret())).unwrap_or_else(|| "<unset>".to_string()),
        ),
        Field::new("llm.jailbreak_screen", &["VITRINE_LLM_JAILBREAK_SCREEN"], config.llm.jailbreak_screen.to_string()),
        Field::new("payment.base_url", &["VITRINE_PAYMENT_BASE_URL"], &config.payment.base_url),
        Field::new(
            "payment.access_token",
            &["VITRINE_PAYMENT_ACCESS_TOKEN", "MERCADOPAGO_ACCESS_TOKEN"],
            config
                .payment
                .access_token
                .as_ref()
                .map(|token| redact_token(token.expose_secret()))
                .unwrap_or_else(|| "<unset>".to_string()),
        ),
        Field::new("payment.notification_url", &["VITRINE_PAYMENT_NOTIFICATION_URL"], &config.payment.notification_url),
        Field::new(
            "payment.webhook_secret",
            &["VITRINE_PAYMENT_WEBHOOK_SECRET"],
            if config.payment.webhook_secret.is_some() { "<redacted>" } else { "<unset>" },
        ),
        Field::new("server.bind_address", &["VITRINE_SERVER_BIND_ADDRESS"], &config.server.bind_address),
        Field::new("server.port", &["VITRINE_SERVER_PORT"], config.server.port.to_string()),
        Field::new("turns.queue_wait_secs", &["VITRINE_TURNS_QUEUE_WAIT_SECS"], config.turns.queue_wait_secs.to_string()),
        Field::new("logging.level", &["VITRINE_LOGGING_LEVEL", "VITRINE_LOG_LEVEL"], &config.logging.level),
        Field::new(
            "logging.format",
            &["VITRINE_LOGGING_FORMAT", "VITRINE_LOG_FORMAT"],
            format!("{:?}", config.logging.format),
        ),
    ]
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_keys: &[&str],
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_keys.iter().find(|key| env::var_os(key).is_some()) {
        return format!("env ({env_key})");
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

/// Keeps the provider prefix (`sk`, `APP_USR`, `TEST`) so operators can tell
/// which kind of credential is loaded.
fn redact_token(token: &str) -> String {
    let trimmed = token.trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    if let Some((prefix, _)) = trimmed.split_once('-') {
        return format!("{prefix}-***");
    }

    "<redacted>".to_string()
}
