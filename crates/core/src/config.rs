use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_CONFIG_FILE: &str = "vitrine.toml";
pub const NESTED_CONFIG_FILE: &str = "config/vitrine.toml";

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub catalog: CatalogConfig,
    pub llm: LlmConfig,
    pub payment: PaymentConfig,
    pub server: ServerConfig,
    pub turns: TurnsConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

/// Optional replacements for the bundled datasets.
#[derive(Clone, Debug, Default)]
pub struct CatalogConfig {
    pub products_path: Option<PathBuf>,
    pub histories_path: Option<PathBuf>,
}

#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    pub api_key: Option<SecretString>,
    pub base_url: Option<String>,
    pub model: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub jailbreak_screen: bool,
}

#[derive(Clone, Debug)]
pub struct PaymentConfig {
    pub access_token: Option<SecretString>,
    pub base_url: String,
    pub notification_url: String,
    pub webhook_secret: Option<SecretString>,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug)]
pub struct TurnsConfig {
    pub queue_wait_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmProvider {
    OpenAi,
    Ollama,
    Offline,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub llm_provider: Option<LlmProvider>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://vitrine.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            catalog: CatalogConfig::default(),
            llm: LlmConfig {
                provider: LlmProvider::Offline,
                api_key: None,
                base_url: None,
                model: "gpt-4o-mini".to_string(),
                timeout_secs: 30,
                max_retries: 2,
                jailbreak_screen: false,
            },
            payment: PaymentConfig {
                access_token: None,
                base_url: "https://api.mercadopago.com".to_string(),
                notification_url: "https://opticasolar.com/webhooks/mercadopago".to_string(),
                webhook_secret: None,
                timeout_secs: 15,
            },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 8080,
                graceful_shutdown_secs: 15,
            },
            turns: TurnsConfig { queue_wait_secs: 10 },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for LlmProvider {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "openai" | "open_ai" => Ok(Self::OpenAi),
            "ollama" => Ok(Self::Ollama),
            "offline" => Ok(Self::Offline),
            other => Err(ConfigError::Validation(format!(
                "unsupported llm provider `{other}` (expected openai|ollama|offline)"
            ))),
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl LlmConfig {
    /// Chat-completions root for the configured provider.
    pub fn effective_base_url(&self) -> Option<String> {
        if let Some(base_url) = self.base_url.as_ref().filter(|value| !value.trim().is_empty()) {
            return Some(base_url.trim_end_matches('/').to_string());
        }
        match self.provider {
            LlmProvider::OpenAi => Some("https://api.openai.com/v1".to_string()),
            LlmProvider::Ollama => Some("http://localhost:11434/v1".to_string()),
            LlmProvider::Offline => None,
        }
    }
}

impl PaymentConfig {
    pub fn is_configured(&self) -> bool {
        self.access_token
            .as_ref()
            .map(|token| !token.expose_secret().trim().is_empty())
            .unwrap_or(false)
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(path) = resolve_config_path(options.config_path.as_deref()) {
            config.apply_patch(read_patch(&path)?);
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
        }

        if let Some(catalog) = patch.catalog {
            if let Some(products_path) = catalog.products_path {
                self.catalog.products_path = Some(products_path);
            }
            if let Some(histories_path) = catalog.histories_path {
                self.catalog.histories_path = Some(histories_path);
            }
        }

        if let Some(llm) = patch.llm {
            if let Some(provider) = llm.provider {
                self.llm.provider = provider;
            }
            if let Some(api_key) = llm.api_key {
                self.llm.api_key = Some(secret_value(api_key));
            }
            if let Some(base_url) = llm.base_url {
                self.llm.base_url = Some(base_url);
            }
            if let Some(model) = llm.model {
                self.llm.model = model;
            }
            if let Some(timeout_secs) = llm.timeout_secs {
                self.llm.timeout_secs = timeout_secs;
            }
            if let Some(max_retries) = llm.max_retries {
                self.llm.max_retries = max_retries;
            }
            if let Some(jailbreak_screen) = llm.jailbreak_screen {
                self.llm.jailbreak_screen = jailbreak_screen;
            }
        }

        if let Some(payment) = patch.payment {
            if let Some(access_token) = payment.access_token {
                self.payment.access_token = Some(secret_value(access_token));
            }
            if let Some(base_url) = payment.base_url {
                self.payment.base_url = base_url;
            }
            if let Some(notification_url) = payment.notification_url {
                self.payment.notification_url = notification_url;
            }
            if let Some(webhook_secret) = payment.webhook_secret {
                self.payment.webhook_secret = Some(secret_value(webhook_secret));
            }
            if let Some(timeout_secs) = payment.timeout_secs {
                self.payment.timeout_secs = timeout_secs;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
            }
        }

        if let Some(turns) = patch.turns {
            if let Some(queue_wait_secs) = turns.queue_wait_secs {
                self.turns.queue_wait_secs = queue_wait_secs;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("VITRINE_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("VITRINE_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections =
                parse_u32("VITRINE_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("VITRINE_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("VITRINE_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("VITRINE_CATALOG_PRODUCTS_PATH") {
            self.catalog.products_path = Some(PathBuf::from(value));
        }
        if let Some(value) = read_env("VITRINE_CATALOG_HISTORIES_PATH") {
            self.catalog.histories_path = Some(PathBuf::from(value));
        }

        if let Some(value) = read_env("VITRINE_LLM_PROVIDER") {
            self.llm.provider = value.parse()?;
        }
        if let Some(value) = read_env("VITRINE_LLM_API_KEY") {
            self.llm.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("VITRINE_LLM_BASE_URL") {
            self.llm.base_url = Some(value);
        }
        if let Some(value) = read_env("VITRINE_LLM_MODEL") {
            self.llm.model = value;
        }
        if let Some(value) = read_env("VITRINE_LLM_TIMEOUT_SECS") {
            self.llm.timeout_secs = parse_u64("VITRINE_LLM_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("VITRINE_LLM_MAX_RETRIES") {
            self.llm.max_retries = parse_u32("VITRINE_LLM_MAX_RETRIES", &value)?;
        }
        if let Some(value) = read_env("VITRINE_LLM_JAILBREAK_SCREEN") {
            self.llm.jailbreak_screen = parse_bool("VITRINE_LLM_JAILBREAK_SCREEN", &value)?;
        }

        let access_token = read_env("VITRINE_PAYMENT_ACCESS_TOKEN")
            .or_else(|| read_env("MERCADOPAGO_ACCESS_TOKEN"));
        if let Some(value) = access_token {
            self.payment.access_token = Some(secret_value(value));
        }
        if let Some(value) = read_env("VITRINE_PAYMENT_BASE_URL") {
            self.payment.base_url = value;
        }
        if let Some(value) = read_env("VITRINE_PAYMENT_NOTIFICATION_URL") {
            self.payment.notification_url = value;
        }
        if let Some(value) = read_env("VITRINE_PAYMENT_WEBHOOK_SECRET") {
            self.payment.webhook_secret = Some(secret_value(value));
        }
        if let Some(value) = read_env("VITRINE_PAYMENT_TIMEOUT_SECS") {
            self.payment.timeout_secs = parse_u64("VITRINE_PAYMENT_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("VITRINE_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("VITRINE_SERVER_PORT") {
            self.server.port = parse_u16("VITRINE_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("VITRINE_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("VITRINE_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        if let Some(value) = read_env("VITRINE_TURNS_QUEUE_WAIT_SECS") {
            self.turns.queue_wait_secs = parse_u64("VITRINE_TURNS_QUEUE_WAIT_SECS", &value)?;
        }

        let log_level = read_env("VITRINE_LOGGING_LEVEL").or_else(|| read_env("VITRINE_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("VITRINE_LOGGING_FORMAT").or_else(|| read_env("VITRINE_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(llm_provider) = overrides.llm_provider {
            self.llm.provider = llm_provider;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_llm(&self.llm)?;
        validate_payment(&self.payment)?;
        validate_server(&self.server)?;
        validate_turns(&self.turns)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

pub fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from(DEFAULT_CONFIG_FILE), PathBuf::from(NESTED_CONFIG_FILE)]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    let url = database.url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(ConfigError::Validation(
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if database.max_connections == 0 {
        return Err(ConfigError::Validation(
            "database.max_connections must be greater than zero".to_string(),
        ));
    }

    if database.timeout_secs == 0 || database.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "database.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_llm(llm: &LlmConfig) -> Result<(), ConfigError> {
    if llm.timeout_secs == 0 || llm.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "llm.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    match llm.provider {
        LlmProvider::OpenAi => {
            let missing = llm
                .api_key
                .as_ref()
                .map(|value| value.expose_secret().trim().is_empty())
                .unwrap_or(true);
            if missing {
                return Err(ConfigError::Validation(
                    "llm.api_key is required for the openai provider (set VITRINE_LLM_API_KEY)"
                        .to_string(),
                ));
            }
        }
        LlmProvider::Ollama | LlmProvider::Offline => {}
    }

    if llm.model.trim().is_empty() && llm.provider != LlmProvider::Offline {
        return Err(ConfigError::Validation("llm.model must not be empty".to_string()));
    }

    if llm.jailbreak_screen && llm.provider == LlmProvider::Offline {
        return Err(ConfigError::Validation(
            "llm.jailbreak_screen requires an openai or ollama provider".to_string(),
        ));
    }

    Ok(())
}

fn validate_payment(payment: &PaymentConfig) -> Result<(), ConfigError> {
    for (key, url) in
        [("payment.base_url", &payment.base_url), ("payment.notification_url", &payment.notification_url)]
    {
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(ConfigError::Validation(format!(
                "{key} must start with http:// or https://"
            )));
        }
    }

    if payment.timeout_secs == 0 || payment.timeout_secs > 120 {
        return Err(ConfigError::Validation(
            "payment.timeout_secs must be in range 1..=120".to_string(),
        ));
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_turns(turns: &TurnsConfig) -> Result<(), ConfigError> {
    if turns.queue_wait_secs > 300 {
        return Err(ConfigError::Validation(
            "turns.queue_wait_secs must be in range 0..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    value.parse::<bool>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    catalog: Option<CatalogPatch>,
    llm: Option<LlmPatch>,
    payment: Option<PaymentPatch>,
    server: Option<ServerPatch>,
    turns: Option<TurnsPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct CatalogPatch {
    products_path: Option<PathBuf>,
    histories_path: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
struct LlmPatch {
    provider: Option<LlmProvider>,
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    timeout_secs: Option<u64>,
    max_retries: Option<u32>,
    jailbreak_screen: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
struct PaymentPatch {
    access_token: Option<String>,
    base_url: Option<String>,
    notification_url: Option<String>,
    webhook_secret: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct TurnsPatch {
    queue_wait_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
