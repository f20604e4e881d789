use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub whatsapp: WhatsAppConfig,
    pub llm: LlmConfig,
    pub payment: PaymentConfig,
    pub conversation: ConversationConfig,
    pub idempotency: IdempotencyConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct WhatsAppConfig {
    pub api_base_url: String,
    pub phone_number_id: Option<String>,
    /// Used when a tenant has no channel credential of its own.
    pub access_token: Option<SecretString>,
    pub verify_token: SecretString,
}

#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    pub api_key: Option<SecretString>,
    pub base_url: String,
    pub model: String,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct PaymentConfig {
    pub gateway_url: String,
    pub merchant_code: String,
    pub terminal: String,
    /// ISO-4217 numeric code (978 = EUR).
    pub currency: String,
    /// Base64-encoded HMAC key shared with the gateway.
    pub secret_key: SecretString,
    pub notification_url: String,
    pub success_url: String,
    pub failure_url: String,
    pub public_base_url: String,
    pub method_name: String,
}

#[derive(Clone, Debug)]
pub struct ConversationConfig {
    pub summary_trigger: String,
    pub close_keyword: String,
}

#[derive(Clone, Debug)]
pub struct IdempotencyConfig {
    pub retention_hours: u32,
    pub sweep_interval_secs: u64,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmProvider {
    #[serde(alias = "openai")]
    OpenAi,
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
    pub llm_model: Option<String>,
    pub llm_api_key: Option<String>,
    pub payment_secret_key: Option<String>,
    pub whatsapp_verify_token: Option<String>,
    pub server_port: Option<u16>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

pub const DEFAULT_SUMMARY_TRIGGER: &str = "Resumen del Pedido:";
pub const DEFAULT_CLOSE_KEYWORD: &str = "finalizar";

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://comanda.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            whatsapp: WhatsAppConfig {
                api_base_url: "https://graph.facebook.com/v22.0".to_string(),
                phone_number_id: None,
                access_token: None,
                verify_token: String::new().into(),
            },
            llm: LlmConfig {
                provider: LlmProvider::OpenAi,
                api_key: None,
                base_url: "https://api.openai.com/v1".to_string(),
                model: "gpt-4o-mini".to_string(),
                timeout_secs: 60,
            },
            payment: PaymentConfig {
                gateway_url: "https://sis-t.redsys.es:25443/sis/realizarPago".to_string(),
                merchant_code: "999008881".to_string(),
                terminal: "1".to_string(),
                currency: "978".to_string(),
                secret_key: String::new().into(),
                notification_url: "http://localhost:8080/api/v1/payments/notification"
                    .to_string(),
                success_url: "http://localhost:8080/payment/ok".to_string(),
                failure_url: "http://localhost:8080/payment/ko".to_string(),
                public_base_url: "http://localhost:8080".to_string(),
                method_name: "Redsys".to_string(),
            },
            conversation: ConversationConfig {
                summary_trigger: DEFAULT_SUMMARY_TRIGGER.to_string(),
                close_keyword: DEFAULT_CLOSE_KEYWORD.to_string(),
            },
            idempotency: IdempotencyConfig { retention_hours: 24, sweep_interval_secs: 3600 },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 8080,
                graceful_shutdown_secs: 15,
            },
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
            other => Err(ConfigError::Validation(format!(
                "unsupported llm provider `{other}` (expected openai)"
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

impl PaymentConfig {
    pub fn decoded_secret_key(&self) -> Result<Vec<u8>, ConfigError> {
        STANDARD.decode(self.secret_key.expose_secret().trim()).map_err(|_| {
            ConfigError::Validation("payment.secret_key must be valid base64".to_string())
        })
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("comanda.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(database) = patch.database {
            set(&mut self.database.url, database.url);
            set(&mut self.database.max_connections, database.max_connections);
            set(&mut self.database.timeout_secs, database.timeout_secs);
        }

        if let Some(whatsapp) = patch.whatsapp {
            set(&mut self.whatsapp.api_base_url, whatsapp.api_base_url);
            if let Some(phone_number_id) = whatsapp.phone_number_id {
                self.whatsapp.phone_number_id = Some(phone_number_id);
            }
            if let Some(access_token) = whatsapp.access_token {
                self.whatsapp.access_token = Some(secret_value(access_token));
            }
            if let Some(verify_token) = whatsapp.verify_token {
                self.whatsapp.verify_token = secret_value(verify_token);
            }
        }

        if let Some(llm) = patch.llm {
            set(&mut self.llm.provider, llm.provider);
            if let Some(api_key) = llm.api_key {
                self.llm.api_key = Some(secret_value(api_key));
            }
            set(&mut self.llm.base_url, llm.base_url);
            set(&mut self.llm.model, llm.model);
            set(&mut self.llm.timeout_secs, llm.timeout_secs);
        }

        if let Some(payment) = patch.payment {
            set(&mut self.payment.gateway_url, payment.gateway_url);
            set(&mut self.payment.merchant_code, payment.merchant_code);
            set(&mut self.payment.terminal, payment.terminal);
            set(&mut self.payment.currency, payment.currency);
            if let Some(secret_key) = payment.secret_key {
                self.payment.secret_key = secret_value(secret_key);
            }
            set(&mut self.payment.notification_url, payment.notification_url);
            set(&mut self.payment.success_url, payment.success_url);
            set(&mut self.payment.failure_url, payment.failure_url);
            set(&mut self.payment.public_base_url, payment.public_base_url);
            set(&mut self.payment.method_name, payment.method_name);
        }

        if let Some(conversation) = patch.conversation {
            set(&mut self.conversation.summary_trigger, conversation.summary_trigger);
            set(&mut self.conversation.close_keyword, conversation.close_keyword);
        }

        if let Some(idempotency) = patch.idempotency {
            set(&mut self.idempotency.retention_hours, idempotency.retention_hours);
            set(&mut self.idempotency.sweep_interval_secs, idempotency.sweep_interval_secs);
        }

        if let Some(server) = patch.server {
            set(&mut self.server.bind_address, server.bind_address);
            set(&mut self.server.port, server.port);
            set(&mut self.server.graceful_shutdown_secs, server.graceful_shutdown_secs);
        }

        if let Some(logging) = patch.logging {
            set(&mut self.logging.level, logging.level);
            set(&mut self.logging.format, logging.format);
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("COMANDA_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("COMANDA_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = parse_u32("COMANDA_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("COMANDA_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("COMANDA_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("COMANDA_WHATSAPP_API_BASE_URL") {
            self.whatsapp.api_base_url = value;
        }
        if let Some(value) = read_env("COMANDA_WHATSAPP_PHONE_NUMBER_ID") {
            self.whatsapp.phone_number_id = Some(value);
        }
        if let Some(value) = read_env("COMANDA_WHATSAPP_ACCESS_TOKEN") {
            self.whatsapp.access_token = Some(secret_value(value));
        }
        if let Some(value) = read_env("COMANDA_WHATSAPP_VERIFY_TOKEN") {
            self.whatsapp.verify_token = secret_value(value);
        }

        if let Some(value) = read_env("COMANDA_LLM_PROVIDER") {
            self.llm.provider = value.parse()?;
        }
        if let Some(value) = read_env("COMANDA_LLM_API_KEY") {
            self.llm.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("COMANDA_LLM_BASE_URL") {
            self.llm.base_url = value;
        }
        if let Some(value) = read_env("COMANDA_LLM_MODEL") {
            self.llm.model = value;
        }
        if let Some(value) = read_env("COMANDA_LLM_TIMEOUT_SECS") {
            self.llm.timeout_secs = parse_u64("COMANDA_LLM_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("COMANDA_PAYMENT_GATEWAY_URL") {
            self.payment.gateway_url = value;
        }
        if let Some(value) = read_env("COMANDA_PAYMENT_MERCHANT_CODE") {
            self.payment.merchant_code = value;
        }
        if let Some(value) = read_env("COMANDA_PAYMENT_TERMINAL") {
            self.payment.terminal = value;
        }
        if let Some(value) = read_env("COMANDA_PAYMENT_CURRENCY") {
            self.payment.currency = value;
        }
        if let Some(value) = read_env("COMANDA_PAYMENT_SECRET_KEY") {
            self.payment.secret_key = secret_value(value);
        }
        if let Some(value) = read_env("COMANDA_PAYMENT_NOTIFICATION_URL") {
            self.payment.notification_url = value;
        }
        if let Some(value) = read_env("COMANDA_PAYMENT_SUCCESS_URL") {
            self.payment.success_url = value;
        }
        if let Some(value) = read_env("COMANDA_PAYMENT_FAILURE_URL") {
            self.payment.failure_url = value;
        }
        if let Some(value) = read_env("COMANDA_PAYMENT_PUBLIC_BASE_URL") {
            self.payment.public_base_url = value;
        }

        if let Some(value) = read_env("COMANDA_CONVERSATION_SUMMARY_TRIGGER") {
            self.conversation.summary_trigger = value;
        }
        if let Some(value) = read_env("COMANDA_CONVERSATION_CLOSE_KEYWORD") {
            self.conversation.close_keyword = value;
        }

        if let Some(value) = read_env("COMANDA_IDEMPOTENCY_RETENTION_HOURS") {
            self.idempotency.retention_hours =
                parse_u32("COMANDA_IDEMPOTENCY_RETENTION_HOURS", &value)?;
        }
        if let Some(value) = read_env("COMANDA_IDEMPOTENCY_SWEEP_INTERVAL_SECS") {
            self.idempotency.sweep_interval_secs =
                parse_u64("COMANDA_IDEMPOTENCY_SWEEP_INTERVAL_SECS", &value)?;
        }

        if let Some(value) = read_env("COMANDA_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("COMANDA_SERVER_PORT") {
            self.server.port = parse_u16("COMANDA_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("COMANDA_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("COMANDA_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        let log_level =
            read_env("COMANDA_LOGGING_LEVEL").or_else(|| read_env("COMANDA_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("COMANDA_LOGGING_FORMAT").or_else(|| read_env("COMANDA_LOG_FORMAT"));
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
        if let Some(llm_model) = overrides.llm_model {
            self.llm.model = llm_model;
        }
        if let Some(llm_api_key) = overrides.llm_api_key {
            self.llm.api_key = Some(secret_value(llm_api_key));
        }
        if let Some(payment_secret_key) = overrides.payment_secret_key {
            self.payment.secret_key = secret_value(payment_secret_key);
        }
        if let Some(verify_token) = overrides.whatsapp_verify_token {
            self.whatsapp.verify_token = secret_value(verify_token);
        }
        if let Some(port) = overrides.server_port {
            self.server.port = port;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_whatsapp(&self.whatsapp)?;
        validate_llm(&self.llm)?;
        validate_payment(&self.payment)?;
        validate_conversation(&self.conversation)?;
        validate_idempotency(&self.idempotency)?;
        validate_server(&self.server)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn set<T>(target: &mut T, value: Option<T>) {
    if let Some(value) = value {
        *target = value;
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("comanda.toml"), PathBuf::from("config/comanda.toml")]
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

fn validate_whatsapp(whatsapp: &WhatsAppConfig) -> Result<(), ConfigError> {
    require_http_url("whatsapp.api_base_url", &whatsapp.api_base_url)?;

    if whatsapp.verify_token.expose_secret().trim().is_empty() {
        return Err(ConfigError::Validation(
            "whatsapp.verify_token is required. Use the same value entered in the Meta app dashboard > WhatsApp > Configuration > Webhook".to_string(),
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
                    "llm.api_key is required for the openai provider".to_string(),
                ));
            }
        }
    }

    require_http_url("llm.base_url", &llm.base_url)?;
    if llm.model.trim().is_empty() {
        return Err(ConfigError::Validation("llm.model must not be empty".to_string()));
    }

    Ok(())
}

fn validate_payment(payment: &PaymentConfig) -> Result<(), ConfigError> {
    if payment.secret_key.expose_secret().trim().is_empty() {
        return Err(ConfigError::Validation(
            "payment.secret_key is required (base64 key from the gateway merchant console)"
                .to_string(),
        ));
    }
    if payment.decoded_secret_key()?.is_empty() {
        return Err(ConfigError::Validation(
            "payment.secret_key must decode to a non-empty key".to_string(),
        ));
    }

    if payment.merchant_code.trim().is_empty() || payment.terminal.trim().is_empty() {
        return Err(ConfigError::Validation(
            "payment.merchant_code and payment.terminal must not be empty".to_string(),
        ));
    }

    let numeric_currency = payment.currency.len() == 3
        && payment.currency.bytes().all(|byte| byte.is_ascii_digit());
    if !numeric_currency {
        return Err(ConfigError::Validation(
            "payment.currency must be a 3-digit ISO-4217 numeric code (e.g. 978)".to_string(),
        ));
    }

    require_http_url("payment.gateway_url", &payment.gateway_url)?;
    require_http_url("payment.notification_url", &payment.notification_url)?;
    require_http_url("payment.success_url", &payment.success_url)?;
    require_http_url("payment.failure_url", &payment.failure_url)?;
    require_http_url("payment.public_base_url", &payment.public_base_url)?;

    Ok(())
}

fn validate_conversation(conversation: &ConversationConfig) -> Result<(), ConfigError> {
    if conversation.summary_trigger.trim().is_empty() {
        return Err(ConfigError::Validation(
            "conversation.summary_trigger must not be empty".to_string(),
        ));
    }
    if conversation.close_keyword.trim().is_empty() {
        return Err(ConfigError::Validation(
            "conversation.close_keyword must not be empty".to_string(),
        ));
    }
    Ok(())
}

fn validate_idempotency(idempotency: &IdempotencyConfig) -> Result<(), ConfigError> {
    if idempotency.retention_hours == 0 {
        return Err(ConfigError::Validation(
            "idempotency.retention_hours must be greater than zero".to_string(),
        ));
    }
    if idempotency.sweep_interval_secs == 0 {
        return Err(ConfigError::Validation(
            "idempotency.sweep_interval_secs must be greater than zero".to_string(),
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

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn require_http_url(key: &str, value: &str) -> Result<(), ConfigError> {
    if value.starts_with("http://") || value.starts_with("https://") {
        return Ok(());
    }
    Err(ConfigError::Validation(format!("{key} must start with http:// or https://")))
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

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    whatsapp: Option<WhatsAppPatch>,
    llm: Option<LlmPatch>,
    payment: Option<PaymentPatch>,
    conversation: Option<ConversationPatch>,
    idempotency: Option<IdempotencyPatch>,
    server: Option<ServerPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct WhatsAppPatch {
    api_base_url: Option<String>,
    phone_number_id: Option<String>,
    access_token: Option<String>,
    verify_token: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct LlmPatch {
    provider: Option<LlmProvider>,
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct PaymentPatch {
    gateway_url: Option<String>,
    merchant_code: Option<String>,
    terminal: Option<String>,
    currency: Option<String>,
    secret_key: Option<String>,
    notification_url: Option<String>,
    success_url: Option<String>,
    failure_url: Option<String>,
    public_base_url: Option<String>,
    method_name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ConversationPatch {
    summary_trigger: Option<String>,
    close_keyword: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct IdempotencyPatch {
    retention_hours: Option<u32>,
    sweep_interval_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
