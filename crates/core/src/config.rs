use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::dialogue::engine::{DialoguePolicy, DEFAULT_TRIGGER_PHRASE};
use crate::dialogue::messages::ReplyCatalog;
use crate::domain::material::{Material, MaterialCatalog, STANDARD_MATERIALS};
use crate::pricing::{CostCalculator, STANDARD_DENSITY_G_PER_CM3};

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub line: LineConfig,
    pub sink: SinkConfig,
    pub pricing: PricingConfig,
    pub dialogue: DialogueConfig,
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
pub struct LineConfig {
    pub channel_access_token: SecretString,
    pub channel_secret: Option<SecretString>,
    pub api_base_url: String,
    pub delivery: DeliveryMode,
    pub request_timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct SinkConfig {
    pub kind: SinkKind,
    pub project_id: Option<String>,
    pub dataset: Option<String>,
    pub table: Option<String>,
    pub token_source: TokenSource,
    pub access_token: Option<SecretString>,
    pub api_base_url: String,
    pub request_timeout_secs: u64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct PricingConfig {
    pub density_g_per_cm3: f64,
    pub materials: Vec<Material>,
    pub currency_label: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DialogueConfig {
    pub trigger_phrase: String,
    pub affirmative_replies: Vec<String>,
    pub cancel_phrases: Vec<String>,
    pub collect_contact_info: bool,
    pub reject_non_positive_dimensions: bool,
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

/// How replies are delivered back to the chat platform.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryMode {
    Reply,
    Push,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SinkKind {
    Sqlite,
    #[serde(rename = "bigquery")]
    BigQuery,
    None,
}

/// Where warehouse bearer tokens come from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenSource {
    Static,
    Metadata,
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
    pub line_channel_access_token: Option<String>,
    pub line_channel_secret: Option<String>,
    pub line_api_base_url: Option<String>,
    pub line_delivery: Option<DeliveryMode>,
    pub sink_kind: Option<SinkKind>,
    pub server_port: Option<u16>,
    pub collect_contact_info: Option<bool>,
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

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://moldquote.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            line: LineConfig {
                channel_access_token: String::new().into(),
                channel_secret: None,
                api_base_url: "https://api.line.me".to_string(),
                delivery: DeliveryMode::Reply,
                request_timeout_secs: 10,
            },
            sink: SinkConfig {
                kind: SinkKind::Sqlite,
                project_id: None,
                dataset: None,
                table: None,
                token_source: TokenSource::Metadata,
                access_token: None,
                api_base_url: "https://bigquery.googleapis.com".to_string(),
                request_timeout_secs: 10,
            },
            pricing: PricingConfig {
                density_g_per_cm3: STANDARD_DENSITY_G_PER_CM3,
                materials: STANDARD_MATERIALS
                    .iter()
                    .map(|(name, cost)| Material::new(*name, *cost))
                    .collect(),
                currency_label: "บาท".to_string(),
            },
            dialogue: DialogueConfig::from(DialoguePolicy::default()),
            server: ServerConfig {
                bind_address: "0.0.0.0".to_string(),
                port: 8080,
                graceful_shutdown_secs: 15,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

impl From<DialoguePolicy> for DialogueConfig {
    fn from(policy: DialoguePolicy) -> Self {
        Self {
            trigger_phrase: policy.trigger_phrase,
            affirmative_replies: policy.affirmative_replies,
            cancel_phrases: policy.cancel_phrases,
            collect_contact_info: policy.collect_contact_info,
            reject_non_positive_dimensions: policy.reject_non_positive_dimensions,
        }
    }
}

impl DialogueConfig {
    pub fn policy(&self) -> DialoguePolicy {
        DialoguePolicy {
            trigger_phrase: self.trigger_phrase.clone(),
            affirmative_replies: self.affirmative_replies.clone(),
            cancel_phrases: self.cancel_phrases.clone(),
            collect_contact_info: self.collect_contact_info,
            reject_non_positive_dimensions: self.reject_non_positive_dimensions,
        }
    }
}

impl PricingConfig {
    pub fn catalog(&self) -> Result<MaterialCatalog, ConfigError> {
        MaterialCatalog::new(self.materials.clone())
            .map_err(|error| ConfigError::Validation(format!("pricing.materials: {error}")))
    }

    pub fn calculator(&self) -> Result<CostCalculator, ConfigError> {
        CostCalculator::new(self.density_g_per_cm3)
            .map_err(|error| ConfigError::Validation(format!("pricing.density_g_per_cm3: {error}")))
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
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("moldquote.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    /// Reply texts that agree with the configured dialogue phrases.
    pub fn reply_catalog(&self) -> ReplyCatalog {
        let affirmative = self
            .dialogue
            .affirmative_replies
            .first()
            .cloned()
            .unwrap_or_else(|| "ใช่".to_string());
        ReplyCatalog::new(
            self.dialogue.trigger_phrase.clone(),
            affirmative,
            self.pricing.currency_label.clone(),
        )
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

        if let Some(line) = patch.line {
            if let Some(channel_access_token) = line.channel_access_token {
                self.line.channel_access_token = secret_value(channel_access_token);
            }
            if let Some(channel_secret) = line.channel_secret {
                self.line.channel_secret = Some(secret_value(channel_secret));
            }
            if let Some(api_base_url) = line.api_base_url {
                self.line.api_base_url = api_base_url;
            }
            if let Some(delivery) = line.delivery {
                self.line.delivery = delivery;
            }
            if let Some(request_timeout_secs) = line.request_timeout_secs {
                self.line.request_timeout_secs = request_timeout_secs;
            }
        }

        if let Some(sink) = patch.sink {
            if let Some(kind) = sink.kind {
                self.sink.kind = kind;
            }
            if let Some(project_id) = sink.project_id {
                self.sink.project_id = Some(project_id);
            }
            if let Some(dataset) = sink.dataset {
                self.sink.dataset = Some(dataset);
            }
            if let Some(table) = sink.table {
                self.sink.table = Some(table);
            }
            if let Some(token_source) = sink.token_source {
                self.sink.token_source = token_source;
            }
            if let Some(access_token) = sink.access_token {
                self.sink.access_token = Some(secret_value(access_token));
            }
            if let Some(api_base_url) = sink.api_base_url {
                self.sink.api_base_url = api_base_url;
            }
            if let Some(request_timeout_secs) = sink.request_timeout_secs {
                self.sink.request_timeout_secs = request_timeout_secs;
            }
        }

        if let Some(pricing) = patch.pricing {
            if let Some(density) = pricing.density_g_per_cm3 {
                self.pricing.density_g_per_cm3 = density;
            }
            if let Some(materials) = pricing.materials {
                self.pricing.materials = materials
                    .into_iter()
                    .map(|entry| Material::new(entry.name, entry.cost_per_kg))
                    .collect();
            }
            if let Some(currency_label) = pricing.currency_label {
                self.pricing.currency_label = currency_label;
            }
        }

        if let Some(dialogue) = patch.dialogue {
            if let Some(trigger_phrase) = dialogue.trigger_phrase {
                self.dialogue.trigger_phrase = trigger_phrase;
            }
            if let Some(affirmative_replies) = dialogue.affirmative_replies {
                self.dialogue.affirmative_replies = affirmative_replies;
            }
            if let Some(cancel_phrases) = dialogue.cancel_phrases {
                self.dialogue.cancel_phrases = cancel_phrases;
            }
            if let Some(collect_contact_info) = dialogue.collect_contact_info {
                self.dialogue.collect_contact_info = collect_contact_info;
            }
            if let Some(reject) = dialogue.reject_non_positive_dimensions {
                self.dialogue.reject_non_positive_dimensions = reject;
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
        if let Some(value) = read_env("MOLDQUOTE_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("MOLDQUOTE_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections =
                parse_u32("MOLDQUOTE_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("MOLDQUOTE_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("MOLDQUOTE_DATABASE_TIMEOUT_SECS", &value)?;
        }

        let access_token = read_env("MOLDQUOTE_LINE_CHANNEL_ACCESS_TOKEN")
            .or_else(|| read_env("LINE_ACCESS_TOKEN"));
        if let Some(value) = access_token {
            self.line.channel_access_token = secret_value(value);
        }
        let channel_secret =
            read_env("MOLDQUOTE_LINE_CHANNEL_SECRET").or_else(|| read_env("LINE_SECRET"));
        if let Some(value) = channel_secret {
            self.line.channel_secret = Some(secret_value(value));
        }
        if let Some(value) = read_env("MOLDQUOTE_LINE_API_BASE_URL") {
            self.line.api_base_url = value;
        }
        if let Some(value) = read_env("MOLDQUOTE_LINE_DELIVERY") {
            self.line.delivery = value.parse()?;
        }
        if let Some(value) = read_env("MOLDQUOTE_LINE_REQUEST_TIMEOUT_SECS") {
            self.line.request_timeout_secs =
                parse_u64("MOLDQUOTE_LINE_REQUEST_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("MOLDQUOTE_SINK_KIND") {
            self.sink.kind = value.parse()?;
        }
        if let Some(value) = read_env("MOLDQUOTE_SINK_PROJECT_ID") {
            self.sink.project_id = Some(value);
        }
        if let Some(value) = read_env("MOLDQUOTE_SINK_DATASET") {
            self.sink.dataset = Some(value);
        }
        if let Some(value) = read_env("MOLDQUOTE_SINK_TABLE") {
            self.sink.table = Some(value);
        }
        if let Some(value) = read_env("MOLDQUOTE_SINK_TOKEN_SOURCE") {
            self.sink.token_source = value.parse()?;
        }
        if let Some(value) = read_env("MOLDQUOTE_SINK_ACCESS_TOKEN") {
            self.sink.access_token = Some(secret_value(value));
        }
        if let Some(value) = read_env("MOLDQUOTE_SINK_API_BASE_URL") {
            self.sink.api_base_url = value;
        }

        if let Some(value) = read_env("MOLDQUOTE_PRICING_DENSITY") {
            self.pricing.density_g_per_cm3 = parse_f64("MOLDQUOTE_PRICING_DENSITY", &value)?;
        }
        if let Some(value) = read_env("MOLDQUOTE_PRICING_CURRENCY_LABEL") {
            self.pricing.currency_label = value;
        }

        if let Some(value) = read_env("MOLDQUOTE_DIALOGUE_TRIGGER_PHRASE") {
            self.dialogue.trigger_phrase = value;
        }
        if let Some(value) = read_env("MOLDQUOTE_DIALOGUE_COLLECT_CONTACT_INFO") {
            self.dialogue.collect_contact_info =
                parse_bool("MOLDQUOTE_DIALOGUE_COLLECT_CONTACT_INFO", &value)?;
        }
        if let Some(value) = read_env("MOLDQUOTE_DIALOGUE_REJECT_NON_POSITIVE_DIMENSIONS") {
            self.dialogue.reject_non_positive_dimensions =
                parse_bool("MOLDQUOTE_DIALOGUE_REJECT_NON_POSITIVE_DIMENSIONS", &value)?;
        }

        if let Some(value) = read_env("MOLDQUOTE_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        // `PORT` is what container platforms inject.
        let port = read_env("MOLDQUOTE_SERVER_PORT").map(|value| ("MOLDQUOTE_SERVER_PORT", value));
        if let Some((key, value)) = port.or_else(|| read_env("PORT").map(|value| ("PORT", value)))
        {
            self.server.port = parse_u16(key, &value)?;
        }
        if let Some(value) = read_env("MOLDQUOTE_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("MOLDQUOTE_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        let log_level =
            read_env("MOLDQUOTE_LOGGING_LEVEL").or_else(|| read_env("MOLDQUOTE_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("MOLDQUOTE_LOGGING_FORMAT").or_else(|| read_env("MOLDQUOTE_LOG_FORMAT"));
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
        if let Some(token) = overrides.line_channel_access_token {
            self.line.channel_access_token = secret_value(token);
        }
        if let Some(secret) = overrides.line_channel_secret {
            self.line.channel_secret = Some(secret_value(secret));
        }
        if let Some(api_base_url) = overrides.line_api_base_url {
            self.line.api_base_url = api_base_url;
        }
        if let Some(delivery) = overrides.line_delivery {
            self.line.delivery = delivery;
        }
        if let Some(kind) = overrides.sink_kind {
            self.sink.kind = kind;
        }
        if let Some(port) = overrides.server_port {
            self.server.port = port;
        }
        if let Some(collect_contact_info) = overrides.collect_contact_info {
            self.dialogue.collect_contact_info = collect_contact_info;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_line(&self.line)?;
        validate_sink(&self.sink)?;
        validate_pricing(&self.pricing)?;
        validate_dialogue(&self.dialogue)?;
        validate_server(&self.server)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for DeliveryMode {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "reply" => Ok(Self::Reply),
            "push" => Ok(Self::Push),
            other => Err(ConfigError::Validation(format!(
                "unsupported line delivery `{other}` (expected reply|push)"
            ))),
        }
    }
}

impl std::str::FromStr for SinkKind {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "sqlite" => Ok(Self::Sqlite),
            "bigquery" => Ok(Self::BigQuery),
            "none" => Ok(Self::None),
            other => Err(ConfigError::Validation(format!(
                "unsupported sink kind `{other}` (expected sqlite|bigquery|none)"
            ))),
        }
    }
}

impl SinkKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sqlite => "sqlite",
            Self::BigQuery => "bigquery",
            Self::None => "none",
        }
    }
}

impl std::str::FromStr for TokenSource {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "static" => Ok(Self::Static),
            "metadata" => Ok(Self::Metadata),
            other => Err(ConfigError::Validation(format!(
                "unsupported token source `{other}` (expected static|metadata)"
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

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("moldquote.toml"), PathBuf::from("config/moldquote.toml")]
        .into_iter()
        .find(|path| path.exists())
}

pub fn detect_config_path() -> Option<PathBuf> {
    resolve_config_path(None)
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

fn validate_line(line: &LineConfig) -> Result<(), ConfigError> {
    if line.channel_access_token.expose_secret().trim().is_empty() {
        return Err(ConfigError::Validation(
            "line.channel_access_token is required. Issue one in the LINE Developers console > Messaging API > Channel access token".to_string(),
        ));
    }

    if let Some(secret) = &line.channel_secret {
        if secret.expose_secret().trim().is_empty() {
            return Err(ConfigError::Validation(
                "line.channel_secret must not be blank when set".to_string(),
            ));
        }
    }

    validate_http_url("line.api_base_url", &line.api_base_url)?;

    if line.request_timeout_secs == 0 || line.request_timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "line.request_timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_sink(sink: &SinkConfig) -> Result<(), ConfigError> {
    if sink.kind != SinkKind::BigQuery {
        return Ok(());
    }

    for (key, value) in [
        ("sink.project_id", &sink.project_id),
        ("sink.dataset", &sink.dataset),
        ("sink.table", &sink.table),
    ] {
        let Some(value) = value.as_deref().map(str::trim).filter(|value| !value.is_empty()) else {
            return Err(ConfigError::Validation(format!(
                "{key} is required when sink.kind is bigquery"
            )));
        };
        if value.contains(['/', '`']) || value.chars().any(char::is_whitespace) {
            return Err(ConfigError::Validation(format!(
                "{key} must not contain whitespace, `/` or backticks"
            )));
        }
    }

    if sink.token_source == TokenSource::Static {
        let missing = sink
            .access_token
            .as_ref()
            .map(|value| value.expose_secret().trim().is_empty())
            .unwrap_or(true);
        if missing {
            return Err(ConfigError::Validation(
                "sink.access_token is required when sink.token_source is static".to_string(),
            ));
        }
    }

    validate_http_url("sink.api_base_url", &sink.api_base_url)?;

    if sink.request_timeout_secs == 0 || sink.request_timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "sink.request_timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_pricing(pricing: &PricingConfig) -> Result<(), ConfigError> {
    pricing.calculator()?;
    pricing.catalog()?;
    if pricing.currency_label.trim().is_empty() {
        return Err(ConfigError::Validation(
            "pricing.currency_label must not be empty".to_string(),
        ));
    }
    Ok(())
}

fn validate_dialogue(dialogue: &DialogueConfig) -> Result<(), ConfigError> {
    let trigger = dialogue.trigger_phrase.trim();
    if trigger.is_empty() {
        return Err(ConfigError::Validation(
            "dialogue.trigger_phrase must not be empty".to_string(),
        ));
    }

    if dialogue.affirmative_replies.iter().all(|reply| reply.trim().is_empty()) {
        return Err(ConfigError::Validation(
            "dialogue.affirmative_replies must contain at least one phrase".to_string(),
        ));
    }

    let clashes = dialogue
        .affirmative_replies
        .iter()
        .chain(dialogue.cancel_phrases.iter())
        .any(|phrase| phrase.trim() == trigger);
    if clashes {
        return Err(ConfigError::Validation(
            "dialogue.trigger_phrase must differ from affirmative and cancel phrases".to_string(),
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

fn validate_http_url(key: &str, value: &str) -> Result<(), ConfigError> {
    if !value.starts_with("http://") && !value.starts_with("https://") {
        return Err(ConfigError::Validation(format!("{key} must start with http:// or https://")));
    }
    Ok(())
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

fn parse_f64(key: &str, value: &str) -> Result<f64, ConfigError> {
    value.trim().parse::<f64>().map_err(|_| ConfigError::InvalidEnvOverride {
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
    line: Option<LinePatch>,
    sink: Option<SinkPatch>,
    pricing: Option<PricingPatch>,
    dialogue: Option<DialoguePatch>,
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
struct LinePatch {
    channel_access_token: Option<String>,
    channel_secret: Option<String>,
    api_base_url: Option<String>,
    delivery: Option<DeliveryMode>,
    request_timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct SinkPatch {
    kind: Option<SinkKind>,
    project_id: Option<String>,
    dataset: Option<String>,
    table: Option<String>,
    token_source: Option<TokenSource>,
    access_token: Option<String>,
    api_base_url: Option<String>,
    request_timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct PricingPatch {
    density_g_per_cm3: Option<f64>,
    materials: Option<Vec<MaterialPatch>>,
    currency_label: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MaterialPatch {
    name: String,
    cost_per_kg: f64,
}

#[derive(Debug, Default, Deserialize)]
struct DialoguePatch {
    trigger_phrase: Option<String>,
    affirmative_replies: Option<Vec<String>>,
    cancel_phrases: Option<Vec<String>>,
    collect_contact_info: Option<bool>,
    reject_non_positive_dimensions: Option<bool>,
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

#[cfg(test)]
mod tests {
    use std::env;
    use std::fs;
    use std::io;
    use std::sync::{Mutex, OnceLock};

    use secrecy::ExposeSecret;
    use tempfile::TempDir;

    use super::{
        AppConfig, ConfigError, ConfigOverrides, DeliveryMode, LoadOptions, LogFormat, SinkKind,
        TokenSource,
    };

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    const MANAGED_VARS: &[&str] = &[
        "MOLDQUOTE_LINE_CHANNEL_ACCESS_TOKEN",
        "MOLDQUOTE_LINE_CHANNEL_SECRET",
        "LINE_ACCESS_TOKEN",
        "LINE_SECRET",
        "MOLDQUOTE_DATABASE_URL",
        "MOLDQUOTE_LOG_LEVEL",
        "MOLDQUOTE_LOG_FORMAT",
        "MOLDQUOTE_SERVER_PORT",
        "PORT",
        "MOLDQUOTE_SINK_KIND",
        "MOLDQUOTE_PRICING_DENSITY",
        "TEST_LINE_TOKEN",
    ];

    fn env_lock() -> &'static Mutex<()> {
        ENV_LOCK.get_or_init(|| Mutex::new(()))
    }

    fn clear_vars(vars: &[&str]) {
        for var in vars {
            env::remove_var(var);
        }
    }

    fn ensure(condition: bool, message: &'static str) -> Result<(), String> {
        if condition {
            Ok(())
        } else {
            Err(message.to_string())
        }
    }

    fn with_token() -> LoadOptions {
        LoadOptions {
            overrides: ConfigOverrides {
                line_channel_access_token: Some("token-from-override".to_string()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        }
    }

    #[test]
    fn file_load_supports_env_interpolation() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        clear_vars(MANAGED_VARS);
        env::set_var("TEST_LINE_TOKEN", "token-from-env");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("moldquote.toml");
            fs::write(
                &path,
                r#"
[line]
channel_access_token = "${TEST_LINE_TOKEN}"
delivery = "push"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config =
                AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                    .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.line.channel_access_token.expose_secret() == "token-from-env",
                "access token should be interpolated from environment",
            )?;
            ensure(config.line.delivery == DeliveryMode::Push, "delivery should come from file")?;
            Ok(())
        })();

        clear_vars(MANAGED_VARS);
        result
    }

    #[test]
    fn legacy_platform_env_names_are_supported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        clear_vars(MANAGED_VARS);
        env::set_var("LINE_ACCESS_TOKEN", "legacy-token");
        env::set_var("LINE_SECRET", "legacy-secret");
        env::set_var("PORT", "9090");
        env::set_var("MOLDQUOTE_LOG_LEVEL", "warn");
        env::set_var("MOLDQUOTE_LOG_FORMAT", "json");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.line.channel_access_token.expose_secret() == "legacy-token",
                "LINE_ACCESS_TOKEN should be accepted",
            )?;
            ensure(
                config.line.channel_secret.as_ref().map(|s| s.expose_secret().to_string())
                    == Some("legacy-secret".to_string()),
                "LINE_SECRET should be accepted",
            )?;
            ensure(config.server.port == 9090, "PORT should set the listen port")?;
            ensure(config.logging.level == "warn", "log level alias should apply")?;
            ensure(matches!(config.logging.format, LogFormat::Json), "log format alias should apply")?;
            Ok(())
        })();

        clear_vars(MANAGED_VARS);
        result
    }

    #[test]
    fn precedence_defaults_file_env_overrides() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        clear_vars(MANAGED_VARS);
        env::set_var("MOLDQUOTE_DATABASE_URL", "sqlite://from-env.db");
        env::set_var("MOLDQUOTE_LINE_CHANNEL_ACCESS_TOKEN", "token-from-env");
        env::set_var("MOLDQUOTE_SERVER_PORT", "7000");
        env::set_var("PORT", "7100");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("moldquote.toml");
            fs::write(
                &path,
                r#"
[database]
url = "sqlite://from-file.db"

[line]
channel_access_token = "token-from-file"

[logging]
level = "warn"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config = AppConfig::load(LoadOptions {
                config_path: Some(path),
                overrides: ConfigOverrides {
                    database_url: Some("sqlite://from-override.db".to_string()),
                    log_level: Some("debug".to_string()),
                    ..ConfigOverrides::default()
                },
                ..LoadOptions::default()
            })
            .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.database.url == "sqlite://from-override.db",
                "override database url should win",
            )?;
            ensure(config.logging.level == "debug", "overridden log level should be debug")?;
            ensure(
                config.line.channel_access_token.expose_secret() == "token-from-env",
                "env access token should win over file and defaults",
            )?;
            ensure(config.server.port == 7000, "prefixed port should win over PORT")?;
            Ok(())
        })();

        clear_vars(MANAGED_VARS);
        result
    }

    #[test]
    fn validation_fails_fast_without_access_token() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        clear_vars(MANAGED_VARS);

        let error = match AppConfig::load(LoadOptions::default()) {
            Ok(_) => return Err("expected validation failure but config load succeeded".to_string()),
            Err(error) => error,
        };
        let has_message = matches!(
            error,
            ConfigError::Validation(ref message) if message.contains("line.channel_access_token")
        );
        ensure(has_message, "validation failure should mention line.channel_access_token")
    }

    #[test]
    fn secret_values_are_not_leaked_by_debug() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        clear_vars(MANAGED_VARS);
        env::set_var("MOLDQUOTE_LINE_CHANNEL_ACCESS_TOKEN", "token-secret-value");
        env::set_var("MOLDQUOTE_LINE_CHANNEL_SECRET", "channel-secret-value");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;
            let debug = format!("{config:?}");

            ensure(!debug.contains("token-secret-value"), "debug must not contain access token")?;
            ensure(!debug.contains("channel-secret-value"), "debug must not contain channel secret")?;
            ensure(
                matches!(config.logging.format, LogFormat::Compact),
                "default logging format should be compact",
            )?;
            ensure(config.sink.kind == SinkKind::Sqlite, "default sink should be sqlite")?;
            Ok(())
        })();

        clear_vars(MANAGED_VARS);
        result
    }

    #[test]
    fn pricing_table_and_dialogue_come_from_file() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        clear_vars(MANAGED_VARS);

        let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
        let path = dir.path().join("moldquote.toml");
        fs::write(
            &path,
            r#"
[pricing]
density_g_per_cm3 = 0.95
currency_label = "THB"

[[pricing.materials]]
name = "HDPE"
cost_per_kg = 55.5

[[pricing.materials]]
name = "ABS"
cost_per_kg = 210

[dialogue]
trigger_phrase = "quote"
affirmative_replies = ["ok"]
collect_contact_info = false
"#,
        )
        .map_err(|err| err.to_string())?;

        let config = AppConfig::load(LoadOptions {
            config_path: Some(path),
            ..with_token()
        })
        .map_err(|err| format!("config load failed: {err}"))?;

        let catalog = config.pricing.catalog().map_err(|err| err.to_string())?;
        ensure(catalog.names() == vec!["HDPE", "ABS"], "materials should keep file order")?;
        ensure(
            (config.pricing.density_g_per_cm3 - 0.95).abs() < f64::EPSILON,
            "density should come from file",
        )?;
        let policy = config.dialogue.policy();
        ensure(policy.is_trigger("quote"), "trigger phrase should come from file")?;
        ensure(policy.is_affirmative("OK"), "affirmative list should come from file")?;
        ensure(!policy.collect_contact_info, "contact collection should be disabled")?;
        Ok(())
    }

    #[test]
    fn empty_material_table_is_rejected() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        clear_vars(MANAGED_VARS);

        let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
        let path = dir.path().join("moldquote.toml");
        fs::write(&path, "[pricing]\nmaterials = []\n").map_err(|err| err.to_string())?;

        let result = AppConfig::load(LoadOptions { config_path: Some(path), ..with_token() });
        ensure(
            matches!(result, Err(ConfigError::Validation(ref message)) if message.contains("pricing.materials")),
            "empty material table should fail validation",
        )
    }

    #[test]
    fn bigquery_sink_requires_table_coordinates() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        clear_vars(MANAGED_VARS);

        let mut config = AppConfig::load(with_token()).map_err(|err| err.to_string())?;
        config.sink.kind = SinkKind::BigQuery;
        config.sink.project_id = Some("line-bot-webhook".to_string());
        config.sink.dataset = Some("cost_calculations".to_string());

        ensure(
            matches!(config.validate(), Err(ConfigError::Validation(ref m)) if m.contains("sink.table")),
            "missing table should be reported",
        )?;

        config.sink.table = Some("orders".to_string());
        ensure(config.validate().is_ok(), "metadata token source needs no static token")?;

        config.sink.token_source = TokenSource::Static;
        ensure(
            matches!(config.validate(), Err(ConfigError::Validation(ref m)) if m.contains("sink.access_token")),
            "static token source requires a token",
        )?;
        Ok(())
    }

    #[test]
    fn invalid_numeric_env_override_is_reported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        clear_vars(MANAGED_VARS);
        env::set_var("MOLDQUOTE_PRICING_DENSITY", "heavy");

        let result = AppConfig::load(with_token());

        clear_vars(MANAGED_VARS);
        ensure(
            matches!(result, Err(ConfigError::InvalidEnvOverride { ref key, .. }) if key == "MOLDQUOTE_PRICING_DENSITY"),
            "non-numeric density should be rejected",
        )
    }

    #[test]
    fn reply_catalog_uses_configured_phrases() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        clear_vars(MANAGED_VARS);

        let mut config = AppConfig::load(with_token()).map_err(|err| err.to_string())?;
        config.dialogue.trigger_phrase = "start".to_string();
        let text = config
            .reply_catalog()
            .render(&crate::dialogue::states::DialogueReply::NoActiveSession);

        ensure(text.contains("'start'"), "restart hint should use configured trigger")
    }
}
