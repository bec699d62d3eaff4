use std::env;
use std::fs;
use std::path::Path;

use moldquote_core::config::{detect_config_path, AppConfig};
use secrecy::ExposeSecret;
use toml::Value;

use crate::commands::{load_config, CommandResult};

/// One reported setting: dotted key, rendered value, environment variables that can set it.
struct Setting {
    key: &'static str,
    value: String,
    env_keys: &'static [&'static str],
}

pub fn run() -> CommandResult {
    let config = match load_config("config") {
        Ok(config) => config,
        Err(failure) => return failure,
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let mut lines =
        vec!["effective config (source precedence: override > env > file > default):".to_string()];
    for setting in settings(&config) {
        let source = field_source(
            setting.key,
            setting.env_keys,
            config_file_doc.as_ref(),
            config_file_path.as_deref(),
        );
        lines.push(render_line(setting.key, &setting.value, source));
    }

    CommandResult::success("config", lines.join("\n"))
}

fn settings(config: &AppConfig) -> Vec<Setting> {
    let optional = |value: &Option<String>| value.clone().unwrap_or_else(|| "<unset>".to_string());
    let channel_secret = match &config.line.channel_secret {
        Some(_) => "<redacted>".to_string(),
        None => "<unset> (signature checks disabled)".to_string(),
    };
    let sink_token = if config.sink.access_token.is_some() { "<redacted>" } else { "<unset>" };
    let materials = config
        .pricing
        .materials
        .iter()
        .map(|material| format!("{}={}", material.name, material.cost_per_kg))
        .collect::<Vec<_>>()
        .join(", ");

    vec![
        Setting {
            key: "database.url",
            value: config.database.url.clone(),
            env_keys: &["MOLDQUOTE_DATABASE_URL"],
        },
        Setting {
            key: "database.max_connections",
            value: config.database.max_connections.to_string(),
            env_keys: &["MOLDQUOTE_DATABASE_MAX_CONNECTIONS"],
        },
        Setting {
            key: "database.timeout_secs",
            value: config.database.timeout_secs.to_string(),
            env_keys: &["MOLDQUOTE_DATABASE_TIMEOUT_SECS"],
        },
        Setting {
            key: "line.channel_access_token",
            value: redact_token(config.line.channel_access_token.expose_secret()),
            env_keys: &["MOLDQUOTE_LINE_CHANNEL_ACCESS_TOKEN", "LINE_ACCESS_TOKEN"],
        },
        Setting {
            key: "line.channel_secret",
            value: channel_secret,
            env_keys: &["MOLDQUOTE_LINE_CHANNEL_SECRET", "LINE_SECRET"],
        },
        Setting {
            key: "line.api_base_url",
            value: config.line.api_base_url.clone(),
            env_keys: &["MOLDQUOTE_LINE_API_BASE_URL"],
        },
        Setting {
            key: "line.delivery",
            value: format!("{:?}", config.line.delivery),
            env_keys: &["MOLDQUOTE_LINE_DELIVERY"],
        },
        Setting {
            key: "sink.kind",
            value: config.sink.kind.as_str().to_string(),
            env_keys: &["MOLDQUOTE_SINK_KIND"],
        },
        Setting {
            key: "sink.project_id",
            value: optional(&config.sink.project_id),
            env_keys: &["MOLDQUOTE_SINK_PROJECT_ID"],
        },
        Setting {
            key: "sink.dataset",
            value: optional(&config.sink.dataset),
            env_keys: &["MOLDQUOTE_SINK_DATASET"],
        },
        Setting {
            key: "sink.table",
            value: optional(&config.sink.table),
            env_keys: &["MOLDQUOTE_SINK_TABLE"],
        },
        Setting {
            key: "sink.token_source",
            value: format!("{:?}", config.sink.token_source),
            env_keys: &["MOLDQUOTE_SINK_TOKEN_SOURCE"],
        },
        Setting {
            key: "sink.access_token",
            value: sink_token.to_string(),
            env_keys: &["MOLDQUOTE_SINK_ACCESS_TOKEN"],
        },
        Setting {
            key: "pricing.density_g_per_cm3",
            value: config.pricing.density_g_per_cm3.to_string(),
            env_keys: &["MOLDQUOTE_PRICING_DENSITY"],
        },
        Setting { key: "pricing.materials", value: materials, env_keys: &[] },
        Setting {
            key: "pricing.currency_label",
            value: config.pricing.currency_label.clone(),
            env_keys: &["MOLDQUOTE_PRICING_CURRENCY_LABEL"],
        },
        Setting {
            key: "dialogue.trigger_phrase",
            value: config.dialogue.trigger_phrase.clone(),
            env_keys: &["MOLDQUOTE_DIALOGUE_TRIGGER_PHRASE"],
        },
        Setting {
            key: "dialogue.affirmative_replies",
            value: config.dialogue.affirmative_replies.join(", "),
            env_keys: &[],
        },
        Setting {
            key: "dialogue.collect_contact_info",
            value: config.dialogue.collect_contact_info.to_string(),
            env_keys: &["MOLDQUOTE_DIALOGUE_COLLECT_CONTACT_INFO"],
        },
        Setting {
            key: "dialogue.reject_non_positive_dimensions",
            value: config.dialogue.reject_non_positive_dimensions.to_string(),
            env_keys: &["MOLDQUOTE_DIALOGUE_REJECT_NON_POSITIVE_DIMENSIONS"],
        },
        Setting {
            key: "server.bind_address",
            value: config.server.bind_address.clone(),
            env_keys: &["MOLDQUOTE_SERVER_BIND_ADDRESS"],
        },
        Setting {
            key: "server.port",
            value: config.server.port.to_string(),
            env_keys: &["MOLDQUOTE_SERVER_PORT", "PORT"],
        },
        Setting {
            key: "logging.level",
            value: config.logging.level.clone(),
            env_keys: &["MOLDQUOTE_LOGGING_LEVEL", "MOLDQUOTE_LOG_LEVEL"],
        },
        Setting {
            key: "logging.format",
            value: format!("{:?}", config.logging.format),
            env_keys: &["MOLDQUOTE_LOGGING_FORMAT", "MOLDQUOTE_LOG_FORMAT"],
        },
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
                .map(Path::display)
                .map(|display| display.to_string())
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

/// Keeps only the first four characters of a channel token.
fn redact_token(token: &str) -> String {
    let trimmed = token.trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    match trimmed.char_indices().nth(4) {
        Some((cut, _)) if trimmed.len() > 12 => format!("{}***", &trimmed[..cut]),
        _ => "<redacted>".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::redact_token;

    #[test]
    fn redaction_keeps_short_prefix_only() {
        assert_eq!(redact_token(""), "<empty>");
        assert_eq!(redact_token("short"), "<redacted>");
        assert_eq!(redact_token("abcdEFGHIJKLMNOP"), "abcd***");
    }
}
