use crate::errors::BridgeError;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "gpt-4o";
const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 80;

/// Runtime configuration, read once from the environment at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// Shared token used to verify WeChat callback signatures.
    pub wechat_token: String,
    /// API key for the chat-completion endpoint.
    pub api_key: String,
    /// Base URL of the chat-completion endpoint, without a trailing slash.
    pub base_url: String,
    /// Completion model name.
    pub model: String,
    pub host: String,
    pub port: u16,
    /// Whether per-user conversation history is kept between messages.
    pub history_enabled: bool,
}

impl Config {
    pub fn from_env() -> Result<Self, BridgeError> {
        let wechat_token = require("WECHAT_TOKEN")?;
        let api_key = require("OPENAI_API_KEY")?;

        let base_url = optional("OPENAI_BASE_URL")
            .map(|url| url.trim_end_matches('/').to_string())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let model = optional("OPENAI_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string());
        let host = optional("HOST").unwrap_or_else(|| DEFAULT_HOST.to_string());

        let port = match optional("PORT") {
            Some(raw) => raw
                .parse::<u16>()
                .map_err(|_| BridgeError::Config(format!("PORT is not a valid port: {raw}")))?,
            None => DEFAULT_PORT,
        };

        let history_enabled = optional("WXBRIDGE_HISTORY")
            .map(|raw| parse_flag(&raw))
            .unwrap_or(true);

        Ok(Self {
            wechat_token,
            api_key,
            base_url,
            model,
            host,
            port,
            history_enabled,
        })
    }
}

fn require(name: &str) -> Result<String, BridgeError> {
    optional(name).ok_or_else(|| BridgeError::Config(format!("{name} must be set")))
}

/// A set-but-empty variable counts as unset.
fn optional(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parse_flag(raw: &str) -> bool {
    !matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "0" | "false" | "off" | "no"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flag_defaults_to_enabled() {
        assert!(parse_flag("1"));
        assert!(parse_flag("true"));
        assert!(parse_flag("anything"));
    }

    #[test]
    fn flag_recognizes_disabling_values() {
        for raw in ["0", "false", "FALSE", "off", "no", " off "] {
            assert!(!parse_flag(raw), "should disable: {raw}");
        }
    }

    #[test]
    fn missing_variable_is_a_config_error() {
        let err = require("WXBRIDGE_TEST_VARIABLE_THAT_IS_NEVER_SET").unwrap_err();
        assert!(matches!(err, BridgeError::Config(_)));
        assert!(err.to_string().contains("must be set"));
    }
}
