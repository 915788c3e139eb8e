use serde::{Deserialize, Serialize};
use std::{
    fmt,
    net::{IpAddr, Ipv4Addr, SocketAddr},
    path::PathBuf,
};

pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4";
pub const DEFAULT_ELEVENLABS_BASE_URL: &str = "https://api.elevenlabs.io/v1";
pub const DEFAULT_ELEVENLABS_VOICE_ID: &str = "EXAVITQu4vr4xnSDxMaL";
pub const DEFAULT_ELEVENLABS_MODEL_ID: &str = "eleven_monolingual_v1";
pub const DEFAULT_PORT: u16 = 3001;
pub const DEFAULT_FRONTEND_URL: &str = "http://localhost:3000";
pub const DEFAULT_ASSETS_DIR: &str = "assets";

pub const ENV_OPENAI_API_KEY: &str = "OPENAI_API_KEY";
pub const ENV_OPENAI_BASE_URL: &str = "OPENAI_BASE_URL";
pub const ENV_OPENAI_MODEL: &str = "OPENAI_MODEL";
pub const ENV_ELEVENLABS_API_KEY: &str = "ELEVENLABS_API_KEY";
pub const ENV_ELEVENLABS_BASE_URL: &str = "ELEVENLABS_BASE_URL";
pub const ENV_ELEVENLABS_VOICE_ID: &str = "ELEVENLABS_VOICE_ID";
pub const ENV_ELEVENLABS_MODEL_ID: &str = "ELEVENLABS_MODEL_ID";
pub const ENV_PORT: &str = "PORT";
pub const ENV_FRONTEND_URL: &str = "FRONTEND_URL";
pub const ENV_ASSETS_DIR: &str = "ASSETS_DIR";
pub const ENV_DEV_MODE: &str = "SCRIPT2SELF_DEV";

#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn new<S: Into<String>>(value: S) -> Result<Self, ConfigError> {
        let v = value.into();
        if v.trim().is_empty() {
            return Err(ConfigError::EmptyApiKey);
        }
        Ok(Self(v))
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey(**redacted**)")
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ApiKeys {
    pub openai: Option<ApiKey>,
    pub elevenlabs: Option<ApiKey>,
}

/// Chat-completions endpoint used for emotion classification.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct LanguageModelConfig {
    pub base_url: String,
    pub model: String,
}

impl Default for LanguageModelConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_OPENAI_BASE_URL.to_owned(),
            model: DEFAULT_OPENAI_MODEL.to_owned(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct VoiceConfig {
    pub base_url: String,
    pub voice_id: String,
    pub model_id: String,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_ELEVENLABS_BASE_URL.to_owned(),
            voice_id: DEFAULT_ELEVENLABS_VOICE_ID.to_owned(),
            model_id: DEFAULT_ELEVENLABS_MODEL_ID.to_owned(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServerConfig {
    pub bind: SocketAddr,
    pub frontend_origin: String,
    /// Adds internal error details to 5xx bodies.
    pub expose_error_details: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), DEFAULT_PORT),
            frontend_origin: DEFAULT_FRONTEND_URL.to_owned(),
            expose_error_details: false,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct AppConfig {
    pub api_keys: ApiKeys,
    pub language_model: LanguageModelConfig,
    pub voice: VoiceConfig,
    pub assets_dir: PathBuf,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_keys: ApiKeys::default(),
            language_model: LanguageModelConfig::default(),
            voice: VoiceConfig::default(),
            assets_dir: PathBuf::from(DEFAULT_ASSETS_DIR),
        }
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("api key must not be empty")]
    EmptyApiKey,
    #[error("invalid port {0:?}")]
    InvalidPort(String),
}

pub trait Env {
    fn var(&self, key: &str) -> Option<String>;
}

#[derive(Clone, Debug, Default)]
pub struct StdEnv;

impl Env for StdEnv {
    fn var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

#[derive(Clone, Debug, Default)]
pub struct MapEnv {
    vars: std::collections::BTreeMap<String, String>,
}

impl MapEnv {
    pub fn with_var(mut self, key: &str, value: &str) -> Self {
        self.vars.insert(key.to_owned(), value.to_owned());
        self
    }
}

impl Env for MapEnv {
    fn var(&self, key: &str) -> Option<String> {
        self.vars.get(key).cloned()
    }
}

pub fn resolve_api_key(
    cli_value: Option<String>,
    env_key: &str,
    env: &impl Env,
) -> Result<Option<ApiKey>, ConfigError> {
    match cli_value {
        Some(v) => Ok(Some(ApiKey::new(v)?)),
        None => match env.var(env_key) {
            Some(v) => Ok(Some(ApiKey::new(v)?)),
            None => Ok(None),
        },
    }
}

pub fn resolve_string_with_default(
    cli_value: Option<String>,
    env_key: &str,
    env: &impl Env,
    default: &str,
) -> String {
    match cli_value {
        Some(v) => v,
        None => env.var(env_key).unwrap_or_else(|| default.to_owned()),
    }
}

pub fn resolve_port(
    cli_value: Option<u16>,
    env_key: &str,
    env: &impl Env,
) -> Result<u16, ConfigError> {
    match cli_value {
        Some(p) => Ok(p),
        None => match env.var(env_key) {
            Some(raw) => raw
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidPort(raw)),
            None => Ok(DEFAULT_PORT),
        },
    }
}

/// Treats any value other than empty, `0`, `false` or `no` as enabled.
pub fn resolve_flag(cli_value: bool, env_key: &str, env: &impl Env) -> bool {
    if cli_value {
        return true;
    }
    env.var(env_key)
        .map(|v| {
            let v = v.trim().to_ascii_lowercase();
            !(v.is_empty() || v == "0" || v == "false" || v == "no")
        })
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_key_cli_takes_precedence_over_env() {
        let env = MapEnv::default().with_var(ENV_OPENAI_API_KEY, "env-key");
        let key = resolve_api_key(Some("cli-key".to_owned()), ENV_OPENAI_API_KEY, &env)
            .expect("valid key")
            .expect("present");
        assert_eq!(key.expose(), "cli-key");
    }

    #[test]
    fn api_key_env_used_when_cli_missing() {
        let env = MapEnv::default().with_var(ENV_ELEVENLABS_API_KEY, "env-key");
        let key = resolve_api_key(None, ENV_ELEVENLABS_API_KEY, &env)
            .expect("valid key")
            .expect("present");
        assert_eq!(key.expose(), "env-key");
    }

    #[test]
    fn blank_api_key_is_rejected() {
        let env = MapEnv::default().with_var(ENV_OPENAI_API_KEY, "   ");
        let err = resolve_api_key(None, ENV_OPENAI_API_KEY, &env).unwrap_err();
        assert_eq!(err, ConfigError::EmptyApiKey);
    }

    #[test]
    fn api_key_debug_is_redacted() {
        let key = ApiKey::new("sk-secret").unwrap();
        assert!(!format!("{key:?}").contains("sk-secret"));
    }

    #[test]
    fn resolve_string_with_default_precedence() {
        let env = MapEnv::default().with_var(ENV_OPENAI_MODEL, "env");
        assert_eq!(
            resolve_string_with_default(Some("cli".to_owned()), ENV_OPENAI_MODEL, &env, "def"),
            "cli"
        );
        assert_eq!(
            resolve_string_with_default(None, ENV_OPENAI_MODEL, &env, "def"),
            "env"
        );
        assert_eq!(
            resolve_string_with_default(None, ENV_OPENAI_MODEL, &MapEnv::default(), "def"),
            "def"
        );
    }

    #[test]
    fn port_falls_back_to_default_and_rejects_garbage() {
        assert_eq!(resolve_port(None, ENV_PORT, &MapEnv::default()), Ok(DEFAULT_PORT));

        let env = MapEnv::default().with_var(ENV_PORT, "8080");
        assert_eq!(resolve_port(None, ENV_PORT, &env), Ok(8080));
        assert_eq!(resolve_port(Some(9000), ENV_PORT, &env), Ok(9000));

        let env = MapEnv::default().with_var(ENV_PORT, "http");
        assert!(matches!(
            resolve_port(None, ENV_PORT, &env),
            Err(ConfigError::InvalidPort(_))
        ));
    }

    #[test]
    fn dev_flag_from_env() {
        assert!(!resolve_flag(false, ENV_DEV_MODE, &MapEnv::default()));
        assert!(resolve_flag(true, ENV_DEV_MODE, &MapEnv::default()));

        let env = MapEnv::default().with_var(ENV_DEV_MODE, "1");
        assert!(resolve_flag(false, ENV_DEV_MODE, &env));

        let env = MapEnv::default().with_var(ENV_DEV_MODE, "false");
        assert!(!resolve_flag(false, ENV_DEV_MODE, &env));
    }
}
