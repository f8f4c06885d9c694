use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::{CommandSpec, ConfigError, HookSpec, env_optional, parse_bool, write_atomic};

pub(crate) const APP_DIR_NAME: &str = "deskmate";
pub(crate) const DEFAULT_GEMINI_MODEL: &str = "gemini-2.5-flash";
pub(crate) const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub(crate) const DEFAULT_GMAIL_API_BASE: &str = "https://gmail.googleapis.com/gmail/v1/users/me";

// ── Sections ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub(crate) enum ModelProvider {
    Gemini,
    Hook,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub(crate) struct ModelConfig {
    pub(crate) provider: ModelProvider,
    pub(crate) model: String,
    pub(crate) temperature: f64,
    pub(crate) max_output_tokens: Option<u32>,
    pub(crate) base_url: String,
    pub(crate) api_key_env: String,
    pub(crate) timeout_secs: u64,
    pub(crate) max_retries: usize,
    pub(crate) retry_base_secs: f64,
    pub(crate) retry_max_secs: f64,
    pub(crate) hook: Option<HookSpec>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: ModelProvider::Gemini,
            model: DEFAULT_GEMINI_MODEL.to_string(),
            temperature: 0.3,
            max_output_tokens: None,
            base_url: DEFAULT_GEMINI_BASE_URL.to_string(),
            api_key_env: "GEMINI_API_KEY".to_string(),
            timeout_secs: 120,
            max_retries: 2,
            retry_base_secs: 0.5,
            retry_max_secs: 4.0,
            hook: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub(crate) struct GmailConfig {
    pub(crate) enabled: bool,
    pub(crate) token_path: Option<PathBuf>,
    pub(crate) api_base: String,
    pub(crate) timeout_secs: u64,
    pub(crate) client_id: Option<String>,
    pub(crate) client_secret: Option<String>,
}

impl Default for GmailConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            token_path: None,
            api_base: DEFAULT_GMAIL_API_BASE.to_string(),
            timeout_secs: 30,
            client_id: None,
            client_secret: None,
        }
    }
}

impl GmailConfig {
    pub(crate) fn resolved_token_path(&self) -> Option<PathBuf> {
        self.token_path
            .clone()
            .or_else(|| app_config_dir().map(|dir| dir.join("gmail_token.json")))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub(crate) struct ArchiveConfig {
    pub(crate) enabled: bool,
    pub(crate) path: Option<PathBuf>,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: None,
        }
    }
}

impl ArchiveConfig {
    pub(crate) fn resolved_path(&self) -> PathBuf {
        self.path.clone().unwrap_or_else(|| {
            dirs::data_dir()
                .map(|dir| dir.join(APP_DIR_NAME))
                .unwrap_or_else(|| PathBuf::from(".deskmate"))
                .join("sessions.sqlite")
        })
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub(crate) struct PathsConfig {
    pub(crate) desktop_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub(crate) struct AppConfig {
    pub(crate) model: ModelConfig,
    pub(crate) gmail: GmailConfig,
    pub(crate) archive: ArchiveConfig,
    pub(crate) paths: PathsConfig,
    pub(crate) system_prompt: Option<String>,
}

// ── Loading ─────────────────────────────────────────────────────────

pub(crate) fn app_config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(APP_DIR_NAME))
}

pub(crate) fn default_config_path() -> Option<PathBuf> {
    app_config_dir().map(|dir| dir.join("config.json"))
}

/// Missing file means defaults; an unreadable or malformed one is an error.
pub(crate) fn load_file_config(path: &Path) -> Result<AppConfig, ConfigError> {
    let data = match std::fs::read_to_string(path) {
        Ok(data) => data,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(AppConfig::default()),
        Err(source) => {
            return Err(ConfigError::Read {
                path: path.to_path_buf(),
                source,
            });
        }
    };
    serde_json::from_str(&data).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

pub(crate) fn save_file_config(path: &Path, config: &AppConfig) -> Result<(), ConfigError> {
    let json = serde_json::to_string_pretty(config)?;
    write_atomic(path, json.as_bytes())?;
    Ok(())
}

/// Write a config file holding every default, for editing by hand.
pub(crate) fn init_config_file(explicit: Option<&Path>, force: bool) -> Result<PathBuf, ConfigError> {
    let path = explicit
        .map(Path::to_path_buf)
        .or_else(default_config_path)
        .ok_or(ConfigError::NoConfigDir)?;
    if path.exists() && !force {
        return Err(ConfigError::AlreadyExists(path));
    }
    save_file_config(&path, &AppConfig::default())?;
    tracing::info!(path = %path.display(), "wrote default config");
    Ok(path)
}

/// Overlay `DESKMATE_*` variables (and Google client credentials) read through `lookup`.
pub(crate) fn apply_env_overrides(
    config: &mut AppConfig,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<(), ConfigError> {
    let invalid = |name: &str, value: &str| ConfigError::InvalidEnv {
        name: name.to_string(),
        value: value.to_string(),
    };

    if let Some(provider) = lookup("DESKMATE_PROVIDER") {
        config.model.provider = match provider.trim().to_ascii_lowercase().as_str() {
            "gemini" => ModelProvider::Gemini,
            "hook" => ModelProvider::Hook,
            _ => return Err(invalid("DESKMATE_PROVIDER", &provider)),
        };
    }
    if let Some(model) = lookup("DESKMATE_MODEL") {
        config.model.model = model.trim().to_string();
    }
    if let Some(value) = lookup("DESKMATE_TEMPERATURE") {
        config.model.temperature = value
            .trim()
            .parse::<f64>()
            .map_err(|_| invalid("DESKMATE_TEMPERATURE", &value))?;
    }
    if let Some(command) = lookup("DESKMATE_MODEL_HOOK") {
        config.model.hook = Some(HookSpec {
            command: CommandSpec::String(command),
            timeout_ms: config.model.hook.as_ref().and_then(|h| h.timeout_ms),
        });
        config.model.provider = ModelProvider::Hook;
    }
    if let Some(path) = lookup("DESKMATE_ARCHIVE_PATH") {
        config.archive.path = Some(PathBuf::from(path));
    }
    if let Some(path) = lookup("DESKMATE_DESKTOP_DIR") {
        config.paths.desktop_dir = Some(PathBuf::from(path));
    }
    if let Some(path) = lookup("DESKMATE_GMAIL_TOKEN") {
        config.gmail.token_path = Some(PathBuf::from(path));
    }
    if let Some(value) = lookup("DESKMATE_GMAIL_ENABLED") {
        config.gmail.enabled =
            parse_bool(&value).ok_or_else(|| invalid("DESKMATE_GMAIL_ENABLED", &value))?;
    }
    if let Some(id) = lookup("GOOGLE_CLIENT_ID") {
        config.gmail.client_id = Some(id);
    }
    if let Some(secret) = lookup("GOOGLE_CLIENT_SECRET") {
        config.gmail.client_secret = Some(secret);
    }
    Ok(())
}

/// `.env`, then the JSON file, then environment overrides.
pub(crate) fn load_app_config(explicit: Option<&Path>) -> Result<AppConfig, ConfigError> {
    if let Ok(path) = dotenvy::dotenv() {
        tracing::debug!(path = %path.display(), "loaded .env");
    }
    let path = explicit.map(Path::to_path_buf).or_else(default_config_path);
    let mut config = match &path {
        Some(path) => load_file_config(path)?,
        None => AppConfig::default(),
    };
    if explicit.is_some() && path.as_deref().is_some_and(|p| !p.exists()) {
        tracing::warn!(path = ?path, "config file not found; using defaults");
    }
    apply_env_overrides(&mut config, env_optional)?;
    Ok(config)
}
