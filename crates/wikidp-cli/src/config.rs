//! Portal configuration: profile defaults, an optional JSON file and
//! environment variables, in that order. Command-line flags are applied on
//! top by `main`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use wikidp_portal::source::DEFAULT_API_URL;
use wikidp_portal::{LanguagePreference, DEFAULT_SCHEMA_DIR, DEFAULT_WRITE_API_URL};
use wikidp_sparql::ids::{ITEM_REGEX, PROPERTY_REGEX};
use wikidp_sparql::{DEFAULT_SPARQL_URL, DEFAULT_USER_AGENT};

pub const SIGN_UP_URL: &str = "https://www.wikidata.org/w/index.php?title=Special:CreateAccount";

/// Languages offered by the UI language picker.
pub const DEFAULT_UI_LANGUAGES: [(&str, &str); 16] = [
    ("en", "English"),
    ("fr", "français (French)"),
    ("es", "Spanish"),
    ("de", "German"),
    ("da", "Danish"),
    ("nl", "Dutch"),
    ("zh", "Chinese"),
    ("ar", "Arabic"),
    ("it", "Italian"),
    ("lv", "Latvian"),
    ("et", "Estonian"),
    ("fi", "Finnish"),
    ("pt", "Portuguese"),
    ("sv", "Swedish"),
    ("no", "Norwegian"),
    ("ja", "Japanese"),
];

const REDACTED: &str = "********";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigProfile {
    #[default]
    Dev,
    Default,
}

impl ConfigProfile {
    fn parse(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "dev" => Ok(Self::Dev),
            "default" => Ok(Self::Default),
            other => Err(anyhow!(
                "unknown WIKIDP_CONFIG profile `{other}` (expected `dev` or `default`)"
            )),
        }
    }

    pub fn log_level(self) -> &'static str {
        match self {
            Self::Dev => "debug",
            Self::Default => "info",
        }
    }

    pub fn log_format(self) -> LogFormat {
        match self {
            Self::Dev => LogFormat::Verbose,
            Self::Default => LogFormat::Compact,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Timestamp, level, file:line and target.
    Verbose,
    Compact,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PortalConfig {
    pub profile: ConfigProfile,
    pub log_format: LogFormat,
    pub host: String,
    pub port: u16,
    pub lang: String,
    pub fallback_lang: String,
    pub bot_user: Option<String>,
    pub bot_password: Option<String>,
    pub oauth_token: Option<String>,
    pub log_file: Option<PathBuf>,
    pub schema_dir: PathBuf,
    pub sparql_url: String,
    pub api_url: String,
    pub write_api_url: String,
    pub user_agent: String,
    pub timeout_secs: u64,
    pub item_regex: String,
    pub property_regex: String,
}

impl Default for PortalConfig {
    fn default() -> Self {
        Self::for_profile(ConfigProfile::Dev)
    }
}

impl PortalConfig {
    pub fn for_profile(profile: ConfigProfile) -> Self {
        Self {
            profile,
            log_format: profile.log_format(),
            host: "0.0.0.0".to_string(),
            port: 5000,
            lang: "en".to_string(),
            fallback_lang: "en".to_string(),
            bot_user: None,
            bot_password: None,
            oauth_token: None,
            log_file: None,
            schema_dir: PathBuf::from(DEFAULT_SCHEMA_DIR),
            sparql_url: DEFAULT_SPARQL_URL.to_string(),
            api_url: DEFAULT_API_URL.to_string(),
            write_api_url: DEFAULT_WRITE_API_URL.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            timeout_secs: 30,
            item_regex: ITEM_REGEX.to_string(),
            property_regex: PROPERTY_REGEX.to_string(),
        }
    }

    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable lookup (tests pass a map).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let profile = match lookup("WIKIDP_CONFIG") {
            Some(name) => ConfigProfile::parse(&name)?,
            None => ConfigProfile::default(),
        };
        let mut config = Self::for_profile(profile);

        if let Some(path) = lookup("WIKIDP_CONFIG_FILE").filter(|p| !p.is_empty()) {
            config = config.overlay_file(Path::new(&path))?;
        }

        if let Some(port) = lookup("PORT") {
            config.port = port
                .trim()
                .parse()
                .with_context(|| format!("PORT is not a port number: `{port}`"))?;
        }
        let set = |target: &mut String, key: &str| {
            if let Some(v) = lookup(key).filter(|v| !v.is_empty()) {
                *target = v;
            }
        };
        set(&mut config.host, "WIKIDP_HOST");
        set(&mut config.lang, "WIKIDP_LANG");
        set(&mut config.fallback_lang, "WIKIDP_FB_LANG");
        set(&mut config.sparql_url, "WIKIDP_SPARQL_URL");
        set(&mut config.api_url, "WIKIDP_API_URL");
        set(&mut config.write_api_url, "WIKIDP_WRITE_API_URL");

        let optional = |key: &str| lookup(key).filter(|v| !v.is_empty());
        if let Some(user) = optional("WIKIDP_BOT_USER") {
            config.bot_user = Some(user);
        }
        if let Some(password) = optional("WIKIDP_BOT_PASSWORD") {
            config.bot_password = Some(password);
        }
        if let Some(token) = optional("WIKIDP_OAUTH_TOKEN") {
            config.oauth_token = Some(token);
        }
        if let Some(path) = optional("WIKIDP_LOG_FILE") {
            config.log_file = Some(PathBuf::from(path));
        }
        if let Some(dir) = optional("WIKIDP_SCHEMA_DIR") {
            config.schema_dir = PathBuf::from(dir);
        }

        Ok(config)
    }

    /// Fields present in the JSON object replace the current values.
    pub fn overlay_file(&self, path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let overlay: Value = serde_json::from_str(&text)
            .with_context(|| format!("config file {} is not JSON", path.display()))?;
        self.overlay(overlay)
            .with_context(|| format!("invalid config file {}", path.display()))
    }

    fn overlay(&self, overlay: Value) -> Result<Self> {
        let Value::Object(fields) = overlay else {
            return Err(anyhow!("expected a JSON object"));
        };
        let mut merged = serde_json::to_value(self)?;
        if let Value::Object(base) = &mut merged {
            base.extend(fields);
        }
        Ok(serde_json::from_value(merged)?)
    }

    pub fn languages(&self) -> LanguagePreference {
        LanguagePreference::new(self.lang.clone(), self.fallback_lang.clone())
    }

    pub fn wikibase_language(&self) -> String {
        self.languages().wikibase_language()
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Copy safe to print: credentials masked.
    pub fn redacted(&self) -> Self {
        let mask = |v: &Option<String>| v.as_ref().map(|_| REDACTED.to_string());
        Self {
            bot_password: mask(&self.bot_password),
            oauth_token: mask(&self.oauth_token),
            ..self.clone()
        }
    }
}
