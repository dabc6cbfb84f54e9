use anyhow::{Context, Result};

/// Immutable runtime configuration, read once from the process
/// environment at startup and passed into the dispatcher and
/// scheduler. Business logic never touches `std::env` directly.
#[derive(Debug, Clone)]
pub struct Config {
    pub llm: LlmConfig,
    pub whatsapp: WhatsAppConfig,
    pub trigger: TriggerConfig,
    pub digest: DigestConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_key: String,
    pub model: String,
}

#[derive(Debug, Clone)]
pub struct WhatsAppConfig {
    pub base_url: String,
    pub api_key: String,
    pub instance: String,
}

#[derive(Debug, Clone)]
pub struct TriggerConfig {
    /// Case-insensitive substring that activates the assistant.
    pub token: String,
    /// When true, the trigger only fires in `digest.group_jid`.
    pub group_only: bool,
}

#[derive(Debug, Clone)]
pub struct DigestConfig {
    /// Target group JID. When unset, the daily digest is not scheduled.
    pub group_jid: Option<String>,
    pub weather_api_key: Option<String>,
    pub news_api_key: Option<String>,
    pub locations: Vec<String>,
    pub hour: u32,
    pub minute: u32,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

fn default_model() -> String {
    "gemini-2.0-flash".to_string()
}

fn default_evolution_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_trigger_token() -> String {
    "@tia".to_string()
}

fn default_locations() -> Vec<String> {
    vec!["São Paulo".to_string(), "Rio de Janeiro".to_string()]
}

fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

impl Config {
    /// Build the configuration from environment variables. Everything
    /// is absence-tolerant except `GEMINI_API_KEY`, which fails fast
    /// so the bot never starts in a silently degraded state.
    pub fn from_env() -> Result<Self> {
        let api_key = env_opt("GEMINI_API_KEY")
            .context("GEMINI_API_KEY is not set; the bot cannot generate replies without it")?;

        let locations = env_opt("DIGEST_LOCATIONS")
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_else(default_locations);

        let hour = parse_env("DIGEST_HOUR", 6)?;
        let minute = parse_env("DIGEST_MINUTE", 30)?;
        anyhow::ensure!(hour < 24, "DIGEST_HOUR must be 0-23, got {hour}");
        anyhow::ensure!(minute < 60, "DIGEST_MINUTE must be 0-59, got {minute}");

        Ok(Self {
            llm: LlmConfig {
                api_key,
                model: env_opt("GEMINI_MODEL").unwrap_or_else(default_model),
            },
            whatsapp: WhatsAppConfig {
                base_url: env_opt("EVOLUTION_API_URL")
                    .map(|u| u.trim_end_matches('/').to_string())
                    .unwrap_or_else(default_evolution_url),
                api_key: env_opt("EVOLUTION_API_KEY").unwrap_or_default(),
                instance: env_opt("EVOLUTION_INSTANCE").unwrap_or_else(|| "tiabot".to_string()),
            },
            trigger: TriggerConfig {
                token: env_opt("TRIGGER_TOKEN").unwrap_or_else(default_trigger_token),
                group_only: env_opt("TRIGGER_GROUP_ONLY")
                    .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes"))
                    .unwrap_or(false),
            },
            digest: DigestConfig {
                group_jid: env_opt("GROUP_JID"),
                weather_api_key: env_opt("OPENWEATHER_API_KEY"),
                news_api_key: env_opt("NEWS_API_KEY"),
                locations,
                hour,
                minute,
            },
            server: ServerConfig {
                port: parse_env("PORT", 5000)?,
            },
        })
    }
}

fn parse_env<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env_opt(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("Failed to parse {key}={raw}")),
        None => Ok(default),
    }
}
