//! Environment-driven configuration.
//!
//! `Config::from_env()` reads everything once at startup; `.env` files are
//! loaded by `main` via dotenvy before this runs. Heuristic thresholds
//! (vagueness, staleness, batch width) are tunable here — they are sensible
//! defaults, not load-bearing constants.

use std::env;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable {0}")]
    MissingVar(&'static str),

    #[error("Invalid value for {var}: {value}")]
    InvalidVar { var: &'static str, value: String },
}

/// OAuth client credentials for one provider.
#[derive(Debug, Clone)]
pub struct OAuthApp {
    pub client_id: String,
    pub client_secret: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Address the HTTP API binds to.
    pub bind_addr: String,
    /// Database file override; defaults to `~/.focusdeck/focusdeck.db`.
    pub db_path: Option<PathBuf>,

    pub openrouter_api_key: String,
    pub ai_model: String,
    pub ai_temperature: f64,

    pub ticktick_client_id: String,
    pub ticktick_client_secret: String,
    pub ticktick_redirect_uri: String,

    pub gmail_oauth: Option<OAuthApp>,
    pub outlook_oauth: Option<OAuthApp>,
    pub email_redirect_uri: String,

    /// Titles with at most this many words are vagueness candidates.
    pub vague_title_max_words: usize,
    /// Marker words that flag a title as vague regardless of length.
    pub vague_markers: Vec<String>,
    /// Days an uncompleted insight may sit before counting as stale.
    pub stale_threshold_days: i64,
    /// Concurrent analyses per batch during bulk re-analysis.
    pub analysis_batch_size: usize,
}

const DEFAULT_VAGUE_MARKERS: &[&str] = &["research", "plan", "think about", "look into"];

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            bind_addr: env_or("FOCUSDECK_BIND", "127.0.0.1:8000"),
            db_path: env::var("FOCUSDECK_DB").ok().map(PathBuf::from),

            openrouter_api_key: required("OPENROUTER_API_KEY")?,
            ai_model: env_or("AI_MODEL", "anthropic/claude-3.5-sonnet"),
            ai_temperature: parsed_or("AI_TEMPERATURE", 0.7)?,

            ticktick_client_id: required("TICKTICK_CLIENT_ID")?,
            ticktick_client_secret: required("TICKTICK_CLIENT_SECRET")?,
            ticktick_redirect_uri: env_or(
                "TICKTICK_REDIRECT_URI",
                "http://localhost:8000/callback",
            ),

            gmail_oauth: oauth_app("GMAIL_CLIENT_ID", "GMAIL_CLIENT_SECRET"),
            outlook_oauth: oauth_app("OUTLOOK_CLIENT_ID", "OUTLOOK_CLIENT_SECRET"),
            email_redirect_uri: env_or(
                "EMAIL_REDIRECT_URI",
                "http://localhost:8000/email/callback",
            ),

            vague_title_max_words: parsed_or("FOCUSDECK_VAGUE_MAX_WORDS", 3)?,
            vague_markers: env::var("FOCUSDECK_VAGUE_MARKERS")
                .map(|raw| {
                    raw.split(',')
                        .map(|m| m.trim().to_lowercase())
                        .filter(|m| !m.is_empty())
                        .collect()
                })
                .unwrap_or_else(|_| {
                    DEFAULT_VAGUE_MARKERS.iter().map(|m| m.to_string()).collect()
                }),
            stale_threshold_days: parsed_or("FOCUSDECK_STALE_DAYS", 3)?,
            analysis_batch_size: parsed_or("FOCUSDECK_ANALYSIS_BATCH", 5)?,
        })
    }
}

fn env_or(var: &'static str, default: &str) -> String {
    env::var(var).unwrap_or_else(|_| default.to_string())
}

fn required(var: &'static str) -> Result<String, ConfigError> {
    env::var(var)
        .ok()
        .filter(|v| !v.is_empty())
        .ok_or(ConfigError::MissingVar(var))
}

fn parsed_or<T: std::str::FromStr>(var: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(var) {
        Ok(raw) => raw
            .parse()
            .map_err(|_| ConfigError::InvalidVar { var, value: raw }),
        Err(_) => Ok(default),
    }
}

fn oauth_app(id_var: &'static str, secret_var: &'static str) -> Option<OAuthApp> {
    let client_id = env::var(id_var).ok().filter(|v| !v.is_empty())?;
    let client_secret = env::var(secret_var).ok().filter(|v| !v.is_empty())?;
    Some(OAuthApp {
        client_id,
        client_secret,
    })
}
