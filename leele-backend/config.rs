use std::time::Duration;

const DEFAULT_PORT: u16 = 8081;
const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "gpt-4o-mini";
const DEFAULT_TEMPERATURE: f32 = 0.7;
const DEFAULT_MAX_TOKENS: u32 = 4096;
const DEFAULT_TIMEOUT_SECS: u64 = 120;
const DEFAULT_SSE_BUFFER: usize = 256;

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("OPENAI_API_KEY is not set in environment variables")]
    MissingApiKey,

    #[error("invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },
}

/// Server configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub sentry_dsn: Option<String>,
    pub environment: String,
    /// Capacity of the per-request event queue between a flow run and its SSE response.
    pub sse_buffer: usize,
    pub provider: ProviderConfig,
}

/// Settings for the completion provider client.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a Config from a key lookup (as env vars would be read).
    /// Used directly in tests to avoid mutating process-global environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let api_key = get("OPENAI_API_KEY").ok_or(ConfigError::MissingApiKey)?;

        let port = get("PORT")
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_PORT);

        let base_url = get("OPENAI_BASE_URL")
            .map(|v| v.trim_end_matches('/').to_string())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        let model = get("OPENAI_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string());

        let temperature = match get("OPENAI_TEMPERATURE") {
            Some(raw) => match raw.parse::<f32>() {
                Ok(t) if (0.0..=2.0).contains(&t) => t,
                _ => {
                    return Err(ConfigError::Invalid {
                        key: "OPENAI_TEMPERATURE",
                        value: raw,
                    });
                }
            },
            None => DEFAULT_TEMPERATURE,
        };

        let max_tokens = parse_positive(get("OPENAI_MAX_TOKENS"), "OPENAI_MAX_TOKENS")?
            .unwrap_or(DEFAULT_MAX_TOKENS);

        let timeout_secs = parse_positive(get("OPENAI_TIMEOUT_SECS"), "OPENAI_TIMEOUT_SECS")?
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        let sse_buffer = parse_positive(get("SSE_BUFFER"), "SSE_BUFFER")?
            .unwrap_or(DEFAULT_SSE_BUFFER);

        let environment = get("ENVIRONMENT").unwrap_or_else(|| "local".to_string());

        Ok(Config {
            port,
            sentry_dsn: get("SENTRY_DSN"),
            environment,
            sse_buffer,
            provider: ProviderConfig {
                api_key,
                base_url,
                model,
                temperature,
                max_tokens,
                timeout: Duration::from_secs(timeout_secs),
            },
        })
    }
}

fn parse_positive<T>(raw: Option<String>, key: &'static str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr + PartialOrd + Default,
{
    match raw {
        None => Ok(None),
        Some(value) => match value.parse::<T>() {
            Ok(n) if n > T::default() => Ok(Some(n)),
            _ => Err(ConfigError::Invalid { key, value }),
        },
    }
}
