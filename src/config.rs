use std::str::FromStr;

use anyhow::{anyhow, Context};

pub const DEFAULT_PORT: u16 = 3001;
pub const DEFAULT_DATABASE_URL: &str = "sqlite://anonychat.db?mode=rwc";
pub const DEFAULT_CORS_ORIGINS: &str = "http://localhost:5173,https://anonychat-eta.vercel.app";
pub const DEFAULT_MAX_MESSAGE_LENGTH: usize = 500;

#[derive(Debug, Clone)]
pub struct OAuthKeys {
    pub client_id: String,
    pub client_secret: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub database_url: String,
    pub cors_origins: Vec<String>,
    pub firebase_project_id: String,
    pub firebase_api_key: Option<String>,
    pub google: Option<OAuthKeys>,
    pub github: Option<OAuthKeys>,
    pub public_url: String,
    pub max_message_length: usize,
}

impl Config {
    /// Loads `.env` if present, then reads the process environment.
    pub fn from_env() -> anyhow::Result<Config> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| dotenv::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Config> {
        let port = parse_or(&lookup, "PORT", DEFAULT_PORT)?;
        let max_message_length = parse_or(&lookup, "MAX_MESSAGE_LENGTH", DEFAULT_MAX_MESSAGE_LENGTH)?;

        let firebase_project_id = lookup("FIREBASE_PROJECT_ID")
            .filter(|x| !x.is_empty())
            .ok_or(anyhow!("FIREBASE_PROJECT_ID must be set"))?;

        let cors_origins = lookup("CORS_ORIGINS")
            .unwrap_or(DEFAULT_CORS_ORIGINS.to_owned())
            .split(',')
            .map(str::trim)
            .filter(|x| !x.is_empty())
            .map(str::to_owned)
            .collect();

        let oauth_keys = |prefix: &str| -> anyhow::Result<Option<OAuthKeys>> {
            let id = lookup(&format!("{prefix}_CLIENT_ID"));
            let secret = lookup(&format!("{prefix}_CLIENT_SECRET"));
            match (id, secret) {
                (Some(client_id), Some(client_secret)) => Ok(Some(OAuthKeys { client_id, client_secret })),
                (None, None) => Ok(None),
                _ => Err(anyhow!("{prefix}_CLIENT_ID and {prefix}_CLIENT_SECRET must be set together")),
            }
        };

        Ok(Config {
            port,
            database_url: lookup("DATABASE_URL").unwrap_or(DEFAULT_DATABASE_URL.to_owned()),
            cors_origins,
            firebase_project_id,
            firebase_api_key: lookup("FIREBASE_API_KEY").filter(|x| !x.is_empty()),
            google: oauth_keys("GOOGLE")?,
            github: oauth_keys("GITHUB")?,
            public_url: lookup("PUBLIC_URL")
                .map(|x| x.trim_end_matches('/').to_owned())
                .unwrap_or(format!("http://localhost:{port}")),
            max_message_length,
        })
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(value) => value.parse().with_context(|| format!("invalid {key}: {value}")),
        None => Ok(default),
    }
}
