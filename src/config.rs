use std::{
    env,
    net::SocketAddr,
    path::{Path, PathBuf},
};

use thiserror::Error;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_PORT: u16 = 4000;

/// Where the upstream client takes its bearer credential from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CredentialSource {
    /// `OPENAI_API_KEY` from the process environment.
    #[default]
    Env,
    /// The caller's credential carried by the current request context.
    Request,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub openai_api_key: String,
    pub openai_base_url: String,
    pub bind_addr: String,
    pub port: u16,
    pub credential_source: CredentialSource,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("OPENAI_API_KEY is required and must not be empty")]
    MissingApiKey,
    #[error("OPENAI_BASE_URL must be an http(s) URL")]
    InvalidBaseUrl,
    #[error("PORT must be a valid u16")]
    InvalidPort,
    #[error("OPENAI_CREDENTIAL_SOURCE must be one of: env, request")]
    InvalidCredentialSource,
    #[error("invalid bind address or port")]
    InvalidSocket,
}

/// Loads a `.env` file from the working directory or one of its parents.
/// Variables already set in the process environment win. A missing file is
/// not an error; the path of the loaded file is returned when there was one.
pub fn load_dotenv() -> Option<PathBuf> {
    dotenvy::dotenv().ok()
}

/// Same as [`load_dotenv`] for an explicit file.
pub fn load_dotenv_from(path: &Path) -> Option<PathBuf> {
    dotenvy::from_path(path).ok().map(|_| path.to_path_buf())
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let openai_api_key = non_empty("OPENAI_API_KEY").ok_or(ConfigError::MissingApiKey)?;

        let openai_base_url = non_empty("OPENAI_BASE_URL")
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
            .trim_end_matches('/')
            .to_string();
        if !(openai_base_url.starts_with("http://") || openai_base_url.starts_with("https://")) {
            return Err(ConfigError::InvalidBaseUrl);
        }

        let bind_addr = non_empty("BIND_ADDR").unwrap_or_else(|| "0.0.0.0".to_string());
        let port = non_empty("PORT")
            .map(|value| value.parse::<u16>().map_err(|_| ConfigError::InvalidPort))
            .transpose()?
            .unwrap_or(DEFAULT_PORT);

        let credential_source = match non_empty("OPENAI_CREDENTIAL_SOURCE")
            .map(|value| value.to_ascii_lowercase())
            .as_deref()
        {
            None | Some("env") => CredentialSource::Env,
            Some("request") => CredentialSource::Request,
            Some(_) => return Err(ConfigError::InvalidCredentialSource),
        };

        let config = Self {
            openai_api_key,
            openai_base_url,
            bind_addr,
            port,
            credential_source,
        };

        let _ = config.bind_socket()?;
        Ok(config)
    }

    pub fn bind_socket(&self) -> Result<SocketAddr, ConfigError> {
        format!("{}:{}", self.bind_addr, self.port)
            .parse::<SocketAddr>()
            .map_err(|_| ConfigError::InvalidSocket)
    }
}
