use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::AppError;

pub const DEFAULT_API_BASE_URL: &str = "http://localhost/laundry/public/api";
pub const DEFAULT_GEOCODE_URL: &str = "https://maps.googleapis.com/maps/api/geocode/json";

#[derive(Debug, Clone)]
pub struct Config {
    pub api_base_url: String,
    pub maps_api_key: Option<String>,
    pub geocode_url: String,
    pub http_port: u16,
    pub base_path: String,
    pub static_dir: PathBuf,
    pub log_level: String,
    pub log_json: bool,
    pub request_timeout: Duration,
    pub notification_buffer: usize,
    pub token_path: Option<PathBuf>,
    pub transition_table_path: Option<PathBuf>,
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        let _ = dotenvy::dotenv();

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from an arbitrary key lookup, so callers are not
    /// tied to the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let base_path = normalize_base_path(
            &lookup("BASE_PATH").unwrap_or_else(|| "/driver-app".to_string()),
        );

        Ok(Self {
            api_base_url: lookup("API_BASE_URL")
                .unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            maps_api_key: lookup("MAPS_API_KEY").filter(|key| !key.trim().is_empty()),
            geocode_url: lookup("GEOCODE_URL").unwrap_or_else(|| DEFAULT_GEOCODE_URL.to_string()),
            http_port: parse_or_default(&lookup, "HTTP_PORT", 3000)?,
            base_path,
            static_dir: lookup("STATIC_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("build")),
            log_level: lookup("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            log_json: lookup("LOG_FORMAT").is_some_and(|format| format == "json"),
            request_timeout: Duration::from_secs(parse_or_default(
                &lookup,
                "REQUEST_TIMEOUT_SECS",
                30,
            )?),
            notification_buffer: parse_or_default(&lookup, "NOTIFICATION_BUFFER", 64)?,
            token_path: lookup("TOKEN_PATH").map(PathBuf::from),
            transition_table_path: lookup("TRANSITION_TABLE_PATH").map(PathBuf::from),
        })
    }
}

fn normalize_base_path(raw: &str) -> String {
    let trimmed = raw.trim().trim_matches('/');
    format!("/{trimmed}")
}

fn parse_or_default<F, T>(lookup: &F, key: &str, default: T) -> Result<T, AppError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw
            .parse::<T>()
            .map_err(|err| AppError::Config(format!("invalid {key}: {err}"))),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::Config;

    fn config_from(pairs: &[(&str, &str)]) -> Result<Config, crate::error::AppError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_when_nothing_is_set() {
        let config = config_from(&[]).unwrap();

        assert_eq!(config.api_base_url, "http://localhost/laundry/public/api");
        assert_eq!(config.http_port, 3000);
        assert_eq!(config.base_path, "/driver-app");
        assert_eq!(config.request_timeout.as_secs(), 30);
        assert!(config.maps_api_key.is_none());
        assert!(!config.log_json);
    }

    #[test]
    fn trims_trailing_slash_and_normalizes_prefix() {
        let config = config_from(&[
            ("API_BASE_URL", "https://api.example.com/api/"),
            ("BASE_PATH", "portal/"),
            ("MAPS_API_KEY", "  "),
        ])
        .unwrap();

        assert_eq!(config.api_base_url, "https://api.example.com/api");
        assert_eq!(config.base_path, "/portal");
        assert!(config.maps_api_key.is_none());
    }

    #[test]
    fn invalid_port_is_an_error() {
        let err = config_from(&[("HTTP_PORT", "eighty")]).unwrap_err();
        assert!(err.to_string().contains("HTTP_PORT"));
    }
}
