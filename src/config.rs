use std::env;

use reqwest::Url;

use crate::api::models::UserId;
use crate::error::{AppError, Result};

const DEFAULT_BACKEND_URL: &str = "http://localhost:8000";
const DEFAULT_USER_ID: &str = "1";
const DEFAULT_ROWS: u32 = 24;

#[derive(Clone, Debug)]
pub struct Config {
    pub backend_url: Url,
    pub user_id: UserId,
    pub viewport_rows: u32,
    pub card_rows: u32,
}

impl Config {
    pub fn load() -> Result<Self> {
        // Load environment variables from .env file if it exists
        dotenv::dotenv().ok();

        let backend_url =
            env::var("NEWS_BACKEND_URL").unwrap_or_else(|_| DEFAULT_BACKEND_URL.to_string());
        let user_id = env::var("NEWS_USER_ID").unwrap_or_else(|_| DEFAULT_USER_ID.to_string());
        let viewport_rows = env::var("NEWS_VIEWPORT_ROWS").ok();
        let card_rows = env::var("NEWS_CARD_ROWS").ok();

        Self::from_parts(&backend_url, &user_id, viewport_rows.as_deref(), card_rows.as_deref())
    }

    /// Validates raw settings. Missing row counts fall back to the defaults.
    pub fn from_parts(
        backend_url: &str,
        user_id: &str,
        viewport_rows: Option<&str>,
        card_rows: Option<&str>,
    ) -> Result<Self> {
        let backend_url = parse_backend_url(backend_url)?;
        let user_id = UserId::new(user_id)
            .map_err(|e| AppError::ConfigError(format!("Invalid NEWS_USER_ID: {}", e)))?;
        let viewport_rows = parse_rows("NEWS_VIEWPORT_ROWS", viewport_rows)?;
        let card_rows = parse_rows("NEWS_CARD_ROWS", card_rows)?;

        Ok(Config {
            backend_url,
            user_id,
            viewport_rows,
            card_rows,
        })
    }
}

fn parse_backend_url(raw: &str) -> Result<Url> {
    let url = Url::parse(raw.trim())
        .map_err(|e| AppError::ConfigError(format!("Invalid backend URL: {}", e)))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(AppError::ConfigError(format!("Unsupported backend URL scheme: {}", other))),
    }
}

fn parse_rows(name: &str, raw: Option<&str>) -> Result<u32> {
    let Some(raw) = raw else {
        return Ok(DEFAULT_ROWS);
    };
    let rows = raw
        .trim()
        .parse::<u32>()
        .map_err(|e| AppError::ConfigError(format!("Invalid {}: {}", name, e)))?;
    if rows == 0 {
        return Err(AppError::ConfigError(format!("{} must be greater than zero", name)));
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_when_rows_are_missing() {
        let config = Config::from_parts("http://localhost:8000", "1", None, None).unwrap();
        assert_eq!(config.backend_url.as_str(), "http://localhost:8000/");
        assert_eq!(config.user_id.as_str(), "1");
        assert_eq!(config.viewport_rows, 24);
        assert_eq!(config.card_rows, 24);
    }

    #[test]
    fn rejects_blank_user_id() {
        let err = Config::from_parts("http://localhost:8000", "   ", None, None).unwrap_err();
        assert!(matches!(err, AppError::ConfigError(_)));
    }

    #[test]
    fn rejects_non_http_backend() {
        let err = Config::from_parts("ftp://news.example", "1", None, None).unwrap_err();
        assert!(matches!(err, AppError::ConfigError(_)));
    }

    #[test]
    fn rejects_zero_rows() {
        let err = Config::from_parts("https://news.example", "7", Some("0"), None).unwrap_err();
        assert!(matches!(err, AppError::ConfigError(_)));

        let config =
            Config::from_parts("https://news.example", "7", Some("30"), Some("10")).unwrap();
        assert_eq!(config.viewport_rows, 30);
        assert_eq!(config.card_rows, 10);
    }
}
