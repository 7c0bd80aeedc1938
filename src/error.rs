#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Failed to fetch data: {0}")]
    FetchError(String),

    #[error("Error parsing response: {0}")]
    ParseError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Visibility detection unavailable: {0}")]
    VisibilityUnavailable(String),

    #[error("Card {0} is not attached to the display surface")]
    Detached(u64),
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            AppError::ParseError(err.to_string())
        } else {
            AppError::FetchError(err.to_string())
        }
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
