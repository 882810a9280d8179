use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Garmin Connect API error: {0}")]
    Garmin(String),

    #[error("Garmin authentication error: {0}")]
    GarminAuth(String),

    #[error("Garmin MFA code required")]
    MfaRequired,

    #[error("Rate limited by Garmin. Please wait a while before running again.")]
    RateLimited,

    #[error("Google Sheets API error: {0}")]
    Sheets(String),

    #[error("Google authentication error: {0}")]
    Auth(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid date: {0}. Expected YYYY-MM-DD")]
    InvalidDate(String),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, AppError>;
