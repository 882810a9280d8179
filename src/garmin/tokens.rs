use crate::config::Config;
use crate::error::{AppError, Result};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument};

/// Long-lived (~1 year) token obtained from an SSO ticket. Used to mint
/// OAuth2 tokens without logging in again.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OAuth1Token {
    pub oauth_token: String,
    pub oauth_token_secret: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mfa_token: Option<String>,
}

/// Short-lived bearer token for Connect API requests.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OAuth2Token {
    pub token_type: String,
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: i64,
    /// Expiry time as seconds since Unix epoch
    #[serde(default)]
    pub expires_at: i64,
}

impl OAuth2Token {
    /// Expired or about to expire (within 5 minutes)
    pub fn is_expired(&self) -> bool {
        let now = chrono::Utc::now().timestamp();
        self.expires_at < (now + 300)
    }

    pub fn authorization_header(&self) -> String {
        format!("{} {}", self.token_type, self.access_token)
    }

    pub(super) fn stamp_expiry(mut self) -> Self {
        self.expires_at = chrono::Utc::now().timestamp() + self.expires_in;
        self
    }
}

/// Everything persisted between runs for one profile.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GarminTokens {
    pub oauth1: OAuth1Token,
    pub oauth2: OAuth2Token,
}

/// Per-profile token cache file.
pub fn token_cache_path(profile_name: &str) -> Result<PathBuf> {
    Config::cache_file(&format!("garmin_tokens_{}.json", profile_name.to_lowercase()))
}

pub(super) fn load_tokens(path: &Path) -> Result<Option<GarminTokens>> {
    if !path.exists() {
        return Ok(None);
    }

    let contents = fs::read_to_string(path)
        .map_err(|e| AppError::GarminAuth(format!("Failed to read tokens file: {}", e)))?;

    match serde_json::from_str(&contents) {
        Ok(tokens) => Ok(Some(tokens)),
        Err(e) => {
            debug!("Ignoring unreadable Garmin token cache ({})", e);
            Ok(None)
        }
    }
}

pub(super) fn save_tokens(path: &Path, tokens: &GarminTokens) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| {
            AppError::GarminAuth(format!("Failed to create token cache directory: {}", e))
        })?;
    }

    let contents = serde_json::to_string_pretty(tokens)?;

    // Owner read/write only from the moment the file exists
    let mut file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .mode(0o600)
        .open(path)
        .map_err(|e| AppError::GarminAuth(format!("Failed to create tokens file: {}", e)))?;

    file.write_all(contents.as_bytes())
        .map_err(|e| AppError::GarminAuth(format!("Failed to write tokens file: {}", e)))?;

    Ok(())
}

/// Clear cached Garmin tokens for a profile by deleting its token file
#[instrument(name = "Clearing Garmin auth tokens", skip_all, fields(profile = profile_name))]
pub fn clear_tokens(profile_name: &str) -> Result<()> {
    let token_path = token_cache_path(profile_name)?;

    if !token_path.exists() {
        debug!("No Garmin tokens to clear");
        return Ok(());
    }

    fs::remove_file(&token_path)
        .map_err(|e| AppError::GarminAuth(format!("Failed to delete tokens file: {}", e)))?;
    info!("Cleared Garmin cached tokens");

    Ok(())
}
