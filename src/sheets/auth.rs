use crate::config::{Config, GoogleConfig};
use crate::error::{AppError, Result};
use crate::sheets::client::AUTH_SCOPE;
use hyper_util::client::legacy::connect::HttpConnector;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument};
use yup_oauth2::{
    InstalledFlowAuthenticator, InstalledFlowReturnMethod, ServiceAccountAuthenticator,
    authenticator::Authenticator, hyper_rustls::HttpsConnector,
};

type AuthType = Authenticator<HttpsConnector<HttpConnector>>;

/// Kind of credentials file the user pointed us at.
#[derive(Debug, PartialEq)]
enum CredentialsKind {
    ServiceAccount,
    InstalledApp,
}

/// Create and verify authenticator by fetching a token
pub(super) async fn create_and_verify_authenticator(config: &GoogleConfig) -> Result<AuthType> {
    let credentials_path = config.credentials_path()?;
    let contents = fs::read_to_string(&credentials_path).map_err(|e| {
        AppError::Auth(format!(
            "Failed to read Google credentials {}: {}",
            credentials_path.display(),
            e
        ))
    })?;

    let auth = match credentials_kind(&contents)? {
        CredentialsKind::ServiceAccount => from_service_account(&credentials_path).await?,
        CredentialsKind::InstalledApp => from_installed_flow(&credentials_path).await?,
    };

    // Trigger authentication by requesting a token
    let _token = auth
        .token(&[AUTH_SCOPE])
        .await
        .map_err(|e| AppError::Auth(format!("Failed to get token: {}", e)))?;

    Ok(auth)
}

fn credentials_kind(contents: &str) -> Result<CredentialsKind> {
    let json: Value = serde_json::from_str(contents)
        .map_err(|e| AppError::Auth(format!("Google credentials are not valid JSON: {}", e)))?;

    match json.get("type").and_then(Value::as_str) {
        Some("service_account") => Ok(CredentialsKind::ServiceAccount),
        _ => Ok(CredentialsKind::InstalledApp),
    }
}

async fn from_service_account(path: &Path) -> Result<AuthType> {
    debug!("Using Google service account credentials");
    let key = yup_oauth2::read_service_account_key(path)
        .await
        .map_err(|e| AppError::Auth(format!("Invalid service account key: {}", e)))?;

    ServiceAccountAuthenticator::builder(key)
        .build()
        .await
        .map_err(|e| AppError::Auth(format!("Failed to build authenticator: {}", e)))
}

async fn from_installed_flow(path: &Path) -> Result<AuthType> {
    debug!("Using Google installed-app credentials");
    let secret = yup_oauth2::read_application_secret(path)
        .await
        .map_err(|e| AppError::Auth(format!("Invalid OAuth client secret: {}", e)))?;

    let token_cache_path = token_cache_path()?;

    // The user pastes the authorization code from the browser
    InstalledFlowAuthenticator::builder(secret, InstalledFlowReturnMethod::Interactive)
        .persist_tokens_to_disk(token_cache_path)
        .build()
        .await
        .map_err(|e| AppError::Auth(format!("Failed to build authenticator: {}", e)))
}

/// Clear cached Google tokens by deleting the token cache file
#[instrument(name = "Clearing auth tokens for Google Sheets", skip_all)]
pub fn clear_tokens() -> Result<()> {
    let token_path = token_cache_path()?;

    if !token_path.exists() {
        debug!("No Google Sheets tokens to clear");
        return Ok(());
    }

    fs::remove_file(&token_path)
        .map_err(|e| AppError::Auth(format!("Failed to delete tokens file: {}", e)))?;
    info!("Cleared Google Sheets cached tokens");

    Ok(())
}

pub(crate) fn token_cache_path() -> Result<PathBuf> {
    Config::cache_file("google_tokens.json")
}
