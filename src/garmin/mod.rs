mod client;
mod oauth1;
mod parse;
mod sso;
mod tokens;

pub use client::GarminClient;
pub use tokens::{clear_tokens as clear_garmin_tokens, token_cache_path};

use crate::error::{AppError, Result};
use crate::models::GarminMetrics;
use async_trait::async_trait;
use chrono::NaiveDate;

/// Result of an authentication step. MFA is a normal outcome rather than an
/// error so the caller can prompt for a code and continue.
#[derive(Debug)]
pub enum AuthOutcome {
    Authenticated,
    MfaRequired,
    Failed(AppError),
}

impl From<Result<()>> for AuthOutcome {
    fn from(result: Result<()>) -> Self {
        match result {
            Ok(()) => AuthOutcome::Authenticated,
            Err(AppError::MfaRequired) => AuthOutcome::MfaRequired,
            Err(e) => AuthOutcome::Failed(e),
        }
    }
}

#[async_trait]
pub trait GarminOperations {
    /// Resume a cached session or start an SSO login.
    async fn authenticate(&mut self) -> AuthOutcome;

    /// Complete a login that returned [`AuthOutcome::MfaRequired`].
    async fn submit_mfa_code(&mut self, code: &str) -> AuthOutcome;

    /// Exactly one record for `date`; fields Garmin has no data for are `None`.
    async fn get_metrics(&self, date: NaiveDate) -> Result<GarminMetrics>;
}
