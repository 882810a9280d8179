use super::sync::{OutputType, SyncRequest, execute, parse_date};
use crate::config::{Config, Profiles};
use crate::error::{AppError, Result};
use crate::sync::validate_range;
use chrono::NaiveDate;
use dialoguer::{Confirm, Input, Select};
use tracing::{info, warn};

/// Ask for everything `garmingo sync` takes as flags, then run it.
pub(super) async fn run(config: &Config) -> Result<()> {
    if config.profiles.is_empty() {
        return Err(AppError::Config(
            "No profiles found. Set USER1_GARMIN_EMAIL and USER1_GARMIN_PASSWORD in .env"
                .to_string(),
        ));
    }

    let output = select_output_type()?;
    let profile = select_profile(&config.profiles)?;
    let start = prompt_date("Start date (YYYY-MM-DD)", None)?;
    let end = prompt_date("End date (YYYY-MM-DD)", Some(start))?;

    let request = SyncRequest {
        profile,
        start,
        end,
        output,
    };
    execute(config, &request).await
}

fn select_output_type() -> Result<OutputType> {
    let choice = Select::new()
        .with_prompt("Output to")
        .items(&["Google Sheets", "CSV file"])
        .default(0)
        .interact()
        .map_err(prompt_error)?;

    Ok(match choice {
        0 => OutputType::Sheets,
        _ => OutputType::Csv,
    })
}

fn select_profile(profiles: &Profiles) -> Result<String> {
    let names: Vec<&String> = profiles.iter().map(|(name, _)| name).collect();
    let labels: Vec<String> = profiles
        .iter()
        .map(|(name, profile)| profile_label(name, profile.email.as_deref()))
        .collect();

    let choice = Select::new()
        .with_prompt("Profile")
        .items(&labels)
        .default(0)
        .interact()
        .map_err(prompt_error)?;

    Ok(names[choice].clone())
}

fn profile_label(name: &str, email: Option<&str>) -> String {
    match email {
        Some(email) => email.to_string(),
        None => format!("{} (no email set)", name),
    }
}

/// Re-prompt until the date parses and is not before `not_before`.
fn prompt_date(prompt: &str, not_before: Option<NaiveDate>) -> Result<NaiveDate> {
    loop {
        let input = Input::<String>::new()
            .with_prompt(prompt)
            .interact_text()
            .map_err(prompt_error)?;

        match check_date(&input, not_before) {
            Ok(date) => return Ok(date),
            Err(e) => warn!("{}", e),
        }
    }
}

fn check_date(input: &str, not_before: Option<NaiveDate>) -> Result<NaiveDate> {
    let date = parse_date(input)?;
    if let Some(start) = not_before {
        validate_range(start, date)?;
    }
    Ok(date)
}

pub(super) fn prompt_mfa_code() -> Result<String> {
    info!("Check your email or authenticator app for the Garmin code");
    let code = Input::<String>::new()
        .with_prompt("Garmin MFA code")
        .allow_empty(true)
        .interact_text()
        .map_err(prompt_error)?;

    match code.trim() {
        "" => Err(AppError::MfaRequired),
        code => Ok(code.to_string()),
    }
}

pub(super) fn confirm(prompt: &str) -> Result<bool> {
    Confirm::new()
        .with_prompt(prompt)
        .default(true)
        .interact()
        .map_err(prompt_error)
}

fn prompt_error(e: dialoguer::Error) -> AppError {
    AppError::Other(e.into())
}
