use super::interactive::{confirm, prompt_mfa_code};
use crate::config::{Config, OutputConfig, Profile};
use crate::error::{AppError, Result};
use crate::garmin::{GarminClient, token_cache_path};
use crate::models::GarminMetrics;
use crate::sheets::{SheetsClient, clear_sheets_tokens};
use crate::sync::{SyncEngine, reconcile_sheet, validate_range, write_csv};
use chrono::NaiveDate;
use clap::{Args, ValueEnum};
use std::path::PathBuf;
use tracing::{info, warn};

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum OutputType {
    Sheets,
    Csv,
}

#[derive(Args, Debug)]
pub struct SyncArgs {
    /// First day to fetch (YYYY-MM-DD)
    #[arg(long)]
    start_date: String,

    /// Last day to fetch, inclusive (YYYY-MM-DD)
    #[arg(long)]
    end_date: String,

    /// Profile prefix of the environment variables to use
    #[arg(long, default_value = "USER1")]
    profile: String,

    #[arg(long, value_enum, default_value_t = OutputType::Sheets)]
    output_type: OutputType,
}

impl SyncArgs {
    pub(super) fn request(&self) -> Result<SyncRequest> {
        let start = parse_date(&self.start_date)?;
        let end = parse_date(&self.end_date)?;
        validate_range(start, end)?;

        Ok(SyncRequest {
            profile: self.profile.clone(),
            start,
            end,
            output: self.output_type,
        })
    }
}

/// A validated sync invocation.
#[derive(Debug)]
pub(super) struct SyncRequest {
    pub profile: String,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub output: OutputType,
}

pub(super) fn parse_date(value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .map_err(|_| AppError::InvalidDate(value.to_string()))
}

#[derive(Debug, PartialEq)]
enum Destination<'a> {
    Sheets {
        sheet_id: &'a str,
        sheet_name: &'a str,
        display_name: String,
    },
    Csv(PathBuf),
}

impl<'a> Destination<'a> {
    fn resolve(
        profile: &'a Profile,
        profile_name: &str,
        output: OutputType,
        output_config: &OutputConfig,
    ) -> Result<Self> {
        match output {
            OutputType::Sheets => Ok(Destination::Sheets {
                sheet_id: profile.sheet_id(profile_name)?,
                sheet_name: profile.sheet_name(),
                display_name: profile.spreadsheet_display_name(),
            }),
            OutputType::Csv => Ok(Destination::Csv(
                profile.csv_path(profile_name, output_config),
            )),
        }
    }
}

pub(super) async fn execute(config: &Config, request: &SyncRequest) -> Result<()> {
    // Everything checkable offline is checked before logging in
    let profile = config.profiles.get(&request.profile)?;
    let (email, password) = profile.garmin_credentials(&request.profile)?;
    let destination = Destination::resolve(
        profile,
        &request.profile,
        request.output,
        &config.output,
    )?;

    info!(
        profile = %request.profile,
        start = %request.start,
        end = %request.end,
        "Starting sync"
    );

    let garmin_client = GarminClient::new(email, password, token_cache_path(&request.profile)?)?;
    let mut engine = SyncEngine::new(garmin_client);
    engine.authenticate(prompt_mfa_code).await?;

    let records = engine.fetch_range(request.start, request.end).await?;

    match destination {
        Destination::Csv(path) => write_csv(&path, &records),
        Destination::Sheets {
            sheet_id,
            sheet_name,
            display_name,
        } => {
            info!(spreadsheet = %display_name, sheet = sheet_name, "Writing to Google Sheets");
            let result = write_sheets(config, sheet_id, sheet_name, &records).await;
            if let Err(AppError::Auth(_)) = &result {
                offer_google_token_reset()?;
            }
            result
        }
    }
}

async fn write_sheets(
    config: &Config,
    sheet_id: &str,
    sheet_name: &str,
    records: &[GarminMetrics],
) -> Result<()> {
    let client = SheetsClient::new(&config.google, sheet_id).await?;
    let summary = reconcile_sheet(&client, sheet_name, records).await?;
    info!(
        updated = summary.updated,
        appended = summary.appended,
        url = %client.spreadsheet_url(),
        "Sync completed"
    );
    Ok(())
}

fn offer_google_token_reset() -> Result<()> {
    warn!("Google authentication failed");
    if confirm("Delete cached Google tokens so the next run signs in again?")? {
        clear_sheets_tokens()?;
    }
    Ok(())
}
