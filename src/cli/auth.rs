use crate::config::Config;
use crate::error::Result;
use crate::garmin::clear_garmin_tokens;
use crate::sheets::clear_sheets_tokens;
use clap::Subcommand;
use tracing::info;

#[derive(Subcommand, Debug)]
pub enum AuthAction {
    /// Delete cached tokens so the next sync signs in again
    Reset {
        /// Profile whose Garmin tokens to delete
        #[arg(long)]
        garmin: Option<String>,

        /// Delete the Google Sheets tokens
        #[arg(long)]
        google: bool,
    },
}

impl AuthAction {
    pub fn execute(&self, config: &Config) -> Result<()> {
        match self {
            AuthAction::Reset { garmin, google } => reset(config, garmin.as_deref(), *google),
        }
    }
}

fn reset(config: &Config, garmin: Option<&str>, google: bool) -> Result<()> {
    if garmin.is_none() && !google {
        info!("Nothing to reset, pass --garmin PROFILE and/or --google");
        return Ok(());
    }

    if let Some(profile) = garmin {
        config.profiles.get(profile)?;
        clear_garmin_tokens(profile)?;
    }
    if google {
        clear_sheets_tokens()?;
    }

    Ok(())
}
