use crate::config::Config;
use crate::error::Result;
use crate::garmin::token_cache_path;
use clap::Subcommand;
use tracing::info;

#[derive(Subcommand, Debug)]
pub enum ShowResource {
    /// Show configuration and cache paths
    Paths,
    /// List profiles found in the environment
    Profiles,
}

impl ShowResource {
    pub fn execute(&self, config: &Config) -> Result<()> {
        match self {
            ShowResource::Paths => show_paths(config),
            ShowResource::Profiles => show_profiles(config),
        }
    }
}

fn show_paths(config: &Config) -> Result<()> {
    let config_path = Config::config_file()?;
    let cache_dir = Config::cache_dir()?;
    let credentials_path = config.google.credentials_path()?;

    info!(path = ?config_path, "Config path");
    info!(path = ?credentials_path, "Google credentials path");
    info!(path = ?cache_dir, "Cache path");

    Ok(())
}

fn show_profiles(config: &Config) -> Result<()> {
    if config.profiles.is_empty() {
        info!("No profiles found in environment");
        return Ok(());
    }

    info!(count = config.profiles.len(), "Found profiles");
    for (name, profile) in config.profiles.iter() {
        let token_path = token_cache_path(name)?;
        info!(
            profile = %name,
            email = profile.email.as_deref().unwrap_or("<unset>"),
            password_set = profile.password.is_some(),
            sheet = profile.sheet_name(),
            csv = ?profile.csv_path(name, &config.output),
            tokens = ?token_path,
            "Profile"
        );
    }

    Ok(())
}
