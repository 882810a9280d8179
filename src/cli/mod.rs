mod auth;
mod interactive;
mod show;
mod sync;

use crate::config::Config;
use crate::error::Result;
use clap::{Parser, Subcommand};

pub use auth::AuthAction;
pub use show::ShowResource;
pub use sync::SyncArgs;

#[derive(Parser, Debug)]
#[command(name = "garmingo")]
#[command(about = "Sync daily Garmin Connect metrics to Google Sheets or CSV", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Without a subcommand, prompts for everything interactively
    #[command(subcommand)]
    pub command: Option<Commands>,
}

impl Cli {
    pub async fn run(&self, config: &Config) -> Result<()> {
        match &self.command {
            Some(Commands::Sync(args)) => sync::execute(config, &args.request()?).await,
            Some(Commands::Auth { action }) => action.execute(config),
            Some(Commands::Show { resource }) => resource.execute(config),
            None => interactive::run(config).await,
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Fetch a date range and write it to the profile's destination
    Sync(SyncArgs),
    /// Manage cached credentials
    Auth {
        #[command(subcommand)]
        action: AuthAction,
    },
    Show {
        #[command(subcommand)]
        resource: ShowResource,
    },
}
