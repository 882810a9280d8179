use crate::error::{AppError, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

const CONFIG_DIR_PREFIX: &str = "garmingo";
const DEFAULT_SHEET_NAME: &str = "Raw Data";
const DEFAULT_CSV_DIR: &str = "output";

static PROFILE_VAR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(USER\d+)_(GARMIN_EMAIL|GARMIN_PASSWORD|SHEET_ID|SHEET_NAME|SPREADSHEET_NAME|CSV_PATH)$",
    )
    .expect("profile variable pattern is valid")
});

/// Everything garmingo needs to know before making a network call. Built once
/// in `main` and passed down by reference.
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub google: GoogleConfig,
    pub output: OutputConfig,
    pub profiles: Profiles,
}

/// Optional `config.toml` contents.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
struct FileConfig {
    #[serde(default)]
    google: GoogleConfig,
    #[serde(default)]
    output: OutputConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct GoogleConfig {
    /// Service account key or installed-app client secret
    pub credentials_path: Option<PathBuf>,
}

impl GoogleConfig {
    pub fn credentials_path(&self) -> Result<PathBuf> {
        match &self.credentials_path {
            Some(path) => Ok(path.clone()),
            None => Config::config_path("client_secret.json"),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct OutputConfig {
    pub csv_dir: Option<PathBuf>,
}

impl OutputConfig {
    pub fn csv_dir(&self) -> PathBuf {
        self.csv_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CSV_DIR))
    }
}

impl Config {
    /// Load `config.toml` if present and discover profiles from the process
    /// environment. Call after `.env` has been loaded.
    pub fn load() -> Result<Self> {
        let config_path = Self::config_file()?;
        let file_config = Self::read_file_config(&config_path)?;

        Ok(Config {
            google: file_config.google,
            output: file_config.output,
            profiles: Profiles::from_vars(std::env::vars()),
        })
    }

    fn read_file_config(path: &Path) -> Result<FileConfig> {
        if !path.exists() {
            return Ok(FileConfig::default());
        }

        let contents = fs::read_to_string(path)?;
        toml::from_str(&contents)
            .map_err(|e| AppError::Config(format!("Failed to parse config: {}", e)))
    }

    fn xdg_dirs() -> xdg::BaseDirectories {
        xdg::BaseDirectories::with_prefix(CONFIG_DIR_PREFIX)
    }

    /// Get the config file path
    pub fn config_file() -> Result<PathBuf> {
        Self::config_path("config.toml")
    }

    fn config_path(filename: &str) -> Result<PathBuf> {
        Self::xdg_dirs()
            .place_config_file(filename)
            .map_err(|e| AppError::Config(format!("Failed to create config directory: {}", e)))
    }

    /// Get the cache directory path
    pub fn cache_dir() -> Result<PathBuf> {
        let xdg = Self::xdg_dirs();
        xdg.get_cache_home()
            .ok_or_else(|| AppError::Config("Failed to determine cache directory".to_string()))
    }

    /// Get a cache file path
    pub fn cache_file(filename: &str) -> Result<PathBuf> {
        let xdg = Self::xdg_dirs();
        xdg.place_cache_file(filename)
            .map_err(|e| AppError::Config(format!("Failed to create cache file path: {}", e)))
    }
}

/// Credentials and destination settings for one `USER<n>` prefix.
#[derive(Clone, Default, PartialEq)]
pub struct Profile {
    pub email: Option<String>,
    pub password: Option<String>,
    pub sheet_id: Option<String>,
    pub sheet_name: Option<String>,
    pub spreadsheet_name: Option<String>,
    pub csv_path: Option<PathBuf>,
}

impl fmt::Debug for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Profile")
            .field("email", &self.email)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("sheet_id", &self.sheet_id)
            .field("sheet_name", &self.sheet_name)
            .field("spreadsheet_name", &self.spreadsheet_name)
            .field("csv_path", &self.csv_path)
            .finish()
    }
}

impl Profile {
    fn set(&mut self, key: &str, value: String) {
        match key {
            "GARMIN_EMAIL" => self.email = Some(value),
            "GARMIN_PASSWORD" => self.password = Some(value),
            "SHEET_ID" => self.sheet_id = Some(value),
            "SHEET_NAME" => self.sheet_name = Some(value),
            "SPREADSHEET_NAME" => self.spreadsheet_name = Some(value),
            "CSV_PATH" => self.csv_path = Some(PathBuf::from(value)),
            _ => {}
        }
    }

    /// Garmin email and password, both required for any sync.
    pub fn garmin_credentials(&self, profile_name: &str) -> Result<(&str, &str)> {
        match (non_empty(&self.email), non_empty(&self.password)) {
            (Some(email), Some(password)) => Ok((email, password)),
            _ => Err(AppError::Config(format!(
                "Email or password not configured for profile '{}'",
                profile_name
            ))),
        }
    }

    pub fn sheet_id(&self, profile_name: &str) -> Result<&str> {
        non_empty(&self.sheet_id).ok_or_else(|| {
            AppError::Config(format!(
                "{}_SHEET_ID is required for Google Sheets output",
                profile_name
            ))
        })
    }

    pub fn sheet_name(&self) -> &str {
        non_empty(&self.sheet_name).unwrap_or(DEFAULT_SHEET_NAME)
    }

    /// Human-friendly name of the spreadsheet, used only for logging.
    pub fn spreadsheet_display_name(&self) -> String {
        match non_empty(&self.spreadsheet_name) {
            Some(name) => name.to_string(),
            None => format!("ID: {}", self.sheet_id.as_deref().unwrap_or_default()),
        }
    }

    /// Configured CSV path, or `<csv_dir>/garmingo_<profile>.csv`.
    pub fn csv_path(&self, profile_name: &str, output: &OutputConfig) -> PathBuf {
        match &self.csv_path {
            Some(path) if !path.as_os_str().is_empty() => path.clone(),
            _ => output
                .csv_dir()
                .join(format!("garmingo_{}.csv", profile_name)),
        }
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|s| !s.is_empty())
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Profiles(BTreeMap<String, Profile>);

impl Profiles {
    /// Group `USER<n>_<SETTING>` variables by their `USER<n>` prefix. Other
    /// variables are ignored.
    pub fn from_vars<I>(vars: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut profiles: BTreeMap<String, Profile> = BTreeMap::new();
        for (key, value) in vars {
            let Some(caps) = PROFILE_VAR.captures(&key) else {
                continue;
            };
            profiles
                .entry(caps[1].to_string())
                .or_default()
                .set(&caps[2], value);
        }
        Profiles(profiles)
    }

    pub fn get(&self, name: &str) -> Result<&Profile> {
        self.0
            .get(name)
            .ok_or_else(|| AppError::Config(format!("Profile '{}' not found in environment", name)))
    }

    /// Profiles in numeric order, so `USER2` comes before `USER10`.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Profile)> {
        let mut profiles: Vec<_> = self.0.iter().collect();
        profiles.sort_by_key(|(name, _)| profile_number(name));
        profiles.into_iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

fn profile_number(name: &str) -> u64 {
    name.trim_start_matches("USER").parse().unwrap_or(u64::MAX)
}
