// Application settings, loaded from an optional TOML file plus environment secrets
use crate::error::PriceError;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Environment variable holding the SMTP login (also used as the sender address).
pub const SMTP_USER_ENV: &str = "PRICE_SMTP_USER";
/// Environment variable holding the SMTP password.
pub const SMTP_PASSWORD_ENV: &str = "PRICE_SMTP_PASSWORD";

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Settings {
    pub server: ServerSettings,
    pub sheets: SheetSettings,
    pub mail: MailSettings,
    pub import: ImportSettings,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    pub session_hours: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        ServerSettings {
            host: "127.0.0.1".to_string(),
            port: 3000,
            session_hours: 24,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SheetSettings {
    /// Directory holding one `<table>.csv` per sheet.
    pub data_dir: PathBuf,
    pub price_table: String,
    pub users_table: String,
    pub combinations_table: String,
    /// Seconds before the cached price list is reloaded.
    pub refresh_secs: u64,
}

impl Default for SheetSettings {
    fn default() -> Self {
        SheetSettings {
            data_dir: PathBuf::from("database"),
            price_table: "prices".to_string(),
            users_table: "Users".to_string(),
            combinations_table: "Combinations".to_string(),
            refresh_secs: 600,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct MailSettings {
    pub smtp_host: String,
    /// 465 uses implicit TLS; any other port upgrades with STARTTLS.
    pub smtp_port: u16,
    pub sender: Option<String>,
    pub password: Option<String>,
    pub subject: String,
}

impl Default for MailSettings {
    fn default() -> Self {
        MailSettings {
            smtp_host: "smtp.gmail.com".to_string(),
            smtp_port: 587,
            sender: None,
            password: None,
            subject: "[Dealer Price List] Password reset".to_string(),
        }
    }
}

impl MailSettings {
    pub fn is_configured(&self) -> bool {
        let filled = |v: &Option<String>| v.as_deref().is_some_and(|s| !s.trim().is_empty());
        filled(&self.sender) && filled(&self.password)
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ImportSettings {
    pub input_dir: PathBuf,
    /// Workbook of bundled sets, imported into the combinations table.
    pub combination_file: String,
}

impl Default for ImportSettings {
    fn default() -> Self {
        ImportSettings {
            input_dir: PathBuf::from("excel_files"),
            combination_file: "整套搭配.xlsx".to_string(),
        }
    }
}

impl Settings {
    /// Parse settings from TOML text. Missing keys keep their defaults.
    pub fn from_toml(contents: &str) -> Result<Self, PriceError> {
        Ok(toml::from_str(contents)?)
    }

    /// Load settings from `path` when it exists, otherwise defaults, then
    /// apply SMTP credentials from the environment.
    pub fn load(path: Option<&Path>) -> Result<Self, PriceError> {
        let mut settings = match path {
            Some(path) if path.exists() => {
                tracing::info!("Loading config from: {}", path.display());
                let contents = std::fs::read_to_string(path)?;
                Settings::from_toml(&contents)?
            }
            Some(path) => {
                return Err(PriceError::Config(format!(
                    "config file not found: {}",
                    path.display()
                )));
            }
            None => {
                tracing::info!("Using default configuration");
                Settings::default()
            }
        };
        settings.apply_env(|key| std::env::var(key).ok());
        Ok(settings)
    }

    /// Override mail credentials from `lookup` (normally the process environment).
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(user) = lookup(SMTP_USER_ENV) {
            self.mail.sender = Some(user);
        }
        if let Some(password) = lookup(SMTP_PASSWORD_ENV) {
            self.mail.password = Some(password);
        }
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}
