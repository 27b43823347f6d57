use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use mailbox_types::ExchangeVersion;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::lifecycle::RunLimits;

/// Connection settings for the remote mailbox service
#[derive(Clone)]
pub struct EwsConfig {
    pub url: String,
    pub login: String,
    pub password: String,
    pub version: ExchangeVersion,
    pub timeout: Duration,
}

// Keep the password out of debug logs
impl fmt::Debug for EwsConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EwsConfig")
            .field("url", &self.url)
            .field("login", &self.login)
            .field("password", &"<redacted>")
            .field("version", &self.version)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// What to look for and how often
#[derive(Debug, Clone)]
pub struct WatchCriteria {
    /// Substring matched against subfolder display names under the Inbox
    pub folder_name: String,
    /// Substring matched against item subjects
    pub subject: String,
    /// Only items created strictly after this instant match
    pub created_after: DateTime<Utc>,
    pub folder_page_size: u32,
    pub item_page_size: u32,
    pub poll_interval: Duration,
}

#[derive(Debug, Clone)]
pub struct WatchConfig {
    pub ews: EwsConfig,
    pub folder_name: String,
    pub subject: String,
    pub folder_page_size: u32,
    pub item_page_size: u32,
    pub poll_interval: Duration,
    pub limits: RunLimits,
}

impl WatchConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the config from any key/value source
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let ews = EwsConfig {
            url: lookup("EWS_URL")
                .unwrap_or_else(|| "https://outlook.live.com/ews/exchange.asmx".to_string()),
            login: lookup("EWS_LOGIN").context("EWS_LOGIN must be set")?,
            password: lookup("EWS_PASSWORD").context("EWS_PASSWORD must be set")?,
            version: parse_or(&lookup, "EWS_VERSION", ExchangeVersion::default())?,
            timeout: Duration::from_millis(parse_or(&lookup, "EWS_TIMEOUT_MS", 60_000)?),
        };

        let limits = RunLimits {
            deadline: Duration::from_secs(parse_or(&lookup, "WATCH_DEADLINE_SECS", 60)?),
            shutdown_grace: Duration::from_secs(parse_or(
                &lookup,
                "WATCH_SHUTDOWN_GRACE_SECS",
                10,
            )?),
        };

        Ok(Self {
            ews,
            folder_name: lookup("WATCH_FOLDER").unwrap_or_else(|| "subFolderForTests".to_string()),
            subject: lookup("WATCH_SUBJECT").unwrap_or_else(|| "testing ews".to_string()),
            folder_page_size: parse_or(&lookup, "WATCH_FOLDER_PAGE_SIZE", 500)?,
            item_page_size: parse_or(&lookup, "WATCH_ITEM_PAGE_SIZE", 100)?,
            poll_interval: Duration::from_millis(parse_or(
                &lookup,
                "WATCH_POLL_INTERVAL_MS",
                1_000,
            )?),
            limits,
        })
    }

    /// Search criteria for a run that started at `started_at`
    pub fn criteria(&self, started_at: DateTime<Utc>) -> WatchCriteria {
        WatchCriteria {
            folder_name: self.folder_name.clone(),
            subject: self.subject.clone(),
            created_after: started_at,
            folder_page_size: self.folder_page_size,
            item_page_size: self.item_page_size,
            poll_interval: self.poll_interval,
        }
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{} has an invalid value: {:?}", key, raw)),
        None => Ok(default),
    }
}
