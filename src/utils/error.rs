use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Coarse classification of a failed fetch, persisted alongside failed
/// observations.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "TEXT")]
pub enum FetchErrorKind {
    #[sqlx(rename = "network")]
    Network,
    #[sqlx(rename = "blocked")]
    Blocked,
    #[sqlx(rename = "parse")]
    Parse,
}

impl FetchErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FetchErrorKind::Network => "network",
            FetchErrorKind::Blocked => "blocked",
            FetchErrorKind::Parse => "parse",
        }
    }
}

impl std::fmt::Display for FetchErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FetchError {
    #[error("Network error for {url} after {attempts} attempt(s): {message}")]
    Network {
        url: String,
        message: String,
        attempts: u32,
    },

    #[error("HTTP {status} for {url} after {attempts} attempt(s)")]
    Status {
        url: String,
        status: u16,
        attempts: u32,
    },

    #[error("Blocked by {url} after {attempts} attempt(s): {reason}")]
    Blocked {
        url: String,
        reason: String,
        attempts: u32,
    },

    #[error("Parsing error for {url} after {attempts} attempt(s): {message}")]
    Parse {
        url: String,
        message: String,
        attempts: u32,
    },
}

impl FetchError {
    pub fn network(url: impl Into<String>, message: impl Into<String>) -> Self {
        FetchError::Network {
            url: url.into(),
            message: message.into(),
            attempts: 1,
        }
    }

    pub fn blocked(url: impl Into<String>, reason: impl Into<String>) -> Self {
        FetchError::Blocked {
            url: url.into(),
            reason: reason.into(),
            attempts: 1,
        }
    }

    pub fn parse(url: impl Into<String>, message: impl Into<String>) -> Self {
        FetchError::Parse {
            url: url.into(),
            message: message.into(),
            attempts: 1,
        }
    }

    pub fn kind(&self) -> FetchErrorKind {
        match self {
            FetchError::Network { .. } | FetchError::Status { .. } => FetchErrorKind::Network,
            FetchError::Blocked { .. } => FetchErrorKind::Blocked,
            FetchError::Parse { .. } => FetchErrorKind::Parse,
        }
    }

    pub fn url(&self) -> &str {
        match self {
            FetchError::Network { url, .. }
            | FetchError::Status { url, .. }
            | FetchError::Blocked { url, .. }
            | FetchError::Parse { url, .. } => url,
        }
    }

    /// Number of HTTP requests issued before giving up.
    pub fn attempts(&self) -> u32 {
        match self {
            FetchError::Network { attempts, .. }
            | FetchError::Status { attempts, .. }
            | FetchError::Blocked { attempts, .. }
            | FetchError::Parse { attempts, .. } => *attempts,
        }
    }

    pub(crate) fn with_attempts(mut self, count: u32) -> Self {
        match &mut self {
            FetchError::Network { attempts, .. }
            | FetchError::Status { attempts, .. }
            | FetchError::Blocked { attempts, .. }
            | FetchError::Parse { attempts, .. } => *attempts = count,
        }
        self
    }
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Corrupt row in {table}: {message}")]
    Corrupt { table: &'static str, message: String },

    #[error("Invalid product: {0}")]
    InvalidProduct(String),

    #[error("Invalid observation: {0}")]
    InvalidObservation(String),
}

impl From<validator::ValidationErrors> for StoreError {
    fn from(err: validator::ValidationErrors) -> Self {
        StoreError::InvalidProduct(format!("{}", err))
    }
}

#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("Invalid email address '{address}': {message}")]
    Address { address: String, message: String },

    #[error("Failed to build message: {0}")]
    Message(#[from] lettre::error::Error),

    #[error("SMTP error: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),

    #[error("Notifier configuration error: {0}")]
    Config(String),
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),

    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    #[error("Notification error: {0}")]
    Notify(#[from] NotifyError),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Scheduler error: {0}")]
    Scheduler(#[from] tokio_cron_scheduler::JobSchedulerError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Not found: {resource}")]
    NotFound { resource: String },
}

// Result type alias for convenience
pub type Result<T> = std::result::Result<T, AppError>;
