use serde::{Deserialize, Serialize};
use url::Url;
use uuid::Uuid;

pub mod notification_log;
pub mod observation;
pub mod price_change;
pub mod product;

// Re-exports for convenience
pub use notification_log::*;
pub use observation::*;
pub use price_change::*;
pub use product::*;

// Common enums used across models
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "TEXT")]
pub enum Site {
    #[sqlx(rename = "amazon")]
    Amazon,
    #[sqlx(rename = "flipkart")]
    Flipkart,
    #[sqlx(rename = "generic")]
    Generic,
}

impl Site {
    /// Pick the extraction strategy for a product URL by its host.
    pub fn detect(url: &Url) -> Site {
        let host = url.host_str().unwrap_or_default().to_lowercase();
        let labels: Vec<&str> = host.split('.').collect();
        if labels.contains(&"amazon") {
            Site::Amazon
        } else if labels.contains(&"flipkart") {
            Site::Flipkart
        } else {
            Site::Generic
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Site::Amazon => "amazon",
            Site::Flipkart => "flipkart",
            Site::Generic => "generic",
        }
    }
}

impl std::fmt::Display for Site {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "TEXT")]
pub enum FetchStatus {
    #[sqlx(rename = "success")]
    Success,
    #[sqlx(rename = "failed")]
    Failed,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "TEXT")]
pub enum NotificationStatus {
    #[sqlx(rename = "sent")]
    Sent,
    #[sqlx(rename = "failed")]
    Failed,
}

impl NotificationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationStatus::Sent => "sent",
            NotificationStatus::Failed => "failed",
        }
    }
}

// Helper function to generate UUIDs in the format expected by the database
pub fn generate_id() -> String {
    Uuid::new_v4().simple().to_string()
}
