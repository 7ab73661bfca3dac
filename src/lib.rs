pub mod config;
pub mod differ;
pub mod metrics;
pub mod models;
pub mod plugins;
pub mod scheduler;
pub mod scraper;
pub mod store;
pub mod tracker;
pub mod utils;

// Re-export commonly used types
pub use config::AppConfig;
pub use differ::{Differ, NotificationPolicy};
pub use store::Store;
pub use tracker::{CycleReport, Tracker};
pub use utils::error::AppError;

pub type Result<T> = std::result::Result<T, AppError>;
