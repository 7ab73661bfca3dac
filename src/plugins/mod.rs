pub mod notifiers;
pub mod sites;
pub mod traits;

pub use traits::{Notifier, SiteExtractor};
