pub mod extractor;
pub mod notifier;

pub use extractor::{RawFields, SiteExtractor};
pub use notifier::Notifier;
