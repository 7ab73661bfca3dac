pub mod error;
pub mod price;
pub mod url;
