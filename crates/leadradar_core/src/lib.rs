pub mod canonicalize;
pub mod config;
pub mod db;
pub mod error;
pub mod followup;
pub mod intake;
pub mod query;
pub mod schema;
pub mod scoring;
pub mod search;
pub mod templates;

pub use error::{LeadError, Result};
