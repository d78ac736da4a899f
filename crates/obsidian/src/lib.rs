pub mod vault;

pub use vault::{VaultSummary, build_vault};
