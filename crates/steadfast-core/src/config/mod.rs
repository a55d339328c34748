//! Policy configuration loading

mod loader;

pub use loader::{PolicyLoader, POLICY_FILE};
