//! Type definitions for retry policy configuration

mod policy;

pub use policy::*;
