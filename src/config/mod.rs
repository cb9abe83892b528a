//! Node configuration
//!
//! Settings come from an optional TOML file with environment-variable
//! overrides on top, and are exposed through a process-wide lazy static.

pub mod settings;

pub use settings::{Settings, GLOBAL_CONFIG};
