// ABOUTME: Configuration for the Tokenvault token lifecycle manager
// ABOUTME: Exposes environment variable names and typed settings loaded from them

pub mod constants;
pub mod settings;

pub use settings::{ConfigError, ConfigResult, Settings};
