// ABOUTME: Shared helpers for the tokenvault binary
// ABOUTME: Logging setup and human-readable formatting of token timestamps

pub mod format;
pub mod logging;
