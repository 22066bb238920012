// ABOUTME: Environment variable name constants
// ABOUTME: Centralized definitions of all environment variable names used across Tokenvault

// Provider Credentials
pub const DROPBOX_APP_KEY: &str = "DROPBOX_APP_KEY";
pub const DROPBOX_APP_SECRET: &str = "DROPBOX_APP_SECRET";
pub const DROPBOX_REDIRECT_URI: &str = "DROPBOX_REDIRECT_URI";
pub const DROPBOX_ACCESS_TOKEN: &str = "DROPBOX_ACCESS_TOKEN"; // Static token, no refresh

// Provider Endpoints
pub const DROPBOX_AUTHORIZE_URL: &str = "DROPBOX_AUTHORIZE_URL";
pub const DROPBOX_TOKEN_URL: &str = "DROPBOX_TOKEN_URL";

// Token Storage
pub const TOKEN_ENCRYPTION_KEY: &str = "TOKEN_ENCRYPTION_KEY";
pub const TOKEN_STORE_PATH: &str = "TOKEN_STORE_PATH";

// Refresh Policy
pub const TOKEN_REFRESH_THRESHOLD_MINUTES: &str = "TOKEN_REFRESH_THRESHOLD_MINUTES";
pub const TOKEN_MAX_RETRIES: &str = "TOKEN_MAX_RETRIES";
pub const TOKEN_RETRY_DELAY_MS: &str = "TOKEN_RETRY_DELAY_MS";
pub const STATIC_TOKEN_LIFETIME_MINUTES: &str = "STATIC_TOKEN_LIFETIME_MINUTES";

// HTTP Client
pub const OAUTH_HTTP_TIMEOUT_SECS: &str = "OAUTH_HTTP_TIMEOUT_SECS";

// Defaults
pub const DEFAULT_AUTHORIZE_URL: &str = "https://www.dropbox.com/oauth2/authorize";
pub const DEFAULT_TOKEN_URL: &str = "https://api.dropboxapi.com/oauth2/token";
pub const DEFAULT_TOKEN_STORE_PATH: &str = ".dropbox-tokens.json";
pub const DEFAULT_REFRESH_THRESHOLD_MINUTES: u64 = 5;
pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_RETRY_DELAY_MS: u64 = 1000;
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_STATIC_TOKEN_LIFETIME_MINUTES: u64 = 4 * 60;
