//! Shared constants and invariants

pub const DEFAULT_SKEW_SECONDS: u64 = 30;
pub const DEFAULT_REFRESH_INTERVAL_SECONDS: u64 = 60;
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 10_000;

pub const DEFAULT_RETRY_ATTEMPTS: u32 = 5;
pub const DEFAULT_RETRY_BASE_DELAY_MS: u64 = 500;
pub const DEFAULT_RETRY_MAX_DELAY_MS: u64 = 8_000;

pub const DEFAULT_HEADER_NAME: &str = "Secured-Authorization";
pub const DEFAULT_TOKEN_PATH: &str = "/oauth2/token";
/// One year.
pub const MAX_TOKEN_TTL_SECONDS: u64 = 365 * 24 * 60 * 60;

pub const GRANT_TYPE_CLIENT_CREDENTIALS: &str = "client_credentials";
pub const TOKEN_TYPE_BEARER: &str = "Bearer";
