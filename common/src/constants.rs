//! Pipeline-wide constants

/// Maximum synthetic download payload size (256 MiB)
pub const MAX_DOWNLOAD_BYTES: u64 = 268_435_456;

/// Default maximum accepted upload body size (256 MiB)
pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 268_435_456;

/// Length of the random block tiled into large download payloads
pub const RANDOM_BLOCK_LEN: usize = 1024;

/// Preflight response cache lifetime (24 hours)
pub const PREFLIGHT_MAX_AGE_SECS: u64 = 86_400;

/// Retention window for server-side metric records (24 hours)
pub const METRIC_TTL_SECS: i64 = 86_400;

/// Default TTL requested for relay credentials (24 hours)
pub const DEFAULT_TURN_TTL_SECS: u64 = 86_400;

/// Download endpoint path on the traffic server
pub const DOWNLOAD_PATH: &str = "/__down";

/// Upload endpoint path on the traffic server
pub const UPLOAD_PATH: &str = "/__up";

/// Credential endpoint path on the broker
pub const TURN_CREDENTIALS_PATH: &str = "/turn-credentials";
