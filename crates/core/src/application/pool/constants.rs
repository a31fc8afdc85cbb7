// Pool constants (no magic values)
use std::time::Duration;

/// Cached client handles kept at most
pub const DEFAULT_MAX_POOL_SIZE: usize = 50;

/// Idle age after which an entry is evicted (30 minutes)
pub const DEFAULT_IDLE_TTL: Duration = Duration::from_secs(30 * 60);

/// Tokens expiring within this margin are never cached (5 minutes)
pub const DEFAULT_EXPIRY_MARGIN: Duration = Duration::from_secs(5 * 60);

/// Janitor pass cadence (5 minutes)
pub const DEFAULT_CLEANUP_INTERVAL: Duration = Duration::from_secs(5 * 60);
