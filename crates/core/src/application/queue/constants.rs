// Queue constants (no magic values)
use std::time::Duration;

/// Units allowed in flight at once
pub const DEFAULT_MAX_CONCURRENT: usize = 10;

/// Units that flush a pending batch immediately
pub const DEFAULT_MAX_BATCH_SIZE: usize = 20;

/// Quiet period after which a partial batch flushes (50ms)
pub const DEFAULT_BATCH_IDLE_DELAY: Duration = Duration::from_millis(50);

/// Longest accepted batch key
pub const MAX_BATCH_KEY_LEN: usize = 64;
