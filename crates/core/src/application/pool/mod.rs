// Client Connection Pool
//
// Caches one logical backend client per bearer token so route handlers do
// not construct a fresh client on every request. Strictly a performance
// layer: every failure path (undecodable token, near-expiry token, full
// pool) falls back to constructing an unpooled handle, never to an error.

pub mod constants;

mod janitor;

pub use janitor::PoolJanitor;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tracing::{debug, info};

use crate::domain::{credential_hash, decode_claims, ClientHandle};
use crate::port::{ClientFactory, TimeProvider};

use constants::*;

/// Pool tuning knobs
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Entry cap; lookups past it still work, unpooled
    pub max_size: usize,
    /// Idle age before eviction
    pub idle_ttl: Duration,
    /// Tokens expiring within this margin of now are never cached
    pub expiry_margin: Duration,
    /// Janitor pass cadence
    pub cleanup_interval: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_size: DEFAULT_MAX_POOL_SIZE,
            idle_ttl: DEFAULT_IDLE_TTL,
            expiry_margin: DEFAULT_EXPIRY_MARGIN,
            cleanup_interval: DEFAULT_CLEANUP_INTERVAL,
        }
    }
}

/// One cached client plus the timestamps eviction decisions need
struct PooledClient {
    handle: ClientHandle,
    created_at: i64,
    last_used: i64,
}

/// Token-keyed cache of backend client handles with TTL eviction
///
/// Entries are keyed by a digest of the token, not the raw token. The map is
/// only touched inside short synchronous sections, so concurrent lookups for
/// different tokens cannot interleave a read and its paired write.
pub struct ClientPool {
    entries: Mutex<HashMap<u64, PooledClient>>,
    factory: Arc<dyn ClientFactory>,
    time: Arc<dyn TimeProvider>,
    config: PoolConfig,
}

impl ClientPool {
    pub fn new(
        config: PoolConfig,
        factory: Arc<dyn ClientFactory>,
        time: Arc<dyn TimeProvider>,
    ) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            factory,
            time,
            config,
        }
    }

    /// Look up (or construct) a client handle for `token`
    ///
    /// Never fails: tokens that fail to decode or expire within the safety
    /// margin get a fresh unpooled handle. A credential that is about to die
    /// is never served from cache; the real credential check happens
    /// downstream at the backend.
    pub fn get_client(&self, token: &str) -> ClientHandle {
        let now = self.time.now_millis();

        let claims = match decode_claims(token) {
            Ok(claims) => claims,
            Err(e) => {
                debug!(error = %e, "Token claims undecodable; issuing unpooled client");
                return self.factory.connect(token);
            }
        };
        if claims.expires_within(now, self.config.expiry_margin) {
            debug!(subject = %claims.sub, "Token near expiry; issuing unpooled client");
            return self.factory.connect(token);
        }

        let key = credential_hash(token);
        let mut entries = self.lock_entries();
        if let Some(entry) = entries.get_mut(&key) {
            entry.last_used = now;
            return entry.handle.clone();
        }

        let handle = self.factory.connect(token);
        if entries.len() < self.config.max_size {
            entries.insert(
                key,
                PooledClient {
                    handle: handle.clone(),
                    created_at: now,
                    last_used: now,
                },
            );
            debug!(subject = %claims.sub, size = entries.len(), "Pooled new client");
        } else {
            debug!(subject = %claims.sub, "Pool at capacity; issuing unpooled client");
        }
        handle
    }

    /// One eviction pass; returns how many entries were evicted
    ///
    /// Evicts entries idle past `idle_ttl`, entries older than twice that
    /// (stale entries a skewed clock or constant use could otherwise keep
    /// alive forever), then least-recently-used entries until the pool is
    /// back under `max_size`.
    pub fn cleanup(&self) -> usize {
        let now = self.time.now_millis();
        let idle_ttl_ms = self.config.idle_ttl.as_millis() as i64;
        let hard_ttl_ms = idle_ttl_ms.saturating_mul(2);

        let mut entries = self.lock_entries();
        let before = entries.len();

        entries.retain(|_, entry| {
            now - entry.last_used <= idle_ttl_ms && now - entry.created_at <= hard_ttl_ms
        });

        if entries.len() > self.config.max_size {
            let mut by_recency: Vec<(u64, i64)> = entries
                .iter()
                .map(|(key, entry)| (*key, entry.last_used))
                .collect();
            by_recency.sort_by_key(|(_, last_used)| *last_used);
            let excess = entries.len() - self.config.max_size;
            for (key, _) in by_recency.into_iter().take(excess) {
                entries.remove(&key);
            }
        }

        let evicted = before - entries.len();
        if evicted > 0 {
            info!(evicted, remaining = entries.len(), "Pool cleanup pass");
        }
        evicted
    }

    /// Drop every cached entry (shutdown/test reset)
    pub fn clear(&self) {
        self.lock_entries().clear();
    }

    /// Cached entry count
    pub fn len(&self) -> usize {
        self.lock_entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock_entries().is_empty()
    }

    fn lock_entries(&self) -> MutexGuard<'_, HashMap<u64, PooledClient>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Seed an entry directly, bypassing the size check
    #[cfg(test)]
    fn seed_entry(&self, token: &str, created_at: i64, last_used: i64) {
        self.lock_entries().insert(
            credential_hash(token),
            PooledClient {
                handle: self.factory.connect(token),
                created_at,
                last_used,
            },
        );
    }
}
