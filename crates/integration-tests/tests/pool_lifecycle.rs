// Client pool admission, hits, and eviction across tasks

use std::sync::Arc;

use chorus_core::application::pool::{ClientPool, PoolConfig};
use chorus_core::port::client_factory::mocks::MockClientFactory;
use chorus_core::port::time_provider::mocks::MockTimeProvider;
use chorus_integration_tests::encode_token;

const NOW_MS: i64 = 1_700_000_000_000;

fn fresh_token(sub: &str) -> String {
    encode_token(sub, NOW_MS / 1000 + 3600)
}

fn pool_with(
    config: PoolConfig,
) -> (Arc<ClientPool>, Arc<MockClientFactory>, Arc<MockTimeProvider>) {
    let factory = Arc::new(MockClientFactory::new());
    let time = Arc::new(MockTimeProvider::new(NOW_MS));
    let pool = Arc::new(ClientPool::new(config, factory.clone(), time.clone()));
    (pool, factory, time)
}

#[tokio::test]
async fn test_overflow_tokens_leave_exactly_max_size_entries() {
    let max_size = 5;
    let (pool, _, _) = pool_with(PoolConfig {
        max_size,
        ..PoolConfig::default()
    });

    let tokens: Vec<String> = (0..max_size + 5)
        .map(|i| fresh_token(&format!("user-{}", i)))
        .collect();
    let handles: Vec<_> = tokens.iter().map(|t| pool.get_client(t)).collect();

    pool.cleanup();
    assert_eq!(pool.len(), max_size);

    // Admitted tokens (the ones in active use) keep hitting the cache
    for (token, handle) in tokens.iter().zip(&handles).take(max_size) {
        assert!(pool.get_client(token).shares_client_with(handle));
    }
    // Overflow tokens stay unpooled
    for (token, handle) in tokens.iter().zip(&handles).skip(max_size) {
        assert!(!pool.get_client(token).shares_client_with(handle));
    }
}

#[tokio::test]
async fn test_concurrent_lookups_construct_one_client_per_token() {
    let (pool, factory, _) = pool_with(PoolConfig::default());
    let token = fresh_token("shared");

    let mut handles = Vec::new();
    for _ in 0..8 {
        let pool = pool.clone();
        let token = token.clone();
        handles.push(tokio::spawn(async move { pool.get_client(&token) }));
    }

    let mut clients = Vec::new();
    for handle in handles {
        clients.push(handle.await.unwrap());
    }

    assert_eq!(factory.connect_count(), 1);
    for pair in clients.windows(2) {
        assert!(pair[0].shares_client_with(&pair[1]));
    }
}

#[tokio::test]
async fn test_near_expiry_token_bypasses_the_pool() {
    let (pool, factory, _) = pool_with(PoolConfig::default());
    let token = encode_token("hurried", NOW_MS / 1000 + 200);

    let first = pool.get_client(&token);
    let second = pool.get_client(&token);

    assert!(!first.shares_client_with(&second));
    assert_eq!(factory.connect_count(), 2);
    assert_eq!(pool.len(), 0, "near-expiry credentials must not be cached");
}

#[tokio::test]
async fn test_idle_entries_age_out_while_active_ones_survive() {
    let (pool, _, time) = pool_with(PoolConfig::default());
    let idle = fresh_token("idle");
    let active = encode_token("active", NOW_MS / 1000 + 7200);
    pool.get_client(&idle);
    pool.get_client(&active);

    // Touch only one entry halfway through the TTL window
    time.advance_millis(20 * 60 * 1000);
    let touched = pool.get_client(&active);

    time.advance_millis(15 * 60 * 1000);
    assert_eq!(pool.cleanup(), 1);
    assert_eq!(pool.len(), 1);

    // The survivor is still served from cache
    assert!(pool.get_client(&active).shares_client_with(&touched));
}

#[tokio::test]
async fn test_clear_resets_the_pool() {
    let (pool, factory, _) = pool_with(PoolConfig::default());
    let token = fresh_token("resetme");

    let before = pool.get_client(&token);
    pool.clear();
    let after = pool.get_client(&token);

    assert!(!before.shares_client_with(&after));
    assert_eq!(factory.connect_count(), 2);
}
