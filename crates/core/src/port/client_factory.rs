// Client Factory Port
// Abstraction for constructing backend client handles from bearer tokens

use crate::domain::{decode_claims, ClientHandle};

/// Client Factory trait
///
/// Implementations:
/// - LocalClientFactory: builds handles for the local file-backed store
/// - mocks::MockClientFactory: counts constructions for pool tests
///
/// Construction must be cheap and infallible - the pool calls it on every
/// cache miss and on every request carrying a near-expiry token.
pub trait ClientFactory: Send + Sync {
    /// Build a logical backend client for the given bearer token
    fn connect(&self, token: &str) -> ClientHandle;
}

/// Production factory for the local-first deployment
///
/// The subject claim is carried onto the handle when the token decodes;
/// an undecodable token still yields a usable handle (the backend performs
/// the actual credential check).
pub struct LocalClientFactory;

impl ClientFactory for LocalClientFactory {
    fn connect(&self, token: &str) -> ClientHandle {
        let subject = decode_claims(token).ok().map(|claims| claims.sub);
        ClientHandle::new(token, subject)
    }
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// Mock factory that records how many handles it has constructed
    pub struct MockClientFactory {
        connect_count: Arc<Mutex<usize>>,
    }

    impl MockClientFactory {
        pub fn new() -> Self {
            Self {
                connect_count: Arc::new(Mutex::new(0)),
            }
        }

        /// Number of handles constructed so far
        pub fn connect_count(&self) -> usize {
            *self.connect_count.lock().unwrap()
        }
    }

    impl Default for MockClientFactory {
        fn default() -> Self {
            Self::new()
        }
    }

    impl ClientFactory for MockClientFactory {
        fn connect(&self, token: &str) -> ClientHandle {
            *self.connect_count.lock().unwrap() += 1;
            let subject = decode_claims(token).ok().map(|claims| claims.sub);
            ClientHandle::new(token, subject)
        }
    }
}
