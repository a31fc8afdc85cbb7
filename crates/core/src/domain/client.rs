// Client Handle Domain Model

use std::sync::Arc;

/// Logical backend client bound to one bearer token
///
/// Cheap to clone; the pool hands out clones of one shared handle per cached
/// credential. The handle is opaque to this crate - storage collaborators
/// read the token off it when talking to the backend.
#[derive(Debug, Clone)]
pub struct ClientHandle {
    inner: Arc<HandleInner>,
}

#[derive(Debug)]
struct HandleInner {
    token: String,
    subject: Option<String>,
}

impl ClientHandle {
    pub fn new(token: impl Into<String>, subject: Option<String>) -> Self {
        Self {
            inner: Arc::new(HandleInner {
                token: token.into(),
                subject,
            }),
        }
    }

    /// The raw bearer token this handle authenticates with
    pub fn token(&self) -> &str {
        &self.inner.token
    }

    /// Subject claim, when the token carried a decodable one
    pub fn subject(&self) -> Option<&str> {
        self.inner.subject.as_deref()
    }

    /// True when both handles share the same underlying client
    ///
    /// Lets callers (and tests) tell a pool hit from a fresh construction.
    pub fn shares_client_with(&self, other: &ClientHandle) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}
