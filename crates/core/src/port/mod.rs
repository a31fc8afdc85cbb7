// Port Layer - Interfaces for external dependencies

pub mod client_factory;
pub mod id_provider; // For deterministic testing
pub mod time_provider;

// Re-exports
pub use client_factory::{ClientFactory, LocalClientFactory};
pub use id_provider::IdProvider;
pub use time_provider::TimeProvider;
