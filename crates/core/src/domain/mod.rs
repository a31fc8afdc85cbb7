// Domain Layer - Tokens, client handles, validation

pub mod client;
pub mod error;
pub mod token;

pub use client::ClientHandle;
pub use error::DomainError;
pub use token::{credential_hash, decode_claims, TokenClaims};
