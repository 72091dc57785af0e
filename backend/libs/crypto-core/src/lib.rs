//! Shared token primitives for Murmur services.
//!
//! `jwt` issues and validates the bearer tokens every authenticated HTTP route
//! expects in its `Authorization` header.
pub mod jwt;

pub use jwt::{Claims, JwtCodec, JwtError};
