//! # Machine-to-machine auth library
//!
//! Both ends of the OAuth2 client-credentials grant for internal services:
//! a consumer that keeps a bearer token fresh and attaches it to outgoing
//! requests, and an issuer that authenticates clients and mints signed,
//! audience-scoped tokens.
//!
//! Modules:
//! - `cache` — single-slot token cache with serialized refresh
//! - `sources` — token fetcher (client-credentials grant) and background refresher
//! - `resilience` — bounded retry with exponential backoff
//! - `sinks` — header injection and the passive HTTP token sink
//! - `issuer` — credential store, token signer, issuance service
//! - `server` — HTTP surface for the issuer, sink and metrics
//! - `config` — YAML service configuration and validation

pub mod app;
pub mod cache;
pub mod config;
pub mod helpers;
pub mod issuer;
pub mod observability;
pub mod resilience;
pub mod server;
pub mod sinks;
pub mod sources;
pub mod utils;

#[cfg(test)]
mod tests;

pub use crate::config::sources::*;
