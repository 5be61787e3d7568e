//! Token-issuing side: credential store, signer and the request handler
//! that ties them together.

pub mod client_store;
pub mod keys;
pub mod service;
pub mod signer;

pub use client_store::{ClientRecord, ClientStore, InMemoryClientStore};
pub use service::{IssuanceService, ScopePolicy, TokenRequest, TokenResult};
pub use signer::{Issued, RsaTokenSigner, TokenSigner};
