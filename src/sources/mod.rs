//! Sources module
//!
//! Token sources the client-side cache pulls from. The production source is
//! the OAuth2 client-credentials exchange in [`oauth2`]; tests plug in their own.

use crate::cache::token::TokenPayload;

pub mod error;
pub mod executor;
pub mod oauth2;

pub use error::FetchError;

pub trait FetchToken: Send + Sync + 'static {
    /// Obtain a brand new payload, retrying transient failures internally.
    fn fetch_token(&self) -> impl std::future::Future<Output = Result<TokenPayload, FetchError>> + Send;
}
