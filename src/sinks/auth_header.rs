use std::sync::Arc;

use http::{HeaderName, HeaderValue};
use reqwest::RequestBuilder;

use crate::cache::token_cache::TokenCache;
use crate::sources::{FetchError, FetchToken};
use crate::utils::constants::DEFAULT_HEADER_NAME;

/// Attaches `<header>: Bearer <token>` to outgoing requests.
pub struct AuthHeader<F: FetchToken> {
    cache: Arc<TokenCache<F>>,
    header_name: HeaderName,
}

impl<F: FetchToken> Clone for AuthHeader<F> {
    fn clone(&self) -> Self {
        Self {
            cache: self.cache.clone(),
            header_name: self.header_name.clone(),
        }
    }
}

impl<F: FetchToken> AuthHeader<F> {
    /// A missing or blank name falls back to `Secured-Authorization`.
    pub fn new(
        cache: Arc<TokenCache<F>>,
        header_name: Option<&str>,
    ) -> Result<Self, http::header::InvalidHeaderName> {
        let name = header_name
            .map(str::trim)
            .filter(|h| !h.is_empty())
            .unwrap_or(DEFAULT_HEADER_NAME);
        let header_name = HeaderName::from_bytes(name.as_bytes())?;
        Ok(Self { cache, header_name })
    }

    pub fn header_name(&self) -> &HeaderName {
        &self.header_name
    }

    pub fn cache(&self) -> &Arc<TokenCache<F>> {
        &self.cache
    }

    pub async fn header_value(&self) -> Result<HeaderValue, FetchError> {
        let token = self.cache.current_token().await?;
        let mut value = HeaderValue::from_str(&format!("Bearer {token}"))
            .map_err(|e| FetchError::Malformed(format!("token is not a valid header value: {e}")))?;
        value.set_sensitive(true);
        Ok(value)
    }

    pub async fn add(&self, builder: RequestBuilder) -> Result<RequestBuilder, FetchError> {
        let value = self.header_value().await?;
        Ok(builder.header(self.header_name.clone(), value))
    }
}
