//! Configuration validation with aggregated errors.
//! - Aggregates all issues into Vec<String>
//! - Validates:
//!   * at least one side (client / issuer) is configured
//!   * client endpoint, header name, timing and retry invariants
//!   * issuer TTL, key material and client provisioning
//!   * logging level and server port

use std::collections::HashSet;

use http::HeaderName;
use reqwest::Url;
use tracing::{error, info};

use crate::config::settings::{RetryConfig, SettingsConfig};
use crate::config::sources::{ClientConfig, GenericSourceValue, IssuerConfig, KeysConfig, ServiceConfig};
use crate::utils::constants::MAX_TOKEN_TTL_SECONDS;

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];
const MIN_KEY_BITS: usize = 2048;

/// Public entrypoint: returns Ok(()) or Err(Vec<String>) containing all issues.
pub fn validate_service_config(cfg: &ServiceConfig) -> Result<(), Vec<String>> {
    let mut errors: Vec<String> = Vec::new();

    validate_settings(&cfg.settings, &mut errors);

    if cfg.client.is_none() && cfg.issuer.is_none() {
        errors.push("config: neither 'client' nor 'issuer' is configured".to_string());
    }

    if let Some(client) = &cfg.client {
        validate_client(client, &mut errors);
    }

    if let Some(issuer) = &cfg.issuer {
        validate_issuer(issuer, &mut errors);
    }

    if errors.is_empty() {
        info!("config is valid");
        Ok(())
    } else {
        for e in &errors {
            error!("config validation: {}", e);
        }
        Err(errors)
    }
}

fn validate_settings(settings: &SettingsConfig, errors: &mut Vec<String>) {
    if let Some(logging) = &settings.logging {
        if !LOG_LEVELS.contains(&logging.level.to_lowercase().as_str()) {
            errors.push(format!(
                "settings.logging.level '{}' must be one of {:?}",
                logging.level, LOG_LEVELS
            ));
        }
    }

    if settings.server.port.parse::<u16>().is_err() {
        errors.push(format!("settings.server.port '{}' is not a valid port", settings.server.port));
    }

    if settings.metrics.is_enabled && !settings.metrics.path.starts_with('/') {
        errors.push(format!("settings.metrics.path '{}' must start with '/'", settings.metrics.path));
    }
}

fn validate_client(client: &ClientConfig, errors: &mut Vec<String>) {
    match Url::parse(&client.token_url) {
        Ok(url) if url.scheme() == "http" || url.scheme() == "https" => {}
        Ok(url) => errors.push(format!("client.token_url scheme '{}' is not http(s)", url.scheme())),
        Err(e) => errors.push(format!("client.token_url '{}' is invalid: {}", client.token_url, e)),
    }

    validate_non_blank_literal("client.client_id", &client.client_id, errors);
    validate_non_blank_literal("client.client_secret", &client.client_secret, errors);
    validate_scopes("client.scopes", &client.scopes, errors);

    if let Some(header_name) = &client.header_name {
        if !header_name.trim().is_empty() && HeaderName::from_bytes(header_name.trim().as_bytes()).is_err() {
            errors.push(format!("client.header_name '{}' is not a valid HTTP header name", header_name));
        }
    }

    if client.refresh_interval_seconds == Some(0) {
        errors.push("client.refresh_interval_seconds must be > 0".to_string());
    }
    if client.request_timeout_ms == Some(0) {
        errors.push("client.request_timeout_ms must be > 0".to_string());
    }

    if let Some(retry) = &client.retry {
        validate_retry(retry, errors);
    }

    if let Some(sink) = &client.sink {
        if sink.path.trim().is_empty() {
            errors.push("client.sink.path must not be empty".to_string());
        }
    }
}

fn validate_retry(retry: &RetryConfig, errors: &mut Vec<String>) {
    if retry.attempts == Some(0) {
        errors.push("client.retry.attempts must be >= 1".to_string());
    }
    if let (Some(base), Some(max)) = (retry.base_delay_ms, retry.max_delay_ms) {
        if base > max {
            errors.push(format!(
                "client.retry.base_delay_ms ({}) must be <= max_delay_ms ({})",
                base, max
            ));
        }
    }
}

fn validate_issuer(issuer: &IssuerConfig, errors: &mut Vec<String>) {
    if issuer.issuer.trim().is_empty() {
        errors.push("issuer.issuer must not be empty".to_string());
    }
    if issuer.audience.trim().is_empty() {
        errors.push("issuer.audience must not be empty".to_string());
    }
    if issuer.token_ttl_seconds == 0 {
        errors.push("issuer.token_ttl_seconds must be > 0".to_string());
    } else if issuer.token_ttl_seconds > MAX_TOKEN_TTL_SECONDS {
        errors.push(format!(
            "issuer.token_ttl_seconds {} exceeds {}",
            issuer.token_ttl_seconds, MAX_TOKEN_TTL_SECONDS
        ));
    }
    if let Some(path) = &issuer.token_path {
        if path.trim().is_empty() {
            errors.push("issuer.token_path must not be empty".to_string());
        }
    }

    if let KeysConfig::Ephemeral { bits: Some(bits) } = &issuer.keys {
        if *bits < MIN_KEY_BITS {
            errors.push(format!("issuer.keys.bits {} is below {}", bits, MIN_KEY_BITS));
        }
    }

    let mut seen = HashSet::new();
    for (i, client) in issuer.clients.iter().enumerate() {
        let id = client.id.trim();
        if id.is_empty() {
            errors.push(format!("issuer.clients[{}].id must not be empty", i));
        } else if id.contains(':') {
            errors.push(format!("issuer.clients['{}'].id must not contain ':'", id));
        } else if !seen.insert(id.to_owned()) {
            errors.push(format!("issuer.clients['{}'] is defined more than once", id));
        }
        validate_non_blank_literal(&format!("issuer.clients['{}'].secret", id), &client.secret, errors);
        validate_scopes(&format!("issuer.clients['{}'].scopes", id), &client.scopes, errors);
    }
}

fn validate_scopes(field: &str, scopes: &[String], errors: &mut Vec<String>) {
    for scope in scopes {
        if scope.trim().is_empty() {
            errors.push(format!("{} contains a blank scope", field));
        } else if scope.split_whitespace().count() > 1 {
            errors.push(format!("{} entry '{}' must be a single scope", field, scope));
        }
    }
}

/// Only literals can be checked before resolution.
fn validate_non_blank_literal(field: &str, value: &GenericSourceValue, errors: &mut Vec<String>) {
    if let GenericSourceValue::Literal { value } = value {
        if value.trim().is_empty() {
            errors.push(format!("{} must not be empty", field));
        }
    }
}
