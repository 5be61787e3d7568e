use std::{env, fs};

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;

use crate::config::settings::{RetryConfig, SettingsConfig};
use crate::issuer::service::ScopePolicy;

/// ================================
/// Full service configuration
/// ================================
#[derive(Debug, Deserialize, Clone)]
pub struct ServiceConfig {
    #[serde(default)]
    pub settings: SettingsConfig,
    /// Token-consuming side.
    pub client: Option<ClientConfig>,
    /// Token-issuing side.
    pub issuer: Option<IssuerConfig>,
}

/// Value read from the config literally, from the environment or from a file.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(untagged)]
pub enum GenericSourceValue {
    Literal { value: String },
    FromEnv { from_env: String },
    FromFile { from_file: String },
}

impl GenericSourceValue {
    pub fn resolve(&self) -> Result<String> {
        match self {
            GenericSourceValue::Literal { value } => Ok(value.to_owned()),
            GenericSourceValue::FromEnv { from_env } => env::var(from_env)
                .map_err(|err| anyhow!("environment variable '{}': {}", from_env, err)),
            GenericSourceValue::FromFile { from_file } => fs::read_to_string(from_file)
                .map(|res| res.trim().to_string())
                .with_context(|| format!("failed to read '{}'", from_file)),
        }
    }
}

/// ================================
/// Client
/// ================================
#[derive(Debug, Deserialize, Clone)]
pub struct ClientConfig {
    pub token_url: String,
    pub client_id: GenericSourceValue,
    pub client_secret: GenericSourceValue,
    #[serde(default)]
    pub scopes: Vec<String>,
    pub header_name: Option<String>,
    pub skew_seconds: Option<u64>,
    pub refresh_interval_seconds: Option<u64>,
    pub request_timeout_ms: Option<u64>,
    pub retry: Option<RetryConfig>,
    /// Passive HTTP sink serving the managed header.
    pub sink: Option<ClientSinkConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ClientSinkConfig {
    pub path: String,
}

/// ================================
/// Issuer
/// ================================
#[derive(Debug, Deserialize, Clone)]
pub struct IssuerConfig {
    pub issuer: String,
    pub audience: String,
    pub token_ttl_seconds: u64,
    pub token_path: Option<String>,
    #[serde(default)]
    pub scope_policy: ScopePolicy,
    pub key_id: Option<String>,
    pub keys: KeysConfig,
    #[serde(default)]
    pub clients: Vec<ClientEntryConfig>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum KeysConfig {
    /// PEM-encoded RSA key pair.
    Pem {
        public_pem: GenericSourceValue,
        private_pem: GenericSourceValue,
    },
    /// Generated at startup, lost on restart.
    Ephemeral { bits: Option<usize> },
}

#[derive(Debug, Deserialize, Clone)]
pub struct ClientEntryConfig {
    pub id: String,
    pub secret: GenericSourceValue,
    #[serde(default)]
    pub scopes: Vec<String>,
}
