//! Environment-derived configuration.
//!
//! Read once at startup. Credentials a selected feature needs are checked
//! before any fetch happens.

use thiserror::Error;

pub const DEFAULT_REGION: &str = "us-east-1";

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} environment variable not set")]
    Missing(&'static str),
}

/// Settings for an S3-compatible object store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectStoreSettings {
    /// Custom endpoint, e.g. a MinIO or R2 URL
    pub endpoint_url: Option<String>,
    pub region: String,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
}

impl Default for ObjectStoreSettings {
    fn default() -> Self {
        Self {
            endpoint_url: None,
            region: DEFAULT_REGION.to_string(),
            access_key_id: None,
            secret_access_key: None,
        }
    }
}

/// SMTP sender credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailCredentials {
    pub user: String,
    pub password: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectorConfig {
    pub api_key: Option<String>,
    pub api_url: Option<String>,
    pub email_user: Option<String>,
    pub email_password: Option<String>,
    pub object_store: ObjectStoreSettings,
}

impl CollectorConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        Self {
            api_key: get("OPTIONS_API_KEY"),
            api_url: get("OPTIONS_API_URL"),
            email_user: get("EMAIL_USER"),
            email_password: get("EMAIL_PWD"),
            object_store: ObjectStoreSettings {
                endpoint_url: get("ENDPOINT_URL"),
                region: get("AWS_REGION").unwrap_or_else(|| DEFAULT_REGION.to_string()),
                access_key_id: get("AWS_ACCESS_KEY_ID"),
                secret_access_key: get("AWS_SECRET_ACCESS_KEY"),
            },
        }
    }

    pub fn require_api_key(&self) -> Result<&str, ConfigError> {
        self.api_key
            .as_deref()
            .ok_or(ConfigError::Missing("OPTIONS_API_KEY"))
    }

    pub fn require_email(&self) -> Result<EmailCredentials, ConfigError> {
        let user = self.email_user.clone().ok_or(ConfigError::Missing("EMAIL_USER"))?;
        let password = self
            .email_password
            .clone()
            .ok_or(ConfigError::Missing("EMAIL_PWD"))?;
        Ok(EmailCredentials { user, password })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> CollectorConfig {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        CollectorConfig::from_lookup(|name| map.get(name).cloned())
    }

    #[test]
    fn test_empty_environment() {
        let cfg = config(&[]);
        assert_eq!(cfg.require_api_key(), Err(ConfigError::Missing("OPTIONS_API_KEY")));
        assert_eq!(cfg.require_email(), Err(ConfigError::Missing("EMAIL_USER")));
        assert_eq!(cfg.object_store.region, "us-east-1");
        assert_eq!(cfg.object_store.endpoint_url, None);
    }

    #[test]
    fn test_blank_values_are_unset() {
        let cfg = config(&[("OPTIONS_API_KEY", "  "), ("EMAIL_USER", "me@example.com")]);
        assert!(cfg.require_api_key().is_err());
        assert_eq!(cfg.require_email(), Err(ConfigError::Missing("EMAIL_PWD")));
    }

    #[test]
    fn test_full_environment() {
        let cfg = config(&[
            ("OPTIONS_API_KEY", "abc123"),
            ("EMAIL_USER", "me@example.com"),
            ("EMAIL_PWD", "secret"),
            ("ENDPOINT_URL", "http://localhost:9000"),
            ("AWS_REGION", "eu-west-2"),
            ("AWS_ACCESS_KEY_ID", "minio"),
            ("AWS_SECRET_ACCESS_KEY", "minio123"),
        ]);
        assert_eq!(cfg.require_api_key(), Ok("abc123"));
        assert_eq!(
            cfg.require_email(),
            Ok(EmailCredentials {
                user: "me@example.com".to_string(),
                password: "secret".to_string()
            })
        );
        assert_eq!(cfg.object_store.endpoint_url.as_deref(), Some("http://localhost:9000"));
        assert_eq!(cfg.object_store.region, "eu-west-2");
        assert_eq!(cfg.object_store.access_key_id.as_deref(), Some("minio"));
    }
}
