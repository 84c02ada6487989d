//! Provider-level configuration.

use serde::{Deserialize, Serialize};

use crate::client::{SendGridClient, DEFAULT_BASE_URL};
use crate::error::ProviderError;

/// Environment variable consulted when no API key is configured explicitly.
pub const API_KEY_ENV: &str = "SENDGRID_API_KEY";

/// Configuration for the SendGrid provider.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProviderConfig {
    /// The SendGrid API key used for authentication. Falls back to the
    /// `SENDGRID_API_KEY` environment variable when absent. Sensitive.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// The SendGrid API base URL. Defaults to `https://api.sendgrid.com`;
    /// use `https://api.eu.sendgrid.com` for EU regional accounts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

impl ProviderConfig {
    /// Resolve the configuration into an authenticated client.
    ///
    /// Fails with a `Configuration` error when no API key can be found in
    /// either the config or the environment.
    pub fn build_client(&self) -> Result<SendGridClient, ProviderError> {
        let api_key = match self.api_key.as_deref().filter(|k| !k.is_empty()) {
            Some(key) => key.to_string(),
            None => std::env::var(API_KEY_ENV).unwrap_or_default(),
        };

        if api_key.is_empty() {
            return Err(ProviderError::Configuration(format!(
                "SendGrid API key is required. Set it via the 'api_key' provider config or the {} environment variable",
                API_KEY_ENV
            )));
        }

        let base_url = self
            .base_url
            .as_deref()
            .filter(|u| !u.is_empty())
            .unwrap_or(DEFAULT_BASE_URL);

        SendGridClient::new(api_key, base_url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_api_key() {
        let config = ProviderConfig {
            api_key: Some("SG.test-key".to_string()),
            base_url: None,
        };
        let client = config.build_client().unwrap();
        assert_eq!(client.base_url(), DEFAULT_BASE_URL);
    }

    #[test]
    fn test_custom_base_url() {
        let config = ProviderConfig {
            api_key: Some("SG.test-key".to_string()),
            base_url: Some("https://api.eu.sendgrid.com".to_string()),
        };
        let client = config.build_client().unwrap();
        assert_eq!(client.base_url(), "https://api.eu.sendgrid.com");
    }

    #[test]
    fn test_config_deserializes_from_json() {
        let config: ProviderConfig =
            serde_json::from_str(r#"{"api_key": "SG.k", "base_url": "https://api.eu.sendgrid.com"}"#)
                .unwrap();
        assert_eq!(config.api_key.as_deref(), Some("SG.k"));

        let err = serde_json::from_str::<ProviderConfig>(r#"{"apiKeyy": "SG.k"}"#);
        assert!(err.is_err());
    }
}
