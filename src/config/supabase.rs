//! Credential store configuration
//!
//! Loads the Supabase project URL, the service key used for PostgREST
//! access and the NaCl secret that opens encrypted sub-account keys.

use thiserror::Error;
use tracing::{debug, info};

/// Errors for Supabase configuration
#[derive(Debug, Error)]
pub enum SupabaseConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid Supabase URL format: {0}")]
    InvalidUrl(String),

    #[error("Invalid BOX_SECRET_KEY: {0}")]
    InvalidSecret(String),
}

/// Supabase configuration loaded from environment variables
#[derive(Clone)]
pub struct SupabaseConfig {
    /// Project URL (e.g. <https://xxx.supabase.co>)
    pub url: String,
    /// Service-role key; sent as `apikey` and bearer token
    pub service_key: String,
    /// Hex X25519 secret for key envelopes, absent when keys are stored in clear
    pub box_secret_key: Option<String>,
}

impl std::fmt::Debug for SupabaseConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SupabaseConfig")
            .field("url", &self.url)
            .field("service_key", &crate::core::logging::sanitize(&self.service_key))
            .field("box_secret_key", &self.box_secret_key.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

impl SupabaseConfig {
    /// Load from `SUPABASE_URL`, `SUPABASE_SERVICE_KEY` and `BOX_SECRET_KEY`.
    ///
    /// - `Ok(None)` when `SUPABASE_URL` is unset
    /// - `Err` when the URL is set but malformed, or the service key is missing
    pub fn from_env() -> Result<Option<Self>, SupabaseConfigError> {
        let url = match std::env::var("SUPABASE_URL") {
            Ok(u) if !u.trim().is_empty() => u.trim().trim_end_matches('/').to_string(),
            _ => {
                debug!("SUPABASE_URL not set, credential store disabled");
                return Ok(None);
            }
        };

        if !url.starts_with("https://") {
            return Err(SupabaseConfigError::InvalidUrl(url));
        }

        let service_key = std::env::var("SUPABASE_SERVICE_KEY")
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| SupabaseConfigError::MissingEnvVar("SUPABASE_SERVICE_KEY".to_string()))?;

        let box_secret_key = match std::env::var("BOX_SECRET_KEY") {
            Ok(secret) if !secret.trim().is_empty() => {
                let stripped = secret.trim().trim_start_matches("0x");
                if stripped.len() != 64 || !stripped.bytes().all(|b| b.is_ascii_hexdigit()) {
                    return Err(SupabaseConfigError::InvalidSecret(
                        "expected 32 bytes of hex".to_string(),
                    ));
                }
                Some(stripped.to_string())
            }
            _ => None,
        };

        info!(
            url = %url,
            envelope_decryption = box_secret_key.is_some(),
            "Supabase configuration loaded"
        );

        Ok(Some(Self {
            url,
            service_key,
            box_secret_key,
        }))
    }

    /// Build a configuration pointing at an arbitrary endpoint (mock servers).
    pub fn new(url: &str, service_key: &str, box_secret_key: Option<&str>) -> Self {
        Self {
            url: url.trim_end_matches('/').to_string(),
            service_key: service_key.to_string(),
            box_secret_key: box_secret_key.map(str::to_string),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;

    fn clear_supabase_env() {
        env::remove_var("SUPABASE_URL");
        env::remove_var("SUPABASE_SERVICE_KEY");
        env::remove_var("BOX_SECRET_KEY");
    }

    #[test]
    #[serial(env)]
    fn test_disabled_when_env_not_set() {
        clear_supabase_env();
        assert!(SupabaseConfig::from_env().unwrap().is_none());
    }

    #[test]
    #[serial(env)]
    fn test_error_when_url_not_https() {
        clear_supabase_env();
        env::set_var("SUPABASE_URL", "http://localhost:54321");
        env::set_var("SUPABASE_SERVICE_KEY", "service-key");
        assert!(matches!(
            SupabaseConfig::from_env(),
            Err(SupabaseConfigError::InvalidUrl(_))
        ));
        clear_supabase_env();
    }

    #[test]
    #[serial(env)]
    fn test_error_when_key_missing() {
        clear_supabase_env();
        env::set_var("SUPABASE_URL", "https://test.supabase.co");
        assert!(matches!(
            SupabaseConfig::from_env(),
            Err(SupabaseConfigError::MissingEnvVar(_))
        ));
        clear_supabase_env();
    }

    #[test]
    #[serial(env)]
    fn test_error_when_secret_malformed() {
        clear_supabase_env();
        env::set_var("SUPABASE_URL", "https://test.supabase.co");
        env::set_var("SUPABASE_SERVICE_KEY", "service-key");
        env::set_var("BOX_SECRET_KEY", "abcd");
        assert!(matches!(
            SupabaseConfig::from_env(),
            Err(SupabaseConfigError::InvalidSecret(_))
        ));
        clear_supabase_env();
    }

    #[test]
    #[serial(env)]
    fn test_success_with_valid_config() {
        clear_supabase_env();
        env::set_var("SUPABASE_URL", "https://test.supabase.co/");
        env::set_var("SUPABASE_SERVICE_KEY", "eyJhbGciOiJIUzI1NiIsInR5cCI6IkpXVCJ9");
        env::set_var("BOX_SECRET_KEY", format!("0x{}", "11".repeat(32)));

        let config = SupabaseConfig::from_env().unwrap().unwrap();
        assert_eq!(config.url, "https://test.supabase.co");
        assert_eq!(config.box_secret_key.as_deref(), Some("11".repeat(32).as_str()));
        assert!(!format!("{:?}", config).contains("eyJhbGciOiJIUzI1NiIsInR5cCI6IkpXVCJ9"));

        clear_supabase_env();
    }
}
