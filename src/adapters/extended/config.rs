//! Extended Configuration

use std::time::Duration;

use crate::config::constants;

const MAINNET_BASE_URL: &str = "https://api.starknet.extended.exchange";
const API_PREFIX: &str = "/api/v1";

#[derive(Debug, Clone)]
pub struct ExtendedConfig {
    pub base_url: String,
    pub user_agent: String,
    pub request_timeout: Duration,
}

impl Default for ExtendedConfig {
    fn default() -> Self {
        Self {
            base_url: MAINNET_BASE_URL.to_string(),
            user_agent: constants::user_agent(),
            request_timeout: constants::request_timeout(),
        }
    }
}

impl ExtendedConfig {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            ..Self::default()
        }
    }

    /// `EXTENDED_BASE_URL` overrides the mainnet host
    pub fn from_env() -> Self {
        match std::env::var("EXTENDED_BASE_URL") {
            Ok(url) if !url.trim().is_empty() => Self::new(url.trim()),
            _ => Self::default(),
        }
    }

    /// Full URL of an API path such as `user/balance`
    pub fn url(&self, path: &str) -> String {
        format!("{}{}/{}", self.base_url, API_PREFIX, path.trim_start_matches('/'))
    }
}
