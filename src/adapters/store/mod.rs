//! Credential and bot-status store boundary
//!
//! Sub-account credentials live in a per-user row keyed by
//! `(user id, wallet address)`. Each row carries two slots; each slot holds
//! the API key, Stark public key, Stark private key (plain or enveloped)
//! and the cached account id / vault.

pub mod envelope;
mod supabase;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;

pub use envelope::{resolve_private_key, KeyEnvelope};
pub use supabase::SupabaseStore;

/// Sub-account slot within a user row (1 or 2)
pub type Slot = u8;

/// Raw slot columns as stored; every column may be null
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoredCredentials {
    pub api_key: Option<String>,
    pub public_key: Option<String>,
    /// Plain hex key, JSON envelope object, or envelope serialized as a string
    pub private_key: Option<Value>,
    pub account_id: Option<String>,
    pub vault_id: Option<u64>,
}

/// Per-user delta-neutral settings edited from the dashboard
#[derive(Debug, Clone, PartialEq)]
pub struct UserBotConfig {
    pub asset: String,
    pub leverage: Option<u32>,
    /// Hold duration in minutes
    pub duration_cycle: Option<u64>,
}

#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Slot columns, `None` when the user row does not exist
    async fn credentials(&self, user_id: &str, wallet: &str, slot: Slot) -> Result<Option<StoredCredentials>>;

    /// Cache the account id and vault fetched from the exchange
    async fn save_account_reference(
        &self,
        user_id: &str,
        wallet: &str,
        slot: Slot,
        account_id: &str,
        vault_id: u64,
    ) -> Result<()>;
}

#[async_trait]
pub trait StatusStore: Send + Sync {
    async fn bot_config(&self, user_id: &str, wallet: &str) -> Result<Option<UserBotConfig>>;

    /// `bot_running` flag; a missing row reads as stopped
    async fn is_running(&self, user_id: &str, wallet: &str) -> Result<bool>;

    async fn set_running(&self, user_id: &str, wallet: &str, running: bool) -> Result<()>;
}
