//! Account/session loading
//!
//! Resolves one sub-account slot into a [`TradingAccount`]: stored
//! credentials, decrypted Stark key, account id and vault. Missing ids are
//! fetched from `/user/account/info` and written back to the store.

use std::sync::Arc;

use crate::adapters::extended::TransferEndpoint;
use crate::adapters::store::{resolve_private_key, CredentialStore, Slot};
use crate::adapters::traits::ExtendedApi;
use crate::adapters::types::ApiCredentials;
use crate::config::UserConfig;
use crate::core::logging::sanitize;
use crate::core::numeric::ensure_hex_prefix;
use crate::error::{AppError, Result};

/// One Extended sub-account, ready to sign. Lives as long as the session.
#[derive(Debug, Clone)]
pub struct TradingAccount {
    pub slot: Slot,
    pub creds: ApiCredentials,
    pub account_id: String,
    pub vault_id: u64,
}

impl TradingAccount {
    pub fn label(&self) -> String {
        format!("subaccount{}", self.slot)
    }

    pub fn endpoint(&self) -> TransferEndpoint {
        TransferEndpoint {
            account_id: self.account_id.clone(),
            vault_id: self.vault_id,
            public_key: self.creds.public_key.clone(),
        }
    }
}

/// Slot 1 carries the long leg, slot 2 the short leg
#[derive(Debug, Clone)]
pub struct AccountPair {
    pub a: TradingAccount,
    pub b: TradingAccount,
}

pub struct SessionLoader {
    store: Arc<dyn CredentialStore>,
    api: Arc<dyn ExtendedApi>,
    user: UserConfig,
    box_secret_key: Option<String>,
}

impl SessionLoader {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        api: Arc<dyn ExtendedApi>,
        user: UserConfig,
        box_secret_key: Option<String>,
    ) -> Self {
        Self {
            store,
            api,
            user,
            box_secret_key,
        }
    }

    pub async fn load_account(&self, slot: Slot) -> Result<TradingAccount> {
        let user_id = &self.user.user_id;
        let wallet = &self.user.wallet_address;

        let stored = self.store.credentials(user_id, wallet, slot).await?.ok_or_else(|| {
            AppError::Config(format!(
                "Extended subaccount {} configuration not found for user {}",
                slot, user_id
            ))
        })?;

        let (api_key, public_key, raw_private) = match (stored.api_key, stored.public_key, stored.private_key) {
            (Some(api), Some(public), Some(private)) => (api, public, private),
            _ => {
                return Err(AppError::Config(format!(
                    "Incomplete credentials for subaccount {}",
                    slot
                )))
            }
        };

        let private_key = ensure_hex_prefix(&resolve_private_key(&raw_private, self.box_secret_key.as_deref())?);
        let creds = ApiCredentials {
            api_key,
            public_key: ensure_hex_prefix(&public_key),
            private_key,
        };

        let (account_id, vault_id) = match (stored.account_id, stored.vault_id) {
            (Some(account_id), Some(vault_id)) => (account_id, vault_id),
            (cached_id, cached_vault) => {
                let (fetched_id, fetched_vault) = self.fetch_account_reference(&creds).await?;
                let account_id = cached_id.unwrap_or(fetched_id);
                let vault_id = cached_vault.unwrap_or(fetched_vault);
                if let Err(e) = self
                    .store
                    .save_account_reference(user_id, wallet, slot, &account_id, vault_id)
                    .await
                {
                    tracing::warn!(slot, error = %e, "[SESSION] Could not cache account reference");
                }
                (account_id, vault_id)
            }
        };

        tracing::info!(
            slot,
            api_key = %sanitize(&creds.api_key),
            account_id = %account_id,
            vault_id,
            "[SESSION] Sub-account loaded"
        );

        Ok(TradingAccount {
            slot,
            creds,
            account_id,
            vault_id,
        })
    }

    /// Both slots, loaded concurrently
    pub async fn load_pair(&self) -> Result<AccountPair> {
        let (a, b) = tokio::try_join!(self.load_account(1), self.load_account(2))?;
        if a.vault_id == b.vault_id {
            return Err(AppError::Config(format!(
                "Sub-accounts 1 and 2 share vault {}",
                a.vault_id
            )));
        }
        Ok(AccountPair { a, b })
    }

    async fn fetch_account_reference(&self, creds: &ApiCredentials) -> Result<(String, u64)> {
        let info = self.api.account_info(creds).await.map_err(|e| match e {
            AppError::ExternalService { .. } => e,
            other => AppError::external("extended", None, format!("account info unavailable: {}", other)),
        })?;

        let account_id = info
            .account_id
            .filter(|id| !id.trim().is_empty())
            .ok_or_else(|| AppError::data("accountId", "missing from account info"))?;
        let vault_id = info
            .l2_vault
            .as_deref()
            .and_then(|v| v.trim().parse::<u64>().ok())
            .filter(|v| *v > 0)
            .ok_or_else(|| AppError::data("l2Vault", "missing or not a number"))?;

        tracing::info!(account_id = %account_id, vault_id, "[SESSION] Account reference fetched from exchange");
        Ok((account_id, vault_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::store::StoredCredentials;
    use crate::adapters::test_utils::{MockExtendedApi, MockStore};
    use serde_json::Value;
    use std::sync::atomic::Ordering;

    fn user() -> UserConfig {
        UserConfig {
            user_id: "42".into(),
            wallet_address: "0xwallet".into(),
        }
    }

    fn loader(store: MockStore, api: MockExtendedApi) -> (SessionLoader, Arc<MockStore>, Arc<MockExtendedApi>) {
        let store = Arc::new(store);
        let api = Arc::new(api);
        let loader = SessionLoader::new(store.clone(), api.clone(), user(), None);
        (loader, store, api)
    }

    #[tokio::test]
    async fn test_load_pair_backfills_account_reference() {
        let (loader, store, api) = loader(
            MockStore::new().with_slot(1, "a").with_slot(2, "b"),
            MockExtendedApi::new().with_account("a", "1001", 500001).with_account("b", "1002", 500002),
        );

        let pair = loader.load_pair().await.unwrap();
        assert_eq!(pair.a.account_id, "1001");
        assert_eq!(pair.b.vault_id, 500002);
        assert!(pair.a.creds.private_key.starts_with("0x"));
        assert_eq!(api.account_info_calls.load(Ordering::Relaxed), 2);

        let mut saved = store.saved_references.lock().unwrap().clone();
        saved.sort();
        assert_eq!(saved, vec![(1, "1001".to_string(), 500001), (2, "1002".to_string(), 500002)]);
    }

    #[tokio::test]
    async fn test_cached_reference_skips_account_info() {
        let creds = MockExtendedApi::creds("a");
        let (loader, _, api) = loader(
            MockStore::new().with_stored(
                1,
                StoredCredentials {
                    api_key: Some(creds.api_key),
                    public_key: Some(creds.public_key),
                    private_key: Some(Value::String(creds.private_key)),
                    account_id: Some("77".into()),
                    vault_id: Some(9000),
                },
            ),
            MockExtendedApi::new(),
        );

        let account = loader.load_account(1).await.unwrap();
        assert_eq!(account.endpoint().vault_id, 9000);
        assert_eq!(account.label(), "subaccount1");
        assert_eq!(api.account_info_calls.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn test_missing_or_incomplete_credentials() {
        let (loader, _, _) = loader(
            MockStore::new().with_stored(
                2,
                StoredCredentials {
                    api_key: Some("b".into()),
                    ..Default::default()
                },
            ),
            MockExtendedApi::new(),
        );

        assert!(matches!(loader.load_account(1).await, Err(AppError::Config(_))));
        assert!(matches!(loader.load_account(2).await, Err(AppError::Config(_))));
    }

    #[tokio::test]
    async fn test_account_info_without_vault_is_data_error() {
        let (loader, _, _) = loader(MockStore::new().with_slot(1, "a"), MockExtendedApi::new());
        let err = loader.load_account(1).await.unwrap_err();
        assert!(matches!(err, AppError::Data { ref field, .. } if field == "l2Vault"));
    }

    #[tokio::test]
    async fn test_pair_sharing_vault_is_rejected() {
        let (loader, _, _) = loader(
            MockStore::new().with_slot(1, "a").with_slot(2, "b"),
            MockExtendedApi::new().with_account("a", "1", 7).with_account("b", "2", 7),
        );
        assert!(matches!(loader.load_pair().await, Err(AppError::Config(_))));
    }
}
