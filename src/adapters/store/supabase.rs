//! Supabase PostgREST store
//!
//! Tables:
//! - `extended`: one row per `(discord_id, wallet_address)` with
//!   `subaccount{N}_api|_public|_private|_account_id|_l2Vault` columns
//! - `extended_config`: per-user bot settings and the `bot_running` flag

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Response, StatusCode};
use serde_json::{json, Value};

use super::{CredentialStore, Slot, StatusStore, StoredCredentials, UserBotConfig};
use crate::config::constants;
use crate::config::supabase::SupabaseConfig;
use crate::core::logging::sanitize;
use crate::error::{AppError, Result};

const SERVICE: &str = "supabase";
const CREDENTIALS_TABLE: &str = "extended";
const CONFIG_TABLE: &str = "extended_config";

fn header(value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value).map_err(|_| AppError::Config("Supabase service key is not a valid header".into()))
}

fn slot_column(slot: Slot, suffix: &str) -> String {
    format!("subaccount{}_{}", slot, suffix)
}

fn non_empty_string(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Numeric columns arrive as JSON numbers or numeric strings
fn positive_u64(value: Option<&Value>) -> Option<u64> {
    let parsed = match value? {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    };
    parsed.filter(|v| *v > 0)
}

pub struct SupabaseStore {
    base_url: String,
    client: reqwest::Client,
}

impl SupabaseStore {
    pub fn new(config: &SupabaseConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert("apikey", header(&config.service_key)?);
        headers.insert(AUTHORIZATION, header(&format!("Bearer {}", config.service_key))?);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(constants::request_timeout())
            .build()
            .map_err(|e| AppError::Config(format!("Failed to build Supabase client: {}", e)))?;

        Ok(Self {
            base_url: config.url.trim_end_matches('/').to_string(),
            client,
        })
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    /// First row of a filtered select, `None` when nothing matches
    async fn select_row(&self, table: &str, columns: &str, user_id: &str, wallet: &str) -> Result<Option<Value>> {
        let response = self
            .client
            .get(self.table_url(table))
            .query(&[
                ("select", columns.to_string()),
                ("discord_id", format!("eq.{}", user_id)),
                ("wallet_address", format!("eq.{}", wallet)),
                ("limit", "1".to_string()),
            ])
            .send()
            .await?;

        let body = Self::checked(response).await?;
        let rows: Value = serde_json::from_str(&body).map_err(|e| AppError::data(table, e.to_string()))?;
        match rows {
            Value::Array(mut rows) if !rows.is_empty() => Ok(Some(rows.swap_remove(0))),
            Value::Array(_) => Ok(None),
            other => Err(AppError::data(table, format!("expected row array, got {}", other))),
        }
    }

    async fn update_row(&self, table: &str, user_id: &str, wallet: &str, patch: &Value) -> Result<()> {
        let response = self
            .client
            .patch(self.table_url(table))
            .query(&[
                ("discord_id", format!("eq.{}", user_id)),
                ("wallet_address", format!("eq.{}", wallet)),
            ])
            .header("Prefer", "return=minimal")
            .json(patch)
            .send()
            .await?;
        Self::checked(response).await.map(|_| ())
    }

    async fn checked(response: Response) -> Result<String> {
        let status = response.status();
        let body = response.text().await.unwrap_or_else(|_| "<no body>".to_string());
        match status {
            s if s.is_success() => Ok(body),
            StatusCode::UNAUTHORIZED => Err(AppError::external(
                SERVICE,
                Some(status.as_u16()),
                "Invalid Supabase credentials",
            )),
            _ => {
                tracing::error!(status = %status, response_body = %body, "Supabase request failed");
                Err(AppError::external(SERVICE, Some(status.as_u16()), body))
            }
        }
    }
}

#[async_trait]
impl CredentialStore for SupabaseStore {
    async fn credentials(&self, user_id: &str, wallet: &str, slot: Slot) -> Result<Option<StoredCredentials>> {
        let columns = ["api", "public", "private", "account_id", "l2Vault"]
            .iter()
            .map(|suffix| slot_column(slot, suffix))
            .collect::<Vec<_>>()
            .join(",");

        let Some(row) = self.select_row(CREDENTIALS_TABLE, &columns, user_id, wallet).await? else {
            tracing::warn!(user = %user_id, wallet = %sanitize(wallet), slot, "[SESSION] No credential row");
            return Ok(None);
        };

        let private_key = row
            .get(slot_column(slot, "private"))
            .filter(|v| !v.is_null())
            .cloned();

        Ok(Some(StoredCredentials {
            api_key: non_empty_string(row.get(slot_column(slot, "api"))),
            public_key: non_empty_string(row.get(slot_column(slot, "public"))),
            private_key,
            account_id: non_empty_string(row.get(slot_column(slot, "account_id"))),
            vault_id: positive_u64(row.get(slot_column(slot, "l2Vault"))),
        }))
    }

    async fn save_account_reference(
        &self,
        user_id: &str,
        wallet: &str,
        slot: Slot,
        account_id: &str,
        vault_id: u64,
    ) -> Result<()> {
        let mut patch = serde_json::Map::new();
        let account_value = account_id
            .parse::<u64>()
            .map(Value::from)
            .unwrap_or_else(|_| Value::from(account_id));
        patch.insert(slot_column(slot, "account_id"), account_value);
        patch.insert(slot_column(slot, "l2Vault"), Value::from(vault_id));

        self.update_row(CREDENTIALS_TABLE, user_id, wallet, &Value::Object(patch)).await?;
        tracing::info!(user = %user_id, slot, account_id = %account_id, vault_id, "[SESSION] Account reference saved");
        Ok(())
    }
}

#[async_trait]
impl StatusStore for SupabaseStore {
    async fn bot_config(&self, user_id: &str, wallet: &str) -> Result<Option<UserBotConfig>> {
        let row = self
            .select_row(CONFIG_TABLE, "asset,leverage,duration_cycle", user_id, wallet)
            .await?;
        Ok(row.and_then(|row| {
            let asset = non_empty_string(row.get("asset"))?;
            Some(UserBotConfig {
                asset,
                leverage: positive_u64(row.get("leverage")).and_then(|l| u32::try_from(l).ok()),
                duration_cycle: positive_u64(row.get("duration_cycle")),
            })
        }))
    }

    async fn is_running(&self, user_id: &str, wallet: &str) -> Result<bool> {
        let row = self.select_row(CONFIG_TABLE, "bot_running", user_id, wallet).await?;
        Ok(row
            .and_then(|r| r.get("bot_running").and_then(Value::as_bool))
            .unwrap_or(false))
    }

    async fn set_running(&self, user_id: &str, wallet: &str, running: bool) -> Result<()> {
        self.update_row(CONFIG_TABLE, user_id, wallet, &json!({ "bot_running": running }))
            .await?;
        tracing::info!(user = %user_id, running, "Bot status persisted");
        Ok(())
    }
}
