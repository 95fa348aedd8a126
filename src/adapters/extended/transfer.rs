//! Inter-account collateral transfers
//!
//! A transfer moves USDC between two sub-accounts of the same wallet. The
//! sender signs a settlement over both vault ids, the collateral asset and
//! the amount in collateral resolution.

use std::sync::Arc;

use rust_decimal::prelude::*;

use super::order::{current_time_ms, fixed_width_hex, random_nonce, starknet_expiration};
use super::signing::{SigningOracle, TransferHashParams};
use crate::adapters::traits::ExtendedApi;
use crate::adapters::types::{ApiCredentials, StarkSignature, StarknetDomain, TransferRequest, TransferSettlement};
use crate::config::constants;
use crate::error::{AppError, Result};

/// On-chain id of the USD collateral asset
pub const COLLATERAL_ASSET_ID: &str = "0x1";

/// USDC carries 6 decimals on the settlement layer
pub const COLLATERAL_RESOLUTION: Decimal = Decimal::from_parts(1_000_000, 0, 0, false, 0);

/// One side of a transfer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferEndpoint {
    pub account_id: String,
    pub vault_id: u64,
    pub public_key: String,
}

pub struct TransferInputs<'a> {
    pub sender: &'a ApiCredentials,
    pub from: &'a TransferEndpoint,
    pub to: &'a TransferEndpoint,
    pub amount: Decimal,
    pub asset: &'a str,
    pub domain: &'a StarknetDomain,
    pub nonce: u64,
    pub now_ms: u64,
}

/// Build and sign a transfer body from pre-fetched inputs
pub fn compose_transfer(oracle: &dyn SigningOracle, inputs: &TransferInputs<'_>) -> Result<TransferRequest> {
    if inputs.from.vault_id == inputs.to.vault_id {
        return Err(AppError::Validation("Transfer source and destination are the same vault".into()));
    }

    let units = (inputs.amount * COLLATERAL_RESOLUTION)
        .floor()
        .to_u128()
        .filter(|u| *u > 0)
        .ok_or_else(|| AppError::Validation(format!("Transfer amount must be > 0, got {}", inputs.amount)))?;
    let amount = (Decimal::from(units) / COLLATERAL_RESOLUTION).normalize();

    let sender_public_key = if inputs.from.public_key.trim().is_empty() {
        oracle.public_key(&inputs.sender.private_key)?
    } else {
        inputs.from.public_key.clone()
    };

    let expiration = starknet_expiration(inputs.now_ms + constants::order_expiry().as_millis() as u64);

    let hash = oracle.derive_transfer_hash(&TransferHashParams {
        recipient_position_id: inputs.to.vault_id,
        sender_position_id: inputs.from.vault_id,
        collateral_id: COLLATERAL_ASSET_ID.to_string(),
        amount: units,
        expiration,
        salt: inputs.nonce,
        user_public_key: sender_public_key.clone(),
        domain: inputs.domain.clone(),
    })?;
    let signature = oracle.sign(&inputs.sender.private_key, &fixed_width_hex(&hash))?;

    Ok(TransferRequest {
        from_account: inputs.from.account_id.clone(),
        to_account: inputs.to.account_id.clone(),
        amount: amount.to_string(),
        transferred_asset: inputs.asset.to_string(),
        settlement: TransferSettlement {
            amount: units.to_string(),
            asset_id: COLLATERAL_ASSET_ID.to_string(),
            expiration_timestamp: expiration,
            nonce: inputs.nonce,
            receiver_position_id: inputs.to.vault_id,
            receiver_public_key: inputs.to.public_key.clone(),
            sender_position_id: inputs.from.vault_id,
            sender_public_key,
            signature: StarkSignature {
                r: fixed_width_hex(&signature.r),
                s: fixed_width_hex(&signature.s),
            },
        },
    })
}

/// Signs and submits transfers with the sender's credentials
pub struct TransferBuilder {
    api: Arc<dyn ExtendedApi>,
    oracle: Arc<dyn SigningOracle>,
}

impl TransferBuilder {
    pub fn new(api: Arc<dyn ExtendedApi>, oracle: Arc<dyn SigningOracle>) -> Self {
        Self { api, oracle }
    }

    pub async fn build(
        &self,
        sender: &ApiCredentials,
        from: &TransferEndpoint,
        to: &TransferEndpoint,
        amount: Decimal,
        asset: &str,
    ) -> Result<TransferRequest> {
        let domain = self.api.starknet_domain().await?;
        compose_transfer(
            self.oracle.as_ref(),
            &TransferInputs {
                sender,
                from,
                to,
                amount,
                asset,
                domain: &domain,
                nonce: random_nonce(),
                now_ms: current_time_ms(),
            },
        )
    }

    pub async fn send(
        &self,
        sender: &ApiCredentials,
        from: &TransferEndpoint,
        to: &TransferEndpoint,
        amount: Decimal,
        asset: &str,
    ) -> Result<TransferRequest> {
        let request = self.build(sender, from, to, amount, asset).await?;
        tracing::info!(
            from = %request.from_account,
            to = %request.to_account,
            amount = %request.amount,
            "[REBALANCE] Submitting transfer"
        );
        self.api.transfer(sender, &request).await?;
        Ok(request)
    }
}
