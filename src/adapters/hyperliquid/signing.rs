//! Hyperliquid L1 action signing
//!
//! Two stages:
//! 1. `action_hash = keccak256(msgpack(action) ‖ nonce_be8 ‖ vault_tag)`
//! 2. EIP-712 signature of the phantom agent `{source, connectionId: action_hash}`
//!    under the `Exchange` domain (chain id 1337)
//!
//! Wire structs keep the field order of the reference SDK: msgpack encodes
//! maps in declaration order and the hash depends on it.

use alloy::primitives::{keccak256, Address, B256};
use alloy::signers::local::PrivateKeySigner;
use alloy::signers::Signer as AlloySigner;
use alloy::sol;
use alloy::sol_types::{eip712_domain, SolStruct};
use rust_decimal::prelude::*;
use serde::Serialize;

use crate::config::BuilderKind;
use crate::error::{AppError, Result};

const EIP712_DOMAIN_NAME: &str = "Exchange";
const EIP712_DOMAIN_VERSION: &str = "1";
const EIP712_CHAIN_ID: u64 = 1337;

const MAX_SIG_FIGS: u32 = 5;
const MAX_PERP_DECIMALS: u32 = 6;
const MAX_SPOT_DECIMALS: u32 = 8;

sol! {
    #[derive(Debug)]
    struct Agent {
        string source;
        bytes32 connectionId;
    }
}

// =============================================================================
// Wire Format
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuilderInfo {
    #[serde(rename = "b")]
    pub address: String,
    #[serde(rename = "f")]
    pub fee: u64,
}

impl From<BuilderKind> for BuilderInfo {
    fn from(kind: BuilderKind) -> Self {
        match kind {
            BuilderKind::Based => BuilderInfo {
                address: "0x1924b8561eeF20e70Ede628A296175D358BE80e5".to_string(),
                fee: 100,
            },
            BuilderKind::Unit => BuilderInfo {
                address: "0xbe698e3d926a5cc2658aa6cffcc7bb0857314c82".to_string(),
                fee: 40,
            },
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LimitOrderType {
    pub tif: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct OrderTypeWire {
    pub limit: LimitOrderType,
}

impl OrderTypeWire {
    pub fn ioc() -> Self {
        Self {
            limit: LimitOrderType { tif: "Ioc".to_string() },
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct OrderWire {
    #[serde(rename = "a")]
    pub asset: u32,
    #[serde(rename = "b")]
    pub is_buy: bool,
    #[serde(rename = "p")]
    pub limit_px: String,
    #[serde(rename = "s")]
    pub sz: String,
    #[serde(rename = "r")]
    pub reduce_only: bool,
    #[serde(rename = "t")]
    pub order_type: OrderTypeWire,
}

#[derive(Debug, Clone, Serialize)]
pub struct OrderAction {
    #[serde(rename = "type")]
    pub action_type: String,
    pub orders: Vec<OrderWire>,
    pub grouping: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub builder: Option<BuilderInfo>,
}

impl OrderAction {
    /// Single IOC order with builder attribution
    pub fn ioc(order: OrderWire, builder: Option<BuilderInfo>) -> Self {
        Self {
            action_type: "order".to_string(),
            orders: vec![order],
            grouping: "na".to_string(),
            builder,
        }
    }
}

/// `{r, s, v}` as sent in the `/exchange` body
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActionSignature {
    pub r: String,
    pub s: String,
    pub v: u64,
}

// =============================================================================
// Hashing and signing
// =============================================================================

pub fn action_hash<T: Serialize>(action: &T, nonce: u64, vault_address: Option<Address>) -> Result<B256> {
    let mut data = rmp_serde::to_vec_named(action)
        .map_err(|e| AppError::Crypto(format!("Action serialization failed: {}", e)))?;
    data.extend_from_slice(&nonce.to_be_bytes());
    match vault_address {
        None => data.push(0x00),
        Some(addr) => {
            data.push(0x01);
            data.extend_from_slice(addr.as_slice());
        }
    }
    Ok(keccak256(&data))
}

/// EIP-712 digest of the phantom agent for `connection_id`
pub fn agent_signing_hash(connection_id: B256, is_mainnet: bool) -> B256 {
    let domain = eip712_domain! {
        name: EIP712_DOMAIN_NAME,
        version: EIP712_DOMAIN_VERSION,
        chain_id: EIP712_CHAIN_ID,
        verifying_contract: Address::ZERO,
    };
    let agent = Agent {
        source: if is_mainnet { "a" } else { "b" }.to_string(),
        connectionId: connection_id,
    };
    agent.eip712_signing_hash(&domain)
}

pub fn parse_agent_key(private_key: &str) -> Result<PrivateKeySigner> {
    let trimmed = private_key.trim().trim_start_matches("0x");
    let bytes = hex::decode(trimmed).map_err(|e| AppError::Crypto(format!("Invalid agent key hex: {}", e)))?;
    PrivateKeySigner::from_slice(&bytes).map_err(|e| AppError::Crypto(format!("Invalid agent key: {}", e)))
}

pub async fn sign_l1_action<T: Serialize>(
    signer: &PrivateKeySigner,
    action: &T,
    nonce: u64,
    is_mainnet: bool,
) -> Result<ActionSignature> {
    let hash = action_hash(action, nonce, None)?;
    let digest = agent_signing_hash(hash, is_mainnet);
    let signature = signer
        .sign_hash(&digest)
        .await
        .map_err(|e| AppError::Crypto(format!("Agent signing failed: {}", e)))?;

    Ok(ActionSignature {
        r: format!("0x{}", hex::encode(signature.r().to_be_bytes::<32>())),
        s: format!("0x{}", hex::encode(signature.s().to_be_bytes::<32>())),
        v: 27 + u64::from(signature.v()),
    })
}

// =============================================================================
// Precision
// =============================================================================

fn truncate(value: Decimal, decimals: u32) -> Decimal {
    value.round_dp_with_strategy(decimals, RoundingStrategy::ToZero)
}

/// Price string with at most 5 significant figures and at most
/// `(6 perps | 8 spot) − sz_decimals` decimals. Integer prices are kept whole.
pub fn format_price(price: Decimal, sz_decimals: u32, spot: bool) -> String {
    if price <= Decimal::ZERO {
        return "0".to_string();
    }
    let max_decimals = if spot { MAX_SPOT_DECIMALS } else { MAX_PERP_DECIMALS }.saturating_sub(sz_decimals);

    let integer_digits = price.trunc().to_string().trim_start_matches('0').len() as i64;
    let sig_decimals = if integer_digits > 0 {
        (MAX_SIG_FIGS as i64 - integer_digits).max(0)
    } else {
        // 0.00123 → leading zeros after the point do not count
        let scale_adjust = price.to_string().split('.').nth(1).map_or(0, |frac| {
            frac.chars().take_while(|c| *c == '0').count() as i64
        });
        MAX_SIG_FIGS as i64 + scale_adjust
    };

    let decimals = (sig_decimals as u32).min(max_decimals);
    truncate(price, decimals).normalize().to_string()
}

/// Size rounded to `sz_decimals` (half away from zero, as the order form does)
pub fn format_size(size: Decimal, sz_decimals: u32) -> String {
    let rounded = size.round_dp_with_strategy(sz_decimals, RoundingStrategy::MidpointAwayFromZero);
    format!("{:.*}", sz_decimals as usize, rounded)
}
