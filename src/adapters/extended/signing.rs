//! Extended Signing
//!
//! Stark key derivation, order/transfer hashes and ECDSA signatures.
//! Hashes follow SNIP-12 revision 1 (Poseidon): a domain hash over
//! `StarknetDomain`, a struct hash over the typed message, and a final
//! hash over `("StarkNet Message", domain, public_key, struct)`.
//!
//! Everything here is pure. Type selectors are computed once per process.

use std::sync::{Arc, OnceLock};

use starknet_core::types::Felt;
use starknet_core::utils::{cairo_short_string_to_felt, starknet_keccak};
use starknet_crypto::poseidon_hash_many;
use starknet_signers::SigningKey;

use crate::adapters::types::{StarkSignature, StarknetDomain};
use crate::error::{AppError, Result};

const DOMAIN_TYPE: &str = "\"StarknetDomain\"(\"name\":\"shortstring\",\"version\":\"shortstring\",\"chainId\":\"shortstring\",\"revision\":\"shortstring\")";

const ORDER_TYPE: &str = "\"Order\"(\"position_id\":\"felt\",\"base_asset_id\":\"AssetId\",\"base_amount\":\"i64\",\"quote_asset_id\":\"AssetId\",\"quote_amount\":\"i64\",\"fee_asset_id\":\"AssetId\",\"fee_amount\":\"u64\",\"expiration\":\"Timestamp\",\"salt\":\"felt\")\"PositionId\"(\"value\":\"u32\")\"AssetId\"(\"value\":\"felt\")\"Timestamp\"(\"seconds\":\"u64\")";

const TRANSFER_TYPE: &str = "\"TransferArgs\"(\"recipient\":\"PositionId\",\"position_id\":\"PositionId\",\"collateral_id\":\"AssetId\",\"amount\":\"u64\",\"expiration\":\"Timestamp\",\"salt\":\"felt\")\"PositionId\"(\"value\":\"u32\")\"AssetId\"(\"value\":\"felt\")\"Timestamp\"(\"seconds\":\"u64\")";

struct Selectors {
    message_prefix: Felt,
    domain: Felt,
    order: Felt,
    transfer: Felt,
}

static SELECTORS: OnceLock<Selectors> = OnceLock::new();

fn selectors() -> &'static Selectors {
    SELECTORS.get_or_init(|| Selectors {
        // "StarkNet Message" fits in a short string (16 chars)
        message_prefix: cairo_short_string_to_felt("StarkNet Message").unwrap_or(Felt::ZERO),
        domain: starknet_keccak(DOMAIN_TYPE.as_bytes()),
        order: starknet_keccak(ORDER_TYPE.as_bytes()),
        transfer: starknet_keccak(TRANSFER_TYPE.as_bytes()),
    })
}

// =============================================================================
// Parameters
// =============================================================================

/// Inputs of an order hash. Amounts are already signed: a buy carries a
/// positive base (synthetic) amount and a negative quote (collateral) amount.
#[derive(Debug, Clone)]
pub struct OrderHashParams {
    pub position_id: u64,
    pub base_asset_id: String,
    pub base_amount: i128,
    pub quote_asset_id: String,
    pub quote_amount: i128,
    pub fee_asset_id: String,
    pub fee_amount: u128,
    /// Starknet expiration, seconds
    pub expiration: u64,
    pub salt: u64,
    pub user_public_key: String,
    pub domain: StarknetDomain,
}

/// Inputs of an inter-account collateral transfer hash.
#[derive(Debug, Clone)]
pub struct TransferHashParams {
    pub recipient_position_id: u64,
    pub sender_position_id: u64,
    pub collateral_id: String,
    pub amount: u128,
    pub expiration: u64,
    pub salt: u64,
    pub user_public_key: String,
    pub domain: StarknetDomain,
}

// =============================================================================
// Oracle
// =============================================================================

/// Narrow signing interface used by the order and transfer builders.
///
/// All hex outputs are `0x`-prefixed and unpadded; callers pad as the
/// exchange requires.
pub trait SigningOracle: Send + Sync {
    fn derive_order_hash(&self, params: &OrderHashParams) -> Result<String>;

    fn derive_transfer_hash(&self, params: &TransferHashParams) -> Result<String>;

    fn sign(&self, private_key_hex: &str, message_hex: &str) -> Result<StarkSignature>;

    /// Stark public key of a private key
    fn public_key(&self, private_key_hex: &str) -> Result<String>;
}

/// Stark-curve implementation of [`SigningOracle`]
#[derive(Debug, Clone, Copy, Default)]
pub struct StarkSigningOracle;

impl StarkSigningOracle {
    pub fn shared() -> Arc<dyn SigningOracle> {
        Arc::new(StarkSigningOracle)
    }
}

impl SigningOracle for StarkSigningOracle {
    fn derive_order_hash(&self, params: &OrderHashParams) -> Result<String> {
        let sel = selectors();
        let struct_hash = poseidon_hash_many(&[
            sel.order,
            Felt::from(params.position_id),
            parse_felt(&params.base_asset_id, "base_asset_id")?,
            signed_felt(params.base_amount),
            parse_felt(&params.quote_asset_id, "quote_asset_id")?,
            signed_felt(params.quote_amount),
            parse_felt(&params.fee_asset_id, "fee_asset_id")?,
            Felt::from(params.fee_amount),
            Felt::from(params.expiration),
            Felt::from(params.salt),
        ]);

        let hash = message_hash(&params.domain, &params.user_public_key, struct_hash)?;
        Ok(hash.to_hex_string())
    }

    fn derive_transfer_hash(&self, params: &TransferHashParams) -> Result<String> {
        let sel = selectors();
        let struct_hash = poseidon_hash_many(&[
            sel.transfer,
            Felt::from(params.recipient_position_id),
            Felt::from(params.sender_position_id),
            parse_felt(&params.collateral_id, "collateral_id")?,
            Felt::from(params.amount),
            Felt::from(params.expiration),
            Felt::from(params.salt),
        ]);

        let hash = message_hash(&params.domain, &params.user_public_key, struct_hash)?;
        Ok(hash.to_hex_string())
    }

    fn sign(&self, private_key_hex: &str, message_hex: &str) -> Result<StarkSignature> {
        let private_key = parse_felt(private_key_hex, "private_key")?;
        let message = parse_felt(message_hex, "message")?;

        let signature = SigningKey::from_secret_scalar(private_key)
            .sign(&message)
            .map_err(|e| AppError::Crypto(format!("Signing failed: {}", e)))?;

        Ok(StarkSignature {
            r: signature.r.to_hex_string(),
            s: signature.s.to_hex_string(),
        })
    }

    fn public_key(&self, private_key_hex: &str) -> Result<String> {
        let private_key = parse_felt(private_key_hex, "private_key")?;
        let key = SigningKey::from_secret_scalar(private_key);
        Ok(key.verifying_key().scalar().to_hex_string())
    }
}

// =============================================================================
// Helpers
// =============================================================================

fn parse_felt(hex: &str, what: &str) -> Result<Felt> {
    let trimmed = hex.trim();
    if trimmed.is_empty() {
        return Err(AppError::Crypto(format!("Empty {}", what)));
    }
    let prefixed = if trimmed.starts_with("0x") || trimmed.starts_with("0X") {
        trimmed.to_string()
    } else {
        format!("0x{}", trimmed)
    };
    Felt::from_hex(&prefixed).map_err(|e| AppError::Crypto(format!("Invalid {}: {}", what, e)))
}

fn signed_felt(amount: i128) -> Felt {
    let magnitude = Felt::from(amount.unsigned_abs());
    if amount < 0 {
        -magnitude
    } else {
        magnitude
    }
}

/// Domain fields are short strings; numeric values ("1") encode as numbers.
fn encode_shortstring(value: &str, what: &str) -> Result<Felt> {
    if !value.is_empty() && value.bytes().all(|b| b.is_ascii_digit()) {
        return Felt::from_dec_str(value)
            .map_err(|e| AppError::Crypto(format!("Invalid domain {}: {}", what, e)));
    }
    if value.starts_with("0x") {
        return parse_felt(value, what);
    }
    cairo_short_string_to_felt(value)
        .map_err(|e| AppError::Crypto(format!("Invalid domain {}: {}", what, e)))
}

fn domain_hash(domain: &StarknetDomain) -> Result<Felt> {
    Ok(poseidon_hash_many(&[
        selectors().domain,
        encode_shortstring(&domain.name, "name")?,
        encode_shortstring(&domain.version, "version")?,
        encode_shortstring(&domain.chain_id, "chainId")?,
        encode_shortstring(&domain.revision, "revision")?,
    ]))
}

fn message_hash(domain: &StarknetDomain, public_key: &str, struct_hash: Felt) -> Result<Felt> {
    Ok(poseidon_hash_many(&[
        selectors().message_prefix,
        domain_hash(domain)?,
        parse_felt(public_key, "public_key")?,
        struct_hash,
    ]))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) const TEST_PRIVATE_KEY: &str =
        "0x7a7ff6fd3cab02ccdcd4a572563f5976f8976899b03a39773795a3c486d4986";

    pub(crate) fn test_domain() -> StarknetDomain {
        StarknetDomain {
            name: "Perpetuals".into(),
            version: "v0".into(),
            chain_id: "SN_MAIN".into(),
            revision: "1".into(),
        }
    }

    fn order_params(public_key: &str) -> OrderHashParams {
        OrderHashParams {
            position_id: 10002,
            base_asset_id: "0x4254432d3600000000000000000000".into(),
            base_amount: 100,
            quote_asset_id: "0x1".into(),
            quote_amount: -1_007_500,
            fee_asset_id: "0x1".into(),
            fee_amount: 504,
            expiration: 1_700_000_000,
            salt: 12345,
            user_public_key: public_key.into(),
            domain: test_domain(),
        }
    }

    #[test]
    fn test_public_key_of_one_is_generator_x() {
        let oracle = StarkSigningOracle;
        assert_eq!(
            oracle.public_key("0x1").unwrap(),
            "0x1ef15c18599971b7beced415a40f0c7deacfd9b0d1819e03d723d8bc943cfca"
        );
    }

    #[test]
    fn test_order_hash_is_deterministic() {
        let oracle = StarkSigningOracle;
        let public_key = oracle.public_key(TEST_PRIVATE_KEY).unwrap();
        let a = oracle.derive_order_hash(&order_params(&public_key)).unwrap();
        let b = oracle.derive_order_hash(&order_params(&public_key)).unwrap();
        assert_eq!(a, b);
        assert!(a.starts_with("0x"));
    }

    #[test]
    fn test_order_hash_depends_on_amount_sign() {
        let oracle = StarkSigningOracle;
        let public_key = oracle.public_key(TEST_PRIVATE_KEY).unwrap();
        let buy = order_params(&public_key);
        let mut sell = buy.clone();
        sell.base_amount = -100;
        sell.quote_amount = 1_007_500;
        assert_ne!(
            oracle.derive_order_hash(&buy).unwrap(),
            oracle.derive_order_hash(&sell).unwrap()
        );
    }

    #[test]
    fn test_order_hash_depends_on_domain() {
        let oracle = StarkSigningOracle;
        let public_key = oracle.public_key(TEST_PRIVATE_KEY).unwrap();
        let main = order_params(&public_key);
        let mut sepolia = main.clone();
        sepolia.domain.chain_id = "SN_SEPOLIA".into();
        assert_ne!(
            oracle.derive_order_hash(&main).unwrap(),
            oracle.derive_order_hash(&sepolia).unwrap()
        );
    }

    #[test]
    fn test_signature_verifies() {
        let oracle = StarkSigningOracle;
        let public_key = oracle.public_key(TEST_PRIVATE_KEY).unwrap();
        let hash = oracle.derive_order_hash(&order_params(&public_key)).unwrap();
        let sig = oracle.sign(TEST_PRIVATE_KEY, &hash).unwrap();

        let valid = starknet_crypto::verify(
            &Felt::from_hex(&public_key).unwrap(),
            &Felt::from_hex(&hash).unwrap(),
            &Felt::from_hex(&sig.r).unwrap(),
            &Felt::from_hex(&sig.s).unwrap(),
        )
        .unwrap();
        assert!(valid);
    }

    #[test]
    fn test_transfer_hash_differs_by_direction() {
        let oracle = StarkSigningOracle;
        let public_key = oracle.public_key(TEST_PRIVATE_KEY).unwrap();
        let forward = TransferHashParams {
            recipient_position_id: 2,
            sender_position_id: 1,
            collateral_id: "0x1".into(),
            amount: 25_000_000,
            expiration: 1_700_000_000,
            salt: 7,
            user_public_key: public_key.clone(),
            domain: test_domain(),
        };
        let mut backward = forward.clone();
        backward.recipient_position_id = 1;
        backward.sender_position_id = 2;
        assert_ne!(
            oracle.derive_transfer_hash(&forward).unwrap(),
            oracle.derive_transfer_hash(&backward).unwrap()
        );
    }

    #[test]
    fn test_invalid_inputs_are_crypto_errors() {
        let oracle = StarkSigningOracle;
        assert!(matches!(oracle.public_key(""), Err(AppError::Crypto(_))));
        assert!(matches!(oracle.sign("0xzz", "0x1"), Err(AppError::Crypto(_))));
        let mut params = order_params("0x1");
        params.base_asset_id = "not-hex".into();
        assert!(matches!(oracle.derive_order_hash(&params), Err(AppError::Crypto(_))));
    }

    #[test]
    fn test_signed_felt_negation() {
        assert_eq!(signed_felt(-5) + Felt::from(5u64), Felt::ZERO);
        assert_eq!(signed_felt(5), Felt::from(5u64));
    }
}
