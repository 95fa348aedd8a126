//! Encrypted private-key envelopes
//!
//! Sub-account Stark keys may be stored as a JSON envelope sealed with a
//! NaCl box (X25519 + XSalsa20-Poly1305) to the server's public key:
//!
//! ```json
//! { "ciphertext": "…", "nonce": "…", "sender_public_key": "…" }
//! ```
//!
//! Field names vary between writers, so each field accepts several aliases.
//! Every failure maps to `AppError::Crypto`.

use crypto_box::aead::generic_array::GenericArray;
use crypto_box::aead::Aead;
use crypto_box::{PublicKey, SalsaBox, SecretKey};
use serde_json::Value;

use crate::error::{AppError, Result};

const CIPHERTEXT_FIELDS: &[&str] = &["ciphertext", "ciphertextHex", "encrypted"];
const NONCE_FIELDS: &[&str] = &["nonce", "nonceHex", "nonce_hex"];
const SENDER_FIELDS: &[&str] = &["sender_public_key", "senderPubHex", "senderPubKey", "sender_public"];

const NONCE_LEN: usize = 24;
const KEY_LEN: usize = 32;

/// Hex with optional `0x`; odd lengths get a leading zero
pub fn decode_hex(value: &str) -> Result<Vec<u8>> {
    let stripped = value.trim().trim_start_matches("0x").trim_start_matches("0X");
    let padded = if stripped.len() % 2 == 1 {
        format!("0{}", stripped)
    } else {
        stripped.to_string()
    };
    hex::decode(&padded).map_err(|e| AppError::Crypto(format!("Invalid hex in key envelope: {}", e)))
}

fn fixed<const N: usize>(bytes: Vec<u8>, what: &str) -> Result<[u8; N]> {
    let len = bytes.len();
    bytes
        .try_into()
        .map_err(|_| AppError::Crypto(format!("{} must be {} bytes, got {}", what, N, len)))
}

fn field<'a>(obj: &'a Value, aliases: &[&str]) -> Option<&'a str> {
    aliases
        .iter()
        .find_map(|name| obj.get(*name).and_then(Value::as_str))
        .filter(|s| !s.trim().is_empty())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyEnvelope {
    pub ciphertext: Vec<u8>,
    pub nonce: [u8; NONCE_LEN],
    pub sender_public_key: [u8; KEY_LEN],
}

impl KeyEnvelope {
    pub fn from_json(value: &Value) -> Result<Self> {
        let missing = |name: &str| AppError::Crypto(format!("Key envelope missing {}", name));
        let ciphertext = field(value, CIPHERTEXT_FIELDS).ok_or_else(|| missing("ciphertext"))?;
        let nonce = field(value, NONCE_FIELDS).ok_or_else(|| missing("nonce"))?;
        let sender = field(value, SENDER_FIELDS).ok_or_else(|| missing("sender public key"))?;

        Ok(Self {
            ciphertext: decode_hex(ciphertext)?,
            nonce: fixed(decode_hex(nonce)?, "nonce")?,
            sender_public_key: fixed(decode_hex(sender)?, "sender public key")?,
        })
    }

    /// Open with the server secret; the plaintext is the hex private key
    pub fn open(&self, secret: &[u8; KEY_LEN]) -> Result<String> {
        let salsa_box = SalsaBox::new(
            &PublicKey::from(self.sender_public_key),
            &SecretKey::from(*secret),
        );
        let plaintext = salsa_box
            .decrypt(GenericArray::from_slice(&self.nonce), self.ciphertext.as_slice())
            .map_err(|_| AppError::Crypto("Key envelope authentication failed".into()))?;
        let key = String::from_utf8(plaintext)
            .map_err(|_| AppError::Crypto("Decrypted key is not UTF-8".into()))?;
        Ok(key.trim().to_string())
    }
}

/// Envelope carried by a stored private-key column, if it is one.
///
/// The column holds either a plain hex key, a JSON object, or a JSON object
/// serialized into a string.
pub fn parse_stored_key(raw: &Value) -> Result<Option<KeyEnvelope>> {
    match raw {
        Value::Object(_) => KeyEnvelope::from_json(raw).map(Some),
        Value::String(s) if s.trim_start().starts_with('{') => {
            let inner: Value = serde_json::from_str(s)
                .map_err(|e| AppError::Crypto(format!("Malformed key envelope: {}", e)))?;
            KeyEnvelope::from_json(&inner).map(Some)
        }
        _ => Ok(None),
    }
}

/// Plain private key from a stored column, decrypting envelopes with `secret_hex`.
pub fn resolve_private_key(raw: &Value, secret_hex: Option<&str>) -> Result<String> {
    match parse_stored_key(raw)? {
        Some(envelope) => {
            let secret_hex = secret_hex
                .ok_or_else(|| AppError::Crypto("Encrypted key found but BOX_SECRET_KEY is not set".into()))?;
            let secret = fixed(decode_hex(secret_hex)?, "box secret key")?;
            envelope.open(&secret)
        }
        None => match raw {
            Value::String(s) if !s.trim().is_empty() => Ok(s.trim().to_string()),
            _ => Err(AppError::Config("Private key is empty".into())),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const SERVER_SECRET: [u8; 32] = [7u8; 32];
    const SENDER_SECRET: [u8; 32] = [9u8; 32];
    const NONCE: [u8; 24] = [3u8; 24];

    fn seal(plaintext: &str) -> Value {
        let server_public = SecretKey::from(SERVER_SECRET).public_key();
        let sender = SecretKey::from(SENDER_SECRET);
        let ciphertext = SalsaBox::new(&server_public, &sender)
            .encrypt(GenericArray::from_slice(&NONCE), plaintext.as_bytes())
            .unwrap();
        json!({
            "ciphertextHex": hex::encode(ciphertext),
            "nonce": format!("0x{}", hex::encode(NONCE)),
            "senderPubHex": hex::encode(sender.public_key().as_bytes()),
        })
    }

    #[test]
    fn test_decode_hex_variants() {
        assert_eq!(decode_hex("0x0a0b").unwrap(), vec![10, 11]);
        assert_eq!(decode_hex("abc").unwrap(), vec![0x0a, 0xbc]);
        assert!(decode_hex("zz").is_err());
    }

    #[test]
    fn test_open_envelope() {
        let envelope = seal("0x7a7ff6fd3cab02cc");
        let key = resolve_private_key(&envelope, Some(&hex::encode(SERVER_SECRET))).unwrap();
        assert_eq!(key, "0x7a7ff6fd3cab02cc");
    }

    #[test]
    fn test_envelope_serialized_as_string() {
        let envelope = Value::String(seal("0xabc").to_string());
        let key = resolve_private_key(&envelope, Some(&hex::encode(SERVER_SECRET))).unwrap();
        assert_eq!(key, "0xabc");
    }

    #[test]
    fn test_wrong_secret_fails_authentication() {
        let envelope = seal("0xabc");
        let err = resolve_private_key(&envelope, Some(&hex::encode([1u8; 32]))).unwrap_err();
        assert!(matches!(err, AppError::Crypto(_)));
    }

    #[test]
    fn test_envelope_without_secret() {
        let err = resolve_private_key(&seal("0xabc"), None).unwrap_err();
        assert!(matches!(err, AppError::Crypto(_)));
    }

    #[test]
    fn test_plain_key_passthrough() {
        assert_eq!(resolve_private_key(&json!(" 0x123 "), None).unwrap(), "0x123");
        assert!(matches!(resolve_private_key(&json!(""), None), Err(AppError::Config(_))));
        assert!(matches!(resolve_private_key(&Value::Null, None), Err(AppError::Config(_))));
    }

    #[test]
    fn test_missing_and_malformed_fields() {
        let err = KeyEnvelope::from_json(&json!({"nonce": "00", "sender_public": "00"})).unwrap_err();
        assert!(err.to_string().contains("ciphertext"));

        let short_nonce = json!({"encrypted": "00", "nonce_hex": "0102", "senderPubKey": hex::encode([1u8; 32])});
        assert!(matches!(KeyEnvelope::from_json(&short_nonce), Err(AppError::Crypto(_))));
    }
}
