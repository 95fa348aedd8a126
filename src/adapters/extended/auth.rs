//! Request authentication headers
//!
//! Every request carries `Content-Type`, `User-Agent` and `X-Api-Key`.
//! Authenticated calls add the Stark public key and a signature over
//! `compute_hash_on_elements([keccak("user"), keccak(endpoint), keccak(METHOD), keccak(body)])`,
//! rendered `"<r>,<s>"` in decimal.

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE, USER_AGENT};
use starknet_core::crypto::compute_hash_on_elements;
use starknet_core::types::Felt;
use starknet_core::utils::starknet_keccak;

use super::signing::SigningOracle;
use crate::adapters::types::ApiCredentials;
use crate::core::numeric::hex_to_decimal_string;
use crate::error::{AppError, Result};

const API_KEY_HEADER: &str = "x-api-key";
const PUBKEY_HEADER: &str = "x-starknet-pubkey";
const SIGNATURE_HEADER: &str = "x-starknet-signature";

/// Hash signed for an authenticated request. `endpoint` is the path below
/// `/user/` (e.g. `"account/info"`); a missing body hashes as `""`.
pub fn request_message_hash(endpoint: &str, method: &str, body: Option<&str>) -> Felt {
    compute_hash_on_elements(&[
        starknet_keccak(b"user"),
        starknet_keccak(endpoint.as_bytes()),
        starknet_keccak(method.to_ascii_uppercase().as_bytes()),
        starknet_keccak(body.unwrap_or("").as_bytes()),
    ])
}

/// `"<r>,<s>"` signature header value
pub fn sign_request(
    oracle: &dyn SigningOracle,
    private_key: &str,
    endpoint: &str,
    method: &str,
    body: Option<&str>,
) -> Result<String> {
    let hash = request_message_hash(endpoint, method, body);
    let signature = oracle.sign(private_key, &hash.to_hex_string())?;
    Ok(format!(
        "{},{}",
        hex_to_decimal_string(&signature.r)?,
        hex_to_decimal_string(&signature.s)?
    ))
}

fn header_value(value: &str, name: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value)
        .map_err(|_| AppError::Validation(format!("Invalid characters in {} header", name)))
}

/// Headers of unauthenticated requests; `api_key` is optional for public endpoints
pub fn basic_headers(api_key: Option<&str>, user_agent: &str) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers.insert(USER_AGENT, header_value(user_agent, "User-Agent")?);
    if let Some(key) = api_key {
        headers.insert(HeaderName::from_static(API_KEY_HEADER), header_value(key, "X-Api-Key")?);
    }
    Ok(headers)
}

/// Full header set for an authenticated `/user/*` request
#[tracing::instrument(level = "debug", skip_all, fields(endpoint = %endpoint, method = %method))]
pub fn build_auth_headers(
    oracle: &dyn SigningOracle,
    creds: &ApiCredentials,
    endpoint: &str,
    method: &str,
    body: Option<&str>,
    user_agent: &str,
) -> Result<HeaderMap> {
    let mut headers = basic_headers(Some(&creds.api_key), user_agent)?;

    let public_key = oracle.public_key(&creds.private_key)?;
    let signature = sign_request(oracle, &creds.private_key, endpoint, method, body)?;

    headers.insert(
        HeaderName::from_static(PUBKEY_HEADER),
        header_value(&public_key, "X-Starknet-PubKey")?,
    );
    headers.insert(
        HeaderName::from_static(SIGNATURE_HEADER),
        header_value(&signature, "X-Starknet-Signature")?,
    );

    Ok(headers)
}
