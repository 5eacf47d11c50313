//! Starknet typed-data auth message hashing and signing.
//!
//! Builds the domain-separated message Paradex expects for its `/v1/auth`
//! handshake: a Pedersen hash chain over the typed fields of the request
//! (method, path, body, timestamp, expiration) under the `Paradex` domain,
//! signed on the Stark curve with an RFC 6979 deterministic nonce.

use common::{Error, Result};
use sha3::{Digest, Keccak256};
use starknet_crypto::{pedersen_hash, rfc6979_generate_k, sign};
use starknet_types_core::felt::Felt;

const DOMAIN_TYPE: &str = "StarkNetDomain(name:felt,chainId:felt,version:felt)";
const REQUEST_TYPE: &str = "Request(method:felt,path:felt,body:felt,timestamp:felt,expiration:felt)";
const DOMAIN_NAME: &str = "Paradex";
const DOMAIN_VERSION: &str = "1";
const MESSAGE_PREFIX: &str = "StarkNet Message";

/// The typed fields of a one-time auth request.
pub struct AuthRequest {
    pub method: String,
    pub path: String,
    pub body: String,
    pub timestamp: u64,
    pub expiration: u64,
}

impl AuthRequest {
    /// The request that trades a signature for a bearer token.
    pub fn token_request(timestamp: u64, expiration: u64) -> Self {
        Self {
            method: "POST".to_string(),
            path: "/v1/auth".to_string(),
            body: String::new(),
            timestamp,
            expiration,
        }
    }
}

/// Cairo short-string encoding: up to 31 ASCII bytes, big-endian.
pub fn encode_short_string(s: &str) -> Result<Felt> {
    if !s.is_ascii() {
        return Err(Error::Parameter(format!(
            "short string must be ASCII: {:?}",
            s
        )));
    }
    if s.len() > 31 {
        return Err(Error::Parameter(format!(
            "short string exceeds 31 bytes: {:?}",
            s
        )));
    }
    Ok(Felt::from_bytes_be_slice(s.as_bytes()))
}

/// Keccak-256 truncated to 250 bits, as used for type hashes.
pub fn starknet_keccak(data: &[u8]) -> Felt {
    let mut hasher = Keccak256::new();
    hasher.update(data);
    let mut hash: [u8; 32] = hasher.finalize().into();
    hash[0] &= 0x03;
    Felt::from_bytes_be(&hash)
}

/// Pedersen hash chain over `elements` with the element count appended,
/// folding from zero.
pub fn compute_hash_on_elements(elements: &[Felt]) -> Felt {
    let mut acc = Felt::ZERO;
    for element in elements {
        acc = pedersen_hash(&acc, element);
    }
    pedersen_hash(&acc, &Felt::from(elements.len() as u64))
}

fn domain_struct_hash(chain_id: Felt) -> Result<Felt> {
    Ok(compute_hash_on_elements(&[
        starknet_keccak(DOMAIN_TYPE.as_bytes()),
        encode_short_string(DOMAIN_NAME)?,
        chain_id,
        encode_short_string(DOMAIN_VERSION)?,
    ]))
}

fn request_struct_hash(request: &AuthRequest) -> Result<Felt> {
    Ok(compute_hash_on_elements(&[
        starknet_keccak(REQUEST_TYPE.as_bytes()),
        encode_short_string(&request.method)?,
        encode_short_string(&request.path)?,
        encode_short_string(&request.body)?,
        Felt::from(request.timestamp),
        Felt::from(request.expiration),
    ]))
}

/// Full domain-separated message hash for an account address.
pub fn auth_message_hash(chain_id: Felt, account: Felt, request: &AuthRequest) -> Result<Felt> {
    Ok(compute_hash_on_elements(&[
        encode_short_string(MESSAGE_PREFIX)?,
        domain_struct_hash(chain_id)?,
        account,
        request_struct_hash(request)?,
    ]))
}

/// Stark-curve ECDSA over a message hash with a deterministic nonce.
///
/// Deterministic by construction: the same (message, key) pair always
/// yields the same (r, s).
pub fn sign_message(message_hash: &Felt, private_key: &Felt) -> Result<(Felt, Felt)> {
    let k = rfc6979_generate_k(message_hash, private_key, None);
    let signature = sign(private_key, message_hash, &k)
        .map_err(|e| Error::Internal(format!("stark curve signing failed: {:?}", e)))?;
    Ok((signature.r, signature.s))
}

pub fn felt_from_hex(value: &str) -> Result<Felt> {
    Felt::from_hex(value.trim())
        .map_err(|e| Error::Parameter(format!("invalid hex field element: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use starknet_crypto::{get_public_key, verify};

    #[test]
    fn short_string_encoding() {
        // "1" is 0x31
        assert_eq!(encode_short_string("1").unwrap(), Felt::from(0x31u64));
        // "ab" is 0x6162 big-endian
        assert_eq!(encode_short_string("ab").unwrap(), Felt::from(0x6162u64));
        // Empty body encodes to zero
        assert_eq!(encode_short_string("").unwrap(), Felt::ZERO);
        assert!(encode_short_string("a string that is far longer than 31 bytes").is_err());
    }

    #[test]
    fn keccak_is_masked_to_250_bits() {
        let h = starknet_keccak(REQUEST_TYPE.as_bytes());
        // 2^250 as an upper bound
        let bound = Felt::from_hex(
            "0x400000000000000000000000000000000000000000000000000000000000000",
        )
        .unwrap();
        assert!(h < bound);
        assert_ne!(h, Felt::ZERO);
    }

    #[test]
    fn hash_chain_appends_length() {
        // Chains differing only in their element count must not collide.
        let one = compute_hash_on_elements(&[Felt::ZERO]);
        let two = compute_hash_on_elements(&[Felt::ZERO, Felt::ZERO]);
        assert_ne!(one, two);
    }

    #[test]
    fn message_hash_covers_every_field() {
        let chain_id = encode_short_string("PRIVATE_SN_PARACLEAR").unwrap();
        let account = Felt::from_hex("0x1234abcd").unwrap();
        let base = auth_message_hash(chain_id, account, &AuthRequest::token_request(100, 200))
            .unwrap();

        let later = auth_message_hash(chain_id, account, &AuthRequest::token_request(101, 200))
            .unwrap();
        assert_ne!(base, later);

        let other_account =
            auth_message_hash(chain_id, Felt::from_hex("0x5678").unwrap(),
                &AuthRequest::token_request(100, 200))
            .unwrap();
        assert_ne!(base, other_account);
    }

    #[test]
    fn signature_is_deterministic_and_verifies() {
        let private_key = Felt::from_hex(
            "0x0139fe4d6f02e666e86a6f58e65060f115cd3c185bd9e98bd829636931458f79",
        )
        .unwrap();
        let chain_id = encode_short_string("PRIVATE_SN_PARACLEAR").unwrap();
        let account = Felt::from_hex("0x1234abcd").unwrap();
        let message =
            auth_message_hash(chain_id, account, &AuthRequest::token_request(100, 604_800))
                .unwrap();

        let (r1, s1) = sign_message(&message, &private_key).unwrap();
        let (r2, s2) = sign_message(&message, &private_key).unwrap();
        assert_eq!((r1, s1), (r2, s2));

        let public_key = get_public_key(&private_key);
        assert!(verify(&public_key, &message, &r1, &s1).unwrap());
    }
}
