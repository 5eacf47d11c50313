use common::{Error, Result};
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// HMAC-SHA256 signature over a canonical request string.
///
/// The canonical string is the query parameters as `key=value` pairs sorted
/// by key and joined with `&`, followed by `|` and the millisecond
/// timestamp. Sorting makes the signature independent of parameter
/// insertion order.
pub fn hmac_sha256_hex(
    params: &[(String, String)],
    timestamp_ms: i64,
    secret: &str,
) -> Result<String> {
    let mut sorted: Vec<&(String, String)> = params.iter().collect();
    sorted.sort_by(|a, b| a.0.cmp(&b.0));

    let query = sorted
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&");
    let payload = format!("{}|{}", query, timestamp_ms);

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| Error::Internal(format!("invalid HMAC key: {}", e)))?;
    mac.update(payload.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn deterministic_for_identical_inputs() {
        let p = params(&[("symbol", "PERP_BTC_USDT"), ("size", "100"), ("page", "1")]);
        let a = hmac_sha256_hex(&p, 1_700_000_000_000, "secret").unwrap();
        let b = hmac_sha256_hex(&p, 1_700_000_000_000, "secret").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 64); // hex-encoded SHA-256 output
    }

    #[test]
    fn independent_of_parameter_order() {
        let forward = params(&[("a", "1"), ("b", "2"), ("c", "3")]);
        let shuffled = params(&[("c", "3"), ("a", "1"), ("b", "2")]);
        let reversed = params(&[("b", "2"), ("c", "3"), ("a", "1")]);

        let sig = hmac_sha256_hex(&forward, 42, "secret").unwrap();
        assert_eq!(sig, hmac_sha256_hex(&shuffled, 42, "secret").unwrap());
        assert_eq!(sig, hmac_sha256_hex(&reversed, 42, "secret").unwrap());
    }

    #[test]
    fn sensitive_to_every_input() {
        let p = params(&[("symbol", "PERP_BTC_USDT")]);
        let base = hmac_sha256_hex(&p, 42, "secret").unwrap();

        assert_ne!(base, hmac_sha256_hex(&p, 43, "secret").unwrap());
        assert_ne!(base, hmac_sha256_hex(&p, 42, "other").unwrap());
        let other = params(&[("symbol", "PERP_ETH_USDT")]);
        assert_ne!(base, hmac_sha256_hex(&other, 42, "secret").unwrap());
    }
}
