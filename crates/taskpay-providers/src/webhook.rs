use crate::{Error, Result};
use hmac::{Hmac, Mac};
use serde_json::Value;
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Hex-encoded HMAC-SHA256 of `parts` concatenated.
pub fn sign(secret: &str, parts: &[&[u8]]) -> Result<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| Error::ConfigError(format!("Invalid webhook secret: {}", e)))?;
    for part in parts {
        mac.update(part);
    }
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Constant-time check of a hex signature over `parts`.
pub fn verify_hex(secret: &str, parts: &[&[u8]], signature: &str) -> Result<()> {
    let expected = hex::decode(signature.trim()).map_err(|_| Error::InvalidSignature)?;

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| Error::ConfigError(format!("Invalid webhook secret: {}", e)))?;
    for part in parts {
        mac.update(part);
    }

    mac.verify_slice(&expected).map_err(|_| Error::InvalidSignature)
}

/// True when a signed timestamp is no more than `tolerance_secs` away from `now`.
pub fn within_tolerance(timestamp: i64, now: i64, tolerance_secs: i64) -> bool {
    match now.checked_sub(timestamp) {
        Some(skew) => skew.unsigned_abs() <= tolerance_secs.unsigned_abs(),
        None => false,
    }
}

/// Parse a webhook body, reporting bad JSON as a malformed payload.
pub fn parse_body(body: &[u8]) -> Result<Value> {
    serde_json::from_slice(body).map_err(|e| Error::MalformedPayload(e.to_string()))
}

/// First non-empty string found at any of the JSON pointers.
pub fn first_str(value: &Value, pointers: &[&str]) -> Option<String> {
    pointers
        .iter()
        .filter_map(|p| value.pointer(p).and_then(Value::as_str))
        .find(|s| !s.is_empty())
        .map(str::to_string)
}

pub fn required_str(value: &Value, pointer: &str) -> Result<String> {
    first_str(value, &[pointer])
        .ok_or_else(|| Error::MalformedPayload(format!("missing field {}", pointer)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_webhook_signature() {
        let payload = b"test payload";
        let secret = "my_secret";

        let signature = sign(secret, &[payload]).unwrap();

        assert!(verify_hex(secret, &[payload], &signature).is_ok());
        assert!(verify_hex(secret, &[b"other payload"], &signature).is_err());
        assert!(verify_hex("other_secret", &[payload], &signature).is_err());
        assert!(matches!(
            verify_hex(secret, &[payload], "wrong_sig"),
            Err(Error::InvalidSignature)
        ));
    }

    #[test]
    fn test_signature_over_concatenated_parts() {
        let whole = sign("s", &[b"1700000000{\"a\":1}"]).unwrap();
        let parts = sign("s", &[b"1700000000", b"{\"a\":1}"]).unwrap();
        assert_eq!(whole, parts);
    }

    #[test]
    fn test_first_str() {
        let value = json!({"a": {"b": ""}, "c": "x"});
        assert_eq!(first_str(&value, &["/a/b", "/c"]), Some("x".to_string()));
        assert_eq!(first_str(&value, &["/missing"]), None);
        assert!(required_str(&value, "/a/b").is_err());
    }

    #[test]
    fn test_tolerance_window() {
        assert!(within_tolerance(1_700_000_000, 1_700_000_300, 300));
        assert!(within_tolerance(1_700_000_300, 1_700_000_000, 300));
        assert!(!within_tolerance(1_700_000_000, 1_700_000_301, 300));
        assert!(!within_tolerance(i64::MIN, 1_700_000_000, 300));
        assert!(!within_tolerance(i64::MAX, -1, 300));
    }

    #[test]
    fn test_parse_body_rejects_garbage() {
        assert!(matches!(parse_body(b"not json"), Err(Error::MalformedPayload(_))));
    }
}
