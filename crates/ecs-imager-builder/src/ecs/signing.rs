//! RPC request signing (signature version 1.0, HMAC-SHA1)
//!
//! Parameters are sorted by name, each key and value is percent-encoded per
//! RFC 3986, and the joined query is signed together with the HTTP method.

use crate::error::ApiError;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use hmac::{Hmac, Mac};
use sha1::Sha1;
use std::collections::BTreeMap;

type HmacSha1 = Hmac<Sha1>;

pub const SIGNATURE_METHOD: &str = "HMAC-SHA1";
pub const SIGNATURE_VERSION: &str = "1.0";

/// Percent-encode a key or value; only unreserved characters pass through
pub fn percent_encode(value: &str) -> String {
    urlencoding::encode(value).into_owned()
}

/// Sorted, encoded `key=value` pairs joined with `&`
pub fn canonical_query(params: &BTreeMap<String, String>) -> String {
    params
        .iter()
        .map(|(k, v)| format!("{}={}", percent_encode(k), percent_encode(v)))
        .collect::<Vec<_>>()
        .join("&")
}

pub fn string_to_sign(method: &str, canonical_query: &str) -> String {
    format!(
        "{method}&{}&{}",
        percent_encode("/"),
        percent_encode(canonical_query)
    )
}

fn hmac_sha1_base64(key: &[u8], data: &str) -> Result<String, ApiError> {
    let mut mac = HmacSha1::new_from_slice(key).map_err(|e| ApiError::Signing(e.to_string()))?;
    mac.update(data.as_bytes());
    Ok(STANDARD.encode(mac.finalize().into_bytes()))
}

/// Signature over `string_to_sign` with the access key secret
pub fn signature(secret: &str, string_to_sign: &str) -> Result<String, ApiError> {
    hmac_sha1_base64(format!("{secret}&").as_bytes(), string_to_sign)
}

/// Sign a GET request and return the final query string
///
/// `params` must already contain the common parameters; `Signature` is added.
pub fn sign_query(params: &mut BTreeMap<String, String>, secret: &str) -> Result<String, ApiError> {
    params.remove("Signature");
    let to_sign = string_to_sign("GET", &canonical_query(params));
    let sig = signature(secret, &to_sign)?;
    params.insert("Signature".to_string(), sig);
    Ok(canonical_query(params))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn documented_params() -> BTreeMap<String, String> {
        [
            ("AccessKeyId", "testid"),
            ("Action", "DescribeRegions"),
            ("Format", "XML"),
            ("SignatureMethod", "HMAC-SHA1"),
            ("SignatureNonce", "3ee8c1b8-83d3-44af-a94f-4e0ad82fd6cf"),
            ("SignatureVersion", "1.0"),
            ("Timestamp", "2016-02-23T12:46:24Z"),
            ("Version", "2014-05-26"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
    }

    #[test]
    fn test_percent_encode_rfc3986() {
        assert_eq!(percent_encode("a b*c~d"), "a%20b%2Ac~d");
        assert_eq!(percent_encode("12:46:24"), "12%3A46%3A24");
        assert_eq!(percent_encode("[\"i-1\"]"), "%5B%22i-1%22%5D");
    }

    #[test]
    fn test_string_to_sign_matches_documented_example() {
        let canonical = canonical_query(&documented_params());
        assert_eq!(
            string_to_sign("GET", &canonical),
            "GET&%2F&AccessKeyId%3Dtestid%26Action%3DDescribeRegions%26Format%3DXML\
             %26SignatureMethod%3DHMAC-SHA1%26SignatureNonce%3D3ee8c1b8-83d3-44af-a94f-4e0ad82fd6cf\
             %26SignatureVersion%3D1.0%26Timestamp%3D2016-02-23T12%253A46%253A24Z\
             %26Version%3D2014-05-26"
        );
    }

    #[test]
    fn test_signature_matches_documented_example() {
        let mut params = documented_params();
        let query = sign_query(&mut params, "testsecret").unwrap();
        assert_eq!(params["Signature"], "OLeaidS1JvxuMvnyHOwuJ+uX5qY=");
        assert!(query.contains("Signature=OLeaidS1JvxuMvnyHOwuJ%2BuX5qY%3D"));
    }

    #[test]
    fn test_hmac_sha1_known_vector() {
        let sig =
            hmac_sha1_base64(b"key", "The quick brown fox jumps over the lazy dog").unwrap();
        assert_eq!(sig, "3nybhbi3iqa8ino29wqQcBydtNk=");
    }
}
