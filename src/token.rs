//! Client tokens: short lived, signed upload permissions
//!
//! A client token looks like
//!
//! ```text
//! vercel_blob_client_<store id>_<base64("<hex signature>.<base64 payload>")>
//! ```
//!
//! where the payload is the JSON encoded [`ClientTokenPayload`] and the signature
//! is the HMAC-SHA256 of the base64 payload, keyed by the store's read-write token.
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde::{Deserialize, Serialize};

use crate::{
    auth::CLIENT_TOKEN_PREFIX,
    error::{BlobError, Result},
    signer,
};

/// Where the storage service reports a finished upload
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadCompletedCallback {
    pub callback_url: String,
    /// Opaque value handed back to the server when the upload completes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_payload: Option<String>,
}

/// What a client token allows
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientTokenOptions {
    /// The pathname the client may upload to
    pub pathname: String,
    /// Content types the upload may have, e.g. `image/png` or `image/*`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_content_types: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maximum_size_in_bytes: Option<u64>,
    /// Expiry as milliseconds since the epoch.  Defaults to 30 seconds from issuance.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valid_until: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub add_random_suffix: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_control_max_age: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_upload_completed: Option<UploadCompletedCallback>,
}

/// The signed content of a client token
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientTokenPayload {
    pub pathname: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_content_types: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maximum_size_in_bytes: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub add_random_suffix: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_control_max_age: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_upload_completed: Option<UploadCompletedCallback>,
    pub valid_until: i64,
}

impl ClientTokenPayload {
    /// Resolves the options, using `default_valid_until` when they carry no expiry
    pub fn from_options(options: ClientTokenOptions, default_valid_until: i64) -> Self {
        Self {
            pathname: options.pathname,
            allowed_content_types: options.allowed_content_types,
            maximum_size_in_bytes: options.maximum_size_in_bytes,
            add_random_suffix: options.add_random_suffix,
            cache_control_max_age: options.cache_control_max_age,
            on_upload_completed: options.on_upload_completed,
            valid_until: options.valid_until.unwrap_or(default_valid_until),
        }
    }

    /// Nothing in this crate rejects expired tokens; the storage service does.
    pub fn is_expired(&self, now_millis: i64) -> bool {
        now_millis > self.valid_until
    }
}

/// A client token taken apart
///
/// Decoding does not check the signature, see [`verify_client_token`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DecodedClientToken {
    pub store_id: String,
    pub signature: String,
    /// The base64 payload exactly as it was signed
    pub encoded_payload: String,
    pub payload: ClientTokenPayload,
}

/// Signs `payload` with `secret` and wraps it into a client token for `store_id`
pub fn encode_client_token(
    payload: &ClientTokenPayload,
    secret: &str,
    store_id: &str,
) -> Result<String> {
    if store_id.is_empty() || store_id.contains('_') {
        return Err(BlobError::InvalidInput(format!(
            "invalid store id `{}`",
            store_id
        )));
    }
    let encoded_payload = BASE64.encode(serde_json::to_string(payload)?);
    let signature = signer::sign(&encoded_payload, secret)?;
    if signature.is_empty() {
        return Err(BlobError::SigningFailed());
    }
    let blob = BASE64.encode(format!("{}.{}", signature, encoded_payload));
    Ok(format!("{}{}_{}", CLIENT_TOKEN_PREFIX, store_id, blob))
}

fn decode_base64_text(input: &str, what: &str) -> Result<String> {
    let bytes = BASE64
        .decode(input)
        .map_err(|err| BlobError::InvalidClientToken(format!("{} is not base64: {}", what, err)))?;
    String::from_utf8(bytes)
        .map_err(|_| BlobError::InvalidClientToken(format!("{} is not utf-8", what)))
}

/// Reads a client token without checking its signature
pub fn decode_client_token(token: &str) -> Result<DecodedClientToken> {
    let segments = token.split('_').collect::<Vec<_>>();
    if segments.len() != 5 {
        return Err(BlobError::InvalidClientToken(format!(
            "expected 5 `_` separated segments, found {}",
            segments.len()
        )));
    }
    let store_id = segments[3];
    if store_id.is_empty() {
        return Err(BlobError::InvalidClientToken("missing store id".to_string()));
    }

    let blob = decode_base64_text(segments[4], "token body")?;
    let (signature, encoded_payload) = blob.split_once('.').ok_or_else(|| {
        BlobError::InvalidClientToken("token body has no signature separator".to_string())
    })?;
    let payload_json = decode_base64_text(encoded_payload, "payload")?;
    let payload = serde_json::from_str::<ClientTokenPayload>(&payload_json)
        .map_err(|err| BlobError::InvalidClientToken(format!("payload is not valid: {}", err)))?;

    Ok(DecodedClientToken {
        store_id: store_id.to_string(),
        signature: signature.to_string(),
        encoded_payload: encoded_payload.to_string(),
        payload,
    })
}

/// Decodes a client token and checks it was signed with `secret`
pub fn verify_client_token(token: &str, secret: &str) -> Result<DecodedClientToken> {
    let decoded = decode_client_token(token)?;
    let verified = signer::verify(&decoded.encoded_payload, secret, &decoded.signature)
        .map_err(|err| BlobError::InvalidClientToken(err.to_string()))?;
    if !verified {
        return Err(BlobError::InvalidClientToken(
            "signature does not match".to_string(),
        ));
    }
    Ok(decoded)
}

#[cfg(test)]
mod tests {
    use all_asserts::assert_true;

    use super::*;

    const SECRET: &str = "vercel_blob_rw_store123_Zm9vYmFy";

    fn full_payload() -> ClientTokenPayload {
        ClientTokenPayload {
            pathname: "avatars/me.png".to_string(),
            allowed_content_types: Some(vec!["image/png".to_string(), "image/*".to_string()]),
            maximum_size_in_bytes: Some(1024 * 1024),
            add_random_suffix: Some(false),
            cache_control_max_age: Some(60),
            on_upload_completed: Some(UploadCompletedCallback {
                callback_url: "https://example.com/api/upload".to_string(),
                token_payload: Some("{\"userId\":42}".to_string()),
            }),
            valid_until: 1_700_000_000_000,
        }
    }

    // xorshift64, so the tampering below is reproducible
    struct Rng(u64);

    impl Rng {
        fn next(&mut self) -> u64 {
            let mut x = self.0;
            x ^= x << 13;
            x ^= x >> 7;
            x ^= x << 17;
            self.0 = x;
            x
        }
    }

    #[test]
    fn minimal_payload_encoding() {
        let payload = ClientTokenPayload::from_options(
            ClientTokenOptions {
                pathname: "a.txt".to_string(),
                valid_until: Some(1_700_000_000_000),
                ..Default::default()
            },
            0,
        );
        let token = encode_client_token(&payload, "abc_rw_x_store123", "store123").unwrap();
        assert_true!(token.starts_with("vercel_blob_client_store123_"));

        let decoded = decode_client_token(&token).unwrap();
        assert_eq!(decoded.store_id, "store123");
        let json = String::from_utf8(BASE64.decode(&decoded.encoded_payload).unwrap()).unwrap();
        assert_eq!(json, r#"{"pathname":"a.txt","validUntil":1700000000000}"#);
    }

    #[test]
    fn round_trip_keeps_every_field() {
        let payload = full_payload();
        let token = encode_client_token(&payload, SECRET, "store123").unwrap();
        let decoded = verify_client_token(&token, SECRET).unwrap();
        assert_eq!(decoded.payload, payload);
        assert_eq!(
            decoded.signature,
            signer::sign(&decoded.encoded_payload, SECRET).unwrap()
        );
    }

    #[test]
    fn wrong_secret_fails_verification() {
        let token = encode_client_token(&full_payload(), SECRET, "store123").unwrap();
        assert!(decode_client_token(&token).is_ok());
        assert!(matches!(
            verify_client_token(&token, "vercel_blob_rw_store123_other"),
            Err(BlobError::InvalidClientToken(_))
        ));
    }

    #[test]
    fn tampered_payload_never_verifies() {
        const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";
        let token = encode_client_token(&full_payload(), SECRET, "store123").unwrap();
        let decoded = decode_client_token(&token).unwrap();
        let original = decoded.encoded_payload.into_bytes();

        let mut rng = Rng(0x9E37_79B9_7F4A_7C15);
        for _ in 0..10_000 {
            let mut mutated = original.clone();
            let idx = (rng.next() % mutated.len() as u64) as usize;
            let mut replacement = ALPHABET[(rng.next() % ALPHABET.len() as u64) as usize];
            if replacement == mutated[idx] {
                replacement = if replacement == b'A' { b'B' } else { b'A' };
            }
            mutated[idx] = replacement;
            let mutated = String::from_utf8(mutated).unwrap();

            let blob = BASE64.encode(format!("{}.{}", decoded.signature, mutated));
            let forged = format!("vercel_blob_client_store123_{}", blob);
            assert!(verify_client_token(&forged, SECRET).is_err());
        }
    }

    #[test]
    fn malformed_tokens_are_rejected() {
        let valid = encode_client_token(&full_payload(), SECRET, "store123").unwrap();
        let blob = valid.rsplit('_').next().unwrap();
        let no_dot = BASE64.encode("abcdef");
        let bad_json = BASE64.encode(format!("ab.{}", BASE64.encode("{not json")));
        let cases = vec![
            "".to_string(),
            "vercel_blob_client_store123".to_string(),
            format!("vercel_blob_client__{}", blob),
            "vercel_blob_client_store123_!!!".to_string(),
            format!("vercel_blob_client_store123_{}", no_dot),
            format!("vercel_blob_client_store123_{}", bad_json),
            format!("vercel_blob_client_store123_{}_extra", blob),
        ];
        for token in cases {
            assert!(
                matches!(
                    decode_client_token(&token),
                    Err(BlobError::InvalidClientToken(_))
                ),
                "{}",
                token
            );
        }
    }

    #[test]
    fn expiry_is_inclusive() {
        let payload = full_payload();
        assert!(!payload.is_expired(payload.valid_until));
        assert!(payload.is_expired(payload.valid_until + 1));
    }
}
