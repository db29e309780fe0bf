//! HMAC-SHA256 signing shared by client tokens and upload callbacks
//!
//! Two implementations of the primitive are available: `ring` (when the `ring`
//! feature is enabled) and the RustCrypto `hmac` + `sha2` digest.  They produce
//! identical hex signatures.  The implementation is picked once, the first time
//! anything is signed, by probing `ring` against a known test vector.
use hmac::{Hmac, Mac};
use once_cell::sync::Lazy;
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::error::{BlobError, Result};

type HmacSha256 = Hmac<Sha256>;

// RFC 4231, test case 2
const PROBE_KEY: &str = "Jefe";
const PROBE_DATA: &str = "what do ya want for nothing?";
const PROBE_SIGNATURE: &str = "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843";

static BACKEND: Lazy<SignerBackend> = Lazy::new(SignerBackend::detect);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum SignerBackend {
    #[cfg(feature = "ring")]
    Ring,
    Digest,
}

impl SignerBackend {
    fn detect() -> Self {
        #[cfg(feature = "ring")]
        {
            match SignerBackend::Ring.sign(PROBE_DATA, PROBE_KEY) {
                Ok(signature) if signature == PROBE_SIGNATURE => {
                    tracing::debug!("signing with ring");
                    return SignerBackend::Ring;
                }
                _ => tracing::warn!("ring failed the HMAC probe, signing with sha2 instead"),
            }
        }
        SignerBackend::Digest
    }

    pub(crate) fn sign(self, payload: &str, secret: &str) -> Result<String> {
        match self {
            #[cfg(feature = "ring")]
            SignerBackend::Ring => {
                let key = ring::hmac::Key::new(ring::hmac::HMAC_SHA256, secret.as_bytes());
                let tag = ring::hmac::sign(&key, payload.as_bytes());
                Ok(hex::encode(tag.as_ref()))
            }
            SignerBackend::Digest => Ok(hex::encode(digest(payload, secret)?)),
        }
    }

    pub(crate) fn verify(self, payload: &str, secret: &str, signature: &str) -> Result<bool> {
        let signature = decode_hex(signature)?;
        match self {
            // ring compares in constant time
            #[cfg(feature = "ring")]
            SignerBackend::Ring => {
                let key = ring::hmac::Key::new(ring::hmac::HMAC_SHA256, secret.as_bytes());
                Ok(ring::hmac::verify(&key, payload.as_bytes(), &signature).is_ok())
            }
            SignerBackend::Digest => {
                let computed = digest(payload, secret)?;
                Ok(computed.as_slice().ct_eq(signature.as_slice()).into())
            }
        }
    }
}

fn digest(payload: &str, secret: &str) -> Result<Vec<u8>> {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| BlobError::SigningFailed())?;
    mac.update(payload.as_bytes());
    Ok(mac.finalize().into_bytes().to_vec())
}

/// Decodes a hex string into bytes
///
/// Odd length input or non-hex characters are rejected.
pub fn decode_hex(input: &str) -> Result<Vec<u8>> {
    if input.len() % 2 != 0 {
        return Err(BlobError::InvalidHex(
            "Expected string to be an even number of characters".to_string(),
        ));
    }
    hex::decode(input).map_err(|err| BlobError::InvalidHex(err.to_string()))
}

/// Signs `payload` with HMAC-SHA256 keyed by `secret`
///
/// # Returns
///
/// The signature as a lowercase hex string
pub fn sign(payload: &str, secret: &str) -> Result<String> {
    BACKEND.sign(payload, secret)
}

/// Checks that `signature` (hex) is the HMAC-SHA256 of `payload` keyed by `secret`
///
/// The comparison does not short circuit on the first mismatching byte.  A
/// signature that is not valid hex is an error rather than a mismatch.
pub fn verify(payload: &str, secret: &str, signature: &str) -> Result<bool> {
    BACKEND.verify(payload, secret, signature)
}
