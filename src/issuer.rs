//! Minting client tokens from the store's read-write token
use chrono::Utc;

use crate::{
    auth::RootCredential,
    context,
    error::Result,
    token::{encode_client_token, ClientTokenOptions, ClientTokenPayload},
};

/// How long a client token stays valid when no expiry is given
pub const DEFAULT_CLIENT_TOKEN_VALIDITY_MS: i64 = 30_000;

/// Generates a client token that lets a client upload to `options.pathname`
///
/// The token is signed with `token` or, if not given, with the read-write token in
/// `BLOB_READ_WRITE_TOKEN`.  Hand the result to the client; the read-write token
/// itself must stay on the server.
///
/// # Arguments
///
/// * `options` - What the client is allowed to upload
/// * `token` - Overrides the read-write token from the environment
///
/// # Returns
///
/// The client token
pub fn generate_client_token(options: &ClientTokenOptions, token: Option<&str>) -> Result<String> {
    context::ensure_server("generate_client_token")?;
    let credential = RootCredential::resolve(token)?;
    issue_client_token(options.clone(), &credential)
}

pub(crate) fn issue_client_token(
    options: ClientTokenOptions,
    credential: &RootCredential,
) -> Result<String> {
    let store_id = credential.store_id()?;
    let default_valid_until = Utc::now().timestamp_millis() + DEFAULT_CLIENT_TOKEN_VALIDITY_MS;
    let payload = ClientTokenPayload::from_options(options, default_valid_until);
    let client_token = encode_client_token(&payload, credential.secret(), store_id)?;
    tracing::debug!(
        pathname = %payload.pathname,
        valid_until = payload.valid_until,
        store_id,
        "issued client token"
    );
    Ok(client_token)
}
