//! Server side handling of client uploads
//!
//! A route in your application receives two kinds of events.  Before a client
//! uploads, the client asks for a token (`blob.generate-client-token`).  After the
//! upload, the storage service reports the new blob (`blob.upload-completed`),
//! signing the body with the store's read-write token.  [`handle_upload`] answers
//! both; your [`UploadHandler`] decides what to allow and what to do afterwards.
use async_trait::async_trait;

use crate::{
    auth::RootCredential,
    context,
    error::{BlobError, Result},
    events::{
        BlobEvent, HandleUploadResult, RequestHeaders, UploadCompletedPayload,
        GENERATE_CLIENT_TOKEN_EVENT, SIGNATURE_HEADER, UPLOAD_COMPLETED_EVENT,
    },
    issuer::issue_client_token,
    signer,
    token::{ClientTokenOptions, UploadCompletedCallback},
};

/// The restrictions placed on a client token, chosen by [`UploadHandler::on_before_generate_token`]
#[derive(Clone, Debug, Default)]
pub struct GenerateTokenPolicy {
    pub allowed_content_types: Option<Vec<String>>,
    pub maximum_size_in_bytes: Option<u64>,
    /// Milliseconds since the epoch
    pub valid_until: Option<i64>,
    pub add_random_suffix: Option<bool>,
    pub cache_control_max_age: Option<u64>,
    /// Returned with the upload completed event.  Defaults to the client payload.
    pub token_payload: Option<String>,
}

/// Application hooks called by [`handle_upload`]
#[async_trait]
pub trait UploadHandler: Send + Sync {
    /// Authorizes an upload.  Return an error to refuse the token.
    async fn on_before_generate_token(
        &self,
        pathname: &str,
        client_payload: Option<&str>,
    ) -> Result<GenerateTokenPolicy>;

    /// Called once per verified upload completed event
    async fn on_upload_completed(&self, payload: UploadCompletedPayload) -> Result<()>;
}

/// The request received by the upload route
pub struct HandleUploadOptions<'a> {
    /// Overrides `BLOB_READ_WRITE_TOKEN`
    pub token: Option<&'a str>,
    pub headers: &'a (dyn RequestHeaders + Sync),
    /// The raw JSON body.  The callback signature covers these exact bytes.
    pub body: &'a str,
}

impl std::fmt::Debug for HandleUploadOptions<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandleUploadOptions")
            .field("token", &self.token.map(|_| "**********"))
            .field("body", &self.body)
            .finish()
    }
}

/// Handles a request sent to the client upload route
///
/// # Returns
///
/// The JSON response for the request
pub async fn handle_upload<H>(
    options: HandleUploadOptions<'_>,
    handler: &H,
) -> Result<HandleUploadResult>
where
    H: UploadHandler + ?Sized,
{
    context::ensure_server("handle_upload")?;
    let credential = RootCredential::resolve(options.token)?;

    let event = serde_json::from_str::<serde_json::Value>(options.body)?;
    let event_type = event
        .get("type")
        .and_then(|event_type| event_type.as_str())
        .unwrap_or_default()
        .to_string();
    tracing::debug!(event_type = %event_type, "handling upload event");

    match event_type.as_str() {
        GENERATE_CLIENT_TOKEN_EVENT => {}
        UPLOAD_COMPLETED_EVENT => verify_callback_signature(&options, &credential)?,
        _ => return Err(BlobError::InvalidEvent(event_type)),
    }

    match serde_json::from_value::<BlobEvent>(event)? {
        BlobEvent::GenerateClientToken(payload) => {
            let policy = handler
                .on_before_generate_token(&payload.pathname, payload.client_payload.as_deref())
                .await?;
            let token_payload = policy.token_payload.or(payload.client_payload);
            let client_token = issue_client_token(
                ClientTokenOptions {
                    pathname: payload.pathname,
                    allowed_content_types: policy.allowed_content_types,
                    maximum_size_in_bytes: policy.maximum_size_in_bytes,
                    valid_until: policy.valid_until,
                    add_random_suffix: policy.add_random_suffix,
                    cache_control_max_age: policy.cache_control_max_age,
                    on_upload_completed: Some(UploadCompletedCallback {
                        callback_url: payload.callback_url,
                        token_payload,
                    }),
                },
                &credential,
            )?;
            Ok(HandleUploadResult::GenerateClientToken { client_token })
        }
        BlobEvent::UploadCompleted(payload) => {
            handler.on_upload_completed(payload).await?;
            Ok(HandleUploadResult::UploadCompleted {
                response: "ok".to_string(),
            })
        }
    }
}

fn verify_callback_signature(
    options: &HandleUploadOptions<'_>,
    credential: &RootCredential,
) -> Result<()> {
    let signature = options
        .headers
        .header(SIGNATURE_HEADER)
        .filter(|signature| !signature.is_empty())
        .ok_or(BlobError::MissingSignature())?;
    // Malformed hex is treated like any other wrong signature
    let verified = signer::verify(options.body, credential.secret(), signature).unwrap_or(false);
    if !verified {
        tracing::warn!("rejected upload completed event with an invalid signature");
        return Err(BlobError::InvalidSignature());
    }
    Ok(())
}
