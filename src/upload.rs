//! Client uploads
//!
//! A client never holds the read-write token.  Instead it asks a route in your
//! application (built on [`handle_upload`](crate::callback::handle_upload)) for a
//! short lived client token and uploads straight to the blob store with it.
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{Body, Url};
use serde::Deserialize;

use crate::{
    auth::{StaticTokenProvider, TokenProvider, CLIENT_TOKEN_PREFIX, READ_WRITE_TOKEN_PREFIX},
    client::{BlobApi, BlobClient, PutBlobResult, PutCommandOptions, GLOBAL_CLIENT},
    context,
    error::{BlobError, Result},
    events::{BlobEvent, GenerateClientTokenPayload},
};

#[derive(Deserialize)]
struct ClientTokenResponse {
    #[serde(rename = "clientToken")]
    client_token: String,
}

/// Options for [`retrieve_client_token`]
#[derive(Clone, Debug, Default)]
pub struct RetrieveClientTokenOptions {
    /// The route that answers `blob.generate-client-token` events.  May be
    /// relative to `origin`.
    pub handle_upload_url: String,
    pub pathname: String,
    /// Passed to the route's `on_before_generate_token`
    pub client_payload: Option<String>,
    /// The origin of the page or application making the upload
    pub origin: Option<String>,
}

fn resolve_handle_upload_url(handle_upload_url: &str, origin: Option<&str>) -> Result<Url> {
    if let Ok(url) = Url::parse(handle_upload_url) {
        return Ok(url);
    }
    let origin = origin.ok_or_else(|| {
        BlobError::InvalidInput(format!(
            "`{}` is relative but no origin was given",
            handle_upload_url
        ))
    })?;
    Url::parse(origin)
        .and_then(|origin| origin.join(handle_upload_url))
        .map_err(|err| BlobError::InvalidInput(format!("invalid handleUploadUrl: {}", err)))
}

/// Asks the application for a client token to upload `pathname`
///
/// Fails on any error status or unexpected response.  There are no retries.
pub async fn retrieve_client_token(options: &RetrieveClientTokenOptions) -> Result<String> {
    let url = resolve_handle_upload_url(&options.handle_upload_url, options.origin.as_deref())?;
    let event = BlobEvent::GenerateClientToken(GenerateClientTokenPayload {
        pathname: options.pathname.clone(),
        callback_url: url.to_string(),
        client_payload: options.client_payload.clone(),
    });
    tracing::debug!(url = %url, pathname = %options.pathname, "retrieving client token");

    let response = GLOBAL_CLIENT
        .post(url)
        .json(&event)
        .send()
        .await
        .map_err(|err| BlobError::TokenRetrieval(err.to_string()))?;
    let status = response.status();
    if status.as_u16() >= 400 {
        return Err(BlobError::TokenRetrieval(format!(
            "upload route responded with {}",
            status
        )));
    }
    let body = response
        .text()
        .await
        .map_err(|err| BlobError::TokenRetrieval(err.to_string()))?;
    let ClientTokenResponse { client_token } = serde_json::from_str(&body)
        .map_err(|err| BlobError::TokenRetrieval(format!("unexpected response: {}", err)))?;
    Ok(client_token)
}

/// A token provider that exchanges a client token with your upload route
///
/// Each call asks for a fresh token scoped to the requested pathname.
#[derive(Clone, Debug)]
pub struct HandleUploadTokenProvider {
    handle_upload_url: String,
    client_payload: Option<String>,
    origin: Option<String>,
}

impl HandleUploadTokenProvider {
    pub fn new(handle_upload_url: impl Into<String>) -> Self {
        Self {
            handle_upload_url: handle_upload_url.into(),
            client_payload: None,
            origin: None,
        }
    }

    pub fn with_client_payload(mut self, client_payload: Option<String>) -> Self {
        self.client_payload = client_payload;
        self
    }

    /// Used to resolve a relative upload route
    pub fn with_origin(mut self, origin: Option<String>) -> Self {
        self.origin = origin;
        self
    }
}

#[async_trait]
impl TokenProvider for HandleUploadTokenProvider {
    async fn get_token(&self, _operation: &str, pathname: Option<&str>) -> Result<String> {
        retrieve_client_token(&RetrieveClientTokenOptions {
            handle_upload_url: self.handle_upload_url.clone(),
            pathname: pathname.unwrap_or_default().to_string(),
            client_payload: self.client_payload.clone(),
            origin: self.origin.clone(),
        })
        .await
    }
}

/// Options for [`upload`]
///
/// `add_random_suffix` and `cache_control_max_age` are decided by the server when
/// it generates the token.  Setting them here is an error.
#[derive(Clone, Debug, Default)]
pub struct UploadOptions {
    /// Required.  The route built on `handle_upload`.
    pub handle_upload_url: Option<String>,
    /// Used to resolve a relative `handle_upload_url`
    pub origin: Option<String>,
    pub client_payload: Option<String>,
    pub content_type: Option<String>,
    pub add_random_suffix: Option<bool>,
    pub cache_control_max_age: Option<u64>,
}

/// Options for [`put_with_client_token`]
#[derive(Clone, Default)]
pub struct ClientPutOptions {
    /// A client token, never the read-write token
    pub token: String,
    pub content_type: Option<String>,
    pub add_random_suffix: Option<bool>,
    pub cache_control_max_age: Option<u64>,
}

impl std::fmt::Debug for ClientPutOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientPutOptions")
            .field("token", &"**********")
            .field("content_type", &self.content_type)
            .field("add_random_suffix", &self.add_random_suffix)
            .field("cache_control_max_age", &self.cache_control_max_age)
            .finish()
    }
}

fn reject_server_options(
    operation: &str,
    add_random_suffix: Option<bool>,
    cache_control_max_age: Option<u64>,
) -> Result<()> {
    if add_random_suffix.is_some() || cache_control_max_age.is_some() {
        return Err(BlobError::PolicyViolation(format!(
            "client/`{}` doesn't allow `addRandomSuffix` or `cacheControlMaxAge`. \
             Configure these options at the server side when generating client tokens.",
            operation
        )));
    }
    Ok(())
}

fn client_put_options(content_type: Option<String>) -> PutCommandOptions {
    PutCommandOptions {
        content_type,
        ..Default::default()
    }
}

/// Uploads a file from a client, fetching a client token from your application first
///
/// # Arguments
///
/// * `pathname` - The destination pathname for the uploaded file
/// * `body` - The contents of the file
/// * `options` - Where to get the token and what to send along
///
/// # Returns
///
/// The uploaded blob
pub async fn upload(
    pathname: &str,
    body: impl Into<Body> + Send,
    options: UploadOptions,
) -> Result<PutBlobResult> {
    context::ensure_client("upload")?;
    let handle_upload_url = options.handle_upload_url.ok_or_else(|| {
        BlobError::InvalidInput(
            "client/`upload` requires the 'handleUploadUrl' parameter".to_string(),
        )
    })?;
    reject_server_options(
        "upload",
        options.add_random_suffix,
        options.cache_control_max_age,
    )?;

    let provider = HandleUploadTokenProvider::new(handle_upload_url)
        .with_client_payload(options.client_payload)
        .with_origin(options.origin);
    BlobClient::new_external(Arc::new(provider))
        .put(pathname, body, client_put_options(options.content_type))
        .await
}

/// Uploads a file from a client with a client token obtained earlier
pub async fn put_with_client_token(
    pathname: &str,
    body: impl Into<Body> + Send,
    options: ClientPutOptions,
) -> Result<PutBlobResult> {
    context::ensure_client("put")?;
    if options.token.starts_with(READ_WRITE_TOKEN_PREFIX) {
        return Err(BlobError::PolicyViolation(
            "client/`put` must not leak your `BLOB_READ_WRITE_TOKEN`. \
             Use `generate_client_token` to create a client token."
                .to_string(),
        ));
    }
    if !options.token.starts_with(CLIENT_TOKEN_PREFIX) {
        return Err(BlobError::InvalidInput(
            "client/`put` requires a client token".to_string(),
        ));
    }
    reject_server_options("put", options.add_random_suffix, options.cache_control_max_age)?;

    BlobClient::new_external(Arc::new(StaticTokenProvider::new(options.token)))
        .put(pathname, body, client_put_options(options.content_type))
        .await
}
