//! A Rust definition of the REST API and a client to access it
use std::{env, ops::Range, sync::Arc};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use reqwest::{Body, Client, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};

use crate::{
    auth::{get_token, TokenProvider},
    error::{BlobError, Result},
};

const BLOB_API_VERSION: u32 = 4;
const DEFAULT_BLOB_API_URL: &str = "https://blob.vercel-storage.com";
pub(crate) static GLOBAL_CLIENT: Lazy<Client> = Lazy::new(Client::new);

/// A client for interacting with the Vercel Blob Store
///
/// If your code is running in a Vercel function then you shouldn't need to
/// provide any configuration as the runtime will supply the needed information.
///
/// If your code is running externally (e.g. a client application) then you
/// will need to supply a token provider.  For uploads the simplest option is
/// [`upload`](crate::upload::upload), which fetches a client token from your
/// application for you.
pub struct BlobClient {
    /// Supplies the bearer token.  `None` means `BLOB_READ_WRITE_TOKEN`.
    token_provider: Option<Arc<dyn TokenProvider>>,
    /// The server URL to use.  This is not normally needed but can be used
    /// for testing purposes.
    base_url: String,
    api_version: String,
}

#[derive(Deserialize)]
struct BlobApiErrorDetail {
    code: String,
    message: Option<String>,
}

#[derive(Deserialize)]
struct BlobApiError {
    error: BlobApiErrorDetail,
}

impl Default for BlobClient {
    fn default() -> Self {
        Self::new()
    }
}

impl BlobClient {
    /// Creates a new client for use inside a Vercel function
    pub fn new() -> Self {
        Self::with_provider(None)
    }

    /// Creates a new client for use outside of Vercel
    pub fn new_external(token_provider: Arc<dyn TokenProvider>) -> Self {
        Self::with_provider(Some(token_provider))
    }

    fn with_provider(token_provider: Option<Arc<dyn TokenProvider>>) -> Self {
        Self {
            token_provider,
            base_url: env::var("VERCEL_BLOB_API_URL")
                .or(env::var("NEXT_PUBLIC_VERCEL_BLOB_API_URL"))
                .unwrap_or_else(|_| DEFAULT_BLOB_API_URL.to_string()),
            api_version: env::var("VERCEL_BLOB_API_VERSION_OVERRIDE")
                .unwrap_or_else(|_| BLOB_API_VERSION.to_string()),
        }
    }

    fn api_url(&self, path: &str) -> String {
        url_join(&self.base_url, path)
    }

    /// Adds the headers every request carries: api version and bearer token
    async fn authorize(
        &self,
        request: RequestBuilder,
        operation: &str,
        pathname: Option<&str>,
    ) -> Result<RequestBuilder> {
        let token = get_token(self.token_provider.as_deref(), operation, pathname).await?;
        Ok(request
            .header("x-api-version", self.api_version.as_str())
            .header("authorization", format!("Bearer {}", token)))
    }

    async fn send(request: RequestBuilder, operation: &str) -> Result<Response> {
        let response = request.send().await?;
        let status = response.status();
        if status == StatusCode::OK || status == StatusCode::PARTIAL_CONTENT {
            return Ok(response);
        }
        let err = Self::handle_error(response).await;
        tracing::debug!(operation, status = status.as_u16(), error = %err, "blob api request failed");
        Err(err)
    }

    async fn handle_error(response: Response) -> BlobError {
        let status = response.status();
        if status.is_server_error() {
            return BlobError::unknown_error(status);
        }
        let Ok(BlobApiError { error }) = response.json::<BlobApiError>().await else {
            return BlobError::unknown_error(status);
        };
        match error.code.as_str() {
            "store_suspended" => BlobError::StoreSuspended(),
            "forbidden" => BlobError::Forbidden(),
            "not_found" => BlobError::BlobNotFound(),
            "store_not_found" => BlobError::StoreNotFound(),
            "bad_request" => BlobError::BadRequest(
                error
                    .message
                    .unwrap_or_else(|| "unknown details".to_string()),
            ),
            _ => BlobError::unknown_error(status),
        }
    }
}

/// Functions defined in the Vercel Blob API
#[async_trait]
pub trait BlobApi {
    /// Lists files in the blob store
    ///
    /// # Arguments
    ///
    /// * `options` - Options for the list operation
    ///
    /// # Returns
    ///
    /// The response from the list operation
    async fn list(&self, options: ListCommandOptions) -> Result<ListBlobResult>;

    /// Uploads a file to the blob store
    ///
    /// # Arguments
    ///
    /// * `pathname` - The destination pathname for the uploaded file
    /// * `body` - The contents of the file
    /// * `options` - Options for the put operation
    ///
    /// # Returns
    ///
    /// The response from the put operation.  This includes a URL that can
    /// be used to later download the blob.
    async fn put(
        &self,
        pathname: &str,
        body: impl Into<Body> + Send,
        options: PutCommandOptions,
    ) -> Result<PutBlobResult>;

    /// Gets the metadata for a file in the blob store
    ///
    /// Returns `None` if the file does not exist.
    async fn head(&self, url: &str, options: HeadCommandOptions) -> Result<Option<HeadBlobResult>>;

    /// Deletes a blob, given the URL it is downloaded from
    async fn del(&self, url: &str, options: DelCommandOptions) -> Result<()>;

    /// Downloads a blob, or a byte range of it
    async fn download(&self, url: &str, options: DownloadCommandOptions) -> Result<Bytes>;
}

/// Details about a blob that are returned by the list operation
#[derive(Debug, Deserialize, Serialize)]
pub struct ListBlobResultBlob {
    pub url: String,
    pub pathname: String,
    /// The size of the blob in bytes
    pub size: u64,
    #[serde(alias = "uploadedAt")]
    pub uploaded_at: DateTime<Utc>,
}

/// The response from the list operation
#[derive(Debug, Deserialize, Serialize)]
pub struct ListBlobResult {
    pub blobs: Vec<ListBlobResultBlob>,
    /// Pass to the next list call to get the next page
    pub cursor: Option<String>,
    #[serde(alias = "hasMore")]
    pub has_more: bool,
}

/// Options for the list operation
///
/// If `limit` is reached then the response will have `has_more` set and
/// `cursor` can be used to get the next page of results.
#[derive(Clone, Debug, Default)]
pub struct ListCommandOptions {
    pub limit: Option<u64>,
    /// Only list blobs whose pathname starts with this prefix
    pub prefix: Option<String>,
    pub cursor: Option<String>,
}

fn url_join(base: &str, path: &str) -> String {
    match (base.ends_with('/'), path.starts_with('/')) {
        (true, true) => format!("{}{}", base, &path[1..]),
        (false, false) if !path.is_empty() => format!("{}/{}", base, path),
        _ => format!("{}{}", base, path),
    }
}

#[async_trait]
impl BlobApi for BlobClient {
    async fn list(&self, options: ListCommandOptions) -> Result<ListBlobResult> {
        let mut query = Vec::new();
        if let Some(limit) = options.limit {
            query.push(("limit", limit.to_string()));
        }
        if let Some(prefix) = options.prefix {
            query.push(("prefix", prefix));
        }
        if let Some(cursor) = options.cursor {
            query.push(("cursor", cursor));
        }
        let request = GLOBAL_CLIENT.get(self.api_url("")).query(&query);
        let request = self.authorize(request, "list", None).await?;
        Ok(Self::send(request, "list").await?.json().await?)
    }

    async fn put(
        &self,
        pathname: &str,
        body: impl Into<Body> + Send,
        options: PutCommandOptions,
    ) -> Result<PutBlobResult> {
        if pathname.is_empty() {
            return Err(BlobError::required("pathname"));
        }

        let request = GLOBAL_CLIENT.put(self.api_url(&format!("/{pathname}")));
        let mut request = self.authorize(request, "put", Some(pathname)).await?;

        if !options.add_random_suffix {
            request = request.header("x-add-random-suffix", "0");
        }
        if let Some(content_type) = options.content_type {
            request = request.header("x-content-type", content_type);
        }
        if let Some(max_age) = options.cache_control_max_age {
            request = request.header("x-cache-control-max-age", max_age.to_string());
        }

        let response = Self::send(request.body(body), "put").await?;
        Ok(response.json::<PutBlobResult>().await?)
    }

    async fn head(
        &self,
        url: &str,
        _options: HeadCommandOptions,
    ) -> Result<Option<HeadBlobResult>> {
        let request = GLOBAL_CLIENT.get(self.api_url("")).query(&[("url", url)]);
        let request = self.authorize(request, "head", Some(url)).await?;

        match Self::send(request, "head").await {
            Ok(response) => Ok(Some(response.json::<HeadBlobResult>().await?)),
            Err(BlobError::BlobNotFound()) => Ok(None),
            Err(err) => Err(err),
        }
    }

    async fn del(&self, url: &str, _options: DelCommandOptions) -> Result<()> {
        let request = GLOBAL_CLIENT.post(self.api_url("/delete"));
        let request = self
            .authorize(request, "del", Some(url))
            .await?
            .json(&DelCommandBody {
                urls: vec![url.to_string()],
            });

        Self::send(request, "del").await?;
        Ok(())
    }

    async fn download(&self, url: &str, options: DownloadCommandOptions) -> Result<Bytes> {
        let mut request = self
            .authorize(GLOBAL_CLIENT.get(url), "download", Some(url))
            .await?;

        if let Some(byte_range) = options.byte_range {
            if byte_range.is_empty() {
                return Ok(Bytes::new());
            }
            // HTTP ranges are inclusive, rust ranges are not
            request = request.header(
                "range",
                format!("bytes={}-{}", byte_range.start, byte_range.end - 1),
            );
        }

        Ok(Self::send(request, "download").await?.bytes().await?)
    }
}

/// Options for the put operation
///
/// By default uploaded files are assigned a URL with a random suffix.  This
/// ensures that no put operation will overwrite an existing file.  The url
/// returned in the response can be used to later download the file.
///
/// If predictable URLs are needed then add_random_suffix can be set to false.
/// Sequential writes to the same pathname will then overwrite each other.
#[derive(Debug)]
pub struct PutCommandOptions {
    pub add_random_suffix: bool,
    /// How long (in seconds) the file should be cached.  0 disables caching.
    pub cache_control_max_age: Option<u64>,
    /// Defaults to text/plain
    pub content_type: Option<String>,
}

impl Default for PutCommandOptions {
    fn default() -> Self {
        Self {
            add_random_suffix: true,
            cache_control_max_age: None,
            content_type: None,
        }
    }
}

/// The response from the put operation, also reported by upload completed events
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct PutBlobResult {
    pub url: String,
    pub pathname: String,
    #[serde(alias = "contentType")]
    pub content_type: String,
    #[serde(alias = "contentDisposition")]
    pub content_disposition: String,
}

/// Response from the head operation
#[derive(Debug, Deserialize, Serialize)]
pub struct HeadBlobResult {
    pub url: String,
    pub size: u64,
    #[serde(alias = "uploadedAt")]
    pub uploaded_at: DateTime<Utc>,
    pub pathname: String,
    #[serde(alias = "contentType")]
    pub content_type: String,
    #[serde(alias = "contentDisposition")]
    pub content_disposition: String,
    #[serde(alias = "cacheControl")]
    pub cache_control: String,
}

/// Options for the head operation
///
/// Intentionally blank to leave room for future options
#[derive(Debug, Default)]
pub struct HeadCommandOptions {}

#[derive(Debug, Serialize)]
struct DelCommandBody {
    urls: Vec<String>,
}

/// Options for the del operation
///
/// Intentionally blank to leave room for future options
#[derive(Debug, Default)]
pub struct DelCommandOptions {}

/// Options for the download operation
#[derive(Debug, Default)]
pub struct DownloadCommandOptions {
    /// The range of bytes to download, the entire blob if not given.  The start
    /// must be within the blob; the end may lie past it.
    pub byte_range: Option<Range<usize>>,
}
