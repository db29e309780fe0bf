//! The [Vercel Blob API](https://vercel.com/docs/storage/vercel-blob) allows you to
//! upload and serve files in your Vercel application.
//!
//! This crate supplies a rust client to access the API functions, and both halves
//! of client uploads: a client uploads directly to the blob store using a short
//! lived token that your server signs.
//!
//! Inside a Vercel function all you need to do is instantiate a [`BlobClient`]:
//!
//! [`BlobClient`]: crate::client::BlobClient
//!
//! ```ignore
//! let client = BlobClient::new();
//!
//! let list_result = client.list(Default::default()).await.unwrap();
//! for blob in list_result.blobs {
//!     dbg!(blob.url);
//! }
//! ```
//!
//! # Client uploads
//!
//! On the server, add a route that passes its requests to [`handle_upload`].  The
//! route is called twice per upload: once by the client to get a token, and once by
//! the blob store when the upload has finished.
//!
//! [`handle_upload`]: crate::callback::handle_upload
//!
//! ```ignore
//! struct AvatarUploads;
//!
//! #[async_trait]
//! impl UploadHandler for AvatarUploads {
//!     async fn on_before_generate_token(
//!         &self,
//!         pathname: &str,
//!         client_payload: Option<&str>,
//!     ) -> Result<GenerateTokenPolicy, BlobError> {
//!         // Authenticate the user here
//!         Ok(GenerateTokenPolicy {
//!             allowed_content_types: Some(vec!["image/png".to_string()]),
//!             maximum_size_in_bytes: Some(1024 * 1024),
//!             ..Default::default()
//!         })
//!     }
//!
//!     async fn on_upload_completed(&self, payload: UploadCompletedPayload) -> Result<(), BlobError> {
//!         println!("uploaded {}", payload.blob.url);
//!         Ok(())
//!     }
//! }
//!
//! async fn upload_route(headers: HeaderMap, body: String) -> Result<Json<HandleUploadResult>, BlobError> {
//!     let options = HandleUploadOptions {
//!         token: None,
//!         headers: &headers,
//!         body: &body,
//!     };
//!     Ok(Json(handle_upload(options, &AvatarUploads).await?))
//! }
//! ```
//!
//! On the client, [`upload`] fetches a token from that route and uploads the file:
//!
//! [`upload`]: crate::upload::upload
//!
//! ```ignore
//! let blob = upload(
//!     "avatars/me.png",
//!     image_bytes,
//!     UploadOptions {
//!         handle_upload_url: Some("https://my-app.vercel.app/api/avatar".to_string()),
//!         content_type: Some("image/png".to_string()),
//!         ..Default::default()
//!     },
//! )
//! .await?;
//! ```

pub mod auth;
#[cfg(feature = "server")]
pub mod callback;
pub mod client;
pub mod context;
pub mod error;
pub mod events;
#[cfg(feature = "server")]
pub mod issuer;
pub mod signer;
pub mod token;
#[cfg(feature = "client")]
pub mod upload;
