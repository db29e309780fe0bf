//! Authentication utilities for working with the API
use std::env;

use async_trait::async_trait;

use crate::error::{BlobError, Result};

/// The environment variable holding the store's read-write token
pub const READ_WRITE_TOKEN_ENV: &str = "BLOB_READ_WRITE_TOKEN";
/// Prefix of a read-write (root) token
pub const READ_WRITE_TOKEN_PREFIX: &str = "vercel_blob_rw_";
/// Prefix of a client token minted from a read-write token
pub const CLIENT_TOKEN_PREFIX: &str = "vercel_blob_client_";

/// A trait for providing a token to authenticate with the Vercel Blob Storage API.
///
/// If your code is running inside a Vercel function then you will not need this.
///
/// If your code is running outside of Vercel (e.g. a client application) then you will
/// need to obtain a token from your Vercel application.  The `client` feature ships
/// [`HandleUploadTokenProvider`] which exchanges a client token with a route built on
/// [`handle_upload`].
///
/// The operation (e.g. list, put, download) and pathname (e.g. foo/bar.txt) are
/// provided in case fine-grained authorization is required.  For operations that
/// use the full URL (download / del) the pathname will be the URL.
///
/// [`HandleUploadTokenProvider`]: crate::upload::HandleUploadTokenProvider
/// [`handle_upload`]: crate::callback::handle_upload
#[async_trait]
pub trait TokenProvider: std::fmt::Debug + Send + Sync {
    async fn get_token(&self, operation: &str, pathname: Option<&str>) -> Result<String>;
}

pub(crate) async fn get_token(
    provider: Option<&dyn TokenProvider>,
    operation: &str,
    pathname: Option<&str>,
) -> Result<String> {
    if let Some(provider) = provider {
        provider.get_token(operation, pathname).await
    } else {
        env::var(READ_WRITE_TOKEN_ENV).map_err(|_| BlobError::NotAuthenticated())
    }
}

/// The read-write token of a store
///
/// This is the long lived secret used to sign client tokens and upload callbacks.
/// It must never leave the server.
#[derive(Clone)]
pub struct RootCredential {
    token: String,
    from_env: bool,
}

// Custom implementation of Debug to avoid printing the token
impl std::fmt::Debug for RootCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RootCredential")
            .field("token", &"**********")
            .field("from_env", &self.from_env)
            .finish()
    }
}

impl RootCredential {
    /// Uses `token` if given, otherwise reads `BLOB_READ_WRITE_TOKEN`
    pub fn resolve(token: Option<&str>) -> Result<Self> {
        match token {
            Some(token) if !token.is_empty() => Ok(Self {
                token: token.to_string(),
                from_env: false,
            }),
            _ => {
                let token = env::var(READ_WRITE_TOKEN_ENV)
                    .ok()
                    .filter(|token| !token.is_empty())
                    .ok_or(BlobError::NotAuthenticated())?;
                Ok(Self {
                    token,
                    from_env: true,
                })
            }
        }
    }

    /// The store id is the fourth `_` separated segment of the token
    pub fn store_id(&self) -> Result<&str> {
        match self.token.split('_').nth(3) {
            Some(store_id) if !store_id.is_empty() => Ok(store_id),
            _ if self.from_env => Err(BlobError::InvalidCredential(format!(
                "Invalid `{}`",
                READ_WRITE_TOKEN_ENV
            ))),
            _ => Err(BlobError::InvalidCredential(
                "Invalid `token` parameter".to_string(),
            )),
        }
    }

    pub fn secret(&self) -> &str {
        &self.token
    }
}

/// A token provider that reads the token from an environment variable.
///
/// This is useful for testing but should not be used for real applications.
pub struct EnvTokenProvider {
    token: String,
}

impl std::fmt::Debug for EnvTokenProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnvTokenProvider")
            .field("token", &"**********")
            .finish()
    }
}

impl EnvTokenProvider {
    pub fn try_new(env_var: &str) -> Result<Self> {
        let token = env::var(env_var).map_err(|_| BlobError::NotAuthenticated())?;
        Ok(Self { token })
    }
}

#[async_trait]
impl TokenProvider for EnvTokenProvider {
    async fn get_token(&self, _operation: &str, _pathname: Option<&str>) -> Result<String> {
        Ok(self.token.clone())
    }
}

/// A token provider that always hands out the same token
///
/// Used for client tokens that were obtained ahead of time.
pub struct StaticTokenProvider {
    token: String,
}

impl std::fmt::Debug for StaticTokenProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticTokenProvider")
            .field("token", &"**********")
            .finish()
    }
}

impl StaticTokenProvider {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

#[async_trait]
impl TokenProvider for StaticTokenProvider {
    async fn get_token(&self, _operation: &str, _pathname: Option<&str>) -> Result<String> {
        Ok(self.token.clone())
    }
}
