//! Guards that keep server and client operations on their own side
//!
//! The `server` and `client` cargo features decide what gets compiled.  These
//! checks catch the remaining misuse at runtime: issuing tokens from a browser,
//! or running client uploads in a process that holds the read-write token.
use std::env;

use crate::auth::READ_WRITE_TOKEN_ENV;
use crate::error::{BlobError, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExecutionContext {
    /// WebAssembly running without an operating system, i.e. in a browser
    Browser,
    Server,
}

impl ExecutionContext {
    pub fn detect() -> Self {
        if cfg!(all(target_arch = "wasm32", target_os = "unknown")) {
            ExecutionContext::Browser
        } else {
            ExecutionContext::Server
        }
    }

    /// Native processes count as clients unless they carry the read-write token
    pub fn is_client_like(self) -> bool {
        match self {
            ExecutionContext::Browser => true,
            ExecutionContext::Server => env::var_os(READ_WRITE_TOKEN_ENV).is_none(),
        }
    }
}

#[cfg_attr(not(feature = "server"), allow(dead_code))]
pub(crate) fn ensure_server(operation: &str) -> Result<()> {
    if ExecutionContext::detect() == ExecutionContext::Browser {
        return Err(BlobError::server_only(operation));
    }
    Ok(())
}

#[cfg_attr(not(feature = "client"), allow(dead_code))]
pub(crate) fn ensure_client(operation: &str) -> Result<()> {
    if !ExecutionContext::detect().is_client_like() {
        return Err(BlobError::client_only(operation));
    }
    Ok(())
}
