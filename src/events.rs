//! Messages exchanged with the route that handles client uploads
use std::collections::HashMap;
use std::hash::BuildHasher;

use reqwest::header::HeaderMap;
use serde::{Deserialize, Serialize};

use crate::client::PutBlobResult;

pub const GENERATE_CLIENT_TOKEN_EVENT: &str = "blob.generate-client-token";
pub const UPLOAD_COMPLETED_EVENT: &str = "blob.upload-completed";

/// Carries the hex HMAC of an upload completed event body
pub const SIGNATURE_HEADER: &str = "x-vercel-signature";

/// Sent by the client to ask for a token before uploading
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateClientTokenPayload {
    pub pathname: String,
    pub callback_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_payload: Option<String>,
}

/// Sent by the storage service once a client upload has finished
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadCompletedPayload {
    pub blob: PutBlobResult,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_payload: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum BlobEvent {
    #[serde(rename = "blob.generate-client-token")]
    GenerateClientToken(GenerateClientTokenPayload),
    #[serde(rename = "blob.upload-completed")]
    UploadCompleted(UploadCompletedPayload),
}

/// The answer of [`handle_upload`](crate::callback::handle_upload), to be sent back as JSON
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum HandleUploadResult {
    #[serde(rename = "blob.generate-client-token")]
    GenerateClientToken {
        #[serde(rename = "clientToken")]
        client_token: String,
    },
    #[serde(rename = "blob.upload-completed")]
    UploadCompleted { response: String },
}

/// Read access to the headers of an incoming request
///
/// Lookups ignore case.  Implemented for `http` style header maps and for plain
/// string maps such as those built from Node style request objects.
pub trait RequestHeaders {
    fn header(&self, name: &str) -> Option<&str>;
}

impl RequestHeaders for HeaderMap {
    fn header(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(|value| value.to_str().ok())
    }
}

impl<S: BuildHasher> RequestHeaders for HashMap<String, String, S> {
    fn header(&self, name: &str) -> Option<&str> {
        self.iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}
