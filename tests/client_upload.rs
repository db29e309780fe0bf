//! Runs a whole client upload against mock servers: the application route that
//! hands out client tokens, the blob store receiving the file, and the completion
//! callback the blob store sends back to the route.
use std::collections::HashMap;
use std::env;
use std::sync::{Arc, Mutex};

use all_asserts::assert_true;
use async_trait::async_trait;
use mockito::{Matcher, ServerGuard};
use serial_test::serial;

use vercel_blob_sdk::auth::READ_WRITE_TOKEN_ENV;
use vercel_blob_sdk::callback::{
    handle_upload, GenerateTokenPolicy, HandleUploadOptions, UploadHandler,
};
use vercel_blob_sdk::error::BlobError;
use vercel_blob_sdk::events::{HandleUploadResult, UploadCompletedPayload, SIGNATURE_HEADER};
use vercel_blob_sdk::signer;
use vercel_blob_sdk::token::verify_client_token;
use vercel_blob_sdk::upload::{upload, UploadOptions};

const READ_WRITE_TOKEN: &str = "vercel_blob_rw_store123_aW50ZWdyYXRpb24";

#[derive(Default)]
struct AvatarUploads {
    requested: Mutex<Vec<(String, Option<String>)>>,
    completed: Mutex<Vec<UploadCompletedPayload>>,
}

#[async_trait]
impl UploadHandler for AvatarUploads {
    async fn on_before_generate_token(
        &self,
        pathname: &str,
        client_payload: Option<&str>,
    ) -> Result<GenerateTokenPolicy, BlobError> {
        self.requested
            .lock()
            .unwrap()
            .push((pathname.to_string(), client_payload.map(str::to_string)));
        if !pathname.starts_with("avatars/") {
            return Err(BlobError::Forbidden());
        }
        Ok(GenerateTokenPolicy {
            allowed_content_types: Some(vec!["image/png".to_string()]),
            maximum_size_in_bytes: Some(1024),
            ..Default::default()
        })
    }

    async fn on_upload_completed(&self, payload: UploadCompletedPayload) -> Result<(), BlobError> {
        self.completed.lock().unwrap().push(payload);
        Ok(())
    }
}

/// Mounts `handle_upload` on `/api/avatar` of a mock server
async fn mount_upload_route(
    server: &mut ServerGuard,
    handler: Arc<AvatarUploads>,
    issued: Arc<Mutex<Vec<String>>>,
) -> mockito::Mock {
    server
        .mock("POST", "/api/avatar")
        .with_header("content-type", "application/json")
        .with_body_from_request(move |request| {
            let body = String::from_utf8(request.body().unwrap().clone()).unwrap();
            let result = futures::executor::block_on(handle_upload(
                HandleUploadOptions {
                    token: Some(READ_WRITE_TOKEN),
                    headers: &HashMap::<String, String>::new(),
                    body: &body,
                },
                handler.as_ref(),
            ));
            match result {
                Ok(HandleUploadResult::GenerateClientToken { client_token }) => {
                    issued.lock().unwrap().push(client_token.clone());
                    serde_json::to_vec(&HandleUploadResult::GenerateClientToken { client_token })
                        .unwrap()
                }
                // mockito can't pick the status from the request, an empty body
                // fails the client just the same
                _ => Vec::new(),
            }
        })
        .create_async()
        .await
}

#[tokio::test]
#[serial]
async fn client_upload_round_trip() {
    env::remove_var(READ_WRITE_TOKEN_ENV);

    let handler = Arc::new(AvatarUploads::default());
    let issued = Arc::new(Mutex::new(Vec::new()));
    let mut app = mockito::Server::new_async().await;
    let route = mount_upload_route(&mut app, handler.clone(), issued.clone()).await;

    let mut blob_store = mockito::Server::new_async().await;
    env::set_var("VERCEL_BLOB_API_URL", blob_store.url());
    let stored_url = format!("{}/avatars/me-x1y2.png", blob_store.url());
    let put = blob_store
        .mock("PUT", "/avatars/me.png")
        .match_header(
            "authorization",
            Matcher::Regex("^Bearer vercel_blob_client_store123_".to_string()),
        )
        .match_header("x-content-type", "image/png")
        .match_header("x-add-random-suffix", Matcher::Missing)
        .with_status(200)
        .with_body(
            serde_json::json!({
                "url": stored_url.clone(),
                "pathname": "avatars/me-x1y2.png",
                "contentType": "image/png",
                "contentDisposition": "inline; filename=\"me.png\"",
            })
            .to_string(),
        )
        .create_async()
        .await;

    let blob = upload(
        "avatars/me.png",
        vec![0x89_u8, b'P', b'N', b'G'],
        UploadOptions {
            handle_upload_url: Some("/api/avatar".to_string()),
            origin: Some(app.url()),
            client_payload: Some("user-42".to_string()),
            content_type: Some("image/png".to_string()),
            ..Default::default()
        },
    )
    .await
    .unwrap();
    env::remove_var("VERCEL_BLOB_API_URL");

    route.assert_async().await;
    put.assert_async().await;
    assert_eq!(blob.pathname, "avatars/me-x1y2.png");
    assert_eq!(
        handler.requested.lock().unwrap().as_slice(),
        &[("avatars/me.png".to_string(), Some("user-42".to_string()))]
    );

    // The issued token carries the policy and points back at the route
    let client_token = issued.lock().unwrap()[0].clone();
    let payload = verify_client_token(&client_token, READ_WRITE_TOKEN)
        .unwrap()
        .payload;
    assert_eq!(payload.pathname, "avatars/me.png");
    assert_eq!(payload.maximum_size_in_bytes, Some(1024));
    let callback = payload.on_upload_completed.unwrap();
    assert_eq!(callback.callback_url, format!("{}/api/avatar", app.url()));
    assert_eq!(callback.token_payload.as_deref(), Some("user-42"));

    // The blob store reports the upload, signed with the read-write token
    let completed_body = serde_json::json!({
        "type": "blob.upload-completed",
        "payload": {
            "blob": {
                "url": blob.url,
                "pathname": blob.pathname,
                "contentType": "image/png",
                "contentDisposition": "inline; filename=\"me.png\"",
            },
            "tokenPayload": callback.token_payload,
        }
    })
    .to_string();
    let mut headers = HashMap::new();
    headers.insert(
        SIGNATURE_HEADER.to_string(),
        signer::sign(&completed_body, READ_WRITE_TOKEN).unwrap(),
    );

    let result = handle_upload(
        HandleUploadOptions {
            token: Some(READ_WRITE_TOKEN),
            headers: &headers,
            body: &completed_body,
        },
        handler.as_ref(),
    )
    .await
    .unwrap();
    assert_eq!(
        result,
        HandleUploadResult::UploadCompleted {
            response: "ok".to_string()
        }
    );

    let completed = handler.completed.lock().unwrap();
    assert_eq!(completed.len(), 1);
    assert_eq!(completed[0].blob.url, stored_url);
    assert_eq!(completed[0].token_payload.as_deref(), Some("user-42"));
}

#[tokio::test]
#[serial]
async fn refused_token_stops_the_upload() {
    env::remove_var(READ_WRITE_TOKEN_ENV);

    let handler = Arc::new(AvatarUploads::default());
    let issued = Arc::new(Mutex::new(Vec::new()));
    let mut app = mockito::Server::new_async().await;
    let route = mount_upload_route(&mut app, handler.clone(), issued.clone()).await;

    let mut blob_store = mockito::Server::new_async().await;
    env::set_var("VERCEL_BLOB_API_URL", blob_store.url());
    let put = blob_store
        .mock("PUT", Matcher::Any)
        .expect(0)
        .create_async()
        .await;

    let err = upload(
        "secrets/passwords.txt",
        "hunter2",
        UploadOptions {
            handle_upload_url: Some(format!("{}/api/avatar", app.url())),
            ..Default::default()
        },
    )
    .await
    .unwrap_err();
    env::remove_var("VERCEL_BLOB_API_URL");

    assert_true!(matches!(err, BlobError::TokenRetrieval(_)));
    assert_true!(issued.lock().unwrap().is_empty());
    route.assert_async().await;
    put.assert_async().await;
}

#[tokio::test]
#[serial]
async fn forged_completion_is_rejected() {
    let handler = AvatarUploads::default();
    let body = r#"{"type":"blob.upload-completed","payload":{"blob":{"url":"https://x/a.png","pathname":"a.png","contentType":"image/png","contentDisposition":"inline"}}}"#;
    let mut headers = HashMap::new();
    headers.insert(
        SIGNATURE_HEADER.to_string(),
        signer::sign(body, "vercel_blob_rw_store123_wrong").unwrap(),
    );

    let err = handle_upload(
        HandleUploadOptions {
            token: Some(READ_WRITE_TOKEN),
            headers: &headers,
            body,
        },
        &handler,
    )
    .await
    .unwrap_err();
    assert_true!(matches!(err, BlobError::InvalidSignature()));
    assert_true!(handler.completed.lock().unwrap().is_empty());
}
