//! Integration tests for the authenticated fetch wrapper.
//!
//! Uses wiremock to verify what actually goes over the wire: the bearer
//! header, body serialization, and the guarantee that no request is sent
//! without a token.

use std::sync::Arc;
use urgify_core::auth::fetch::{AuthenticatedClient, FetchBody, FetchError, FetchOptions, FormPart};
use urgify_core::auth::token::{SessionToken, TokenAcquirer, TokenCache};
use wiremock::matchers::{body_json, body_string, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client_with_cached_token(token: &str) -> AuthenticatedClient {
    let cache = TokenCache::new();
    cache.put(SessionToken::new(token));
    let acquirer = Arc::new(TokenAcquirer::builder().cache(cache).build());
    AuthenticatedClient::new(acquirer)
}

#[tokio::test]
async fn test_bearer_token_is_carried_verbatim() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/settings"))
        .and(header("Authorization", "Bearer tok123"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": true})))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_with_cached_token("tok123");
    let response = client
        .fetch(&format!("{}/api/settings", server.uri()), FetchOptions::get())
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);
}

#[tokio::test]
async fn test_explicit_token_overrides_cache() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/settings"))
        .and(header("Authorization", "Bearer fresh-override"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_with_cached_token("stale-cached");
    let options = FetchOptions::get().with_session_token(SessionToken::new("fresh-override"));
    let response = client
        .fetch(&format!("{}/api/settings", server.uri()), options)
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);
}

#[tokio::test]
async fn test_json_body_sets_content_type() {
    let server = MockServer::start().await;
    let payload = serde_json::json!({"enabled": true, "threshold": 5});
    Mock::given(method("POST"))
        .and(path("/api/settings"))
        .and(header("Content-Type", "application/json"))
        .and(body_json(&payload))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_with_cached_token("tok");
    let response = client
        .fetch(
            &format!("{}/api/settings", server.uri()),
            FetchOptions::post(FetchBody::Json(payload.clone())),
        )
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);
}

#[tokio::test]
async fn test_form_body_is_url_encoded() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/form"))
        .and(header("Content-Type", "application/x-www-form-urlencoded"))
        .and(body_string("name=popup%20one&mode=on"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_with_cached_token("tok");
    let body = FetchBody::Form(vec![
        ("name".to_string(), "popup one".to_string()),
        ("mode".to_string(), "on".to_string()),
    ]);
    let response = client
        .fetch(
            &format!("{}/api/form", server.uri()),
            FetchOptions::post(body),
        )
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);
}

#[tokio::test]
async fn test_multipart_body_carries_boundary_and_parts() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/upload"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_with_cached_token("tok");
    let body = FetchBody::Multipart(vec![
        FormPart::Text {
            name: "caption".to_string(),
            value: "launch banner".to_string(),
        },
        FormPart::File {
            name: "image".to_string(),
            file_name: "pixel.png".to_string(),
            content_type: "image/png".to_string(),
            data: vec![0x89, b'P', b'N', b'G'],
        },
    ]);
    let response = client
        .fetch(
            &format!("{}/api/upload", server.uri()),
            FetchOptions::post(body),
        )
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);

    // The boundary is random, so inspect the recorded request instead of
    // matching the header exactly
    let requests = server.received_requests().await.unwrap();
    let request = &requests[0];
    let content_type = request
        .headers
        .iter()
        .find(|(name, _)| name.as_str().eq_ignore_ascii_case("content-type"))
        .map(|(_, values)| values.last().as_str().to_string())
        .unwrap();
    assert!(
        content_type.starts_with("multipart/form-data; boundary="),
        "unexpected content type: {content_type}"
    );

    let wire_body = String::from_utf8_lossy(&request.body).to_lowercase();
    assert!(wire_body.contains("name=\"caption\""));
    assert!(wire_body.contains("launch banner"));
    assert!(wire_body.contains("filename=\"pixel.png\""));
    assert!(wire_body.contains("content-type: image/png"));
}

#[tokio::test]
async fn test_bytes_body_passes_through_with_declared_content_type() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/import"))
        .and(header("Content-Type", "text/csv"))
        .and(body_string("sku,qty\nSHIRT-1,3\n"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_with_cached_token("tok");
    let body = FetchBody::Bytes {
        content_type: Some("text/csv".to_string()),
        data: b"sku,qty\nSHIRT-1,3\n".to_vec(),
    };
    let response = client
        .fetch(
            &format!("{}/api/import", server.uri()),
            FetchOptions::post(body),
        )
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);
}

#[tokio::test]
async fn test_bytes_body_without_content_type_sets_no_header() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/import"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_with_cached_token("tok");
    let body = FetchBody::Bytes {
        content_type: None,
        data: vec![0x00, 0xff, 0x10, 0x7f],
    };
    client
        .fetch(
            &format!("{}/api/import", server.uri()),
            FetchOptions::post(body),
        )
        .await
        .unwrap();

    let requests = server.received_requests().await.unwrap();
    let request = &requests[0];
    assert!(request
        .headers
        .iter()
        .all(|(name, _)| !name.as_str().eq_ignore_ascii_case("content-type")));
    assert_eq!(request.body, vec![0x00, 0xff, 0x10, 0x7f]);
}

#[tokio::test]
async fn test_custom_headers_are_merged() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/settings"))
        .and(header("Authorization", "Bearer tok"))
        .and(header("X-Request-Source", "admin-ui"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_with_cached_token("tok");
    let options = FetchOptions::get().with_header("X-Request-Source", "admin-ui");
    let response = client
        .fetch(&format!("{}/api/settings", server.uri()), options)
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);
}

#[tokio::test]
async fn test_no_token_fails_before_any_network_io() {
    // An acquirer with no bridge, no cache entry, no initial token
    let acquirer = Arc::new(TokenAcquirer::builder().build());
    let client = AuthenticatedClient::new(acquirer);

    // The URL is unroutable; reaching the network would fail differently
    let error = client
        .fetch("http://192.0.2.1/api/settings", FetchOptions::get())
        .await
        .unwrap_err();
    assert!(matches!(error, FetchError::SessionTokenUnavailable));
}

#[tokio::test]
async fn test_chain_acquisition_populates_cache_for_later_requests() {
    use urgify_core::auth::token::source::BridgeFuture;
    use urgify_core::HostBridge;

    struct FixedBridge;
    impl HostBridge for FixedBridge {
        fn id_token(&self) -> BridgeFuture<'_> {
            Box::pin(async { Ok("bridge-tok".to_string()) })
        }
    }

    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(header("Authorization", "Bearer bridge-tok"))
        .respond_with(ResponseTemplate::new(200))
        .expect(2)
        .mount(&server)
        .await;

    let acquirer = Arc::new(
        TokenAcquirer::builder()
            .host_bridge(Arc::new(FixedBridge))
            .build(),
    );
    let client = AuthenticatedClient::new(Arc::clone(&acquirer));

    client
        .fetch(&format!("{}/a", server.uri()), FetchOptions::get())
        .await
        .unwrap();
    // The first fetch walked the chain; the second short-circuits on cache
    assert!(!acquirer.cache().is_empty());
    client
        .fetch(&format!("{}/b", server.uri()), FetchOptions::get())
        .await
        .unwrap();
}
