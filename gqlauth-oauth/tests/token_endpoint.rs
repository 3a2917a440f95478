//! Token endpoint behaviour against a mock identity provider.

use std::sync::Arc;
use std::time::Duration;

use gqlauth_oauth::{
    AuthError, Credential, CredentialStore, DiscoveryDocument, OAuthConfig, TokenClient,
};
use wiremock::matchers::{body_string, body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config_for(server: &MockServer) -> OAuthConfig {
    OAuthConfig::new("mobile", format!("{}/token", server.uri())).with_redirect_uri("app://redirect")
}

#[tokio::test]
async fn exchange_code_posts_form_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .and(header("accept", "application/json"))
        .and(header("content-type", "application/x-www-form-urlencoded"))
        .and(body_string(
            "client_id=mobile&redirect_uri=app%3A%2F%2Fredirect&code=c0de\
             &grant_type=authorization_code&code_verifier=v3r",
        ))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": "A1",
            "refresh_token": "R1",
            "expires_in": 300
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = TokenClient::new(config_for(&server)).unwrap();
    let tokens = client.exchange_code("c0de", Some("v3r")).await.unwrap();

    assert_eq!(tokens.access_token.as_deref(), Some("A1"));
    assert_eq!(tokens.refresh_token.as_deref(), Some("R1"));
    assert_eq!(tokens.expires_in, Some(300));
}

#[tokio::test]
async fn missing_verifier_is_sent_as_null() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_string_contains("code_verifier=null"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({"access_token": "A1"})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = TokenClient::new(config_for(&server)).unwrap();
    client.exchange_code("code", None).await.unwrap();
}

#[tokio::test]
async fn refresh_uses_refresh_grant() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string(
            "client_id=mobile&refresh_token=R1&grant_type=refresh_token",
        ))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": "A2",
            "refresh_token": "R2"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = TokenClient::new(config_for(&server)).unwrap();
    let tokens = client.refresh_token("R1").await.unwrap();
    assert_eq!(tokens.access_token.as_deref(), Some("A2"));
}

#[tokio::test]
async fn rejected_refresh_surfaces_description() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
            "error": "invalid_grant",
            "error_description": "Token is not active"
        })))
        .mount(&server)
        .await;

    let client = TokenClient::new(config_for(&server)).unwrap();
    let err = client.refresh_token("R1").await.unwrap_err();
    assert_eq!(err, AuthError::token_endpoint(400, "Token is not active"));
}

#[tokio::test]
async fn slow_endpoint_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({"access_token": "A2"}))
                .set_delay(Duration::from_millis(500)),
        )
        .mount(&server)
        .await;

    let config = config_for(&server).with_request_timeout(Duration::from_millis(50));
    let client = TokenClient::new(config).unwrap();
    assert_eq!(client.refresh_token("R1").await, Err(AuthError::Timeout));
}

#[tokio::test]
async fn unreachable_endpoint_is_network_error() {
    let config = OAuthConfig::new("mobile", "http://127.0.0.1:9/token")
        .with_request_timeout(Duration::from_secs(2));
    let client = TokenClient::new(config).unwrap();
    assert!(client.refresh_token("R1").await.unwrap_err().is_network());
}

#[tokio::test]
async fn concurrent_store_refreshes_hit_endpoint_once() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({
                    "access_token": "A2",
                    "refresh_token": "R2",
                    "expires_in": 300
                }))
                .set_delay(Duration::from_millis(100)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = Arc::new(TokenClient::new(config_for(&server)).unwrap());
    let store = CredentialStore::new(client);
    store.set(Credential::new("A1", "R1"));

    let results = futures::future::join_all(
        (0..5).map(|_| {
            let store = store.clone();
            async move { store.refresh_after_failure(Some("A1")).await }
        }),
    )
    .await;

    for result in results {
        assert_eq!(result.unwrap().access_token.as_deref(), Some("A2"));
    }
    assert_eq!(store.get().refresh_token.as_deref(), Some("R2"));
    assert_eq!(store.exchange_count(), 1);
}

#[tokio::test]
async fn discovery_document_builds_config() {
    let server = MockServer::start().await;
    let issuer = format!("{}/realms/app", server.uri());
    Mock::given(method("GET"))
        .and(path("/realms/app/.well-known/openid-configuration"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "issuer": issuer,
            "authorization_endpoint": format!("{}/protocol/openid-connect/auth", issuer),
            "token_endpoint": format!("{}/protocol/openid-connect/token", issuer),
            "jwks_uri": format!("{}/protocol/openid-connect/certs", issuer)
        })))
        .mount(&server)
        .await;

    let http = reqwest::Client::new();
    let doc = DiscoveryDocument::fetch(&http, &format!("{}/", issuer))
        .await
        .unwrap();
    let config = doc.to_config("mobile");

    assert_eq!(
        config.token_url,
        format!("{}/protocol/openid-connect/token", issuer)
    );
}
