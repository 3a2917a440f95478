//! Settings filled from an issuer's discovery document.

use std::collections::HashMap;

use gqlauth::{ClientError, ClientSettings};
use pretty_assertions::assert_eq;
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn lookup(pairs: Vec<(&str, String)>) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = pairs
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();
    move |key| map.get(key).cloned()
}

fn base_vars(issuer: &str) -> Vec<(&'static str, String)> {
    vec![
        ("GQLAUTH_CLIENT_ID", "mobile".to_string()),
        ("GQLAUTH_ISSUER_URL", issuer.to_string()),
        ("GQLAUTH_REDIRECT_URI", "app://redirect".to_string()),
        ("GQLAUTH_GRAPHQL_URL", "https://api.example.com/v1/graphql".to_string()),
        ("GQLAUTH_GRAPHQL_WS_URL", "wss://api.example.com/v1/graphql".to_string()),
    ]
}

async fn mount_discovery(server: &MockServer, issuer: &str) {
    Mock::given(method("GET"))
        .and(path("/realms/app/.well-known/openid-configuration"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "issuer": issuer,
            "authorization_endpoint": format!("{}/protocol/openid-connect/auth", issuer),
            "token_endpoint": format!("{}/protocol/openid-connect/token", issuer),
            "userinfo_endpoint": format!("{}/protocol/openid-connect/userinfo", issuer)
        })))
        .expect(1)
        .mount(server)
        .await;
}

#[tokio::test]
async fn issuer_supplies_token_and_auth_endpoints() {
    let server = MockServer::start().await;
    let issuer = format!("{}/realms/app", server.uri());
    mount_discovery(&server, &issuer).await;

    let settings = ClientSettings::from_lookup_discovered(lookup(base_vars(&issuer)))
        .await
        .unwrap();

    assert_eq!(settings.issuer_url.as_ref().map(|u| u.as_str()), Some(issuer.as_str()));
    assert_eq!(
        settings.oauth_config().token_url,
        format!("{}/protocol/openid-connect/token", issuer)
    );
    assert_eq!(
        settings.oauth_config().auth_url,
        Some(format!("{}/protocol/openid-connect/auth", issuer))
    );
    assert_eq!(settings.oauth_config().redirect_uri, "app://redirect");
}

#[tokio::test]
async fn explicit_token_url_overrides_discovery() {
    let server = MockServer::start().await;
    let issuer = format!("{}/realms/app", server.uri());
    mount_discovery(&server, &issuer).await;

    let mut vars = base_vars(&issuer);
    vars.push(("GQLAUTH_TOKEN_URL", "https://proxy.example.com/token".to_string()));
    let settings = ClientSettings::from_lookup_discovered(lookup(vars))
        .await
        .unwrap();

    assert_eq!(settings.token_url.as_str(), "https://proxy.example.com/token");
    assert_eq!(
        settings.auth_url.as_ref().map(|u| u.to_string()),
        Some(format!("{}/protocol/openid-connect/auth", issuer))
    );
}

#[tokio::test]
async fn unknown_issuer_is_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404).set_body_string("Realm does not exist"))
        .mount(&server)
        .await;

    let issuer = format!("{}/realms/missing", server.uri());
    let err = ClientSettings::from_lookup_discovered(lookup(base_vars(&issuer)))
        .await
        .unwrap_err();

    assert!(matches!(err, ClientError::Auth(_)));
}
