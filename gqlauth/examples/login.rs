//! Interactive login followed by a person subscription.
//!
//! Opens nothing itself: it prints the authorization URL, waits for the
//! `code` query parameter of the redirect on stdin, then logs in and streams
//! `person` rows.
//!
//! Run with:
//! ```bash
//! GQLAUTH_CLIENT_ID=mobile \
//! GQLAUTH_AUTH_URL=https://id.example.com/realms/app/protocol/openid-connect/auth \
//! GQLAUTH_TOKEN_URL=https://id.example.com/realms/app/protocol/openid-connect/token \
//! GQLAUTH_REDIRECT_URI=app://redirect \
//! GQLAUTH_GRAPHQL_URL=https://api.example.com/v1/graphql \
//! GQLAUTH_GRAPHQL_WS_URL=wss://api.example.com/v1/graphql \
//! RUST_LOG=gqlauth=debug cargo run --example login
//! ```

use futures::StreamExt;
use gqlauth::oauth::PkceContext;
use gqlauth::prelude::*;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let client = GqlClient::new(ClientSettings::from_env()?)?;

    let pkce = PkceContext::new();
    client.login().login_requested()?;
    println!("Open this URL and paste the `code` parameter of the redirect:\n");
    println!("{}\n", client.authorization_url(&pkce)?);

    let mut line = String::new();
    BufReader::new(tokio::io::stdin()).read_line(&mut line).await?;
    let code = line.trim();
    if code.is_empty() {
        let err = client.login().denied(None);
        anyhow::bail!(err);
    }

    let person = client
        .login()
        .complete(code, Some(&pkce.code_verifier))
        .await?;
    println!(
        "Logged in as {} {}",
        person.given_name.as_deref().unwrap_or("?"),
        person.family_name.as_deref().unwrap_or("?")
    );

    let mut events = client.events();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            println!("channel: {:?}", event);
        }
    });

    let mut people = client.subscribe(Operation::new(
        "subscription People { person(limit: 10) { id given_name family_name } }",
    ))?;
    while let Some(result) = people.next().await {
        match result {
            Ok(response) => println!("{}", serde_json::to_string_pretty(&response.data)?),
            Err(err) => {
                println!("subscription ended: {}", err);
                break;
            }
        }
    }

    client.close().await;
    Ok(())
}
