//! # gqlauth - Authenticated GraphQL for Rust clients
//!
//! gqlauth logs a user in against an OAuth2/OIDC identity provider and talks
//! to a Hasura-style GraphQL API with the resulting credential.
//!
//! ## Quick Start
//!
//! ```ignore
//! use gqlauth::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = GqlClient::new(ClientSettings::from_env()?)?;
//!
//!     // `code` and `verifier` come from the authorization redirect.
//!     let person = client.login().complete(&code, Some(&verifier)).await?;
//!     println!("Hello {:?}", person.given_name);
//!
//!     let response = client.execute(Operation::new("query { person { id } }")).await?;
//!     println!("{:?}", response.data);
//!     Ok(())
//! }
//! ```
//!
//! ## Key Features
//!
//! - **Refreshing HTTP link**: bearer and role headers on every operation; an
//!   `invalid-jwt` answer triggers one shared refresh and one resubmission
//! - **Resilient subscriptions**: lazily opened `graphql-transport-ws`
//!   channel with a fresh token per connection and a bounded reconnect budget
//! - **Single-flight credential store** shared by both paths
//! - **Login session** as an explicit state machine ending in the person upsert
//!
//! ## Feature Flags
//!
//! | Feature | Description | Default |
//! |---------|-------------|--------|
//! | `websocket` | tokio-tungstenite connector for subscriptions | ✅ |
//!
//! ## Architecture
//!
//! - [`gqlauth_core`] - operations, responses and the error taxonomy
//! - [`gqlauth_oauth`] - token endpoint, claims and the credential store
//! - [`gqlauth_link`] - HTTP and auth links
//! - [`gqlauth_streaming`] - the subscription channel

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![deny(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod client;
pub mod error;
pub mod flow;
pub mod person;
pub mod session;
pub mod settings;

// ============================================================================
// Crate Re-exports
// ============================================================================

/// Operations, responses and errors.
pub use gqlauth_core as core;

/// Identity provider plumbing.
pub use gqlauth_oauth as oauth;

/// Request links.
pub use gqlauth_link as link;

/// Subscriptions.
pub use gqlauth_streaming as streaming;

// ============================================================================
// Flat Re-exports
// ============================================================================

pub use client::{GqlClient, GqlClientBuilder};
pub use error::{
    authentication_message, ClientError, ClientResult, SessionError, AUTHENTICATION_ERROR,
    SOMETHING_WENT_WRONG,
};
pub use flow::LoginFlow;
pub use person::{parse_identity, IdentityRecord, IdentityVariables, Person, RecordId, INSERT_IDENTITY};
pub use session::{SessionEvent, SessionMachine, SessionState};
pub use settings::{ClientSettings, ENV_PREFIX};

pub use gqlauth_core::{
    AuthError, GraphqlError, GraphqlResponse, GraphqlTransport, LinkError, Operation,
    OperationKind,
};
pub use gqlauth_link::{AuthLink, AuthOutcome, HttpLink, HttpLinkConfig};
pub use gqlauth_oauth::{
    Credential, CredentialStore, IdentityClaims, OAuthConfig, PkceContext, TokenClient,
    TokenResponse,
};
pub use gqlauth_streaming::{
    ChannelConfig, ChannelError, ChannelEvent, ChannelState, ReconnectPolicy, Subscription,
    SubscriptionChannel,
};

/// Common imports.
pub mod prelude {
    pub use crate::{
        ChannelEvent, ClientError, ClientResult, ClientSettings, GqlClient, GraphqlResponse,
        LinkError, LoginFlow, Operation, Person, SessionState,
    };
}
