//! # gqlauth-oauth
//!
//! Identity provider plumbing for gqlauth.
//!
//! - [`OAuthConfig`]: client id, token endpoint, redirect URI, timeouts
//! - [`TokenClient`]: authorization-code and refresh-token exchanges
//! - [`CredentialStore`]: the process-wide [`Credential`] with a single-flight refresh
//! - [`IdentityClaims`]: unverified decoding of OIDC token claims
//! - [`PkceContext`]: verifier, challenge, state and nonce for an authorization request
//! - [`form_url_encode`]: form bodies for the token endpoint
//!
//! Note: this crate does NOT open browsers or handle redirects. The
//! authorization code is an input.
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use gqlauth_oauth::{CredentialStore, OAuthConfig, TokenClient};
//!
//! let config = OAuthConfig::new("mobile", "https://id.example.com/realms/app/protocol/openid-connect/token")
//!     .with_redirect_uri("app://redirect");
//! let client = Arc::new(TokenClient::new(config)?);
//! let store = CredentialStore::new(client.clone());
//!
//! let tokens = client.exchange_code(&code, Some(&verifier)).await?;
//! store.set_from_response(&tokens)?;
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod claims;
pub mod client;
pub mod config;
pub mod credential;
pub mod form;
pub mod pkce;
pub mod token;

pub use claims::{Audience, IdentityClaims};
pub use client::{DiscoveryDocument, TokenClient, TokenRefresher};
pub use config::{OAuthConfig, DEFAULT_REQUEST_TIMEOUT};
pub use credential::{Credential, CredentialStore};
pub use form::form_url_encode;
pub use gqlauth_core::AuthError;
pub use pkce::{code_challenge, PkceContext};
pub use token::TokenResponse;
