//! # gqlauth-link
//!
//! Request pipeline for authenticated GraphQL calls.
//!
//! - [`HttpLink`]: terminal stage posting operations over HTTP
//! - [`AuthLink`]: attaches the bearer token and role, refreshing and
//!   resubmitting once when the server answers `invalid-jwt`
//!
//! ## Example
//!
//! ```ignore
//! use gqlauth_link::{AuthLink, HttpLink, HttpLinkConfig};
//! use gqlauth_core::{GraphqlTransport, Operation};
//!
//! let http = HttpLink::new(HttpLinkConfig::new("https://api.example.com/v1/graphql"))?;
//! let link = AuthLink::new(http, store.clone());
//!
//! let response = link.execute(Operation::new("query { me { id } }")).await?;
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod auth;
pub mod http;

pub use auth::{AuthLink, AuthOutcome};
pub use http::{HttpLink, HttpLinkConfig};
