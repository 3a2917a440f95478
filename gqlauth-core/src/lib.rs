//! # gqlauth-core
//!
//! Core types for the gqlauth transport layer.
//!
//! - **Operations**: [`Operation`] with a per-attempt [`OperationContext`]
//! - **Responses**: [`GraphqlResponse`] and its classification into [`LinkError`]
//! - **Errors**: [`LinkError`], [`AuthError`], [`GraphqlError`]
//! - **Seams**: [`GraphqlTransport`] and [`AccessTokenSource`]
//!
//! ## Example
//!
//! ```rust
//! use gqlauth_core::{GraphqlResponse, LinkError, Operation, OperationKind};
//!
//! let op = Operation::new("mutation insert_identity { affected_rows }");
//! assert_eq!(op.kind, OperationKind::Mutation);
//!
//! let body = serde_json::json!({
//!     "errors": [{"message": "JWTExpired", "extensions": {"code": "invalid-jwt"}}]
//! });
//! let response: GraphqlResponse = serde_json::from_value(body).unwrap();
//! assert!(matches!(response.into_result(), Err(LinkError::Auth { .. })));
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod error;
pub mod operation;
pub mod transport;

// Re-exports
pub use error::{
    AuthError, GraphqlError, GraphqlErrorLocation, LinkError, LinkResult, TransportError,
    INVALID_JWT_CODE,
};
pub use operation::{GraphqlRequest, GraphqlResponse, Operation, OperationContext, OperationKind};
pub use transport::{
    bearer, AccessTokenSource, GraphqlTransport, StaticToken, AUTHORIZATION_HEADER, DEFAULT_ROLE,
    ROLE_HEADER,
};
