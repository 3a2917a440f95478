//! # gqlauth-streaming
//!
//! GraphQL subscriptions over `graphql-transport-ws` with a bounded
//! reconnect policy and per-connection credentials.
//!
//! ## Core Concepts
//!
//! - **[`SubscriptionChannel`]**: lazily connected channel owning one socket
//! - **[`Subscription`]**: stream of results for one operation
//! - **[`ChannelEvent`]**: connected, disconnected, reconnecting, reconnected, error
//! - **[`Connector`]** / **[`FrameSocket`]**: socket seams, with a
//!   tokio-tungstenite implementation behind the `websocket` feature
//!
//! ## Example
//!
//! ```ignore
//! use futures::StreamExt;
//! use gqlauth_core::Operation;
//! use gqlauth_streaming::{ChannelConfig, SubscriptionChannel, WsConnector};
//!
//! let channel = SubscriptionChannel::new(
//!     ChannelConfig::new("wss://api.example.com/v1/graphql"),
//!     store.clone(),
//!     WsConnector::new(),
//! );
//!
//! let mut people = channel.subscribe(Operation::new("subscription { person { id } }"))?;
//! while let Some(result) = people.next().await {
//!     println!("{:?}", result?.data);
//! }
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod backoff;
pub mod channel;
pub mod connector;
pub mod error;
pub mod protocol;

// Re-exports
pub use backoff::ReconnectPolicy;
pub use channel::{
    ChannelConfig, ChannelEvent, ChannelState, Subscription, SubscriptionChannel,
    DEFAULT_CONNECTION_TIMEOUT, DEFAULT_INACTIVITY_TIMEOUT, DEFAULT_RECONNECTION_ATTEMPTS,
};
#[cfg(feature = "websocket")]
#[cfg_attr(docsrs, doc(cfg(feature = "websocket")))]
pub use connector::{WsConnector, WsSocket};
pub use connector::{Connector, FrameSocket};
pub use error::{ChannelError, ChannelResult};
pub use protocol::{ClientMessage, ServerMessage, SubscribePayload, SUBPROTOCOL};
