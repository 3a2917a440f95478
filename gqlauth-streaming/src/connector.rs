//! Socket seams used by the channel driver.

use async_trait::async_trait;

use crate::error::ChannelResult;

/// An open, message-framed socket carrying text frames.
///
/// `recv` must be cancel safe: the driver polls it inside `select!`.
#[async_trait]
pub trait FrameSocket: Send {
    /// Send one text frame.
    async fn send(&mut self, text: String) -> ChannelResult<()>;

    /// Receive the next text frame, or `None` once the peer closed.
    async fn recv(&mut self) -> Option<ChannelResult<String>>;

    /// Close the socket.
    async fn close(&mut self) -> ChannelResult<()>;
}

/// Opens sockets for the channel.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Open a socket to `url`.
    async fn connect(&self, url: &str) -> ChannelResult<Box<dyn FrameSocket>>;
}

#[cfg(feature = "websocket")]
pub use self::ws::{WsConnector, WsSocket};

#[cfg(feature = "websocket")]
mod ws {
    use async_trait::async_trait;
    use futures::{SinkExt, StreamExt};
    use tokio::net::TcpStream;
    use tokio_tungstenite::tungstenite::client::IntoClientRequest;
    use tokio_tungstenite::tungstenite::http::{HeaderName, HeaderValue};
    use tokio_tungstenite::tungstenite::protocol::Message as WsMessage;
    use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
    use tracing::debug;

    use super::{Connector, FrameSocket};
    use crate::error::{ChannelError, ChannelResult};
    use crate::protocol::SUBPROTOCOL;

    /// Connector over tokio-tungstenite, negotiating `graphql-transport-ws`.
    #[derive(Debug, Clone, Default)]
    pub struct WsConnector {
        headers: Vec<(String, String)>,
    }

    impl WsConnector {
        /// Create a connector.
        pub fn new() -> Self {
            Self::default()
        }

        /// Add a header to the upgrade request.
        #[must_use]
        pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
            self.headers.push((key.into(), value.into()));
            self
        }
    }

    #[async_trait]
    impl Connector for WsConnector {
        async fn connect(&self, url: &str) -> ChannelResult<Box<dyn FrameSocket>> {
            let mut request = url
                .into_client_request()
                .map_err(|e| ChannelError::Connect(e.to_string()))?;
            let headers = request.headers_mut();
            headers.insert(
                "Sec-WebSocket-Protocol",
                HeaderValue::from_static(SUBPROTOCOL),
            );
            for (key, value) in &self.headers {
                let name = HeaderName::from_bytes(key.as_bytes())
                    .map_err(|e| ChannelError::Connect(e.to_string()))?;
                let value =
                    HeaderValue::from_str(value).map_err(|e| ChannelError::Connect(e.to_string()))?;
                headers.insert(name, value);
            }

            let (stream, response) = connect_async(request)
                .await
                .map_err(|e| ChannelError::Connect(e.to_string()))?;
            debug!(status = %response.status(), "WebSocket upgraded");

            Ok(Box::new(WsSocket { inner: stream }))
        }
    }

    /// A tokio-tungstenite socket.
    pub struct WsSocket {
        inner: WebSocketStream<MaybeTlsStream<TcpStream>>,
    }

    #[async_trait]
    impl FrameSocket for WsSocket {
        async fn send(&mut self, text: String) -> ChannelResult<()> {
            self.inner
                .send(WsMessage::Text(text))
                .await
                .map_err(|e| ChannelError::Socket(e.to_string()))
        }

        async fn recv(&mut self) -> Option<ChannelResult<String>> {
            loop {
                match self.inner.next().await? {
                    Ok(WsMessage::Text(text)) => return Some(Ok(text)),
                    Ok(WsMessage::Binary(data)) => {
                        return Some(
                            String::from_utf8(data)
                                .map_err(|e| ChannelError::Protocol(e.to_string())),
                        );
                    }
                    Ok(WsMessage::Close(frame)) => {
                        debug!(?frame, "Server closed the socket");
                        return None;
                    }
                    Ok(_) => continue,
                    Err(e) => return Some(Err(ChannelError::Socket(e.to_string()))),
                }
            }
        }

        async fn close(&mut self) -> ChannelResult<()> {
            self.inner
                .close(None)
                .await
                .map_err(|e| ChannelError::Socket(e.to_string()))
        }
    }
}
