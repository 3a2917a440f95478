//! `graphql-transport-ws` frames.

use gqlauth_core::{
    bearer, GraphqlError, GraphqlResponse, Operation, AUTHORIZATION_HEADER, ROLE_HEADER,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// WebSocket subprotocol negotiated with the server.
pub const SUBPROTOCOL: &str = "graphql-transport-ws";

/// Payload of a `subscribe` frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscribePayload {
    /// The GraphQL document.
    pub query: String,
    /// Operation name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation_name: Option<String>,
    /// Variables object.
    #[serde(default)]
    pub variables: Value,
}

impl From<&Operation> for SubscribePayload {
    fn from(operation: &Operation) -> Self {
        Self {
            query: operation.query.clone(),
            operation_name: operation.operation_name.clone(),
            variables: operation.variables.clone(),
        }
    }
}

/// Frames sent by the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Opens the session with connection parameters.
    ConnectionInit {
        /// Connection parameters.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        payload: Option<Value>,
    },
    /// Keepalive request.
    Ping {
        /// Optional payload.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        payload: Option<Value>,
    },
    /// Keepalive response.
    Pong {
        /// Optional payload.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        payload: Option<Value>,
    },
    /// Starts an operation.
    Subscribe {
        /// Client-chosen operation id.
        id: String,
        /// The operation.
        payload: SubscribePayload,
    },
    /// Stops an operation.
    Complete {
        /// Operation id.
        id: String,
    },
}

/// Frames sent by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Accepts the session.
    ConnectionAck {
        /// Optional payload.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        payload: Option<Value>,
    },
    /// Keepalive request.
    Ping {
        /// Optional payload.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        payload: Option<Value>,
    },
    /// Keepalive response.
    Pong {
        /// Optional payload.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        payload: Option<Value>,
    },
    /// One result of an operation.
    Next {
        /// Operation id.
        id: String,
        /// Execution result.
        payload: GraphqlResponse,
    },
    /// The operation failed before producing results.
    Error {
        /// Operation id.
        id: String,
        /// Errors.
        payload: Vec<GraphqlError>,
    },
    /// The operation finished.
    Complete {
        /// Operation id.
        id: String,
    },
}

impl ClientMessage {
    /// Encode as a text frame.
    pub fn to_text(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

impl ServerMessage {
    /// Decode a text frame.
    pub fn from_text(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }
}

/// Connection parameters carrying the bearer token and role.
pub fn init_payload(token: &str, role: Option<&str>) -> Value {
    let mut headers = Map::new();
    headers.insert(AUTHORIZATION_HEADER.to_string(), Value::String(bearer(token)));
    if let Some(role) = role {
        headers.insert(ROLE_HEADER.to_string(), Value::String(role.to_string()));
    }
    json!({ "headers": headers })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_init_payload() {
        assert_eq!(
            init_payload("A1", Some("admin")),
            json!({"headers": {"authorization": "Bearer A1", "x-hasura-role": "admin"}})
        );
        assert_eq!(
            init_payload("A1", None),
            json!({"headers": {"authorization": "Bearer A1"}})
        );
    }

    #[test]
    fn test_client_frames() {
        let subscribe = ClientMessage::Subscribe {
            id: "1".into(),
            payload: SubscribePayload::from(
                &Operation::new("subscription OnPerson { person { id } }")
                    .with_operation_name("OnPerson"),
            ),
        };
        assert_eq!(
            serde_json::to_value(&subscribe).unwrap(),
            json!({
                "type": "subscribe",
                "id": "1",
                "payload": {
                    "query": "subscription OnPerson { person { id } }",
                    "operationName": "OnPerson",
                    "variables": {}
                }
            })
        );
        assert_eq!(
            ClientMessage::ConnectionInit { payload: None }.to_text().unwrap(),
            r#"{"type":"connection_init"}"#
        );
        assert_eq!(
            ClientMessage::Complete { id: "7".into() }.to_text().unwrap(),
            r#"{"type":"complete","id":"7"}"#
        );
    }

    #[test]
    fn test_server_frames() {
        assert_eq!(
            ServerMessage::from_text(r#"{"type":"connection_ack"}"#).unwrap(),
            ServerMessage::ConnectionAck { payload: None }
        );

        let next = ServerMessage::from_text(
            r#"{"type":"next","id":"1","payload":{"data":{"person":[{"id":3}]}}}"#,
        )
        .unwrap();
        assert_eq!(
            next,
            ServerMessage::Next {
                id: "1".into(),
                payload: GraphqlResponse::from_data(json!({"person": [{"id": 3}]})),
            }
        );

        let error = ServerMessage::from_text(
            r#"{"type":"error","id":"2","payload":[{"message":"no such field"}]}"#,
        )
        .unwrap();
        assert!(matches!(
            error,
            ServerMessage::Error { id, payload } if id == "2" && payload.len() == 1
        ));
    }

    #[test]
    fn test_unknown_frame_is_rejected() {
        assert!(ServerMessage::from_text(r#"{"type":"ka"}"#).is_err());
    }
}
