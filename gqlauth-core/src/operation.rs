//! GraphQL operations and responses.

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{GraphqlError, LinkError, LinkResult};

/// Kind of GraphQL operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    /// Read-only query.
    Query,
    /// Mutation.
    Mutation,
    /// Streaming subscription.
    Subscription,
}

impl OperationKind {
    /// Infer the kind from the leading keyword of a document.
    pub fn infer(document: &str) -> Self {
        let mut rest = document.trim_start();
        // Skip leading `#` comment lines.
        while rest.starts_with('#') {
            rest = rest.split_once('\n').map(|(_, tail)| tail).unwrap_or("");
            rest = rest.trim_start();
        }
        if rest.starts_with("mutation") {
            Self::Mutation
        } else if rest.starts_with("subscription") {
            Self::Subscription
        } else {
            Self::Query
        }
    }
}

/// Per-attempt context of an operation.
///
/// Header names are stored lowercased.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OperationContext {
    headers: BTreeMap<String, String>,
}

impl OperationContext {
    /// Create an empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a header, replacing any previous value.
    pub fn set_header(&mut self, name: impl AsRef<str>, value: impl Into<String>) {
        self.headers
            .insert(name.as_ref().to_ascii_lowercase(), value.into());
    }

    /// Get a header value.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Remove a header.
    pub fn remove_header(&mut self, name: &str) -> Option<String> {
        self.headers.remove(&name.to_ascii_lowercase())
    }

    /// Iterate over all headers.
    pub fn headers(&self) -> impl Iterator<Item = (&str, &str)> {
        self.headers.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// An outbound GraphQL operation.
#[derive(Debug, Clone, PartialEq)]
pub struct Operation {
    /// The GraphQL document.
    pub query: String,
    /// Operation name, when the document holds several.
    pub operation_name: Option<String>,
    /// Variables object.
    pub variables: serde_json::Value,
    /// Operation kind.
    pub kind: OperationKind,
    /// Per-attempt context (headers).
    pub context: OperationContext,
}

impl Operation {
    /// Create an operation, inferring its kind from the document.
    pub fn new(query: impl Into<String>) -> Self {
        let query = query.into();
        let kind = OperationKind::infer(&query);
        Self {
            query,
            operation_name: None,
            variables: serde_json::Value::Object(serde_json::Map::new()),
            kind,
            context: OperationContext::new(),
        }
    }

    /// Set the operation name.
    #[must_use]
    pub fn with_operation_name(mut self, name: impl Into<String>) -> Self {
        self.operation_name = Some(name.into());
        self
    }

    /// Set the variables object.
    #[must_use]
    pub fn with_variables(mut self, variables: serde_json::Value) -> Self {
        self.variables = variables;
        self
    }

    /// Serialize typed variables into the variables object.
    pub fn try_with_variables<V: Serialize>(self, variables: &V) -> serde_json::Result<Self> {
        let value = serde_json::to_value(variables)?;
        Ok(self.with_variables(value))
    }

    /// Build the wire request body.
    pub fn to_request(&self) -> GraphqlRequest<'_> {
        GraphqlRequest {
            query: &self.query,
            operation_name: self.operation_name.as_deref(),
            variables: &self.variables,
        }
    }
}

/// GraphQL-over-HTTP request body (also the `subscribe` payload).
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphqlRequest<'a> {
    /// The GraphQL document.
    pub query: &'a str,
    /// Operation name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation_name: Option<&'a str>,
    /// Variables object.
    pub variables: &'a serde_json::Value,
}

/// A GraphQL response body.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphqlResponse {
    /// Response data.
    #[serde(default)]
    pub data: Option<serde_json::Value>,
    /// Response errors.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<GraphqlError>,
    /// Response extensions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extensions: Option<serde_json::Value>,
}

impl GraphqlResponse {
    /// Create a response carrying only data.
    pub fn from_data(data: serde_json::Value) -> Self {
        Self {
            data: Some(data),
            errors: Vec::new(),
            extensions: None,
        }
    }

    /// Create a response carrying only errors.
    pub fn from_errors(errors: Vec<GraphqlError>) -> Self {
        Self {
            data: None,
            errors,
            extensions: None,
        }
    }

    /// Turn a response with errors into the matching [`LinkError`].
    pub fn into_result(self) -> LinkResult<Self> {
        if self.errors.is_empty() {
            Ok(self)
        } else {
            Err(LinkError::from_graphql_errors(self.errors))
        }
    }

    /// Deserialize the `data` field.
    pub fn data_as<T: DeserializeOwned>(&self) -> LinkResult<T> {
        let data = self
            .data
            .clone()
            .ok_or_else(|| LinkError::protocol("response has no data"))?;
        Ok(serde_json::from_value(data)?)
    }
}
