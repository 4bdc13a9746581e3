//! Wire-level message envelope types.

use std::{collections::HashMap, fmt};

use {
    serde::{Deserialize, Serialize},
    serde_json::Value,
};

use crate::Error;

/// Free-form metadata attached to requests and responses.
pub type Headers = HashMap<String, Value>;

/// Routing identity of a message: a name and an optional namespace.
///
/// Two different Rust types may share a `Type`; routing only ever looks at
/// the pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Type {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

impl Type {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: None,
        }
    }

    #[must_use]
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// Composite identifier: `namespace.name`, or just `name` when the
    /// namespace is absent or empty.
    pub fn qualified_name(&self) -> String {
        match self.namespace.as_deref() {
            Some(ns) if !ns.is_empty() => format!("{ns}.{}", self.name),
            _ => self.name.clone(),
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.qualified_name())
    }
}

/// A message wrapped with routing metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    /// Unique per submission (UUID v4).
    pub id: String,
    #[serde(rename = "type")]
    pub message_type: Type,
    #[serde(default)]
    pub headers: Headers,
    pub data: Value,
}

impl Request {
    /// Build a request with a fresh id and empty headers.
    pub fn new(message_type: Type, data: Value) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            message_type,
            headers: Headers::new(),
            data,
        }
    }
}

/// The outcome of handling a [`Request`]; `id` matches the request's id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub id: String,
    #[serde(default)]
    pub headers: Headers,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<Error>,
}

impl Response {
    pub fn ok(id: impl Into<String>, data: Value) -> Self {
        Self {
            id: id.into(),
            headers: Headers::new(),
            data: Some(data),
            error: None,
        }
    }

    pub fn failed(id: impl Into<String>, error: Error) -> Self {
        Self {
            id: id.into(),
            headers: Headers::new(),
            data: None,
            error: Some(error),
        }
    }

    /// Neither data nor error is set.
    pub fn is_empty(&self) -> bool {
        self.data.is_none() && self.error.is_none()
    }

    /// Unwrap into the carried data, failing with the carried error.
    /// A response without data yields JSON `null`.
    pub fn into_result(self) -> crate::Result<Value> {
        match self.error {
            Some(error) => Err(error),
            None => Ok(self.data.unwrap_or(Value::Null)),
        }
    }
}
