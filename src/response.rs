//! Response value object: the payload of a successful call plus optional
//! metadata.

use serde::Serialize;
use serde_json::Value;

use crate::error::Result;
use crate::metadata::Metadata;

/// Successful outcome of a call.
///
/// A message of `Value::Null` stands for "no message"; the transport then
/// receives an empty object.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Response {
    message: Value,
    metadata: Option<Metadata>,
}

impl Response {
    /// Create a response carrying `message`.
    pub fn new(message: impl Into<Value>) -> Self {
        Self {
            message: message.into(),
            metadata: None,
        }
    }

    /// Create a response carrying `message` and `metadata`.
    pub fn with_metadata(message: impl Into<Value>, metadata: Metadata) -> Self {
        Self {
            message: message.into(),
            metadata: Some(metadata),
        }
    }

    /// Response without a message.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Serialize `value` into a response.
    pub fn json<T: Serialize>(value: &T) -> Result<Self> {
        Ok(Self::new(serde_json::to_value(value)?))
    }

    /// The raw message as sent.
    pub fn message(&self) -> &Value {
        &self.message
    }

    pub fn metadata(&self) -> Option<&Metadata> {
        self.metadata.as_ref()
    }

    /// Message handed to the transport: the message itself, or `{}` when
    /// there is none.
    pub fn grpc_object(&self) -> Value {
        if self.message.is_null() {
            Value::Object(serde_json::Map::new())
        } else {
            self.message.clone()
        }
    }

    /// Split into message and metadata.
    pub fn into_parts(self) -> (Value, Option<Metadata>) {
        (self.message, self.metadata)
    }
}

impl From<Value> for Response {
    fn from(message: Value) -> Self {
        Response::new(message)
    }
}

/// Conversion of a method implementation's return value into a
/// [`Response`].
pub trait IntoResponse {
    fn into_response(self) -> Response;
}

impl IntoResponse for Response {
    fn into_response(self) -> Response {
        self
    }
}

impl IntoResponse for Value {
    fn into_response(self) -> Response {
        Response::new(self)
    }
}

impl IntoResponse for () {
    fn into_response(self) -> Response {
        Response::empty()
    }
}

impl IntoResponse for Option<Value> {
    fn into_response(self) -> Response {
        self.map(Response::new).unwrap_or_default()
    }
}
