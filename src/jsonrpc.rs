//! A subset of JSON-RPC types used by the method handlers.

pub use self::{
    error::{Error, ErrorCode},
    pending::ServerRequests,
};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::fmt::{self, Display, Formatter};

mod error;
mod pending;

/// A specialized [`Result`] error type for JSON-RPC handlers.
///
/// [`Result`]: enum@std::result::Result
pub type Result<T> = std::result::Result<T, Error>;

/// A unique ID used to correlate requests and responses together.
#[derive(Clone, Debug, Eq, Hash, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum Id {
    /// Numeric ID.
    Number(i64),
    /// String ID.
    String(String),
    /// Null ID.
    ///
    /// While `null` is considered a valid request ID by the JSON-RPC 2.0 specification, its use is
    /// _strongly_ discouraged because the specification also uses a `null` value to indicate an
    /// unknown ID in the [`Response`] object.
    Null,
}

impl Display for Id {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            Id::Number(id) => Display::fmt(id, f),
            Id::String(id) => fmt::Debug::fmt(id, f),
            Id::Null => f.write_str("null"),
        }
    }
}

impl From<lsp::NumberOrString> for Id {
    fn from(id: lsp::NumberOrString) -> Self {
        match id {
            lsp::NumberOrString::Number(id) => Id::Number(id.into()),
            lsp::NumberOrString::String(id) => Id::String(id),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
struct Version;

impl<'de> Deserialize<'de> for Version {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let version = String::deserialize(deserializer)?;
        if version == "2.0" {
            Ok(Version)
        } else {
            Err(de::Error::custom(format!("expected JSON-RPC version \"2.0\", found {:?}", version)))
        }
    }
}

impl Serialize for Version {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str("2.0")
    }
}

/// An incoming JSON-RPC request or notification.
///
/// A message without an `id` is a notification and never produces a [`Response`]. An explicit
/// `"id": null` is kept as [`Id::Null`] and answered like any other request.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct Request {
    jsonrpc: Version,
    method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    params: Option<Value>,
    #[serde(default, deserialize_with = "deserialize_some", skip_serializing_if = "Option::is_none")]
    id: Option<Id>,
}

/// Distinguishes a present `null` from an absent field, which `#[serde(default)]` turns into `None`.
fn deserialize_some<'de, T, D>(deserializer: D) -> std::result::Result<Option<T>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    T::deserialize(deserializer).map(Some)
}

impl Request {
    /// Creates a new request which expects a response.
    pub fn new<M: Into<String>>(id: Id, method: M, params: Option<Value>) -> Self {
        Request {
            jsonrpc: Version,
            method: method.into(),
            params,
            id: Some(id),
        }
    }

    /// Creates a new notification, which never receives a response.
    pub fn notification<M: Into<String>>(method: M, params: Option<Value>) -> Self {
        Request {
            jsonrpc: Version,
            method: method.into(),
            params,
            id: None,
        }
    }

    /// Returns the name of the method to be invoked.
    pub fn method(&self) -> &str {
        &self.method
    }

    /// Returns the request ID, or `None` if this is a notification.
    pub fn id(&self) -> Option<&Id> {
        self.id.as_ref()
    }

    /// Returns the method parameters, if any.
    pub fn params(&self) -> Option<&Value> {
        self.params.as_ref()
    }

    /// Splits the request into its method name, parameters and ID.
    pub fn into_parts(self) -> (String, Option<Value>, Option<Id>) {
        (self.method, self.params, self.id)
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
enum Kind {
    Ok { result: Value },
    Err { error: Error },
}

/// A successful or failed JSON-RPC response.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct Response {
    jsonrpc: Version,
    #[serde(flatten)]
    kind: Kind,
    id: Id,
}

impl Response {
    /// Creates a new successful response from a request ID and `Error` object.
    pub fn ok(id: Id, result: Value) -> Self {
        Response {
            jsonrpc: Version,
            kind: Kind::Ok { result },
            id,
        }
    }

    /// Creates a new error response from a request ID and `Error` object.
    ///
    /// A missing `id` is reported as `null`.
    pub fn error(id: Option<Id>, error: Error) -> Self {
        Response {
            jsonrpc: Version,
            kind: Kind::Err { error },
            id: id.unwrap_or(Id::Null),
        }
    }

    /// Creates a new response from a request ID and either an `Ok(Value)` or `Err(Error)` body.
    pub fn from_parts(id: Id, body: Result<Value>) -> Self {
        match body {
            Ok(result) => Response::ok(id, result),
            Err(error) => Response::error(Some(id), error),
        }
    }

    /// Splits the response into a request ID paired with either an `Ok(Value)` or `Err(Error)`.
    pub fn into_parts(self) -> (Id, Result<Value>) {
        match self.kind {
            Kind::Ok { result } => (self.id, Ok(result)),
            Kind::Err { error } => (self.id, Err(error)),
        }
    }

    /// Returns `true` if the response indicates success.
    pub fn is_ok(&self) -> bool {
        matches!(self.kind, Kind::Ok { .. })
    }

    /// Returns the corresponding request ID.
    pub fn id(&self) -> &Id {
        &self.id
    }

    /// Returns the `result` value, if it exists.
    pub fn result(&self) -> Option<&Value> {
        match &self.kind {
            Kind::Ok { result } => Some(result),
            Kind::Err { .. } => None,
        }
    }

    /// Returns the `error` value, if it exists.
    pub fn error_value(&self) -> Option<&Error> {
        match &self.kind {
            Kind::Ok { .. } => None,
            Kind::Err { error } => Some(error),
        }
    }
}

/// An outgoing JSON-RPC notification sent from the server to the client.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct Notification {
    jsonrpc: Version,
    method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    params: Option<Value>,
}

impl Notification {
    /// Creates a notification for a typed LSP notification.
    ///
    /// Returns `None` if the parameters fail to serialize.
    pub fn new<N>(params: N::Params) -> Option<Self>
    where
        N: lsp::notification::Notification,
    {
        match serde_json::to_value(params) {
            Ok(params) => Some(Notification::raw(N::METHOD, params)),
            Err(e) => {
                log::error!("invalid JSON in `{}` notification: {}", N::METHOD, e);
                None
            },
        }
    }

    pub(crate) fn raw(method: &str, params: Value) -> Self {
        Notification {
            jsonrpc: Version,
            method: method.to_owned(),
            params: Some(params),
        }
    }

    /// Returns the notification method name.
    pub fn method(&self) -> &str {
        &self.method
    }

    /// Returns the notification parameters, if any.
    pub fn params(&self) -> Option<&Value> {
        self.params.as_ref()
    }
}

impl Display for Notification {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match serde_json::to_string(self) {
            Ok(json) => f.write_str(&json),
            Err(_) => f.write_str(&self.method),
        }
    }
}
