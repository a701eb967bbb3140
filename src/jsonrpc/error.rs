//! Error types defined by the JSON-RPC specification and the Language Server Protocol.

use serde::{de::Deserializer, ser::Serializer, Deserialize, Serialize};
use serde_json::Value;
use std::fmt::{self, Display, Formatter};

/// A list of numeric error codes used in JSON-RPC responses.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorCode {
    /// Invalid JSON was received by the server.
    ParseError,
    /// The JSON sent is not a valid Request object.
    InvalidRequest,
    /// The method does not exist / is not available.
    MethodNotFound,
    /// Invalid method parameter(s).
    InvalidParams,
    /// Internal JSON-RPC error.
    InternalError,
    /// Reserved for implementation-defined server errors.
    ServerError(i64),
    /// The request was cancelled by the client.
    RequestCancelled,
    /// The document or item a request refers to changed before the request completed.
    ContentModified,
    /// The request was syntactically valid but the server could not produce a result.
    RequestFailed,
}

impl ErrorCode {
    /// Returns the integer error code value.
    pub fn code(&self) -> i64 {
        match *self {
            ErrorCode::ParseError => -32700,
            ErrorCode::InvalidRequest => -32600,
            ErrorCode::MethodNotFound => -32601,
            ErrorCode::InvalidParams => -32602,
            ErrorCode::InternalError => -32603,
            ErrorCode::RequestCancelled => -32800,
            ErrorCode::ContentModified => -32801,
            ErrorCode::RequestFailed => -32803,
            ErrorCode::ServerError(code) => code,
        }
    }

    /// Returns a human-readable description of the error.
    pub fn description(&self) -> &'static str {
        match *self {
            ErrorCode::ParseError => "Parse error",
            ErrorCode::InvalidRequest => "Invalid request",
            ErrorCode::MethodNotFound => "Method not found",
            ErrorCode::InvalidParams => "Invalid params",
            ErrorCode::InternalError => "Internal error",
            ErrorCode::RequestCancelled => "Canceled",
            ErrorCode::ContentModified => "Content modified",
            ErrorCode::RequestFailed => "Request failed",
            ErrorCode::ServerError(_) => "Server error",
        }
    }
}

impl From<i64> for ErrorCode {
    fn from(code: i64) -> Self {
        match code {
            -32700 => ErrorCode::ParseError,
            -32600 => ErrorCode::InvalidRequest,
            -32601 => ErrorCode::MethodNotFound,
            -32602 => ErrorCode::InvalidParams,
            -32603 => ErrorCode::InternalError,
            -32800 => ErrorCode::RequestCancelled,
            -32801 => ErrorCode::ContentModified,
            -32803 => ErrorCode::RequestFailed,
            code => ErrorCode::ServerError(code),
        }
    }
}

impl Display for ErrorCode {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        Display::fmt(&self.code(), f)
    }
}

impl<'a> Deserialize<'a> for ErrorCode {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'a>,
    {
        let code: i64 = Deserialize::deserialize(deserializer)?;
        Ok(ErrorCode::from(code))
    }
}

impl Serialize for ErrorCode {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.code().serialize(serializer)
    }
}

/// A JSON-RPC error object.
///
/// This is the failure type returned by method handlers: a domain failure scoped to one call.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Error {
    /// A number indicating the error type that occurred.
    pub code: ErrorCode,
    /// A short description of the error.
    pub message: String,
    /// Additional information about the error, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl Error {
    /// Creates a new error from the given `ErrorCode`.
    pub fn new(code: ErrorCode) -> Self {
        Error {
            code,
            message: code.description().to_string(),
            data: None,
        }
    }

    /// Creates a new parse error (`-32700`).
    pub fn parse_error() -> Self {
        Error::new(ErrorCode::ParseError)
    }

    /// Creates a new "invalid request" error (`-32600`).
    pub fn invalid_request() -> Self {
        Error::new(ErrorCode::InvalidRequest)
    }

    /// Creates a new "method not found" error (`-32601`).
    pub fn method_not_found() -> Self {
        Error::new(ErrorCode::MethodNotFound)
    }

    /// Creates a new "invalid params" error (`-32602`).
    pub fn invalid_params<M>(message: M) -> Self
    where
        M: Into<String>,
    {
        Error {
            code: ErrorCode::InvalidParams,
            message: message.into(),
            data: None,
        }
    }

    /// Creates a new internal error (`-32603`).
    pub fn internal_error() -> Self {
        Error::new(ErrorCode::InternalError)
    }

    /// Creates a new "request cancelled" error (`-32800`).
    pub fn request_cancelled() -> Self {
        Error::new(ErrorCode::RequestCancelled)
    }

    /// Creates a new "content modified" error (`-32801`).
    ///
    /// Resolve handlers return this when the item they were asked to expand is stale.
    pub fn content_modified() -> Self {
        Error::new(ErrorCode::ContentModified)
    }

    /// Creates a new "request failed" error (`-32803`) with a custom message.
    pub fn request_failed<M>(message: M) -> Self
    where
        M: Into<String>,
    {
        Error {
            code: ErrorCode::RequestFailed,
            message: message.into(),
            data: None,
        }
    }

    /// Attaches additional data to the error.
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Returns `true` if the error reports a cancelled request.
    pub fn is_cancellation(&self) -> bool {
        self.code == ErrorCode::RequestCancelled
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "{}: {}", self.code.description(), self.message)
    }
}

impl std::error::Error for Error {
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn display() {
        assert_eq!(Error::parse_error().to_string(), "Parse error: Parse error");
        assert_eq!(ErrorCode::ParseError.to_string(), "-32700");
        assert_eq!(
            Error::request_failed("lens is stale").to_string(),
            "Request failed: lens is stale"
        );
    }

    #[test]
    fn codes_round_trip() {
        let cases = [
            (Error::parse_error(), ErrorCode::ParseError),
            (Error::invalid_request(), ErrorCode::InvalidRequest),
            (Error::method_not_found(), ErrorCode::MethodNotFound),
            (Error::invalid_params("Invalid params"), ErrorCode::InvalidParams),
            (Error::internal_error(), ErrorCode::InternalError),
            (Error::request_cancelled(), ErrorCode::RequestCancelled),
            (Error::content_modified(), ErrorCode::ContentModified),
            (Error::request_failed("Request failed"), ErrorCode::RequestFailed),
            (Error::new(ErrorCode::ServerError(42)), ErrorCode::ServerError(42)),
        ];

        for (error, code) in cases {
            assert_eq!(code, code.code().into());
            assert_eq!(code, error.code);
            assert_eq!(code.description(), error.message);
        }
    }

    #[test]
    fn only_cancelled_is_cancellation() {
        assert!(Error::request_cancelled().is_cancellation());
        assert!(!Error::content_modified().is_cancellation());
        assert!(!Error::internal_error().is_cancellation());
    }

    #[test]
    fn serializes_data_when_present() {
        let error = Error::content_modified().with_data(json!({ "uri": "file:///a.rs" }));
        assert_eq!(
            serde_json::to_value(&error).unwrap(),
            json!({ "code": -32801, "message": "Content modified", "data": { "uri": "file:///a.rs" } })
        );
    }
}
