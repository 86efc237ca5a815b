//! Incoming HTTP request type.

use std::collections::HashMap;
use std::net::SocketAddr;

use bytes::Bytes;
use http::HeaderMap;
use http::header::{HeaderName, HeaderValue};
use serde::de::DeserializeOwned;

use crate::error::AppError;
use crate::method::Method;

/// An incoming HTTP request, with its body fully read.
///
/// The server builds these from hyper requests. Tests and in-process callers
/// build them directly, no socket required:
///
/// ```rust
/// use tally::{Method, Request};
///
/// let req = Request::new(Method::Post, "/accounts")
///     .with_header("authorization", "Bearer abc")
///     .with_body(r#"{"name":"savings"}"#);
///
/// assert_eq!(req.header("Authorization"), Some("Bearer abc"));
/// ```
#[derive(Debug)]
pub struct Request {
    pub(crate) method: Method,
    pub(crate) path: String,
    pub(crate) headers: HeaderMap,
    pub(crate) body: Bytes,
    pub(crate) params: HashMap<String, String>,
    pub(crate) remote_addr: Option<SocketAddr>,
}

impl Request {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            headers: HeaderMap::new(),
            body: Bytes::new(),
            params: HashMap::new(),
            remote_addr: None,
        }
    }

    pub(crate) fn from_parts(
        parts: http::request::Parts,
        method: Method,
        body: Bytes,
        remote_addr: Option<SocketAddr>,
    ) -> Self {
        Self {
            method,
            path: parts.uri.path().to_owned(),
            headers: parts.headers,
            body,
            params: HashMap::new(),
            remote_addr,
        }
    }

    /// Adds a header. Names or values that are not valid HTTP are ignored.
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            self.headers.append(name, value);
        }
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Sets the peer address, as the server does for socket requests.
    pub fn with_remote_addr(mut self, addr: SocketAddr) -> Self {
        self.remote_addr = Some(addr);
        self
    }

    pub(crate) fn set_params(&mut self, params: HashMap<String, String>) {
        self.params = params;
    }

    pub fn method(&self) -> Method { self.method }
    pub fn path(&self) -> &str { &self.path }
    pub fn headers(&self) -> &HeaderMap { &self.headers }
    pub fn body(&self) -> &[u8] { &self.body }

    /// The connected peer. `None` for requests built in-process.
    pub fn remote_addr(&self) -> Option<SocketAddr> { self.remote_addr }

    /// Case-insensitive header lookup. Non-UTF-8 values read as absent.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Returns a named path parameter.
    ///
    /// For a route `/accounts/{id}`, `req.param("id")` on `/accounts/42` returns `Some("42")`.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    /// Deserializes the JSON body.
    ///
    /// An empty, malformed, or mistyped body is a client error
    /// ([`ErrorKind::ValidationFailed`](crate::ErrorKind::ValidationFailed)).
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, AppError> {
        if self.body.is_empty() {
            return Err(AppError::validation("Request body is required"));
        }
        serde_json::from_slice(&self.body)
            .map_err(|e| AppError::validation(format!("Invalid request body: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;

    use super::*;
    use crate::ErrorKind;

    #[derive(Debug, Deserialize, PartialEq)]
    struct NewAccount {
        name: String,
        balance: i64,
    }

    #[test]
    fn parses_json_body() {
        let req = Request::new(Method::Post, "/accounts")
            .with_body(r#"{"name":"savings","balance":1200}"#);
        let account: NewAccount = req.json().unwrap();
        assert_eq!(account, NewAccount { name: "savings".into(), balance: 1200 });
    }

    #[test]
    fn empty_and_malformed_bodies_are_validation_errors() {
        let empty = Request::new(Method::Post, "/accounts");
        assert_eq!(empty.json::<NewAccount>().unwrap_err().kind(), ErrorKind::ValidationFailed);

        let missing_field = Request::new(Method::Post, "/accounts").with_body(r#"{"name":"x"}"#);
        let err = missing_field.json::<NewAccount>().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ValidationFailed);
        assert!(err.message().contains("balance"));
    }

    #[test]
    fn invalid_headers_are_dropped() {
        let req = Request::new(Method::Get, "/")
            .with_header("bad header", "x")
            .with_header("x-ok", "yes");
        assert_eq!(req.headers().len(), 1);
        assert_eq!(req.header("X-OK"), Some("yes"));
    }
}
