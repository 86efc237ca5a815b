//! Outgoing HTTP response type.
//!
//! Most handlers never build one of these: they return an
//! [`Envelope`](crate::Envelope) and the pipeline renders it. A [`Response`]
//! is for routes that deliberately write raw output (plain text probes, file
//! downloads) and for the final hand-off to the transport.

use bytes::Bytes;
use http::header::{CONTENT_TYPE, HeaderValue};
use http_body_util::Full;

use crate::error::AppError;
use crate::status::Status;

// ── Response ─────────────────────────────────────────────────────────────────

/// An outgoing HTTP response.
///
/// ```rust
/// use tally::{Response, Status};
///
/// Response::json(br#"{"id":1}"#.to_vec());
/// Response::text("hello");
/// Response::status(Status::NoContent);
///
/// Response::builder()
///     .status(Status::Created)
///     .header("location", "/accounts/42")
///     .json(br#"{"id":42}"#.to_vec());
/// ```
#[derive(Debug)]
pub struct Response {
    pub(crate) body: Vec<u8>,
    pub(crate) headers: Vec<(String, String)>,
    pub(crate) status: u16,
}

impl Response {
    /// `200 OK` — `application/json`.
    pub fn json(body: Vec<u8>) -> Self {
        Self::builder().json(body)
    }

    /// `200 OK` — `text/plain; charset=utf-8`.
    pub fn text(body: impl Into<String>) -> Self {
        Self::builder().text(body)
    }

    /// Response with no body.
    pub fn status(code: Status) -> Self {
        Self { body: Vec::new(), headers: Vec::new(), status: code.into() }
    }

    /// Builder for responses that need a custom status or extra headers.
    pub fn builder() -> ResponseBuilder {
        ResponseBuilder { headers: Vec::new(), status: Status::Ok.into() }
    }

    pub fn status_code(&self) -> u16 { self.status }
    pub fn body(&self) -> &[u8] { &self.body }
    pub fn headers(&self) -> &[(String, String)] { &self.headers }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Converts into the `http` type hyper writes to the wire.
    ///
    /// A header that `http` rejects is a programming error in a handler. The
    /// client gets the `500` envelope instead and the cause is logged.
    pub(crate) fn into_inner(self) -> http::Response<Full<Bytes>> {
        let mut builder = http::Response::builder().status(self.status);
        for (name, value) in &self.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        builder
            .body(Full::new(Bytes::from(self.body)))
            .unwrap_or_else(invalid_response)
    }
}

fn invalid_response(e: http::Error) -> http::Response<Full<Bytes>> {
    let envelope = AppError::internal("invalid response").with_source(e).into_envelope();
    let rendered = envelope.into_response();

    let mut fallback = http::Response::new(Full::new(Bytes::from(rendered.body)));
    *fallback.status_mut() = http::StatusCode::INTERNAL_SERVER_ERROR;
    fallback
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    fallback
}

// ── ResponseBuilder ───────────────────────────────────────────────────────────

/// Fluent builder for [`Response`].
///
/// Obtain via [`Response::builder()`]. Defaults to `Status::Ok` (200).
/// Terminated by a typed body method.
pub struct ResponseBuilder {
    headers: Vec<(String, String)>,
    status: u16,
}

impl ResponseBuilder {
    /// Accepts a [`Status`] or a raw code (an envelope carries a raw code).
    pub fn status(mut self, code: impl Into<u16>) -> Self {
        self.status = code.into();
        self
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_owned(), value.to_owned()));
        self
    }

    /// Terminate with a JSON body (`application/json`).
    pub fn json(self, body: Vec<u8>) -> Response {
        self.finish("application/json", body)
    }

    /// Terminate with a plain-text body (`text/plain; charset=utf-8`).
    pub fn text(self, body: impl Into<String>) -> Response {
        self.finish("text/plain; charset=utf-8", body.into().into_bytes())
    }

    fn finish(self, content_type: &str, body: Vec<u8>) -> Response {
        let mut headers = vec![("content-type".to_owned(), content_type.to_owned())];
        headers.extend(self.headers);
        Response { body, headers, status: self.status }
    }
}

#[cfg(test)]
mod tests {
    use http_body_util::BodyExt;

    use super::*;

    #[test]
    fn builder_puts_content_type_first() {
        let res = Response::builder()
            .status(Status::Created)
            .header("Location", "/accounts/7")
            .json(b"{}".to_vec());

        assert_eq!(res.status_code(), 201);
        assert_eq!(res.headers()[0].0, "content-type");
        assert_eq!(res.header("location"), Some("/accounts/7"));
        assert_eq!(res.header("CONTENT-TYPE"), Some("application/json"));
    }

    #[test]
    fn into_inner_carries_status_headers_and_body() {
        let inner = Response::text("ok").into_inner();
        assert_eq!(inner.status(), http::StatusCode::OK);
        assert_eq!(
            inner.headers().get("content-type").unwrap(),
            "text/plain; charset=utf-8"
        );
    }

    #[tokio::test]
    async fn invalid_header_degrades_to_the_500_envelope() {
        let res = Response::builder().header("bad header", "x").text("never sent");
        let inner = res.into_inner();
        assert_eq!(inner.status(), http::StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(inner.headers().get("content-type").unwrap(), "application/json");

        let body = inner.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(
            serde_json::from_slice::<serde_json::Value>(&body).unwrap(),
            serde_json::json!({ "status_code": 500, "message": "Internal Server Error", "data": null })
        );
    }
}
