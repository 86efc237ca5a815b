//! The response envelope and the [`IntoReply`] conversion trait.
//!
//! Every JSON response the pipeline writes, success or failure, has the same
//! shape:
//!
//! ```text
//! { "status_code": 200, "message": "ok", "data": [ ... ] }
//! ```
//!
//! A handler does not write to the transport. It returns a value describing
//! the outcome, and the router renders it after the handler has finished:
//!
//! - an [`Envelope`] is serialized with its `status_code` as the HTTP status;
//! - a raw [`Response`] bypasses the envelope (probes, downloads);
//! - an [`AppError`] goes to the error translator instead.
//!
//! An envelope is serialized by value. Once rendered it is gone, so the same
//! envelope can never be written twice:
//!
//! ```rust,compile_fail
//! use tally::Envelope;
//!
//! let envelope = Envelope::ok("ok");
//! let first = envelope.into_response();
//! let second = envelope.into_response(); // use of moved value
//! ```

use serde::Serialize;
use serde_json::Value;

use crate::error::AppError;
use crate::response::Response;
use crate::status::Status;

const INTERNAL_ERROR_BODY: &[u8] =
    br#"{"status_code":500,"message":"Internal Server Error","data":null}"#;

// ── Envelope ──────────────────────────────────────────────────────────────────

/// The uniform `{status_code, message, data}` response body.
#[derive(Debug, PartialEq, Serialize)]
#[must_use = "an envelope does nothing until it is returned from a handler"]
pub struct Envelope {
    status_code: u16,
    message: String,
    data: Option<Value>,
}

impl Envelope {
    pub fn new(status: Status, message: impl Into<String>) -> Self {
        Self { status_code: status.into(), message: message.into(), data: None }
    }

    /// `200` with a message and no data.
    pub fn ok(message: impl Into<String>) -> Self {
        Self::new(Status::Ok, message)
    }

    /// `201` with a message and no data.
    pub fn created(message: impl Into<String>) -> Self {
        Self::new(Status::Created, message)
    }

    /// Attaches a payload. Fails only if `data` cannot be represented as JSON
    /// (e.g. a map with non-string keys), which surfaces as `Internal`.
    pub fn with_data<T: Serialize>(mut self, data: T) -> Result<Self, AppError> {
        self.data = Some(serde_json::to_value(data)?);
        Ok(self)
    }

    pub fn status_code(&self) -> u16 { self.status_code }
    pub fn message(&self) -> &str { &self.message }
    pub fn data(&self) -> Option<&Value> { self.data.as_ref() }

    /// Serializes the envelope as the response body and uses its
    /// `status_code` as the transport status.
    pub fn into_response(self) -> Response {
        match serde_json::to_vec(&self) {
            Ok(body) => Response::builder().status(self.status_code).json(body),
            Err(e) => {
                // `data` is already a `Value`, so this only fails on a broken writer.
                tracing::error!("envelope serialization failed: {e}");
                Response::builder()
                    .status(Status::InternalServerError)
                    .json(INTERNAL_ERROR_BODY.to_vec())
            }
        }
    }
}

// ── Reply ─────────────────────────────────────────────────────────────────────

/// What a successful handler produced.
#[derive(Debug)]
pub enum Reply {
    /// Rendered as an envelope by the terminal stage.
    Envelope(Envelope),
    /// Written as-is; the envelope stage is skipped.
    Raw(Response),
}

impl Reply {
    /// Terminal stage: the only place a reply becomes bytes.
    pub fn finish(self) -> Response {
        match self {
            Self::Envelope(envelope) => {
                tracing::debug!(
                    status = envelope.status_code,
                    message = %envelope.message,
                    "sending envelope"
                );
                envelope.into_response()
            }
            Self::Raw(response) => response,
        }
    }
}

/// The value threaded from a handler to the terminal stage.
pub type Outcome = Result<Reply, AppError>;

// ── IntoReply ─────────────────────────────────────────────────────────────────

/// Conversion of a handler's return value into an [`Outcome`].
///
/// Implemented for [`Envelope`], [`Response`], [`Reply`], [`Status`],
/// [`AppError`], strings, and `Result<T, E>` where `T: IntoReply` and
/// `E: Into<AppError>`, so handlers can use `?` freely:
///
/// ```rust
/// use tally::{AppError, Envelope, Request};
///
/// async fn show_account(req: Request) -> Result<Envelope, AppError> {
///     let id = req.param("id").ok_or_else(|| AppError::validation("missing id"))?;
///     Envelope::ok("ok").with_data(serde_json::json!({ "id": id }))
/// }
/// ```
pub trait IntoReply {
    fn into_reply(self) -> Outcome;
}

impl IntoReply for Envelope {
    fn into_reply(self) -> Outcome { Ok(Reply::Envelope(self)) }
}

impl IntoReply for Response {
    fn into_reply(self) -> Outcome { Ok(Reply::Raw(self)) }
}

impl IntoReply for Reply {
    fn into_reply(self) -> Outcome { Ok(self) }
}

/// Return a [`Status`] directly for a body-less raw response: `return Status::NoContent`
impl IntoReply for Status {
    fn into_reply(self) -> Outcome { Ok(Reply::Raw(Response::status(self))) }
}

impl IntoReply for &'static str {
    fn into_reply(self) -> Outcome { Ok(Reply::Raw(Response::text(self))) }
}

impl IntoReply for String {
    fn into_reply(self) -> Outcome { Ok(Reply::Raw(Response::text(self))) }
}

impl IntoReply for AppError {
    fn into_reply(self) -> Outcome { Err(self) }
}

impl<T, E> IntoReply for Result<T, E>
where
    T: IntoReply,
    E: Into<AppError>,
{
    fn into_reply(self) -> Outcome {
        self.map_err(Into::into)?.into_reply()
    }
}
