//! HTTP status codes used by the pipeline, as a typed enum.
//!
//! ```rust
//! use tally::{Envelope, Status};
//!
//! // envelope with an explicit status
//! Envelope::new(Status::Created, "account created");
//!
//! // return Status directly from a handler for a body-less raw response
//! async fn delete_account(_req: tally::Request) -> Status {
//!     Status::NoContent
//! }
//! ```

/// Status codes the pipeline produces.
#[allow(clippy::enum_variant_names)]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Status {
    // ── 2xx Success ───────────────────────────────────────────────────────────
    Ok,                  // 200
    Created,             // 201
    NoContent,           // 204

    // ── 4xx Client errors ─────────────────────────────────────────────────────
    BadRequest,          // 400
    Unauthorized,        // 401
    Forbidden,           // 403
    NotFound,            // 404
    MethodNotAllowed,    // 405
    Conflict,            // 409
    PayloadTooLarge,     // 413
    TooManyRequests,     // 429

    // ── 5xx Server errors ─────────────────────────────────────────────────────
    InternalServerError, // 500
}

impl Status {
    pub fn code(self) -> u16 {
        self.into()
    }

    /// Canonical reason phrase, also the default envelope message for errors.
    pub fn reason(self) -> &'static str {
        match self {
            Self::Ok                   => "OK",
            Self::Created              => "Created",
            Self::NoContent            => "No Content",
            Self::BadRequest           => "Bad Request",
            Self::Unauthorized         => "Unauthorized",
            Self::Forbidden            => "Forbidden",
            Self::NotFound             => "Not Found",
            Self::MethodNotAllowed     => "Method Not Allowed",
            Self::Conflict             => "Conflict",
            Self::PayloadTooLarge      => "Payload Too Large",
            Self::TooManyRequests      => "Too Many Requests",
            Self::InternalServerError  => "Internal Server Error",
        }
    }
}

impl From<Status> for u16 {
    fn from(s: Status) -> u16 {
        match s {
            Status::Ok                   => 200,
            Status::Created              => 201,
            Status::NoContent            => 204,
            Status::BadRequest           => 400,
            Status::Unauthorized         => 401,
            Status::Forbidden            => 403,
            Status::NotFound             => 404,
            Status::MethodNotAllowed     => 405,
            Status::Conflict             => 409,
            Status::PayloadTooLarge      => 413,
            Status::TooManyRequests      => 429,
            Status::InternalServerError  => 500,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_and_reasons_agree_with_http() {
        for status in [
            Status::Ok,
            Status::Created,
            Status::NoContent,
            Status::BadRequest,
            Status::MethodNotAllowed,
            Status::TooManyRequests,
            Status::InternalServerError,
        ] {
            let canonical = http::StatusCode::from_u16(status.code()).unwrap();
            assert_eq!(canonical.canonical_reason(), Some(status.reason()));
        }
    }
}
