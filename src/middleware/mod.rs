//! Middleware stages.
//!
//! The router runs these around every handler, in a fixed order:
//!
//! 1. [`trace`]: one span per request; logs arrival, status, latency.
//! 2. [`limit`]: per-client rate limit (`429`), outside development only.
//! 3. [`allow`]: the per-path method allow-list (`405` before any handler).
//! 4. Route lookup (`404` / `405` for unregistered routes).
//! 5. Route [`Guard`]s, e.g. the [`admin`] role gate.
//! 6. The handler.
//!
//! Whatever the handler returns is rendered by the envelope stage, and any
//! error from steps 2–6 is rendered by the error translator.

use async_trait::async_trait;

use crate::error::AppError;
use crate::request::Request;

pub mod admin;
pub mod allow;
pub mod limit;
pub(crate) mod trace;

/// A check that runs before a route's handler.
///
/// An `Err` short-circuits the request: the handler is never called and the
/// error is translated into the response.
#[async_trait]
pub trait Guard: Send + Sync + 'static {
    async fn check(&self, req: &Request) -> Result<(), AppError>;
}
