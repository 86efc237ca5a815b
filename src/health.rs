//! Built-in health-check handlers.
//!
//! | Probe | Suggested path | Question |
//! |---|---|---|
//! | **Liveness** | `/health` | Is the process alive? |
//! | **Readiness** | `/ready` | Can it serve traffic? |
//!
//! Both answer with the usual envelope so monitoring can branch on
//! `status_code` like any other client:
//!
//! ```rust
//! use tally::{Method, Router, health};
//!
//! let app = Router::new()
//!     .on(Method::Get, "/health", health::liveness)
//!     .on(Method::Get, "/ready", health::readiness);
//! ```
//!
//! Replace `readiness` with your own handler to gate on collaborators
//! (database, token keys) being reachable.

use crate::{Envelope, Request};

/// Always `200`, message `"ok"`. No dependencies.
pub async fn liveness(_req: Request) -> Envelope {
    Envelope::ok("ok")
}

/// `200`, message `"ready"`.
pub async fn readiness(_req: Request) -> Envelope {
    Envelope::ok("ready")
}
