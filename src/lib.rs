//! # tally
//!
//! The request pipeline behind a personal-finance JSON API. Accounts,
//! transactions, debts and profiles are CRUD; what they share is how a
//! request travels and how an answer comes back. That part lives here.
//!
//! ## The contract
//!
//! Every route goes through the same stages, in the same order:
//!
//! 1. **Rate limit**: per client IP, outside development ([`RateLimit`]).
//! 2. **Allow-list**: a per-path set of verbs. A verb outside it is `405`
//!    before any handler runs. A path with no entry is not restricted.
//! 3. **Guards**: e.g. [`RoleGate`], which lets the first user in while the
//!    user store is empty and demands the `admin` role afterwards.
//! 4. **Handler**: returns an [`Envelope`] (or a raw [`Response`], or an
//!    [`AppError`]); it never writes to the socket.
//! 5. **Envelope stage**: serializes `{status_code, message, data}` once.
//! 6. **Error translator**: maps [`ErrorKind`] to a status code and the same
//!    envelope shape. Unknown errors and panics become a generic `500`.
//!
//! Every response therefore has one shape:
//!
//! ```text
//! { "status_code": 200, "message": "ok", "data": [ ... ] }
//! ```
//!
//! Request bodies are capped (10 MiB by default, `413` beyond). TLS and slow
//! clients are left to the reverse proxy.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use tally::{AppError, Envelope, Method, Request, Router, Server};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), tally::Error> {
//!     let app = Router::new()
//!         .allow("/accounts", &[Method::Get, Method::Post])
//!         .on(Method::Get,  "/accounts", list_accounts)
//!         .on(Method::Post, "/accounts", create_account);
//!
//!     Server::bind("0.0.0.0:3000".parse().unwrap()).serve(app).await
//! }
//!
//! async fn list_accounts(_req: Request) -> Result<Envelope, AppError> {
//!     Envelope::ok("ok").with_data(["checking", "savings"])
//! }
//!
//! #[derive(serde::Deserialize)]
//! struct NewAccount { name: String }
//!
//! async fn create_account(req: Request) -> Result<Envelope, AppError> {
//!     let input: NewAccount = req.json()?;   // malformed body → 400
//!     if input.name.is_empty() {
//!         return Err(AppError::validation("name is required"));
//!     }
//!     Envelope::created("account created").with_data(&input.name)
//! }
//! ```

mod auth;
mod config;
mod envelope;
mod error;
mod handler;
mod method;
mod request;
mod response;
mod router;
mod server;
mod status;

pub mod health;
pub mod middleware;

pub use auth::{Identity, IdentityResolver, JwtResolver, MemoryUserStore, Role, UserStore};
pub use config::{Config, Environment};
pub use envelope::{Envelope, IntoReply, Outcome, Reply};
pub use error::{AppError, Error, ErrorKind};
pub use handler::Handler;
pub use method::{Method, MethodSet, UnknownMethod};
pub use middleware::Guard;
pub use middleware::admin::RoleGate;
pub use middleware::allow::AllowList;
pub use middleware::limit::RateLimit;
pub use request::Request;
pub use response::{Response, ResponseBuilder};
pub use router::Router;
pub use server::Server;
pub use status::Status;
