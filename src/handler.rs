//! Handler trait and type erasure.
//!
//! # How async handlers are stored
//!
//! The router holds handlers of *different* types in one table, so each
//! handler is hidden behind a trait object (`dyn ErasedHandler`).
//!
//! ```text
//! async fn list_accounts(req: Request) -> Result<Envelope, AppError> { … }
//!        ↓ router.on(Method::Get, "/accounts", list_accounts)
//! list_accounts.into_boxed_handler()           ← Handler blanket impl
//!        ↓
//! Arc::new(FnHandler(list_accounts))           ← stored as BoxedHandler
//!        ↓
//! handler.call(req)  at request time           ← one vtable dispatch
//!        ↓
//! Box::pin(async { list_accounts(req).await.into_reply() })  → Outcome
//! ```
//!
//! The handler's return value is normalized into an [`Outcome`] here, before
//! the router sees it. That is where an envelope, a raw response, or a domain
//! error is decided.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::envelope::{IntoReply, Outcome};
use crate::request::Request;

// ── Internal types ────────────────────────────────────────────────────────────

/// A heap-allocated, type-erased future resolving to an [`Outcome`].
pub(crate) type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Internal dispatch interface.
///
/// `#[doc(hidden)] pub` rather than `pub(crate)` because it appears in the
/// return type of the public `Handler` trait's `into_boxed_handler` method.
#[doc(hidden)]
pub trait ErasedHandler {
    fn call(&self, req: Request) -> BoxFuture<'static, Outcome>;
}

/// A type-erased handler shared across concurrent requests.
#[doc(hidden)]
pub type BoxedHandler = Arc<dyn ErasedHandler + Send + Sync + 'static>;

// ── Public Handler trait ──────────────────────────────────────────────────────

/// Implemented for every valid route handler.
///
/// Automatically satisfied for any `async fn` with the signature:
///
/// ```text
/// async fn name(req: Request) -> impl IntoReply
/// ```
///
/// The trait is sealed: only the blanket impl below can satisfy it.
pub trait Handler: private::Sealed + Send + Sync + 'static {
    #[doc(hidden)]
    fn into_boxed_handler(self) -> BoxedHandler;
}

mod private {
    pub trait Sealed {}
}

// ── Blanket implementations ───────────────────────────────────────────────────

impl<F, Fut, R> private::Sealed for F
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoReply + Send + 'static,
{
}

impl<F, Fut, R> Handler for F
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoReply + Send + 'static,
{
    fn into_boxed_handler(self) -> BoxedHandler {
        Arc::new(FnHandler(self))
    }
}

// ── Concrete wrapper ──────────────────────────────────────────────────────────

struct FnHandler<F>(F);

impl<F, Fut, R> ErasedHandler for FnHandler<F>
where
    F: Fn(Request) -> Fut + Send + Sync,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoReply + Send + 'static,
{
    fn call(&self, req: Request) -> BoxFuture<'static, Outcome> {
        let fut = (self.0)(req);
        Box::pin(async move { fut.await.into_reply() })
    }
}
