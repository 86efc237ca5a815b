//! Request router and the per-request pipeline.
//!
//! One radix tree per HTTP method, plus one [`AllowList`] consulted before
//! any of them. [`Router::dispatch`] runs the whole pipeline for a request
//! and always produces a [`Response`]: nothing a handler does can escape it
//! unformatted.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use matchit::Router as MatchitRouter;
use tracing::error;

use crate::config::Environment;
use crate::envelope::{Outcome, Reply};
use crate::error::AppError;
use crate::handler::{BoxedHandler, Handler};
use crate::method::Method;
use crate::middleware::Guard;
use crate::middleware::allow::AllowList;
use crate::middleware::limit::RateLimit;
use crate::middleware::trace::traced;
use crate::request::Request;
use crate::response::Response;

/// A registered route: its guards, then its handler.
struct Endpoint {
    guards: Vec<Arc<dyn Guard>>,
    handler: BoxedHandler,
}

/// The application router.
///
/// Build it once at startup; pass it to [`Server::serve`](crate::Server::serve)
/// or call [`dispatch`](Router::dispatch) directly. Registrations chain.
///
/// ```rust
/// use std::sync::Arc;
/// use tally::{AppError, Envelope, Method, MemoryUserStore, JwtResolver, Request, RoleGate, Router};
///
/// # async fn list_accounts(_: Request) -> Result<Envelope, AppError> { Ok(Envelope::ok("ok")) }
/// # async fn show_account(_: Request) -> Result<Envelope, AppError> { Ok(Envelope::ok("ok")) }
/// # async fn create_user(_: Request) -> Result<Envelope, AppError> { Ok(Envelope::created("ok")) }
/// let users = Arc::new(MemoryUserStore::new());
/// let tokens = Arc::new(JwtResolver::new(b"secret", "finance.local"));
///
/// let app = Router::new()
///     .allow("/accounts", &[Method::Get])
///     .allow("/accounts/{id}", &[Method::Get])
///     .on(Method::Get, "/accounts", list_accounts)
///     .on(Method::Get, "/accounts/{id}", show_account)
///     .guarded(Method::Post, "/users", RoleGate::new(tokens, users), create_user);
/// ```
pub struct Router {
    routes: HashMap<Method, MatchitRouter<Arc<Endpoint>>>,
    allow: AllowList,
    limit: RateLimit,
    environment: Environment,
}

impl Router {
    pub fn new() -> Self {
        Self {
            routes: HashMap::new(),
            allow: AllowList::new(),
            limit: RateLimit::default(),
            environment: Environment::default(),
        }
    }

    /// Sets the deployment environment. In production, allow-list rejections
    /// do not echo the method and path back.
    pub fn environment(mut self, environment: Environment) -> Self {
        self.environment = environment;
        self
    }

    /// Replaces the per-client rate limit (default: 100 requests per 15
    /// minutes). It applies in every environment except development.
    pub fn rate_limit(mut self, limit: RateLimit) -> Self {
        self.limit = limit;
        self
    }

    /// Restricts `pattern` to `methods`. See [`AllowList::allow`].
    pub fn allow(mut self, pattern: &str, methods: &[Method]) -> Self {
        self.allow.allow(pattern, methods);
        self
    }

    /// Registers a handler for a method + path pair.
    ///
    /// Path parameters use `{name}` syntax; `req.param("name")` retrieves them.
    pub fn on(self, method: Method, path: &str, handler: impl Handler) -> Self {
        self.add(method, path, Vec::new(), handler)
    }

    /// Registers `handler` for every known method on `path`.
    pub fn any(mut self, path: &str, handler: impl Handler) -> Self {
        let handler = handler.into_boxed_handler();
        for method in Method::ALL {
            let endpoint = Arc::new(Endpoint { guards: Vec::new(), handler: Arc::clone(&handler) });
            self = self.insert(method, path, endpoint);
        }
        self
    }

    /// Registers a handler behind a guard. The guard runs first; if it fails
    /// the handler is never called.
    pub fn guarded(
        self,
        method: Method,
        path: &str,
        guard: impl Guard,
        handler: impl Handler,
    ) -> Self {
        let guard: Arc<dyn Guard> = Arc::new(guard);
        self.add(method, path, vec![guard], handler)
    }

    fn add(
        self,
        method: Method,
        path: &str,
        guards: Vec<Arc<dyn Guard>>,
        handler: impl Handler,
    ) -> Self {
        let endpoint = Arc::new(Endpoint { guards, handler: handler.into_boxed_handler() });
        self.insert(method, path, endpoint)
    }

    fn insert(mut self, method: Method, path: &str, endpoint: Arc<Endpoint>) -> Self {
        self.routes
            .entry(method)
            .or_default()
            .insert(path, endpoint)
            .unwrap_or_else(|e| panic!("invalid route `{path}`: {e}"));
        self
    }

    fn lookup(&self, method: Method, path: &str) -> Option<(Arc<Endpoint>, HashMap<String, String>)> {
        let tree = self.routes.get(&method)?;
        let matched = tree.at(path).ok()?;
        let endpoint = Arc::clone(matched.value);
        let params = matched.params.iter()
            .map(|(k, v)| (k.to_owned(), v.to_owned()))
            .collect();
        Some((endpoint, params))
    }

    fn registered_elsewhere(&self, path: &str) -> bool {
        self.routes.values().any(|tree| tree.at(path).is_ok())
    }

    /// Runs the full pipeline for one request.
    ///
    /// Rate limit, allow-list, route lookup, guards, handler, then the
    /// envelope stage; an error from any of them, or a panic, goes to the
    /// error translator.
    pub async fn dispatch(&self, req: Request) -> Response {
        let method = req.method();
        let path = req.path().to_owned();
        let authorization = req.header("authorization").map(str::to_owned);

        traced(method, &path, authorization.as_deref(), async {
            let outcome = AssertUnwindSafe(self.run(req))
                .catch_unwind()
                .await
                .unwrap_or_else(|_| {
                    error!("handler panicked");
                    Err(AppError::internal("handler panicked"))
                });
            finish(outcome)
        })
        .await
    }

    async fn run(&self, mut req: Request) -> Outcome {
        let method = req.method();

        if !self.environment.is_development() {
            self.limit.check(req.remote_addr().map(|addr| addr.ip()))?;
        }
        self.allow.check(method, req.path(), !self.environment.is_production())?;

        let Some((endpoint, params)) = self.lookup(method, req.path()) else {
            return Err(self.unrouted(method, req.path()));
        };
        req.set_params(params);

        for guard in &endpoint.guards {
            guard.check(&req).await?;
        }

        endpoint.handler.call(req).await
    }

    fn unrouted(&self, method: Method, path: &str) -> AppError {
        if self.registered_elsewhere(path) {
            if self.environment.is_production() {
                AppError::method_not_allowed("Method not allowed")
            } else {
                AppError::method_not_allowed(format!("{method} method not allowed for {path}"))
            }
        } else {
            AppError::not_found(format!("{path} not available"))
        }
    }
}

impl Default for Router {
    fn default() -> Self { Self::new() }
}

/// Envelope stage on success, error translator on failure.
fn finish(outcome: Outcome) -> Response {
    outcome
        .unwrap_or_else(|err| Reply::Envelope(err.into_envelope()))
        .finish()
}

#[cfg(test)]
mod tests {
    use std::num::NonZeroU32;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use serde_json::{Value, json};

    use super::*;
    use crate::envelope::Envelope;
    use crate::status::Status;

    fn body(res: &Response) -> Value {
        serde_json::from_slice(res.body()).unwrap()
    }

    async fn show(req: Request) -> Result<Envelope, AppError> {
        let id = req.param("id").unwrap_or_default().to_owned();
        Envelope::ok("ok").with_data(json!({ "id": id }))
    }

    #[tokio::test]
    async fn path_params_reach_the_handler() {
        let app = Router::new().on(Method::Get, "/accounts/{id}", show);
        let res = app.dispatch(Request::new(Method::Get, "/accounts/42")).await;
        assert_eq!(body(&res), json!({ "status_code": 200, "message": "ok", "data": { "id": "42" } }));
    }

    #[tokio::test]
    async fn unknown_paths_are_404_and_other_verbs_405() {
        let app = Router::new().on(Method::Get, "/accounts/{id}", show);

        let missing = app.dispatch(Request::new(Method::Get, "/budgets")).await;
        assert_eq!(missing.status_code(), 404);
        assert_eq!(body(&missing)["message"], "/budgets not available");

        let wrong_verb = app.dispatch(Request::new(Method::Delete, "/accounts/1")).await;
        assert_eq!(wrong_verb.status_code(), 405);
        assert_eq!(body(&wrong_verb)["message"], "DELETE method not allowed for /accounts/1");
    }

    #[tokio::test]
    async fn production_hides_request_detail() {
        let app = Router::new()
            .environment(Environment::Production)
            .allow("/accounts", &[Method::Get])
            .on(Method::Get, "/accounts", show);

        let res = app.dispatch(Request::new(Method::Post, "/accounts")).await;
        assert_eq!(body(&res), json!({ "status_code": 405, "message": "Method not allowed", "data": null }));
    }

    #[tokio::test]
    async fn production_hides_detail_for_unrouted_verbs_too() {
        let app = Router::new()
            .environment(Environment::Production)
            .on(Method::Get, "/accounts/{id}", show);

        let res = app.dispatch(Request::new(Method::Delete, "/accounts/1")).await;
        assert_eq!(body(&res), json!({ "status_code": 405, "message": "Method not allowed", "data": null }));
    }

    fn limited(environment: Environment) -> Router {
        Router::new()
            .environment(environment)
            .rate_limit(RateLimit::new(NonZeroU32::new(2).unwrap(), Duration::from_secs(60)))
            .on(Method::Get, "/accounts/{id}", show)
    }

    fn from(peer: &str) -> Request {
        Request::new(Method::Get, "/accounts/1").with_remote_addr(peer.parse().unwrap())
    }

    #[tokio::test]
    async fn rate_limit_applies_outside_development() {
        for environment in [Environment::Production, Environment::Test] {
            let app = limited(environment);
            assert_eq!(app.dispatch(from("198.51.100.4:5000")).await.status_code(), 200);
            assert_eq!(app.dispatch(from("198.51.100.4:5001")).await.status_code(), 200);

            let res = app.dispatch(from("198.51.100.4:5002")).await;
            assert_eq!(
                body(&res),
                json!({
                    "status_code": 429,
                    "message": "Too many requests from this IP, please try again later.",
                    "data": null
                })
            );

            assert_eq!(app.dispatch(from("198.51.100.5:5000")).await.status_code(), 200);
        }
    }

    #[tokio::test]
    async fn development_is_not_rate_limited() {
        let app = limited(Environment::Development);
        for _ in 0..5 {
            assert_eq!(app.dispatch(from("198.51.100.4:5000")).await.status_code(), 200);
        }
    }

    #[tokio::test]
    async fn any_forwards_every_verb() {
        static HITS: AtomicUsize = AtomicUsize::new(0);
        async fn count(_req: Request) -> Status {
            HITS.fetch_add(1, Ordering::SeqCst);
            Status::NoContent
        }

        let app = Router::new().any("/ping", count);
        for method in Method::ALL {
            let res = app.dispatch(Request::new(method, "/ping")).await;
            assert_eq!(res.status_code(), 204, "{method}");
        }
        assert_eq!(HITS.load(Ordering::SeqCst), Method::ALL.len());
    }

    #[tokio::test]
    async fn panics_become_internal_errors() {
        async fn boom(_req: Request) -> Envelope {
            panic!("index out of bounds: secret ledger row 7");
        }

        let app = Router::new().on(Method::Get, "/boom", boom);
        let res = app.dispatch(Request::new(Method::Get, "/boom")).await;
        assert_eq!(res.status_code(), 500);
        assert_eq!(body(&res), json!({ "status_code": 500, "message": "Internal Server Error", "data": null }));
    }
}
