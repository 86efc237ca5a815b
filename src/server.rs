//! HTTP server and graceful shutdown.
//!
//! The server is a thin bridge: it reads a hyper request, hands it to
//! [`Router::dispatch`], and writes back whatever comes out. The pipeline
//! semantics all live in the router.
//!
//! # Request bodies
//!
//! Bodies are read in full before routing, up to a limit (10 MiB unless
//! [`Server::body_limit`] says otherwise). A larger body is answered `413`,
//! a body that cannot be read `400`.
//!
//! # Disconnects
//!
//! When a client goes away mid-request, hyper drops the in-flight service
//! future, which drops the handler future with it. Work the handler had not
//! reached is abandoned; writes it already issued to a collaborator stay
//! committed.
//!
//! # Graceful shutdown
//!
//! On SIGTERM or Ctrl-C the server stops accepting, lets every in-flight
//! connection finish, and returns from [`Server::serve`].

use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::Body;
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

use crate::error::{AppError, Error};
use crate::method::Method;
use crate::request::Request;
use crate::router::Router;

enum Bind {
    Addr(SocketAddr),
    Listener(TcpListener),
}

const DEFAULT_BODY_LIMIT: usize = 10 * 1024 * 1024;

/// The HTTP server.
pub struct Server {
    bind: Bind,
    body_limit: usize,
}

impl Server {
    /// Configures the server to bind to `addr` when [`serve`](Server::serve)
    /// is called.
    ///
    /// ```rust,no_run
    /// use tally::{Config, Server};
    /// # fn main() -> Result<(), tally::Error> {
    /// let config = Config::from_env()?;
    /// let server = Server::bind(config.addr());
    /// # Ok(()) }
    /// ```
    pub fn bind(addr: SocketAddr) -> Self {
        Self { bind: Bind::Addr(addr), body_limit: DEFAULT_BODY_LIMIT }
    }

    /// Serves on an already-bound listener (e.g. port `0` in tests).
    pub fn from_listener(listener: TcpListener) -> Self {
        Self { bind: Bind::Listener(listener), body_limit: DEFAULT_BODY_LIMIT }
    }

    /// Largest request body accepted, in bytes.
    pub fn body_limit(mut self, bytes: usize) -> Self {
        self.body_limit = bytes;
        self
    }

    /// Starts accepting connections and dispatching them through `router`.
    ///
    /// Returns only after a full graceful shutdown (SIGTERM or Ctrl-C,
    /// followed by all in-flight requests completing).
    pub async fn serve(self, router: Router) -> Result<(), Error> {
        self.serve_with_shutdown(router, shutdown_signal()).await
    }

    /// Like [`serve`](Server::serve), but stops when `signal` resolves.
    pub async fn serve_with_shutdown(
        self,
        router: Router,
        signal: impl Future<Output = ()>,
    ) -> Result<(), Error> {
        let Self { bind, body_limit } = self;
        let listener = match bind {
            Bind::Addr(addr) => TcpListener::bind(addr).await?,
            Bind::Listener(listener) => listener,
        };
        let addr = listener.local_addr()?;
        let router = Arc::new(router);

        info!(%addr, "tally listening");

        let mut tasks = tokio::task::JoinSet::new();
        tokio::pin!(signal);

        loop {
            tokio::select! {
                // Shutdown first, so a signal stops accepting even with a backlog.
                biased;

                () = &mut signal => {
                    info!(in_flight = tasks.len(), "shutdown signal received, draining connections");
                    break;
                }

                res = listener.accept() => {
                    let (stream, remote_addr) = match res {
                        Ok(v) => v,
                        Err(e) => {
                            error!("accept error: {e}");
                            continue;
                        }
                    };

                    let router = Arc::clone(&router);
                    let io = TokioIo::new(stream);

                    tasks.spawn(async move {
                        let svc = service_fn(move |req| {
                            let router = Arc::clone(&router);
                            async move { dispatch(&router, req, Some(remote_addr), body_limit).await }
                        });

                        if let Err(e) = ConnBuilder::new(TokioExecutor::new())
                            .serve_connection(io, svc)
                            .await
                        {
                            debug!(peer = %remote_addr, "connection error: {e}");
                        }
                    });
                }

                // Reap finished connection tasks so the JoinSet stays bounded.
                Some(_) = tasks.join_next(), if !tasks.is_empty() => {}
            }
        }

        while tasks.join_next().await.is_some() {}

        info!("tally stopped");
        Ok(())
    }
}

// ── Request dispatch ──────────────────────────────────────────────────────────

/// Converts one hyper request, runs the pipeline, converts the response back.
///
/// The error type is [`Infallible`]: every failure, including an unknown
/// verb or an unreadable or oversized body, becomes an envelope.
async fn dispatch<B>(
    router: &Router,
    req: http::Request<B>,
    remote_addr: Option<SocketAddr>,
    body_limit: usize,
) -> Result<http::Response<Full<Bytes>>, Infallible>
where
    B: Body,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let (parts, body) = req.into_parts();

    let method = match Method::try_from(&parts.method) {
        Ok(method) => method,
        Err(e) => {
            warn!(path = %parts.uri.path(), "{e}");
            let err = AppError::method_not_allowed("Method not allowed");
            return Ok(err.into_envelope().into_response().into_inner());
        }
    };

    let body = match Limited::new(body, body_limit).collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) if e.is::<LengthLimitError>() => {
            let err = AppError::payload_too_large(format!(
                "Request body exceeds the {body_limit} byte limit"
            ));
            return Ok(err.into_envelope().into_response().into_inner());
        }
        Err(e) => {
            let err = AppError::validation("Could not read request body").with_source(e);
            return Ok(err.into_envelope().into_response().into_inner());
        }
    };

    let request = Request::from_parts(parts, method, body, remote_addr);
    Ok(router.dispatch(request).await.into_inner())
}

// ── Shutdown signal ───────────────────────────────────────────────────────────

/// Resolves on the first shutdown signal the process receives.
///
/// On Unix this listens for both **SIGTERM** and **SIGINT** (Ctrl-C).
/// On Windows only Ctrl-C is available. A handler that cannot be installed
/// is logged and that signal is ignored.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to install Ctrl-C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let sigterm = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let sigterm = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c   => {}
        () = sigterm  => {}
    }
}
