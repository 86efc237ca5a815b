//! Per-request tracing span.

use std::future::Future;
use std::time::Instant;

use tracing::{Instrument, info, info_span};

use crate::method::Method;
use crate::response::Response;

/// Runs `stages` inside a `request{method, path}` span and logs the arrival
/// and the final status with its latency.
pub(crate) async fn traced<F>(
    method: Method,
    path: &str,
    authorization: Option<&str>,
    stages: F,
) -> Response
where
    F: Future<Output = Response>,
{
    let span = info_span!("request", %method, %path);
    let started = Instant::now();

    async move {
        info!(authorization = %redacted(authorization), "incoming request");
        let response = stages.await;
        info!(
            status = response.status_code(),
            latency_ms = started.elapsed().as_millis() as u64,
            "request finished"
        );
        response
    }
    .instrument(span)
    .await
}

/// The auth scheme alone (`Bearer`, `Basic`, ...); credentials never reach
/// the logs.
fn redacted(authorization: Option<&str>) -> String {
    match authorization.map(str::trim) {
        None | Some("") => "not present".to_owned(),
        Some(value) => match value.split_once(' ') {
            Some((scheme, _)) => format!("{scheme} <redacted>"),
            None => "<redacted>".to_owned(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn authorization_keeps_only_the_scheme() {
        assert_eq!(redacted(None), "not present");
        assert_eq!(redacted(Some("")), "not present");
        assert_eq!(redacted(Some("Bearer eyJhbGciOiJIUzI1NiJ9.secret")), "Bearer <redacted>");
        assert_eq!(redacted(Some("Basic YWRtaW46aHVudGVyMg==")), "Basic <redacted>");
        assert_eq!(redacted(Some("opaque-token")), "<redacted>");
    }

    #[tokio::test]
    async fn passes_the_response_through() {
        let res = traced(Method::Get, "/health", None, async { Response::text("OK") }).await;
        assert_eq!(res.body(), b"OK");
    }
}
