//! End-to-end over a real socket: hyper in, envelope out.

use reqwest::StatusCode;
use serde_json::{Value, json};
use tally::{AppError, Envelope, Method, Request, Router, Server, health};
use tokio::net::TcpListener;
use tokio::sync::oneshot;

struct TestServer {
    base_url: String,
    shutdown: Option<oneshot::Sender<()>>,
    handle: tokio::task::JoinHandle<Result<(), tally::Error>>,
}

impl TestServer {
    async fn spawn(app: Router) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let base_url = format!("http://{}", listener.local_addr().unwrap());
        let (tx, rx) = oneshot::channel::<()>();

        let handle = tokio::spawn(
            Server::from_listener(listener).serve_with_shutdown(app, async move {
                let _ = rx.await;
            }),
        );

        Self { base_url, shutdown: Some(tx), handle }
    }

    async fn stop(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        self.handle.await.unwrap().unwrap();
    }
}

async fn list_accounts(_req: Request) -> Result<Envelope, AppError> {
    Envelope::ok("ok").with_data(json!([{ "id": 1, "balance": 250 }]))
}

#[tokio::test]
async fn serves_envelopes_over_http() {
    let app = Router::new()
        .allow("/accounts", &[Method::Get])
        .on(Method::Get, "/accounts", list_accounts)
        .on(Method::Get, "/health", health::liveness);
    let server = TestServer::spawn(app).await;
    // No idle keep-alive connections, so shutdown does not wait on the pool.
    let client = reqwest::Client::builder().pool_max_idle_per_host(0).build().unwrap();

    let res = client.get(format!("{}/accounts", server.base_url)).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body, json!({ "status_code": 200, "message": "ok", "data": [{ "id": 1, "balance": 250 }] }));

    let res = client.post(format!("{}/accounts", server.base_url)).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::METHOD_NOT_ALLOWED);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["status_code"], 405);

    let res = client.get(format!("{}/nowhere", server.base_url)).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    let res = client
        .request(reqwest::Method::from_bytes(b"PROPFIND").unwrap(), format!("{}/accounts", server.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::METHOD_NOT_ALLOWED);

    drop(client);
    server.stop().await;
}

// `any` covers the methods tally knows. A verb outside that set is refused by
// the server before routing, even on a path that no allow-list restricts.
#[tokio::test]
async fn any_route_still_refuses_unknown_verbs() {
    let app = Router::new().any("/transactions/{id}", |req: Request| async move {
        Envelope::ok(format!("{} {}", req.method(), req.param("id").unwrap_or_default()))
    });
    let server = TestServer::spawn(app).await;
    let client = reqwest::Client::builder().pool_max_idle_per_host(0).build().unwrap();
    let url = format!("{}/transactions/5", server.base_url);

    for method in [reqwest::Method::GET, reqwest::Method::PATCH, reqwest::Method::OPTIONS] {
        let res = client.request(method.clone(), &url).send().await.unwrap();
        assert_eq!(res.status(), StatusCode::OK, "{method}");
        let body: Value = res.json().await.unwrap();
        assert_eq!(body["message"], format!("{method} 5"));
    }

    let res = client
        .request(reqwest::Method::from_bytes(b"PROPFIND").unwrap(), &url)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::METHOD_NOT_ALLOWED);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body, json!({ "status_code": 405, "message": "Method not allowed", "data": null }));

    drop(client);
    server.stop().await;
}
