//! A small finance API on top of tally: accounts, users, login.
//!
//! Run with:
//!   RUST_LOG=info APP_SECRET_KEY=dev-secret cargo run --example finance
//!
//! Try:
//!   curl -X POST localhost:3000/api/users -d '{"id":"root","role":"admin"}'   # bootstrap admin
//!   curl -X POST localhost:3000/api/login -d '{"id":"root"}'
//!   curl localhost:3000/api/accounts
//!   curl -X POST localhost:3000/api/accounts -d '{"name":"savings","balance":1200}'
//!   curl -X PATCH localhost:3000/api/accounts                                   # 405

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tally::{
    AppError, Config, Envelope, Environment, Identity, JwtResolver, MemoryUserStore, Method,
    RateLimit, Request, Role, RoleGate, Router, Server, Status, UserStore, health,
};
use tokio::sync::RwLock;
use tracing_subscriber::EnvFilter;

const ACCESS_TOKEN_TTL: Duration = Duration::from_secs(15 * 60);

#[derive(Clone, Serialize)]
struct Account {
    id: u64,
    name: String,
    balance: i64,
}

#[derive(Deserialize)]
struct NewAccount {
    name: String,
    #[serde(default)]
    balance: i64,
}

#[derive(Deserialize)]
struct Login {
    id: String,
}

#[derive(Default)]
struct Ledger {
    next_id: AtomicU64,
    accounts: RwLock<Vec<Account>>,
}

#[tokio::main]
async fn main() -> Result<(), tally::Error> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = Config::from_env()?;
    let secret = config.secret_key.clone().unwrap_or_else(|| {
        tracing::warn!("APP_SECRET_KEY not set; using insecure dev default");
        "dev-secret".to_owned()
    });

    let tokens = Arc::new(JwtResolver::new(secret.as_bytes(), config.domain.clone()));
    let users = Arc::new(MemoryUserStore::new());
    let ledger = Arc::new(Ledger::default());

    let app = routes(config.environment, tokens, users, ledger)
        .rate_limit(RateLimit::new(config.rate_limit, config.rate_limit_window));
    Server::bind(config.addr())
        .body_limit(config.body_limit)
        .serve(app)
        .await
}

fn routes(
    environment: Environment,
    tokens: Arc<JwtResolver>,
    users: Arc<MemoryUserStore>,
    ledger: Arc<Ledger>,
) -> Router {
    Router::new()
        .environment(environment)
        .allow("/api", &[Method::Get])
        .allow("/api/login", &[Method::Post])
        .allow("/api/users", &[Method::Get, Method::Post])
        .allow("/api/accounts", &[Method::Get, Method::Post])
        .allow("/api/accounts/{id}", &[Method::Get, Method::Delete])
        .on(Method::Get, "/health", health::liveness)
        .on(Method::Get, "/api", move |_req: Request| async move {
            Envelope::ok(format!("you are connected to the /api, running in Environment: {environment}"))
        })
        .on(Method::Post, "/api/login", {
            let (tokens, users) = (Arc::clone(&tokens), Arc::clone(&users));
            move |req: Request| login(req, Arc::clone(&tokens), Arc::clone(&users))
        })
        .on(Method::Get, "/api/users", {
            let users = Arc::clone(&users);
            move |_req: Request| {
                let users = Arc::clone(&users);
                async move {
                    let all = users.list_all().await?;
                    Envelope::ok("ok").with_data(all)
                }
            }
        })
        .guarded(Method::Post, "/api/users", RoleGate::new(tokens, users.clone()), {
            let users = Arc::clone(&users);
            move |req: Request| create_user(req, Arc::clone(&users))
        })
        .on(Method::Get, "/api/accounts", {
            let ledger = Arc::clone(&ledger);
            move |_req: Request| {
                let ledger = Arc::clone(&ledger);
                async move {
                    let accounts = ledger.accounts.read().await;
                    Envelope::ok("ok").with_data(&*accounts)
                }
            }
        })
        .on(Method::Post, "/api/accounts", {
            let ledger = Arc::clone(&ledger);
            move |req: Request| create_account(req, Arc::clone(&ledger))
        })
        .on(Method::Get, "/api/accounts/{id}", {
            let ledger = Arc::clone(&ledger);
            move |req: Request| show_account(req, Arc::clone(&ledger))
        })
        .on(Method::Delete, "/api/accounts/{id}", move |req: Request| {
            delete_account(req, Arc::clone(&ledger))
        })
}

async fn login(
    req: Request,
    tokens: Arc<JwtResolver>,
    users: Arc<MemoryUserStore>,
) -> Result<Envelope, AppError> {
    let input: Login = req.json()?;
    let user = users
        .list_all()
        .await?
        .into_iter()
        .find(|u| u.id == input.id)
        .ok_or_else(|| AppError::unauthorized("Invalid credentials"))?;

    let token = tokens.issue(&user, ACCESS_TOKEN_TTL)?;
    Envelope::ok("logged in").with_data(serde_json::json!({ "access_token": token }))
}

async fn create_user(req: Request, users: Arc<MemoryUserStore>) -> Result<Envelope, AppError> {
    #[derive(Deserialize)]
    struct NewUser {
        id: String,
        #[serde(default)]
        role: Role,
    }

    let input: NewUser = req.json()?;
    // The very first user is always an administrator.
    let role = if users.count().await? == 0 { Role::ADMIN } else { input.role };
    let user = Identity::new(input.id, role);
    users.insert(user.clone()).await?;
    Envelope::created("user created").with_data(user)
}

async fn create_account(req: Request, ledger: Arc<Ledger>) -> Result<Envelope, AppError> {
    let input: NewAccount = req.json()?;
    if input.name.trim().is_empty() {
        return Err(AppError::validation("name is required"));
    }

    let mut accounts = ledger.accounts.write().await;
    if accounts.iter().any(|a| a.name == input.name) {
        return Err(AppError::conflict(format!("account {} already exists", input.name)));
    }
    let account = Account {
        id: ledger.next_id.fetch_add(1, Ordering::SeqCst) + 1,
        name: input.name,
        balance: input.balance,
    };
    accounts.push(account.clone());
    Envelope::created("account created").with_data(account)
}

fn account_id(req: &Request) -> Result<u64, AppError> {
    req.param("id")
        .and_then(|id| id.parse().ok())
        .ok_or_else(|| AppError::validation("account id must be a number"))
}

async fn show_account(req: Request, ledger: Arc<Ledger>) -> Result<Envelope, AppError> {
    let id = account_id(&req)?;
    let accounts = ledger.accounts.read().await;
    let account = accounts
        .iter()
        .find(|a| a.id == id)
        .ok_or_else(|| AppError::not_found(format!("account {id} not found")))?;
    Envelope::ok("ok").with_data(account)
}

async fn delete_account(req: Request, ledger: Arc<Ledger>) -> Result<Status, AppError> {
    let id = account_id(&req)?;
    let mut accounts = ledger.accounts.write().await;
    let before = accounts.len();
    accounts.retain(|a| a.id != id);
    if accounts.len() == before {
        return Err(AppError::not_found(format!("account {id} not found")));
    }
    Ok(Status::NoContent)
}
