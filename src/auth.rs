//! Identity and user-store collaborators.
//!
//! The pipeline does not own users or credentials. It asks two collaborators:
//!
//! - an [`IdentityResolver`], which turns a request into an [`Identity`];
//! - a [`UserStore`], which knows how many users exist.
//!
//! [`JwtResolver`] and [`MemoryUserStore`] are the implementations shipped
//! with the crate. A database-backed store implements [`UserStore`] the same
//! way the in-memory one does.

use std::borrow::Cow;
use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::AppError;
use crate::request::Request;

// ── Identity ──────────────────────────────────────────────────────────────────

/// Role attached to an identity.
///
/// Roles are opaque strings; only [`Role::ADMIN`] has meaning to the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Role(Cow<'static, str>);

impl Role {
    pub const ADMIN: Role = Role(Cow::Borrowed("admin"));
    pub const USER: Role = Role(Cow::Borrowed("user"));

    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_admin(&self) -> bool {
        self.0 == "admin"
    }
}

impl Default for Role {
    fn default() -> Self {
        Self::USER
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A resolved caller, or a stored user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: String,
    pub role: Role,
}

impl Identity {
    pub fn new(id: impl Into<String>, role: Role) -> Self {
        Self { id: id.into(), role }
    }
}

// ── Collaborator traits ───────────────────────────────────────────────────────

/// Resolves the caller of a request.
///
/// Implementations fail with [`ErrorKind::Unauthorized`](crate::ErrorKind::Unauthorized)
/// when credentials are missing or invalid.
#[async_trait]
pub trait IdentityResolver: Send + Sync + 'static {
    async fn resolve(&self, req: &Request) -> Result<Identity, AppError>;
}

/// Read access to the set of registered users.
#[async_trait]
pub trait UserStore: Send + Sync + 'static {
    async fn list_all(&self) -> Result<Vec<Identity>, AppError>;

    async fn count(&self) -> Result<usize, AppError> {
        Ok(self.list_all().await?.len())
    }
}

// ── MemoryUserStore ───────────────────────────────────────────────────────────

/// A [`UserStore`] held in memory.
#[derive(Debug, Default)]
pub struct MemoryUserStore {
    users: RwLock<Vec<Identity>>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_users(users: impl IntoIterator<Item = Identity>) -> Self {
        Self { users: RwLock::new(users.into_iter().collect()) }
    }

    /// Adds a user. Fails with `Conflict` if the id is taken.
    pub async fn insert(&self, user: Identity) -> Result<(), AppError> {
        let mut users = self.users.write().await;
        if users.iter().any(|u| u.id == user.id) {
            return Err(AppError::conflict(format!("user {} already exists", user.id)));
        }
        debug!(id = %user.id, role = %user.role, "user stored");
        users.push(user);
        Ok(())
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn list_all(&self) -> Result<Vec<Identity>, AppError> {
        Ok(self.users.read().await.clone())
    }

    async fn count(&self) -> Result<usize, AppError> {
        Ok(self.users.read().await.len())
    }
}

// ── JwtResolver ───────────────────────────────────────────────────────────────

/// Clock skew tolerated when checking `exp` / `nbf`.
const LEEWAY_SECS: u64 = 30;

/// Claims carried by tokens this resolver issues and accepts.
#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    #[serde(default)]
    role: Role,
    iat: u64,
    nbf: u64,
    exp: u64,
    iss: String,
}

/// Resolves identities from `Authorization: Bearer <jwt>` headers.
///
/// HS256 only, issuer must match, 30 s of clock leeway. Every failure is
/// reported as `Unauthorized("Could not validate credentials")`; the reason
/// is logged at `debug`.
pub struct JwtResolver {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    issuer: String,
}

impl JwtResolver {
    pub fn new(secret: &[u8], issuer: impl Into<String>) -> Self {
        let issuer = issuer.into();
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = LEEWAY_SECS;
        validation.validate_nbf = true;
        validation.set_issuer(&[issuer.as_str()]);
        validation.set_required_spec_claims(&["exp", "sub", "iss"]);

        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            validation,
            issuer,
        }
    }

    /// Mints an access token for `identity`, valid for `ttl`.
    pub fn issue(&self, identity: &Identity, ttl: Duration) -> Result<String, AppError> {
        let now = jsonwebtoken::get_current_timestamp();
        let claims = Claims {
            sub: identity.id.clone(),
            role: identity.role.clone(),
            iat: now,
            nbf: now,
            exp: now + ttl.as_secs(),
            iss: self.issuer.clone(),
        };
        jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| AppError::internal("token signing failed").with_source(e))
    }

    fn verify(&self, token: &str) -> Result<Identity, AppError> {
        let data = jsonwebtoken::decode::<Claims>(token, &self.decoding, &self.validation)
            .map_err(|e| {
                debug!("token rejected: {e}");
                credentials_error()
            })?;
        Ok(Identity::new(data.claims.sub, data.claims.role))
    }
}

impl fmt::Debug for JwtResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JwtResolver").field("issuer", &self.issuer).finish_non_exhaustive()
    }
}

#[async_trait]
impl IdentityResolver for JwtResolver {
    async fn resolve(&self, req: &Request) -> Result<Identity, AppError> {
        let token = bearer_token(req)?;
        self.verify(token)
    }
}

fn credentials_error() -> AppError {
    AppError::unauthorized("Could not validate credentials")
}

fn bearer_token(req: &Request) -> Result<&str, AppError> {
    let header = req.header("authorization").ok_or_else(credentials_error)?;
    let token = header.strip_prefix("Bearer ").ok_or_else(credentials_error)?.trim();
    if token.is_empty() {
        return Err(credentials_error());
    }
    Ok(token)
}
