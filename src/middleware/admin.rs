//! Admin-only route guard with first-user bootstrap.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::auth::{IdentityResolver, UserStore};
use crate::error::AppError;
use crate::middleware::Guard;
use crate::request::Request;

/// Admits a request to an admin-only route.
///
/// - While the user store is empty, every request is admitted so the first
///   administrator can be created. No identity is required in that case.
/// - Otherwise the caller is resolved and must carry the `admin` role;
///   anyone else gets `403 Forbidden`. Resolution failures (usually
///   `401 Unauthorized`) propagate as-is.
pub struct RoleGate {
    identity: Arc<dyn IdentityResolver>,
    users: Arc<dyn UserStore>,
}

impl RoleGate {
    pub fn new(identity: Arc<dyn IdentityResolver>, users: Arc<dyn UserStore>) -> Self {
        Self { identity, users }
    }
}

#[async_trait]
impl Guard for RoleGate {
    async fn check(&self, req: &Request) -> Result<(), AppError> {
        if self.users.count().await? == 0 {
            info!(path = %req.path(), "user store empty, admitting bootstrap admin");
            return Ok(());
        }

        let caller = self.identity.resolve(req).await?;
        if caller.role.is_admin() {
            debug!(id = %caller.id, "admin admitted");
            return Ok(());
        }

        Err(AppError::forbidden("Access denied"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{Identity, MemoryUserStore, Role};
    use crate::{ErrorKind, Method};

    /// Resolves every request to a fixed identity, or fails like a missing token.
    struct Fixed(Option<Identity>);

    #[async_trait]
    impl IdentityResolver for Fixed {
        async fn resolve(&self, _req: &Request) -> Result<Identity, AppError> {
            self.0.clone().ok_or_else(|| AppError::unauthorized("Could not validate credentials"))
        }
    }

    fn gate(caller: Option<Identity>, users: Vec<Identity>) -> RoleGate {
        RoleGate::new(Arc::new(Fixed(caller)), Arc::new(MemoryUserStore::with_users(users)))
    }

    fn req() -> Request {
        Request::new(Method::Post, "/users")
    }

    #[tokio::test]
    async fn empty_store_admits_any_caller() {
        for caller in [
            None,
            Some(Identity::new("u1", Role::USER)),
            Some(Identity::new("a1", Role::ADMIN)),
        ] {
            assert!(gate(caller, vec![]).check(&req()).await.is_ok());
        }
    }

    #[tokio::test]
    async fn populated_store_requires_admin() {
        let existing = vec![Identity::new("root", Role::ADMIN)];

        let admin = gate(Some(Identity::new("root", Role::ADMIN)), existing.clone());
        assert!(admin.check(&req()).await.is_ok());

        let user = gate(Some(Identity::new("u1", Role::USER)), existing.clone());
        let err = user.check(&req()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);
        assert_eq!(err.status().code(), 403);

        let anonymous = gate(None, existing);
        assert_eq!(anonymous.check(&req()).await.unwrap_err().kind(), ErrorKind::Unauthorized);
    }
}
