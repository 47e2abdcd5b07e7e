//! Identity provider boundary.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use fieldtrack_core::{DomainError, DomainResult, UserId};

/// External authentication collaborator.
///
/// Real implementations talk to an auth service over the network (hence the
/// async contract); this core only consumes the opaque identity they hand
/// out. `AuthError`s from the provider are propagated unchanged as
/// [`DomainError::Auth`].
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Identity of the currently authenticated user, if any.
    fn current_user(&self) -> Option<UserId>;

    async fn login(&self, email: &str, password: &str) -> DomainResult<UserId>;

    async fn logout(&self);

    /// Register a new account. The returned id doubles as the profile row id.
    async fn register(&self, email: &str, password: &str) -> DomainResult<UserId>;
}

#[derive(Debug, Clone)]
struct Account {
    user_id: UserId,
    password: String,
}

/// In-memory identity provider for dev/tests.
///
/// No hashing, no tokens; credential handling belongs to the real auth
/// collaborator, not this core.
#[derive(Debug, Default)]
pub struct InMemoryIdentity {
    accounts: RwLock<HashMap<String, Account>>,
    current: RwLock<Option<UserId>>,
}

impl InMemoryIdentity {
    pub fn new() -> Self {
        Self::default()
    }

    /// Provider with an already-authenticated user, for tests that don't
    /// exercise the login flow.
    pub fn logged_in(user_id: UserId) -> Self {
        let provider = Self::new();
        *provider.current.write().unwrap() = Some(user_id);
        provider
    }
}

#[async_trait]
impl IdentityProvider for InMemoryIdentity {
    fn current_user(&self) -> Option<UserId> {
        *self.current.read().unwrap()
    }

    async fn login(&self, email: &str, password: &str) -> DomainResult<UserId> {
        let accounts = self.accounts.read().unwrap();
        let account = accounts
            .get(email)
            .ok_or_else(|| DomainError::auth("unknown account"))?;
        if account.password != password {
            return Err(DomainError::auth("invalid credentials"));
        }

        let user_id = account.user_id;
        drop(accounts);

        *self.current.write().unwrap() = Some(user_id);
        tracing::debug!(%user_id, "logged in");
        Ok(user_id)
    }

    async fn logout(&self) {
        *self.current.write().unwrap() = None;
    }

    async fn register(&self, email: &str, password: &str) -> DomainResult<UserId> {
        if email.is_empty() || password.is_empty() {
            return Err(DomainError::validation("email and password are required"));
        }

        let mut accounts = self.accounts.write().unwrap();
        if accounts.contains_key(email) {
            return Err(DomainError::auth("account already registered"));
        }

        let user_id = UserId::new();
        accounts.insert(
            email.to_string(),
            Account {
                user_id,
                password: password.to_string(),
            },
        );
        tracing::debug!(%user_id, email, "registered account");
        Ok(user_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn register_then_login_sets_current_user() {
        let identity = InMemoryIdentity::new();
        let user_id = identity.register("worker@example.com", "pw").await.unwrap();

        assert_eq!(identity.current_user(), None);

        let logged_in = identity.login("worker@example.com", "pw").await.unwrap();
        assert_eq!(logged_in, user_id);
        assert_eq!(identity.current_user(), Some(user_id));

        identity.logout().await;
        assert_eq!(identity.current_user(), None);
    }

    #[tokio::test]
    async fn login_rejects_bad_credentials() {
        let identity = InMemoryIdentity::new();
        identity.register("worker@example.com", "pw").await.unwrap();

        let err = identity.login("worker@example.com", "nope").await.unwrap_err();
        assert!(matches!(err, DomainError::Auth(_)));

        let err = identity.login("stranger@example.com", "pw").await.unwrap_err();
        assert!(matches!(err, DomainError::Auth(_)));
    }

    #[tokio::test]
    async fn duplicate_registration_is_rejected() {
        let identity = InMemoryIdentity::new();
        identity.register("worker@example.com", "pw").await.unwrap();

        let err = identity.register("worker@example.com", "pw2").await.unwrap_err();
        assert!(matches!(err, DomainError::Auth(_)));
    }
}
