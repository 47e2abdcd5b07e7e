//! Session context over an identity provider.

use std::sync::Arc;

use fieldtrack_core::{DomainError, DomainResult, UserId};

use crate::identity::IdentityProvider;

/// Process-scoped session handle.
///
/// Wraps the identity collaborator and is passed by reference to every
/// component that scopes queries or stamps ownership. Cheap to clone.
#[derive(Clone)]
pub struct Session {
    provider: Arc<dyn IdentityProvider>,
}

impl Session {
    pub fn new(provider: Arc<dyn IdentityProvider>) -> Self {
        Self { provider }
    }

    pub fn current_user(&self) -> Option<UserId> {
        self.provider.current_user()
    }

    pub fn is_logged_in(&self) -> bool {
        self.provider.current_user().is_some()
    }

    /// Identity of the current user, or an auth error for writes that must
    /// stamp ownership.
    pub fn require_user(&self) -> DomainResult<UserId> {
        self.provider
            .current_user()
            .ok_or_else(|| DomainError::auth("no authenticated user"))
    }

    pub async fn login(&self, email: &str, password: &str) -> DomainResult<UserId> {
        self.provider.login(email, password).await
    }

    pub async fn logout(&self) {
        self.provider.logout().await;
    }

    pub async fn register(&self, email: &str, password: &str) -> DomainResult<UserId> {
        self.provider.register(email, password).await
    }
}

impl core::fmt::Debug for Session {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Session")
            .field("current_user", &self.current_user())
            .finish()
    }
}
