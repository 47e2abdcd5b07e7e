//! User profile record.

use serde::{Deserialize, Serialize};

use crate::id::UserId;

/// Profile row for an authenticated user.
///
/// The id equals the identity id handed out at login, so the profile row of
/// the current user is always addressable without a lookup. Created on first
/// successful registration; never deleted by this core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: UserId,
    pub display_name: String,
    pub contact_number: Option<String>,
    /// Stable login handle.
    pub email: String,
}

impl UserProfile {
    /// Fresh profile as created at registration time.
    pub fn registered(id: UserId, email: impl Into<String>) -> Self {
        Self {
            id,
            display_name: String::new(),
            contact_number: None,
            email: email.into(),
        }
    }

    /// Apply a profile edit (display name and contact number are the only
    /// user-mutable fields).
    pub fn edited(mut self, display_name: impl Into<String>, contact_number: Option<String>) -> Self {
        self.display_name = display_name.into();
        self.contact_number = contact_number;
        self
    }
}
