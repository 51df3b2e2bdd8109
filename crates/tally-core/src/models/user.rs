//! User profile model

use serde::{Deserialize, Serialize};

/// Public profile of an authenticated user, returned with sync snapshots
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    /// Identity issued by the authentication provider
    pub id: String,
    /// Contact email, when the provider shares one
    pub email: Option<String>,
    /// Authorization roles
    pub roles: Vec<String>,
    /// Whether the account is active
    pub is_active: bool,
}

impl UserProfile {
    /// Profile for a newly seen user with the default role
    #[must_use]
    pub fn new(id: impl Into<String>, email: Option<String>) -> Self {
        Self {
            id: id.into(),
            email,
            roles: vec!["user".to_string()],
            is_active: true,
        }
    }
}
