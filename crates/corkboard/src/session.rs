//! Explicit session context.
//!
//! The acting user is passed into every operation that needs one instead of being
//! read from ambient global state.

use corkboard_api::CoreError;
use corkboard_core::IdentityProvider;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    user_id: Option<String>,
}

impl Session {
    pub fn authenticated(user_id: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
        }
    }

    pub fn anonymous() -> Self {
        Self { user_id: None }
    }

    pub fn from_identity(identity: &dyn IdentityProvider) -> Self {
        Self {
            user_id: identity.current_user_id(),
        }
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    /// The signed-in user, or `CoreError::Unauthenticated`.
    pub fn require_user(&self) -> Result<&str, CoreError> {
        self.user_id().ok_or(CoreError::Unauthenticated)
    }
}

/// Identity provider with a fixed answer, for tests and single-user setups.
#[derive(Debug, Clone, Default)]
pub struct StaticIdentity(pub Option<String>);

impl IdentityProvider for StaticIdentity {
    fn current_user_id(&self) -> Option<String> {
        self.0.clone()
    }
}
