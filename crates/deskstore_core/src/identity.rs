//! Owner identity source.
//!
//! The authentication front end decides who the current user is; the store
//! only needs that user's id as an opaque partition key. Authorization is
//! the caller's job: nothing here checks what the owner may read or write.

use parking_lot::RwLock;

/// Supplies the id of the signed-in owner.
pub trait IdentityProvider: Send + Sync {
    /// Returns the signed-in owner id, if any.
    fn current_user(&self) -> Option<String>;

    /// Signs `owner_id` in, replacing any previous identity.
    fn login(&self, owner_id: &str);

    /// Signs the current identity out.
    fn logout(&self);
}

/// An in-process session holding at most one signed-in owner.
#[derive(Debug, Default)]
pub struct SessionIdentity {
    current: RwLock<Option<String>>,
}

impl SessionIdentity {
    /// Creates a signed-out session.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a session already signed in as `owner_id`.
    pub fn signed_in(owner_id: impl Into<String>) -> Self {
        Self {
            current: RwLock::new(Some(owner_id.into())),
        }
    }
}

impl IdentityProvider for SessionIdentity {
    fn current_user(&self) -> Option<String> {
        self.current.read().clone()
    }

    fn login(&self, owner_id: &str) {
        *self.current.write() = Some(owner_id.to_string());
    }

    fn logout(&self) {
        *self.current.write() = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn login_logout_cycle() {
        let session = SessionIdentity::new();
        assert_eq!(session.current_user(), None);

        session.login("u1");
        assert_eq!(session.current_user().as_deref(), Some("u1"));

        session.login("u2");
        assert_eq!(session.current_user().as_deref(), Some("u2"));

        session.logout();
        assert_eq!(session.current_user(), None);
    }
}
