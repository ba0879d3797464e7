//! Explicit per-session context.
//!
//! A [`SessionContext`] is built once at login and passed down to whatever
//! needs to know who is acting. Nothing in the crate reads a global "current
//! user", so several sessions can live side by side in one process (tests
//! simulate two competing clients this way).

use crate::entity::User;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Opaque identifier of one logged-in session, used as the edit-lock holder
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a fresh id of the form `<login>-<8 hex chars>`
    pub fn generate(login: &str) -> Self {
        let suffix = Uuid::new_v4().simple().to_string();
        Self(format!("{login}-{}", &suffix[..8]))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Actions gated by user permission flags
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    Add,
    Edit,
    Delete,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verb = match self {
            Capability::Add => "add records",
            Capability::Edit => "edit records",
            Capability::Delete => "delete records",
        };
        f.write_str(verb)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Permissions {
    pub add: bool,
    pub edit: bool,
    pub delete: bool,
}

impl Permissions {
    pub fn all() -> Self {
        Self {
            add: true,
            edit: true,
            delete: true,
        }
    }

    pub fn allows(&self, capability: Capability) -> bool {
        match capability {
            Capability::Add => self.add,
            Capability::Edit => self.edit,
            Capability::Delete => self.delete,
        }
    }
}

/// Who is acting, and what they may do
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionContext {
    login: String,
    session_id: SessionId,
    permissions: Permissions,
}

impl SessionContext {
    pub fn new(login: impl Into<String>, session_id: SessionId, permissions: Permissions) -> Self {
        Self {
            login: login.into(),
            session_id,
            permissions,
        }
    }

    /// Start a session for a user, deriving permissions from its flags
    pub fn for_user(user: &User) -> Self {
        Self {
            login: user.login().to_string(),
            session_id: SessionId::generate(user.login()),
            permissions: Permissions {
                add: user.can_add(),
                edit: user.can_edit(),
                delete: user.can_delete(),
            },
        }
    }

    /// A session with no permissions at all
    pub fn anonymous() -> Self {
        Self {
            login: String::new(),
            session_id: SessionId::generate("anonymous"),
            permissions: Permissions::default(),
        }
    }

    pub fn login(&self) -> &str {
        &self.login
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    pub fn permissions(&self) -> Permissions {
        self.permissions
    }

    pub fn can(&self, capability: Capability) -> bool {
        self.permissions.allows(capability)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_ids_are_unique_per_session() {
        let a = SessionId::generate("jdoe");
        let b = SessionId::generate("jdoe");
        assert_ne!(a, b);
        assert!(a.as_str().starts_with("jdoe-"));
        assert_eq!(a.as_str().len(), "jdoe-".len() + 8);
    }

    #[test]
    fn test_for_user_copies_permission_flags() {
        let user = User::new("clerk", "pw", "Front Desk")
            .unwrap()
            .with_permissions(true, true, false);
        let session = SessionContext::for_user(&user);

        assert_eq!(session.login(), "clerk");
        assert!(session.can(Capability::Add));
        assert!(session.can(Capability::Edit));
        assert!(!session.can(Capability::Delete));
    }

    #[test]
    fn test_anonymous_session_can_do_nothing() {
        let session = SessionContext::anonymous();
        assert!(!session.can(Capability::Add));
        assert!(!session.can(Capability::Edit));
        assert!(!session.can(Capability::Delete));
    }

    #[test]
    fn test_two_sessions_for_same_user_differ() {
        let user = User::new("ops", "pw", "").unwrap();
        let first = SessionContext::for_user(&user);
        let second = SessionContext::for_user(&user);
        assert_ne!(first.session_id(), second.session_id());
    }
}
