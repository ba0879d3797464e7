//! Application users and their permission flags.

use super::{check_length, check_persisted_id, Entity, EntityId, EntityKind, INVALID_ID};
use crate::error::ValidationError;
use std::fmt;

pub const ERRORMSG_INVALID_LOGIN: &str = "Invalid user name!";
pub const ERRORMSG_INVALID_PASSWORD: &str = "Invalid password!";
pub const ERRORMSG_INVALID_FULL_NAME: &str = "Invalid full name!";

#[derive(Clone, PartialEq, Eq, Default)]
pub struct User {
    id: EntityId,
    login: String,
    password: String,
    full_name: String,
    can_add: bool,
    can_edit: bool,
    can_delete: bool,
}

impl User {
    pub fn new(
        login: impl Into<String>,
        password: impl Into<String>,
        full_name: impl Into<String>,
    ) -> Result<Self, ValidationError> {
        let mut user = Self::default();
        user.set_login(login)?;
        user.set_password(password)?;
        user.set_full_name(full_name)?;
        Ok(user)
    }

    pub fn with_id(
        id: EntityId,
        login: impl Into<String>,
        password: impl Into<String>,
        full_name: impl Into<String>,
    ) -> Result<Self, ValidationError> {
        check_persisted_id(id)?;
        let mut user = Self::new(login, password, full_name)?;
        user.id = id;
        Ok(user)
    }

    /// Builder-style permission setter
    pub fn with_permissions(mut self, can_add: bool, can_edit: bool, can_delete: bool) -> Self {
        self.set_permissions(can_add, can_edit, can_delete);
        self
    }

    pub fn login(&self) -> &str {
        &self.login
    }

    pub fn password(&self) -> &str {
        &self.password
    }

    pub fn full_name(&self) -> &str {
        &self.full_name
    }

    pub fn can_add(&self) -> bool {
        self.can_add
    }

    pub fn can_edit(&self) -> bool {
        self.can_edit
    }

    pub fn can_delete(&self) -> bool {
        self.can_delete
    }

    pub fn valid_login(value: &str) -> Result<(), ValidationError> {
        check_length("login", value, false, 50, ERRORMSG_INVALID_LOGIN)
    }

    pub fn valid_password(value: &str) -> Result<(), ValidationError> {
        check_length("password", value, false, 255, ERRORMSG_INVALID_PASSWORD)
    }

    pub fn valid_full_name(value: &str) -> Result<(), ValidationError> {
        check_length("full_name", value, true, 255, ERRORMSG_INVALID_FULL_NAME)
    }

    pub fn set_login(&mut self, value: impl Into<String>) -> Result<(), ValidationError> {
        let value = value.into();
        Self::valid_login(&value)?;
        self.login = value;
        Ok(())
    }

    pub fn set_password(&mut self, value: impl Into<String>) -> Result<(), ValidationError> {
        let value = value.into();
        Self::valid_password(&value)?;
        self.password = value;
        Ok(())
    }

    pub fn set_full_name(&mut self, value: impl Into<String>) -> Result<(), ValidationError> {
        let value = value.into();
        Self::valid_full_name(&value)?;
        self.full_name = value;
        Ok(())
    }

    pub fn set_permissions(&mut self, can_add: bool, can_edit: bool, can_delete: bool) {
        self.can_add = can_add;
        self.can_edit = can_edit;
        self.can_delete = can_delete;
    }
}

// Keep the password out of logs.
impl fmt::Debug for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("User")
            .field("id", &self.id)
            .field("login", &self.login)
            .field("full_name", &self.full_name)
            .field("can_add", &self.can_add)
            .field("can_edit", &self.can_edit)
            .field("can_delete", &self.can_delete)
            .finish_non_exhaustive()
    }
}

impl Entity for User {
    const KIND: EntityKind = EntityKind::User;

    fn id(&self) -> EntityId {
        self.id
    }

    fn set_id(&mut self, id: EntityId) {
        self.id = id;
    }

    fn validate(&self) -> Result<(), ValidationError> {
        if self.id != INVALID_ID {
            check_persisted_id(self.id)?;
        }
        Self::valid_login(&self.login)?;
        Self::valid_password(&self.password)?;
        Self::valid_full_name(&self.full_name)
    }

    fn label(&self) -> String {
        if self.full_name.is_empty() {
            self.login.clone()
        } else {
            format!("{} ({})", self.full_name, self.login)
        }
    }

    fn unique_key(&self) -> Option<&str> {
        Some(&self.login)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_hides_password() {
        let user = User::new("jdoe", "hunter2", "Jane Doe").unwrap();
        let debug = format!("{user:?}");
        assert!(debug.contains("jdoe"));
        assert!(!debug.contains("hunter2"));
    }

    #[test]
    fn test_login_rules() {
        assert!(User::valid_login("").is_err());
        assert!(User::valid_login(&"u".repeat(51)).is_err());
        assert!(User::valid_password("").is_err());
    }

    #[test]
    fn test_permissions_builder() {
        let user = User::new("ops", "pw", "")
            .unwrap()
            .with_permissions(true, false, true);
        assert!(user.can_add());
        assert!(!user.can_edit());
        assert!(user.can_delete());
        assert_eq!(user.label(), "ops");
    }
}
