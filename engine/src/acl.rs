//! Access control lists.
//!
//! An ACL maps an access key to read/write grants. Keys are a user's
//! objectId, `role:<name>` for roles, or `*` for public access. Only granted
//! permissions are kept, so an empty entry disappears from the wire form.

use crate::{error::Result, Error};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Access key for public access.
pub const PUBLIC_KEY: &str = "*";

const ROLE_PREFIX: &str = "role:";

/// Read/write grants for one access key.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permissions {
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub read: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub write: bool,
}

impl Permissions {
    fn is_empty(&self) -> bool {
        !self.read && !self.write
    }
}

/// An access control list attached to an object under the `ACL` key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Acl {
    permissions: BTreeMap<String, Permissions>,
}

impl Acl {
    pub fn new() -> Self {
        Self::default()
    }

    /// An ACL granting full access to one user.
    pub fn for_user(user_id: impl Into<String>) -> Self {
        let user_id = user_id.into();
        let mut acl = Self::new();
        acl.set_read_access(&user_id, true);
        acl.set_write_access(&user_id, true);
        acl
    }

    pub fn set_read_access(&mut self, key: &str, allowed: bool) {
        self.update(key, |p| p.read = allowed);
    }

    pub fn set_write_access(&mut self, key: &str, allowed: bool) {
        self.update(key, |p| p.write = allowed);
    }

    pub fn read_access(&self, key: &str) -> bool {
        self.permissions.get(key).is_some_and(|p| p.read)
    }

    pub fn write_access(&self, key: &str) -> bool {
        self.permissions.get(key).is_some_and(|p| p.write)
    }

    pub fn set_public_read_access(&mut self, allowed: bool) {
        self.set_read_access(PUBLIC_KEY, allowed);
    }

    pub fn set_public_write_access(&mut self, allowed: bool) {
        self.set_write_access(PUBLIC_KEY, allowed);
    }

    pub fn public_read_access(&self) -> bool {
        self.read_access(PUBLIC_KEY)
    }

    pub fn public_write_access(&self) -> bool {
        self.write_access(PUBLIC_KEY)
    }

    pub fn set_role_read_access(&mut self, role: &str, allowed: bool) {
        self.set_read_access(&format!("{ROLE_PREFIX}{role}"), allowed);
    }

    pub fn set_role_write_access(&mut self, role: &str, allowed: bool) {
        self.set_write_access(&format!("{ROLE_PREFIX}{role}"), allowed);
    }

    pub fn role_read_access(&self, role: &str) -> bool {
        self.read_access(&format!("{ROLE_PREFIX}{role}"))
    }

    pub fn role_write_access(&self, role: &str) -> bool {
        self.write_access(&format!("{ROLE_PREFIX}{role}"))
    }

    pub fn is_empty(&self) -> bool {
        self.permissions.is_empty()
    }

    /// Wire form: `{"<key>": {"read": true, "write": true}, ...}`.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }

    /// Parse the wire form. Entries that grant nothing are dropped.
    pub fn from_json(json: &serde_json::Value) -> Result<Self> {
        let mut acl: Acl = serde_json::from_value(json.clone())
            .map_err(|e| Error::InvalidWireValue(format!("ACL: {e}")))?;
        acl.permissions.retain(|_, p| !p.is_empty());
        Ok(acl)
    }

    fn update(&mut self, key: &str, f: impl FnOnce(&mut Permissions)) {
        let entry = self.permissions.entry(key.to_string()).or_default();
        f(entry);
        if entry.is_empty() {
            self.permissions.remove(key);
        }
    }
}
