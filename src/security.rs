//! Authorization
//!
//! Caches may carry an `AuthorizationManager`. Running a MapReduce task over
//! such a cache requires the `Exec` permission.

use crate::error::{GridError, Result};

use std::collections::HashSet;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Permission {
    Read,
    Write,
    Exec,
    Admin,
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Permission::Read => "READ",
            Permission::Write => "WRITE",
            Permission::Exec => "EXEC",
            Permission::Admin => "ADMIN",
        };
        f.write_str(name)
    }
}

pub trait AuthorizationManager: Send + Sync {
    fn check_permission(&self, permission: Permission) -> Result<()>;
}

/// Grants a fixed set of permissions to one subject.
/// `Admin` implies every other permission.
pub struct PermissionSet {
    subject: String,
    granted: HashSet<Permission>,
}

impl PermissionSet {
    pub fn new(subject: impl Into<String>, granted: impl IntoIterator<Item = Permission>) -> Self {
        Self {
            subject: subject.into(),
            granted: granted.into_iter().collect(),
        }
    }
}

impl AuthorizationManager for PermissionSet {
    fn check_permission(&self, permission: Permission) -> Result<()> {
        if self.granted.contains(&permission) || self.granted.contains(&Permission::Admin) {
            return Ok(());
        }
        tracing::warn!("{} denied {} permission", self.subject, permission);
        Err(GridError::Authorization {
            permission: permission.to_string(),
            reason: format!("subject {} lacks it", self.subject),
        })
    }
}
