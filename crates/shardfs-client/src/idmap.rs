//! User/group identity resolution.
//!
//! The facade passes name-based chown and id↔name queries through a
//! resolver; where the identities come from (OS account database, sssd,
//! a deployment-provided table) is the embedder's concern.

use crate::error::{Result, StorageError};
use std::collections::HashMap;

pub trait IdentityResolver: Send + Sync {
    fn uid_of(&self, user: &str) -> Result<u32>;
    fn gid_of(&self, group: &str) -> Result<u32>;
    /// Primary group of a user.
    fn gid_of_user(&self, user: &str) -> Result<u32>;
    fn user_of(&self, uid: u32) -> Result<String>;
    fn group_of(&self, gid: u32) -> Result<String>;
}

/// Table-backed resolver populated by the embedder.
#[derive(Debug, Default)]
pub struct StaticResolver {
    users: HashMap<String, (u32, u32)>,
    groups: HashMap<String, u32>,
}

impl StaticResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_user(&mut self, name: &str, uid: u32, primary_gid: u32) {
        self.users.insert(name.to_string(), (uid, primary_gid));
    }

    pub fn add_group(&mut self, name: &str, gid: u32) {
        self.groups.insert(name.to_string(), gid);
    }
}

impl IdentityResolver for StaticResolver {
    fn uid_of(&self, user: &str) -> Result<u32> {
        self.users
            .get(user)
            .map(|(uid, _)| *uid)
            .ok_or_else(|| StorageError::InvalidArgument {
                msg: format!("unknown user: {user}"),
            })
    }

    fn gid_of(&self, group: &str) -> Result<u32> {
        self.groups
            .get(group)
            .copied()
            .ok_or_else(|| StorageError::InvalidArgument {
                msg: format!("unknown group: {group}"),
            })
    }

    fn gid_of_user(&self, user: &str) -> Result<u32> {
        self.users
            .get(user)
            .map(|(_, gid)| *gid)
            .ok_or_else(|| StorageError::InvalidArgument {
                msg: format!("unknown user: {user}"),
            })
    }

    fn user_of(&self, uid: u32) -> Result<String> {
        self.users
            .iter()
            .find(|(_, (id, _))| *id == uid)
            .map(|(name, _)| name.clone())
            .ok_or_else(|| StorageError::InvalidArgument {
                msg: format!("unknown uid: {uid}"),
            })
    }

    fn group_of(&self, gid: u32) -> Result<String> {
        self.groups
            .iter()
            .find(|(_, id)| **id == gid)
            .map(|(name, _)| name.clone())
            .ok_or_else(|| StorageError::InvalidArgument {
                msg: format!("unknown gid: {gid}"),
            })
    }
}
