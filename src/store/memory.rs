use std::collections::{BTreeSet, HashSet};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::anyhow;
use async_trait::async_trait;
use uuid::Uuid;

use super::RoleStore;
use crate::error::Result;
use crate::key::CourseKey;
use crate::roles::{AccessRole, ForumRole};

/// In-process role store. Used by tests and by servers configured with
/// `memory_store = true`.
#[derive(Default)]
pub struct MemoryRoleStore {
    members: RwLock<HashSet<(AccessRole, Uuid)>>,
}

impl MemoryRoleStore {
    pub fn new() -> MemoryRoleStore {
        MemoryRoleStore::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, HashSet<(AccessRole, Uuid)>>> {
        Ok(self
            .members
            .read()
            .map_err(|_| anyhow!("Role store lock poisoned"))?)
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, HashSet<(AccessRole, Uuid)>>> {
        Ok(self
            .members
            .write()
            .map_err(|_| anyhow!("Role store lock poisoned"))?)
    }
}

#[async_trait]
impl RoleStore for MemoryRoleStore {
    async fn has_user(&self, role: &AccessRole, user: Uuid) -> Result<bool> {
        Ok(self.read()?.contains(&(role.clone(), user)))
    }

    async fn add_users(&self, role: &AccessRole, users: &[Uuid]) -> Result<()> {
        let mut members = self.write()?;
        for user in users {
            members.insert((role.clone(), *user));
        }
        Ok(())
    }

    async fn remove_users(&self, role: &AccessRole, users: &[Uuid]) -> Result<()> {
        let mut members = self.write()?;
        for user in users {
            members.remove(&(role.clone(), *user));
        }
        Ok(())
    }

    async fn users_with_role(&self, role: &AccessRole) -> Result<BTreeSet<Uuid>> {
        Ok(self
            .read()?
            .iter()
            .filter(|(held, _)| held == role)
            .map(|(_, user)| *user)
            .collect())
    }

    async fn has_any_forum_role(
        &self,
        user: Uuid,
        course_key: &CourseKey,
        roles: &[ForumRole],
    ) -> Result<bool> {
        let members = self.read()?;
        Ok(roles.iter().any(|kind| {
            members.contains(&(
                AccessRole::Forum {
                    kind: *kind,
                    course: course_key.clone(),
                },
                user,
            ))
        }))
    }
}
