/// The persisted role-assignment store. Role descriptors delegate all of
/// their membership operations here.
use std::collections::BTreeSet;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::Result;
use crate::key::CourseKey;
use crate::roles::{AccessRole, ForumRole};

mod memory;
mod postgres;

pub use memory::MemoryRoleStore;
pub use postgres::PgRoleStore;

#[async_trait]
pub trait RoleStore: Send + Sync {
    async fn has_user(&self, role: &AccessRole, user: Uuid) -> Result<bool>;

    /// Users who already hold the role are left alone.
    async fn add_users(&self, role: &AccessRole, users: &[Uuid]) -> Result<()>;

    /// Users who don't hold the role are ignored.
    async fn remove_users(&self, role: &AccessRole, users: &[Uuid]) -> Result<()>;

    async fn users_with_role(&self, role: &AccessRole) -> Result<BTreeSet<Uuid>>;

    /// Whether the user holds any of `roles` in the course's forums.
    async fn has_any_forum_role(
        &self,
        user: Uuid,
        course_key: &CourseKey,
        roles: &[ForumRole],
    ) -> Result<bool>;
}
