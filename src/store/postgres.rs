use std::collections::BTreeSet;

use anyhow::Context;
use async_trait::async_trait;
use sqlx::postgres::PgPool;
use uuid::Uuid;

use super::RoleStore;
use crate::error::Result;
use crate::key::CourseKey;
use crate::roles::{AccessRole, ForumRole};

/// Postgres-backed role store. See `migrations/` for the schema.
#[derive(Clone)]
pub struct PgRoleStore {
    pool: PgPool,
}

/// Where a role's memberships live.
enum Target {
    /// `course_access_role` row scope. Absent org/course are empty strings.
    Access {
        role: &'static str,
        org: String,
        course_id: String,
    },
    /// `forum_role_assignment` row scope.
    Forum { name: &'static str, course_id: String },
}

impl Target {
    fn of(role: &AccessRole) -> Target {
        match role {
            AccessRole::Forum { kind, course } => Target::Forum {
                name: kind.name(),
                course_id: course.to_string(),
            },
            _ => Target::Access {
                role: role.name(),
                org: role.org().unwrap_or_default().to_string(),
                course_id: role
                    .course_key()
                    .map(CourseKey::to_string)
                    .unwrap_or_default(),
            },
        }
    }
}

impl PgRoleStore {
    pub fn new(pool: PgPool) -> PgRoleStore {
        PgRoleStore { pool }
    }

    /// Create or update the role tables.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .context("Failed to run role table migrations")?;
        Ok(())
    }
}

#[async_trait]
impl RoleStore for PgRoleStore {
    async fn has_user(&self, role: &AccessRole, user: Uuid) -> Result<bool> {
        let (exists,): (bool,) = match Target::of(role) {
            Target::Access {
                role,
                org,
                course_id,
            } => sqlx::query_as::<_, (bool,)>(
                r#"
                select exists(
                  select 1
                  from course_access_role
                  where user_id = $1 and role = $2 and org = $3 and course_id = $4
                )
                "#,
            )
            .bind(user)
            .bind(role)
            .bind(org)
            .bind(course_id)
            .fetch_one(&self.pool)
            .await,
            Target::Forum { name, course_id } => sqlx::query_as::<_, (bool,)>(
                r#"
                select exists(
                  select 1
                  from forum_role_assignment
                  where user_id = $1 and name = $2 and course_id = $3
                )
                "#,
            )
            .bind(user)
            .bind(name)
            .bind(course_id)
            .fetch_one(&self.pool)
            .await,
        }
        .with_context(|| format!("Failed to check {role} for {user}"))?;
        Ok(exists)
    }

    async fn add_users(&self, role: &AccessRole, users: &[Uuid]) -> Result<()> {
        match Target::of(role) {
            Target::Access {
                role,
                org,
                course_id,
            } => sqlx::query(
                r#"
                insert into course_access_role (user_id, role, org, course_id)
                select unnest($1::uuid[]), $2, $3, $4
                on conflict do nothing
                "#,
            )
            .bind(users)
            .bind(role)
            .bind(org)
            .bind(course_id)
            .execute(&self.pool)
            .await,
            Target::Forum { name, course_id } => sqlx::query(
                r#"
                insert into forum_role_assignment (user_id, name, course_id)
                select unnest($1::uuid[]), $2, $3
                on conflict do nothing
                "#,
            )
            .bind(users)
            .bind(name)
            .bind(course_id)
            .execute(&self.pool)
            .await,
        }
        .with_context(|| format!("Failed to add users to {role}"))?;
        Ok(())
    }

    async fn remove_users(&self, role: &AccessRole, users: &[Uuid]) -> Result<()> {
        match Target::of(role) {
            Target::Access {
                role,
                org,
                course_id,
            } => sqlx::query(
                r#"
                delete from course_access_role
                where user_id = any($1) and role = $2 and org = $3 and course_id = $4
                "#,
            )
            .bind(users)
            .bind(role)
            .bind(org)
            .bind(course_id)
            .execute(&self.pool)
            .await,
            Target::Forum { name, course_id } => sqlx::query(
                r#"
                delete from forum_role_assignment
                where user_id = any($1) and name = $2 and course_id = $3
                "#,
            )
            .bind(users)
            .bind(name)
            .bind(course_id)
            .execute(&self.pool)
            .await,
        }
        .with_context(|| format!("Failed to remove users from {role}"))?;
        Ok(())
    }

    async fn users_with_role(&self, role: &AccessRole) -> Result<BTreeSet<Uuid>> {
        let rows: Vec<(Uuid,)> = match Target::of(role) {
            Target::Access {
                role,
                org,
                course_id,
            } => sqlx::query_as::<_, (Uuid,)>(
                r#"
                select user_id
                from course_access_role
                where role = $1 and org = $2 and course_id = $3
                "#,
            )
            .bind(role)
            .bind(org)
            .bind(course_id)
            .fetch_all(&self.pool)
            .await,
            Target::Forum { name, course_id } => sqlx::query_as::<_, (Uuid,)>(
                r#"
                select user_id
                from forum_role_assignment
                where name = $1 and course_id = $2
                "#,
            )
            .bind(name)
            .bind(course_id)
            .fetch_all(&self.pool)
            .await,
        }
        .with_context(|| format!("Failed to list users with {role}"))?;
        Ok(rows.into_iter().map(|(user,)| user).collect())
    }

    async fn has_any_forum_role(
        &self,
        user: Uuid,
        course_key: &CourseKey,
        roles: &[ForumRole],
    ) -> Result<bool> {
        let names: Vec<String> = roles.iter().map(|role| role.name().to_string()).collect();
        let (exists,): (bool,) = sqlx::query_as(
            r#"
            select exists(
              select 1
              from forum_role_assignment
              where user_id = $1 and course_id = $2 and name = any($3)
            )
            "#,
        )
        .bind(user)
        .bind(course_key.to_string())
        .bind(names)
        .fetch_one(&self.pool)
        .await
        .with_context(|| format!("Failed to check forum roles for {user} in {course_key}"))?;
        Ok(exists)
    }
}
