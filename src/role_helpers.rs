/// Role checks and mutations used by course views and the admin API. Every
/// operation except the staff check runs its arguments through the matching
/// filter pipeline first, then works on whatever the pipeline hands back.
use std::collections::BTreeSet;

use log::{debug, info, trace};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::filters::{FilterRegistry, FilterType, RoleAccessArgs};
use crate::key::CourseKey;
use crate::request_cache::RequestCache;
use crate::roles::{AccessRole, ForumRole};
use crate::store::RoleStore;

/// True if the user is course staff, instructor, or beta tester, staff or
/// instructor of the course's org, global staff, or holds any forum
/// moderation role in the course. Memoized for the life of `cache`.
pub async fn has_staff_roles(
    cache: &mut RequestCache,
    store: &dyn RoleStore,
    user: Uuid,
    course_key: &CourseKey,
) -> Result<bool> {
    if let Some(cached) = cache.staff_roles(user, course_key) {
        trace!("Staff role cache hit for {user} in {course_key}");
        return Ok(cached);
    }

    let org = course_key.org().to_string();
    let roles = [
        AccessRole::CourseStaff(course_key.clone()),
        AccessRole::CourseInstructor(course_key.clone()),
        AccessRole::CourseBetaTester(course_key.clone()),
        AccessRole::OrgStaff(org.clone()),
        AccessRole::OrgInstructor(org),
        AccessRole::GlobalStaff,
    ];
    let mut has_staff_roles = false;
    for role in &roles {
        if role.has_user(store, user).await? {
            has_staff_roles = true;
            break;
        }
    }
    if !has_staff_roles {
        has_staff_roles = store
            .has_any_forum_role(user, course_key, &ForumRole::STAFF)
            .await?;
    }

    debug!("{user} has staff roles in {course_key}: {has_staff_roles}");
    cache.set_staff_roles(user, course_key, has_staff_roles);
    Ok(has_staff_roles)
}

/// Whether the user holds each of `roles`, in order.
pub async fn has_role_access(
    store: &dyn RoleStore,
    filters: &FilterRegistry,
    user: Uuid,
    roles: Vec<AccessRole>,
    course_key: CourseKey,
) -> Result<Vec<bool>> {
    let RoleAccessArgs { user, roles, .. } = run_filter(
        filters,
        FilterType::AccessRoleCheckRequested,
        Some(user),
        roles,
        course_key,
    )?;
    let user = require_user(FilterType::AccessRoleCheckRequested, user)?;

    let mut results = Vec::with_capacity(roles.len());
    for role in &roles {
        results.push(role.has_user(store, user).await?);
    }
    Ok(results)
}

/// Grant each of `roles` to the user. Grants are not atomic across roles: if
/// one fails the earlier ones stay.
pub async fn add_role_access(
    store: &dyn RoleStore,
    filters: &FilterRegistry,
    user: Uuid,
    roles: Vec<AccessRole>,
    course_key: CourseKey,
) -> Result<()> {
    let RoleAccessArgs { user, roles, .. } = run_filter(
        filters,
        FilterType::AccessRoleAdditionRequested,
        Some(user),
        roles,
        course_key,
    )?;
    let user = require_user(FilterType::AccessRoleAdditionRequested, user)?;

    for role in &roles {
        role.add_users(store, &[user]).await?;
        info!("Granted {role} to {user}");
    }
    Ok(())
}

/// Revoke each of `roles` from the user. Pass a single role as a one-element
/// list.
pub async fn remove_role_access(
    store: &dyn RoleStore,
    filters: &FilterRegistry,
    user: Uuid,
    roles: Vec<AccessRole>,
    course_key: CourseKey,
) -> Result<()> {
    let RoleAccessArgs { user, roles, .. } = run_filter(
        filters,
        FilterType::AccessRoleRemovalRequested,
        Some(user),
        roles,
        course_key,
    )?;
    let user = require_user(FilterType::AccessRoleRemovalRequested, user)?;

    for role in &roles {
        role.remove_users(store, &[user]).await?;
        info!("Revoked {role} from {user}");
    }
    Ok(())
}

/// Current holders of each of `roles`, in order.
pub async fn get_users_with_role(
    store: &dyn RoleStore,
    filters: &FilterRegistry,
    roles: Vec<AccessRole>,
    course_key: CourseKey,
) -> Result<Vec<BTreeSet<Uuid>>> {
    Ok(get_role_members(store, filters, roles, course_key)
        .await?
        .into_iter()
        .map(|(_, users)| users)
        .collect())
}

/// Like `get_users_with_role`, but pairs each user set with the role it
/// belongs to, since the pipeline may have rewritten the role list.
pub async fn get_role_members(
    store: &dyn RoleStore,
    filters: &FilterRegistry,
    roles: Vec<AccessRole>,
    course_key: CourseKey,
) -> Result<Vec<(AccessRole, BTreeSet<Uuid>)>> {
    let RoleAccessArgs { roles, .. } = run_filter(
        filters,
        FilterType::UsersWithRolesRequested,
        None,
        roles,
        course_key,
    )?;

    let mut members = Vec::with_capacity(roles.len());
    for role in roles {
        let users = role.users_with_role(store).await?;
        members.push((role, users));
    }
    Ok(members)
}

fn run_filter(
    filters: &FilterRegistry,
    filter: FilterType,
    user: Option<Uuid>,
    roles: Vec<AccessRole>,
    course_key: CourseKey,
) -> Result<RoleAccessArgs> {
    filters.run_filter(
        filter,
        RoleAccessArgs {
            user,
            roles,
            course_key,
        },
    )
}

fn require_user(filter: FilterType, user: Option<Uuid>) -> Result<Uuid> {
    user.ok_or_else(|| Error::AppError(format!("{filter} pipeline dropped the user")))
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use anyhow::anyhow;
    use async_trait::async_trait;

    use super::*;
    use crate::filters::{DenyRoles, FilterPipeline, PipelineStep, StepResult, StripRoles};
    use crate::store::MemoryRoleStore;

    type TestResult = Result<()>;

    const ALICE: Uuid = Uuid::from_u128(0xa11ce);
    const BOB: Uuid = Uuid::from_u128(0xb0b);

    fn course() -> CourseKey {
        CourseKey::new("edX", "DemoX", "2024_T1").unwrap()
    }

    fn other_course() -> CourseKey {
        CourseKey::new("MITx", "6.002x", "2024_T1").unwrap()
    }

    /// Counts store lookups so memoization can be observed.
    #[derive(Default)]
    struct CountingStore {
        inner: MemoryRoleStore,
        lookups: AtomicUsize,
    }

    impl CountingStore {
        fn lookups(&self) -> usize {
            self.lookups.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl RoleStore for CountingStore {
        async fn has_user(&self, role: &AccessRole, user: Uuid) -> Result<bool> {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            self.inner.has_user(role, user).await
        }

        async fn add_users(&self, role: &AccessRole, users: &[Uuid]) -> Result<()> {
            self.inner.add_users(role, users).await
        }

        async fn remove_users(&self, role: &AccessRole, users: &[Uuid]) -> Result<()> {
            self.inner.remove_users(role, users).await
        }

        async fn users_with_role(&self, role: &AccessRole) -> Result<BTreeSet<Uuid>> {
            self.inner.users_with_role(role).await
        }

        async fn has_any_forum_role(
            &self,
            user: Uuid,
            course_key: &CourseKey,
            roles: &[ForumRole],
        ) -> Result<bool> {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            self.inner.has_any_forum_role(user, course_key, roles).await
        }
    }

    /// Fails every write to one role, to observe partial grants.
    struct FailingRole {
        inner: MemoryRoleStore,
        failing: AccessRole,
    }

    #[async_trait]
    impl RoleStore for FailingRole {
        async fn has_user(&self, role: &AccessRole, user: Uuid) -> Result<bool> {
            self.inner.has_user(role, user).await
        }

        async fn add_users(&self, role: &AccessRole, users: &[Uuid]) -> Result<()> {
            if *role == self.failing {
                return Err(anyhow!("connection reset").into());
            }
            self.inner.add_users(role, users).await
        }

        async fn remove_users(&self, role: &AccessRole, users: &[Uuid]) -> Result<()> {
            self.inner.remove_users(role, users).await
        }

        async fn users_with_role(&self, role: &AccessRole) -> Result<BTreeSet<Uuid>> {
            self.inner.users_with_role(role).await
        }

        async fn has_any_forum_role(
            &self,
            user: Uuid,
            course_key: &CourseKey,
            roles: &[ForumRole],
        ) -> Result<bool> {
            self.inner.has_any_forum_role(user, course_key, roles).await
        }
    }

    /// Rewrites every request to be about Bob.
    struct ActAsBob;

    impl PipelineStep for ActAsBob {
        fn name(&self) -> &str {
            "act_as_bob"
        }

        fn run(&self, _filter: FilterType, mut args: RoleAccessArgs) -> StepResult {
            args.user = Some(BOB);
            Ok(args)
        }
    }

    struct DropUser;

    impl PipelineStep for DropUser {
        fn name(&self) -> &str {
            "drop_user"
        }

        fn run(&self, _filter: FilterType, mut args: RoleAccessArgs) -> StepResult {
            args.user = None;
            Ok(args)
        }
    }

    /// Each of the seven kinds that count as staff.
    fn staff_grants() -> Vec<AccessRole> {
        vec![
            AccessRole::CourseStaff(course()),
            AccessRole::CourseInstructor(course()),
            AccessRole::CourseBetaTester(course()),
            AccessRole::OrgStaff("edX".to_string()),
            AccessRole::OrgInstructor("edX".to_string()),
            AccessRole::GlobalStaff,
            AccessRole::Forum {
                kind: ForumRole::CommunityTa,
                course: course(),
            },
        ]
    }

    mod staff_roles {
        use super::*;

        #[actix_web::test]
        async fn each_staff_kind_counts() -> TestResult {
            for role in staff_grants() {
                let store = MemoryRoleStore::new();
                role.add_users(&store, &[ALICE]).await?;
                let mut cache = RequestCache::new();
                assert!(
                    has_staff_roles(&mut cache, &store, ALICE, &course()).await?,
                    "{role} should count as staff"
                );
            }
            Ok(())
        }

        #[actix_web::test]
        async fn every_forum_role_counts() -> TestResult {
            for kind in ForumRole::STAFF {
                let store = MemoryRoleStore::new();
                AccessRole::Forum {
                    kind,
                    course: course(),
                }
                .add_users(&store, &[ALICE])
                .await?;
                let mut cache = RequestCache::new();
                assert!(has_staff_roles(&mut cache, &store, ALICE, &course()).await?);
            }
            Ok(())
        }

        #[actix_web::test]
        async fn instructor_only_is_staff() -> TestResult {
            let store = MemoryRoleStore::new();
            AccessRole::CourseInstructor(course())
                .add_users(&store, &[ALICE])
                .await?;
            let mut cache = RequestCache::new();
            assert!(has_staff_roles(&mut cache, &store, ALICE, &course()).await?);
            Ok(())
        }

        #[actix_web::test]
        async fn no_roles_is_not_staff() -> TestResult {
            let store = MemoryRoleStore::new();
            let mut cache = RequestCache::new();
            assert!(!has_staff_roles(&mut cache, &store, ALICE, &course()).await?);
            Ok(())
        }

        #[actix_web::test]
        async fn non_staff_roles_and_other_scopes_dont_count() -> TestResult {
            let store = MemoryRoleStore::new();
            for role in [
                AccessRole::CourseLimitedStaff(course()),
                AccessRole::CourseDataResearcher(course()),
                AccessRole::CourseCcxCoach(course()),
                AccessRole::CourseStaff(other_course()),
                AccessRole::OrgStaff("MITx".to_string()),
                AccessRole::Forum {
                    kind: ForumRole::Moderator,
                    course: other_course(),
                },
            ] {
                role.add_users(&store, &[ALICE]).await?;
            }
            AccessRole::CourseStaff(course())
                .add_users(&store, &[BOB])
                .await?;

            let mut cache = RequestCache::new();
            assert!(!has_staff_roles(&mut cache, &store, ALICE, &course()).await?);
            Ok(())
        }

        #[actix_web::test]
        async fn memoized_within_a_request() -> TestResult {
            let store = CountingStore::default();
            let mut cache = RequestCache::new();

            assert!(!has_staff_roles(&mut cache, &store, ALICE, &course()).await?);
            let lookups = store.lookups();
            assert_eq!(lookups, 7);

            // A grant made mid-request is not seen until the next request.
            AccessRole::CourseStaff(course())
                .add_users(&store, &[ALICE])
                .await?;
            assert!(!has_staff_roles(&mut cache, &store, ALICE, &course()).await?);
            assert_eq!(store.lookups(), lookups);

            let mut next_request = RequestCache::new();
            assert!(has_staff_roles(&mut next_request, &store, ALICE, &course()).await?);
            Ok(())
        }

        #[actix_web::test]
        async fn stops_at_first_hit() -> TestResult {
            let store = CountingStore::default();
            AccessRole::CourseStaff(course())
                .add_users(&store, &[ALICE])
                .await?;
            let mut cache = RequestCache::new();
            assert!(has_staff_roles(&mut cache, &store, ALICE, &course()).await?);
            assert_eq!(store.lookups(), 1);
            Ok(())
        }

        #[actix_web::test]
        async fn cache_is_per_user_and_course() -> TestResult {
            let store = CountingStore::default();
            let mut cache = RequestCache::new();
            has_staff_roles(&mut cache, &store, ALICE, &course()).await?;
            has_staff_roles(&mut cache, &store, BOB, &course()).await?;
            has_staff_roles(&mut cache, &store, ALICE, &other_course()).await?;
            assert_eq!(store.lookups(), 21);
            assert_eq!(cache.len(), 3);
            Ok(())
        }
    }

    mod role_access {
        use super::*;

        #[actix_web::test]
        async fn grant_then_check() -> TestResult {
            let store = MemoryRoleStore::new();
            let filters = FilterRegistry::new();
            let staff = vec![AccessRole::CourseStaff(course())];

            assert_eq!(
                has_role_access(&store, &filters, ALICE, staff.clone(), course()).await?,
                vec![false]
            );
            add_role_access(&store, &filters, ALICE, staff.clone(), course()).await?;
            assert_eq!(
                has_role_access(&store, &filters, ALICE, staff, course()).await?,
                vec![true]
            );
            Ok(())
        }

        #[actix_web::test]
        async fn check_preserves_order_and_length() -> TestResult {
            let store = MemoryRoleStore::new();
            let filters = FilterRegistry::new();
            AccessRole::CourseBetaTester(course())
                .add_users(&store, &[ALICE])
                .await?;
            AccessRole::GlobalStaff.add_users(&store, &[ALICE]).await?;

            let results = has_role_access(
                &store,
                &filters,
                ALICE,
                vec![
                    AccessRole::CourseStaff(course()),
                    AccessRole::CourseBetaTester(course()),
                    AccessRole::CourseInstructor(course()),
                    AccessRole::GlobalStaff,
                ],
                course(),
            )
            .await?;
            assert_eq!(results, vec![false, true, false, true]);
            Ok(())
        }

        #[actix_web::test]
        async fn check_uses_rewritten_user() -> TestResult {
            let store = MemoryRoleStore::new();
            AccessRole::GlobalStaff.add_users(&store, &[BOB]).await?;
            let filters = FilterRegistry::new().with_pipeline(
                FilterType::AccessRoleCheckRequested,
                FilterPipeline::new(vec![Arc::new(ActAsBob)]),
            );

            let results =
                has_role_access(&store, &filters, ALICE, vec![AccessRole::GlobalStaff], course())
                    .await?;
            assert_eq!(results, vec![true]);
            Ok(())
        }

        #[actix_web::test]
        async fn check_length_follows_rewritten_roles() -> TestResult {
            let store = MemoryRoleStore::new();
            let filters = FilterRegistry::new().with_pipeline(
                FilterType::AccessRoleCheckRequested,
                FilterPipeline::new(vec![Arc::new(StripRoles::new(vec![
                    "global_staff".to_string(),
                ]))]),
            );
            let results = has_role_access(
                &store,
                &filters,
                ALICE,
                vec![AccessRole::GlobalStaff, AccessRole::CourseStaff(course())],
                course(),
            )
            .await?;
            assert_eq!(results.len(), 1);
            Ok(())
        }

        #[actix_web::test]
        async fn halted_grant_changes_nothing() -> TestResult {
            let store = MemoryRoleStore::new();
            let filters = FilterRegistry::new().with_pipeline(
                FilterType::AccessRoleAdditionRequested,
                FilterPipeline::new(vec![Arc::new(DenyRoles::new(vec![
                    "global_staff".to_string(),
                ]))]),
            );

            let result = add_role_access(
                &store,
                &filters,
                ALICE,
                vec![AccessRole::CourseStaff(course()), AccessRole::GlobalStaff],
                course(),
            )
            .await;
            assert!(matches!(result, Err(Error::FilterHalted { .. })));
            assert!(!AccessRole::CourseStaff(course()).has_user(&store, ALICE).await?);
            Ok(())
        }

        #[actix_web::test]
        async fn grant_is_not_rolled_back() -> TestResult {
            let store = FailingRole {
                inner: MemoryRoleStore::new(),
                failing: AccessRole::CourseInstructor(course()),
            };
            let result = add_role_access(
                &store,
                &FilterRegistry::new(),
                ALICE,
                vec![
                    AccessRole::CourseStaff(course()),
                    AccessRole::CourseInstructor(course()),
                    AccessRole::CourseBetaTester(course()),
                ],
                course(),
            )
            .await;
            assert!(matches!(result, Err(Error::InternalError(_))));
            assert!(AccessRole::CourseStaff(course()).has_user(&store, ALICE).await?);
            assert!(
                !AccessRole::CourseBetaTester(course())
                    .has_user(&store, ALICE)
                    .await?
            );
            Ok(())
        }

        #[actix_web::test]
        async fn grant_twice_is_harmless() -> TestResult {
            let store = MemoryRoleStore::new();
            let filters = FilterRegistry::new();
            let staff = vec![AccessRole::CourseStaff(course())];
            add_role_access(&store, &filters, ALICE, staff.clone(), course()).await?;
            add_role_access(&store, &filters, ALICE, staff.clone(), course()).await?;
            assert_eq!(
                get_users_with_role(&store, &filters, staff, course()).await?,
                vec![BTreeSet::from([ALICE])]
            );
            Ok(())
        }

        #[actix_web::test]
        async fn pipeline_dropping_the_user_is_an_error() {
            let store = MemoryRoleStore::new();
            let filters = FilterRegistry::new().with_pipeline(
                FilterType::AccessRoleAdditionRequested,
                FilterPipeline::new(vec![Arc::new(DropUser)]),
            );
            let result = add_role_access(
                &store,
                &filters,
                ALICE,
                vec![AccessRole::GlobalStaff],
                course(),
            )
            .await;
            assert!(matches!(result, Err(Error::AppError(_))));
        }
    }

    mod revoke {
        use super::*;

        #[actix_web::test]
        async fn removes_only_named_roles() -> TestResult {
            let store = MemoryRoleStore::new();
            let filters = FilterRegistry::new();
            let roles = vec![
                AccessRole::CourseStaff(course()),
                AccessRole::CourseBetaTester(course()),
            ];
            add_role_access(&store, &filters, ALICE, roles.clone(), course()).await?;
            add_role_access(&store, &filters, BOB, roles.clone(), course()).await?;

            remove_role_access(
                &store,
                &filters,
                ALICE,
                vec![AccessRole::CourseStaff(course())],
                course(),
            )
            .await?;

            assert_eq!(
                has_role_access(&store, &filters, ALICE, roles.clone(), course()).await?,
                vec![false, true]
            );
            assert_eq!(
                has_role_access(&store, &filters, BOB, roles, course()).await?,
                vec![true, true]
            );
            Ok(())
        }

        #[actix_web::test]
        async fn revoking_unheld_role_is_harmless() -> TestResult {
            let store = MemoryRoleStore::new();
            remove_role_access(
                &store,
                &FilterRegistry::new(),
                ALICE,
                vec![AccessRole::GlobalStaff],
                course(),
            )
            .await?;
            assert!(!AccessRole::GlobalStaff.has_user(&store, ALICE).await?);
            Ok(())
        }

        #[actix_web::test]
        async fn revokes_from_rewritten_user() -> TestResult {
            let store = MemoryRoleStore::new();
            AccessRole::GlobalStaff
                .add_users(&store, &[ALICE, BOB])
                .await?;
            let filters = FilterRegistry::new().with_pipeline(
                FilterType::AccessRoleRemovalRequested,
                FilterPipeline::new(vec![Arc::new(ActAsBob)]),
            );
            remove_role_access(&store, &filters, ALICE, vec![AccessRole::GlobalStaff], course())
                .await?;
            assert!(AccessRole::GlobalStaff.has_user(&store, ALICE).await?);
            assert!(!AccessRole::GlobalStaff.has_user(&store, BOB).await?);
            Ok(())
        }
    }

    mod listing {
        use super::*;

        #[actix_web::test]
        async fn one_set_per_role_in_order() -> TestResult {
            let store = MemoryRoleStore::new();
            let filters = FilterRegistry::new();
            AccessRole::CourseStaff(course())
                .add_users(&store, &[ALICE, BOB])
                .await?;
            AccessRole::CourseInstructor(course())
                .add_users(&store, &[BOB])
                .await?;

            let members = get_users_with_role(
                &store,
                &filters,
                vec![
                    AccessRole::CourseInstructor(course()),
                    AccessRole::CourseBetaTester(course()),
                    AccessRole::CourseStaff(course()),
                ],
                course(),
            )
            .await?;
            assert_eq!(
                members,
                vec![
                    BTreeSet::from([BOB]),
                    BTreeSet::new(),
                    BTreeSet::from([ALICE, BOB]),
                ]
            );
            Ok(())
        }

        #[actix_web::test]
        async fn members_follow_rewritten_roles() -> TestResult {
            let store = MemoryRoleStore::new();
            AccessRole::CourseStaff(course())
                .add_users(&store, &[ALICE])
                .await?;
            let filters = FilterRegistry::new().with_pipeline(
                FilterType::UsersWithRolesRequested,
                FilterPipeline::new(vec![Arc::new(StripRoles::new(vec![
                    "global_staff".to_string(),
                ]))]),
            );

            let members = get_role_members(
                &store,
                &filters,
                vec![AccessRole::GlobalStaff, AccessRole::CourseStaff(course())],
                course(),
            )
            .await?;
            assert_eq!(
                members,
                vec![(AccessRole::CourseStaff(course()), BTreeSet::from([ALICE]))]
            );
            Ok(())
        }

        #[actix_web::test]
        async fn pipeline_sees_no_user() -> TestResult {
            struct RequireNoUser;

            impl PipelineStep for RequireNoUser {
                fn name(&self) -> &str {
                    "require_no_user"
                }

                fn run(&self, _filter: FilterType, args: RoleAccessArgs) -> StepResult {
                    assert_eq!(args.user, None);
                    Ok(args)
                }
            }

            let filters = FilterRegistry::new().with_pipeline(
                FilterType::UsersWithRolesRequested,
                FilterPipeline::new(vec![Arc::new(RequireNoUser)]),
            );
            let members = get_users_with_role(
                &MemoryRoleStore::new(),
                &filters,
                vec![AccessRole::GlobalStaff],
                course(),
            )
            .await?;
            assert_eq!(members, vec![BTreeSet::new()]);
            Ok(())
        }
    }
}
