/// Role descriptors. Each value names one membership set in the role store:
/// a course-scoped team role, an org-wide role, global staff, or one of the
/// discussion forum moderation roles for a course.
use std::collections::BTreeSet;
use std::fmt::{self, Display};

use uuid::Uuid;

use crate::error::{Error, Result};
use crate::key::CourseKey;
use crate::store::RoleStore;
use crate::validation;

/// Forum moderation roles. The storage names are what the discussion service
/// writes, so they are not snake case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ForumRole {
    Administrator,
    Moderator,
    GroupModerator,
    CommunityTa,
}

impl ForumRole {
    /// Every forum role that counts towards staff access.
    pub const STAFF: [ForumRole; 4] = [
        ForumRole::CommunityTa,
        ForumRole::GroupModerator,
        ForumRole::Moderator,
        ForumRole::Administrator,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ForumRole::Administrator => "Administrator",
            ForumRole::Moderator => "Moderator",
            ForumRole::GroupModerator => "Group Moderator",
            ForumRole::CommunityTa => "Community TA",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AccessRole {
    CourseStaff(CourseKey),
    CourseInstructor(CourseKey),
    CourseBetaTester(CourseKey),
    CourseLimitedStaff(CourseKey),
    CourseDataResearcher(CourseKey),
    CourseCcxCoach(CourseKey),
    OrgStaff(String),
    OrgInstructor(String),
    GlobalStaff,
    Forum { kind: ForumRole, course: CourseKey },
}

impl AccessRole {
    /// Resolve a role name from the admin API relative to a course. Org roles
    /// resolve to the course's organization.
    pub fn from_name(name: &str, course_key: &CourseKey) -> Result<AccessRole> {
        if !validation::role_name(name) {
            return Err(Error::UnknownRole(name.to_string()));
        }
        let course = course_key.clone();
        let role = match name {
            "staff" => AccessRole::CourseStaff(course),
            "instructor" => AccessRole::CourseInstructor(course),
            "beta_testers" => AccessRole::CourseBetaTester(course),
            "limited_staff" => AccessRole::CourseLimitedStaff(course),
            "data_researcher" => AccessRole::CourseDataResearcher(course),
            "ccx_coach" => AccessRole::CourseCcxCoach(course),
            "org_staff" => AccessRole::OrgStaff(course_key.org().to_string()),
            "org_instructor" => AccessRole::OrgInstructor(course_key.org().to_string()),
            "global_staff" => AccessRole::GlobalStaff,
            "forum_administrator" => AccessRole::forum(ForumRole::Administrator, course),
            "forum_moderator" => AccessRole::forum(ForumRole::Moderator, course),
            "forum_group_moderator" => AccessRole::forum(ForumRole::GroupModerator, course),
            "forum_community_ta" => AccessRole::forum(ForumRole::CommunityTa, course),
            _ => return Err(Error::UnknownRole(name.to_string())),
        };
        Ok(role)
    }

    fn forum(kind: ForumRole, course: CourseKey) -> AccessRole {
        AccessRole::Forum { kind, course }
    }

    /// Inverse of `from_name`.
    pub fn api_name(&self) -> &'static str {
        match self {
            AccessRole::CourseStaff(_) => "staff",
            AccessRole::CourseInstructor(_) => "instructor",
            AccessRole::CourseBetaTester(_) => "beta_testers",
            AccessRole::CourseLimitedStaff(_) => "limited_staff",
            AccessRole::CourseDataResearcher(_) => "data_researcher",
            AccessRole::CourseCcxCoach(_) => "ccx_coach",
            AccessRole::OrgStaff(_) => "org_staff",
            AccessRole::OrgInstructor(_) => "org_instructor",
            AccessRole::GlobalStaff => "global_staff",
            AccessRole::Forum { kind, .. } => match kind {
                ForumRole::Administrator => "forum_administrator",
                ForumRole::Moderator => "forum_moderator",
                ForumRole::GroupModerator => "forum_group_moderator",
                ForumRole::CommunityTa => "forum_community_ta",
            },
        }
    }

    /// Name the role is stored under. Course and org variants of the same
    /// role share a name and differ only in scope.
    pub fn name(&self) -> &'static str {
        match self {
            AccessRole::CourseStaff(_) | AccessRole::OrgStaff(_) => "staff",
            AccessRole::CourseInstructor(_) | AccessRole::OrgInstructor(_) => "instructor",
            AccessRole::CourseBetaTester(_) => "beta_testers",
            AccessRole::CourseLimitedStaff(_) => "limited_staff",
            AccessRole::CourseDataResearcher(_) => "data_researcher",
            AccessRole::CourseCcxCoach(_) => "ccx_coach",
            AccessRole::GlobalStaff => "global_staff",
            AccessRole::Forum { kind, .. } => kind.name(),
        }
    }

    /// Organization the role is scoped to, if any.
    pub fn org(&self) -> Option<&str> {
        match self {
            AccessRole::OrgStaff(org) | AccessRole::OrgInstructor(org) => Some(org),
            AccessRole::GlobalStaff => None,
            _ => self.course_key().map(CourseKey::org),
        }
    }

    /// Course the role is scoped to, if any.
    pub fn course_key(&self) -> Option<&CourseKey> {
        match self {
            AccessRole::CourseStaff(course)
            | AccessRole::CourseInstructor(course)
            | AccessRole::CourseBetaTester(course)
            | AccessRole::CourseLimitedStaff(course)
            | AccessRole::CourseDataResearcher(course)
            | AccessRole::CourseCcxCoach(course)
            | AccessRole::Forum { course, .. } => Some(course),
            AccessRole::OrgStaff(_) | AccessRole::OrgInstructor(_) | AccessRole::GlobalStaff => {
                None
            }
        }
    }

    pub async fn has_user(&self, store: &dyn RoleStore, user: Uuid) -> Result<bool> {
        store.has_user(self, user).await
    }

    pub async fn add_users(&self, store: &dyn RoleStore, users: &[Uuid]) -> Result<()> {
        store.add_users(self, users).await
    }

    pub async fn remove_users(&self, store: &dyn RoleStore, users: &[Uuid]) -> Result<()> {
        store.remove_users(self, users).await
    }

    pub async fn users_with_role(&self, store: &dyn RoleStore) -> Result<BTreeSet<Uuid>> {
        store.users_with_role(self).await
    }
}

impl Display for AccessRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.course_key(), self.org()) {
            (Some(course), _) => write!(f, "{} in {course}", self.name()),
            (None, Some(org)) => write!(f, "{} for org {org}", self.name()),
            (None, None) => write!(f, "{}", self.name()),
        }
    }
}
