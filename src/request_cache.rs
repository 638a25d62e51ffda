use std::collections::HashMap;

use uuid::Uuid;

use crate::key::CourseKey;

/// Per-request memo of staff-role checks. Create one at the start of a request
/// and drop it at the end; it is never shared between requests.
#[derive(Debug, Default)]
pub struct RequestCache {
    staff_roles: HashMap<(Uuid, CourseKey), bool>,
}

impl RequestCache {
    pub fn new() -> RequestCache {
        RequestCache::default()
    }

    pub fn staff_roles(&self, user: Uuid, course_key: &CourseKey) -> Option<bool> {
        self.staff_roles.get(&(user, course_key.clone())).copied()
    }

    pub fn set_staff_roles(&mut self, user: Uuid, course_key: &CourseKey, has_staff_roles: bool) {
        self.staff_roles
            .insert((user, course_key.clone()), has_staff_roles);
    }

    pub fn len(&self) -> usize {
        self.staff_roles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.staff_roles.is_empty()
    }
}
