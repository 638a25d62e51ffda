/// Course keys. A course is identified by its organization, course number,
/// and run, e.g. `course-v1:edX+DemoX+2024_T1`. The older slash-separated
/// form (`edX/DemoX/2024_T1`) is accepted when parsing but never produced.
///
/// The two forms of the same org/course/run parse to equal keys, so they share
/// one role scope and are always stored in the `course-v1:` form. Role rows
/// written elsewhere under a slash-form course id are not found through this
/// type.
use std::fmt::{self, Display};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::validation;

const NEW_STYLE_PREFIX: &str = "course-v1:";

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CourseKey {
    org: String,
    course: String,
    run: String,
}

impl CourseKey {
    pub fn new(org: &str, course: &str, run: &str) -> Result<CourseKey, Error> {
        for component in [org, course, run] {
            if !validation::key_component(component) {
                return Err(Error::InvalidCourseKey(format!(
                    "{org}+{course}+{run}: bad component \"{component}\""
                )));
            }
        }
        Ok(CourseKey {
            org: org.to_string(),
            course: course.to_string(),
            run: run.to_string(),
        })
    }

    /// Organization that owns the course. Org-scoped roles are keyed by this.
    pub fn org(&self) -> &str {
        &self.org
    }

    pub fn course(&self) -> &str {
        &self.course
    }

    pub fn run(&self) -> &str {
        &self.run
    }
}

impl FromStr for CourseKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = match s.strip_prefix(NEW_STYLE_PREFIX) {
            Some(rest) => rest.split('+').collect(),
            None => s.split('/').collect(),
        };
        match parts.as_slice() {
            [org, course, run] => CourseKey::new(org, course, run),
            _ => Err(Error::InvalidCourseKey(s.to_string())),
        }
    }
}

impl Display for CourseKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{NEW_STYLE_PREFIX}{}+{}+{}", self.org, self.course, self.run)
    }
}

impl TryFrom<String> for CourseKey {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<CourseKey> for String {
    fn from(key: CourseKey) -> String {
        key.to_string()
    }
}
