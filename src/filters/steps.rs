use std::collections::HashSet;

use super::{FilterType, PipelineStep, RoleAccessArgs, StepError, StepResult};

/// Refuses any operation that mentions one of the listed roles, e.g. to keep
/// global staff grants out of the course admin API.
pub struct DenyRoles {
    roles: HashSet<String>,
}

impl DenyRoles {
    pub fn new(roles: Vec<String>) -> DenyRoles {
        DenyRoles {
            roles: roles.into_iter().collect(),
        }
    }
}

impl PipelineStep for DenyRoles {
    fn name(&self) -> &str {
        "deny_roles"
    }

    fn run(&self, _filter: FilterType, args: RoleAccessArgs) -> StepResult {
        match args
            .roles
            .iter()
            .find(|role| self.roles.contains(role.api_name()))
        {
            Some(role) => Err(StepError::Halt(format!(
                "Role {} can't be managed here",
                role.api_name()
            ))),
            None => Ok(args),
        }
    }
}

/// Only lets operations on courses of the listed organizations through.
pub struct AllowedOrgs {
    orgs: HashSet<String>,
}

impl AllowedOrgs {
    pub fn new(orgs: Vec<String>) -> AllowedOrgs {
        AllowedOrgs {
            orgs: orgs.into_iter().collect(),
        }
    }
}

impl PipelineStep for AllowedOrgs {
    fn name(&self) -> &str {
        "allowed_orgs"
    }

    fn run(&self, _filter: FilterType, args: RoleAccessArgs) -> StepResult {
        if self.orgs.contains(args.course_key.org()) {
            Ok(args)
        } else {
            Err(StepError::Halt(format!(
                "Organization {} is not managed by this deployment",
                args.course_key.org()
            )))
        }
    }
}

/// Silently drops the listed roles from the operation.
pub struct StripRoles {
    roles: HashSet<String>,
}

impl StripRoles {
    pub fn new(roles: Vec<String>) -> StripRoles {
        StripRoles {
            roles: roles.into_iter().collect(),
        }
    }
}

impl PipelineStep for StripRoles {
    fn name(&self) -> &str {
        "strip_roles"
    }

    fn run(&self, _filter: FilterType, mut args: RoleAccessArgs) -> StepResult {
        args.roles.retain(|role| !self.roles.contains(role.api_name()));
        Ok(args)
    }
}
