/// Filter pipelines: the extension points every role operation passes its
/// arguments through before touching the store. A deployment configures a
/// pipeline of steps per filter type; each step may rewrite the arguments,
/// halt the operation, or fail.
use std::collections::HashMap;
use std::fmt::{self, Display};
use std::sync::Arc;

use log::{trace, warn};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::key::CourseKey;
use crate::roles::AccessRole;

mod steps;

pub use steps::{AllowedOrgs, DenyRoles, StripRoles};

/// One filter type per role operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterType {
    AccessRoleCheckRequested,
    AccessRoleAdditionRequested,
    AccessRoleRemovalRequested,
    UsersWithRolesRequested,
}

impl FilterType {
    pub const ALL: [FilterType; 4] = [
        FilterType::AccessRoleCheckRequested,
        FilterType::AccessRoleAdditionRequested,
        FilterType::AccessRoleRemovalRequested,
        FilterType::UsersWithRolesRequested,
    ];

    /// Stable identifier used in configuration.
    pub fn id(&self) -> &'static str {
        match self {
            FilterType::AccessRoleCheckRequested => "access_role.check.requested.v1",
            FilterType::AccessRoleAdditionRequested => "access_role.addition.requested.v1",
            FilterType::AccessRoleRemovalRequested => "access_role.removal.requested.v1",
            FilterType::UsersWithRolesRequested => "access_role.users_listing.requested.v1",
        }
    }

    pub fn from_id(id: &str) -> Option<FilterType> {
        FilterType::ALL.into_iter().find(|filter| filter.id() == id)
    }
}

impl Display for FilterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

/// Arguments of a role operation as seen by the pipeline. `user` is `None`
/// for listings, which aren't about any particular user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleAccessArgs {
    pub user: Option<Uuid>,
    pub roles: Vec<AccessRole>,
    pub course_key: CourseKey,
}

#[derive(thiserror::Error, Debug)]
pub enum StepError {
    /// Deliberate refusal. Always stops the operation.
    #[error("{0}")]
    Halt(String),
    /// The step itself broke. Stops the operation unless the pipeline fails
    /// silently.
    #[error(transparent)]
    Failed(#[from] anyhow::Error),
}

pub type StepResult = std::result::Result<RoleAccessArgs, StepError>;

pub trait PipelineStep: Send + Sync {
    fn name(&self) -> &str;

    fn run(&self, filter: FilterType, args: RoleAccessArgs) -> StepResult;
}

/// Steps for one filter type, run in order.
#[derive(Clone, Default)]
pub struct FilterPipeline {
    pub fail_silently: bool,
    pub steps: Vec<Arc<dyn PipelineStep>>,
}

impl FilterPipeline {
    pub fn new(steps: Vec<Arc<dyn PipelineStep>>) -> FilterPipeline {
        FilterPipeline {
            fail_silently: false,
            steps,
        }
    }

    pub fn fail_silently(mut self, fail_silently: bool) -> FilterPipeline {
        self.fail_silently = fail_silently;
        self
    }
}

/// Configuration for one filter type, as it appears under `filters` in the
/// app config.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct FilterConfig {
    #[serde(default)]
    pub fail_silently: bool,
    #[serde(default)]
    pub pipeline: Vec<StepConfig>,
}

/// Steps that can be named in configuration: the built-in ones, or a
/// deployment step registered under `name` by the embedding application.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum StepConfig {
    DenyRoles { roles: Vec<String> },
    AllowedOrgs { orgs: Vec<String> },
    StripRoles { roles: Vec<String> },
    Custom { name: String },
}

impl StepConfig {
    fn build(
        &self,
        custom: &HashMap<String, Arc<dyn PipelineStep>>,
    ) -> Result<Arc<dyn PipelineStep>> {
        let step: Arc<dyn PipelineStep> = match self {
            StepConfig::DenyRoles { roles } => Arc::new(DenyRoles::new(roles.clone())),
            StepConfig::AllowedOrgs { orgs } => Arc::new(AllowedOrgs::new(orgs.clone())),
            StepConfig::StripRoles { roles } => Arc::new(StripRoles::new(roles.clone())),
            StepConfig::Custom { name } => custom
                .get(name)
                .cloned()
                .ok_or_else(|| Error::AppError(format!("No pipeline step named \"{name}\"")))?,
        };
        Ok(step)
    }
}

/// All configured pipelines. Filter types without a pipeline pass their
/// arguments through untouched.
#[derive(Clone, Default)]
pub struct FilterRegistry {
    pipelines: HashMap<FilterType, FilterPipeline>,
}

impl FilterRegistry {
    pub fn new() -> FilterRegistry {
        FilterRegistry::default()
    }

    pub fn with_pipeline(mut self, filter: FilterType, pipeline: FilterPipeline) -> FilterRegistry {
        self.pipelines.insert(filter, pipeline);
        self
    }

    /// Build pipelines from configuration keyed by filter id.
    pub fn from_config(config: &HashMap<String, FilterConfig>) -> Result<FilterRegistry> {
        FilterRegistry::from_config_with_steps(config, &HashMap::new())
    }

    /// Like `from_config`, with `custom` resolving `{ step = "custom", name }`
    /// entries.
    pub fn from_config_with_steps(
        config: &HashMap<String, FilterConfig>,
        custom: &HashMap<String, Arc<dyn PipelineStep>>,
    ) -> Result<FilterRegistry> {
        let mut registry = FilterRegistry::new();
        for (id, filter_config) in config {
            let filter = FilterType::from_id(id)
                .ok_or_else(|| Error::AppError(format!("Unknown filter type \"{id}\"")))?;
            let steps = filter_config
                .pipeline
                .iter()
                .map(|step| step.build(custom))
                .collect::<Result<Vec<_>>>()?;
            registry = registry.with_pipeline(
                filter,
                FilterPipeline::new(steps).fail_silently(filter_config.fail_silently),
            );
        }
        Ok(registry)
    }

    pub fn run_filter(&self, filter: FilterType, args: RoleAccessArgs) -> Result<RoleAccessArgs> {
        let Some(pipeline) = self.pipelines.get(&filter) else {
            return Ok(args);
        };

        let mut args = args;
        for step in &pipeline.steps {
            trace!("Running {} step {}", filter, step.name());
            // Steps take ownership, so keep a copy to fall back on when a
            // silently failing step is skipped.
            let input = pipeline.fail_silently.then(|| args.clone());
            args = match step.run(filter, args) {
                Ok(rewritten) => rewritten,
                Err(StepError::Halt(reason)) => {
                    return Err(Error::FilterHalted { filter, reason });
                }
                Err(StepError::Failed(err)) => match input {
                    Some(input) => {
                        warn!("Ignored failure in {} step {}: {err:#}", filter, step.name());
                        input
                    }
                    None => {
                        return Err(Error::InternalError(
                            err.context(format!("{} step {} failed", filter, step.name())),
                        ));
                    }
                },
            };
        }
        Ok(args)
    }
}
