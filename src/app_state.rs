use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Context;
use config::{builder::DefaultState, Config, ConfigBuilder, ConfigError, Environment, File};
use serde::Deserialize;

use crate::error::Result;
use crate::filters::{FilterConfig, FilterRegistry};
use crate::store::RoleStore;

/// Actix state object that all route handlers will have access to.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn RoleStore>,
    pub filters: Arc<FilterRegistry>,
}

impl AppState {
    /// Build state around a store, with filter pipelines taken from the
    /// config.
    pub fn new(config: &AppConfig, store: Arc<dyn RoleStore>) -> Result<AppState> {
        let filters = FilterRegistry::from_config(&config.filters)?;
        Ok(AppState {
            store,
            filters: Arc::new(filters),
        })
    }

    pub fn with_filters(mut self, filters: FilterRegistry) -> AppState {
        self.filters = Arc::new(filters);
        self
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct AppConfig {
    pub database_url: Option<String>,
    pub max_connections: u32,
    /// Keep roles in process memory instead of Postgres. Development only.
    #[serde(default)]
    pub memory_store: bool,
    pub port: u16,
    /// Filter pipelines keyed by filter id.
    #[serde(default)]
    pub filters: HashMap<String, FilterConfig>,
}

/// Create a config builder with default values set.
pub fn config_with_defaults() -> std::result::Result<ConfigBuilder<DefaultState>, ConfigError> {
    Ok(Config::builder()
        .set_default("max_connections", 5)?
        .set_default("memory_store", false)?
        .set_default("port", 8080)?)
}

/// Defaults, then `course_roles.toml` if present, then `COURSE_ROLES_*`
/// environment variables (`__` separates nested keys).
pub fn load_config() -> anyhow::Result<AppConfig> {
    config_with_defaults()?
        .add_source(File::with_name("course_roles").required(false))
        .add_source(
            Environment::with_prefix("COURSE_ROLES")
                .prefix_separator("_")
                .separator("__"),
        )
        .build()
        .context("Failed to read configuration")?
        .try_deserialize()
        .context("Invalid configuration")
}
