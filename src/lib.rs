//! Course role membership: checks, grants, revocations, and listings over a
//! role store, each routed through configurable filter pipelines.

pub mod app_state;
pub mod error;
pub mod filters;
pub mod key;
pub mod request_cache;
pub mod role_helpers;
pub mod roles;
pub mod routes;
pub mod store;
mod validation;

pub use error::{Error, Result};
pub use key::CourseKey;
pub use request_cache::RequestCache;
pub use roles::{AccessRole, ForumRole};
