/// Prelude module for importing common route symbols. This reduces boilerplate
/// and time to set up new routes.
pub use actix_web::{get, post, web, HttpResponse, Responder};
pub use log::{info, trace};
pub use serde::{Deserialize, Serialize};
pub use uuid::Uuid;

pub use crate::app_state::{AppConfig, AppState};
pub use crate::error::{Error, Result};
pub use crate::key::CourseKey;
pub use crate::request_cache::RequestCache;
pub use crate::role_helpers;
pub use crate::roles::AccessRole;
