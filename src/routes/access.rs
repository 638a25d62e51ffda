use std::collections::BTreeSet;

use crate::routes::prelude::*;

pub fn add_routes(scope: actix_web::Scope) -> actix_web::Scope {
    scope
        .service(check_access)
        .service(grant_access)
        .service(revoke_access)
        .service(list_members)
}

/// Body shared by the check, grant, and revoke endpoints.
#[derive(Serialize, Deserialize, Debug)]
pub struct RoleAccessRequest {
    pub user_id: Uuid,
    pub roles: Vec<String>,
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Eq)]
pub struct CheckAccessResponse {
    pub results: Vec<bool>,
}

#[derive(Deserialize)]
struct MembersQuery {
    /// Comma-separated role names.
    roles: String,
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Eq)]
pub struct RoleMembers {
    pub role: String,
    pub users: BTreeSet<Uuid>,
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Eq)]
pub struct MembersResponse {
    pub members: Vec<RoleMembers>,
}

/// Parse the path's course key and resolve role names against it.
fn resolve_roles<'a>(
    course_key: &str,
    names: impl IntoIterator<Item = &'a str>,
) -> Result<(CourseKey, Vec<AccessRole>)> {
    let course_key: CourseKey = course_key.parse()?;
    let roles = names
        .into_iter()
        .map(|name| AccessRole::from_name(name.trim(), &course_key))
        .collect::<Result<Vec<_>>>()?;
    if roles.is_empty() {
        return Err(Error::AppError("At least one role is required.".to_string()));
    }
    Ok((course_key, roles))
}

#[post("/{course_key}/access/check")]
async fn check_access(
    app_state: web::Data<AppState>,
    info: web::Path<(String,)>,
    body: web::Json<RoleAccessRequest>,
) -> Result<impl Responder> {
    let (course_key,) = info.into_inner();
    let (course_key, roles) = resolve_roles(&course_key, body.roles.iter().map(String::as_str))?;

    let results = role_helpers::has_role_access(
        app_state.store.as_ref(),
        &app_state.filters,
        body.user_id,
        roles,
        course_key,
    )
    .await?;

    Ok(HttpResponse::Ok().json(CheckAccessResponse { results }))
}

#[post("/{course_key}/access/grant")]
async fn grant_access(
    app_state: web::Data<AppState>,
    info: web::Path<(String,)>,
    body: web::Json<RoleAccessRequest>,
) -> Result<impl Responder> {
    let (course_key,) = info.into_inner();
    let (course_key, roles) = resolve_roles(&course_key, body.roles.iter().map(String::as_str))?;
    trace!("Grant request for {} in {course_key}", body.user_id);

    role_helpers::add_role_access(
        app_state.store.as_ref(),
        &app_state.filters,
        body.user_id,
        roles,
        course_key,
    )
    .await?;

    Ok(HttpResponse::NoContent().finish())
}

#[post("/{course_key}/access/revoke")]
async fn revoke_access(
    app_state: web::Data<AppState>,
    info: web::Path<(String,)>,
    body: web::Json<RoleAccessRequest>,
) -> Result<impl Responder> {
    let (course_key,) = info.into_inner();
    let (course_key, roles) = resolve_roles(&course_key, body.roles.iter().map(String::as_str))?;
    trace!("Revoke request for {} in {course_key}", body.user_id);

    role_helpers::remove_role_access(
        app_state.store.as_ref(),
        &app_state.filters,
        body.user_id,
        roles,
        course_key,
    )
    .await?;

    Ok(HttpResponse::NoContent().finish())
}

#[get("/{course_key}/access/members")]
async fn list_members(
    app_state: web::Data<AppState>,
    info: web::Path<(String,)>,
    query: web::Query<MembersQuery>,
) -> Result<impl Responder> {
    let (course_key,) = info.into_inner();
    let (course_key, roles) = resolve_roles(&course_key, query.roles.split(','))?;

    let members = role_helpers::get_role_members(
        app_state.store.as_ref(),
        &app_state.filters,
        roles,
        course_key,
    )
    .await?
    .into_iter()
    .map(|(role, users)| RoleMembers {
        role: role.api_name().to_string(),
        users,
    })
    .collect();
    Ok(HttpResponse::Ok().json(MembersResponse { members }))
}
