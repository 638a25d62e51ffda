use crate::routes::prelude::*;

pub fn add_routes(scope: actix_web::Scope) -> actix_web::Scope {
    scope.service(staff_roles)
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Eq)]
pub struct StaffRolesResponse {
    pub has_staff_roles: bool,
}

#[get("/{course_key}/users/{user_id}/staff")]
async fn staff_roles(
    app_state: web::Data<AppState>,
    info: web::Path<(String, Uuid)>,
) -> Result<impl Responder> {
    let (course_key, user_id) = info.into_inner();
    let course_key: CourseKey = course_key.parse()?;

    let mut cache = RequestCache::new();
    let has_staff_roles =
        role_helpers::has_staff_roles(&mut cache, app_state.store.as_ref(), user_id, &course_key)
            .await?;

    Ok(HttpResponse::Ok().json(StaffRolesResponse { has_staff_roles }))
}
