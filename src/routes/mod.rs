mod access;
pub mod prelude;
mod staff;

/// Add every course role route under `scope`.
pub fn add_routes(scope: actix_web::Scope) -> actix_web::Scope {
    let scope = staff::add_routes(scope);
    access::add_routes(scope)
}
