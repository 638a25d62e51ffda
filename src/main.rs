use std::sync::Arc;

use actix_web::{
    http::StatusCode,
    middleware::{self, ErrorHandlers},
    web, App, HttpServer,
};
use anyhow::Context;
use env_logger::Env;
use listenfd::ListenFd;
use log::{info, warn};

use course_roles::app_state::{self, AppState};
use course_roles::error::custom_404;
use course_roles::routes;
use course_roles::store::{MemoryRoleStore, PgRoleStore, RoleStore};

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    env_logger::init_from_env(Env::default().default_filter_or("info"));

    let config = app_state::load_config()?;

    let store: Arc<dyn RoleStore> = if config.memory_store {
        warn!("Using the in-memory role store; nothing will be persisted");
        Arc::new(MemoryRoleStore::new())
    } else {
        let database_url = config
            .database_url
            .as_deref()
            .context("database_url must be set unless memory_store is enabled")?;
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(database_url)
            .await
            .context("Failed to connect to the database")?;
        let store = PgRoleStore::new(pool);
        store.migrate().await?;
        Arc::new(store)
    };

    let port = config.port;
    let app_state = AppState::new(&config, store)?;

    let server = HttpServer::new(move || {
        App::new()
            .wrap(ErrorHandlers::new().handler(StatusCode::NOT_FOUND, custom_404))
            .wrap(middleware::Compress::default())
            .app_data(web::Data::new(app_state.clone()))
            .service(routes::add_routes(web::scope("/courses")))
            .wrap(middleware::Logger::default())
    });

    // Reuse a socket handed over by a dev reloader (systemfd) if there is one.
    let server = match ListenFd::from_env().take_tcp_listener(0)? {
        Some(listener) => {
            info!("Listening on inherited socket {:?}", listener.local_addr()?);
            server.listen(listener)?
        }
        None => {
            info!("Listening on 127.0.0.1:{port}");
            server.bind(("127.0.0.1", port))?
        }
    };
    server.run().await?;

    Ok(())
}
