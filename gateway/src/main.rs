// gateway/src/main.rs
use actix_web::{web, App, HttpServer};
use common::{setup_tracing, GatewayConfig};
use gateway::middleware::CollapseBasePath;
use gateway::store::SessionStore;
use gateway::{proxy, routes, GatewayState};
use std::io;

#[actix_web::main]
async fn main() -> io::Result<()> {
    setup_tracing();

    // Misconfiguration is fatal: refuse to start in an ambiguous state
    let config = GatewayConfig::load().map_err(|e| {
        tracing::error!("Invalid configuration: {}", e);
        io::Error::new(io::ErrorKind::InvalidInput, e)
    })?;

    let sessions = SessionStore::from_config(&config).map_err(|e| {
        tracing::error!("Invalid session store configuration: {}", e);
        io::Error::new(io::ErrorKind::InvalidInput, e)
    })?;

    let server_addr = config.server_addr();
    let upstream_timeout = config.upstream_timeout;
    let base_path = config.base_path.clone();

    tracing::info!(
        "Starting gateway on {}:{} (upstream {}, base path `{}`)",
        server_addr.0,
        server_addr.1,
        config.app_url,
        base_path
    );

    let state = web::Data::new(GatewayState::new(config, sessions));

    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .app_data(web::Data::new(proxy::build_client(upstream_timeout)))
            .wrap(CollapseBasePath::new(base_path.clone()))
            .configure(routes::configure)
    })
    .bind(server_addr)?
    .run()
    .await
}
