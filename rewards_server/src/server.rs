use std::time::Duration;

use actix_web::{dev::Server, http::KeepAlive, middleware::Logger, web, App, HttpServer};
use log::{error, info};
use rewards_engine::{
    pipeline::{AccrualClient, OrderPipeline},
    AuthApi, BalanceApi, OrderApi, PgDatabase,
};

use crate::{
    auth::TokenIssuer,
    config::ServerConfig,
    errors::ServerError,
    routes::{api_scope, health},
};

const DB_MAX_CONNECTIONS: u32 = 25;
const SHUTDOWN_TIMEOUT_SECS: u64 = 5;

/// Opens the store, starts the order pipeline and runs the HTTP server until a shutdown signal arrives.
///
/// Shutdown order follows the process contract: the pipeline token is cancelled first so no new accrual calls
/// start, then the HTTP server drains within its deadline, then the pipeline is joined and the store closed.
pub async fn run_server(config: ServerConfig) -> Result<(), ServerError> {
    let db = PgDatabase::new_with_url(&config.database_uri, DB_MAX_CONNECTIONS)
        .await
        .map_err(|e| ServerError::InitializeError(e.to_string()))?;
    let accrual = AccrualClient::new(config.accrual_address.clone())
        .map_err(|e| ServerError::InitializeError(e.to_string()))?;
    let pipeline = OrderPipeline::new(db.clone(), accrual);
    pipeline.start();

    let srv = create_server_instance(&config, db.clone())?;
    let srv_handle = srv.handle();
    let pipeline_token = pipeline.cancellation_token();
    tokio::spawn(async move {
        wait_for_shutdown_signal().await;
        info!("🚀️ Shutdown signal received");
        pipeline_token.cancel();
        srv_handle.stop(true).await;
    });

    let result = srv.await;
    pipeline.shutdown().await;
    db.close().await;
    info!("🚀️ Store closed");
    result.map_err(ServerError::from)
}

pub fn create_server_instance(config: &ServerConfig, db: PgDatabase) -> Result<Server, ServerError> {
    let issuer = web::Data::new(TokenIssuer::new(&config.jwt_secret));
    let srv = HttpServer::new(move || {
        let auth_api = AuthApi::new(db.clone());
        let order_api = OrderApi::new(db.clone());
        let balance_api = BalanceApi::new(db.clone());
        App::new()
            .wrap(Logger::new("%t (%D ms) %s %a %U").log_target("rewards_server::http"))
            .app_data(web::Data::new(auth_api))
            .app_data(web::Data::new(order_api))
            .app_data(web::Data::new(balance_api))
            .app_data(issuer.clone())
            .service(health)
            .service(api_scope::<PgDatabase>())
    })
    .keep_alive(KeepAlive::Timeout(Duration::from_secs(600)))
    .shutdown_timeout(SHUTDOWN_TIMEOUT_SECS)
    .disable_signals()
    .bind(config.run_address.as_str())?
    .run();
    Ok(srv)
}

async fn wait_for_shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {},
                    _ = sigterm.recv() => {},
                }
            },
            Err(e) => {
                error!("🚀️ Could not install the SIGTERM handler: {e}");
                let _ = ctrl_c.await;
            },
        }
    }
    #[cfg(not(unix))]
    {
        let _ = ctrl_c.await;
    }
}
