use dotenvy::dotenv;
use log::{error, info};
use rewards_server::{config::ServerConfig, server::run_server};

#[actix_web::main]
async fn main() {
    dotenv().ok();
    env_logger::init();
    let config = ServerConfig::from_cli_or_env();
    info!("🚀️ Starting rewards server on {}", config.run_address);
    info!("🚀️ Accrual system address: {}", config.accrual_address);
    match run_server(config).await {
        Ok(()) => info!("🚀️ Bye!"),
        Err(e) => {
            error!("🚀️ Server terminated with an error: {e}");
            std::process::exit(1);
        },
    }
}
