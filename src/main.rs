use log::info;

use xledger::config::LedgerConfig;
use xledger::db::init_database;
use xledger::server::start_server;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    env_logger::init();

    info!("지갑 원장 정산 엔진 시작");

    let config = LedgerConfig::from_env();
    let pool = init_database(&config).await?;

    start_server(pool, config).await
}
