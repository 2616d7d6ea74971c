//! REST 서버 부트스트랩
//!
//! 얇은 HTTP 표면만 담당하며 모든 불변식은 엔진 계층 아래에 있습니다.

use log::info;
use sqlx::sqlite::SqlitePool;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::api::create_api_router;
use crate::config::LedgerConfig;
use crate::engine::futures::FuturesEngine;
use crate::engine::spot::SpotEngine;
use crate::engine::wallet::WalletEngine;

/// 서버 상태
#[derive(Clone)]
pub struct ServerState {
    pub spot: SpotEngine,
    pub futures: FuturesEngine,
    pub wallets: WalletEngine,
}

impl ServerState {
    pub fn new(pool: SqlitePool, config: LedgerConfig) -> Self {
        Self {
            spot: SpotEngine::new(pool.clone(), config.clone()),
            futures: FuturesEngine::new(pool.clone(), config),
            wallets: WalletEngine::new(pool),
        }
    }
}

/// 서버 시작
pub async fn start_server(pool: SqlitePool, config: LedgerConfig) -> anyhow::Result<()> {
    info!("🚀 xLedger 서버 시작 중...");

    let rest_port = config.rest_port;
    let state = ServerState::new(pool, config);

    let app = create_api_router()
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = format!("0.0.0.0:{}", rest_port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("🌐 REST API 서버 실행: http://{}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
