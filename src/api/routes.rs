use axum::{
    routing::{get, post, put},
    Router,
};

use crate::api::handlers::*;
use crate::server::ServerState;

/// API 라우터 생성
pub fn create_api_router() -> Router<ServerState> {
    Router::new()
        // 현물 주문 API
        .route("/api/v1/orders", post(create_order).get(list_orders))
        .route("/api/v1/orders/cancel", post(cancel_order))
        .route("/api/v1/orders/:order_id/fill", post(fill_order))
        .route("/api/v1/trades", get(list_trades))
        // 선물 포지션 API
        .route("/api/v1/positions", post(open_position).get(list_positions))
        .route("/api/v1/positions/pnl-history", get(pnl_history))
        .route("/api/v1/positions/:position_id/tpsl", put(update_tpsl))
        .route("/api/v1/positions/:position_id/close", post(close_position))
        .route("/api/v1/portfolio/:user_id", get(portfolio_summary))
        .route("/api/v1/futures/orders", post(create_futures_order))
        .route("/api/v1/futures/orders/cancel", post(cancel_futures_order))
        // 지갑 API
        .route("/api/v1/wallets/deposit", post(deposit))
        .route("/api/v1/wallets/withdraw", post(request_withdrawal))
        .route("/api/v1/wallets/adjust", post(adjust_balance))
        .route("/api/v1/wallets/:user_id/balances", get(get_balances))
        .route("/api/v1/wallets/:user_id/history", get(get_history))
}
