use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};
use std::collections::HashMap;
use uuid::Uuid;

use crate::api::models::*;
use crate::engine::spot::{self, FillReport};
use crate::engine::futures::OpenPositionRequest as EngineOpenRequest;
use crate::error::LedgerError;
use crate::ledger::model::{OrderStatus, WalletType};
use crate::ledger::store::EntryFilter;
use crate::server::ServerState;

type ApiError = (StatusCode, Json<ErrorResponse>);

/// 엔진 오류를 HTTP 응답으로 변환
fn to_http(err: LedgerError) -> ApiError {
    let (status, code) = match &err {
        LedgerError::InvalidInput(_) => (StatusCode::BAD_REQUEST, "INVALID_INPUT"),
        LedgerError::InsufficientFunds { .. } => (StatusCode::BAD_REQUEST, "INSUFFICIENT_FUNDS"),
        LedgerError::InsufficientCollateral { .. } => {
            (StatusCode::BAD_REQUEST, "INSUFFICIENT_COLLATERAL")
        }
        LedgerError::FeeMismatch { .. } => (StatusCode::BAD_REQUEST, "FEE_MISMATCH"),
        LedgerError::InvalidState(_) => (StatusCode::CONFLICT, "INVALID_STATE"),
        LedgerError::InvalidTpSl(_) => (StatusCode::BAD_REQUEST, "INVALID_TPSL"),
        LedgerError::OverFill { .. } => (StatusCode::BAD_REQUEST, "OVER_FILL"),
        LedgerError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
        LedgerError::Contention => (StatusCode::SERVICE_UNAVAILABLE, "CONTENTION"),
        LedgerError::Corrupt(_) => (StatusCode::INTERNAL_SERVER_ERROR, "CORRUPT_DATA"),
        LedgerError::Db(_) => (StatusCode::INTERNAL_SERVER_ERROR, "DB_ERROR"),
    };
    (
        status,
        Json(ErrorResponse {
            error: code.to_string(),
            message: err.to_string(),
        }),
    )
}

fn bad_request(message: &str) -> ApiError {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse {
            error: "INVALID_INPUT".to_string(),
            message: message.to_string(),
        }),
    )
}

fn parse_user_id(params: &HashMap<String, String>) -> Result<Uuid, ApiError> {
    params
        .get("user_id")
        .and_then(|v| Uuid::parse_str(v).ok())
        .ok_or_else(|| bad_request("user_id 쿼리 파라미터가 필요합니다"))
}

fn parse_limit(params: &HashMap<String, String>) -> i64 {
    params
        .get("limit")
        .and_then(|v| v.parse().ok())
        .unwrap_or(50)
}

// ============= 현물 주문 =============

/// 현물 주문 생성 핸들러
pub async fn create_order(
    State(state): State<ServerState>,
    Json(payload): Json<CreateOrderRequest>,
) -> Result<Json<CreateOrderResponse>, ApiError> {
    let outcome = state
        .spot
        .create_order(spot::CreateOrderRequest {
            user_id: payload.user_id,
            symbol: payload.symbol,
            side: payload.side,
            order_type: payload.order_type,
            price: payload.price,
            quantity: payload.quantity,
            claimed_fee: payload.fee,
        })
        .await
        .map_err(to_http)?;

    Ok(Json(CreateOrderResponse {
        order: outcome.order,
        trade: outcome.trade,
        fee: outcome.fee,
        quote_balance: outcome.quote_balance,
    }))
}

/// 현물 주문 취소 핸들러
pub async fn cancel_order(
    State(state): State<ServerState>,
    Json(payload): Json<CancelOrderRequest>,
) -> Result<Json<CancelOrderResponse>, ApiError> {
    let outcome = state
        .spot
        .cancel_order(payload.user_id, payload.order_id)
        .await
        .map_err(to_http)?;

    Ok(Json(CancelOrderResponse {
        order: outcome.order,
        refunded: outcome.refunded,
        refund_currency: outcome.refund_currency,
    }))
}

/// 체결 보고 핸들러 (외부 매칭 보고 경로)
pub async fn fill_order(
    State(state): State<ServerState>,
    Path(order_id): Path<Uuid>,
    Json(payload): Json<FillOrderRequest>,
) -> Result<Json<FillOrderResponse>, ApiError> {
    let outcome = state
        .spot
        .fill_order(FillReport {
            order_id,
            price: payload.price,
            quantity: payload.quantity,
            commission: payload.commission,
        })
        .await
        .map_err(to_http)?;

    Ok(Json(FillOrderResponse {
        order: outcome.order,
        trade: outcome.trade,
        refunded: outcome.refunded,
        settled: outcome.settled,
    }))
}

/// 현물 주문 목록 조회 핸들러
pub async fn list_orders(
    State(state): State<ServerState>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<OrdersResponse>, ApiError> {
    let user_id = parse_user_id(&params)?;
    let status = match params.get("status") {
        Some(s) => Some(OrderStatus::parse(s).map_err(|_| bad_request("알 수 없는 status 필터"))?),
        None => None,
    };

    let orders = state
        .spot
        .list_orders(
            user_id,
            params.get("symbol").map(|s| s.as_str()),
            status,
            parse_limit(&params),
        )
        .await
        .map_err(to_http)?;

    Ok(Json(OrdersResponse { orders }))
}

/// 사용자 체결 목록 조회 핸들러
pub async fn list_trades(
    State(state): State<ServerState>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<TradesResponse>, ApiError> {
    let user_id = parse_user_id(&params)?;
    let trades = state
        .spot
        .list_trades(
            user_id,
            params.get("symbol").map(|s| s.as_str()),
            parse_limit(&params),
        )
        .await
        .map_err(to_http)?;

    Ok(Json(TradesResponse { trades }))
}

// ============= 선물 포지션 =============

/// 포지션 오픈 핸들러
pub async fn open_position(
    State(state): State<ServerState>,
    Json(payload): Json<OpenPositionRequest>,
) -> Result<Json<crate::ledger::model::Position>, ApiError> {
    let position = state
        .futures
        .open_position(EngineOpenRequest {
            user_id: payload.user_id,
            symbol: payload.symbol,
            side: payload.side,
            entry_price: payload.entry_price,
            quantity: payload.quantity,
            leverage: payload.leverage,
            collateral: payload.collateral,
            liquidation_price: payload.liquidation_price,
        })
        .await
        .map_err(to_http)?;

    Ok(Json(position))
}

/// TP/SL 갱신 핸들러
pub async fn update_tpsl(
    State(state): State<ServerState>,
    Path(position_id): Path<Uuid>,
    Json(payload): Json<UpdateTpSlRequest>,
) -> Result<Json<crate::ledger::model::Position>, ApiError> {
    let position = state
        .futures
        .update_tpsl(
            payload.user_id,
            position_id,
            payload.take_profit,
            payload.stop_loss,
        )
        .await
        .map_err(to_http)?;

    Ok(Json(position))
}

/// 포지션 청산 핸들러
pub async fn close_position(
    State(state): State<ServerState>,
    Path(position_id): Path<Uuid>,
    Json(payload): Json<ClosePositionRequest>,
) -> Result<Json<ClosePositionResponse>, ApiError> {
    let outcome = state
        .futures
        .close_position(
            payload.user_id,
            position_id,
            payload.exit_price,
            payload.quantity,
        )
        .await
        .map_err(to_http)?;

    Ok(Json(ClosePositionResponse {
        position: outcome.position,
        realized_pnl: outcome.realized_pnl,
        fees: outcome.fees,
        credited: outcome.credited,
        usdt_balance: outcome.usdt_balance,
    }))
}

/// 열린 포지션 목록 조회 핸들러
pub async fn list_positions(
    State(state): State<ServerState>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<PositionsResponse>, ApiError> {
    let user_id = parse_user_id(&params)?;
    let positions = state
        .futures
        .list_open_positions(
            user_id,
            params.get("symbol").map(|s| s.as_str()),
            parse_limit(&params),
        )
        .await
        .map_err(to_http)?;

    Ok(Json(PositionsResponse { positions }))
}

/// 청산 포지션 PnL 이력 조회 핸들러
pub async fn pnl_history(
    State(state): State<ServerState>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<PositionsResponse>, ApiError> {
    let user_id = parse_user_id(&params)?;
    let offset = params
        .get("offset")
        .and_then(|v| v.parse().ok())
        .unwrap_or(0);
    let positions = state
        .futures
        .pnl_history(user_id, parse_limit(&params), offset)
        .await
        .map_err(to_http)?;

    Ok(Json(PositionsResponse { positions }))
}

/// 포트폴리오 요약 조회 핸들러
pub async fn portfolio_summary(
    State(state): State<ServerState>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<crate::engine::futures::PortfolioSummary>, ApiError> {
    let summary = state
        .futures
        .portfolio_summary(user_id)
        .await
        .map_err(to_http)?;

    Ok(Json(summary))
}

/// 선물 주문 생성 핸들러
pub async fn create_futures_order(
    State(state): State<ServerState>,
    Json(payload): Json<CreateFuturesOrderRequest>,
) -> Result<Json<CreateFuturesOrderResponse>, ApiError> {
    let outcome = state
        .futures
        .create_futures_order(
            payload.user_id,
            &payload.symbol,
            payload.side,
            payload.order_type,
            payload.price,
            payload.quantity,
            payload.leverage,
        )
        .await
        .map_err(to_http)?;

    Ok(Json(CreateFuturesOrderResponse {
        order: outcome.order,
        position: outcome.position,
        margin: outcome.margin,
    }))
}

/// 선물 주문 취소 핸들러
pub async fn cancel_futures_order(
    State(state): State<ServerState>,
    Json(payload): Json<CancelOrderRequest>,
) -> Result<Json<crate::ledger::model::Order>, ApiError> {
    let order = state
        .futures
        .cancel_futures_order(payload.user_id, payload.order_id)
        .await
        .map_err(to_http)?;

    Ok(Json(order))
}

// ============= 지갑 =============

/// 입금 핸들러
pub async fn deposit(
    State(state): State<ServerState>,
    Json(payload): Json<DepositRequest>,
) -> Result<Json<BalanceItem>, ApiError> {
    let wallet = state
        .wallets
        .deposit(
            payload.user_id,
            &payload.currency,
            payload.wallet_type.unwrap_or(WalletType::Spot),
            payload.amount,
        )
        .await
        .map_err(to_http)?;

    Ok(Json(wallet.into()))
}

/// 출금 요청 핸들러
pub async fn request_withdrawal(
    State(state): State<ServerState>,
    Json(payload): Json<WithdrawalRequest>,
) -> Result<Json<BalanceItem>, ApiError> {
    let wallet = state
        .wallets
        .request_withdrawal(payload.user_id, &payload.currency, payload.amount)
        .await
        .map_err(to_http)?;

    Ok(Json(wallet.into()))
}

/// 운영자 잔고 조정 핸들러
pub async fn adjust_balance(
    State(state): State<ServerState>,
    Json(payload): Json<AdjustmentRequest>,
) -> Result<Json<BalanceItem>, ApiError> {
    let wallet = state
        .wallets
        .adjust(
            payload.user_id,
            &payload.currency,
            payload.wallet_type.unwrap_or(WalletType::Spot),
            payload.direction,
            payload.amount,
        )
        .await
        .map_err(to_http)?;

    Ok(Json(wallet.into()))
}

/// 잔고 요약 조회 핸들러
pub async fn get_balances(
    State(state): State<ServerState>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<BalancesResponse>, ApiError> {
    let wallets = state.wallets.balances(user_id).await.map_err(to_http)?;

    Ok(Json(BalancesResponse {
        user_id,
        balances: wallets.into_iter().map(BalanceItem::from).collect(),
    }))
}

/// 거래 내역 조회 핸들러
pub async fn get_history(
    State(state): State<ServerState>,
    Path(user_id): Path<Uuid>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<HistoryResponse>, ApiError> {
    let kind = match params.get("kind") {
        Some(k) => {
            Some(crate::ledger::model::EntryKind::parse(k).map_err(|_| bad_request("알 수 없는 kind 필터"))?)
        }
        None => None,
    };
    let filter = EntryFilter {
        kind,
        currency: params.get("currency").cloned(),
        limit: parse_limit(&params),
        offset: params
            .get("offset")
            .and_then(|v| v.parse().ok())
            .unwrap_or(0),
    };

    let entries = state
        .wallets
        .history(user_id, &filter)
        .await
        .map_err(to_http)?;

    Ok(Json(HistoryResponse {
        entries,
        limit: filter.limit,
        offset: filter.offset,
    }))
}
