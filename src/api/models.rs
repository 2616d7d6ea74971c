use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::ledger::model::{
    Direction, LedgerEntry, Order, OrderType, Position, PositionSide, Side, Trade, Wallet,
    WalletType,
};

/// 오류 응답
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

/// 현물 주문 생성 요청
#[derive(Debug, Deserialize)]
pub struct CreateOrderRequest {
    pub user_id: Uuid,
    pub symbol: String,
    pub side: Side,
    pub order_type: OrderType,
    pub price: Decimal,
    pub quantity: Decimal,
    /// 클라이언트 계산 수수료 (서버 검증용, 생략 가능)
    pub fee: Option<Decimal>,
}

/// 현물 주문 생성 응답
#[derive(Debug, Serialize)]
pub struct CreateOrderResponse {
    pub order: Order,
    pub trade: Trade,
    pub fee: Decimal,
    pub quote_balance: Decimal,
}

/// 주문 취소 요청
#[derive(Debug, Deserialize)]
pub struct CancelOrderRequest {
    pub user_id: Uuid,
    pub order_id: Uuid,
}

/// 주문 취소 응답
#[derive(Debug, Serialize)]
pub struct CancelOrderResponse {
    pub order: Order,
    pub refunded: Decimal,
    pub refund_currency: String,
}

/// 체결 보고 요청 (외부 매칭 보고 경로)
#[derive(Debug, Deserialize)]
pub struct FillOrderRequest {
    pub price: Decimal,
    pub quantity: Decimal,
    pub commission: Decimal,
}

/// 체결 보고 응답
#[derive(Debug, Serialize)]
pub struct FillOrderResponse {
    pub order: Order,
    pub trade: Trade,
    pub refunded: Decimal,
    /// false면 이미 체결 완료된 주문에 대한 무변경 성공
    pub settled: bool,
}

/// 포지션 오픈 요청
#[derive(Debug, Deserialize)]
pub struct OpenPositionRequest {
    pub user_id: Uuid,
    pub symbol: String,
    pub side: PositionSide,
    pub entry_price: Decimal,
    pub quantity: Decimal,
    pub leverage: u32,
    pub collateral: Decimal,
    pub liquidation_price: Option<Decimal>,
}

/// TP/SL 갱신 요청
#[derive(Debug, Deserialize)]
pub struct UpdateTpSlRequest {
    pub user_id: Uuid,
    pub take_profit: Option<Decimal>,
    pub stop_loss: Option<Decimal>,
}

/// 포지션 청산 요청
#[derive(Debug, Deserialize)]
pub struct ClosePositionRequest {
    pub user_id: Uuid,
    pub exit_price: Decimal,
    /// 생략 시 전체 청산
    pub quantity: Option<Decimal>,
}

/// 포지션 청산 응답
#[derive(Debug, Serialize)]
pub struct ClosePositionResponse {
    pub position: Position,
    pub realized_pnl: Decimal,
    pub fees: Decimal,
    pub credited: Decimal,
    pub usdt_balance: Decimal,
}

/// 선물 주문 생성 요청
#[derive(Debug, Deserialize)]
pub struct CreateFuturesOrderRequest {
    pub user_id: Uuid,
    pub symbol: String,
    pub side: Side,
    pub order_type: OrderType,
    pub price: Decimal,
    pub quantity: Decimal,
    pub leverage: u32,
}

/// 선물 주문 생성 응답
#[derive(Debug, Serialize)]
pub struct CreateFuturesOrderResponse {
    pub order: Order,
    pub position: Option<Position>,
    pub margin: Decimal,
}

/// 입금 요청
#[derive(Debug, Deserialize)]
pub struct DepositRequest {
    pub user_id: Uuid,
    pub currency: String,
    #[serde(default)]
    pub wallet_type: Option<WalletType>,
    pub amount: Decimal,
}

/// 출금 요청
#[derive(Debug, Deserialize)]
pub struct WithdrawalRequest {
    pub user_id: Uuid,
    pub currency: String,
    pub amount: Decimal,
}

/// 운영자 잔고 조정 요청
#[derive(Debug, Deserialize)]
pub struct AdjustmentRequest {
    pub user_id: Uuid,
    pub currency: String,
    #[serde(default)]
    pub wallet_type: Option<WalletType>,
    pub direction: Direction,
    pub amount: Decimal,
}

/// 지갑 잔고 응답 항목
#[derive(Debug, Serialize)]
pub struct BalanceItem {
    pub currency: String,
    pub wallet_type: WalletType,
    pub balance: Decimal,
    pub locked_balance: Decimal,
    pub available: Decimal,
}

impl From<Wallet> for BalanceItem {
    fn from(w: Wallet) -> Self {
        let available = w.available();
        BalanceItem {
            currency: w.currency,
            wallet_type: w.wallet_type,
            balance: w.balance,
            locked_balance: w.locked_balance,
            available,
        }
    }
}

/// 지갑 잔고 요약 응답
#[derive(Debug, Serialize)]
pub struct BalancesResponse {
    pub user_id: Uuid,
    pub balances: Vec<BalanceItem>,
}

/// 거래 내역 응답
#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub entries: Vec<LedgerEntry>,
    pub limit: i64,
    pub offset: i64,
}

/// 주문 목록 응답
#[derive(Debug, Serialize)]
pub struct OrdersResponse {
    pub orders: Vec<Order>,
}

/// 체결 목록 응답
#[derive(Debug, Serialize)]
pub struct TradesResponse {
    pub trades: Vec<Trade>,
}

/// 포지션 목록 응답
#[derive(Debug, Serialize)]
pub struct PositionsResponse {
    pub positions: Vec<Position>,
}
