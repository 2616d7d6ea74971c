//! 원장 엔진의 기본 모델
//!
//! 이 모듈은 지갑, 원장 기록, 주문, 체결, 포지션 등
//! 정산 엔진의 핵심 데이터 모델을 정의합니다.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{LedgerError, Result};

/// 호가 통화 (이 엔진은 COINUSDT 형식만 지원)
pub const QUOTE_CURRENCY: &str = "USDT";

/// 심볼에서 (코인 통화, 호가 통화)를 분리
///
/// 예: "BTCUSDT" -> ("BTC", "USDT")
pub fn split_symbol(symbol: &str) -> Result<(String, String)> {
    let symbol = symbol.to_uppercase();
    if !symbol.ends_with(QUOTE_CURRENCY) || symbol.len() <= QUOTE_CURRENCY.len() {
        return Err(LedgerError::InvalidInput(format!(
            "지원하지 않는 심볼 형식: {} (COINUSDT 형식만 지원)",
            symbol
        )));
    }
    let coin = symbol[..symbol.len() - QUOTE_CURRENCY.len()].to_string();
    Ok((coin, QUOTE_CURRENCY.to_string()))
}

/// 지갑 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WalletType {
    Spot,
    Future,
    Margin,
}

impl WalletType {
    pub fn as_str(&self) -> &'static str {
        match self {
            WalletType::Spot => "spot",
            WalletType::Future => "future",
            WalletType::Margin => "margin",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "spot" => Ok(WalletType::Spot),
            "future" => Ok(WalletType::Future),
            "margin" => Ok(WalletType::Margin),
            other => Err(LedgerError::Corrupt(format!("알 수 없는 wallet_type: {}", other))),
        }
    }
}

/// 매수/매도 방향
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Buy => "BUY",
            Side::Sell => "SELL",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s.to_uppercase().as_str() {
            "BUY" => Ok(Side::Buy),
            "SELL" => Ok(Side::Sell),
            other => Err(LedgerError::InvalidInput(format!(
                "side는 BUY 또는 SELL이어야 합니다: {}",
                other
            ))),
        }
    }
}

/// 주문 타입
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderType {
    /// 시장가 주문 - 제출된 가격으로 즉시 자동 체결
    Market,
    /// 지정가 주문 - 외부 매칭 보고(fill)로 체결
    Limit,
}

impl OrderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderType::Market => "MARKET",
            OrderType::Limit => "LIMIT",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s.to_uppercase().as_str() {
            "MARKET" => Ok(OrderType::Market),
            "LIMIT" => Ok(OrderType::Limit),
            other => Err(LedgerError::InvalidInput(format!(
                "order_type은 MARKET 또는 LIMIT이어야 합니다: {}",
                other
            ))),
        }
    }
}

/// 시장 구분 (orders 테이블은 현물/선물 양쪽에서 재사용됨)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarketType {
    Spot,
    Futures,
}

impl MarketType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MarketType::Spot => "spot",
            MarketType::Futures => "futures",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "spot" => Ok(MarketType::Spot),
            "futures" => Ok(MarketType::Futures),
            other => Err(LedgerError::Corrupt(format!("알 수 없는 market_type: {}", other))),
        }
    }
}

/// 주문 상태
///
/// pending → {partial → filled, cancelled}
/// filled/cancelled는 종결 상태이며 이후 변경 불가
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Partial,
    Filled,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Partial => "partial",
            OrderStatus::Filled => "filled",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(OrderStatus::Pending),
            "partial" => Ok(OrderStatus::Partial),
            "filled" => Ok(OrderStatus::Filled),
            "cancelled" => Ok(OrderStatus::Cancelled),
            other => Err(LedgerError::Corrupt(format!("알 수 없는 주문 상태: {}", other))),
        }
    }

    /// 종결 상태 여부 (이후 어떤 변경도 불가)
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Filled | OrderStatus::Cancelled)
    }
}

/// 포지션 방향
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PositionSide {
    Long,
    Short,
}

impl PositionSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            PositionSide::Long => "LONG",
            PositionSide::Short => "SHORT",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s.to_uppercase().as_str() {
            "LONG" => Ok(PositionSide::Long),
            "SHORT" => Ok(PositionSide::Short),
            other => Err(LedgerError::InvalidInput(format!(
                "side는 LONG 또는 SHORT여야 합니다: {}",
                other
            ))),
        }
    }
}

/// 포지션 상태
///
/// LIQUIDATED는 스키마에만 존재하며 이 코어는 청산 엔진을 구현하지 않습니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PositionStatus {
    Open,
    Closed,
    Liquidated,
}

impl PositionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PositionStatus::Open => "OPEN",
            PositionStatus::Closed => "CLOSED",
            PositionStatus::Liquidated => "LIQUIDATED",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "OPEN" => Ok(PositionStatus::Open),
            "CLOSED" => Ok(PositionStatus::Closed),
            "LIQUIDATED" => Ok(PositionStatus::Liquidated),
            other => Err(LedgerError::Corrupt(format!("알 수 없는 포지션 상태: {}", other))),
        }
    }
}

/// 원장 기록의 입출금 방향
///
/// 방향은 type 태그 문자열에서 유추하지 않고 구조적으로 보장합니다.
/// amount는 항상 크기(≥0)입니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Credit,
    Debit,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Credit => "credit",
            Direction::Debit => "debit",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "credit" => Ok(Direction::Credit),
            "debit" => Ok(Direction::Debit),
            other => Err(LedgerError::Corrupt(format!("알 수 없는 방향: {}", other))),
        }
    }
}

/// 원장 기록 종류 (감사 추적용 태그)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    PendingBuy,
    PendingBuyReceived,
    PendingSell,
    PendingSellReceived,
    CancelBuy,
    CancelSell,
    FillBuy,
    FillBuyRefund,
    FillSell,
    FillSellRefund,
    TradingFee,
    FuturesCollateral,
    FuturesPnl,
    FuturesOrderMarginLock,
    FuturesOrderMarginRefund,
    Deposit,
    Withdrawal,
    Adjustment,
}

impl EntryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryKind::PendingBuy => "pending_buy",
            EntryKind::PendingBuyReceived => "pending_buy_received",
            EntryKind::PendingSell => "pending_sell",
            EntryKind::PendingSellReceived => "pending_sell_received",
            EntryKind::CancelBuy => "cancel_buy",
            EntryKind::CancelSell => "cancel_sell",
            EntryKind::FillBuy => "fill_buy",
            EntryKind::FillBuyRefund => "fill_buy_refund",
            EntryKind::FillSell => "fill_sell",
            EntryKind::FillSellRefund => "fill_sell_refund",
            EntryKind::TradingFee => "trading_fee",
            EntryKind::FuturesCollateral => "futures_collateral",
            EntryKind::FuturesPnl => "futures_pnl",
            EntryKind::FuturesOrderMarginLock => "futures_order_margin_lock",
            EntryKind::FuturesOrderMarginRefund => "futures_order_margin_refund",
            EntryKind::Deposit => "deposit",
            EntryKind::Withdrawal => "withdrawal",
            EntryKind::Adjustment => "adjustment",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "pending_buy" => Ok(EntryKind::PendingBuy),
            "pending_buy_received" => Ok(EntryKind::PendingBuyReceived),
            "pending_sell" => Ok(EntryKind::PendingSell),
            "pending_sell_received" => Ok(EntryKind::PendingSellReceived),
            "cancel_buy" => Ok(EntryKind::CancelBuy),
            "cancel_sell" => Ok(EntryKind::CancelSell),
            "fill_buy" => Ok(EntryKind::FillBuy),
            "fill_buy_refund" => Ok(EntryKind::FillBuyRefund),
            "fill_sell" => Ok(EntryKind::FillSell),
            "fill_sell_refund" => Ok(EntryKind::FillSellRefund),
            "trading_fee" => Ok(EntryKind::TradingFee),
            "futures_collateral" => Ok(EntryKind::FuturesCollateral),
            "futures_pnl" => Ok(EntryKind::FuturesPnl),
            "futures_order_margin_lock" => Ok(EntryKind::FuturesOrderMarginLock),
            "futures_order_margin_refund" => Ok(EntryKind::FuturesOrderMarginRefund),
            "deposit" => Ok(EntryKind::Deposit),
            "withdrawal" => Ok(EntryKind::Withdrawal),
            "adjustment" => Ok(EntryKind::Adjustment),
            other => Err(LedgerError::Corrupt(format!("알 수 없는 원장 기록 종류: {}", other))),
        }
    }
}

/// 지갑
///
/// (user_id, currency, wallet_type) 당 1행.
/// 잔고 변경은 반드시 정산 스코프(Settlement) 안에서만 일어납니다.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Wallet {
    pub id: Uuid,
    pub user_id: Uuid,
    pub currency: String,
    pub wallet_type: WalletType,
    pub balance: Decimal,
    /// 현물 전용: 출금 대기 등으로 잠긴 잔고 (balance 이하)
    pub locked_balance: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Wallet {
    /// 잠기지 않은 가용 잔고
    pub fn available(&self) -> Decimal {
        self.balance - self.locked_balance
    }
}

/// 원장 기록 (불변 감사 추적)
///
/// 모든 잔고 변경은 동일 원자 단위 안에서 정확히 1행을 남깁니다.
/// balance_after는 감사 표시용 스냅샷이며 Wallet.balance가 권위 값입니다.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: Uuid,
    pub user_id: Uuid,
    pub wallet_id: Uuid,
    pub kind: EntryKind,
    pub direction: Direction,
    pub currency: String,
    /// 이동한 금액의 크기 (항상 ≥ 0, 방향은 direction이 보장)
    pub amount: Decimal,
    pub fee: Decimal,
    pub balance_after: Decimal,
    pub created_at: DateTime<Utc>,
}

/// 현물/선물 주문
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub user_id: Uuid,
    pub symbol: String,
    pub side: Side,
    pub order_type: OrderType,
    pub market_type: MarketType,
    pub price: Decimal,
    pub quantity: Decimal,
    pub filled_quantity: Decimal,
    /// 선물 전용 (현물은 1)
    pub leverage: u32,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub filled_at: Option<DateTime<Utc>>,
}

impl Order {
    /// 총 명목 가치 (quantity × price)
    pub fn notional(&self) -> Decimal {
        self.quantity * self.price
    }

    /// 잔여 체결 가능 수량
    pub fn fillable(&self) -> Decimal {
        self.quantity - self.filled_quantity
    }
}

/// 체결 기록
///
/// 주문 생성 시 1건 생성되고, 첫 fill 호출에서 갱신됩니다
/// (update-if-exists-else-create, DESIGN.md 참조).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    pub id: Uuid,
    pub user_id: Uuid,
    pub order_id: Uuid,
    pub symbol: String,
    pub side: Side,
    pub price: Decimal,
    pub quantity: Decimal,
    pub commission: Decimal,
    pub created_at: DateTime<Utc>,
}

/// 레버리지 포지션
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub id: Uuid,
    pub user_id: Uuid,
    pub symbol: String,
    pub side: PositionSide,
    pub entry_price: Decimal,
    pub quantity: Decimal,
    pub leverage: u32,
    /// 오픈 시 차감된 담보
    pub margin: Decimal,
    pub unrealized_pnl: Decimal,
    pub realized_pnl: Decimal,
    /// 이 코어는 청산 엔진이 없으므로 수동 설정 값만 보관
    pub liquidation_price: Option<Decimal>,
    pub stop_loss: Option<Decimal>,
    pub take_profit: Option<Decimal>,
    pub status: PositionStatus,
    pub opened_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}
