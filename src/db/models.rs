//! DB 행 모델
//!
//! 금액은 TEXT로 저장되므로 행 구조체는 String을 들고 있고,
//! 도메인 타입 변환 시 Decimal/Uuid 해석 실패를 Corrupt 오류로 보고합니다.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::error::{LedgerError, Result};
use crate::ledger::model::{
    Direction, EntryKind, LedgerEntry, MarketType, Order, OrderStatus, OrderType, Position,
    PositionSide, PositionStatus, Side, Trade, Wallet, WalletType,
};

pub(crate) fn parse_decimal(field: &str, value: &str) -> Result<Decimal> {
    value
        .parse::<Decimal>()
        .map_err(|e| LedgerError::Corrupt(format!("{} 해석 실패 ({}): {}", field, value, e)))
}

pub(crate) fn parse_uuid(field: &str, value: &str) -> Result<Uuid> {
    Uuid::parse_str(value)
        .map_err(|e| LedgerError::Corrupt(format!("{} 해석 실패 ({}): {}", field, value, e)))
}

fn parse_opt_decimal(field: &str, value: Option<&str>) -> Result<Option<Decimal>> {
    value.map(|v| parse_decimal(field, v)).transpose()
}

/// 지갑 DB 행
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct WalletRecord {
    pub id: String,
    pub user_id: String,
    pub currency: String,
    pub wallet_type: String,
    pub balance: String,
    pub locked_balance: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<WalletRecord> for Wallet {
    type Error = LedgerError;

    fn try_from(r: WalletRecord) -> Result<Self> {
        Ok(Wallet {
            id: parse_uuid("wallet.id", &r.id)?,
            user_id: parse_uuid("wallet.user_id", &r.user_id)?,
            currency: r.currency,
            wallet_type: WalletType::parse(&r.wallet_type)?,
            balance: parse_decimal("wallet.balance", &r.balance)?,
            locked_balance: parse_decimal("wallet.locked_balance", &r.locked_balance)?,
            created_at: r.created_at,
            updated_at: r.updated_at,
        })
    }
}

/// 원장 기록 DB 행
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct LedgerEntryRecord {
    pub id: String,
    pub user_id: String,
    pub wallet_id: String,
    pub kind: String,
    pub direction: String,
    pub currency: String,
    pub amount: String,
    pub fee: String,
    pub balance_after: String,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<LedgerEntryRecord> for LedgerEntry {
    type Error = LedgerError;

    fn try_from(r: LedgerEntryRecord) -> Result<Self> {
        Ok(LedgerEntry {
            id: parse_uuid("entry.id", &r.id)?,
            user_id: parse_uuid("entry.user_id", &r.user_id)?,
            wallet_id: parse_uuid("entry.wallet_id", &r.wallet_id)?,
            kind: EntryKind::parse(&r.kind)?,
            direction: Direction::parse(&r.direction)?,
            currency: r.currency,
            amount: parse_decimal("entry.amount", &r.amount)?,
            fee: parse_decimal("entry.fee", &r.fee)?,
            balance_after: parse_decimal("entry.balance_after", &r.balance_after)?,
            created_at: r.created_at,
        })
    }
}

/// 주문 DB 행
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct OrderRecord {
    pub id: String,
    pub user_id: String,
    pub symbol: String,
    pub side: String,
    pub order_type: String,
    pub market_type: String,
    pub price: String,
    pub quantity: String,
    pub filled_quantity: String,
    pub leverage: i64,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub filled_at: Option<DateTime<Utc>>,
}

impl TryFrom<OrderRecord> for Order {
    type Error = LedgerError;

    fn try_from(r: OrderRecord) -> Result<Self> {
        Ok(Order {
            id: parse_uuid("order.id", &r.id)?,
            user_id: parse_uuid("order.user_id", &r.user_id)?,
            symbol: r.symbol,
            side: Side::parse(&r.side)?,
            order_type: OrderType::parse(&r.order_type)?,
            market_type: MarketType::parse(&r.market_type)?,
            price: parse_decimal("order.price", &r.price)?,
            quantity: parse_decimal("order.quantity", &r.quantity)?,
            filled_quantity: parse_decimal("order.filled_quantity", &r.filled_quantity)?,
            leverage: u32::try_from(r.leverage)
                .map_err(|_| LedgerError::Corrupt(format!("order.leverage 음수: {}", r.leverage)))?,
            status: OrderStatus::parse(&r.status)?,
            created_at: r.created_at,
            updated_at: r.updated_at,
            filled_at: r.filled_at,
        })
    }
}

/// 체결 DB 행
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TradeRecord {
    pub id: String,
    pub user_id: String,
    pub order_id: String,
    pub symbol: String,
    pub side: String,
    pub price: String,
    pub quantity: String,
    pub commission: String,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<TradeRecord> for Trade {
    type Error = LedgerError;

    fn try_from(r: TradeRecord) -> Result<Self> {
        Ok(Trade {
            id: parse_uuid("trade.id", &r.id)?,
            user_id: parse_uuid("trade.user_id", &r.user_id)?,
            order_id: parse_uuid("trade.order_id", &r.order_id)?,
            symbol: r.symbol,
            side: Side::parse(&r.side)?,
            price: parse_decimal("trade.price", &r.price)?,
            quantity: parse_decimal("trade.quantity", &r.quantity)?,
            commission: parse_decimal("trade.commission", &r.commission)?,
            created_at: r.created_at,
        })
    }
}

/// 포지션 DB 행
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PositionRecord {
    pub id: String,
    pub user_id: String,
    pub symbol: String,
    pub side: String,
    pub entry_price: String,
    pub quantity: String,
    pub leverage: i64,
    pub margin: String,
    pub unrealized_pnl: String,
    pub realized_pnl: String,
    pub liquidation_price: Option<String>,
    pub stop_loss: Option<String>,
    pub take_profit: Option<String>,
    pub status: String,
    pub opened_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<PositionRecord> for Position {
    type Error = LedgerError;

    fn try_from(r: PositionRecord) -> Result<Self> {
        Ok(Position {
            id: parse_uuid("position.id", &r.id)?,
            user_id: parse_uuid("position.user_id", &r.user_id)?,
            symbol: r.symbol,
            side: PositionSide::parse(&r.side)?,
            entry_price: parse_decimal("position.entry_price", &r.entry_price)?,
            quantity: parse_decimal("position.quantity", &r.quantity)?,
            leverage: u32::try_from(r.leverage).map_err(|_| {
                LedgerError::Corrupt(format!("position.leverage 음수: {}", r.leverage))
            })?,
            margin: parse_decimal("position.margin", &r.margin)?,
            unrealized_pnl: parse_decimal("position.unrealized_pnl", &r.unrealized_pnl)?,
            realized_pnl: parse_decimal("position.realized_pnl", &r.realized_pnl)?,
            liquidation_price: parse_opt_decimal(
                "position.liquidation_price",
                r.liquidation_price.as_deref(),
            )?,
            stop_loss: parse_opt_decimal("position.stop_loss", r.stop_loss.as_deref())?,
            take_profit: parse_opt_decimal("position.take_profit", r.take_profit.as_deref())?,
            status: PositionStatus::parse(&r.status)?,
            opened_at: r.opened_at,
            closed_at: r.closed_at,
            updated_at: r.updated_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wallet_record_conversion() {
        let record = WalletRecord {
            id: Uuid::new_v4().to_string(),
            user_id: Uuid::new_v4().to_string(),
            currency: "USDT".to_string(),
            wallet_type: "spot".to_string(),
            balance: "500.25".to_string(),
            locked_balance: "0".to_string(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        let wallet = Wallet::try_from(record).unwrap();
        assert_eq!(wallet.balance, "500.25".parse::<Decimal>().unwrap());
        assert_eq!(wallet.wallet_type, WalletType::Spot);
    }

    #[test]
    fn test_corrupt_decimal_is_reported() {
        let record = WalletRecord {
            id: Uuid::new_v4().to_string(),
            user_id: Uuid::new_v4().to_string(),
            currency: "USDT".to_string(),
            wallet_type: "spot".to_string(),
            balance: "not-a-number".to_string(),
            locked_balance: "0".to_string(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        assert!(matches!(
            Wallet::try_from(record),
            Err(LedgerError::Corrupt(_))
        ));
    }
}
