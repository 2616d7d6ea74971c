//! 현물 주문 엔진
//!
//! 주문 생성/취소/체결의 상태 기계와 그에 따른 지갑 정산을 담당합니다.
//! 매칭 엔진은 없으며 체결은 외부 호출자가 보고합니다.
//!
//! 주의: 기본 설정은 주문 생성 시점에 반대 자산을 선지급합니다
//! (pre_credit_open_orders=true). 이 모드에서는 미체결 주문 취소 시
//! 선지급분이 회수되지 않아 자산 보존이 깨집니다. 교정 모드(false)는
//! MARKET을 생성 시 정산하고 LIMIT은 체결 시에만 지급합니다.

use chrono::Utc;
use log::info;
use rust_decimal::Decimal;
use sqlx::sqlite::SqlitePool;
use uuid::Uuid;

use crate::config::LedgerConfig;
use crate::error::{LedgerError, Result};
use crate::fees;
use crate::ledger::model::{
    split_symbol, Direction, EntryKind, MarketType, Order, OrderStatus, OrderType, Side, Trade,
    Wallet, WalletType,
};
use crate::ledger::store;
use crate::settlement::Settlement;

/// 주문 생성 요청
#[derive(Debug, Clone)]
pub struct CreateOrderRequest {
    pub user_id: Uuid,
    pub symbol: String,
    pub side: Side,
    pub order_type: OrderType,
    pub price: Decimal,
    pub quantity: Decimal,
    /// 클라이언트가 계산한 수수료. 서버 계산값과 0.01 초과 차이 시 거부.
    pub claimed_fee: Option<Decimal>,
}

/// 주문 생성 결과
#[derive(Debug, Clone)]
pub struct OrderOutcome {
    pub order: Order,
    pub trade: Trade,
    /// 서버가 계산해 실제로 차감한 수수료
    pub fee: Decimal,
    pub quote_balance: Decimal,
}

/// 주문 취소 결과
#[derive(Debug, Clone)]
pub struct CancelOutcome {
    pub order: Order,
    pub refunded: Decimal,
    pub refund_currency: String,
}

/// 외부 매칭 체결 보고
#[derive(Debug, Clone)]
pub struct FillReport {
    pub order_id: Uuid,
    pub price: Decimal,
    pub quantity: Decimal,
    pub commission: Decimal,
}

/// 체결 처리 결과
#[derive(Debug, Clone)]
pub struct FillOutcome {
    pub order: Order,
    pub trade: Trade,
    /// 미사용 잠금분 환급액 (첫 체결에서만 0이 아닐 수 있음)
    pub refunded: Decimal,
    /// false면 이미 체결 완료된 주문에 대한 무변경 성공 (MARKET 재보고)
    pub settled: bool,
}

/// 현물 주문 엔진
#[derive(Clone)]
pub struct SpotEngine {
    pool: SqlitePool,
    config: LedgerConfig,
}

impl SpotEngine {
    pub fn new(pool: SqlitePool, config: LedgerConfig) -> Self {
        Self { pool, config }
    }

    /// 주문 생성
    ///
    /// MARKET 주문은 제출 가격으로 즉시 자동 체결됩니다.
    /// 수수료는 생성 시점에 호가 통화에서 차감되며 취소해도 환급되지 않습니다.
    pub async fn create_order(&self, req: CreateOrderRequest) -> Result<OrderOutcome> {
        if req.quantity <= Decimal::ZERO {
            return Err(LedgerError::InvalidInput(
                "수량은 0보다 커야 합니다".to_string(),
            ));
        }
        if req.price <= Decimal::ZERO {
            return Err(LedgerError::InvalidInput(
                "가격은 0보다 커야 합니다".to_string(),
            ));
        }
        let (coin, quote) = split_symbol(&req.symbol)?;
        let symbol = format!("{}{}", coin, quote);

        let notional = req.quantity * req.price;
        let fee = fees::trading_fee(notional);
        if let Some(claimed) = req.claimed_fee {
            if !fees::validate_fee(fee, claimed) {
                return Err(LedgerError::FeeMismatch {
                    expected: fee,
                    supplied: claimed,
                });
            }
        }

        let mut settlement = Settlement::begin(&self.pool).await?;
        let conn = settlement.conn();

        let mut quote_wallet =
            store::get_or_create_wallet(&mut *conn, req.user_id, &quote, WalletType::Spot).await?;
        let mut coin_wallet =
            store::get_or_create_wallet(&mut *conn, req.user_id, &coin, WalletType::Spot).await?;

        // 주문 자산 잠금 (차감)
        match req.side {
            Side::Buy => {
                store::post_entry(
                    &mut *conn,
                    &mut quote_wallet,
                    EntryKind::PendingBuy,
                    Direction::Debit,
                    notional,
                    Decimal::ZERO,
                )
                .await?;
            }
            Side::Sell => {
                store::post_entry(
                    &mut *conn,
                    &mut coin_wallet,
                    EntryKind::PendingSell,
                    Direction::Debit,
                    req.quantity,
                    Decimal::ZERO,
                )
                .await?;
            }
        }

        let is_market = req.order_type == OrderType::Market;

        // 반대 자산 지급
        if self.config.pre_credit_open_orders {
            // 선지급 모드: 체결 여부와 무관하게 생성 시점에 지급
            match req.side {
                Side::Buy => {
                    store::post_entry(
                        &mut *conn,
                        &mut coin_wallet,
                        EntryKind::PendingBuyReceived,
                        Direction::Credit,
                        req.quantity,
                        Decimal::ZERO,
                    )
                    .await?;
                }
                Side::Sell => {
                    store::post_entry(
                        &mut *conn,
                        &mut quote_wallet,
                        EntryKind::PendingSellReceived,
                        Direction::Credit,
                        notional,
                        Decimal::ZERO,
                    )
                    .await?;
                }
            }
        } else if is_market {
            // 교정 모드: MARKET만 생성 시점에 정산
            match req.side {
                Side::Buy => {
                    store::post_entry(
                        &mut *conn,
                        &mut coin_wallet,
                        EntryKind::FillBuy,
                        Direction::Credit,
                        req.quantity,
                        Decimal::ZERO,
                    )
                    .await?;
                }
                Side::Sell => {
                    store::post_entry(
                        &mut *conn,
                        &mut quote_wallet,
                        EntryKind::FillSell,
                        Direction::Credit,
                        notional,
                        Decimal::ZERO,
                    )
                    .await?;
                }
            }
        }

        // 수수료 차감 (독립 원장 행)
        store::post_entry(
            &mut *conn,
            &mut quote_wallet,
            EntryKind::TradingFee,
            Direction::Debit,
            fee,
            fee,
        )
        .await?;

        let now = Utc::now();
        let order = Order {
            id: Uuid::new_v4(),
            user_id: req.user_id,
            symbol: symbol.clone(),
            side: req.side,
            order_type: req.order_type,
            market_type: MarketType::Spot,
            price: req.price,
            quantity: req.quantity,
            filled_quantity: if is_market { req.quantity } else { Decimal::ZERO },
            leverage: 1,
            status: if is_market {
                OrderStatus::Filled
            } else {
                OrderStatus::Pending
            },
            created_at: now,
            updated_at: now,
            filled_at: if is_market { Some(now) } else { None },
        };
        store::insert_order(&mut *conn, &order).await?;

        // 주문당 1건의 체결 행을 생성 시점에 만들어 두고 첫 fill에서 갱신
        let trade = Trade {
            id: Uuid::new_v4(),
            user_id: req.user_id,
            order_id: order.id,
            symbol,
            side: req.side,
            price: req.price,
            quantity: req.quantity,
            commission: fee,
            created_at: now,
        };
        store::insert_trade(&mut *conn, &trade).await?;

        let quote_balance = quote_wallet.balance;
        settlement.commit().await?;

        info!(
            "📝 주문 생성: {} {} {} {}@{} (수수료 {})",
            order.id,
            order.side.as_str(),
            order.symbol,
            order.quantity,
            order.price,
            fee
        );

        Ok(OrderOutcome {
            order,
            trade,
            fee,
            quote_balance,
        })
    }

    /// 주문 취소
    ///
    /// pending 상태에서만 가능. 잠긴 자산을 환급하며 수수료는 환급하지 않습니다.
    pub async fn cancel_order(&self, user_id: Uuid, order_id: Uuid) -> Result<CancelOutcome> {
        let mut settlement = Settlement::begin(&self.pool).await?;
        let conn = settlement.conn();

        let mut order = store::get_user_order(&mut *conn, order_id, user_id, MarketType::Spot)
            .await?
            .ok_or(LedgerError::NotFound("주문"))?;

        if order.status != OrderStatus::Pending {
            return Err(LedgerError::InvalidState(format!(
                "{} 상태의 주문은 취소할 수 없습니다",
                order.status.as_str()
            )));
        }

        let (coin, quote) = split_symbol(&order.symbol)?;

        let (refunded, refund_currency) = match order.side {
            Side::Buy => {
                let mut wallet =
                    store::get_or_create_wallet(&mut *conn, user_id, &quote, WalletType::Spot)
                        .await?;
                let amount = order.notional();
                store::post_entry(
                    &mut *conn,
                    &mut wallet,
                    EntryKind::CancelBuy,
                    Direction::Credit,
                    amount,
                    Decimal::ZERO,
                )
                .await?;
                (amount, quote)
            }
            Side::Sell => {
                let mut wallet =
                    store::get_or_create_wallet(&mut *conn, user_id, &coin, WalletType::Spot)
                        .await?;
                let amount = order.quantity;
                store::post_entry(
                    &mut *conn,
                    &mut wallet,
                    EntryKind::CancelSell,
                    Direction::Credit,
                    amount,
                    Decimal::ZERO,
                )
                .await?;
                (amount, coin)
            }
        };

        store::set_order_status(&mut *conn, order.id, OrderStatus::Cancelled).await?;
        order.status = OrderStatus::Cancelled;

        settlement.commit().await?;

        info!("🚫 주문 취소: {} (환급 {} {})", order.id, refunded, refund_currency);

        Ok(CancelOutcome {
            order,
            refunded,
            refund_currency,
        })
    }

    /// 외부 매칭 체결 보고 처리
    ///
    /// 이미 체결 완료된 주문(MARKET 자동 체결)에 대한 보고는 지갑/원장
    /// 무변경으로 기존 체결을 반환합니다. 부분 체결 후 재체결 시 환급은
    /// 첫 체결에서 전액 이뤄지므로 0입니다.
    pub async fn fill_order(&self, report: FillReport) -> Result<FillOutcome> {
        if report.quantity <= Decimal::ZERO {
            return Err(LedgerError::InvalidInput(
                "체결 수량은 0보다 커야 합니다".to_string(),
            ));
        }
        if report.price <= Decimal::ZERO {
            return Err(LedgerError::InvalidInput(
                "체결 가격은 0보다 커야 합니다".to_string(),
            ));
        }
        if report.commission < Decimal::ZERO {
            return Err(LedgerError::InvalidInput(
                "수수료는 음수가 될 수 없습니다".to_string(),
            ));
        }

        let mut settlement = Settlement::begin(&self.pool).await?;
        let conn = settlement.conn();

        let mut order = store::get_order(&mut *conn, report.order_id, MarketType::Spot)
            .await?
            .ok_or(LedgerError::NotFound("주문"))?;

        // 이미 체결 완료 → 무변경 성공
        if order.status == OrderStatus::Filled {
            let trade = store::find_trade_by_order(&mut *conn, order.id)
                .await?
                .ok_or(LedgerError::NotFound("체결"))?;
            settlement.rollback().await?;
            return Ok(FillOutcome {
                order,
                trade,
                refunded: Decimal::ZERO,
                settled: false,
            });
        }

        if order.status == OrderStatus::Cancelled {
            return Err(LedgerError::InvalidState(
                "취소된 주문은 체결할 수 없습니다".to_string(),
            ));
        }

        let fillable = order.fillable();
        if report.quantity > fillable {
            return Err(LedgerError::OverFill {
                requested: report.quantity,
                fillable,
            });
        }

        let (coin, quote) = split_symbol(&order.symbol)?;
        let mut quote_wallet =
            store::get_or_create_wallet(&mut *conn, order.user_id, &quote, WalletType::Spot)
                .await?;
        let mut coin_wallet =
            store::get_or_create_wallet(&mut *conn, order.user_id, &coin, WalletType::Spot)
                .await?;

        let first_fill = order.filled_quantity.is_zero();
        let fill_cost = report.price * report.quantity;

        let refunded = match order.side {
            Side::Buy => {
                // 첫 체결에서 미사용 잠금분 전액 환급 (단일 체결 가정)
                let refund = if first_fill {
                    (order.notional() - fill_cost).max(Decimal::ZERO)
                } else {
                    Decimal::ZERO
                };
                store::post_entry(
                    &mut *conn,
                    &mut quote_wallet,
                    EntryKind::FillBuyRefund,
                    Direction::Credit,
                    refund,
                    Decimal::ZERO,
                )
                .await?;
                store::post_entry(
                    &mut *conn,
                    &mut coin_wallet,
                    EntryKind::FillBuy,
                    Direction::Credit,
                    report.quantity,
                    Decimal::ZERO,
                )
                .await?;
                refund
            }
            Side::Sell => {
                let refund = if first_fill {
                    (order.quantity - report.quantity).max(Decimal::ZERO)
                } else {
                    Decimal::ZERO
                };
                store::post_entry(
                    &mut *conn,
                    &mut coin_wallet,
                    EntryKind::FillSellRefund,
                    Direction::Credit,
                    refund,
                    Decimal::ZERO,
                )
                .await?;
                store::post_entry(
                    &mut *conn,
                    &mut quote_wallet,
                    EntryKind::FillSell,
                    Direction::Credit,
                    fill_cost,
                    Decimal::ZERO,
                )
                .await?;
                refund
            }
        };

        // 체결 수수료는 호가 통화에서 차감
        store::post_entry(
            &mut *conn,
            &mut quote_wallet,
            EntryKind::TradingFee,
            Direction::Debit,
            report.commission,
            report.commission,
        )
        .await?;

        order.filled_quantity += report.quantity;
        if order.filled_quantity == order.quantity {
            order.status = OrderStatus::Filled;
            order.filled_at = Some(Utc::now());
        } else {
            order.status = OrderStatus::Partial;
        }
        store::update_order_fill(&mut *conn, &order).await?;

        // 기존 체결 행이 있으면 덮어쓰고 없으면 생성
        let trade = match store::find_trade_by_order(&mut *conn, order.id).await? {
            Some(mut trade) => {
                trade.price = report.price;
                trade.quantity = report.quantity;
                trade.commission = report.commission;
                store::update_trade(&mut *conn, &trade).await?;
                trade
            }
            None => {
                let trade = Trade {
                    id: Uuid::new_v4(),
                    user_id: order.user_id,
                    order_id: order.id,
                    symbol: order.symbol.clone(),
                    side: order.side,
                    price: report.price,
                    quantity: report.quantity,
                    commission: report.commission,
                    created_at: Utc::now(),
                };
                store::insert_trade(&mut *conn, &trade).await?;
                trade
            }
        };

        settlement.commit().await?;

        info!(
            "✅ 체결 처리: 주문 {} {}@{} (환급 {}, 상태 {})",
            order.id,
            report.quantity,
            report.price,
            refunded,
            order.status.as_str()
        );

        Ok(FillOutcome {
            order,
            trade,
            refunded,
            settled: true,
        })
    }

    /// 사용자 주문 단건 조회
    pub async fn get_order(&self, user_id: Uuid, order_id: Uuid) -> Result<Order> {
        let mut conn = self.pool.acquire().await?;
        store::get_user_order(&mut conn, order_id, user_id, MarketType::Spot)
            .await?
            .ok_or(LedgerError::NotFound("주문"))
    }

    /// 사용자 주문 목록
    pub async fn list_orders(
        &self,
        user_id: Uuid,
        symbol: Option<&str>,
        status: Option<OrderStatus>,
        limit: i64,
    ) -> Result<Vec<Order>> {
        let mut conn = self.pool.acquire().await?;
        store::list_orders(&mut conn, user_id, MarketType::Spot, symbol, status, limit).await
    }

    /// 사용자 체결 목록
    pub async fn list_trades(
        &self,
        user_id: Uuid,
        symbol: Option<&str>,
        limit: i64,
    ) -> Result<Vec<Trade>> {
        let mut conn = self.pool.acquire().await?;
        store::list_trades(&mut conn, user_id, symbol, limit).await
    }

    /// 현재 지갑 잔고 조회 (정산 외부 읽기 경로)
    pub async fn wallet_balance(
        &self,
        user_id: Uuid,
        currency: &str,
    ) -> Result<Option<Wallet>> {
        let mut conn = self.pool.acquire().await?;
        store::get_wallet(&mut conn, user_id, &currency.to_uppercase(), WalletType::Spot).await
    }
}
