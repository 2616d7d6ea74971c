//! 선물 포지션 엔진
//!
//! 포지션 오픈/청산과 TP/SL 관리, 선물 주문의 증거금 잠금을 담당합니다.
//! 담보는 현물 USDT 지갑에서 차감됩니다. 청산 엔진·펀딩 정산·시가 평가는
//! 이 코어에 없으며 liquidation_price는 수동 설정 값입니다.

use chrono::Utc;
use log::info;
use rust_decimal::Decimal;
use sqlx::sqlite::SqlitePool;
use uuid::Uuid;

use crate::config::LedgerConfig;
use crate::error::{LedgerError, Result};
use crate::fees;
use crate::ledger::model::{
    split_symbol, Direction, EntryKind, MarketType, Order, OrderStatus, OrderType, Position,
    PositionSide, PositionStatus, Side, WalletType, QUOTE_CURRENCY,
};
use crate::ledger::store;
use crate::settlement::Settlement;

const MIN_LEVERAGE: u32 = 1;
const MAX_LEVERAGE: u32 = 100;

/// 포지션 오픈 요청
#[derive(Debug, Clone)]
pub struct OpenPositionRequest {
    pub user_id: Uuid,
    pub symbol: String,
    pub side: PositionSide,
    pub entry_price: Decimal,
    pub quantity: Decimal,
    pub leverage: u32,
    /// 차감할 담보 (USDT)
    pub collateral: Decimal,
    /// 수동 설정 청산가 (이 코어는 계산하지 않음)
    pub liquidation_price: Option<Decimal>,
}

/// 포지션 청산 결과
#[derive(Debug, Clone)]
pub struct CloseOutcome {
    pub position: Position,
    /// 이번 청산에서 실현된 PnL
    pub realized_pnl: Decimal,
    pub fees: Decimal,
    /// 실제 지갑 입금액 (0 미만으로 내려가지 않도록 절사)
    pub credited: Decimal,
    pub usdt_balance: Decimal,
}

/// 선물 주문 생성 결과
#[derive(Debug, Clone)]
pub struct FuturesOrderOutcome {
    pub order: Order,
    /// MARKET 주문이면 즉시 오픈된 포지션
    pub position: Option<Position>,
    /// 잠긴 증거금 (notional / leverage)
    pub margin: Decimal,
}

/// 포트폴리오 요약
#[derive(Debug, Clone, serde::Serialize)]
pub struct PortfolioSummary {
    pub usdt_balance: Decimal,
    pub open_position_count: usize,
    pub total_margin: Decimal,
    pub total_unrealized_pnl: Decimal,
    pub total_realized_pnl: Decimal,
}

/// 선물 포지션 엔진
#[derive(Clone)]
pub struct FuturesEngine {
    pool: SqlitePool,
    config: LedgerConfig,
}

impl FuturesEngine {
    pub fn new(pool: SqlitePool, config: LedgerConfig) -> Self {
        Self { pool, config }
    }

    fn validate_leverage(leverage: u32) -> Result<()> {
        if !(MIN_LEVERAGE..=MAX_LEVERAGE).contains(&leverage) {
            return Err(LedgerError::InvalidInput(format!(
                "레버리지는 {}~{} 사이여야 합니다: {}",
                MIN_LEVERAGE, MAX_LEVERAGE, leverage
            )));
        }
        Ok(())
    }

    /// 포지션 오픈
    ///
    /// 담보를 현물 USDT 지갑에서 차감하고 OPEN 포지션을 만듭니다.
    pub async fn open_position(&self, req: OpenPositionRequest) -> Result<Position> {
        Self::validate_leverage(req.leverage)?;
        if req.entry_price <= Decimal::ZERO || req.quantity <= Decimal::ZERO {
            return Err(LedgerError::InvalidInput(
                "가격과 수량은 0보다 커야 합니다".to_string(),
            ));
        }
        if req.collateral <= Decimal::ZERO {
            return Err(LedgerError::InvalidInput(
                "담보는 0보다 커야 합니다".to_string(),
            ));
        }
        let (coin, quote) = split_symbol(&req.symbol)?;
        let symbol = format!("{}{}", coin, quote);

        let mut settlement = Settlement::begin(&self.pool).await?;
        let conn = settlement.conn();

        let mut wallet =
            store::get_or_create_wallet(&mut *conn, req.user_id, QUOTE_CURRENCY, WalletType::Spot)
                .await?;
        let available = wallet.available();
        if req.collateral > available {
            return Err(LedgerError::InsufficientCollateral {
                needed: req.collateral,
                available,
            });
        }
        store::post_entry(
            &mut *conn,
            &mut wallet,
            EntryKind::FuturesCollateral,
            Direction::Debit,
            req.collateral,
            Decimal::ZERO,
        )
        .await?;

        let now = Utc::now();
        let position = Position {
            id: Uuid::new_v4(),
            user_id: req.user_id,
            symbol,
            side: req.side,
            entry_price: req.entry_price,
            quantity: req.quantity,
            leverage: req.leverage,
            margin: req.collateral,
            unrealized_pnl: Decimal::ZERO,
            realized_pnl: Decimal::ZERO,
            liquidation_price: req.liquidation_price,
            stop_loss: None,
            take_profit: None,
            status: PositionStatus::Open,
            opened_at: now,
            closed_at: None,
            updated_at: now,
        };
        store::insert_position(&mut *conn, &position).await?;

        settlement.commit().await?;

        info!(
            "📈 포지션 오픈: {} {} {} {}@{} x{} (증거금 {})",
            position.id,
            position.side.as_str(),
            position.symbol,
            position.quantity,
            position.entry_price,
            position.leverage,
            position.margin
        );

        Ok(position)
    }

    /// TP/SL 갱신 (잔고 무영향, 메타데이터 전용)
    ///
    /// LONG: TP > 진입가, SL < 진입가, SL > 청산가(설정 시).
    /// SHORT: 부등호 반전. None인 값은 기존 값을 유지합니다.
    pub async fn update_tpsl(
        &self,
        user_id: Uuid,
        position_id: Uuid,
        take_profit: Option<Decimal>,
        stop_loss: Option<Decimal>,
    ) -> Result<Position> {
        let mut settlement = Settlement::begin(&self.pool).await?;
        let conn = settlement.conn();

        let mut position = store::get_position(&mut *conn, position_id, user_id)
            .await?
            .ok_or(LedgerError::NotFound("포지션"))?;

        if position.status != PositionStatus::Open {
            return Err(LedgerError::InvalidState(format!(
                "{} 상태의 포지션은 TP/SL을 변경할 수 없습니다",
                position.status.as_str()
            )));
        }

        let entry = position.entry_price;
        match position.side {
            PositionSide::Long => {
                if let Some(tp) = take_profit {
                    if tp <= entry {
                        return Err(LedgerError::InvalidTpSl(format!(
                            "LONG의 take_profit({})은 진입가({})보다 커야 합니다",
                            tp, entry
                        )));
                    }
                }
                if let Some(sl) = stop_loss {
                    if sl >= entry {
                        return Err(LedgerError::InvalidTpSl(format!(
                            "LONG의 stop_loss({})는 진입가({})보다 작아야 합니다",
                            sl, entry
                        )));
                    }
                    if let Some(liq) = position.liquidation_price {
                        if sl <= liq {
                            return Err(LedgerError::InvalidTpSl(format!(
                                "LONG의 stop_loss({})는 청산가({})보다 커야 합니다",
                                sl, liq
                            )));
                        }
                    }
                }
            }
            PositionSide::Short => {
                if let Some(tp) = take_profit {
                    if tp >= entry {
                        return Err(LedgerError::InvalidTpSl(format!(
                            "SHORT의 take_profit({})은 진입가({})보다 작아야 합니다",
                            tp, entry
                        )));
                    }
                }
                if let Some(sl) = stop_loss {
                    if sl <= entry {
                        return Err(LedgerError::InvalidTpSl(format!(
                            "SHORT의 stop_loss({})는 진입가({})보다 커야 합니다",
                            sl, entry
                        )));
                    }
                    if let Some(liq) = position.liquidation_price {
                        if sl >= liq {
                            return Err(LedgerError::InvalidTpSl(format!(
                                "SHORT의 stop_loss({})는 청산가({})보다 작아야 합니다",
                                sl, liq
                            )));
                        }
                    }
                }
            }
        }

        // TP/SL 컬럼만 조건부로 갱신합니다. 전체 행을 다시 쓰면 조회와
        // 저장 사이에 완료된 청산을 덮어써 포지션이 되살아날 수 있습니다.
        store::update_position_tpsl(&mut *conn, position_id, user_id, take_profit, stop_loss)
            .await?;

        settlement.commit().await?;

        if take_profit.is_some() {
            position.take_profit = take_profit;
        }
        if stop_loss.is_some() {
            position.stop_loss = stop_loss;
        }
        Ok(position)
    }

    /// 포지션 청산 (전체 또는 부분)
    ///
    /// 수수료는 증거금 기준 고정 추정치(2 × 0.1%)이며 청산 수량에
    /// 비례하지 않습니다. 기본 설정에서는 부분 청산도 증거금 전액을
    /// 환급합니다 (proportional_margin_refund=false).
    pub async fn close_position(
        &self,
        user_id: Uuid,
        position_id: Uuid,
        exit_price: Decimal,
        quantity: Option<Decimal>,
    ) -> Result<CloseOutcome> {
        if exit_price <= Decimal::ZERO {
            return Err(LedgerError::InvalidInput(
                "청산 가격은 0보다 커야 합니다".to_string(),
            ));
        }

        let mut settlement = Settlement::begin(&self.pool).await?;
        let conn = settlement.conn();

        let mut position = store::get_position(&mut *conn, position_id, user_id)
            .await?
            .ok_or(LedgerError::NotFound("포지션"))?;

        if position.status != PositionStatus::Open {
            return Err(LedgerError::InvalidState(format!(
                "{} 상태의 포지션은 청산할 수 없습니다",
                position.status.as_str()
            )));
        }

        let qty_close = quantity.unwrap_or(position.quantity);
        if qty_close <= Decimal::ZERO || qty_close > position.quantity {
            return Err(LedgerError::InvalidInput(format!(
                "청산 수량은 0보다 크고 보유 수량({}) 이하여야 합니다: {}",
                position.quantity, qty_close
            )));
        }

        let realized = fees::realized_pnl(
            position.side,
            position.entry_price,
            exit_price,
            qty_close,
            position.leverage,
        );
        let close_fees = fees::position_close_fees(position.margin);

        let margin_refund = if self.config.proportional_margin_refund {
            position.margin * qty_close / position.quantity
        } else {
            position.margin
        };

        // 손실이 증거금을 초과해도 지갑 잔고가 음수가 되지 않도록 절사
        let credited = (margin_refund + realized - close_fees).max(Decimal::ZERO);

        let mut wallet =
            store::get_or_create_wallet(&mut *conn, user_id, QUOTE_CURRENCY, WalletType::Spot)
                .await?;
        store::post_entry(
            &mut *conn,
            &mut wallet,
            EntryKind::FuturesPnl,
            Direction::Credit,
            credited,
            close_fees,
        )
        .await?;

        position.realized_pnl += realized;
        if qty_close < position.quantity {
            position.quantity -= qty_close;
            if self.config.proportional_margin_refund {
                position.margin -= margin_refund;
            }
        } else {
            position.status = PositionStatus::Closed;
            position.closed_at = Some(Utc::now());
        }
        store::update_position(&mut *conn, &position).await?;

        let usdt_balance = wallet.balance;
        settlement.commit().await?;

        info!(
            "📉 포지션 청산: {} {}@{} (실현 PnL {}, 수수료 {}, 입금 {})",
            position.id, qty_close, exit_price, realized, close_fees, credited
        );

        Ok(CloseOutcome {
            position,
            realized_pnl: realized,
            fees: close_fees,
            credited,
            usdt_balance,
        })
    }

    /// 선물 주문 생성
    ///
    /// 증거금(명목가/레버리지)을 현물 USDT 지갑에서 잠그고,
    /// MARKET 주문은 즉시 포지션을 오픈합니다.
    pub async fn create_futures_order(
        &self,
        user_id: Uuid,
        symbol: &str,
        side: Side,
        order_type: OrderType,
        price: Decimal,
        quantity: Decimal,
        leverage: u32,
    ) -> Result<FuturesOrderOutcome> {
        Self::validate_leverage(leverage)?;
        if price <= Decimal::ZERO || quantity <= Decimal::ZERO {
            return Err(LedgerError::InvalidInput(
                "가격과 수량은 0보다 커야 합니다".to_string(),
            ));
        }
        let (coin, quote) = split_symbol(symbol)?;
        let symbol = format!("{}{}", coin, quote);

        let margin = price * quantity / Decimal::from(leverage);

        let mut settlement = Settlement::begin(&self.pool).await?;
        let conn = settlement.conn();

        let mut wallet =
            store::get_or_create_wallet(&mut *conn, user_id, QUOTE_CURRENCY, WalletType::Spot)
                .await?;
        let available = wallet.available();
        if margin > available {
            return Err(LedgerError::InsufficientCollateral {
                needed: margin,
                available,
            });
        }
        store::post_entry(
            &mut *conn,
            &mut wallet,
            EntryKind::FuturesOrderMarginLock,
            Direction::Debit,
            margin,
            Decimal::ZERO,
        )
        .await?;

        let is_market = order_type == OrderType::Market;
        let now = Utc::now();
        let order = Order {
            id: Uuid::new_v4(),
            user_id,
            symbol: symbol.clone(),
            side,
            order_type,
            market_type: MarketType::Futures,
            price,
            quantity,
            filled_quantity: if is_market { quantity } else { Decimal::ZERO },
            leverage,
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

        // MARKET 주문은 잠긴 증거금을 담보로 즉시 포지션 오픈
        let position = if is_market {
            let position = Position {
                id: Uuid::new_v4(),
                user_id,
                symbol,
                side: match side {
                    Side::Buy => PositionSide::Long,
                    Side::Sell => PositionSide::Short,
                },
                entry_price: price,
                quantity,
                leverage,
                margin,
                unrealized_pnl: Decimal::ZERO,
                realized_pnl: Decimal::ZERO,
                liquidation_price: None,
                stop_loss: None,
                take_profit: None,
                status: PositionStatus::Open,
                opened_at: now,
                closed_at: None,
                updated_at: now,
            };
            store::insert_position(&mut *conn, &position).await?;
            Some(position)
        } else {
            None
        };

        settlement.commit().await?;

        info!(
            "📝 선물 주문 생성: {} {} {} {}@{} x{} (증거금 {})",
            order.id,
            order.side.as_str(),
            order.symbol,
            order.quantity,
            order.price,
            leverage,
            margin
        );

        Ok(FuturesOrderOutcome {
            order,
            position,
            margin,
        })
    }

    /// 선물 주문 취소 (pending 전용, 잠긴 증거금 환급)
    pub async fn cancel_futures_order(&self, user_id: Uuid, order_id: Uuid) -> Result<Order> {
        let mut settlement = Settlement::begin(&self.pool).await?;
        let conn = settlement.conn();

        let mut order = store::get_user_order(&mut *conn, order_id, user_id, MarketType::Futures)
            .await?
            .ok_or(LedgerError::NotFound("주문"))?;

        if order.status != OrderStatus::Pending {
            return Err(LedgerError::InvalidState(format!(
                "{} 상태의 주문은 취소할 수 없습니다",
                order.status.as_str()
            )));
        }

        let margin = order.notional() / Decimal::from(order.leverage);
        let mut wallet =
            store::get_or_create_wallet(&mut *conn, user_id, QUOTE_CURRENCY, WalletType::Spot)
                .await?;
        store::post_entry(
            &mut *conn,
            &mut wallet,
            EntryKind::FuturesOrderMarginRefund,
            Direction::Credit,
            margin,
            Decimal::ZERO,
        )
        .await?;

        store::set_order_status(&mut *conn, order.id, OrderStatus::Cancelled).await?;
        order.status = OrderStatus::Cancelled;

        settlement.commit().await?;

        info!("🚫 선물 주문 취소: {} (증거금 환급 {})", order.id, margin);

        Ok(order)
    }

    /// 포지션 단건 조회
    pub async fn get_position(&self, user_id: Uuid, position_id: Uuid) -> Result<Position> {
        let mut conn = self.pool.acquire().await?;
        store::get_position(&mut conn, position_id, user_id)
            .await?
            .ok_or(LedgerError::NotFound("포지션"))
    }

    /// 열린 포지션 목록
    pub async fn list_open_positions(
        &self,
        user_id: Uuid,
        symbol: Option<&str>,
        limit: i64,
    ) -> Result<Vec<Position>> {
        let mut conn = self.pool.acquire().await?;
        store::list_positions(&mut conn, user_id, PositionStatus::Open, symbol, limit, 0).await
    }

    /// 청산된 포지션 PnL 이력 (최신순, 페이지네이션)
    pub async fn pnl_history(
        &self,
        user_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Position>> {
        let mut conn = self.pool.acquire().await?;
        store::list_positions(&mut conn, user_id, PositionStatus::Closed, None, limit, offset)
            .await
    }

    /// 포트폴리오 요약 (USDT 잔고 + 열린 포지션 증거금 + 실현 PnL 합계)
    pub async fn portfolio_summary(&self, user_id: Uuid) -> Result<PortfolioSummary> {
        let mut conn = self.pool.acquire().await?;

        let usdt_balance =
            store::get_wallet(&mut conn, user_id, QUOTE_CURRENCY, WalletType::Spot)
                .await?
                .map(|w| w.balance)
                .unwrap_or(Decimal::ZERO);

        let open =
            store::list_positions(&mut conn, user_id, PositionStatus::Open, None, 1000, 0).await?;
        let closed =
            store::list_positions(&mut conn, user_id, PositionStatus::Closed, None, 1000, 0)
                .await?;

        let total_margin = open.iter().map(|p| p.margin).sum();
        let total_unrealized_pnl = open.iter().map(|p| p.unrealized_pnl).sum();
        let total_realized_pnl = closed.iter().map(|p| p.realized_pnl).sum();

        Ok(PortfolioSummary {
            usdt_balance,
            open_position_count: open.len(),
            total_margin,
            total_unrealized_pnl,
            total_realized_pnl,
        })
    }
}
