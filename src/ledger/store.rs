//! Ledger Store
//!
//! 지갑/원장/주문/체결/포지션 행에 대한 인덱스 접근자.
//! 잔고를 변경하는 함수는 반드시 정산 스코프(settlement::Settlement)가
//! 소유한 커넥션 위에서만 호출되어야 합니다. 스코프 밖 호출은 잔고와
//! 원장 기록이 어긋날 수 있으므로 금지입니다.

use chrono::Utc;
use rust_decimal::Decimal;
use sqlx::SqliteConnection;
use uuid::Uuid;

use crate::db::models::{
    LedgerEntryRecord, OrderRecord, PositionRecord, TradeRecord, WalletRecord,
};
use crate::error::{LedgerError, Result};
use crate::ledger::model::{
    Direction, EntryKind, LedgerEntry, MarketType, Order, OrderStatus, Position, PositionStatus,
    Trade, Wallet, WalletType,
};

// ============= 지갑 =============

/// 지갑 조회
pub async fn get_wallet(
    conn: &mut SqliteConnection,
    user_id: Uuid,
    currency: &str,
    wallet_type: WalletType,
) -> Result<Option<Wallet>> {
    let record = sqlx::query_as::<_, WalletRecord>(
        "SELECT id, user_id, currency, wallet_type, balance, locked_balance, created_at, updated_at
         FROM wallets
         WHERE user_id = ? AND currency = ? AND wallet_type = ?",
    )
    .bind(user_id.to_string())
    .bind(currency)
    .bind(wallet_type.as_str())
    .fetch_optional(&mut *conn)
    .await?;

    record.map(Wallet::try_from).transpose()
}

/// 지갑 조회, 없으면 잔고 0으로 생성
pub async fn get_or_create_wallet(
    conn: &mut SqliteConnection,
    user_id: Uuid,
    currency: &str,
    wallet_type: WalletType,
) -> Result<Wallet> {
    if let Some(wallet) = get_wallet(&mut *conn, user_id, currency, wallet_type).await? {
        return Ok(wallet);
    }

    let now = Utc::now();
    let wallet = Wallet {
        id: Uuid::new_v4(),
        user_id,
        currency: currency.to_string(),
        wallet_type,
        balance: Decimal::ZERO,
        locked_balance: Decimal::ZERO,
        created_at: now,
        updated_at: now,
    };

    sqlx::query(
        "INSERT INTO wallets (id, user_id, currency, wallet_type, balance, locked_balance, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(wallet.id.to_string())
    .bind(wallet.user_id.to_string())
    .bind(&wallet.currency)
    .bind(wallet.wallet_type.as_str())
    .bind(wallet.balance.to_string())
    .bind(wallet.locked_balance.to_string())
    .bind(wallet.created_at)
    .bind(wallet.updated_at)
    .execute(&mut *conn)
    .await?;

    Ok(wallet)
}

/// 사용자의 모든 지갑 조회 (잔고 요약용)
pub async fn list_wallets(conn: &mut SqliteConnection, user_id: Uuid) -> Result<Vec<Wallet>> {
    let records = sqlx::query_as::<_, WalletRecord>(
        "SELECT id, user_id, currency, wallet_type, balance, locked_balance, created_at, updated_at
         FROM wallets
         WHERE user_id = ?
         ORDER BY currency ASC",
    )
    .bind(user_id.to_string())
    .fetch_all(&mut *conn)
    .await?;

    records.into_iter().map(Wallet::try_from).collect()
}

async fn save_wallet_balances(conn: &mut SqliteConnection, wallet: &mut Wallet) -> Result<()> {
    wallet.updated_at = Utc::now();
    let result = sqlx::query(
        "UPDATE wallets SET balance = ?, locked_balance = ?, updated_at = ? WHERE id = ?",
    )
    .bind(wallet.balance.to_string())
    .bind(wallet.locked_balance.to_string())
    .bind(wallet.updated_at)
    .bind(wallet.id.to_string())
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() != 1 {
        return Err(LedgerError::NotFound("지갑"));
    }
    Ok(())
}

/// 잔고 변경과 원장 기록을 한 호출로 수행
///
/// 모든 잔고 변경에 정확히 1개의 원장 행이 따라붙는 불변식을
/// 이 함수 하나로 강제합니다. amount가 0이면 잔고는 건드리지 않고
/// 감사 행만 남깁니다 (환급액 0 케이스).
pub async fn post_entry(
    conn: &mut SqliteConnection,
    wallet: &mut Wallet,
    kind: EntryKind,
    direction: Direction,
    amount: Decimal,
    fee: Decimal,
) -> Result<LedgerEntry> {
    if amount < Decimal::ZERO {
        return Err(LedgerError::InvalidInput(format!(
            "원장 기록 금액은 음수가 될 수 없습니다: {}",
            amount
        )));
    }

    match direction {
        Direction::Debit => {
            // 선검증 후 차감, 부분 차감은 존재하지 않음.
            // 출금 대기 등으로 잠긴 잔고는 차감 대상이 아니므로
            // 가용 잔고 기준으로 검증해 locked_balance ≤ balance를 유지합니다.
            let available = wallet.available();
            if amount > available {
                return Err(LedgerError::InsufficientFunds {
                    currency: wallet.currency.clone(),
                    needed: amount,
                    available,
                });
            }
            wallet.balance -= amount;
        }
        Direction::Credit => {
            wallet.balance += amount;
        }
    }

    save_wallet_balances(&mut *conn, wallet).await?;
    record_entry(&mut *conn, wallet, kind, direction, amount, fee).await
}

/// 잔고 변경 없이 감사 행만 기록
///
/// 출금 요청처럼 잔고는 잠그기만 하고 아직 차감하지 않는 경우에
/// 사용합니다. balance_after는 현재 잔고 스냅샷입니다.
pub async fn record_entry(
    conn: &mut SqliteConnection,
    wallet: &Wallet,
    kind: EntryKind,
    direction: Direction,
    amount: Decimal,
    fee: Decimal,
) -> Result<LedgerEntry> {
    let entry = LedgerEntry {
        id: Uuid::new_v4(),
        user_id: wallet.user_id,
        wallet_id: wallet.id,
        kind,
        direction,
        currency: wallet.currency.clone(),
        amount,
        fee,
        balance_after: wallet.balance,
        created_at: Utc::now(),
    };

    sqlx::query(
        "INSERT INTO ledger_entries (id, user_id, wallet_id, kind, direction, currency, amount, fee, balance_after, created_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(entry.id.to_string())
    .bind(entry.user_id.to_string())
    .bind(entry.wallet_id.to_string())
    .bind(entry.kind.as_str())
    .bind(entry.direction.as_str())
    .bind(&entry.currency)
    .bind(entry.amount.to_string())
    .bind(entry.fee.to_string())
    .bind(entry.balance_after.to_string())
    .bind(entry.created_at)
    .execute(&mut *conn)
    .await?;

    Ok(entry)
}

/// 출금 대기 등으로 잔고 잠금 (현물 전용)
pub async fn lock_balance(
    conn: &mut SqliteConnection,
    wallet: &mut Wallet,
    amount: Decimal,
) -> Result<()> {
    if amount <= Decimal::ZERO {
        return Err(LedgerError::InvalidInput("잠금 금액은 0보다 커야 합니다".to_string()));
    }
    if amount > wallet.available() {
        return Err(LedgerError::InsufficientFunds {
            currency: wallet.currency.clone(),
            needed: amount,
            available: wallet.available(),
        });
    }
    wallet.locked_balance += amount;
    save_wallet_balances(&mut *conn, wallet).await
}

// ============= 원장 기록 조회 =============

/// 거래 내역 조회 필터
#[derive(Debug, Clone, Default)]
pub struct EntryFilter {
    pub kind: Option<EntryKind>,
    pub currency: Option<String>,
    pub limit: i64,
    pub offset: i64,
}

/// 사용자 원장 기록 조회 (최신순, 페이지네이션)
pub async fn list_entries(
    conn: &mut SqliteConnection,
    user_id: Uuid,
    filter: &EntryFilter,
) -> Result<Vec<LedgerEntry>> {
    let mut sql = String::from(
        "SELECT id, user_id, wallet_id, kind, direction, currency, amount, fee, balance_after, created_at
         FROM ledger_entries
         WHERE user_id = ?",
    );
    if filter.kind.is_some() {
        sql.push_str(" AND kind = ?");
    }
    if filter.currency.is_some() {
        sql.push_str(" AND currency = ?");
    }
    sql.push_str(" ORDER BY created_at DESC LIMIT ? OFFSET ?");

    let mut query = sqlx::query_as::<_, LedgerEntryRecord>(&sql).bind(user_id.to_string());
    if let Some(kind) = filter.kind {
        query = query.bind(kind.as_str());
    }
    if let Some(currency) = &filter.currency {
        query = query.bind(currency.to_uppercase());
    }
    let limit = if filter.limit > 0 { filter.limit } else { 50 };
    query = query.bind(limit).bind(filter.offset.max(0));

    let records = query.fetch_all(&mut *conn).await?;
    records.into_iter().map(LedgerEntry::try_from).collect()
}

// ============= 주문 =============

const ORDER_COLUMNS: &str = "id, user_id, symbol, side, order_type, market_type, price, quantity, \
                             filled_quantity, leverage, status, created_at, updated_at, filled_at";

/// 주문 저장
pub async fn insert_order(conn: &mut SqliteConnection, order: &Order) -> Result<()> {
    sqlx::query(
        "INSERT INTO orders
         (id, user_id, symbol, side, order_type, market_type, price, quantity, filled_quantity, leverage, status, created_at, updated_at, filled_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(order.id.to_string())
    .bind(order.user_id.to_string())
    .bind(&order.symbol)
    .bind(order.side.as_str())
    .bind(order.order_type.as_str())
    .bind(order.market_type.as_str())
    .bind(order.price.to_string())
    .bind(order.quantity.to_string())
    .bind(order.filled_quantity.to_string())
    .bind(order.leverage as i64)
    .bind(order.status.as_str())
    .bind(order.created_at)
    .bind(order.updated_at)
    .bind(order.filled_at)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// 사용자 주문 조회 (시장 구분 포함)
pub async fn get_user_order(
    conn: &mut SqliteConnection,
    order_id: Uuid,
    user_id: Uuid,
    market_type: MarketType,
) -> Result<Option<Order>> {
    let sql = format!(
        "SELECT {} FROM orders WHERE id = ? AND user_id = ? AND market_type = ?",
        ORDER_COLUMNS
    );
    let record = sqlx::query_as::<_, OrderRecord>(&sql)
        .bind(order_id.to_string())
        .bind(user_id.to_string())
        .bind(market_type.as_str())
        .fetch_optional(&mut *conn)
        .await?;

    record.map(Order::try_from).transpose()
}

/// 체결 보고용 주문 조회 (소유자 확인 없음 — 외부 매칭 보고 경로)
pub async fn get_order(
    conn: &mut SqliteConnection,
    order_id: Uuid,
    market_type: MarketType,
) -> Result<Option<Order>> {
    let sql = format!(
        "SELECT {} FROM orders WHERE id = ? AND market_type = ?",
        ORDER_COLUMNS
    );
    let record = sqlx::query_as::<_, OrderRecord>(&sql)
        .bind(order_id.to_string())
        .bind(market_type.as_str())
        .fetch_optional(&mut *conn)
        .await?;

    record.map(Order::try_from).transpose()
}

/// 주문 체결 상태 갱신
pub async fn update_order_fill(conn: &mut SqliteConnection, order: &Order) -> Result<()> {
    let result = sqlx::query(
        "UPDATE orders SET filled_quantity = ?, status = ?, updated_at = ?, filled_at = ? WHERE id = ?",
    )
    .bind(order.filled_quantity.to_string())
    .bind(order.status.as_str())
    .bind(Utc::now())
    .bind(order.filled_at)
    .bind(order.id.to_string())
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() != 1 {
        return Err(LedgerError::NotFound("주문"));
    }
    Ok(())
}

/// 주문 상태만 갱신 (취소 경로)
pub async fn set_order_status(
    conn: &mut SqliteConnection,
    order_id: Uuid,
    status: OrderStatus,
) -> Result<()> {
    let result = sqlx::query("UPDATE orders SET status = ?, updated_at = ? WHERE id = ?")
        .bind(status.as_str())
        .bind(Utc::now())
        .bind(order_id.to_string())
        .execute(&mut *conn)
        .await?;

    if result.rows_affected() != 1 {
        return Err(LedgerError::NotFound("주문"));
    }
    Ok(())
}

/// 사용자 주문 목록 (최신순, 선택 필터)
pub async fn list_orders(
    conn: &mut SqliteConnection,
    user_id: Uuid,
    market_type: MarketType,
    symbol: Option<&str>,
    status: Option<OrderStatus>,
    limit: i64,
) -> Result<Vec<Order>> {
    let mut sql = format!(
        "SELECT {} FROM orders WHERE user_id = ? AND market_type = ?",
        ORDER_COLUMNS
    );
    if symbol.is_some() {
        sql.push_str(" AND symbol = ?");
    }
    if status.is_some() {
        sql.push_str(" AND status = ?");
    }
    sql.push_str(" ORDER BY created_at DESC LIMIT ?");

    let mut query = sqlx::query_as::<_, OrderRecord>(&sql)
        .bind(user_id.to_string())
        .bind(market_type.as_str());
    if let Some(symbol) = symbol {
        query = query.bind(symbol.to_uppercase());
    }
    if let Some(status) = status {
        query = query.bind(status.as_str());
    }
    query = query.bind(if limit > 0 { limit } else { 50 });

    let records = query.fetch_all(&mut *conn).await?;
    records.into_iter().map(Order::try_from).collect()
}

// ============= 체결 =============

/// 체결 저장
pub async fn insert_trade(conn: &mut SqliteConnection, trade: &Trade) -> Result<()> {
    sqlx::query(
        "INSERT INTO trades (id, user_id, order_id, symbol, side, price, quantity, commission, created_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(trade.id.to_string())
    .bind(trade.user_id.to_string())
    .bind(trade.order_id.to_string())
    .bind(&trade.symbol)
    .bind(trade.side.as_str())
    .bind(trade.price.to_string())
    .bind(trade.quantity.to_string())
    .bind(trade.commission.to_string())
    .bind(trade.created_at)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// 주문에 연결된 체결 조회 (실무상 1:1)
pub async fn find_trade_by_order(
    conn: &mut SqliteConnection,
    order_id: Uuid,
) -> Result<Option<Trade>> {
    let record = sqlx::query_as::<_, TradeRecord>(
        "SELECT id, user_id, order_id, symbol, side, price, quantity, commission, created_at
         FROM trades
         WHERE order_id = ?
         LIMIT 1",
    )
    .bind(order_id.to_string())
    .fetch_optional(&mut *conn)
    .await?;

    record.map(Trade::try_from).transpose()
}

/// 기존 체결 행 갱신 (첫 fill이 생성 시점 체결을 덮어씀)
pub async fn update_trade(conn: &mut SqliteConnection, trade: &Trade) -> Result<()> {
    let result = sqlx::query("UPDATE trades SET price = ?, quantity = ?, commission = ? WHERE id = ?")
        .bind(trade.price.to_string())
        .bind(trade.quantity.to_string())
        .bind(trade.commission.to_string())
        .bind(trade.id.to_string())
        .execute(&mut *conn)
        .await?;

    if result.rows_affected() != 1 {
        return Err(LedgerError::NotFound("체결"));
    }
    Ok(())
}

/// 사용자 체결 목록
pub async fn list_trades(
    conn: &mut SqliteConnection,
    user_id: Uuid,
    symbol: Option<&str>,
    limit: i64,
) -> Result<Vec<Trade>> {
    let mut sql = String::from(
        "SELECT id, user_id, order_id, symbol, side, price, quantity, commission, created_at
         FROM trades
         WHERE user_id = ?",
    );
    if symbol.is_some() {
        sql.push_str(" AND symbol = ?");
    }
    sql.push_str(" ORDER BY created_at DESC LIMIT ?");

    let mut query = sqlx::query_as::<_, TradeRecord>(&sql).bind(user_id.to_string());
    if let Some(symbol) = symbol {
        query = query.bind(symbol.to_uppercase());
    }
    query = query.bind(if limit > 0 { limit } else { 50 });

    let records = query.fetch_all(&mut *conn).await?;
    records.into_iter().map(Trade::try_from).collect()
}

// ============= 포지션 =============

const POSITION_COLUMNS: &str = "id, user_id, symbol, side, entry_price, quantity, leverage, margin, \
                                unrealized_pnl, realized_pnl, liquidation_price, stop_loss, \
                                take_profit, status, opened_at, closed_at, updated_at";

/// 포지션 저장
pub async fn insert_position(conn: &mut SqliteConnection, position: &Position) -> Result<()> {
    sqlx::query(
        "INSERT INTO positions
         (id, user_id, symbol, side, entry_price, quantity, leverage, margin, unrealized_pnl, realized_pnl,
          liquidation_price, stop_loss, take_profit, status, opened_at, closed_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(position.id.to_string())
    .bind(position.user_id.to_string())
    .bind(&position.symbol)
    .bind(position.side.as_str())
    .bind(position.entry_price.to_string())
    .bind(position.quantity.to_string())
    .bind(position.leverage as i64)
    .bind(position.margin.to_string())
    .bind(position.unrealized_pnl.to_string())
    .bind(position.realized_pnl.to_string())
    .bind(position.liquidation_price.map(|d| d.to_string()))
    .bind(position.stop_loss.map(|d| d.to_string()))
    .bind(position.take_profit.map(|d| d.to_string()))
    .bind(position.status.as_str())
    .bind(position.opened_at)
    .bind(position.closed_at)
    .bind(position.updated_at)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// 사용자 포지션 조회
pub async fn get_position(
    conn: &mut SqliteConnection,
    position_id: Uuid,
    user_id: Uuid,
) -> Result<Option<Position>> {
    let sql = format!(
        "SELECT {} FROM positions WHERE id = ? AND user_id = ?",
        POSITION_COLUMNS
    );
    let record = sqlx::query_as::<_, PositionRecord>(&sql)
        .bind(position_id.to_string())
        .bind(user_id.to_string())
        .fetch_optional(&mut *conn)
        .await?;

    record.map(Position::try_from).transpose()
}

/// 포지션 갱신 (TP/SL, 수량, PnL, 상태 전부 현재 구조체 기준으로 저장)
pub async fn update_position(conn: &mut SqliteConnection, position: &Position) -> Result<()> {
    let result = sqlx::query(
        "UPDATE positions
         SET quantity = ?, margin = ?, realized_pnl = ?, stop_loss = ?, take_profit = ?,
             status = ?, closed_at = ?, updated_at = ?
         WHERE id = ?",
    )
    .bind(position.quantity.to_string())
    .bind(position.margin.to_string())
    .bind(position.realized_pnl.to_string())
    .bind(position.stop_loss.map(|d| d.to_string()))
    .bind(position.take_profit.map(|d| d.to_string()))
    .bind(position.status.as_str())
    .bind(position.closed_at)
    .bind(Utc::now())
    .bind(position.id.to_string())
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() != 1 {
        return Err(LedgerError::NotFound("포지션"));
    }
    Ok(())
}

/// TP/SL만 조건부 갱신 (OPEN 상태 한정)
///
/// 다른 컬럼은 건드리지 않으므로 읽기와 쓰기 사이에 청산이 끼어들어도
/// 포지션이 OPEN으로 되살아나거나 PnL이 지워지는 일이 없습니다.
/// None인 값은 기존 값을 유지하며, 대상 행이 더 이상 OPEN이 아니면
/// InvalidState를 반환합니다.
pub async fn update_position_tpsl(
    conn: &mut SqliteConnection,
    position_id: Uuid,
    user_id: Uuid,
    take_profit: Option<Decimal>,
    stop_loss: Option<Decimal>,
) -> Result<()> {
    let result = sqlx::query(
        "UPDATE positions
         SET take_profit = COALESCE(?, take_profit),
             stop_loss = COALESCE(?, stop_loss),
             updated_at = ?
         WHERE id = ? AND user_id = ? AND status = 'OPEN'",
    )
    .bind(take_profit.map(|d| d.to_string()))
    .bind(stop_loss.map(|d| d.to_string()))
    .bind(Utc::now())
    .bind(position_id.to_string())
    .bind(user_id.to_string())
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() != 1 {
        return Err(LedgerError::InvalidState(
            "OPEN 상태의 포지션만 TP/SL을 변경할 수 있습니다".to_string(),
        ));
    }
    Ok(())
}

/// 사용자 포지션 목록 (상태 필터, 최신순)
pub async fn list_positions(
    conn: &mut SqliteConnection,
    user_id: Uuid,
    status: PositionStatus,
    symbol: Option<&str>,
    limit: i64,
    offset: i64,
) -> Result<Vec<Position>> {
    let mut sql = format!(
        "SELECT {} FROM positions WHERE user_id = ? AND status = ?",
        POSITION_COLUMNS
    );
    if symbol.is_some() {
        sql.push_str(" AND symbol = ?");
    }
    sql.push_str(" ORDER BY opened_at DESC LIMIT ? OFFSET ?");

    let mut query = sqlx::query_as::<_, PositionRecord>(&sql)
        .bind(user_id.to_string())
        .bind(status.as_str());
    if let Some(symbol) = symbol {
        query = query.bind(symbol.to_uppercase());
    }
    query = query
        .bind(if limit > 0 { limit } else { 50 })
        .bind(offset.max(0));

    let records = query.fetch_all(&mut *conn).await?;
    records.into_iter().map(Position::try_from).collect()
}
