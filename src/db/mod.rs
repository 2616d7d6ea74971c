pub mod models;

use std::str::FromStr;

use log::info;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};

use crate::config::LedgerConfig;
use crate::error::Result;

/// SQLite 데이터베이스 초기화 및 연결
///
/// busy_timeout을 설정해 지갑 행 경합 시 무한 대기 대신
/// 한도 초과 후 Contention 오류가 나도록 합니다.
pub async fn init_database(config: &LedgerConfig) -> Result<SqlitePool> {
    info!("🗄️  SQLite 데이터베이스 초기화 중: {}", config.database_url);

    let options = SqliteConnectOptions::from_str(&config.database_url)
        .map_err(crate::error::LedgerError::from)?
        .create_if_missing(true)
        .busy_timeout(config.busy_timeout);

    // 연결 풀 생성
    let pool = SqlitePoolOptions::new()
        .max_connections(config.max_connections)
        .connect_with(options)
        .await?;

    // 테이블 생성
    create_tables(&pool).await?;

    info!("✅ 데이터베이스 초기화 완료");

    Ok(pool)
}

/// 필요한 테이블 생성
///
/// 금액 컬럼은 TEXT로 저장하고 도메인 계층에서 Decimal로 해석합니다
/// (SQLite 숫자 타입은 18자리 소수 정밀도를 보장하지 못함).
async fn create_tables(pool: &SqlitePool) -> Result<()> {
    // 지갑 테이블: (user_id, currency, wallet_type) 당 1행
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS wallets (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            currency TEXT NOT NULL,
            wallet_type TEXT NOT NULL DEFAULT 'spot',
            balance TEXT NOT NULL DEFAULT '0',
            locked_balance TEXT NOT NULL DEFAULT '0',
            created_at DATETIME NOT NULL,
            updated_at DATETIME NOT NULL,
            UNIQUE(user_id, currency, wallet_type)
        )",
    )
    .execute(pool)
    .await?;

    // 원장 기록 테이블 (append-only, 갱신/삭제 금지)
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS ledger_entries (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            wallet_id TEXT NOT NULL,
            kind TEXT NOT NULL,
            direction TEXT NOT NULL,
            currency TEXT NOT NULL,
            amount TEXT NOT NULL,
            fee TEXT NOT NULL DEFAULT '0',
            balance_after TEXT NOT NULL DEFAULT '0',
            created_at DATETIME NOT NULL
        )",
    )
    .execute(pool)
    .await?;

    // 주문 테이블 (market_type으로 현물/선물 구분)
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS orders (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            symbol TEXT NOT NULL,
            side TEXT NOT NULL,
            order_type TEXT NOT NULL,
            market_type TEXT NOT NULL DEFAULT 'spot',
            price TEXT NOT NULL,
            quantity TEXT NOT NULL,
            filled_quantity TEXT NOT NULL DEFAULT '0',
            leverage INTEGER NOT NULL DEFAULT 1,
            status TEXT NOT NULL DEFAULT 'pending',
            created_at DATETIME NOT NULL,
            updated_at DATETIME NOT NULL,
            filled_at DATETIME
        )",
    )
    .execute(pool)
    .await?;

    // 체결 테이블
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS trades (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            order_id TEXT NOT NULL,
            symbol TEXT NOT NULL,
            side TEXT NOT NULL,
            price TEXT NOT NULL,
            quantity TEXT NOT NULL,
            commission TEXT NOT NULL DEFAULT '0',
            created_at DATETIME NOT NULL
        )",
    )
    .execute(pool)
    .await?;

    // 포지션 테이블
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS positions (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            symbol TEXT NOT NULL,
            side TEXT NOT NULL,
            entry_price TEXT NOT NULL,
            quantity TEXT NOT NULL,
            leverage INTEGER NOT NULL DEFAULT 1,
            margin TEXT NOT NULL,
            unrealized_pnl TEXT NOT NULL DEFAULT '0',
            realized_pnl TEXT NOT NULL DEFAULT '0',
            liquidation_price TEXT,
            stop_loss TEXT,
            take_profit TEXT,
            status TEXT NOT NULL DEFAULT 'OPEN',
            opened_at DATETIME NOT NULL,
            closed_at DATETIME,
            updated_at DATETIME NOT NULL
        )",
    )
    .execute(pool)
    .await?;

    // 인덱스 생성
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_wallets_user ON wallets(user_id)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_ledger_entries_user ON ledger_entries(user_id, created_at)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_ledger_entries_wallet ON ledger_entries(wallet_id)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_orders_user_market ON orders(user_id, market_type)",
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_orders_status ON orders(status)")
        .execute(pool)
        .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_trades_user ON trades(user_id)")
        .execute(pool)
        .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_trades_order ON trades(order_id)")
        .execute(pool)
        .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_positions_user_status ON positions(user_id, status)",
    )
    .execute(pool)
    .await?;

    info!("📋 테이블 생성 완료");

    Ok(())
}
