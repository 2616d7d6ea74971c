//! 지갑 운영 엔진
//!
//! 입금, 출금 요청(잔고 잠금), 운영자 조정과 잔고/거래 내역 조회.
//! 모든 변경은 정산 스코프 안에서 원장 행과 함께 기록됩니다.

use log::info;
use rust_decimal::Decimal;
use sqlx::sqlite::SqlitePool;
use uuid::Uuid;

use crate::error::{LedgerError, Result};
use crate::ledger::model::{Direction, EntryKind, LedgerEntry, Wallet, WalletType};
use crate::ledger::store::{self, EntryFilter};
use crate::settlement::Settlement;

/// 지갑 운영 엔진
#[derive(Clone)]
pub struct WalletEngine {
    pool: SqlitePool,
}

impl WalletEngine {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn validate_amount(amount: Decimal) -> Result<()> {
        if amount <= Decimal::ZERO {
            return Err(LedgerError::InvalidInput(
                "금액은 0보다 커야 합니다".to_string(),
            ));
        }
        Ok(())
    }

    /// 입금 (외부 입금 확인 후 호출되는 크레딧 경로)
    pub async fn deposit(
        &self,
        user_id: Uuid,
        currency: &str,
        wallet_type: WalletType,
        amount: Decimal,
    ) -> Result<Wallet> {
        Self::validate_amount(amount)?;
        let currency = currency.to_uppercase();

        let mut settlement = Settlement::begin(&self.pool).await?;
        let conn = settlement.conn();

        let mut wallet =
            store::get_or_create_wallet(&mut *conn, user_id, &currency, wallet_type).await?;
        store::post_entry(
            &mut *conn,
            &mut wallet,
            EntryKind::Deposit,
            Direction::Credit,
            amount,
            Decimal::ZERO,
        )
        .await?;

        settlement.commit().await?;

        info!("💰 입금: {} {} {} (잔고 {})", user_id, amount, currency, wallet.balance);

        Ok(wallet)
    }

    /// 출금 요청
    ///
    /// 잔고를 차감하지 않고 locked_balance로 잠급니다. 실제 체인 전송과
    /// 잠금 해제는 외부 출금 처리기의 몫이며 이 코어 밖입니다.
    pub async fn request_withdrawal(
        &self,
        user_id: Uuid,
        currency: &str,
        amount: Decimal,
    ) -> Result<Wallet> {
        Self::validate_amount(amount)?;
        let currency = currency.to_uppercase();

        let mut settlement = Settlement::begin(&self.pool).await?;
        let conn = settlement.conn();

        let mut wallet = store::get_wallet(&mut *conn, user_id, &currency, WalletType::Spot)
            .await?
            .ok_or(LedgerError::NotFound("지갑"))?;

        store::lock_balance(&mut *conn, &mut wallet, amount).await?;
        store::record_entry(
            &mut *conn,
            &wallet,
            EntryKind::Withdrawal,
            Direction::Debit,
            amount,
            Decimal::ZERO,
        )
        .await?;

        settlement.commit().await?;

        info!(
            "🏧 출금 요청: {} {} {} (가용 잔고 {})",
            user_id,
            amount,
            currency,
            wallet.available()
        );

        Ok(wallet)
    }

    /// 운영자 잔고 조정 (수동 보정 경로, 방향 명시)
    pub async fn adjust(
        &self,
        user_id: Uuid,
        currency: &str,
        wallet_type: WalletType,
        direction: Direction,
        amount: Decimal,
    ) -> Result<Wallet> {
        Self::validate_amount(amount)?;
        let currency = currency.to_uppercase();

        let mut settlement = Settlement::begin(&self.pool).await?;
        let conn = settlement.conn();

        let mut wallet =
            store::get_or_create_wallet(&mut *conn, user_id, &currency, wallet_type).await?;
        store::post_entry(
            &mut *conn,
            &mut wallet,
            EntryKind::Adjustment,
            direction,
            amount,
            Decimal::ZERO,
        )
        .await?;

        settlement.commit().await?;

        info!(
            "🔧 잔고 조정: {} {} {} {} (잔고 {})",
            user_id,
            direction.as_str(),
            amount,
            currency,
            wallet.balance
        );

        Ok(wallet)
    }

    /// 사용자 전체 지갑 잔고 요약
    pub async fn balances(&self, user_id: Uuid) -> Result<Vec<Wallet>> {
        let mut conn = self.pool.acquire().await?;
        store::list_wallets(&mut conn, user_id).await
    }

    /// 거래 내역 조회 (종류/통화 필터, 페이지네이션)
    pub async fn history(&self, user_id: Uuid, filter: &EntryFilter) -> Result<Vec<LedgerEntry>> {
        let mut conn = self.pool.acquire().await?;
        store::list_entries(&mut conn, user_id, filter).await
    }
}
