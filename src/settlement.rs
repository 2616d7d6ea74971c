//! 정산 스코프
//!
//! 주문 생성, 체결, 취소, 포지션 정산처럼 여러 지갑/행을 함께 바꾸는
//! 작업은 전부 이 스코프 안에서 수행됩니다. commit() 없이 스코프가
//! 드랍되면 모든 변경이 롤백되어 중간 상태가 남지 않습니다.

use sqlx::sqlite::SqlitePool;
use sqlx::{Sqlite, SqliteConnection, Transaction};

use crate::error::Result;

/// 정산 단위 트랜잭션
///
/// 명시적으로 commit()을 호출해야만 변경이 반영됩니다.
pub struct Settlement<'a> {
    tx: Transaction<'a, Sqlite>,
}

impl<'a> Settlement<'a> {
    /// 새 정산 스코프 시작
    pub async fn begin(pool: &SqlitePool) -> Result<Settlement<'static>> {
        let tx = pool.begin().await?;
        Ok(Settlement { tx })
    }

    /// 스코프 내부 커넥션 (Ledger Store 함수에 전달)
    pub fn conn(&mut self) -> &mut SqliteConnection {
        &mut self.tx
    }

    /// 정산 확정
    pub async fn commit(self) -> Result<()> {
        self.tx.commit().await?;
        Ok(())
    }

    /// 정산 명시적 철회 (드랍과 동일하지만 의도를 드러냄)
    pub async fn rollback(self) -> Result<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}
