//! 원장 엔진 오류 타입
//!
//! 모든 비즈니스 규칙 위반은 구분 가능한 variant로 반환됩니다.
//! 핸들러에서 catch-and-log 하지 않고 호출자에게 그대로 전달합니다.

use rust_decimal::Decimal;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, LedgerError>;

/// 원장 엔진 오류
#[derive(Debug, Error)]
pub enum LedgerError {
    /// 잘못된 요청 (상태 문제가 아님, 수정 후 재시도 가능)
    #[error("잘못된 입력: {0}")]
    InvalidInput(String),

    /// 잔고 부족 (부분 차감 없음)
    #[error("{currency} 잔고 부족: 필요 {needed}, 보유 {available}")]
    InsufficientFunds {
        currency: String,
        needed: Decimal,
        available: Decimal,
    },

    /// 증거금 부족 (포지션 오픈 거부)
    #[error("증거금 부족: 필요 {needed} USDT, 보유 {available} USDT")]
    InsufficientCollateral { needed: Decimal, available: Decimal },

    /// 클라이언트/서버 수수료 계산 불일치 (허용 오차 초과)
    #[error("수수료 불일치: 서버 계산 {expected}, 클라이언트 제시 {supplied}")]
    FeeMismatch { expected: Decimal, supplied: Decimal },

    /// 현재 주문/포지션 상태에서 허용되지 않는 조작
    #[error("허용되지 않는 상태 전이: {0}")]
    InvalidState(String),

    /// TP/SL이 진입가/청산가 제약을 위반
    #[error("TP/SL 제약 위반: {0}")]
    InvalidTpSl(String),

    /// 체결 수량이 잔여 체결 가능 수량 초과
    #[error("초과 체결: 요청 {requested}, 체결 가능 {fillable}")]
    OverFill { requested: Decimal, fillable: Decimal },

    #[error("{0}을(를) 찾을 수 없습니다")]
    NotFound(&'static str),

    /// 저장소 잠금 경합 (유일하게 자동 재시도 가능한 오류)
    #[error("저장소 잠금 경합, 잠시 후 재시도하세요")]
    Contention,

    /// 저장된 행을 도메인 타입으로 해석 실패
    #[error("손상된 저장 데이터: {0}")]
    Corrupt(String),

    #[error("데이터베이스 오류: {0}")]
    Db(sqlx::Error),
}

impl LedgerError {
    /// 호출자가 백오프 후 자동 재시도해도 되는 오류인지
    pub fn is_retryable(&self) -> bool {
        matches!(self, LedgerError::Contention)
    }
}

impl From<sqlx::Error> for LedgerError {
    fn from(e: sqlx::Error) -> Self {
        // SQLITE_BUSY(5) / SQLITE_LOCKED(6)은 잠금 경합으로 분류
        if let Some(db_err) = e.as_database_error() {
            if let Some(code) = db_err.code() {
                if code == "5" || code == "6" {
                    return LedgerError::Contention;
                }
            }
            if db_err.message().contains("database is locked") {
                return LedgerError::Contention;
            }
        }
        if matches!(e, sqlx::Error::PoolTimedOut) {
            return LedgerError::Contention;
        }
        LedgerError::Db(e)
    }
}
