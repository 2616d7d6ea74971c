//! 엔진 설정
//!
//! 전역 싱글턴 없이 명시적으로 생성해 Ledger Store와 엔진에 주입합니다.

use std::time::Duration;

/// 원장 엔진 설정
#[derive(Debug, Clone)]
pub struct LedgerConfig {
    /// SQLite 데이터베이스 URL
    pub database_url: String,
    /// 커넥션 풀 최대 크기
    pub max_connections: u32,
    /// 저장소 잠금 대기 한도 (초과 시 Contention 반환, 데드락 방지)
    pub busy_timeout: Duration,
    /// REST 서버 포트
    pub rest_port: u16,
    /// 주문 생성 시점에 반대 자산을 선지급할지 여부.
    /// false면 MARKET 주문은 생성 시 즉시 정산되고 LIMIT 주문은
    /// fill 시점에만 반대 자산이 지급됩니다 (보존 법칙이 성립하는 모드).
    pub pre_credit_open_orders: bool,
    /// 부분 청산 시 증거금을 비례 환급할지 여부.
    /// false(기본)면 전체 증거금을 환급합니다.
    pub proportional_margin_refund: bool,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite:ledger.db".to_string(),
            max_connections: 5,
            busy_timeout: Duration::from_millis(3000),
            rest_port: 7000,
            pre_credit_open_orders: true,
            proportional_margin_refund: false,
        }
    }
}

impl LedgerConfig {
    /// 환경 변수에서 설정 로드 (없으면 기본값)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            database_url: std::env::var("DATABASE_URL").unwrap_or(defaults.database_url),
            max_connections: std::env::var("DB_MAX_CONNECTIONS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.max_connections),
            busy_timeout: std::env::var("DB_BUSY_TIMEOUT_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.busy_timeout),
            rest_port: std::env::var("REST_PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.rest_port),
            pre_credit_open_orders: std::env::var("PRE_CREDIT_OPEN_ORDERS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.pre_credit_open_orders),
            proportional_margin_refund: std::env::var("PROPORTIONAL_MARGIN_REFUND")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.proportional_margin_refund),
        }
    }
}
