//! 지갑 원장 및 주문/체결 정산 엔진
//!
//! 현물 주문과 레버리지 포지션의 생애주기 이벤트에 따라 잔고를 변경하는
//! 코어입니다. 모든 변경은 원자적 정산 스코프 안에서 원장 행과 함께
//! 기록되며, 매칭 엔진·가격 피드·인증은 외부 협력자의 몫입니다.

pub mod api;
pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod fees;
pub mod ledger;
pub mod server;
pub mod settlement;
