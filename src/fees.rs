//! 수수료 및 PnL 계산기
//!
//! 부수 효과 없는 순수 함수만 포함합니다. 모든 연산은 Decimal로 수행하며
//! 부동소수점은 절대 사용하지 않습니다.

use rust_decimal::Decimal;

use crate::ledger::model::PositionSide;

/// 현물 거래 수수료율 (0.1%)
pub fn fee_rate() -> Decimal {
    Decimal::new(1, 3)
}

/// 클라이언트 제시 수수료 허용 오차 (0.01 USDT)
pub fn fee_tolerance() -> Decimal {
    Decimal::new(1, 2)
}

/// 거래 수수료 = 명목 가치 × 0.1%
pub fn trading_fee(notional: Decimal) -> Decimal {
    notional * fee_rate()
}

/// 클라이언트 제시 수수료 검증
///
/// |supplied − expected| > 0.01 이면 거부 (경계값 0.01은 통과, strict `>`)
pub fn validate_fee(expected: Decimal, supplied: Decimal) -> bool {
    (supplied - expected).abs() <= fee_tolerance()
}

/// 단위당 PnL: LONG은 (exit − entry), SHORT는 (entry − exit)
pub fn pnl_per_unit(side: PositionSide, entry: Decimal, exit: Decimal) -> Decimal {
    match side {
        PositionSide::Long => exit - entry,
        PositionSide::Short => entry - exit,
    }
}

/// 실현 PnL = 단위당 PnL × 수량 × 레버리지
pub fn realized_pnl(
    side: PositionSide,
    entry: Decimal,
    exit: Decimal,
    quantity: Decimal,
    leverage: u32,
) -> Decimal {
    pnl_per_unit(side, entry, exit) * quantity * Decimal::from(leverage)
}

/// 포지션 청산 수수료: 오픈 0.1% + 클로즈 0.1%, 증거금 기준 고정 추정치
///
/// qty_close에 비례하지 않는 고정 추정치입니다.
pub fn position_close_fees(margin: Decimal) -> Decimal {
    margin * fee_rate() * Decimal::from(2)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    #[test]
    fn test_trading_fee() {
        // 명목 200 USDT → 수수료 0.2 USDT
        assert_eq!(trading_fee(dec("200")), dec("0.2"));
        assert_eq!(trading_fee(Decimal::ZERO), Decimal::ZERO);
    }

    #[test]
    fn test_validate_fee_boundary() {
        let expected = dec("0.2");
        // 정확히 0.01 차이는 통과 (strict > 검사)
        assert!(validate_fee(expected, dec("0.21")));
        assert!(validate_fee(expected, dec("0.19")));
        // 0.01 초과는 거부
        assert!(!validate_fee(expected, dec("0.210001")));
        assert!(!validate_fee(expected, dec("0.3")));
        // 정확히 일치
        assert!(validate_fee(expected, expected));
    }

    #[test]
    fn test_pnl_per_unit_sides() {
        assert_eq!(pnl_per_unit(PositionSide::Long, dec("100"), dec("110")), dec("10"));
        assert_eq!(pnl_per_unit(PositionSide::Long, dec("100"), dec("90")), dec("-10"));
        assert_eq!(pnl_per_unit(PositionSide::Short, dec("100"), dec("90")), dec("10"));
        assert_eq!(pnl_per_unit(PositionSide::Short, dec("100"), dec("110")), dec("-10"));
    }

    #[test]
    fn test_realized_pnl_with_leverage() {
        // LONG, entry=100, exit=110, qty=1, leverage=10 → 100
        assert_eq!(
            realized_pnl(PositionSide::Long, dec("100"), dec("110"), dec("1"), 10),
            dec("100")
        );
        // SHORT 손실
        assert_eq!(
            realized_pnl(PositionSide::Short, dec("100"), dec("110"), dec("2"), 5),
            dec("-100")
        );
    }

    #[test]
    fn test_position_close_fees() {
        // margin=50 → 2 × 0.1% × 50 = 0.1
        assert_eq!(position_close_fees(dec("50")), dec("0.100"));
    }

    #[test]
    fn test_decimal_precision_18_digits() {
        // 암호화폐 수량 정밀도 (소수 18자리)에서 오차 없는 곱셈
        let qty = dec("0.000000000000000001");
        let price = dec("1000000");
        assert_eq!(qty * price, dec("0.000000000001"));
    }
}
