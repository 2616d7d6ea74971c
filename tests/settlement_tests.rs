//! 정산 엔진 통합 테스트
//!
//! 인메모리 SQLite 위에서 엔진 전체 경로(지갑 + 원장 + 주문/포지션)를
//! 구동합니다. 인메모리 DB는 커넥션마다 분리되므로 풀은 반드시
//! 커넥션 1개로 고정합니다.

use rust_decimal::Decimal;
use sqlx::sqlite::SqlitePool;
use uuid::Uuid;

use xledger::config::LedgerConfig;
use xledger::db::init_database;
use xledger::engine::futures::{FuturesEngine, OpenPositionRequest};
use xledger::engine::spot::{CreateOrderRequest, FillReport, SpotEngine};
use xledger::engine::wallet::WalletEngine;
use xledger::error::LedgerError;
use xledger::ledger::model::{
    OrderStatus, OrderType, PositionSide, PositionStatus, Side, WalletType,
};
use xledger::ledger::store::{self, EntryFilter};

fn dec(s: &str) -> Decimal {
    s.parse().unwrap()
}

fn test_config() -> LedgerConfig {
    LedgerConfig {
        database_url: "sqlite::memory:".to_string(),
        max_connections: 1,
        ..LedgerConfig::default()
    }
}

/// 교정 모드 설정 (선지급 없음, 보존 법칙 성립)
fn corrected_config() -> LedgerConfig {
    LedgerConfig {
        pre_credit_open_orders: false,
        ..test_config()
    }
}

/// 부분 청산 시 증거금을 비례 환급하는 설정
fn proportional_config() -> LedgerConfig {
    LedgerConfig {
        proportional_margin_refund: true,
        ..test_config()
    }
}

async fn setup(config: &LedgerConfig) -> SqlitePool {
    init_database(config).await.unwrap()
}

async fn spot_balance(wallets: &WalletEngine, user: Uuid, currency: &str) -> Decimal {
    wallets
        .balances(user)
        .await
        .unwrap()
        .into_iter()
        .find(|w| w.currency == currency && w.wallet_type == WalletType::Spot)
        .map(|w| w.balance)
        .unwrap_or(Decimal::ZERO)
}

fn buy_limit(user: Uuid, symbol: &str, qty: &str, price: &str) -> CreateOrderRequest {
    CreateOrderRequest {
        user_id: user,
        symbol: symbol.to_string(),
        side: Side::Buy,
        order_type: OrderType::Limit,
        price: dec(price),
        quantity: dec(qty),
        claimed_fee: None,
    }
}

#[tokio::test]
async fn test_cancel_refund_keeps_fee() {
    let config = corrected_config();
    let pool = setup(&config).await;
    let spot = SpotEngine::new(pool.clone(), config.clone());
    let wallets = WalletEngine::new(pool.clone());
    let user = Uuid::new_v4();

    wallets
        .deposit(user, "USDT", WalletType::Spot, dec("500"))
        .await
        .unwrap();

    // BUY 2@100: 명목 200 잠금 + 수수료 0.2 차감
    let outcome = spot
        .create_order(buy_limit(user, "BTCUSDT", "2", "100"))
        .await
        .unwrap();
    assert_eq!(outcome.fee, dec("0.2"));
    assert_eq!(spot_balance(&wallets, user, "USDT").await, dec("299.8"));

    // 취소: 명목만 환급, 수수료는 환급되지 않음
    let cancelled = spot.cancel_order(user, outcome.order.id).await.unwrap();
    assert_eq!(cancelled.refunded, dec("200"));
    assert_eq!(cancelled.order.status, OrderStatus::Cancelled);
    assert_eq!(spot_balance(&wallets, user, "USDT").await, dec("499.8"));
}

#[tokio::test]
async fn test_conservation_under_corrected_mode() {
    let config = corrected_config();
    let pool = setup(&config).await;
    let spot = SpotEngine::new(pool.clone(), config.clone());
    let wallets = WalletEngine::new(pool.clone());
    let user = Uuid::new_v4();

    wallets
        .deposit(user, "USDT", WalletType::Spot, dec("1000"))
        .await
        .unwrap();

    // LIMIT BUY 2@100 생성 후 전량 체결
    let outcome = spot
        .create_order(buy_limit(user, "BTCUSDT", "2", "100"))
        .await
        .unwrap();
    spot.fill_order(FillReport {
        order_id: outcome.order.id,
        price: dec("100"),
        quantity: dec("2"),
        commission: dec("0.2"),
    })
    .await
    .unwrap();

    // 가격 100으로 평가한 총 자산은 수수료 합계만큼만 감소
    let usdt = spot_balance(&wallets, user, "USDT").await;
    let btc = spot_balance(&wallets, user, "BTC").await;
    assert_eq!(btc, dec("2"));
    assert_eq!(usdt + btc * dec("100"), dec("1000") - dec("0.2") - dec("0.2"));
}

#[tokio::test]
async fn test_market_order_fill_is_idempotent() {
    let config = corrected_config();
    let pool = setup(&config).await;
    let spot = SpotEngine::new(pool.clone(), config.clone());
    let wallets = WalletEngine::new(pool.clone());
    let user = Uuid::new_v4();

    wallets
        .deposit(user, "USDT", WalletType::Spot, dec("500"))
        .await
        .unwrap();

    // MARKET BUY 1@100: 생성 시점에 체결 완료
    let outcome = spot
        .create_order(CreateOrderRequest {
            order_type: OrderType::Market,
            ..buy_limit(user, "BTCUSDT", "1", "100")
        })
        .await
        .unwrap();
    assert_eq!(outcome.order.status, OrderStatus::Filled);

    let usdt_before = spot_balance(&wallets, user, "USDT").await;
    let btc_before = spot_balance(&wallets, user, "BTC").await;
    let filter = EntryFilter {
        limit: 1000,
        ..EntryFilter::default()
    };
    let entries_before = wallets.history(user, &filter).await.unwrap().len();

    // 체결 완료 주문에 대한 재보고: 무변경 성공
    let fill = spot
        .fill_order(FillReport {
            order_id: outcome.order.id,
            price: dec("100"),
            quantity: dec("1"),
            commission: dec("0.1"),
        })
        .await
        .unwrap();
    assert!(!fill.settled);
    assert_eq!(fill.trade.id, outcome.trade.id);

    assert_eq!(spot_balance(&wallets, user, "USDT").await, usdt_before);
    assert_eq!(spot_balance(&wallets, user, "BTC").await, btc_before);
    assert_eq!(wallets.history(user, &filter).await.unwrap().len(), entries_before);
}

#[tokio::test]
async fn test_fee_tolerance_boundary() {
    let config = corrected_config();
    let pool = setup(&config).await;
    let spot = SpotEngine::new(pool.clone(), config.clone());
    let wallets = WalletEngine::new(pool.clone());
    let user = Uuid::new_v4();

    wallets
        .deposit(user, "USDT", WalletType::Spot, dec("1000"))
        .await
        .unwrap();

    // 기대 수수료 0.2, 정확히 0.01 차이는 통과
    let ok = spot
        .create_order(CreateOrderRequest {
            claimed_fee: Some(dec("0.21")),
            ..buy_limit(user, "BTCUSDT", "2", "100")
        })
        .await;
    assert!(ok.is_ok());

    // 0.01 초과 차이는 FeeMismatch
    let err = spot
        .create_order(CreateOrderRequest {
            claimed_fee: Some(dec("0.210001")),
            ..buy_limit(user, "BTCUSDT", "2", "100")
        })
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::FeeMismatch { .. }));
}

#[tokio::test]
async fn test_partial_fill_refund() {
    let config = corrected_config();
    let pool = setup(&config).await;
    let spot = SpotEngine::new(pool.clone(), config.clone());
    let wallets = WalletEngine::new(pool.clone());
    let user = Uuid::new_v4();

    wallets
        .deposit(user, "USDT", WalletType::Spot, dec("500"))
        .await
        .unwrap();

    // BUY 10@10: 잠금 100, 수수료 0.1 → 잔고 399.9
    let outcome = spot
        .create_order(buy_limit(user, "BTCUSDT", "10", "10"))
        .await
        .unwrap();
    assert_eq!(spot_balance(&wallets, user, "USDT").await, dec("399.9"));

    // 4@10 체결: 미사용 60 환급, 코인 4 입금, 수수료 0.04
    let fill = spot
        .fill_order(FillReport {
            order_id: outcome.order.id,
            price: dec("10"),
            quantity: dec("4"),
            commission: dec("0.04"),
        })
        .await
        .unwrap();
    assert_eq!(fill.refunded, dec("60"));
    assert_eq!(fill.order.status, OrderStatus::Partial);
    assert_eq!(fill.order.filled_quantity, dec("4"));
    assert_eq!(spot_balance(&wallets, user, "BTC").await, dec("4"));
    assert_eq!(
        spot_balance(&wallets, user, "USDT").await,
        dec("399.9") + dec("60") - dec("0.04")
    );
}

#[tokio::test]
async fn test_overfill_is_rejected() {
    let config = corrected_config();
    let pool = setup(&config).await;
    let spot = SpotEngine::new(pool.clone(), config.clone());
    let wallets = WalletEngine::new(pool.clone());
    let user = Uuid::new_v4();

    wallets
        .deposit(user, "USDT", WalletType::Spot, dec("500"))
        .await
        .unwrap();
    let outcome = spot
        .create_order(buy_limit(user, "BTCUSDT", "10", "10"))
        .await
        .unwrap();

    let err = spot
        .fill_order(FillReport {
            order_id: outcome.order.id,
            price: dec("10"),
            quantity: dec("11"),
            commission: dec("0.11"),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::OverFill { .. }));

    // 거부된 체결은 아무것도 바꾸지 않음
    assert_eq!(spot_balance(&wallets, user, "BTC").await, Decimal::ZERO);
}

#[tokio::test]
async fn test_insufficient_funds_rolls_back_everything() {
    let config = corrected_config();
    let pool = setup(&config).await;
    let spot = SpotEngine::new(pool.clone(), config.clone());
    let wallets = WalletEngine::new(pool.clone());
    let user = Uuid::new_v4();

    wallets
        .deposit(user, "USDT", WalletType::Spot, dec("10"))
        .await
        .unwrap();

    let err = spot
        .create_order(buy_limit(user, "BTCUSDT", "100", "100"))
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::InsufficientFunds { .. }));

    // 잔고/주문/원장 모두 원상태
    assert_eq!(spot_balance(&wallets, user, "USDT").await, dec("10"));
    assert!(spot.list_orders(user, None, None, 10).await.unwrap().is_empty());
    let filter = EntryFilter {
        limit: 100,
        ..EntryFilter::default()
    };
    // 입금 원장 행 1건만 존재
    assert_eq!(wallets.history(user, &filter).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_pre_credit_mode_credits_coin_at_creation() {
    // 선지급 모드 (기본 설정): 체결 전에 코인이 지급됨
    let config = test_config();
    let pool = setup(&config).await;
    let spot = SpotEngine::new(pool.clone(), config.clone());
    let wallets = WalletEngine::new(pool.clone());
    let user = Uuid::new_v4();

    wallets
        .deposit(user, "USDT", WalletType::Spot, dec("500"))
        .await
        .unwrap();
    let outcome = spot
        .create_order(buy_limit(user, "BTCUSDT", "2", "100"))
        .await
        .unwrap();

    assert_eq!(outcome.order.status, OrderStatus::Pending);
    assert_eq!(spot_balance(&wallets, user, "BTC").await, dec("2"));
}

#[tokio::test]
async fn test_no_negative_balance_under_random_ops() {
    let config = corrected_config();
    let pool = setup(&config).await;
    let spot = SpotEngine::new(pool.clone(), config.clone());
    let wallets = WalletEngine::new(pool.clone());
    let user = Uuid::new_v4();

    wallets
        .deposit(user, "USDT", WalletType::Spot, dec("300"))
        .await
        .unwrap();

    use rand::Rng;
    let mut rng = rand::thread_rng();
    let mut open_orders: Vec<Uuid> = Vec::new();

    for _ in 0..40 {
        match rng.gen_range(0..4) {
            0 => {
                // 무작위 주문 생성 (잔고 부족 거부 포함)
                let qty = rng.gen_range(1..20).to_string();
                let side = if rng.gen_bool(0.5) { Side::Buy } else { Side::Sell };
                let result = spot
                    .create_order(CreateOrderRequest {
                        side,
                        ..buy_limit(user, "BTCUSDT", &qty, "10")
                    })
                    .await;
                if let Ok(outcome) = result {
                    open_orders.push(outcome.order.id);
                }
            }
            1 => {
                if let Some(order_id) = open_orders.pop() {
                    let _ = spot.cancel_order(user, order_id).await;
                }
            }
            2 => {
                if let Some(order_id) = open_orders.pop() {
                    let _ = spot
                        .fill_order(FillReport {
                            order_id,
                            price: dec("10"),
                            quantity: Decimal::from(rng.gen_range(1..5)),
                            commission: dec("0.01"),
                        })
                        .await;
                }
            }
            _ => {
                let _ = wallets
                    .deposit(user, "USDT", WalletType::Spot, dec("5"))
                    .await;
            }
        }

        // 불변식: 어떤 조작 후에도 잔고는 음수가 될 수 없음
        for wallet in wallets.balances(user).await.unwrap() {
            assert!(
                wallet.balance >= Decimal::ZERO,
                "{} 잔고가 음수: {}",
                wallet.currency,
                wallet.balance
            );
        }
    }
}

#[tokio::test]
async fn test_position_close_pnl() {
    let config = test_config();
    let pool = setup(&config).await;
    let futures = FuturesEngine::new(pool.clone(), config.clone());
    let wallets = WalletEngine::new(pool.clone());
    let user = Uuid::new_v4();

    wallets
        .deposit(user, "USDT", WalletType::Spot, dec("500"))
        .await
        .unwrap();

    // LONG 1@100 x10, 증거금 50
    let position = futures
        .open_position(OpenPositionRequest {
            user_id: user,
            symbol: "BTCUSDT".to_string(),
            side: PositionSide::Long,
            entry_price: dec("100"),
            quantity: dec("1"),
            leverage: 10,
            collateral: dec("50"),
            liquidation_price: None,
        })
        .await
        .unwrap();
    assert_eq!(spot_balance(&wallets, user, "USDT").await, dec("450"));

    // 110 청산: PnL 100, 수수료 0.1, 입금 149.9
    let outcome = futures
        .close_position(user, position.id, dec("110"), None)
        .await
        .unwrap();
    assert_eq!(outcome.realized_pnl, dec("100"));
    assert_eq!(outcome.fees, dec("0.1"));
    assert_eq!(outcome.credited, dec("149.9"));
    assert_eq!(outcome.position.status, PositionStatus::Closed);
    assert_eq!(spot_balance(&wallets, user, "USDT").await, dec("599.9"));
}

#[tokio::test]
async fn test_position_loss_never_drives_balance_negative() {
    let config = test_config();
    let pool = setup(&config).await;
    let futures = FuturesEngine::new(pool.clone(), config.clone());
    let wallets = WalletEngine::new(pool.clone());
    let user = Uuid::new_v4();

    wallets
        .deposit(user, "USDT", WalletType::Spot, dec("50"))
        .await
        .unwrap();

    let position = futures
        .open_position(OpenPositionRequest {
            user_id: user,
            symbol: "BTCUSDT".to_string(),
            side: PositionSide::Long,
            entry_price: dec("100"),
            quantity: dec("1"),
            leverage: 10,
            collateral: dec("50"),
            liquidation_price: None,
        })
        .await
        .unwrap();

    // 손실(-100)이 증거금(50)을 초과 → 입금액은 0으로 절사
    let outcome = futures
        .close_position(user, position.id, dec("90"), None)
        .await
        .unwrap();
    assert_eq!(outcome.realized_pnl, dec("-100"));
    assert_eq!(outcome.credited, Decimal::ZERO);
    assert_eq!(spot_balance(&wallets, user, "USDT").await, Decimal::ZERO);
}

#[tokio::test]
async fn test_tpsl_validation() {
    let config = test_config();
    let pool = setup(&config).await;
    let futures = FuturesEngine::new(pool.clone(), config.clone());
    let wallets = WalletEngine::new(pool.clone());
    let user = Uuid::new_v4();

    wallets
        .deposit(user, "USDT", WalletType::Spot, dec("100"))
        .await
        .unwrap();
    let position = futures
        .open_position(OpenPositionRequest {
            user_id: user,
            symbol: "BTCUSDT".to_string(),
            side: PositionSide::Long,
            entry_price: dec("100"),
            quantity: dec("1"),
            leverage: 5,
            collateral: dec("20"),
            liquidation_price: Some(dec("80")),
        })
        .await
        .unwrap();

    // 올바른 TP/SL
    let updated = futures
        .update_tpsl(user, position.id, Some(dec("120")), Some(dec("90")))
        .await
        .unwrap();
    assert_eq!(updated.take_profit, Some(dec("120")));
    assert_eq!(updated.stop_loss, Some(dec("90")));

    // LONG의 TP가 진입가 이하 → 거부
    let err = futures
        .update_tpsl(user, position.id, Some(dec("95")), None)
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::InvalidTpSl(_)));

    // SL이 청산가 이하 → 거부
    let err = futures
        .update_tpsl(user, position.id, None, Some(dec("75")))
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::InvalidTpSl(_)));
}

#[tokio::test]
async fn test_futures_order_margin_lock_and_cancel() {
    let config = test_config();
    let pool = setup(&config).await;
    let futures = FuturesEngine::new(pool.clone(), config.clone());
    let wallets = WalletEngine::new(pool.clone());
    let user = Uuid::new_v4();

    wallets
        .deposit(user, "USDT", WalletType::Spot, dec("100"))
        .await
        .unwrap();

    // LIMIT 1@100 x10: 증거금 10 잠금
    let outcome = futures
        .create_futures_order(
            user,
            "BTCUSDT",
            Side::Buy,
            OrderType::Limit,
            dec("100"),
            dec("1"),
            10,
        )
        .await
        .unwrap();
    assert_eq!(outcome.margin, dec("10"));
    assert!(outcome.position.is_none());
    assert_eq!(spot_balance(&wallets, user, "USDT").await, dec("90"));

    // 취소: 증거금 전액 환급
    futures.cancel_futures_order(user, outcome.order.id).await.unwrap();
    assert_eq!(spot_balance(&wallets, user, "USDT").await, dec("100"));
}

#[tokio::test]
async fn test_futures_market_order_opens_position() {
    let config = test_config();
    let pool = setup(&config).await;
    let futures = FuturesEngine::new(pool.clone(), config.clone());
    let wallets = WalletEngine::new(pool.clone());
    let user = Uuid::new_v4();

    wallets
        .deposit(user, "USDT", WalletType::Spot, dec("100"))
        .await
        .unwrap();

    let outcome = futures
        .create_futures_order(
            user,
            "BTCUSDT",
            Side::Sell,
            OrderType::Market,
            dec("100"),
            dec("2"),
            20,
        )
        .await
        .unwrap();
    assert_eq!(outcome.order.status, OrderStatus::Filled);

    let position = outcome.position.unwrap();
    assert_eq!(position.side, PositionSide::Short);
    assert_eq!(position.margin, dec("10"));

    let open = futures.list_open_positions(user, None, 10).await.unwrap();
    assert_eq!(open.len(), 1);
    assert_eq!(open[0].id, position.id);
}

#[tokio::test]
async fn test_withdrawal_locks_balance() {
    let config = test_config();
    let pool = setup(&config).await;
    let wallets = WalletEngine::new(pool.clone());
    let user = Uuid::new_v4();

    wallets
        .deposit(user, "USDT", WalletType::Spot, dec("100"))
        .await
        .unwrap();

    let wallet = wallets.request_withdrawal(user, "USDT", dec("40")).await.unwrap();
    assert_eq!(wallet.balance, dec("100"));
    assert_eq!(wallet.locked_balance, dec("40"));
    assert_eq!(wallet.available(), dec("60"));

    // 가용 잔고(60) 초과 출금 요청은 거부
    let err = wallets
        .request_withdrawal(user, "USDT", dec("70"))
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::InsufficientFunds { .. }));
}

#[tokio::test]
async fn test_order_cannot_spend_locked_balance() {
    let config = corrected_config();
    let pool = setup(&config).await;
    let spot = SpotEngine::new(pool.clone(), config.clone());
    let wallets = WalletEngine::new(pool.clone());
    let user = Uuid::new_v4();

    wallets
        .deposit(user, "USDT", WalletType::Spot, dec("100"))
        .await
        .unwrap();
    wallets.request_withdrawal(user, "USDT", dec("40")).await.unwrap();

    // 가용 잔고는 60: BUY 7@10 (70 + 수수료)은 잠긴 40을 건드리므로 거부
    let err = spot
        .create_order(buy_limit(user, "BTCUSDT", "7", "10"))
        .await
        .unwrap_err();
    match err {
        LedgerError::InsufficientFunds { available, .. } => {
            assert_eq!(available, dec("60"));
        }
        other => panic!("InsufficientFunds가 아님: {other:?}"),
    }

    // 거부된 주문은 잔고와 잠금을 그대로 둠
    let wallet = wallets
        .balances(user)
        .await
        .unwrap()
        .into_iter()
        .find(|w| w.currency == "USDT")
        .unwrap();
    assert_eq!(wallet.balance, dec("100"));
    assert_eq!(wallet.locked_balance, dec("40"));

    // 가용 잔고 내의 주문(50 + 0.05)은 통과하고 잠금은 유지됨
    spot.create_order(buy_limit(user, "BTCUSDT", "5", "10"))
        .await
        .unwrap();
    let wallet = wallets
        .balances(user)
        .await
        .unwrap()
        .into_iter()
        .find(|w| w.currency == "USDT")
        .unwrap();
    assert_eq!(wallet.balance, dec("49.95"));
    assert_eq!(wallet.locked_balance, dec("40"));
    assert!(wallet.balance >= wallet.locked_balance);
}

#[tokio::test]
async fn test_tpsl_update_cannot_resurrect_closed_position() {
    let config = test_config();
    let pool = setup(&config).await;
    let futures = FuturesEngine::new(pool.clone(), config.clone());
    let wallets = WalletEngine::new(pool.clone());
    let user = Uuid::new_v4();

    wallets
        .deposit(user, "USDT", WalletType::Spot, dec("100"))
        .await
        .unwrap();
    let position = futures
        .open_position(OpenPositionRequest {
            user_id: user,
            symbol: "BTCUSDT".to_string(),
            side: PositionSide::Long,
            entry_price: dec("100"),
            quantity: dec("1"),
            leverage: 10,
            collateral: dec("50"),
            liquidation_price: None,
        })
        .await
        .unwrap();

    futures
        .close_position(user, position.id, dec("110"), None)
        .await
        .unwrap();
    let balance_after_close = spot_balance(&wallets, user, "USDT").await;

    // 엔진 경로: 청산 완료 포지션의 TP/SL 변경은 거부
    let err = futures
        .update_tpsl(user, position.id, Some(dec("120")), None)
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::InvalidState(_)));

    // 스토어 경로: 상태 검사 후 끼어든 청산을 흉내 내어 CLOSED 행에
    // 직접 갱신을 시도해도 조건부 UPDATE가 0행으로 거부
    let mut conn = pool.acquire().await.unwrap();
    let err = store::update_position_tpsl(&mut conn, position.id, user, Some(dec("120")), None)
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::InvalidState(_)));
    drop(conn);

    // 포지션은 CLOSED로 남고 재청산은 거부, 입금은 한 번뿐
    let reloaded = futures.get_position(user, position.id).await.unwrap();
    assert_eq!(reloaded.status, PositionStatus::Closed);
    let err = futures
        .close_position(user, position.id, dec("110"), None)
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::InvalidState(_)));
    assert_eq!(spot_balance(&wallets, user, "USDT").await, balance_after_close);
}

#[tokio::test]
async fn test_partial_close_refunds_full_margin_by_default() {
    let config = test_config();
    let pool = setup(&config).await;
    let futures = FuturesEngine::new(pool.clone(), config.clone());
    let wallets = WalletEngine::new(pool.clone());
    let user = Uuid::new_v4();

    wallets
        .deposit(user, "USDT", WalletType::Spot, dec("200"))
        .await
        .unwrap();
    let position = futures
        .open_position(OpenPositionRequest {
            user_id: user,
            symbol: "BTCUSDT".to_string(),
            side: PositionSide::Long,
            entry_price: dec("100"),
            quantity: dec("2"),
            leverage: 10,
            collateral: dec("100"),
            liquidation_price: None,
        })
        .await
        .unwrap();
    assert_eq!(spot_balance(&wallets, user, "USDT").await, dec("100"));

    // 1/2 청산 @110: PnL 100, 수수료 0.2, 기본 모드는 증거금 전액 환급
    let outcome = futures
        .close_position(user, position.id, dec("110"), Some(dec("1")))
        .await
        .unwrap();
    assert_eq!(outcome.realized_pnl, dec("100"));
    assert_eq!(outcome.fees, dec("0.2"));
    assert_eq!(outcome.credited, dec("199.8"));
    assert_eq!(spot_balance(&wallets, user, "USDT").await, dec("299.8"));

    // 포지션은 OPEN 유지, 잔여 수량 1, 증거금 필드는 그대로
    assert_eq!(outcome.position.status, PositionStatus::Open);
    assert_eq!(outcome.position.quantity, dec("1"));
    assert_eq!(outcome.position.margin, dec("100"));
    assert_eq!(outcome.position.realized_pnl, dec("100"));
}

#[tokio::test]
async fn test_partial_close_proportional_margin_refund() {
    let config = proportional_config();
    let pool = setup(&config).await;
    let futures = FuturesEngine::new(pool.clone(), config.clone());
    let wallets = WalletEngine::new(pool.clone());
    let user = Uuid::new_v4();

    wallets
        .deposit(user, "USDT", WalletType::Spot, dec("200"))
        .await
        .unwrap();
    let position = futures
        .open_position(OpenPositionRequest {
            user_id: user,
            symbol: "BTCUSDT".to_string(),
            side: PositionSide::Long,
            entry_price: dec("100"),
            quantity: dec("2"),
            leverage: 10,
            collateral: dec("100"),
            liquidation_price: None,
        })
        .await
        .unwrap();

    // 1/2 청산 @110: 증거금은 청산 비율만큼(50)만 환급
    let outcome = futures
        .close_position(user, position.id, dec("110"), Some(dec("1")))
        .await
        .unwrap();
    assert_eq!(outcome.realized_pnl, dec("100"));
    assert_eq!(outcome.fees, dec("0.2"));
    assert_eq!(outcome.credited, dec("149.8"));
    assert_eq!(spot_balance(&wallets, user, "USDT").await, dec("249.8"));

    // 잔여 포지션에는 증거금 50이 남고 OPEN 유지
    assert_eq!(outcome.position.status, PositionStatus::Open);
    assert_eq!(outcome.position.quantity, dec("1"));
    assert_eq!(outcome.position.margin, dec("50"));
    assert_eq!(outcome.position.realized_pnl, dec("100"));
}

#[tokio::test]
async fn test_history_filters() {
    let config = corrected_config();
    let pool = setup(&config).await;
    let spot = SpotEngine::new(pool.clone(), config.clone());
    let wallets = WalletEngine::new(pool.clone());
    let user = Uuid::new_v4();

    wallets
        .deposit(user, "USDT", WalletType::Spot, dec("500"))
        .await
        .unwrap();
    spot.create_order(buy_limit(user, "BTCUSDT", "2", "100"))
        .await
        .unwrap();

    // trading_fee 종류만 필터
    let filter = EntryFilter {
        kind: Some(xledger::ledger::model::EntryKind::TradingFee),
        limit: 100,
        ..EntryFilter::default()
    };
    let entries = wallets.history(user, &filter).await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].amount, dec("0.2"));

    // USDT 통화 필터: 입금 + 잠금 + 수수료
    let filter = EntryFilter {
        currency: Some("USDT".to_string()),
        limit: 100,
        ..EntryFilter::default()
    };
    assert_eq!(wallets.history(user, &filter).await.unwrap().len(), 3);
}
