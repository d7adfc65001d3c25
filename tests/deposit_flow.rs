//! 核心资金流的数据库集成测试
//!
//! 覆盖三个不变量：
//! 1. 地址分配幂等（同用户同链永远拿到同一地址）
//! 2. 同一链上交易恰好入账一次
//! 3. 提现请求时扣款、取消/拒绝时等额退款
//!
//! 需要Postgres，默认跳过：cargo test -- --ignored

mod common;

use std::sync::Arc;

use rust_decimal::Decimal;
use uuid::Uuid;

use chipcore::{
    domain::{chain::Blockchain, derivation::HdWallet, error::DepositError},
    repository::{balances, counters, payments, payments::ConfirmPaymentInput},
    service::{
        address_service::AddressService,
        ledger_service::{LedgerService, LEDGER_CURRENCY},
    },
};

const TEST_MNEMONIC: &str =
    "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

#[tokio::test]
#[ignore]
async fn test_counter_increments_atomically() {
    let pool = common::test_pool().await;
    let name = common::unique("test_counter");

    let first = counters::increment(&pool, &name).await.unwrap();
    let second = counters::increment(&pool, &name).await.unwrap();
    assert_eq!(second, first + 1);

    // 回滚只在值仍是最新时生效
    assert!(counters::decrement_if_latest(&pool, &name, second)
        .await
        .unwrap());
    assert!(!counters::decrement_if_latest(&pool, &name, second)
        .await
        .unwrap());
    assert_eq!(counters::current_value(&pool, &name).await.unwrap(), Some(first));
}

#[tokio::test]
#[ignore]
async fn test_address_allocation_is_idempotent() {
    let pool = common::test_pool().await;
    let wallet = Arc::new(HdWallet::from_mnemonic(TEST_MNEMONIC).unwrap());
    let service = AddressService::new(pool.clone(), wallet.clone());

    let user = Uuid::new_v4();
    let first = service
        .get_or_create(user, Blockchain::Solana)
        .await
        .unwrap();
    assert!(first.created);

    let second = service
        .get_or_create(user, Blockchain::Solana)
        .await
        .unwrap();
    assert!(!second.created);
    assert_eq!(first.record.address, second.record.address);
    assert_eq!(first.record.derivation_index, second.record.derivation_index);

    // 地址确实来自记录的派生索引
    let derived = wallet
        .address(Blockchain::Solana, first.record.derivation_index as u32)
        .unwrap();
    assert_eq!(derived, first.record.address);

    // 另一个用户拿到不同的索引和地址
    let other = service
        .get_or_create(Uuid::new_v4(), Blockchain::Solana)
        .await
        .unwrap();
    assert_ne!(other.record.derivation_index, first.record.derivation_index);
    assert_ne!(other.record.address, first.record.address);

    // 链之间互不影响
    let tron = service.get_or_create(user, Blockchain::Tron).await.unwrap();
    assert!(tron.created);
    assert_ne!(tron.record.address, first.record.address);
}

fn confirm_input(user: Uuid, txn_id: &str, fiat: Decimal) -> ConfirmPaymentInput {
    ConfirmPaymentInput {
        txn_id: txn_id.to_string(),
        user_id: user,
        currency: "USDT".to_string(),
        blockchain: "tron".to_string(),
        amount: fiat,
        fiat_amount: fiat,
        address: "TLsV52sRDL79HXGGm9yzwKibb6BeruhUzy".to_string(),
        from_address: "TR7NHqjeKQxGTCi8q8ZY4pL8otSzgjLj6t".to_string(),
        bonus_id: None,
    }
}

#[tokio::test]
#[ignore]
async fn test_deposit_credits_exactly_once() {
    let pool = common::test_pool().await;
    let user = Uuid::new_v4();
    let txn_id = common::unique("txn");
    let amount = Decimal::new(5000, 2); // 50.00

    // 第一次抢占：赢得入账权，加款并提交
    let mut tx = pool.begin().await.unwrap();
    let claimed = payments::claim_confirmation(&mut tx, &confirm_input(user, &txn_id, amount))
        .await
        .unwrap();
    assert!(claimed.is_some());
    balances::credit_in_tx(&mut tx, user, LEDGER_CURRENCY, amount, "deposit")
        .await
        .unwrap();
    tx.commit().await.unwrap();

    // 第二次同txn_id：没有赢得入账权，必须回滚
    let mut tx = pool.begin().await.unwrap();
    let replay = payments::claim_confirmation(&mut tx, &confirm_input(user, &txn_id, amount))
        .await
        .unwrap();
    assert!(replay.is_none());
    tx.rollback().await.unwrap();

    // 余额只加了一次
    let balance = balances::get_by_user_and_currency(&pool, user, LEDGER_CURRENCY)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(balance.balance, amount);

    // 流水处于终态
    let payment = payments::get_by_txn_id(&pool, &txn_id).await.unwrap().unwrap();
    assert_eq!(payment.status, payments::STATUS_CONFIRMED);
}

#[tokio::test]
#[ignore]
async fn test_pending_payment_can_be_claimed() {
    let pool = common::test_pool().await;
    let user = Uuid::new_v4();
    let txn_id = common::unique("txn");
    let amount = Decimal::new(1000, 2);

    // 预置一条未确认流水
    sqlx::query(
        "INSERT INTO payments (txn_id, user_id, currency, blockchain, amount, fiat_amount, status) \
         VALUES ($1, $2, 'USDT', 'tron', $3, $3, $4)",
    )
    .bind(&txn_id)
    .bind(user)
    .bind(amount)
    .bind(payments::STATUS_PENDING)
    .execute(&pool)
    .await
    .unwrap();

    // pending 流水可以被推进到 confirmed
    let mut tx = pool.begin().await.unwrap();
    let claimed = payments::claim_confirmation(&mut tx, &confirm_input(user, &txn_id, amount))
        .await
        .unwrap();
    assert!(claimed.is_some());
    tx.commit().await.unwrap();

    let payment = payments::get_by_txn_id(&pool, &txn_id).await.unwrap().unwrap();
    assert_eq!(payment.status, payments::STATUS_CONFIRMED);
    assert_eq!(payment.status_text, "confirmed");
}

#[tokio::test]
#[ignore]
async fn test_withdrawal_debits_and_refunds() {
    let pool = common::test_pool().await;
    let ledger = LedgerService::new(pool.clone());
    let user = Uuid::new_v4();

    // 先充 100.00
    let mut tx = pool.begin().await.unwrap();
    balances::credit_in_tx(&mut tx, user, LEDGER_CURRENCY, Decimal::new(10000, 2), "seed")
        .await
        .unwrap();
    tx.commit().await.unwrap();

    // 提现 40.00：余额立刻扣减
    let withdrawal = ledger
        .request_withdrawal(user, "tron", "TLsV52sRDL79HXGGm9yzwKibb6BeruhUzy", Decimal::new(4000, 2))
        .await
        .unwrap();
    assert_eq!(withdrawal.status, "requested");
    assert_eq!(ledger.balance(user).await.unwrap().balance, Decimal::new(6000, 2));

    // 取消：等额退回
    let cancelled = ledger.cancel_withdrawal(user, withdrawal.id).await.unwrap();
    assert_eq!(cancelled.status, "cancelled");
    assert_eq!(ledger.balance(user).await.unwrap().balance, Decimal::new(10000, 2));

    // 超出余额的提现直接拒绝，不产生任何扣减
    let err = ledger
        .request_withdrawal(user, "tron", "TLsV52sRDL79HXGGm9yzwKibb6BeruhUzy", Decimal::new(20000, 2))
        .await
        .unwrap_err();
    assert!(matches!(err, DepositError::InsufficientBalance(_)));
    assert_eq!(ledger.balance(user).await.unwrap().balance, Decimal::new(10000, 2));
}

#[tokio::test]
#[ignore]
async fn test_withdrawal_review_lifecycle() {
    let pool = common::test_pool().await;
    let ledger = LedgerService::new(pool.clone());
    let user = Uuid::new_v4();

    let mut tx = pool.begin().await.unwrap();
    balances::credit_in_tx(&mut tx, user, LEDGER_CURRENCY, Decimal::new(5000, 2), "seed")
        .await
        .unwrap();
    tx.commit().await.unwrap();

    let withdrawal = ledger
        .request_withdrawal(user, "solana", "4Nd1mYvM6PjcJbnkaRZmwSTudcVq8tdLzPEcHzbeWdmb", Decimal::new(3000, 2))
        .await
        .unwrap();

    // 批准不动余额
    let approved = ledger.approve_withdrawal(withdrawal.id).await.unwrap();
    assert_eq!(approved.status, "approved");
    assert_eq!(ledger.balance(user).await.unwrap().balance, Decimal::new(2000, 2));

    // 已批准状态不可再取消
    assert!(ledger.cancel_withdrawal(user, withdrawal.id).await.is_err());

    // 已批准仍可拒绝，退款
    let rejected = ledger
        .reject_withdrawal(withdrawal.id, "treasury hot wallet paused")
        .await
        .unwrap();
    assert_eq!(rejected.status, "rejected");
    assert_eq!(ledger.balance(user).await.unwrap().balance, Decimal::new(5000, 2));

    // 已拒绝是终态
    assert!(ledger
        .complete_withdrawal(withdrawal.id, "sig111")
        .await
        .is_err());
}
