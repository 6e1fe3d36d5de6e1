//! Gift pool reservation protocol.

mod common;

use contest_engine::errors::EngineError;
use contest_engine::ledger;

#[tokio::test]
async fn reserve_consume_release_round() {
    let pool = common::test_pool().await;
    ledger::upsert_entry(&pool, "star_box", 5).await.unwrap();

    assert!(ledger::reserve(&pool, "star_box", 2).await.unwrap());
    assert_eq!(ledger::availability(&pool, "star_box").await.unwrap(), 3);

    ledger::consume(&pool, "star_box", 1).await.unwrap();
    let entry = ledger::entry(&pool, "star_box").await.unwrap().unwrap();
    assert_eq!(entry.reserved, 1);
    assert_eq!(entry.consumed, 1);
    assert_eq!(entry.availability(), 3);

    ledger::release(&pool, "star_box", 1).await.unwrap();
    let entry = ledger::entry(&pool, "star_box").await.unwrap().unwrap();
    assert_eq!(entry.reserved, 0);
    assert_eq!(entry.consumed, 1);
    assert_eq!(entry.availability(), 4);
}

#[tokio::test]
async fn reserve_refuses_shortfall_without_error() {
    let pool = common::test_pool().await;
    ledger::upsert_entry(&pool, "star_box", 2).await.unwrap();

    assert!(ledger::reserve(&pool, "star_box", 2).await.unwrap());
    assert!(!ledger::reserve(&pool, "star_box", 1).await.unwrap());

    let entry = ledger::entry(&pool, "star_box").await.unwrap().unwrap();
    assert_eq!(entry.reserved, 2);
    assert_eq!(entry.consumed, 0);
}

#[tokio::test]
async fn reserve_unknown_gift_is_false() {
    let pool = common::test_pool().await;
    assert!(!ledger::reserve(&pool, "no_such_gift", 1).await.unwrap());
    assert_eq!(
        ledger::availability(&pool, "no_such_gift").await.unwrap(),
        0
    );
}

#[tokio::test]
async fn consume_without_reservation_is_rejected() {
    let pool = common::test_pool().await;
    ledger::upsert_entry(&pool, "star_box", 3).await.unwrap();

    let err = ledger::consume(&pool, "star_box", 1).await.unwrap_err();
    assert!(matches!(err, EngineError::InsufficientReserved(_)));

    // Nothing moved.
    let entry = ledger::entry(&pool, "star_box").await.unwrap().unwrap();
    assert_eq!(entry.reserved, 0);
    assert_eq!(entry.consumed, 0);
}

#[tokio::test]
async fn release_more_than_reserved_is_rejected() {
    let pool = common::test_pool().await;
    ledger::upsert_entry(&pool, "star_box", 3).await.unwrap();
    assert!(ledger::reserve(&pool, "star_box", 1).await.unwrap());

    let err = ledger::release(&pool, "star_box", 2).await.unwrap_err();
    assert!(matches!(err, EngineError::InsufficientReserved(_)));
}

#[tokio::test]
async fn non_positive_quantities_are_rejected() {
    let pool = common::test_pool().await;
    ledger::upsert_entry(&pool, "star_box", 3).await.unwrap();

    for qty in [0, -1] {
        assert!(matches!(
            ledger::reserve(&pool, "star_box", qty).await.unwrap_err(),
            EngineError::InvalidQuantity
        ));
        assert!(matches!(
            ledger::release(&pool, "star_box", qty).await.unwrap_err(),
            EngineError::InvalidQuantity
        ));
        assert!(matches!(
            ledger::consume(&pool, "star_box", qty).await.unwrap_err(),
            EngineError::InvalidQuantity
        ));
    }
    assert!(matches!(
        ledger::upsert_entry(&pool, "star_box", -1).await.unwrap_err(),
        EngineError::InvalidQuantity
    ));
}

#[tokio::test]
async fn cannot_shrink_total_below_committed_units() {
    let pool = common::test_pool().await;
    ledger::upsert_entry(&pool, "star_box", 5).await.unwrap();
    assert!(ledger::reserve(&pool, "star_box", 3).await.unwrap());
    ledger::consume(&pool, "star_box", 2).await.unwrap();

    let err = ledger::upsert_entry(&pool, "star_box", 2).await.unwrap_err();
    assert!(matches!(err, EngineError::InsufficientReserved(_)));

    // Growing is fine.
    ledger::upsert_entry(&pool, "star_box", 10).await.unwrap();
    assert_eq!(ledger::availability(&pool, "star_box").await.unwrap(), 7);
}

#[tokio::test]
async fn concurrent_reservers_cannot_both_take_the_last_unit() {
    let pool = common::test_pool().await;
    ledger::upsert_entry(&pool, "last_unit", 1).await.unwrap();

    let p1 = pool.clone();
    let p2 = pool.clone();
    let a = tokio::spawn(async move { ledger::reserve(&p1, "last_unit", 1).await.unwrap() });
    let b = tokio::spawn(async move { ledger::reserve(&p2, "last_unit", 1).await.unwrap() });

    let (a, b) = (a.await.unwrap(), b.await.unwrap());
    assert!(a ^ b, "exactly one reserver may win, got {a} and {b}");

    let entry = ledger::entry(&pool, "last_unit").await.unwrap().unwrap();
    assert_eq!(entry.reserved, 1);
    assert!(entry.reserved + entry.consumed <= entry.total);
}
