mod common;

use uuid::Uuid;

use clinicore_api::{
    entities::{product::ProductRef, stock_lot},
    errors::ServiceError,
    services::stock_ledger::ReceiveStockInput,
};
use common::{consultation_in_progress, date, prescribe_line, seed_medicament, setup_app};
use sea_orm::EntityTrait;

/// Two dispensations race for one lot holding stock for only one of them:
/// exactly one wins and the lot never oversells.
#[tokio::test]
async fn concurrent_dispensations_never_oversell() {
    let app = setup_app().await;
    let med = seed_medicament(&app.db, "PARA500").await;
    let center = Uuid::new_v4();
    let professional = Uuid::new_v4();

    let consultation = consultation_in_progress(&app, Uuid::new_v4(), center, professional).await;
    let line = prescribe_line(&app, consultation, professional, med.id, 500).await;

    let receipt = app
        .stock_ledger
        .receive_stock(ReceiveStockInput {
            product: ProductRef::medicament(med.id),
            center_id: center,
            quantity: 100,
            lot_number: "L1".to_string(),
            expiry_date: Some(date(2027, 1, 1)),
            received_on: None,
            alert_threshold: Some(10),
            actor_id: Uuid::new_v4(),
            source: None,
            comment: None,
        })
        .await
        .unwrap();

    let mut tasks = Vec::new();
    for _ in 0..2 {
        let dispensing = app.dispensing.clone();
        tasks.push(tokio::spawn(async move {
            dispensing
                .dispense_prescription_line(line, 60, Uuid::new_v4())
                .await
        }));
    }

    let mut successes = 0;
    let mut dispensed_total = 0;
    for task in tasks {
        match task.await.expect("task panicked") {
            Ok(outcome) => {
                successes += 1;
                dispensed_total += outcome
                    .dispensations
                    .iter()
                    .map(|d| d.quantity)
                    .sum::<i32>();
            }
            Err(err) => assert!(
                matches!(err, ServiceError::InsufficientStock { .. }),
                "loser must fail with InsufficientStock, got {:?}",
                err
            ),
        }
    }

    assert_eq!(successes, 1, "combined demand exceeds supply");

    let lot = stock_lot::Entity::find_by_id(receipt.lot_id)
        .one(app.db.as_ref())
        .await
        .unwrap()
        .unwrap();
    assert!(lot.quantity >= 0, "lot quantity must never go negative");
    assert_eq!(lot.quantity, 100 - dispensed_total);
    assert_eq!(
        app.stock_ledger
            .compute_lot_balance(receipt.lot_id)
            .await
            .unwrap(),
        i64::from(lot.quantity)
    );
}

/// Twenty dispensations of 10 against 100 units: exactly ten succeed, the
/// ledger sum matches the cache, nothing goes negative.
#[tokio::test]
async fn dispensation_storm_drains_the_lot_exactly_once() {
    let app = setup_app().await;
    let med = seed_medicament(&app.db, "AMOX250").await;
    let center = Uuid::new_v4();
    let professional = Uuid::new_v4();

    let consultation = consultation_in_progress(&app, Uuid::new_v4(), center, professional).await;
    let line = prescribe_line(&app, consultation, professional, med.id, 1000).await;

    let receipt = app
        .stock_ledger
        .receive_stock(ReceiveStockInput {
            product: ProductRef::medicament(med.id),
            center_id: center,
            quantity: 100,
            lot_number: "L1".to_string(),
            expiry_date: Some(date(2027, 1, 1)),
            received_on: None,
            alert_threshold: Some(10),
            actor_id: Uuid::new_v4(),
            source: None,
            comment: None,
        })
        .await
        .unwrap();

    let mut tasks = Vec::new();
    for _ in 0..20 {
        let dispensing = app.dispensing.clone();
        tasks.push(tokio::spawn(async move {
            dispensing
                .dispense_prescription_line(line, 10, Uuid::new_v4())
                .await
                .is_ok()
        }));
    }

    let mut successes = 0;
    for task in tasks {
        if task.await.expect("task panicked") {
            successes += 1;
        }
    }

    assert_eq!(
        successes, 10,
        "exactly 10 dispensations of 10 fit into 100 units"
    );

    let lot = stock_lot::Entity::find_by_id(receipt.lot_id)
        .one(app.db.as_ref())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(lot.quantity, 0);
    assert_eq!(
        app.stock_ledger
            .compute_lot_balance(receipt.lot_id)
            .await
            .unwrap(),
        0
    );
}
