mod common;

use assert_matches::assert_matches;
use uuid::Uuid;

use clinicore_api::{
    entities::{
        prescription::PrescriptionStatus,
        prescription_line::LineStatus,
        product::ProductRef,
        stock_lot::{self},
        stock_movement::MovementType,
    },
    errors::ServiceError,
    services::{dispensing::LotQuantity, stock_ledger::ReceiveStockInput},
};
use common::{consultation_in_progress, date, prescribe_line, seed_medicament, setup_app};
use sea_orm::EntityTrait;

async fn receive(
    app: &clinicore_api::AppState,
    product: ProductRef,
    center: Uuid,
    quantity: i32,
    lot_number: &str,
    expiry: (i32, u32, u32),
) -> Uuid {
    app.stock_ledger
        .receive_stock(ReceiveStockInput {
            product,
            center_id: center,
            quantity,
            lot_number: lot_number.to_string(),
            expiry_date: Some(date(expiry.0, expiry.1, expiry.2)),
            received_on: None,
            alert_threshold: Some(10),
            actor_id: Uuid::new_v4(),
            source: None,
            comment: None,
        })
        .await
        .expect("reception failed")
        .lot_id
}

#[tokio::test]
async fn dispensation_splits_across_lots_earliest_expiry_first() {
    let app = setup_app().await;
    let med = seed_medicament(&app.db, "PARA500").await;
    let center = Uuid::new_v4();
    let professional = Uuid::new_v4();
    let pharmacist = Uuid::new_v4();

    let consultation = consultation_in_progress(&app, Uuid::new_v4(), center, professional).await;
    let line = prescribe_line(&app, consultation, professional, med.id, 150).await;

    let product = ProductRef::medicament(med.id);
    let l1 = receive(&app, product, center, 100, "L1", (2027, 1, 1)).await;
    let l2 = receive(&app, product, center, 50, "L2", (2027, 6, 1)).await;

    let outcome = app
        .dispensing
        .dispense_prescription_line(line, 120, pharmacist)
        .await
        .expect("dispensation failed");

    // Earliest expiry drained first, remainder from the later lot.
    assert_eq!(outcome.movements.len(), 2);
    assert_eq!(outcome.movements[0].lot_number, "L1");
    assert_eq!(outcome.movements[0].quantity, -100);
    assert_eq!(outcome.movements[1].lot_number, "L2");
    assert_eq!(outcome.movements[1].quantity, -20);
    assert!(outcome
        .movements
        .iter()
        .all(|m| m.movement_type == MovementType::Dispensation.as_str()));

    // 120 of 150 prescribed: partially dispensed.
    assert_eq!(outcome.line_status, LineStatus::PartiallyDispensed);

    let lot1 = stock_lot::Entity::find_by_id(l1)
        .one(app.db.as_ref())
        .await
        .unwrap()
        .unwrap();
    let lot2 = stock_lot::Entity::find_by_id(l2)
        .one(app.db.as_ref())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(lot1.quantity, 0);
    assert_eq!(lot2.quantity, 30);

    // Ledger invariant holds on both lots.
    assert_eq!(app.stock_ledger.compute_lot_balance(l1).await.unwrap(), 0);
    assert_eq!(app.stock_ledger.compute_lot_balance(l2).await.unwrap(), 30);

    // One dispensation row per movement, 1-1 linked.
    assert_eq!(outcome.dispensations.len(), 2);
    for (dispensation, movement) in outcome.dispensations.iter().zip(&outcome.movements) {
        assert_eq!(dispensation.movement_id, movement.id);
        assert_eq!(dispensation.quantity, -movement.quantity);
    }

    // Delivering the remaining 30 completes the line and the prescription.
    let outcome = app
        .dispensing
        .dispense_prescription_line(line, 30, pharmacist)
        .await
        .unwrap();
    assert_eq!(outcome.line_status, LineStatus::Dispensed);

    let line_row = clinicore_api::entities::prescription_line::Entity::find_by_id(line)
        .one(app.db.as_ref())
        .await
        .unwrap()
        .unwrap();
    let completed = app
        .prescriptions
        .complete_if_fulfilled(line_row.prescription_id)
        .await
        .unwrap();
    assert!(completed);
    let detail = app
        .prescriptions
        .get_prescription(line_row.prescription_id)
        .await
        .unwrap();
    assert_eq!(
        detail.prescription.status,
        PrescriptionStatus::Completed.as_str()
    );
}

#[tokio::test]
async fn equal_expiries_drain_the_smallest_lot_number_first() {
    let app = setup_app().await;
    let med = seed_medicament(&app.db, "AMOX250").await;
    let center = Uuid::new_v4();
    let professional = Uuid::new_v4();

    let consultation = consultation_in_progress(&app, Uuid::new_v4(), center, professional).await;
    let line = prescribe_line(&app, consultation, professional, med.id, 60).await;

    let product = ProductRef::medicament(med.id);
    receive(&app, product, center, 40, "B-200", (2027, 3, 1)).await;
    receive(&app, product, center, 40, "A-100", (2027, 3, 1)).await;

    let outcome = app
        .dispensing
        .dispense_prescription_line(line, 50, Uuid::new_v4())
        .await
        .unwrap();

    assert_eq!(outcome.movements[0].lot_number, "A-100");
    assert_eq!(outcome.movements[0].quantity, -40);
    assert_eq!(outcome.movements[1].lot_number, "B-200");
    assert_eq!(outcome.movements[1].quantity, -10);
}

#[tokio::test]
async fn insufficient_stock_fails_atomically() {
    let app = setup_app().await;
    let med = seed_medicament(&app.db, "PARA500").await;
    let center = Uuid::new_v4();
    let professional = Uuid::new_v4();

    let consultation = consultation_in_progress(&app, Uuid::new_v4(), center, professional).await;
    let line = prescribe_line(&app, consultation, professional, med.id, 100).await;

    let product = ProductRef::medicament(med.id);
    let lot = receive(&app, product, center, 30, "L1", (2027, 1, 1)).await;

    let err = app
        .dispensing
        .dispense_prescription_line(line, 80, Uuid::new_v4())
        .await
        .unwrap_err();
    assert_matches!(
        err,
        ServiceError::InsufficientStock {
            requested: 80,
            available: 30
        }
    );

    // Nothing was written: lot untouched, no dispensations, line intact.
    let lot_row = stock_lot::Entity::find_by_id(lot)
        .one(app.db.as_ref())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(lot_row.quantity, 30);
    assert!(app
        .dispensing
        .dispensations_for_line(line)
        .await
        .unwrap()
        .is_empty());
    let line_row = clinicore_api::entities::prescription_line::Entity::find_by_id(line)
        .one(app.db.as_ref())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(line_row.status, LineStatus::Prescribed.as_str());
}

#[tokio::test]
async fn expired_lots_are_not_dispensable() {
    let app = setup_app().await;
    let med = seed_medicament(&app.db, "PARA500").await;
    let center = Uuid::new_v4();
    let professional = Uuid::new_v4();

    let consultation = consultation_in_progress(&app, Uuid::new_v4(), center, professional).await;
    let line = prescribe_line(&app, consultation, professional, med.id, 50).await;

    let product = ProductRef::medicament(med.id);
    receive(&app, product, center, 50, "OLD", (2025, 1, 1)).await;
    app.stock_ledger
        .mark_expired_lots(date(2026, 1, 1))
        .await
        .unwrap();

    let err = app
        .dispensing
        .dispense_prescription_line(line, 10, Uuid::new_v4())
        .await
        .unwrap_err();
    assert_matches!(
        err,
        ServiceError::InsufficientStock {
            requested: 10,
            available: 0
        }
    );
}

#[tokio::test]
async fn explicit_lot_contract_supports_partial_fulfillment() {
    let app = setup_app().await;
    let med = seed_medicament(&app.db, "PARA500").await;
    let center = Uuid::new_v4();
    let professional = Uuid::new_v4();

    let consultation = consultation_in_progress(&app, Uuid::new_v4(), center, professional).await;
    let line = prescribe_line(&app, consultation, professional, med.id, 100).await;

    let product = ProductRef::medicament(med.id);
    let lot = receive(&app, product, center, 30, "L1", (2027, 1, 1)).await;

    // The caller accepts partial fulfillment by naming the lot and the
    // quantity it can actually deliver.
    let outcome = app
        .dispensing
        .dispense_from_lots(
            line,
            vec![LotQuantity {
                lot_id: lot,
                quantity: 30,
            }],
            Uuid::new_v4(),
        )
        .await
        .unwrap();
    assert_eq!(outcome.line_status, LineStatus::PartiallyDispensed);
    assert_eq!(app.stock_ledger.compute_lot_balance(lot).await.unwrap(), 0);

    // Asking a named lot for more than it holds still fails atomically.
    let err = app
        .dispensing
        .dispense_from_lots(
            line,
            vec![LotQuantity {
                lot_id: lot,
                quantity: 10,
            }],
            Uuid::new_v4(),
        )
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InsufficientStock { .. });
}

#[tokio::test]
async fn dispensing_cannot_exceed_the_prescribed_quantity() {
    let app = setup_app().await;
    let med = seed_medicament(&app.db, "PARA500").await;
    let center = Uuid::new_v4();
    let professional = Uuid::new_v4();

    let consultation = consultation_in_progress(&app, Uuid::new_v4(), center, professional).await;
    let line = prescribe_line(&app, consultation, professional, med.id, 20).await;

    let product = ProductRef::medicament(med.id);
    receive(&app, product, center, 100, "L1", (2027, 1, 1)).await;

    let err = app
        .dispensing
        .dispense_prescription_line(line, 25, Uuid::new_v4())
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::ValidationError(_));

    let err = app
        .dispensing
        .dispense_prescription_line(line, 0, Uuid::new_v4())
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InvalidQuantity(0));
}
