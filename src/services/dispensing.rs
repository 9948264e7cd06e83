use std::sync::Arc;

use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait,
    FromQueryResult, QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::{
    entities::{
        consultation, dispensation,
        prescription::{self, PrescriptionStatus},
        prescription_line::{self, LineStatus},
        product::ProductType,
        stock_lot::{self, LotStatus},
        stock_movement::{self, MovementType},
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::allocation::{plan_dispensation, LotCandidate, LotDebit},
    services::stock_ledger::NewMovement,
};

/// Service delivering prescribed medicament against stock lots.
///
/// Each dispensation debits one or more lots earliest-expiry-first, writes
/// the matching negative ledger movements and dispensation records, and
/// recomputes the line's derived fulfillment status, all in one
/// transaction.
#[derive(Clone)]
pub struct DispensingService {
    db: Arc<DatabaseConnection>,
    event_sender: EventSender,
}

/// Explicit per-lot quantity for caller-accepted partial fulfillment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LotQuantity {
    pub lot_id: Uuid,
    pub quantity: i32,
}

#[derive(Debug, Clone, Serialize)]
pub struct DispensationOutcome {
    pub line_id: Uuid,
    pub movements: Vec<stock_movement::Model>,
    pub dispensations: Vec<dispensation::Model>,
    pub line_status: LineStatus,
}

#[derive(FromQueryResult)]
struct SumRow {
    total: Option<i64>,
}

/// Line context resolved inside the dispensation transaction.
struct LineContext {
    line: prescription_line::Model,
    patient_id: Uuid,
    center_id: Uuid,
}

async fn load_line_context<C: ConnectionTrait>(
    conn: &C,
    line_id: Uuid,
) -> Result<LineContext, ServiceError> {
    let line = prescription_line::Entity::find_by_id(line_id)
        .one(conn)
        .await
        .map_err(ServiceError::db_error)?
        .ok_or_else(|| {
            ServiceError::NotFound(format!("Prescription line {} not found", line_id))
        })?;

    let prescription = prescription::Entity::find_by_id(line.prescription_id)
        .one(conn)
        .await
        .map_err(ServiceError::db_error)?
        .ok_or_else(|| {
            ServiceError::NotFound(format!("Prescription {} not found", line.prescription_id))
        })?;

    if PrescriptionStatus::from_str(&prescription.status) != Some(PrescriptionStatus::Active) {
        return Err(ServiceError::ValidationError(format!(
            "Prescription {} is not active (status '{}')",
            prescription.id, prescription.status
        )));
    }

    let consultation = consultation::Entity::find_by_id(prescription.consultation_id)
        .one(conn)
        .await
        .map_err(ServiceError::db_error)?
        .ok_or_else(|| {
            ServiceError::NotFound(format!(
                "Consultation {} not found",
                prescription.consultation_id
            ))
        })?;

    Ok(LineContext {
        line,
        patient_id: consultation.patient_id,
        center_id: consultation.center_id,
    })
}

/// Total quantity already delivered against a line.
async fn delivered_total<C: ConnectionTrait>(
    conn: &C,
    line_id: Uuid,
) -> Result<i32, ServiceError> {
    let total = dispensation::Entity::find()
        .select_only()
        .column_as(dispensation::Column::Quantity.sum(), "total")
        .filter(dispensation::Column::PrescriptionLineId.eq(line_id))
        .into_model::<SumRow>()
        .one(conn)
        .await
        .map_err(ServiceError::db_error)?
        .and_then(|row| row.total)
        .unwrap_or(0);
    Ok(total as i32)
}

/// Applies one planned debit: guarded lot update, ledger movement,
/// dispensation row. A guard miss means a concurrent writer drained the
/// lot after planning; the whole transaction rolls back.
async fn apply_debit<C: ConnectionTrait>(
    conn: &C,
    ctx: &LineContext,
    debit: &LotDebit,
    actor_id: Uuid,
) -> Result<(stock_movement::Model, dispensation::Model), ServiceError> {
    let now = Utc::now();

    let updated = stock_lot::Entity::update_many()
        .col_expr(
            stock_lot::Column::Quantity,
            Expr::col(stock_lot::Column::Quantity).sub(debit.quantity),
        )
        .col_expr(stock_lot::Column::UpdatedAt, Expr::value(now))
        .filter(stock_lot::Column::Id.eq(debit.lot_id))
        .filter(stock_lot::Column::Quantity.gte(debit.quantity))
        .filter(stock_lot::Column::Status.eq(LotStatus::Normal.as_str()))
        .exec(conn)
        .await
        .map_err(ServiceError::db_error)?;
    if updated.rows_affected == 0 {
        return Err(ServiceError::ConcurrentModification(debit.lot_id));
    }

    let movement = NewMovement {
        product_type: ProductType::Medicament.as_str().to_string(),
        product_id: ctx.line.medicament_id,
        lot_id: debit.lot_id,
        lot_number: debit.lot_number.clone(),
        movement_type: MovementType::Dispensation,
        quantity: -debit.quantity,
        center_id: ctx.center_id,
        professional_id: actor_id,
        source: Some("dispensation".to_string()),
        comment: None,
    }
    .insert(conn)
    .await?;

    let record = dispensation::ActiveModel {
        id: Set(Uuid::new_v4()),
        prescription_line_id: Set(ctx.line.id),
        lot_id: Set(debit.lot_id),
        movement_id: Set(movement.id),
        patient_id: Set(ctx.patient_id),
        professional_id: Set(actor_id),
        center_id: Set(ctx.center_id),
        quantity: Set(debit.quantity),
        dispensed_at: Set(now),
        notes: Set(None),
        created_at: Set(now),
    };
    let record = record.insert(conn).await.map_err(ServiceError::db_error)?;

    Ok((movement, record))
}

/// Recomputes and persists the derived line status.
async fn refresh_line_status<C: ConnectionTrait>(
    conn: &C,
    line: &prescription_line::Model,
) -> Result<LineStatus, ServiceError> {
    let delivered = delivered_total(conn, line.id).await?;
    let status = LineStatus::derive(delivered, line.quantity_prescribed);

    prescription_line::Entity::update_many()
        .col_expr(
            prescription_line::Column::Status,
            Expr::value(status.as_str()),
        )
        .col_expr(prescription_line::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(prescription_line::Column::Id.eq(line.id))
        .exec(conn)
        .await
        .map_err(ServiceError::db_error)?;

    Ok(status)
}

impl DispensingService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: EventSender) -> Self {
        Self { db, event_sender }
    }

    /// Dispenses `quantity` units against a prescription line, selecting
    /// lots earliest-expiry-first at the prescribing center.
    ///
    /// Fails atomically with `InsufficientStock` when the requested
    /// quantity cannot be fully covered; nothing is written in that case.
    #[instrument(skip(self), fields(line_id = %line_id, quantity))]
    pub async fn dispense_prescription_line(
        &self,
        line_id: Uuid,
        quantity: i32,
        actor_id: Uuid,
    ) -> Result<DispensationOutcome, ServiceError> {
        if quantity <= 0 {
            return Err(ServiceError::InvalidQuantity(quantity));
        }

        let outcome = self
            .db
            .transaction::<_, DispensationOutcome, ServiceError>(move |txn| {
                Box::pin(async move {
                    let ctx = load_line_context(txn, line_id).await?;

                    let delivered = delivered_total(txn, line_id).await?;
                    let remaining = ctx.line.quantity_prescribed - delivered;
                    if quantity > remaining {
                        return Err(ServiceError::ValidationError(format!(
                            "Requested {} exceeds remaining prescribed quantity {} on line {}",
                            quantity, remaining, line_id
                        )));
                    }

                    let candidates: Vec<LotCandidate> = stock_lot::Entity::find()
                        .filter(
                            stock_lot::Column::ProductType
                                .eq(ProductType::Medicament.as_str()),
                        )
                        .filter(stock_lot::Column::ProductId.eq(ctx.line.medicament_id))
                        .filter(stock_lot::Column::CenterId.eq(ctx.center_id))
                        .filter(stock_lot::Column::Status.eq(LotStatus::Normal.as_str()))
                        .filter(stock_lot::Column::Quantity.gt(0))
                        .all(txn)
                        .await
                        .map_err(ServiceError::db_error)?
                        .into_iter()
                        .map(|lot| LotCandidate {
                            lot_id: lot.id,
                            lot_number: lot.lot_number,
                            expiry_date: lot.expiry_date,
                            available: lot.quantity,
                        })
                        .collect();

                    let plan = plan_dispensation(candidates, quantity).map_err(|shortfall| {
                        ServiceError::InsufficientStock {
                            requested: shortfall.requested,
                            available: shortfall.available,
                        }
                    })?;

                    let mut movements = Vec::with_capacity(plan.len());
                    let mut dispensations = Vec::with_capacity(plan.len());
                    for debit in &plan {
                        let (movement, record) = apply_debit(txn, &ctx, debit, actor_id).await?;
                        movements.push(movement);
                        dispensations.push(record);
                    }

                    let line_status = refresh_line_status(txn, &ctx.line).await?;

                    Ok(DispensationOutcome {
                        line_id,
                        movements,
                        dispensations,
                        line_status,
                    })
                })
            })
            .await?;

        info!(
            line_id = %outcome.line_id,
            lots = outcome.movements.len(),
            status = outcome.line_status.as_str(),
            "prescription line dispensed"
        );

        self.publish_dispensed(&outcome, quantity).await;

        Ok(outcome)
    }

    /// Dispenses explicit quantities from explicit lots.
    ///
    /// This is the contract for caller-accepted partial fulfillment: the
    /// caller names each lot and quantity, and the operation still fails
    /// atomically if any named lot cannot cover its share.
    #[instrument(skip(self, requests), fields(line_id = %line_id, lots = requests.len()))]
    pub async fn dispense_from_lots(
        &self,
        line_id: Uuid,
        requests: Vec<LotQuantity>,
        actor_id: Uuid,
    ) -> Result<DispensationOutcome, ServiceError> {
        if requests.is_empty() {
            return Err(ServiceError::ValidationError(
                "At least one lot quantity is required".to_string(),
            ));
        }
        if let Some(bad) = requests.iter().find(|r| r.quantity <= 0) {
            return Err(ServiceError::InvalidQuantity(bad.quantity));
        }

        let total: i32 = requests.iter().map(|r| r.quantity).sum();

        let outcome = self
            .db
            .transaction::<_, DispensationOutcome, ServiceError>(move |txn| {
                Box::pin(async move {
                    let ctx = load_line_context(txn, line_id).await?;

                    let delivered = delivered_total(txn, line_id).await?;
                    let remaining = ctx.line.quantity_prescribed - delivered;
                    if total > remaining {
                        return Err(ServiceError::ValidationError(format!(
                            "Requested {} exceeds remaining prescribed quantity {} on line {}",
                            total, remaining, line_id
                        )));
                    }

                    let mut movements = Vec::with_capacity(requests.len());
                    let mut dispensations = Vec::with_capacity(requests.len());

                    for request in &requests {
                        let lot = stock_lot::Entity::find_by_id(request.lot_id)
                            .one(txn)
                            .await
                            .map_err(ServiceError::db_error)?
                            .ok_or_else(|| {
                                ServiceError::NotFound(format!(
                                    "Stock lot {} not found",
                                    request.lot_id
                                ))
                            })?;

                        if lot.product_id != ctx.line.medicament_id
                            || lot.product_type != ProductType::Medicament.as_str()
                        {
                            return Err(ServiceError::InvalidProductReference(format!(
                                "Lot {} does not hold the prescribed medicament",
                                lot.id
                            )));
                        }
                        if lot.center_id != ctx.center_id {
                            return Err(ServiceError::ValidationError(format!(
                                "Lot {} belongs to another center",
                                lot.id
                            )));
                        }
                        if LotStatus::from_str(&lot.status) != Some(LotStatus::Normal) {
                            return Err(ServiceError::ValidationError(format!(
                                "Lot {} is not dispensable (status '{}')",
                                lot.id, lot.status
                            )));
                        }
                        if lot.quantity < request.quantity {
                            return Err(ServiceError::InsufficientStock {
                                requested: request.quantity,
                                available: lot.quantity,
                            });
                        }

                        let debit = LotDebit {
                            lot_id: lot.id,
                            lot_number: lot.lot_number.clone(),
                            quantity: request.quantity,
                        };
                        let (movement, record) = apply_debit(txn, &ctx, &debit, actor_id).await?;
                        movements.push(movement);
                        dispensations.push(record);
                    }

                    let line_status = refresh_line_status(txn, &ctx.line).await?;

                    Ok(DispensationOutcome {
                        line_id,
                        movements,
                        dispensations,
                        line_status,
                    })
                })
            })
            .await?;

        info!(
            line_id = %outcome.line_id,
            lots = outcome.movements.len(),
            status = outcome.line_status.as_str(),
            "prescription line dispensed from explicit lots"
        );

        self.publish_dispensed(&outcome, total).await;

        Ok(outcome)
    }

    /// Fulfillment history of a line, oldest first.
    pub async fn dispensations_for_line(
        &self,
        line_id: Uuid,
    ) -> Result<Vec<dispensation::Model>, ServiceError> {
        dispensation::Entity::find()
            .filter(dispensation::Column::PrescriptionLineId.eq(line_id))
            .order_by_asc(dispensation::Column::DispensedAt)
            .all(self.db.as_ref())
            .await
            .map_err(ServiceError::db_error)
    }

    async fn publish_dispensed(&self, outcome: &DispensationOutcome, quantity: i32) {
        let center_id = outcome
            .dispensations
            .first()
            .map(|d| d.center_id)
            .unwrap_or_else(Uuid::nil);
        if let Err(e) = self
            .event_sender
            .send(Event::StockDispensed {
                prescription_line_id: outcome.line_id,
                center_id,
                quantity,
                lots_touched: outcome.dispensations.iter().map(|d| d.lot_id).collect(),
            })
            .await
        {
            warn!("failed to publish dispensation event: {}", e);
        }
    }
}
