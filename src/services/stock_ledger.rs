use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, FromQueryResult,
    QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

use crate::{
    entities::{
        medical_device, medicament,
        product::{ProductRef, ProductType},
        stock_lot::{self, LotStatus},
        stock_movement::{self, MovementType},
    },
    errors::ServiceError,
    events::{Event, EventSender},
};

const DEFAULT_ALERT_THRESHOLD: i32 = 10;

/// Service owning all quantity changes on stock lots.
///
/// Every mutation pairs the cached lot quantity update with a movement
/// insert inside one transaction, keeping the ledger-sum invariant
/// enforceable without database triggers.
#[derive(Clone)]
pub struct StockLedgerService {
    db: Arc<DatabaseConnection>,
    event_sender: EventSender,
}

/// Input for a stock reception.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ReceiveStockInput {
    pub product: ProductRef,
    pub center_id: Uuid,
    pub quantity: i32,
    #[validate(length(min = 1, max = 64))]
    pub lot_number: String,
    pub expiry_date: Option<NaiveDate>,
    pub received_on: Option<NaiveDate>,
    pub alert_threshold: Option<i32>,
    pub actor_id: Uuid,
    pub source: Option<String>,
    pub comment: Option<String>,
}

/// Result of a reception: the lot touched and the ledger entry created.
#[derive(Debug, Clone, Serialize)]
pub struct StockReceipt {
    pub lot_id: Uuid,
    pub movement_id: Uuid,
    pub new_quantity: i32,
}

#[derive(Debug, Clone, Serialize)]
pub struct StockAdjustment {
    pub lot_id: Uuid,
    pub movement_id: Uuid,
    pub new_quantity: i32,
}

#[derive(Debug, Clone, Serialize)]
pub struct LotWriteOff {
    pub lot_id: Uuid,
    pub movement_id: Uuid,
    pub quantity_written_off: i32,
}

#[derive(Debug, Clone, Serialize)]
pub struct LotReconciliation {
    pub lot_id: Uuid,
    /// None when the count already matched the cached quantity.
    pub movement_id: Option<Uuid>,
    pub delta: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StockClassification {
    OutOfStock,
    Low,
    Normal,
}

impl StockClassification {
    pub fn as_str(&self) -> &'static str {
        match self {
            StockClassification::OutOfStock => "OUT_OF_STOCK",
            StockClassification::Low => "LOW",
            StockClassification::Normal => "NORMAL",
        }
    }

    /// Classifies a ledger total against the summed per-lot thresholds.
    pub fn classify(quantity: i64, threshold_sum: i64) -> Self {
        if quantity <= 0 {
            StockClassification::OutOfStock
        } else if quantity <= threshold_sum {
            StockClassification::Low
        } else {
            StockClassification::Normal
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StockLevel {
    pub quantity: i64,
    pub threshold_sum: i64,
    pub classification: StockClassification,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExpiringLot {
    pub lot: stock_lot::Model,
    pub days_remaining: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct StockLevelReport {
    pub product_type: String,
    pub product_id: Uuid,
    pub total_quantity: i64,
    pub threshold_sum: i64,
}

#[derive(FromQueryResult)]
struct SumRow {
    total: Option<i64>,
}

/// Draft of a ledger entry, inserted inside the caller's transaction.
pub(crate) struct NewMovement {
    pub product_type: String,
    pub product_id: Uuid,
    pub lot_id: Uuid,
    pub lot_number: String,
    pub movement_type: MovementType,
    pub quantity: i32,
    pub center_id: Uuid,
    pub professional_id: Uuid,
    pub source: Option<String>,
    pub comment: Option<String>,
}

impl NewMovement {
    pub(crate) async fn insert<C: ConnectionTrait>(
        self,
        conn: &C,
    ) -> Result<stock_movement::Model, ServiceError> {
        let now = Utc::now();
        let movement = stock_movement::ActiveModel {
            id: Set(Uuid::new_v4()),
            product_type: Set(self.product_type),
            product_id: Set(self.product_id),
            lot_id: Set(self.lot_id),
            lot_number: Set(self.lot_number),
            movement_type: Set(self.movement_type.as_str().to_string()),
            quantity: Set(self.quantity),
            center_id: Set(self.center_id),
            professional_id: Set(self.professional_id),
            occurred_at: Set(now),
            source: Set(self.source),
            comment: Set(self.comment),
            created_at: Set(now),
        };
        movement.insert(conn).await.map_err(ServiceError::db_error)
    }
}

/// Verifies that the product id resolves in the table its type points to.
pub(crate) async fn resolve_product<C: ConnectionTrait>(
    conn: &C,
    product: ProductRef,
) -> Result<(), ServiceError> {
    let found = match product.product_type {
        ProductType::Medicament => medicament::Entity::find_by_id(product.product_id)
            .one(conn)
            .await
            .map_err(ServiceError::db_error)?
            .is_some(),
        ProductType::Device => medical_device::Entity::find_by_id(product.product_id)
            .one(conn)
            .await
            .map_err(ServiceError::db_error)?
            .is_some(),
    };

    if found {
        Ok(())
    } else {
        Err(ServiceError::InvalidProductReference(format!(
            "{} {} does not exist",
            product.product_type.as_str(),
            product.product_id
        )))
    }
}

impl StockLedgerService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: EventSender) -> Self {
        Self { db, event_sender }
    }

    /// Receives a quantity of a product into a lot at a center.
    ///
    /// Finds or creates the (product, center, lot_number) lot, then inserts
    /// a positive RECEPTION movement in the same transaction.
    #[instrument(skip(self, input), fields(lot_number = %input.lot_number, quantity = input.quantity))]
    pub async fn receive_stock(
        &self,
        input: ReceiveStockInput,
    ) -> Result<StockReceipt, ServiceError> {
        input.validate()?;
        if input.quantity <= 0 {
            return Err(ServiceError::InvalidQuantity(input.quantity));
        }
        resolve_product(self.db.as_ref(), input.product).await?;

        let product_id = input.product.product_id;
        let center_id = input.center_id;
        let quantity = input.quantity;

        let receipt = self
            .db
            .transaction::<_, StockReceipt, ServiceError>(move |txn| {
                Box::pin(async move {
                    let now = Utc::now();
                    let existing = stock_lot::Entity::find()
                        .filter(
                            stock_lot::Column::ProductType
                                .eq(input.product.product_type.as_str()),
                        )
                        .filter(stock_lot::Column::ProductId.eq(input.product.product_id))
                        .filter(stock_lot::Column::CenterId.eq(input.center_id))
                        .filter(stock_lot::Column::LotNumber.eq(input.lot_number.clone()))
                        .one(txn)
                        .await
                        .map_err(ServiceError::db_error)?;

                    let (lot_id, new_quantity) = match existing {
                        Some(lot) => {
                            let updated = stock_lot::Entity::update_many()
                                .col_expr(
                                    stock_lot::Column::Quantity,
                                    Expr::col(stock_lot::Column::Quantity).add(input.quantity),
                                )
                                .col_expr(stock_lot::Column::UpdatedAt, Expr::value(now))
                                .filter(stock_lot::Column::Id.eq(lot.id))
                                .exec(txn)
                                .await
                                .map_err(ServiceError::db_error)?;
                            if updated.rows_affected == 0 {
                                return Err(ServiceError::ConcurrentModification(lot.id));
                            }
                            (lot.id, lot.quantity + input.quantity)
                        }
                        None => {
                            let lot = stock_lot::ActiveModel {
                                id: Set(Uuid::new_v4()),
                                product_type: Set(input.product.product_type.as_str().to_string()),
                                product_id: Set(input.product.product_id),
                                center_id: Set(input.center_id),
                                quantity: Set(input.quantity),
                                lot_number: Set(input.lot_number.clone()),
                                received_on: Set(input
                                    .received_on
                                    .unwrap_or_else(|| now.date_naive())),
                                expiry_date: Set(input.expiry_date),
                                alert_threshold: Set(input
                                    .alert_threshold
                                    .unwrap_or(DEFAULT_ALERT_THRESHOLD)),
                                status: Set(LotStatus::Normal.as_str().to_string()),
                                created_at: Set(now),
                                updated_at: Set(now),
                            };
                            let inserted =
                                lot.insert(txn).await.map_err(ServiceError::db_error)?;
                            (inserted.id, inserted.quantity)
                        }
                    };

                    let movement = NewMovement {
                        product_type: input.product.product_type.as_str().to_string(),
                        product_id: input.product.product_id,
                        lot_id,
                        lot_number: input.lot_number.clone(),
                        movement_type: MovementType::Reception,
                        quantity: input.quantity,
                        center_id: input.center_id,
                        professional_id: input.actor_id,
                        source: input.source.clone(),
                        comment: input.comment.clone(),
                    }
                    .insert(txn)
                    .await?;

                    Ok(StockReceipt {
                        lot_id,
                        movement_id: movement.id,
                        new_quantity,
                    })
                })
            })
            .await?;

        info!(
            lot_id = %receipt.lot_id,
            quantity = receipt.new_quantity,
            "stock received"
        );

        if let Err(e) = self
            .event_sender
            .send(Event::StockReceived {
                lot_id: receipt.lot_id,
                movement_id: receipt.movement_id,
                product_id,
                center_id,
                quantity,
            })
            .await
        {
            warn!("failed to publish stock reception event: {}", e);
        }

        Ok(receipt)
    }

    /// Manual stock correction. Positive deltas record CORRECTION_IN,
    /// negative deltas CORRECTION_OUT; the cached quantity is never allowed
    /// to go negative.
    #[instrument(skip(self), fields(lot_id = %lot_id, delta))]
    pub async fn adjust_stock(
        &self,
        lot_id: Uuid,
        delta: i32,
        reason: Option<String>,
        actor_id: Uuid,
    ) -> Result<StockAdjustment, ServiceError> {
        if delta == 0 {
            return Err(ServiceError::InvalidQuantity(0));
        }

        let adjustment = self
            .db
            .transaction::<_, StockAdjustment, ServiceError>(move |txn| {
                Box::pin(async move {
                    let lot = stock_lot::Entity::find_by_id(lot_id)
                        .one(txn)
                        .await
                        .map_err(ServiceError::db_error)?
                        .ok_or_else(|| {
                            ServiceError::NotFound(format!("Stock lot {} not found", lot_id))
                        })?;

                    if lot.quantity + delta < 0 {
                        return Err(ServiceError::InvalidAdjustment { lot_id });
                    }

                    let now = Utc::now();
                    let mut update = stock_lot::Entity::update_many()
                        .col_expr(
                            stock_lot::Column::Quantity,
                            Expr::col(stock_lot::Column::Quantity).add(delta),
                        )
                        .col_expr(stock_lot::Column::UpdatedAt, Expr::value(now))
                        .filter(stock_lot::Column::Id.eq(lot_id));
                    if delta < 0 {
                        // Guard against a concurrent debit racing this one.
                        update = update.filter(stock_lot::Column::Quantity.gte(-delta));
                    }
                    let updated = update.exec(txn).await.map_err(ServiceError::db_error)?;
                    if updated.rows_affected == 0 {
                        return Err(ServiceError::ConcurrentModification(lot_id));
                    }

                    let movement_type = if delta > 0 {
                        MovementType::CorrectionIn
                    } else {
                        MovementType::CorrectionOut
                    };

                    let movement = NewMovement {
                        product_type: lot.product_type.clone(),
                        product_id: lot.product_id,
                        lot_id,
                        lot_number: lot.lot_number.clone(),
                        movement_type,
                        quantity: delta,
                        center_id: lot.center_id,
                        professional_id: actor_id,
                        source: Some("manual_adjustment".to_string()),
                        comment: reason,
                    }
                    .insert(txn)
                    .await?;

                    Ok(StockAdjustment {
                        lot_id,
                        movement_id: movement.id,
                        new_quantity: lot.quantity + delta,
                    })
                })
            })
            .await?;

        if let Err(e) = self
            .event_sender
            .send(Event::StockAdjusted {
                lot_id: adjustment.lot_id,
                movement_id: adjustment.movement_id,
                delta,
            })
            .await
        {
            warn!("failed to publish stock adjustment event: {}", e);
        }

        Ok(adjustment)
    }

    /// Cycle-count reconciliation: records one ADJUSTMENT movement for the
    /// difference between a physical count and the cached quantity. A
    /// matching count is a no-op success.
    #[instrument(skip(self), fields(lot_id = %lot_id, counted_quantity))]
    pub async fn reconcile_lot(
        &self,
        lot_id: Uuid,
        counted_quantity: i32,
        actor_id: Uuid,
    ) -> Result<LotReconciliation, ServiceError> {
        if counted_quantity < 0 {
            return Err(ServiceError::InvalidQuantity(counted_quantity));
        }

        self.db
            .transaction::<_, LotReconciliation, ServiceError>(move |txn| {
                Box::pin(async move {
                    let lot = stock_lot::Entity::find_by_id(lot_id)
                        .one(txn)
                        .await
                        .map_err(ServiceError::db_error)?
                        .ok_or_else(|| {
                            ServiceError::NotFound(format!("Stock lot {} not found", lot_id))
                        })?;

                    let delta = counted_quantity - lot.quantity;
                    if delta == 0 {
                        return Ok(LotReconciliation {
                            lot_id,
                            movement_id: None,
                            delta: 0,
                        });
                    }

                    let now = Utc::now();
                    let updated = stock_lot::Entity::update_many()
                        .col_expr(stock_lot::Column::Quantity, Expr::value(counted_quantity))
                        .col_expr(stock_lot::Column::UpdatedAt, Expr::value(now))
                        .filter(stock_lot::Column::Id.eq(lot_id))
                        .filter(stock_lot::Column::Quantity.eq(lot.quantity))
                        .exec(txn)
                        .await
                        .map_err(ServiceError::db_error)?;
                    if updated.rows_affected == 0 {
                        return Err(ServiceError::ConcurrentModification(lot_id));
                    }

                    let movement = NewMovement {
                        product_type: lot.product_type.clone(),
                        product_id: lot.product_id,
                        lot_id,
                        lot_number: lot.lot_number.clone(),
                        movement_type: MovementType::Adjustment,
                        quantity: delta,
                        center_id: lot.center_id,
                        professional_id: actor_id,
                        source: Some("cycle_count".to_string()),
                        comment: None,
                    }
                    .insert(txn)
                    .await?;

                    info!(lot_id = %lot_id, delta, "lot reconciled against physical count");

                    Ok(LotReconciliation {
                        lot_id,
                        movement_id: Some(movement.id),
                        delta,
                    })
                })
            })
            .await
            .map_err(ServiceError::from)
    }

    /// Deletes a lot record.
    ///
    /// The remaining quantity is first compensated by an ADJUSTMENT
    /// movement in the same transaction, so the ledger still sums to zero
    /// for the deleted lot.
    #[instrument(skip(self), fields(lot_id = %lot_id))]
    pub async fn delete_lot(
        &self,
        lot_id: Uuid,
        actor_id: Uuid,
    ) -> Result<Option<Uuid>, ServiceError> {
        let compensating = self
            .db
            .transaction::<_, Option<Uuid>, ServiceError>(move |txn| {
                Box::pin(async move {
                    let lot = stock_lot::Entity::find_by_id(lot_id)
                        .one(txn)
                        .await
                        .map_err(ServiceError::db_error)?
                        .ok_or_else(|| {
                            ServiceError::NotFound(format!("Stock lot {} not found", lot_id))
                        })?;

                    let movement_id = if lot.quantity != 0 {
                        let movement = NewMovement {
                            product_type: lot.product_type.clone(),
                            product_id: lot.product_id,
                            lot_id,
                            lot_number: lot.lot_number.clone(),
                            movement_type: MovementType::Adjustment,
                            quantity: -lot.quantity,
                            center_id: lot.center_id,
                            professional_id: actor_id,
                            source: Some("lot_deleted".to_string()),
                            comment: None,
                        }
                        .insert(txn)
                        .await?;
                        Some(movement.id)
                    } else {
                        None
                    };

                    stock_lot::Entity::delete_by_id(lot_id)
                        .exec(txn)
                        .await
                        .map_err(ServiceError::db_error)?;

                    Ok(movement_id)
                })
            })
            .await?;

        info!(lot_id = %lot_id, "lot deleted");

        if let Err(e) = self
            .event_sender
            .send(Event::LotDeleted {
                lot_id,
                compensating_movement_id: compensating,
            })
            .await
        {
            warn!("failed to publish lot deletion event: {}", e);
        }

        Ok(compensating)
    }

    /// Flags lots whose expiry date has passed.
    ///
    /// Quantities are left untouched: expired stock stays visible for
    /// audit until an explicit write-off.
    #[instrument(skip(self))]
    pub async fn mark_expired_lots(&self, as_of: NaiveDate) -> Result<u64, ServiceError> {
        let updated = stock_lot::Entity::update_many()
            .col_expr(
                stock_lot::Column::Status,
                Expr::value(LotStatus::Expired.as_str()),
            )
            .col_expr(stock_lot::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(stock_lot::Column::ExpiryDate.lt(as_of))
            .filter(stock_lot::Column::Status.ne(LotStatus::Expired.as_str()))
            .exec(self.db.as_ref())
            .await
            .map_err(ServiceError::db_error)?;

        if updated.rows_affected > 0 {
            info!(count = updated.rows_affected, %as_of, "lots marked expired");
            if let Err(e) = self
                .event_sender
                .send(Event::LotsMarkedExpired {
                    as_of,
                    count: updated.rows_affected,
                })
                .await
            {
                warn!("failed to publish expiry event: {}", e);
            }
        }

        Ok(updated.rows_affected)
    }

    /// Writes off the remaining quantity of an expired lot with one
    /// EXPIRY_WRITE_OFF movement.
    #[instrument(skip(self), fields(lot_id = %lot_id))]
    pub async fn write_off_expired_lot(
        &self,
        lot_id: Uuid,
        actor_id: Uuid,
    ) -> Result<LotWriteOff, ServiceError> {
        let write_off = self
            .db
            .transaction::<_, LotWriteOff, ServiceError>(move |txn| {
                Box::pin(async move {
                    let lot = stock_lot::Entity::find_by_id(lot_id)
                        .one(txn)
                        .await
                        .map_err(ServiceError::db_error)?
                        .ok_or_else(|| {
                            ServiceError::NotFound(format!("Stock lot {} not found", lot_id))
                        })?;

                    if LotStatus::from_str(&lot.status) != Some(LotStatus::Expired) {
                        return Err(ServiceError::ValidationError(format!(
                            "Lot {} is not expired; write-off applies to expired lots only",
                            lot_id
                        )));
                    }
                    if lot.quantity <= 0 {
                        return Err(ServiceError::ValidationError(format!(
                            "Lot {} has no remaining quantity to write off",
                            lot_id
                        )));
                    }

                    let now = Utc::now();
                    let updated = stock_lot::Entity::update_many()
                        .col_expr(stock_lot::Column::Quantity, Expr::value(0))
                        .col_expr(stock_lot::Column::UpdatedAt, Expr::value(now))
                        .filter(stock_lot::Column::Id.eq(lot_id))
                        .filter(stock_lot::Column::Quantity.eq(lot.quantity))
                        .exec(txn)
                        .await
                        .map_err(ServiceError::db_error)?;
                    if updated.rows_affected == 0 {
                        return Err(ServiceError::ConcurrentModification(lot_id));
                    }

                    let movement = NewMovement {
                        product_type: lot.product_type.clone(),
                        product_id: lot.product_id,
                        lot_id,
                        lot_number: lot.lot_number.clone(),
                        movement_type: MovementType::ExpiryWriteOff,
                        quantity: -lot.quantity,
                        center_id: lot.center_id,
                        professional_id: actor_id,
                        source: Some("expiry_write_off".to_string()),
                        comment: None,
                    }
                    .insert(txn)
                    .await?;

                    Ok(LotWriteOff {
                        lot_id,
                        movement_id: movement.id,
                        quantity_written_off: lot.quantity,
                    })
                })
            })
            .await?;

        if let Err(e) = self
            .event_sender
            .send(Event::LotWrittenOff {
                lot_id: write_off.lot_id,
                movement_id: write_off.movement_id,
                quantity: write_off.quantity_written_off,
            })
            .await
        {
            warn!("failed to publish write-off event: {}", e);
        }

        Ok(write_off)
    }

    /// Current stock level of a product at a center, computed from the
    /// movement ledger (the source of truth), classified against the
    /// summed per-lot alert thresholds.
    #[instrument(skip(self))]
    pub async fn compute_stock_level(
        &self,
        product: ProductRef,
        center_id: Uuid,
    ) -> Result<StockLevel, ServiceError> {
        let db = self.db.as_ref();

        let quantity = stock_movement::Entity::find()
            .select_only()
            .column_as(stock_movement::Column::Quantity.sum(), "total")
            .filter(stock_movement::Column::ProductType.eq(product.product_type.as_str()))
            .filter(stock_movement::Column::ProductId.eq(product.product_id))
            .filter(stock_movement::Column::CenterId.eq(center_id))
            .into_model::<SumRow>()
            .one(db)
            .await
            .map_err(ServiceError::db_error)?
            .and_then(|row| row.total)
            .unwrap_or(0);

        let threshold_sum = stock_lot::Entity::find()
            .select_only()
            .column_as(stock_lot::Column::AlertThreshold.sum(), "total")
            .filter(stock_lot::Column::ProductType.eq(product.product_type.as_str()))
            .filter(stock_lot::Column::ProductId.eq(product.product_id))
            .filter(stock_lot::Column::CenterId.eq(center_id))
            .into_model::<SumRow>()
            .one(db)
            .await
            .map_err(ServiceError::db_error)?
            .and_then(|row| row.total)
            .unwrap_or(0);

        Ok(StockLevel {
            quantity,
            threshold_sum,
            classification: StockClassification::classify(quantity, threshold_sum),
        })
    }

    /// Ledger sum for one lot; equals the cached quantity when the
    /// invariant holds.
    pub async fn compute_lot_balance(&self, lot_id: Uuid) -> Result<i64, ServiceError> {
        let total = stock_movement::Entity::find()
            .select_only()
            .column_as(stock_movement::Column::Quantity.sum(), "total")
            .filter(stock_movement::Column::LotId.eq(lot_id))
            .into_model::<SumRow>()
            .one(self.db.as_ref())
            .await
            .map_err(ServiceError::db_error)?
            .and_then(|row| row.total)
            .unwrap_or(0);
        Ok(total)
    }

    /// Non-empty lots expiring within the horizon, soonest first.
    #[instrument(skip(self))]
    pub async fn get_expiring_lots(
        &self,
        center_id: Option<Uuid>,
        as_of: NaiveDate,
        horizon_days: i64,
    ) -> Result<Vec<ExpiringLot>, ServiceError> {
        let horizon_end = as_of + chrono::Duration::days(horizon_days);

        let mut query = stock_lot::Entity::find()
            .filter(stock_lot::Column::Quantity.gt(0))
            .filter(stock_lot::Column::ExpiryDate.is_not_null())
            .filter(stock_lot::Column::ExpiryDate.gte(as_of))
            .filter(stock_lot::Column::ExpiryDate.lte(horizon_end))
            .order_by_asc(stock_lot::Column::ExpiryDate)
            .order_by_asc(stock_lot::Column::LotNumber);
        if let Some(center) = center_id {
            query = query.filter(stock_lot::Column::CenterId.eq(center));
        }

        let lots = query
            .all(self.db.as_ref())
            .await
            .map_err(ServiceError::db_error)?;

        Ok(lots
            .into_iter()
            .map(|lot| {
                let days_remaining = lot
                    .expiry_date
                    .map(|d| (d - as_of).num_days())
                    .unwrap_or(i64::MAX);
                ExpiringLot {
                    lot,
                    days_remaining,
                }
            })
            .collect())
    }

    /// Per-product totals vs. threshold sums, low-stock rows only, lowest
    /// total first.
    #[instrument(skip(self))]
    pub async fn list_low_stock(
        &self,
        center_id: Option<Uuid>,
    ) -> Result<Vec<StockLevelReport>, ServiceError> {
        let mut query = stock_lot::Entity::find();
        if let Some(center) = center_id {
            query = query.filter(stock_lot::Column::CenterId.eq(center));
        }
        let lots = query
            .all(self.db.as_ref())
            .await
            .map_err(ServiceError::db_error)?;

        let mut totals: BTreeMap<(String, Uuid), (i64, i64)> = BTreeMap::new();
        for lot in lots {
            let entry = totals
                .entry((lot.product_type.clone(), lot.product_id))
                .or_insert((0, 0));
            entry.0 += i64::from(lot.quantity);
            entry.1 += i64::from(lot.alert_threshold);
        }

        let mut reports: Vec<StockLevelReport> = totals
            .into_iter()
            .filter(|(_, (quantity, threshold))| *quantity > 0 && *quantity <= *threshold)
            .map(|((product_type, product_id), (total_quantity, threshold_sum))| {
                StockLevelReport {
                    product_type,
                    product_id,
                    total_quantity,
                    threshold_sum,
                }
            })
            .collect();
        reports.sort_by_key(|r| r.total_quantity);

        Ok(reports)
    }

    /// Ledger history for one lot, newest first.
    pub async fn movements_for_lot(
        &self,
        lot_id: Uuid,
    ) -> Result<Vec<stock_movement::Model>, ServiceError> {
        stock_movement::Entity::find()
            .filter(stock_movement::Column::LotId.eq(lot_id))
            .order_by_desc(stock_movement::Column::OccurredAt)
            .all(self.db.as_ref())
            .await
            .map_err(ServiceError::db_error)
    }

    /// Ledger history for one product across lots, newest first.
    pub async fn movements_for_product(
        &self,
        product: ProductRef,
    ) -> Result<Vec<stock_movement::Model>, ServiceError> {
        stock_movement::Entity::find()
            .filter(stock_movement::Column::ProductType.eq(product.product_type.as_str()))
            .filter(stock_movement::Column::ProductId.eq(product.product_id))
            .order_by_desc(stock_movement::Column::OccurredAt)
            .all(self.db.as_ref())
            .await
            .map_err(ServiceError::db_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification_thresholds() {
        assert_eq!(
            StockClassification::classify(0, 20),
            StockClassification::OutOfStock
        );
        assert_eq!(
            StockClassification::classify(15, 20),
            StockClassification::Low
        );
        assert_eq!(
            StockClassification::classify(20, 20),
            StockClassification::Low
        );
        assert_eq!(
            StockClassification::classify(21, 20),
            StockClassification::Normal
        );
    }
}
