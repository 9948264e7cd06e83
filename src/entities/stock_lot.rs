use chrono::{DateTime, NaiveDate, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// One physical batch of a product at one center.
///
/// `quantity` is a cached value: it must always equal the sum of signed
/// movement quantities referencing this lot. Every write to it happens
/// through the stock ledger service, paired with a movement insert inside
/// the same transaction.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "stock_lots")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub product_type: String,
    pub product_id: Uuid,
    pub center_id: Uuid,
    pub quantity: i32,
    pub lot_number: String,
    pub received_on: NaiveDate,
    pub expiry_date: Option<NaiveDate>,
    pub alert_threshold: i32,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

/// Lifecycle status of a lot. Expired lots stay visible (and keep their
/// quantity) until an explicit write-off movement zeroes them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LotStatus {
    Normal,
    Expired,
}

impl LotStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LotStatus::Normal => "NORMAL",
            LotStatus::Expired => "EXPIRED",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "NORMAL" => Some(LotStatus::Normal),
            "EXPIRED" => Some(LotStatus::Expired),
            _ => None,
        }
    }
}
