use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Discriminator for the two stockable product families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProductType {
    Medicament,
    Device,
}

impl ProductType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProductType::Medicament => "MEDICAMENT",
            ProductType::Device => "DEVICE",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "MEDICAMENT" => Some(ProductType::Medicament),
            "DEVICE" => Some(ProductType::Device),
            _ => None,
        }
    }
}

/// Typed reference to a product row in the matching reference table.
///
/// A `ProductRef` is only handed to the ledger after resolution, so code
/// downstream of validation never re-checks which table the id lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProductRef {
    pub product_type: ProductType,
    pub product_id: Uuid,
}

impl ProductRef {
    pub fn medicament(id: Uuid) -> Self {
        Self {
            product_type: ProductType::Medicament,
            product_id: id,
        }
    }

    pub fn device(id: Uuid) -> Self {
        Self {
            product_type: ProductType::Device,
            product_id: id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn product_type_round_trips() {
        for t in [ProductType::Medicament, ProductType::Device] {
            assert_eq!(ProductType::from_str(t.as_str()), Some(t));
        }
        assert_eq!(ProductType::from_str("GADGET"), None);
    }
}
