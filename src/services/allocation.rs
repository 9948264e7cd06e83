//! Lot selection for dispensation.
//!
//! Kept free of database types so the planner can be exercised directly;
//! the dispensing service feeds it the candidate lots it read inside the
//! dispensation transaction.

use chrono::NaiveDate;
use uuid::Uuid;

/// A lot eligible for dispensation, as read inside the transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LotCandidate {
    pub lot_id: Uuid,
    pub lot_number: String,
    pub expiry_date: Option<NaiveDate>,
    pub available: i32,
}

/// One planned debit against one lot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LotDebit {
    pub lot_id: Uuid,
    pub lot_number: String,
    pub quantity: i32,
}

/// Returned when the candidate lots cannot cover the requested quantity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Shortfall {
    pub requested: i32,
    pub available: i32,
}

/// Orders candidates earliest-expiry-first.
///
/// Lots without an expiry date sort last; equal expiry dates are broken by
/// the lexicographically smallest lot number so allocation is
/// deterministic.
pub fn sort_fefo(candidates: &mut [LotCandidate]) {
    candidates.sort_by(|a, b| {
        match (a.expiry_date, b.expiry_date) {
            (Some(x), Some(y)) => x.cmp(&y),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => std::cmp::Ordering::Equal,
        }
        .then_with(|| a.lot_number.cmp(&b.lot_number))
    });
}

/// Plans an earliest-expiry-first allocation of `requested` units.
///
/// Either the full quantity is covered or `Shortfall` is returned; the
/// planner never produces a partial plan.
pub fn plan_dispensation(
    mut candidates: Vec<LotCandidate>,
    requested: i32,
) -> Result<Vec<LotDebit>, Shortfall> {
    let available: i32 = candidates
        .iter()
        .filter(|c| c.available > 0)
        .map(|c| c.available)
        .sum();

    if available < requested {
        return Err(Shortfall {
            requested,
            available,
        });
    }

    sort_fefo(&mut candidates);

    let mut remaining = requested;
    let mut debits = Vec::new();

    for candidate in candidates {
        if remaining == 0 {
            break;
        }
        if candidate.available <= 0 {
            continue;
        }
        let take = remaining.min(candidate.available);
        debits.push(LotDebit {
            lot_id: candidate.lot_id,
            lot_number: candidate.lot_number,
            quantity: take,
        });
        remaining -= take;
    }

    Ok(debits)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(lot_number: &str, expiry: Option<(i32, u32, u32)>, available: i32) -> LotCandidate {
        LotCandidate {
            lot_id: Uuid::new_v4(),
            lot_number: lot_number.to_string(),
            expiry_date: expiry.map(|(y, m, d)| NaiveDate::from_ymd_opt(y, m, d).unwrap()),
            available,
        }
    }

    #[test]
    fn plan_prefers_earliest_expiry() {
        let lots = vec![
            candidate("L2", Some((2025, 6, 1)), 50),
            candidate("L1", Some((2025, 1, 1)), 100),
        ];
        let plan = plan_dispensation(lots, 120).expect("plan");
        assert_eq!(plan.len(), 2);
        assert_eq!(plan[0].lot_number, "L1");
        assert_eq!(plan[0].quantity, 100);
        assert_eq!(plan[1].lot_number, "L2");
        assert_eq!(plan[1].quantity, 20);
    }

    #[test]
    fn equal_expiry_breaks_on_lot_number() {
        let lots = vec![
            candidate("B-200", Some((2025, 3, 1)), 40),
            candidate("A-100", Some((2025, 3, 1)), 40),
        ];
        let plan = plan_dispensation(lots, 50).expect("plan");
        assert_eq!(plan[0].lot_number, "A-100");
        assert_eq!(plan[0].quantity, 40);
        assert_eq!(plan[1].lot_number, "B-200");
        assert_eq!(plan[1].quantity, 10);
    }

    #[test]
    fn missing_expiry_sorts_last() {
        let lots = vec![
            candidate("NO-EXP", None, 100),
            candidate("SOON", Some((2026, 1, 1)), 10),
        ];
        let plan = plan_dispensation(lots, 15).expect("plan");
        assert_eq!(plan[0].lot_number, "SOON");
        assert_eq!(plan[1].lot_number, "NO-EXP");
        assert_eq!(plan[1].quantity, 5);
    }

    #[test]
    fn shortfall_reports_totals() {
        let lots = vec![candidate("L1", Some((2025, 1, 1)), 30)];
        let err = plan_dispensation(lots, 50).unwrap_err();
        assert_eq!(
            err,
            Shortfall {
                requested: 50,
                available: 30
            }
        );
    }

    #[test]
    fn exhausted_lots_are_skipped() {
        let lots = vec![
            candidate("EMPTY", Some((2024, 1, 1)), 0),
            candidate("FULL", Some((2025, 1, 1)), 20),
        ];
        let plan = plan_dispensation(lots, 10).expect("plan");
        assert_eq!(plan.len(), 1);
        assert_eq!(plan[0].lot_number, "FULL");
    }
}
