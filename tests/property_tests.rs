use chrono::NaiveDate;
use proptest::prelude::*;
use uuid::Uuid;

use clinicore_api::services::allocation::{plan_dispensation, LotCandidate};

fn arb_candidate() -> impl Strategy<Value = LotCandidate> {
    (
        "[A-Z]{1,2}-[0-9]{1,3}",
        prop::option::of(0i64..2000),
        -10i32..500,
    )
        .prop_map(|(lot_number, expiry_offset, available)| LotCandidate {
            lot_id: Uuid::new_v4(),
            lot_number,
            expiry_date: expiry_offset.map(|days| {
                NaiveDate::from_ymd_opt(2026, 1, 1).unwrap() + chrono::Duration::days(days)
            }),
            available,
        })
}

fn fefo_key(candidate: &LotCandidate) -> (bool, Option<NaiveDate>, String) {
    (
        candidate.expiry_date.is_none(),
        candidate.expiry_date,
        candidate.lot_number.clone(),
    )
}

proptest! {
    /// A successful plan covers exactly the requested quantity and never
    /// takes more from a lot than it holds.
    #[test]
    fn plan_is_exact_and_within_bounds(
        candidates in prop::collection::vec(arb_candidate(), 0..12),
        requested in 0i32..1500,
    ) {
        let by_id: std::collections::HashMap<_, _> = candidates
            .iter()
            .map(|c| (c.lot_id, c.clone()))
            .collect();
        let total_available: i32 = candidates
            .iter()
            .filter(|c| c.available > 0)
            .map(|c| c.available)
            .sum();

        match plan_dispensation(candidates, requested) {
            Ok(plan) => {
                prop_assert!(total_available >= requested);
                let planned: i32 = plan.iter().map(|d| d.quantity).sum();
                prop_assert_eq!(planned, requested);
                for debit in &plan {
                    let source = &by_id[&debit.lot_id];
                    prop_assert!(debit.quantity > 0);
                    prop_assert!(debit.quantity <= source.available);
                }
            }
            Err(shortfall) => {
                prop_assert_eq!(shortfall.requested, requested);
                prop_assert_eq!(shortfall.available, total_available);
                prop_assert!(total_available < requested);
            }
        }
    }

    /// Debits come out in earliest-expiry-first order, lot number breaking
    /// ties, expiry-less lots last.
    #[test]
    fn plan_respects_fefo_ordering(
        candidates in prop::collection::vec(arb_candidate(), 0..12),
        requested in 0i32..1500,
    ) {
        let by_id: std::collections::HashMap<_, _> = candidates
            .iter()
            .map(|c| (c.lot_id, c.clone()))
            .collect();

        if let Ok(plan) = plan_dispensation(candidates, requested) {
            let keys: Vec<_> = plan.iter().map(|d| fefo_key(&by_id[&d.lot_id])).collect();
            for pair in keys.windows(2) {
                prop_assert!(pair[0] <= pair[1]);
            }
        }
    }

    /// Each lot appears at most once in a plan.
    #[test]
    fn plan_never_revisits_a_lot(
        candidates in prop::collection::vec(arb_candidate(), 0..12),
        requested in 0i32..1500,
    ) {
        if let Ok(plan) = plan_dispensation(candidates, requested) {
            let mut seen = std::collections::HashSet::new();
            for debit in &plan {
                prop_assert!(seen.insert(debit.lot_id));
            }
        }
    }
}
