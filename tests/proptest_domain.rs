//! Property-Based Tests - Domain Layer Invariants
//!
//! Uses `proptest` to verify that domain components maintain
//! their invariants across random inputs.

use std::time::Duration;

use proptest::prelude::*;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rust_decimal::Decimal;

use oracle_keeper_bot::domain::backoff::{Backoff, BackoffPolicy};
use oracle_keeper_bot::domain::range::uniq_sorted;
use oracle_keeper_bot::domain::slot::{PriceBand, SlotQuantizer};
use oracle_keeper_bot::domain::suppression::SuppressionStore;
use oracle_keeper_bot::usecases::dispatcher::partition;

// ── Batch Partitioning ──────────────────────────────────────

proptest! {
    /// Batches preserve order, cover every id once and respect the size cap.
    #[test]
    fn partition_covers_all_ids(len in 0usize..1_000, size in 1usize..300) {
        let ids: Vec<u64> = (0..len as u64).collect();
        let batches: Vec<&[u64]> = partition(&ids, size).collect();

        prop_assert_eq!(batches.len(), len.div_ceil(size));
        prop_assert!(batches.iter().all(|b| !b.is_empty() && b.len() <= size));
        let flat: Vec<u64> = batches.concat();
        prop_assert_eq!(flat, ids);
    }
}

// ── Backoff ─────────────────────────────────────────────────

proptest! {
    /// Delays never exceed the cap and the base never shrinks.
    #[test]
    fn backoff_bounded_and_monotonic(seed in any::<u64>(), steps in 1usize..40) {
        let policy = BackoffPolicy::PROOF;
        let mut rng = StdRng::seed_from_u64(seed);
        let mut backoff = Backoff::new(policy);
        let mut last_base = backoff.current();

        for _ in 0..steps {
            let delay = backoff.next_delay_with(&mut rng);
            prop_assert!(delay <= policy.max, "delay {delay:?} above cap");
            prop_assert!(backoff.current() >= last_base);
            last_base = backoff.current();
        }
        prop_assert!(backoff.current() <= policy.max);
    }

    /// Jittered delays stay within ±jitter of the current base.
    #[test]
    fn backoff_jitter_within_band(seed in any::<u64>()) {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut backoff = BackoffPolicy::PROOF.start();
        let delay = backoff.next_delay_with(&mut rng);
        prop_assert!(delay >= Duration::from_millis(140));
        prop_assert!(delay <= Duration::from_millis(260));
    }
}

// ── Suppression ─────────────────────────────────────────────

proptest! {
    /// An id is filtered exactly when its counter reached the limit.
    #[test]
    fn suppression_filters_at_limit(limit in 1u32..6, attempts in 0u32..10, slot in -1_000i64..1_000) {
        let store = SuppressionStore::new(limit, 64);
        for _ in 0..attempts {
            store.increment(1, slot, &[7]);
        }

        let kept = store.filter(1, slot, &[7, 8]);
        if attempts >= limit {
            prop_assert_eq!(kept, vec![8]);
        } else {
            prop_assert_eq!(kept, vec![7, 8]);
        }
        // Other slots are untouched.
        prop_assert_eq!(store.filter(1, slot + 1, &[7, 8]), vec![7, 8]);
    }

    /// Bucket count per instrument never exceeds the cap.
    #[test]
    fn suppression_memory_is_bounded(cap in 1usize..8, slots in proptest::collection::vec(0i64..50, 1..100)) {
        let store = SuppressionStore::new(3, cap);
        for slot in &slots {
            store.increment(4, *slot, &[1]);
        }
        prop_assert!(store.bucket_count() <= cap);
    }
}

// ── Slots and Bands ─────────────────────────────────────────

proptest! {
    /// Moving the price by one tick moves the slot by exactly one.
    #[test]
    fn slot_advances_one_per_tick(mantissa in 1i64..1_000_000_000, decimals in 0u32..6) {
        let q = SlotQuantizer::new(decimals);
        let price = Decimal::new(mantissa, 6);
        let slot = q.slot(price).unwrap();

        let tick = Decimal::new(1, decimals);
        let shifted = q.slot(price + tick).unwrap();
        prop_assert_eq!(shifted, slot + 1);
    }

    /// A band always contains its centre price.
    #[test]
    fn band_contains_price(mantissa in 1i64..1_000_000_000, bps in 1u32..500) {
        let price = Decimal::new(mantissa, 4);
        let band = PriceBand::around(price, Decimal::new(i64::from(bps), 4));
        prop_assert!(band.from <= price && price <= band.to);
    }

    /// Dedup keeps one of each id in ascending order.
    #[test]
    fn uniq_sorted_is_sorted_set(ids in proptest::collection::vec(0u64..100, 0..200)) {
        let out = uniq_sorted(ids.iter().copied());
        prop_assert!(out.windows(2).all(|w| w[0] < w[1]));
        prop_assert!(ids.iter().all(|id| out.contains(id)));
    }
}
