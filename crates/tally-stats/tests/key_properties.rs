//! Property-based tests for cache key construction
//!
//! Cache hits depend on keys being a pure, collision-free function of
//! `(user, statistic type, period)`.

use proptest::prelude::*;
use tally_stats::{CacheKey, Period, StatType};

fn arb_stat_type() -> impl Strategy<Value = StatType> {
    prop::sample::select(StatType::ALL.to_vec())
}

fn arb_period() -> impl Strategy<Value = Period> {
    prop::sample::select(Period::ALL.to_vec())
}

fn arb_user_id() -> impl Strategy<Value = String> {
    // Bias towards the characters the escaping has to handle
    prop_oneof![
        "[a-z0-9-]{0,12}",
        "[a-z/%2F5]{0,12}",
        any::<String>(),
    ]
}

fn arb_key() -> impl Strategy<Value = CacheKey> {
    (arb_user_id(), arb_stat_type(), arb_period())
        .prop_map(|(user_id, stat_type, period)| CacheKey::new(user_id, stat_type, period))
}

proptest! {
    #[test]
    fn prop_key_is_deterministic(key in arb_key()) {
        let again = CacheKey::new(key.user_id.clone(), key.stat_type, key.period);
        prop_assert_eq!(key.storage_key(), again.storage_key());
    }

    #[test]
    fn prop_distinct_tuples_never_collide(a in arb_key(), b in arb_key()) {
        prop_assume!(a != b);
        prop_assert_ne!(a.storage_key(), b.storage_key());
    }

    #[test]
    fn prop_key_lies_under_its_prefixes(key in arb_key()) {
        let storage_key = key.storage_key();
        prop_assert!(storage_key.starts_with(tally_stats::CACHE_KEY_PREFIX));
        prop_assert!(storage_key.starts_with(&CacheKey::user_prefix(&key.user_id)));
        prop_assert!(storage_key.starts_with(&CacheKey::stat_prefix(&key.user_id, key.stat_type)));
    }

    #[test]
    fn prop_other_users_are_outside_the_prefix(a in arb_key(), b in arb_key()) {
        prop_assume!(a.user_id != b.user_id);
        prop_assert!(!b.storage_key().starts_with(&CacheKey::user_prefix(&a.user_id)));
    }
}

#[test]
fn colliding_looking_ids_stay_apart() {
    let a = CacheKey::new("alice/totalIncome", StatType::NetBalance, Period::Daily);
    let b = CacheKey::new("alice", StatType::TotalIncome, Period::Daily);

    assert_ne!(a.storage_key(), b.storage_key());
}
