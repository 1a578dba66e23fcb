//! Statistic payload shapes
//!
//! Amounts are integer minor currency units (cents).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// One point of a time series
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeriesPoint {
    /// Bucket label (hour, day or month)
    pub label: String,
    /// Bucket total
    pub amount: i64,
}

/// Computed value of a statistic
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "camelCase")]
pub enum StatisticPayload {
    /// A single total
    Amount(i64),
    /// A number of transactions
    Count(u64),
    /// Totals per category
    Breakdown(BTreeMap<String, i64>),
    /// Totals per time bucket, ordered by label
    Series(Vec<SeriesPoint>),
}

impl StatisticPayload {
    pub fn as_amount(&self) -> Option<i64> {
        match self {
            StatisticPayload::Amount(amount) => Some(*amount),
            _ => None,
        }
    }

    pub fn as_count(&self) -> Option<u64> {
        match self {
            StatisticPayload::Count(count) => Some(*count),
            _ => None,
        }
    }
}
