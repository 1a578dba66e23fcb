//! Statistic identifiers and cache key construction
//!
//! Storage keys have the shape `stats/<user>/<statType>/<period>`. Each
//! segment is escaped (`%` as `%25`, `/` as `%2F`) so that no two tuples
//! share a key and the per-user and per-type prefixes match exactly.

use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::StatsError;

/// Prefix shared by every statistics cache key
pub const CACHE_KEY_PREFIX: &str = "stats/";

/// Kind of aggregate statistic
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StatType {
    TotalIncome,
    TotalExpense,
    NetBalance,
    CategoryBreakdown,
    TransactionCount,
    SpendingTrend,
}

impl StatType {
    /// Every statistic type
    pub const ALL: [StatType; 6] = [
        StatType::TotalIncome,
        StatType::TotalExpense,
        StatType::NetBalance,
        StatType::CategoryBreakdown,
        StatType::TransactionCount,
        StatType::SpendingTrend,
    ];

    /// Stable wire name
    pub fn as_str(&self) -> &'static str {
        match self {
            StatType::TotalIncome => "totalIncome",
            StatType::TotalExpense => "totalExpense",
            StatType::NetBalance => "netBalance",
            StatType::CategoryBreakdown => "categoryBreakdown",
            StatType::TransactionCount => "transactionCount",
            StatType::SpendingTrend => "spendingTrend",
        }
    }
}

impl fmt::Display for StatType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StatType {
    type Err = StatsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        StatType::ALL
            .into_iter()
            .find(|stat_type| stat_type.as_str() == s)
            .ok_or_else(|| StatsError::UnknownStatType(s.to_string()))
    }
}

/// Reporting period a statistic covers
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Period {
    Daily,
    Weekly,
    Monthly,
    Yearly,
    AllTime,
}

impl Period {
    /// Every period
    pub const ALL: [Period; 5] = [
        Period::Daily,
        Period::Weekly,
        Period::Monthly,
        Period::Yearly,
        Period::AllTime,
    ];

    /// Stable wire name
    pub fn as_str(&self) -> &'static str {
        match self {
            Period::Daily => "daily",
            Period::Weekly => "weekly",
            Period::Monthly => "monthly",
            Period::Yearly => "yearly",
            Period::AllTime => "allTime",
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Period {
    type Err = StatsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Period::ALL
            .into_iter()
            .find(|period| period.as_str() == s)
            .ok_or_else(|| StatsError::UnknownPeriod(s.to_string()))
    }
}

/// Identity of one cached statistic
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub user_id: String,
    pub stat_type: StatType,
    pub period: Period,
}

impl CacheKey {
    pub fn new(user_id: impl Into<String>, stat_type: StatType, period: Period) -> Self {
        Self {
            user_id: user_id.into(),
            stat_type,
            period,
        }
    }

    /// Store key for this statistic
    pub fn storage_key(&self) -> String {
        format!(
            "{}{}",
            Self::stat_prefix(&self.user_id, self.stat_type),
            self.period.as_str()
        )
    }

    /// Prefix covering every statistic of `user_id`
    pub fn user_prefix(user_id: &str) -> String {
        format!("{}{}/", CACHE_KEY_PREFIX, escape_segment(user_id))
    }

    /// Prefix covering one statistic type of `user_id` across all periods
    pub fn stat_prefix(user_id: &str, stat_type: StatType) -> String {
        format!("{}{}/", Self::user_prefix(user_id), stat_type.as_str())
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.storage_key())
    }
}

fn escape_segment(segment: &str) -> Cow<'_, str> {
    if !segment.contains(['%', '/']) {
        return Cow::Borrowed(segment);
    }

    let mut escaped = String::with_capacity(segment.len() + 8);
    for c in segment.chars() {
        match c {
            '%' => escaped.push_str("%25"),
            '/' => escaped.push_str("%2F"),
            _ => escaped.push(c),
        }
    }
    Cow::Owned(escaped)
}
