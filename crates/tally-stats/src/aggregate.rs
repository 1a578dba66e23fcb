//! Aggregation of transactions into statistics

use std::collections::BTreeMap;

use chrono::{DateTime, Datelike, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::key::{Period, StatType};
use crate::payload::{SeriesPoint, StatisticPayload};

/// Direction of a transaction
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TransactionKind {
    Income,
    Expense,
}

/// A booked transaction
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: String,
    /// Positive amount in minor units
    pub amount: i64,
    pub kind: TransactionKind,
    pub category: String,
    pub occurred_at: DateTime<Utc>,
}

impl Period {
    /// Start of the calendar window ending at `now`, or `None` for all time
    ///
    /// Weeks start on Monday. All windows are in UTC.
    pub fn window_start(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let today = now.date_naive();
        let start = match self {
            Period::Daily => today,
            Period::Weekly => {
                today - chrono::Duration::days(i64::from(today.weekday().num_days_from_monday()))
            }
            Period::Monthly => today.with_day(1)?,
            Period::Yearly => NaiveDate::from_ymd_opt(today.year(), 1, 1)?,
            Period::AllTime => return None,
        };
        Some(Utc.from_utc_datetime(&start.and_hms_opt(0, 0, 0)?))
    }

    /// chrono format of spending trend bucket labels
    fn bucket_format(&self) -> &'static str {
        match self {
            Period::Daily => "%H:00",
            Period::Weekly | Period::Monthly => "%Y-%m-%d",
            Period::Yearly | Period::AllTime => "%Y-%m",
        }
    }
}

/// Compute `stat_type` over the transactions inside `period` as of `now`
pub fn compute(
    stat_type: StatType,
    period: Period,
    transactions: &[Transaction],
    now: DateTime<Utc>,
) -> StatisticPayload {
    let start = period.window_start(now);
    let in_window = transactions.iter().filter(|t| {
        t.occurred_at <= now && start.map_or(true, |start| t.occurred_at >= start)
    });

    match stat_type {
        StatType::TotalIncome => StatisticPayload::Amount(total(in_window, TransactionKind::Income)),
        StatType::TotalExpense => {
            StatisticPayload::Amount(total(in_window, TransactionKind::Expense))
        }
        StatType::NetBalance => StatisticPayload::Amount(in_window.fold(0i64, |net, t| {
            match t.kind {
                TransactionKind::Income => net.saturating_add(t.amount),
                TransactionKind::Expense => net.saturating_sub(t.amount),
            }
        })),
        StatType::CategoryBreakdown => {
            let mut by_category: BTreeMap<String, i64> = BTreeMap::new();
            for t in in_window.filter(|t| t.kind == TransactionKind::Expense) {
                let sum = by_category.entry(t.category.clone()).or_default();
                *sum = sum.saturating_add(t.amount);
            }
            StatisticPayload::Breakdown(by_category)
        }
        StatType::TransactionCount => StatisticPayload::Count(in_window.count() as u64),
        StatType::SpendingTrend => {
            let format = period.bucket_format();
            let mut buckets: BTreeMap<String, i64> = BTreeMap::new();
            for t in in_window.filter(|t| t.kind == TransactionKind::Expense) {
                let sum = buckets
                    .entry(t.occurred_at.format(format).to_string())
                    .or_default();
                *sum = sum.saturating_add(t.amount);
            }
            StatisticPayload::Series(
                buckets
                    .into_iter()
                    .map(|(label, amount)| SeriesPoint { label, amount })
                    .collect(),
            )
        }
    }
}

fn total<'a>(transactions: impl Iterator<Item = &'a Transaction>, kind: TransactionKind) -> i64 {
    transactions
        .filter(|t| t.kind == kind)
        .fold(0i64, |sum, t| sum.saturating_add(t.amount))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
    }

    fn tx(id: &str, amount: i64, kind: TransactionKind, category: &str, occurred_at: DateTime<Utc>) -> Transaction {
        Transaction {
            id: id.to_string(),
            amount,
            kind,
            category: category.to_string(),
            occurred_at,
        }
    }

    /// Thursday 2024-05-16 15:00 UTC
    fn now() -> DateTime<Utc> {
        at(2024, 5, 16, 15)
    }

    fn ledger() -> Vec<Transaction> {
        use TransactionKind::*;
        vec![
            tx("salary", 300_000, Income, "salary", at(2024, 5, 1, 9)),
            tx("rent", 120_000, Expense, "housing", at(2024, 5, 2, 10)),
            tx("coffee", 450, Expense, "food", at(2024, 5, 16, 8)),
            tx("lunch", 1_250, Expense, "food", at(2024, 5, 16, 12)),
            tx("groceries", 8_000, Expense, "food", at(2024, 5, 13, 18)),
            tx("refund", 2_000, Income, "shopping", at(2024, 5, 14, 11)),
            tx("old", 9_999, Expense, "food", at(2023, 12, 31, 23)),
            tx("future", 7_777, Expense, "food", at(2024, 5, 16, 16)),
        ]
    }

    #[test]
    fn test_window_starts() {
        assert_eq!(Period::Daily.window_start(now()), Some(at(2024, 5, 16, 0)));
        assert_eq!(Period::Weekly.window_start(now()), Some(at(2024, 5, 13, 0)));
        assert_eq!(Period::Monthly.window_start(now()), Some(at(2024, 5, 1, 0)));
        assert_eq!(Period::Yearly.window_start(now()), Some(at(2024, 1, 1, 0)));
        assert_eq!(Period::AllTime.window_start(now()), None);
    }

    #[test]
    fn test_totals() {
        let ledger = ledger();

        assert_eq!(
            compute(StatType::TotalIncome, Period::Monthly, &ledger, now()),
            StatisticPayload::Amount(302_000)
        );
        assert_eq!(
            compute(StatType::TotalExpense, Period::Daily, &ledger, now()),
            StatisticPayload::Amount(1_700)
        );
        assert_eq!(
            compute(StatType::NetBalance, Period::Weekly, &ledger, now()),
            StatisticPayload::Amount(2_000 - 8_000 - 450 - 1_250)
        );
        assert_eq!(
            compute(StatType::TotalExpense, Period::AllTime, &ledger, now()),
            StatisticPayload::Amount(120_000 + 450 + 1_250 + 8_000 + 9_999)
        );
    }

    #[test]
    fn test_future_transactions_are_ignored() {
        let count = compute(StatType::TransactionCount, Period::Daily, &ledger(), now());
        assert_eq!(count, StatisticPayload::Count(2));
    }

    #[test]
    fn test_category_breakdown_counts_expenses_only() {
        let breakdown = compute(StatType::CategoryBreakdown, Period::Monthly, &ledger(), now());
        assert_eq!(
            breakdown,
            StatisticPayload::Breakdown(BTreeMap::from([
                ("food".to_string(), 9_700),
                ("housing".to_string(), 120_000),
            ]))
        );
    }

    #[test]
    fn test_spending_trend_buckets() {
        let daily = compute(StatType::SpendingTrend, Period::Daily, &ledger(), now());
        assert_eq!(
            daily,
            StatisticPayload::Series(vec![
                SeriesPoint { label: "08:00".to_string(), amount: 450 },
                SeriesPoint { label: "12:00".to_string(), amount: 1_250 },
            ])
        );

        let all_time = compute(StatType::SpendingTrend, Period::AllTime, &ledger(), now());
        assert_eq!(
            all_time,
            StatisticPayload::Series(vec![
                SeriesPoint { label: "2023-12".to_string(), amount: 9_999 },
                SeriesPoint { label: "2024-05".to_string(), amount: 129_700 },
            ])
        );
    }

    #[test]
    fn test_empty_ledger() {
        assert_eq!(
            compute(StatType::SpendingTrend, Period::Weekly, &[], now()),
            StatisticPayload::Series(Vec::new())
        );
        assert_eq!(
            compute(StatType::NetBalance, Period::Yearly, &[], now()),
            StatisticPayload::Amount(0)
        );
    }
}
