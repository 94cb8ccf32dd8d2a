//! Per-member progress rows of a period.
//!
//! The free functions here hold the row arithmetic. Storage implementations
//! call [`apply_entry`] inside the same transaction that reads and writes the
//! row, which is what makes concurrent additions for one member safe.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::debug;
use rust_decimal::Decimal;
use uuid::Uuid;

use super::group_goals_errors::GroupGoalError;
use super::group_goals_model::{
    DailyEntry, GroupGoalPeriod, GroupGoalProgress, NewGroupGoalPeriod, NewProgressRow,
    PeriodSummary, ProgressEntry,
};
use super::group_goals_traits::GroupGoalRepositoryTrait;
use super::penalty;
use crate::errors::Result;

/// Rejects negative amounts. Zero is accepted.
pub fn validate_amount(amount: Decimal) -> std::result::Result<(), GroupGoalError> {
    if amount.is_sign_negative() && !amount.is_zero() {
        return Err(GroupGoalError::InvalidAmount(amount));
    }
    Ok(())
}

/// Builds one row per distinct member with `target = base + penalty`.
///
/// Fails with [`GroupGoalError::AmountOverflow`] when a target would leave the
/// `Decimal` range, e.g. after many periods of compounding penalties.
pub fn seed_rows(
    period_id: &str,
    members: &[String],
    base_target: Decimal,
    penalty_by_member: &HashMap<String, Decimal>,
) -> std::result::Result<Vec<NewProgressRow>, GroupGoalError> {
    let unique: BTreeSet<&String> = members.iter().collect();
    unique
        .into_iter()
        .map(|user_id| {
            let penalty = penalty_by_member
                .get(user_id)
                .copied()
                .unwrap_or(Decimal::ZERO)
                .max(Decimal::ZERO);
            let target_amount =
                base_target
                    .checked_add(penalty)
                    .ok_or(GroupGoalError::AmountOverflow {
                        total: base_target,
                        amount: penalty,
                    })?;
            Ok(NewProgressRow {
                id: Uuid::new_v4().to_string(),
                period_id: period_id.to_string(),
                user_id: user_id.clone(),
                target_amount,
                penalty_carry_over: penalty,
            })
        })
        .collect()
}

/// Adds an entry to a date-ordered sequence. An existing entry for the same
/// date has its amount increased and the new note appended.
pub fn merge_daily_entry(entries: &mut Vec<DailyEntry>, entry: &ProgressEntry) {
    match entries.binary_search_by(|e| e.date.cmp(&entry.date)) {
        Ok(index) => {
            let existing = &mut entries[index];
            existing.amount = existing.amount.saturating_add(entry.amount);
            existing.note = match (existing.note.take(), entry.note.clone()) {
                (Some(old), Some(new)) => Some(format!("{}; {}", old, new)),
                (old, new) => old.or(new),
            };
        }
        Err(index) => entries.insert(
            index,
            DailyEntry {
                date: entry.date,
                amount: entry.amount,
                note: entry.note.clone(),
            },
        ),
    }
}

/// Applies one progress addition to a row of `period`.
///
/// Fails when the period is finalized, the date lies outside the period, the
/// amount is negative, or the new total would overflow. On failure the row is
/// left untouched. On success the row's amount only ever grows.
pub fn apply_entry(
    period: &GroupGoalPeriod,
    row: &mut GroupGoalProgress,
    entry: &ProgressEntry,
    now: DateTime<Utc>,
) -> std::result::Result<(), GroupGoalError> {
    validate_amount(entry.amount)?;
    if !period.is_active {
        return Err(GroupGoalError::PeriodClosed(period.id.clone()));
    }
    if !period.contains_date(entry.date) {
        return Err(GroupGoalError::EntryOutsidePeriod {
            period_id: period.id.clone(),
            date: entry.date,
        });
    }
    let total = row
        .current_amount
        .checked_add(entry.amount)
        .ok_or(GroupGoalError::AmountOverflow {
            total: row.current_amount,
            amount: entry.amount,
        })?;
    // Daily amounts sum to the row total, so the merge below cannot overflow.
    merge_daily_entry(&mut row.daily_entries, entry);
    row.current_amount = total;
    row.updated_at = now;
    Ok(())
}

/// Aggregates a period's rows.
pub fn summarize_period(period: GroupGoalPeriod, rows: &[GroupGoalProgress]) -> PeriodSummary {
    let participant_count = rows.len();
    let completed_count = rows.iter().filter(|r| r.is_completed()).count();
    PeriodSummary {
        period,
        participant_count,
        completed_count,
        completion_rate: percentage(completed_count, participant_count),
        total_progress: total_progress(rows),
        total_penalty_carried: penalty::total_carry_over(rows),
    }
}

/// Sum of all rows' amounts, saturating at `Decimal::MAX`.
pub fn total_progress(rows: &[GroupGoalProgress]) -> Decimal {
    rows.iter()
        .fold(Decimal::ZERO, |acc, r| acc.saturating_add(r.current_amount))
}

pub(crate) fn percentage(part: usize, whole: usize) -> Decimal {
    if whole == 0 {
        return Decimal::ZERO;
    }
    (Decimal::from(part) * Decimal::ONE_HUNDRED / Decimal::from(whole)).round_dp(1)
}

/// Opens, mutates and finalizes progress rows through the repository.
#[derive(Clone)]
pub struct ProgressLedger {
    repository: Arc<dyn GroupGoalRepositoryTrait>,
}

impl ProgressLedger {
    pub fn new(repository: Arc<dyn GroupGoalRepositoryTrait>) -> Self {
        Self { repository }
    }

    /// Creates the period and one row per member in a single batch.
    pub async fn open(
        &self,
        period: NewGroupGoalPeriod,
        members: &[String],
        base_target: Decimal,
        penalty_by_member: &HashMap<String, Decimal>,
    ) -> Result<(GroupGoalPeriod, Vec<GroupGoalProgress>)> {
        let rows = seed_rows(&period.id, members, base_target, penalty_by_member)?;
        debug!(
            "Opening period {} for goal {} with {} member rows",
            period.id,
            period.group_goal_id,
            rows.len()
        );
        self.repository.open_period(period, rows).await
    }

    pub async fn record_progress(
        &self,
        period_id: &str,
        user_id: &str,
        entry: ProgressEntry,
    ) -> Result<GroupGoalProgress> {
        validate_amount(entry.amount)?;
        self.repository
            .record_progress(period_id, user_id, entry)
            .await
    }

    /// Closes the period and returns the frozen snapshot used for carry-over.
    pub async fn finalize(&self, period_id: &str) -> Result<Vec<GroupGoalProgress>> {
        self.repository.finalize_period(period_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone};
    use rust_decimal_macros::dec;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 8, d).unwrap()
    }

    fn period(active: bool) -> GroupGoalPeriod {
        GroupGoalPeriod {
            id: "p1".to_string(),
            group_goal_id: "g1".to_string(),
            start_date: Utc.with_ymd_and_hms(2025, 8, 4, 0, 0, 0).unwrap(),
            end_date: Utc.with_ymd_and_hms(2025, 8, 11, 0, 0, 0).unwrap(),
            is_active: active,
            created_at: Utc::now(),
        }
    }

    fn empty_row() -> GroupGoalProgress {
        GroupGoalProgress {
            id: "r1".to_string(),
            period_id: "p1".to_string(),
            user_id: "x".to_string(),
            target_amount: dec!(10),
            current_amount: Decimal::ZERO,
            penalty_carry_over: Decimal::ZERO,
            daily_entries: Vec::new(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn entry(amount: Decimal, day: u32, note: Option<&str>) -> ProgressEntry {
        ProgressEntry {
            amount,
            date: date(day),
            note: note.map(str::to_string),
        }
    }

    #[test]
    fn seed_rows_adds_penalty_to_base_target() {
        let mut penalties = HashMap::new();
        penalties.insert("x".to_string(), dec!(2));
        let members = vec!["y".to_string(), "x".to_string(), "x".to_string()];
        let rows = seed_rows("p2", &members, dec!(10), &penalties).unwrap();
        assert_eq!(rows.len(), 2);
        let x = rows.iter().find(|r| r.user_id == "x").unwrap();
        assert_eq!(x.target_amount, dec!(12));
        assert_eq!(x.penalty_carry_over, dec!(2));
        let y = rows.iter().find(|r| r.user_id == "y").unwrap();
        assert_eq!(y.target_amount, dec!(10));
        assert_eq!(y.penalty_carry_over, Decimal::ZERO);
    }

    #[test]
    fn seed_rows_rejects_targets_beyond_decimal_range() {
        let mut penalties = HashMap::new();
        penalties.insert("x".to_string(), Decimal::MAX);
        let members = vec!["x".to_string()];
        let err = seed_rows("p2", &members, dec!(10), &penalties).unwrap_err();
        assert_eq!(
            err,
            GroupGoalError::AmountOverflow {
                total: dec!(10),
                amount: Decimal::MAX
            }
        );
    }

    #[test]
    fn same_day_entries_are_summed_and_notes_kept() {
        let mut entries = Vec::new();
        merge_daily_entry(&mut entries, &entry(dec!(3), 6, Some("morning run")));
        merge_daily_entry(&mut entries, &entry(dec!(2), 5, None));
        merge_daily_entry(&mut entries, &entry(dec!(4), 6, Some("evening run")));
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].date, date(5));
        assert_eq!(entries[1].amount, dec!(7));
        assert_eq!(
            entries[1].note.as_deref(),
            Some("morning run; evening run")
        );
    }

    #[test]
    fn apply_entry_increments_and_completes() {
        let p = period(true);
        let mut row = empty_row();
        let now = Utc::now();
        apply_entry(&p, &mut row, &entry(dec!(4), 5, None), now).unwrap();
        assert!(!row.is_completed());
        apply_entry(&p, &mut row, &entry(dec!(6), 7, None), now).unwrap();
        assert_eq!(row.current_amount, dec!(10));
        assert!(row.is_completed());
        assert_eq!(row.days_active(), 2);
    }

    #[test]
    fn apply_entry_rejects_negative_amount() {
        let mut row = empty_row();
        let err = apply_entry(&period(true), &mut row, &entry(dec!(-1), 5, None), Utc::now())
            .unwrap_err();
        assert_eq!(err, GroupGoalError::InvalidAmount(dec!(-1)));
        assert_eq!(row.current_amount, Decimal::ZERO);
    }

    #[test]
    fn apply_entry_rejects_overflow_and_keeps_row() {
        let p = period(true);
        let mut row = empty_row();
        let now = Utc::now();
        let huge = Decimal::from_i128_with_scale(5 * 10i128.pow(28), 0);
        apply_entry(&p, &mut row, &entry(huge, 5, None), now).unwrap();
        let before = row.clone();

        let err = apply_entry(&p, &mut row, &entry(huge, 5, Some("again")), now).unwrap_err();
        assert_eq!(
            err,
            GroupGoalError::AmountOverflow {
                total: huge,
                amount: huge
            }
        );
        assert_eq!(row, before);

        apply_entry(&p, &mut row, &entry(dec!(1), 6, None), now).unwrap();
        assert_eq!(row.current_amount, huge + dec!(1));
    }

    #[test]
    fn apply_entry_rejects_closed_period() {
        let mut row = empty_row();
        let err = apply_entry(&period(false), &mut row, &entry(dec!(1), 5, None), Utc::now())
            .unwrap_err();
        assert!(matches!(err, GroupGoalError::PeriodClosed(_)));
    }

    #[test]
    fn apply_entry_rejects_dates_outside_period() {
        let mut row = empty_row();
        let err = apply_entry(&period(true), &mut row, &entry(dec!(1), 11, None), Utc::now())
            .unwrap_err();
        assert!(matches!(err, GroupGoalError::EntryOutsidePeriod { .. }));
        assert!(row.daily_entries.is_empty());
    }

    #[test]
    fn zero_amount_is_accepted() {
        assert!(validate_amount(Decimal::ZERO).is_ok());
        assert!(validate_amount(dec!(-0.01)).is_err());
    }

    #[test]
    fn streak_counts_consecutive_days_ending_at_latest() {
        let p = period(true);
        let mut row = empty_row();
        let now = Utc::now();
        for day in [4, 6, 7, 8] {
            apply_entry(&p, &mut row, &entry(dec!(1), day, None), now).unwrap();
        }
        assert_eq!(row.streak(), 3);
        assert_eq!(row.last_activity(), Some(date(8)));
    }

    #[test]
    fn summarize_period_reports_completion_rate_and_penalties() {
        let mut done = empty_row();
        done.current_amount = dec!(10);
        let mut short = empty_row();
        short.user_id = "y".to_string();
        short.current_amount = dec!(7);
        let summary = summarize_period(period(false), &[done, short]);
        assert_eq!(summary.participant_count, 2);
        assert_eq!(summary.completed_count, 1);
        assert_eq!(summary.completion_rate, dec!(50));
        assert_eq!(summary.total_progress, dec!(17));
        assert_eq!(summary.total_penalty_carried, dec!(3));
    }

    #[test]
    fn summarize_period_saturates_huge_totals() {
        let mut a = empty_row();
        a.current_amount = Decimal::MAX;
        let mut b = empty_row();
        b.user_id = "y".to_string();
        b.current_amount = Decimal::MAX;
        let summary = summarize_period(period(false), &[a, b]);
        assert_eq!(summary.total_progress, Decimal::MAX);
        assert_eq!(summary.completed_count, 2);
    }
}
