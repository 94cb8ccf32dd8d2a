//! Group goal domain models.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::group_goals_errors::GroupGoalError;
use super::leaderboard::LeaderboardEntry;

/// Length of a group goal period.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum PeriodType {
    Weekly,
    Monthly,
}

impl PeriodType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PeriodType::Weekly => "weekly",
            PeriodType::Monthly => "monthly",
        }
    }
}

impl fmt::Display for PeriodType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PeriodType {
    type Err = GroupGoalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "weekly" => Ok(PeriodType::Weekly),
            "monthly" => Ok(PeriodType::Monthly),
            other => Err(GroupGoalError::InvalidPeriodType(other.to_string())),
        }
    }
}

/// Domain model representing a shared, recurring group goal.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GroupGoal {
    pub id: String,
    pub group_id: String,
    pub name: String,
    pub description: Option<String>,
    pub unit: String,
    pub period_type: PeriodType,
    pub base_target: Decimal,
    pub is_active: bool,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input model for creating a new group goal
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct NewGroupGoal {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub group_id: String,
    pub name: String,
    pub description: Option<String>,
    pub unit: String,
    pub period_type: PeriodType,
    pub base_target: Decimal,
    #[serde(default)]
    pub created_by: String,
}

/// Partial update of a group goal. `period_type` is accepted only so that a
/// change can be detected and refused.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct GroupGoalUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub unit: Option<String>,
    pub is_active: Option<bool>,
    pub period_type: Option<PeriodType>,
}

/// Half-open interval `[start, end)` in UTC.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub struct PeriodBounds {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl PeriodBounds {
    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        self.start <= instant && instant < self.end
    }

    pub fn duration(&self) -> Duration {
        self.end - self.start
    }
}

/// One period of a group goal.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GroupGoalPeriod {
    pub id: String,
    pub group_goal_id: String,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl GroupGoalPeriod {
    pub fn bounds(&self) -> PeriodBounds {
        PeriodBounds {
            start: self.start_date,
            end: self.end_date,
        }
    }

    /// The period's end has been reached (`end <= now`).
    pub fn has_ended(&self, now: DateTime<Utc>) -> bool {
        self.end_date <= now
    }

    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        self.bounds().contains(instant)
    }

    /// Calendar dates covered by the period. Boundaries sit on 00:00 UTC, so a
    /// date belongs to the period when `start.date <= date < end.date`.
    pub fn contains_date(&self, date: NaiveDate) -> bool {
        self.start_date.date_naive() <= date && date < self.end_date.date_naive()
    }

    pub fn days_remaining(&self, now: DateTime<Utc>) -> i64 {
        if self.has_ended(now) {
            return 0;
        }
        (self.end_date - now).num_days()
    }
}

/// Input for creating a period row.
#[derive(Debug, Clone, PartialEq)]
pub struct NewGroupGoalPeriod {
    pub id: String,
    pub group_goal_id: String,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
}

/// Progress on one calendar day. Entries for the same date are merged.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DailyEntry {
    pub date: NaiveDate,
    pub amount: Decimal,
    pub note: Option<String>,
}

/// A member's progress within one period.
///
/// `target_amount` and `penalty_carry_over` are fixed when the row is created.
/// Completion is always derived from the amounts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GroupGoalProgress {
    pub id: String,
    pub period_id: String,
    pub user_id: String,
    pub target_amount: Decimal,
    pub current_amount: Decimal,
    pub penalty_carry_over: Decimal,
    /// Ordered by date ascending.
    pub daily_entries: Vec<DailyEntry>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl GroupGoalProgress {
    pub fn base_target(&self) -> Decimal {
        self.target_amount - self.penalty_carry_over
    }

    pub fn is_completed(&self) -> bool {
        self.current_amount >= self.target_amount
    }

    /// Uncapped `current / target`. A zero target counts as fully met. A
    /// quotient beyond the `Decimal` range saturates at `Decimal::MAX`.
    pub fn progress_ratio(&self) -> Decimal {
        if self.target_amount <= Decimal::ZERO {
            return Decimal::ONE;
        }
        self.current_amount
            .checked_div(self.target_amount)
            .unwrap_or(Decimal::MAX)
    }

    /// Display percentage, capped at 100.
    pub fn progress_percentage(&self) -> Decimal {
        self.progress_ratio()
            .saturating_mul(Decimal::ONE_HUNDRED)
            .min(Decimal::ONE_HUNDRED)
            .round_dp(2)
    }

    pub fn remaining_amount(&self) -> Decimal {
        (self.target_amount - self.current_amount).max(Decimal::ZERO)
    }

    /// Number of distinct days with positive progress.
    pub fn days_active(&self) -> usize {
        self.daily_entries
            .iter()
            .filter(|e| e.amount > Decimal::ZERO)
            .count()
    }

    pub fn last_activity(&self) -> Option<NaiveDate> {
        self.daily_entries
            .iter()
            .filter(|e| e.amount > Decimal::ZERO)
            .map(|e| e.date)
            .max()
    }

    /// Consecutive days with positive progress ending at the latest such day.
    pub fn streak(&self) -> u32 {
        let mut days: Vec<NaiveDate> = self
            .daily_entries
            .iter()
            .filter(|e| e.amount > Decimal::ZERO)
            .map(|e| e.date)
            .collect();
        days.sort_unstable_by(|a, b| b.cmp(a));
        days.dedup();

        let mut streak = 0;
        let mut expected = match days.first() {
            Some(d) => *d,
            None => return 0,
        };
        for day in days {
            if day != expected {
                break;
            }
            streak += 1;
            match expected.pred_opt() {
                Some(prev) => expected = prev,
                None => break,
            }
        }
        streak
    }
}

/// Input for seeding a progress row when a period opens.
#[derive(Debug, Clone, PartialEq)]
pub struct NewProgressRow {
    pub id: String,
    pub period_id: String,
    pub user_id: String,
    pub target_amount: Decimal,
    pub penalty_carry_over: Decimal,
}

/// A validated progress addition, ready to be applied to a row.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressEntry {
    pub amount: Decimal,
    pub date: NaiveDate,
    pub note: Option<String>,
}

/// Request payload for recording progress.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct RecordProgress {
    pub amount: Decimal,
    pub note: Option<String>,
    /// Defaults to the current UTC date.
    pub date: Option<NaiveDate>,
}

/// Role of a member inside a group.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MemberRole {
    Owner,
    Admin,
    Member,
}

impl MemberRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemberRole::Owner => "owner",
            MemberRole::Admin => "admin",
            MemberRole::Member => "member",
        }
    }

    pub fn can_manage_goals(&self) -> bool {
        matches!(self, MemberRole::Owner | MemberRole::Admin)
    }
}

impl FromStr for MemberRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "owner" => Ok(MemberRole::Owner),
            "admin" => Ok(MemberRole::Admin),
            "member" => Ok(MemberRole::Member),
            other => Err(format!("Unknown member role '{}'", other)),
        }
    }
}

/// Read-only view of a group membership.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GroupMember {
    pub group_id: String,
    pub user_id: String,
    pub role: MemberRole,
    pub is_active: bool,
    pub joined_at: DateTime<Utc>,
}

/// Per-member progress summary for the current period view.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MemberProgressSummary {
    pub user_id: String,
    pub base_target: Decimal,
    pub target_amount: Decimal,
    pub current_amount: Decimal,
    pub penalty_carry_over: Decimal,
    pub remaining_amount: Decimal,
    pub progress_percentage: Decimal,
    pub is_completed: bool,
    pub days_active: usize,
    pub streak: u32,
    pub last_activity: Option<NaiveDate>,
    pub daily_entries: Vec<DailyEntry>,
}

impl From<&GroupGoalProgress> for MemberProgressSummary {
    fn from(row: &GroupGoalProgress) -> Self {
        Self {
            user_id: row.user_id.clone(),
            base_target: row.base_target(),
            target_amount: row.target_amount,
            current_amount: row.current_amount,
            penalty_carry_over: row.penalty_carry_over,
            remaining_amount: row.remaining_amount(),
            progress_percentage: row.progress_percentage(),
            is_completed: row.is_completed(),
            days_active: row.days_active(),
            streak: row.streak(),
            last_activity: row.last_activity(),
            daily_entries: row.daily_entries.clone(),
        }
    }
}

/// The active period of a goal together with every member's progress.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CurrentPeriodView {
    pub goal: GroupGoal,
    pub period: GroupGoalPeriod,
    pub days_remaining: i64,
    pub members: Vec<MemberProgressSummary>,
    pub total_progress: Decimal,
    pub average_progress: Decimal,
    pub completion_rate: Decimal,
}

/// Aggregate statistics of one period.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PeriodSummary {
    pub period: GroupGoalPeriod,
    pub participant_count: usize,
    pub completed_count: usize,
    pub completion_rate: Decimal,
    pub total_progress: Decimal,
    pub total_penalty_carried: Decimal,
}

/// Ranked view of a period's progress rows.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Leaderboard {
    pub group_goal_id: String,
    pub period_id: String,
    pub rankings: Vec<LeaderboardEntry>,
    pub generated_at: DateTime<Utc>,
}
