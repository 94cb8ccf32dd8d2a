use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::errors::Result;
use crate::group_goals::group_goals_model::{
    CurrentPeriodView, GroupGoal, GroupGoalPeriod, GroupGoalProgress, GroupGoalUpdate,
    GroupMember, Leaderboard, NewGroupGoal, NewGroupGoalPeriod, NewProgressRow, PeriodSummary,
    ProgressEntry, RecordProgress,
};

/// Persistence of goals, periods and progress rows.
///
/// `open_period`, `record_progress` and `finalize_period` are each a single
/// atomic unit of work. `record_progress` and `finalize_period` are serialized
/// against each other, so no addition lands after a period's snapshot is taken.
#[async_trait]
pub trait GroupGoalRepositoryTrait: Send + Sync {
    fn get_goal(&self, goal_id: &str) -> Result<GroupGoal>;
    fn list_goals_for_group(&self, group_id: &str) -> Result<Vec<GroupGoal>>;
    /// Goals that are active or still have an active period.
    fn list_sweep_candidates(&self) -> Result<Vec<GroupGoal>>;
    async fn insert_goal(&self, new_goal: NewGroupGoal) -> Result<GroupGoal>;
    async fn update_goal(&self, goal_id: &str, update: GroupGoalUpdate) -> Result<GroupGoal>;
    async fn set_base_target(&self, goal_id: &str, base_target: Decimal) -> Result<GroupGoal>;

    fn get_period(&self, period_id: &str) -> Result<GroupGoalPeriod>;
    fn get_active_period(&self, goal_id: &str) -> Result<Option<GroupGoalPeriod>>;
    /// The period with the greatest start date, active or not.
    fn get_latest_period(&self, goal_id: &str) -> Result<Option<GroupGoalPeriod>>;
    /// All periods of a goal in chronological order.
    fn list_periods(&self, goal_id: &str) -> Result<Vec<GroupGoalPeriod>>;
    fn list_progress(&self, period_id: &str) -> Result<Vec<GroupGoalProgress>>;

    /// Inserts an active period and its seeded rows together. Fails with
    /// `PeriodAlreadyOpen` if the goal has an active period or one with the
    /// same start, and with `DuplicateRow` if a member row already exists.
    async fn open_period(
        &self,
        period: NewGroupGoalPeriod,
        rows: Vec<NewProgressRow>,
    ) -> Result<(GroupGoalPeriod, Vec<GroupGoalProgress>)>;

    /// Applies one addition with [`apply_entry`](super::progress_ledger::apply_entry)
    /// inside a transaction.
    async fn record_progress(
        &self,
        period_id: &str,
        user_id: &str,
        entry: ProgressEntry,
    ) -> Result<GroupGoalProgress>;

    /// Marks the period inactive and returns its rows as of that moment.
    /// Finalizing an already inactive period returns its rows unchanged.
    async fn finalize_period(&self, period_id: &str) -> Result<Vec<GroupGoalProgress>>;
}

/// Read-only view of group membership.
pub trait GroupMembershipTrait: Send + Sync {
    /// Members that were active and had joined at `as_of`.
    fn list_active_members(&self, group_id: &str, as_of: DateTime<Utc>)
        -> Result<Vec<GroupMember>>;
    fn get_member(&self, group_id: &str, user_id: &str) -> Result<Option<GroupMember>>;
}

/// Premium gate consulted before goal creation and progress recording.
#[async_trait]
pub trait EntitlementGateTrait: Send + Sync {
    async fn is_entitled(&self, user_id: &str) -> Result<bool>;
}

/// Group goal operations exposed to the API layer.
#[async_trait]
pub trait GroupGoalServiceTrait: Send + Sync {
    fn list_goals(&self, actor_id: &str, group_id: &str) -> Result<Vec<GroupGoal>>;
    fn get_goal(&self, actor_id: &str, group_id: &str, goal_id: &str) -> Result<GroupGoal>;
    async fn create_goal(
        &self,
        actor_id: &str,
        new_goal: NewGroupGoal,
        now: DateTime<Utc>,
    ) -> Result<GroupGoal>;
    async fn update_goal(
        &self,
        actor_id: &str,
        group_id: &str,
        goal_id: &str,
        update: GroupGoalUpdate,
    ) -> Result<GroupGoal>;
    async fn set_base_target(
        &self,
        actor_id: &str,
        group_id: &str,
        goal_id: &str,
        amount: Decimal,
    ) -> Result<GroupGoal>;
    async fn record_progress(
        &self,
        actor_id: &str,
        group_id: &str,
        goal_id: &str,
        input: RecordProgress,
        now: DateTime<Utc>,
    ) -> Result<GroupGoalProgress>;
    fn get_current_period(
        &self,
        actor_id: &str,
        group_id: &str,
        goal_id: &str,
        now: DateTime<Utc>,
    ) -> Result<CurrentPeriodView>;
    fn list_period_history(
        &self,
        actor_id: &str,
        group_id: &str,
        goal_id: &str,
    ) -> Result<Vec<PeriodSummary>>;
    fn get_leaderboard(
        &self,
        actor_id: &str,
        group_id: &str,
        goal_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Leaderboard>;
}
