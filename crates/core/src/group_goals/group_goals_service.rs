use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{debug, warn};
use rust_decimal::Decimal;

use super::group_goals_errors::GroupGoalError;
use super::group_goals_model::{
    CurrentPeriodView, GroupGoal, GroupGoalPeriod, GroupGoalProgress, GroupGoalUpdate,
    GroupMember, Leaderboard, MemberProgressSummary, NewGroupGoal, PeriodSummary, ProgressEntry,
    RecordProgress,
};
use super::group_goals_traits::{
    EntitlementGateTrait, GroupGoalRepositoryTrait, GroupGoalServiceTrait, GroupMembershipTrait,
};
use super::leaderboard::{self, PointsScheme};
use super::orchestrator::PeriodTransitionOrchestrator;
use super::progress_ledger::{self, ProgressLedger};
use crate::errors::{Result, ValidationError};

/// Finest allowed target precision. Keeps `current / target` ratios in range
/// for any realistic progress amount.
const MAX_TARGET_SCALE: u32 = 6;

pub struct GroupGoalService {
    repository: Arc<dyn GroupGoalRepositoryTrait>,
    membership: Arc<dyn GroupMembershipTrait>,
    entitlement: Arc<dyn EntitlementGateTrait>,
    orchestrator: Arc<PeriodTransitionOrchestrator>,
    ledger: ProgressLedger,
    points: PointsScheme,
}

impl GroupGoalService {
    pub fn new(
        repository: Arc<dyn GroupGoalRepositoryTrait>,
        membership: Arc<dyn GroupMembershipTrait>,
        entitlement: Arc<dyn EntitlementGateTrait>,
        orchestrator: Arc<PeriodTransitionOrchestrator>,
        points: PointsScheme,
    ) -> Self {
        GroupGoalService {
            ledger: ProgressLedger::new(Arc::clone(&repository)),
            repository,
            membership,
            entitlement,
            orchestrator,
            points,
        }
    }

    fn require_member(&self, actor_id: &str, group_id: &str) -> Result<GroupMember> {
        match self.membership.get_member(group_id, actor_id)? {
            Some(member) if member.is_active => Ok(member),
            _ => Err(GroupGoalError::NotPermitted {
                user_id: actor_id.to_string(),
                action: format!("access group {}", group_id),
            }
            .into()),
        }
    }

    fn require_manager(&self, actor_id: &str, group_id: &str, action: &str) -> Result<()> {
        let member = self.require_member(actor_id, group_id)?;
        if !member.role.can_manage_goals() {
            return Err(GroupGoalError::NotPermitted {
                user_id: actor_id.to_string(),
                action: action.to_string(),
            }
            .into());
        }
        Ok(())
    }

    async fn require_entitled(&self, actor_id: &str) -> Result<()> {
        if !self.entitlement.is_entitled(actor_id).await? {
            return Err(GroupGoalError::NotEntitled(actor_id.to_string()).into());
        }
        Ok(())
    }

    /// Loads a goal and checks it belongs to `group_id`.
    fn load_goal(&self, group_id: &str, goal_id: &str) -> Result<GroupGoal> {
        let goal = self.repository.get_goal(goal_id)?;
        if goal.group_id != group_id {
            return Err(GroupGoalError::GoalNotFound(goal_id.to_string()).into());
        }
        Ok(goal)
    }

    fn active_period(&self, goal_id: &str) -> Result<GroupGoalPeriod> {
        self.repository
            .get_active_period(goal_id)?
            .ok_or_else(|| GroupGoalError::NoActivePeriod(goal_id.to_string()).into())
    }

    fn validate_target(amount: Decimal) -> Result<()> {
        if amount <= Decimal::ZERO || amount.normalize().scale() > MAX_TARGET_SCALE {
            return Err(GroupGoalError::InvalidTarget(amount).into());
        }
        Ok(())
    }

    fn validate_text(field: &str, value: &str) -> Result<()> {
        if value.trim().is_empty() {
            return Err(ValidationError::InvalidInput(format!("{} must not be empty", field)).into());
        }
        Ok(())
    }
}

#[async_trait]
impl GroupGoalServiceTrait for GroupGoalService {
    fn list_goals(&self, actor_id: &str, group_id: &str) -> Result<Vec<GroupGoal>> {
        self.require_member(actor_id, group_id)?;
        self.repository.list_goals_for_group(group_id)
    }

    fn get_goal(&self, actor_id: &str, group_id: &str, goal_id: &str) -> Result<GroupGoal> {
        self.require_member(actor_id, group_id)?;
        self.load_goal(group_id, goal_id)
    }

    async fn create_goal(
        &self,
        actor_id: &str,
        mut new_goal: NewGroupGoal,
        now: DateTime<Utc>,
    ) -> Result<GroupGoal> {
        Self::validate_text("name", &new_goal.name)?;
        Self::validate_text("unit", &new_goal.unit)?;
        Self::validate_target(new_goal.base_target)?;
        self.require_manager(actor_id, &new_goal.group_id, "create group goals")?;
        self.require_entitled(actor_id).await?;

        new_goal.created_by = actor_id.to_string();
        let goal = self.repository.insert_goal(new_goal).await?;
        debug!("Created group goal {} in group {}", goal.id, goal.group_id);

        // The first period opens right away; the sweep retries if this fails.
        if let Err(e) = self.orchestrator.transition_goal(&goal, now).await {
            warn!("Could not open first period of goal {}: {}", goal.id, e);
        }
        Ok(goal)
    }

    async fn update_goal(
        &self,
        actor_id: &str,
        group_id: &str,
        goal_id: &str,
        update: GroupGoalUpdate,
    ) -> Result<GroupGoal> {
        self.require_manager(actor_id, group_id, "update group goals")?;
        let goal = self.load_goal(group_id, goal_id)?;
        if update.period_type.is_some_and(|t| t != goal.period_type) {
            return Err(GroupGoalError::PeriodTypeImmutable.into());
        }
        if let Some(name) = &update.name {
            Self::validate_text("name", name)?;
        }
        if let Some(unit) = &update.unit {
            Self::validate_text("unit", unit)?;
        }
        self.repository.update_goal(goal_id, update).await
    }

    async fn set_base_target(
        &self,
        actor_id: &str,
        group_id: &str,
        goal_id: &str,
        amount: Decimal,
    ) -> Result<GroupGoal> {
        Self::validate_target(amount)?;
        self.require_manager(actor_id, group_id, "change goal targets")?;
        self.load_goal(group_id, goal_id)?;
        self.repository.set_base_target(goal_id, amount).await
    }

    async fn record_progress(
        &self,
        actor_id: &str,
        group_id: &str,
        goal_id: &str,
        input: RecordProgress,
        now: DateTime<Utc>,
    ) -> Result<GroupGoalProgress> {
        progress_ledger::validate_amount(input.amount)?;
        self.require_member(actor_id, group_id)?;
        self.require_entitled(actor_id).await?;
        let goal = self.load_goal(group_id, goal_id)?;
        let period = self.active_period(&goal.id)?;
        // An ended period is closed even before the sweep has finalized it.
        if period.has_ended(now) {
            return Err(GroupGoalError::PeriodClosed(period.id).into());
        }

        let entry = ProgressEntry {
            amount: input.amount,
            date: input.date.unwrap_or_else(|| now.date_naive()),
            note: input
                .note
                .map(|n| n.trim().to_string())
                .filter(|n| !n.is_empty()),
        };
        self.ledger
            .record_progress(&period.id, actor_id, entry)
            .await
    }

    fn get_current_period(
        &self,
        actor_id: &str,
        group_id: &str,
        goal_id: &str,
        now: DateTime<Utc>,
    ) -> Result<CurrentPeriodView> {
        self.require_member(actor_id, group_id)?;
        let goal = self.load_goal(group_id, goal_id)?;
        let period = self.active_period(&goal.id)?;
        let rows = self.repository.list_progress(&period.id)?;

        let mut members: Vec<MemberProgressSummary> =
            rows.iter().map(MemberProgressSummary::from).collect();
        members.sort_by(|a, b| {
            b.current_amount
                .cmp(&a.current_amount)
                .then_with(|| a.user_id.cmp(&b.user_id))
        });

        let total_progress = progress_ledger::total_progress(&rows);
        let average_progress = if members.is_empty() {
            Decimal::ZERO
        } else {
            let sum: Decimal = members.iter().map(|m| m.progress_percentage).sum();
            (sum / Decimal::from(members.len())).round_dp(2)
        };
        let completed = members.iter().filter(|m| m.is_completed).count();

        Ok(CurrentPeriodView {
            days_remaining: period.days_remaining(now),
            completion_rate: progress_ledger::percentage(completed, members.len()),
            goal,
            period,
            members,
            total_progress,
            average_progress,
        })
    }

    fn list_period_history(
        &self,
        actor_id: &str,
        group_id: &str,
        goal_id: &str,
    ) -> Result<Vec<PeriodSummary>> {
        self.require_member(actor_id, group_id)?;
        let goal = self.load_goal(group_id, goal_id)?;
        self.repository
            .list_periods(&goal.id)?
            .into_iter()
            .map(|period| {
                let rows = self.repository.list_progress(&period.id)?;
                Ok(progress_ledger::summarize_period(period, &rows))
            })
            .collect()
    }

    fn get_leaderboard(
        &self,
        actor_id: &str,
        group_id: &str,
        goal_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Leaderboard> {
        self.require_member(actor_id, group_id)?;
        let goal = self.load_goal(group_id, goal_id)?;
        let period = self.active_period(&goal.id)?;
        let rows = self.repository.list_progress(&period.id)?;
        Ok(Leaderboard {
            group_goal_id: goal.id,
            period_id: period.id,
            rankings: leaderboard::rank(&rows, &self.points),
            generated_at: now,
        })
    }
}
