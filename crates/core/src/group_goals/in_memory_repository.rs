//! In-memory collaborators shared by the service and orchestrator tests.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use super::group_goals_errors::GroupGoalError;
use super::group_goals_model::{
    GroupGoal, GroupGoalPeriod, GroupGoalProgress, GroupGoalUpdate, GroupMember, MemberRole,
    NewGroupGoal, NewGroupGoalPeriod, NewProgressRow, ProgressEntry,
};
use super::group_goals_traits::{
    EntitlementGateTrait, GroupGoalRepositoryTrait, GroupMembershipTrait,
};
use super::progress_ledger::apply_entry;
use crate::errors::{Error, Result};

#[derive(Default)]
struct State {
    goals: HashMap<String, GroupGoal>,
    periods: Vec<GroupGoalPeriod>,
    rows: Vec<GroupGoalProgress>,
    failing_goals: HashSet<String>,
}

/// Repository holding everything in one mutex, so every write is atomic.
#[derive(Default)]
pub struct InMemoryGroupGoalRepository {
    state: Mutex<State>,
}

impl InMemoryGroupGoalRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_goal(&self, goal: GroupGoal) {
        self.state.lock().unwrap().goals.insert(goal.id.clone(), goal);
    }

    /// Makes every `open_period` call for the goal fail.
    pub fn fail_goal(&self, goal_id: &str) {
        self.state
            .lock()
            .unwrap()
            .failing_goals
            .insert(goal_id.to_string());
    }

    pub fn periods_of(&self, goal_id: &str) -> Vec<GroupGoalPeriod> {
        let mut periods: Vec<GroupGoalPeriod> = self
            .state
            .lock()
            .unwrap()
            .periods
            .iter()
            .filter(|p| p.group_goal_id == goal_id)
            .cloned()
            .collect();
        periods.sort_by_key(|p| p.start_date);
        periods
    }

    pub fn row(&self, period_id: &str, user_id: &str) -> GroupGoalProgress {
        self.state
            .lock()
            .unwrap()
            .rows
            .iter()
            .find(|r| r.period_id == period_id && r.user_id == user_id)
            .cloned()
            .unwrap()
    }
}

#[async_trait]
impl GroupGoalRepositoryTrait for InMemoryGroupGoalRepository {
    fn get_goal(&self, goal_id: &str) -> Result<GroupGoal> {
        self.state
            .lock()
            .unwrap()
            .goals
            .get(goal_id)
            .cloned()
            .ok_or_else(|| GroupGoalError::GoalNotFound(goal_id.to_string()).into())
    }

    fn list_goals_for_group(&self, group_id: &str) -> Result<Vec<GroupGoal>> {
        let mut goals: Vec<GroupGoal> = self
            .state
            .lock()
            .unwrap()
            .goals
            .values()
            .filter(|g| g.group_id == group_id)
            .cloned()
            .collect();
        goals.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(goals)
    }

    fn list_sweep_candidates(&self) -> Result<Vec<GroupGoal>> {
        let state = self.state.lock().unwrap();
        let mut goals: Vec<GroupGoal> = state
            .goals
            .values()
            .filter(|g| {
                g.is_active
                    || state
                        .periods
                        .iter()
                        .any(|p| p.group_goal_id == g.id && p.is_active)
            })
            .cloned()
            .collect();
        goals.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(goals)
    }

    async fn insert_goal(&self, new_goal: NewGroupGoal) -> Result<GroupGoal> {
        let now = Utc::now();
        let goal = GroupGoal {
            id: new_goal
                .id
                .unwrap_or_else(|| format!("goal-{}", uuid::Uuid::new_v4())),
            group_id: new_goal.group_id,
            name: new_goal.name,
            description: new_goal.description,
            unit: new_goal.unit,
            period_type: new_goal.period_type,
            base_target: new_goal.base_target,
            is_active: true,
            created_by: new_goal.created_by,
            created_at: now,
            updated_at: now,
        };
        self.put_goal(goal.clone());
        Ok(goal)
    }

    async fn update_goal(&self, goal_id: &str, update: GroupGoalUpdate) -> Result<GroupGoal> {
        let mut state = self.state.lock().unwrap();
        let goal = state
            .goals
            .get_mut(goal_id)
            .ok_or_else(|| Error::from(GroupGoalError::GoalNotFound(goal_id.to_string())))?;
        if let Some(name) = update.name {
            goal.name = name;
        }
        if let Some(description) = update.description {
            goal.description = Some(description);
        }
        if let Some(unit) = update.unit {
            goal.unit = unit;
        }
        if let Some(is_active) = update.is_active {
            goal.is_active = is_active;
        }
        Ok(goal.clone())
    }

    async fn set_base_target(&self, goal_id: &str, base_target: Decimal) -> Result<GroupGoal> {
        let mut state = self.state.lock().unwrap();
        let goal = state
            .goals
            .get_mut(goal_id)
            .ok_or_else(|| Error::from(GroupGoalError::GoalNotFound(goal_id.to_string())))?;
        goal.base_target = base_target;
        Ok(goal.clone())
    }

    fn get_period(&self, period_id: &str) -> Result<GroupGoalPeriod> {
        self.state
            .lock()
            .unwrap()
            .periods
            .iter()
            .find(|p| p.id == period_id)
            .cloned()
            .ok_or_else(|| GroupGoalError::PeriodNotFound(period_id.to_string()).into())
    }

    fn get_active_period(&self, goal_id: &str) -> Result<Option<GroupGoalPeriod>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .periods
            .iter()
            .find(|p| p.group_goal_id == goal_id && p.is_active)
            .cloned())
    }

    fn get_latest_period(&self, goal_id: &str) -> Result<Option<GroupGoalPeriod>> {
        Ok(self.periods_of(goal_id).pop())
    }

    fn list_periods(&self, goal_id: &str) -> Result<Vec<GroupGoalPeriod>> {
        Ok(self.periods_of(goal_id))
    }

    fn list_progress(&self, period_id: &str) -> Result<Vec<GroupGoalProgress>> {
        let mut rows: Vec<GroupGoalProgress> = self
            .state
            .lock()
            .unwrap()
            .rows
            .iter()
            .filter(|r| r.period_id == period_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.user_id.cmp(&b.user_id));
        Ok(rows)
    }

    async fn open_period(
        &self,
        period: NewGroupGoalPeriod,
        rows: Vec<NewProgressRow>,
    ) -> Result<(GroupGoalPeriod, Vec<GroupGoalProgress>)> {
        let mut state = self.state.lock().unwrap();
        if state.failing_goals.contains(&period.group_goal_id) {
            return Err(Error::Repository("simulated storage failure".to_string()));
        }
        if state.periods.iter().any(|p| {
            p.group_goal_id == period.group_goal_id
                && (p.is_active || p.start_date == period.start_date)
        }) {
            return Err(GroupGoalError::PeriodAlreadyOpen(period.group_goal_id).into());
        }
        for row in &rows {
            if state
                .rows
                .iter()
                .any(|r| r.period_id == row.period_id && r.user_id == row.user_id)
            {
                return Err(GroupGoalError::DuplicateRow {
                    period_id: row.period_id.clone(),
                    user_id: row.user_id.clone(),
                }
                .into());
            }
        }

        let now = Utc::now();
        let created = GroupGoalPeriod {
            id: period.id,
            group_goal_id: period.group_goal_id,
            start_date: period.start_date,
            end_date: period.end_date,
            is_active: true,
            created_at: now,
        };
        let seeded: Vec<GroupGoalProgress> = rows
            .into_iter()
            .map(|row| GroupGoalProgress {
                id: row.id,
                period_id: row.period_id,
                user_id: row.user_id,
                target_amount: row.target_amount,
                current_amount: Decimal::ZERO,
                penalty_carry_over: row.penalty_carry_over,
                daily_entries: Vec::new(),
                created_at: now,
                updated_at: now,
            })
            .collect();
        state.periods.push(created.clone());
        state.rows.extend(seeded.iter().cloned());
        Ok((created, seeded))
    }

    async fn record_progress(
        &self,
        period_id: &str,
        user_id: &str,
        entry: ProgressEntry,
    ) -> Result<GroupGoalProgress> {
        let mut state = self.state.lock().unwrap();
        let period = state
            .periods
            .iter()
            .find(|p| p.id == period_id)
            .cloned()
            .ok_or_else(|| Error::from(GroupGoalError::PeriodNotFound(period_id.to_string())))?;
        let row = state
            .rows
            .iter_mut()
            .find(|r| r.period_id == period_id && r.user_id == user_id)
            .ok_or_else(|| {
                Error::from(GroupGoalError::ProgressRowNotFound {
                    period_id: period_id.to_string(),
                    user_id: user_id.to_string(),
                })
            })?;
        apply_entry(&period, row, &entry, Utc::now())?;
        Ok(row.clone())
    }

    async fn finalize_period(&self, period_id: &str) -> Result<Vec<GroupGoalProgress>> {
        {
            let mut state = self.state.lock().unwrap();
            let period = state
                .periods
                .iter_mut()
                .find(|p| p.id == period_id)
                .ok_or_else(|| {
                    Error::from(GroupGoalError::PeriodNotFound(period_id.to_string()))
                })?;
            period.is_active = false;
        }
        self.list_progress(period_id)
    }
}

/// Membership fixture. Members are `(user, role, joined_at)`.
#[derive(Default)]
pub struct InMemoryMembership {
    members: Mutex<Vec<GroupMember>>,
}

impl InMemoryMembership {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, group_id: &str, user_id: &str, role: MemberRole, joined_at: DateTime<Utc>) {
        self.members.lock().unwrap().push(GroupMember {
            group_id: group_id.to_string(),
            user_id: user_id.to_string(),
            role,
            is_active: true,
            joined_at,
        });
    }
}

impl GroupMembershipTrait for InMemoryMembership {
    fn list_active_members(
        &self,
        group_id: &str,
        as_of: DateTime<Utc>,
    ) -> Result<Vec<GroupMember>> {
        Ok(self
            .members
            .lock()
            .unwrap()
            .iter()
            .filter(|m| m.group_id == group_id && m.is_active && m.joined_at <= as_of)
            .cloned()
            .collect())
    }

    fn get_member(&self, group_id: &str, user_id: &str) -> Result<Option<GroupMember>> {
        Ok(self
            .members
            .lock()
            .unwrap()
            .iter()
            .find(|m| m.group_id == group_id && m.user_id == user_id)
            .cloned())
    }
}

/// Entitles everyone except the listed users.
#[derive(Default)]
pub struct DenyListEntitlement {
    pub denied: HashSet<String>,
}

#[async_trait]
impl EntitlementGateTrait for DenyListEntitlement {
    async fn is_entitled(&self, user_id: &str) -> Result<bool> {
        Ok(!self.denied.contains(user_id))
    }
}
