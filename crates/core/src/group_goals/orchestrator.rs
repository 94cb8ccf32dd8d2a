//! Period transitions.
//!
//! For every goal the orchestrator repeatedly looks at the latest period and
//! takes one step: finalize it once it has ended, open its successor with the
//! inherited penalties, or stop when the active period covers `now`. Running
//! the loop to completion backfills every period missed while the service was
//! down. Each step is a single atomic repository call, so an interrupted run
//! leaves a state the next run resumes from.
//!
//! ```text
//! sweep ──► goal A ──► finalize ─► open ─► finalize ─► open ─► done
//!       ├─► goal B ──► done
//!       └─► goal C ──► open ─► done
//! ```

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use log::{debug, error, info, warn};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use uuid::Uuid;

use super::group_goals_errors::GroupGoalError;
use super::group_goals_model::{
    GroupGoal, GroupGoalPeriod, GroupGoalProgress, NewGroupGoalPeriod, PeriodBounds,
};
use super::group_goals_traits::{GroupGoalRepositoryTrait, GroupMembershipTrait};
use super::penalty;
use super::period_calculator;
use super::progress_ledger::{seed_rows, ProgressLedger};
use crate::errors::{Error, Result};

/// Upper bound on steps for one goal in one run. A weekly goal would need
/// decades of downtime to reach it.
const MAX_STEPS_PER_GOAL: usize = 2_000;

/// The next thing to do for a goal, decided from its latest period alone.
#[derive(Debug, Clone, PartialEq)]
pub enum TransitionStep {
    /// The goal has never had a period.
    OpenFirst(PeriodBounds),
    /// The active period has ended.
    Finalize(GroupGoalPeriod),
    /// The latest period is finalized and the goal is still active.
    OpenNext {
        previous: GroupGoalPeriod,
        bounds: PeriodBounds,
    },
    /// Nothing to do.
    UpToDate,
}

/// Decides the next step for `goal`.
///
/// Deactivated goals still have an expired active period finalized, but no
/// successor is opened for them.
pub fn next_step(
    goal: &GroupGoal,
    latest: Option<&GroupGoalPeriod>,
    now: DateTime<Utc>,
) -> TransitionStep {
    match latest {
        None if goal.is_active => {
            TransitionStep::OpenFirst(period_calculator::bounds_for(goal.period_type, now))
        }
        None => TransitionStep::UpToDate,
        Some(period) if period.is_active => {
            if period.has_ended(now) {
                TransitionStep::Finalize(period.clone())
            } else {
                TransitionStep::UpToDate
            }
        }
        Some(period) if goal.is_active => TransitionStep::OpenNext {
            previous: period.clone(),
            bounds: period_calculator::next_after(goal.period_type, period.end_date),
        },
        Some(_) => TransitionStep::UpToDate,
    }
}

/// A step that was applied, or would be applied in a dry run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum TransitionAction {
    #[serde(rename_all = "camelCase")]
    Finalized {
        period_id: String,
        start_date: DateTime<Utc>,
        end_date: DateTime<Utc>,
        participants: usize,
        completed: usize,
        carry_over: BTreeMap<String, Decimal>,
    },
    #[serde(rename_all = "camelCase")]
    Opened {
        period_id: String,
        start_date: DateTime<Utc>,
        end_date: DateTime<Utc>,
        members: usize,
        /// The period had already ended when it was opened.
        backfilled: bool,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum GoalSweepStatus {
    UpToDate,
    Transitioned,
    /// Another run was already transitioning this goal.
    Busy,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GoalSweepResult {
    pub goal_id: String,
    pub status: GoalSweepStatus,
    pub actions: Vec<TransitionAction>,
    pub error: Option<String>,
}

/// Outcome of one sweep over all candidate goals.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SweepReport {
    pub started_at: DateTime<Utc>,
    pub dry_run: bool,
    pub goals_considered: usize,
    pub periods_finalized: usize,
    pub periods_opened: usize,
    pub goals_failed: usize,
    /// Goals never dispatched because the sweep was cancelled or timed out.
    pub skipped: Vec<String>,
    pub results: Vec<GoalSweepResult>,
}

impl SweepReport {
    fn from_results(
        started_at: DateTime<Utc>,
        dry_run: bool,
        goals_considered: usize,
        skipped: Vec<String>,
        mut results: Vec<GoalSweepResult>,
    ) -> Self {
        results.sort_by(|a, b| a.goal_id.cmp(&b.goal_id));
        let count = |pred: fn(&TransitionAction) -> bool| {
            results
                .iter()
                .flat_map(|r| r.actions.iter())
                .filter(|a| pred(a))
                .count()
        };
        Self {
            started_at,
            dry_run,
            goals_considered,
            periods_finalized: count(|a| matches!(a, TransitionAction::Finalized { .. })),
            periods_opened: count(|a| matches!(a, TransitionAction::Opened { .. })),
            goals_failed: results
                .iter()
                .filter(|r| r.status == GoalSweepStatus::Failed)
                .count(),
            skipped,
            results,
        }
    }
}

/// Options for one sweep.
#[derive(Debug, Clone, Default)]
pub struct SweepOptions {
    /// Compute the transitions without writing anything.
    pub dry_run: bool,
    /// Stop dispatching new goals after this long. In-flight goals finish.
    pub timeout: Option<Duration>,
}

/// Marks a goal as being transitioned. Released on drop.
struct GoalLockGuard {
    goal_id: String,
    in_flight: Arc<Mutex<HashSet<String>>>,
}

impl GoalLockGuard {
    fn try_acquire(in_flight: &Arc<Mutex<HashSet<String>>>, goal_id: &str) -> Option<Self> {
        let mut locks = in_flight.lock().unwrap_or_else(|e| e.into_inner());
        if !locks.insert(goal_id.to_string()) {
            return None;
        }
        Some(Self {
            goal_id: goal_id.to_string(),
            in_flight: Arc::clone(in_flight),
        })
    }
}

impl Drop for GoalLockGuard {
    fn drop(&mut self) {
        let mut locks = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        locks.remove(&self.goal_id);
    }
}

/// Drives period transitions for all goals.
pub struct PeriodTransitionOrchestrator {
    repository: Arc<dyn GroupGoalRepositoryTrait>,
    membership: Arc<dyn GroupMembershipTrait>,
    ledger: ProgressLedger,
    concurrency: usize,
    in_flight: Arc<Mutex<HashSet<String>>>,
}

impl PeriodTransitionOrchestrator {
    pub fn new(
        repository: Arc<dyn GroupGoalRepositoryTrait>,
        membership: Arc<dyn GroupMembershipTrait>,
        concurrency: usize,
    ) -> Self {
        Self {
            ledger: ProgressLedger::new(Arc::clone(&repository)),
            repository,
            membership,
            concurrency: concurrency.max(1),
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Runs every candidate goal up to `now`.
    ///
    /// Goals are processed concurrently, at most `concurrency` at a time. A
    /// failing goal is reported and logged; the others continue. Once
    /// `shutdown` flips to `true` or the timeout elapses no further goals are
    /// dispatched.
    pub async fn sweep(
        &self,
        now: DateTime<Utc>,
        options: SweepOptions,
        shutdown: Option<watch::Receiver<bool>>,
    ) -> Result<SweepReport> {
        let goals = self.repository.list_sweep_candidates()?;
        let goals_considered = goals.len();
        let all_ids: Vec<String> = goals.iter().map(|g| g.id.clone()).collect();
        let deadline = options.timeout.map(|t| Instant::now() + t);
        let dry_run = options.dry_run;

        info!(
            "Starting period sweep over {} goals{}",
            goals_considered,
            if dry_run { " (dry run)" } else { "" }
        );

        let results: Vec<GoalSweepResult> = stream::iter(goals)
            .take_while(|_| futures::future::ready(!should_stop(shutdown.as_ref(), deadline)))
            .map(|goal| self.sweep_goal(goal, now, dry_run))
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        let processed: HashSet<&str> = results.iter().map(|r| r.goal_id.as_str()).collect();
        let skipped: Vec<String> = all_ids
            .iter()
            .filter(|id| !processed.contains(id.as_str()))
            .cloned()
            .collect();
        if !skipped.is_empty() {
            warn!(
                "Period sweep stopped early; {} goals left for the next run",
                skipped.len()
            );
        }

        let report =
            SweepReport::from_results(now, dry_run, goals_considered, skipped, results);
        info!(
            "Period sweep finished: {} finalized, {} opened, {} failed",
            report.periods_finalized, report.periods_opened, report.goals_failed
        );
        Ok(report)
    }

    /// Transitions a single goal up to `now`.
    pub async fn transition_goal(
        &self,
        goal: &GroupGoal,
        now: DateTime<Utc>,
    ) -> Result<Vec<TransitionAction>> {
        let _guard = GoalLockGuard::try_acquire(&self.in_flight, &goal.id).ok_or_else(|| {
            GroupGoalError::GoalTransition {
                goal_id: goal.id.clone(),
                reason: "another transition is in progress".to_string(),
            }
        })?;
        self.run_goal(goal, now, false).await
    }

    /// Computes what a sweep would do for one goal, without writing.
    pub async fn plan_goal(
        &self,
        goal: &GroupGoal,
        now: DateTime<Utc>,
    ) -> Result<Vec<TransitionAction>> {
        self.run_goal(goal, now, true).await
    }

    async fn sweep_goal(&self, goal: GroupGoal, now: DateTime<Utc>, dry_run: bool) -> GoalSweepResult {
        let _guard = if dry_run {
            None
        } else {
            match GoalLockGuard::try_acquire(&self.in_flight, &goal.id) {
                Some(guard) => Some(guard),
                None => {
                    debug!("Goal {} is already being transitioned; skipping", goal.id);
                    return GoalSweepResult {
                        goal_id: goal.id,
                        status: GoalSweepStatus::Busy,
                        actions: Vec::new(),
                        error: None,
                    };
                }
            }
        };

        match self.run_goal(&goal, now, dry_run).await {
            Ok(actions) => GoalSweepResult {
                goal_id: goal.id,
                status: if actions.is_empty() {
                    GoalSweepStatus::UpToDate
                } else {
                    GoalSweepStatus::Transitioned
                },
                actions,
                error: None,
            },
            Err(e) => {
                let failure = GroupGoalError::GoalTransition {
                    goal_id: goal.id.clone(),
                    reason: e.to_string(),
                };
                error!("{}", failure);
                GoalSweepResult {
                    goal_id: goal.id,
                    status: GoalSweepStatus::Failed,
                    actions: Vec::new(),
                    error: Some(failure.to_string()),
                }
            }
        }
    }

    async fn run_goal(
        &self,
        goal: &GroupGoal,
        now: DateTime<Utc>,
        dry_run: bool,
    ) -> Result<Vec<TransitionAction>> {
        let mut actions = Vec::new();
        let mut latest = self.repository.get_latest_period(&goal.id)?;
        // Finalized snapshots and, in a dry run, rows of planned periods.
        let mut planned_rows: HashMap<String, Vec<GroupGoalProgress>> = HashMap::new();

        for _ in 0..MAX_STEPS_PER_GOAL {
            match next_step(goal, latest.as_ref(), now) {
                TransitionStep::UpToDate => return Ok(actions),
                TransitionStep::Finalize(period) => {
                    let rows = if dry_run {
                        match planned_rows.remove(&period.id) {
                            Some(rows) => rows,
                            None => self.repository.list_progress(&period.id)?,
                        }
                    } else {
                        self.ledger.finalize(&period.id).await?
                    };
                    let action = finalized_action(&period, &rows);
                    info!(
                        "Finalized period {} of goal {} ({} participants)",
                        period.id,
                        goal.id,
                        rows.len()
                    );
                    actions.push(action);
                    planned_rows.insert(period.id.clone(), rows);
                    latest = Some(GroupGoalPeriod {
                        is_active: false,
                        ..period
                    });
                }
                TransitionStep::OpenFirst(bounds) => {
                    let opened = self
                        .open(goal, bounds, now, HashMap::new(), now, dry_run, &mut planned_rows)
                        .await?;
                    latest = self.after_open(goal, opened, &mut actions, now)?;
                }
                TransitionStep::OpenNext { previous, bounds } => {
                    let previous_rows = match planned_rows.get(&previous.id) {
                        Some(rows) => rows.clone(),
                        None => self.repository.list_progress(&previous.id)?,
                    };
                    let penalties = penalty::carry_over_by_member(&previous_rows);
                    let opened = self
                        .open(
                            goal,
                            bounds,
                            bounds.start,
                            penalties,
                            now,
                            dry_run,
                            &mut planned_rows,
                        )
                        .await?;
                    latest = self.after_open(goal, opened, &mut actions, now)?;
                }
            }
        }

        Err(GroupGoalError::GoalTransition {
            goal_id: goal.id.clone(),
            reason: format!("exceeded {} transition steps", MAX_STEPS_PER_GOAL),
        }
        .into())
    }

    /// Records an opened period, or re-reads the latest period when another
    /// writer got there first.
    fn after_open(
        &self,
        goal: &GroupGoal,
        opened: Option<(GroupGoalPeriod, usize)>,
        actions: &mut Vec<TransitionAction>,
        now: DateTime<Utc>,
    ) -> Result<Option<GroupGoalPeriod>> {
        match opened {
            Some((period, members)) => {
                info!(
                    "Opened period {} of goal {} [{} .. {}) for {} members",
                    period.id, goal.id, period.start_date, period.end_date, members
                );
                actions.push(TransitionAction::Opened {
                    period_id: period.id.clone(),
                    start_date: period.start_date,
                    end_date: period.end_date,
                    members,
                    backfilled: period.has_ended(now),
                });
                Ok(Some(period))
            }
            None => {
                let latest = self.repository.get_latest_period(&goal.id)?;
                if latest.as_ref().map_or(true, |p| !p.is_active) {
                    return Err(GroupGoalError::GoalTransition {
                        goal_id: goal.id.clone(),
                        reason: "period was reported open but none is active".to_string(),
                    }
                    .into());
                }
                Ok(latest)
            }
        }
    }

    /// Opens a period for the members active at `members_as_of`. Returns
    /// `None` if the period was already opened by someone else.
    #[allow(clippy::too_many_arguments)]
    async fn open(
        &self,
        goal: &GroupGoal,
        bounds: PeriodBounds,
        members_as_of: DateTime<Utc>,
        penalties: HashMap<String, Decimal>,
        now: DateTime<Utc>,
        dry_run: bool,
        planned_rows: &mut HashMap<String, Vec<GroupGoalProgress>>,
    ) -> Result<Option<(GroupGoalPeriod, usize)>> {
        let members: Vec<String> = self
            .membership
            .list_active_members(&goal.group_id, members_as_of)?
            .into_iter()
            .map(|m| m.user_id)
            .collect();
        let new_period = NewGroupGoalPeriod {
            id: Uuid::new_v4().to_string(),
            group_goal_id: goal.id.clone(),
            start_date: bounds.start,
            end_date: bounds.end,
        };

        if dry_run {
            let rows: Vec<GroupGoalProgress> =
                seed_rows(&new_period.id, &members, goal.base_target, &penalties)?
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
            let count = rows.len();
            planned_rows.insert(new_period.id.clone(), rows);
            let period = GroupGoalPeriod {
                id: new_period.id,
                group_goal_id: new_period.group_goal_id,
                start_date: new_period.start_date,
                end_date: new_period.end_date,
                is_active: true,
                created_at: now,
            };
            return Ok(Some((period, count)));
        }

        match self
            .ledger
            .open(new_period, &members, goal.base_target, &penalties)
            .await
        {
            Ok((period, rows)) => Ok(Some((period, rows.len()))),
            Err(Error::GroupGoal(GroupGoalError::PeriodAlreadyOpen(_)))
            | Err(Error::GroupGoal(GroupGoalError::DuplicateRow { .. })) => {
                debug!(
                    "Period starting {} of goal {} was already opened",
                    bounds.start, goal.id
                );
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}

fn finalized_action(period: &GroupGoalPeriod, rows: &[GroupGoalProgress]) -> TransitionAction {
    TransitionAction::Finalized {
        period_id: period.id.clone(),
        start_date: period.start_date,
        end_date: period.end_date,
        participants: rows.len(),
        completed: rows.iter().filter(|r| r.is_completed()).count(),
        carry_over: penalty::carry_over_by_member(rows).into_iter().collect(),
    }
}

fn should_stop(shutdown: Option<&watch::Receiver<bool>>, deadline: Option<Instant>) -> bool {
    if shutdown.is_some_and(|rx| *rx.borrow()) {
        return true;
    }
    deadline.is_some_and(|d| Instant::now() >= d)
}
