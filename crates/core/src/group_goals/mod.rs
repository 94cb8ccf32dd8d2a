//! Group goals module - recurring shared goals with per-member progress,
//! penalty carry-over between periods and a per-period leaderboard.

mod group_goals_errors;
mod group_goals_model;
mod group_goals_service;
mod group_goals_traits;
pub mod leaderboard;
pub mod orchestrator;
pub mod penalty;
pub mod period_calculator;
pub mod progress_ledger;

#[cfg(test)]
mod in_memory_repository;



pub use group_goals_errors::GroupGoalError;
pub use group_goals_model::{
    CurrentPeriodView, DailyEntry, GroupGoal, GroupGoalPeriod, GroupGoalProgress,
    GroupGoalUpdate, GroupMember, Leaderboard, MemberProgressSummary, MemberRole, NewGroupGoal,
    NewGroupGoalPeriod, NewProgressRow, PeriodBounds, PeriodSummary, PeriodType, ProgressEntry,
    RecordProgress,
};
pub use group_goals_service::GroupGoalService;
pub use group_goals_traits::{
    EntitlementGateTrait, GroupGoalRepositoryTrait, GroupGoalServiceTrait, GroupMembershipTrait,
};
pub use leaderboard::{LeaderboardEntry, PointsScheme};
pub use orchestrator::{
    GoalSweepResult, GoalSweepStatus, PeriodTransitionOrchestrator, SweepOptions, SweepReport,
    TransitionAction,
};
pub use progress_ledger::ProgressLedger;
