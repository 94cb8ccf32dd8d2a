use chrono::NaiveDate;
use rust_decimal::Decimal;
use thiserror::Error;

/// Errors raised by the group goal period engine.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GroupGoalError {
    /// Negative progress amounts are rejected outright and never retried.
    #[error("Invalid progress amount {0}: amounts must not be negative")]
    InvalidAmount(Decimal),

    /// Write against a finalized period.
    #[error("Period {0} is closed and no longer accepts progress")]
    PeriodClosed(String),

    /// A progress row already exists for this (period, member) pair.
    #[error("Progress row already exists for member {user_id} in period {period_id}")]
    DuplicateRow { period_id: String, user_id: String },

    /// The sweep failed for one goal; the goal is retried on the next tick.
    #[error("Period transition failed for goal {goal_id}: {reason}")]
    GoalTransition { goal_id: String, reason: String },

    #[error("Group goal {0} not found")]
    GoalNotFound(String),

    #[error("Period {0} not found")]
    PeriodNotFound(String),

    /// Another period of the goal is still active, or one with the same start
    /// already exists.
    #[error("Group goal {0} already has an open period for this interval")]
    PeriodAlreadyOpen(String),

    #[error("Group goal {0} has no active period")]
    NoActivePeriod(String),

    /// The member has no row in the period, e.g. they joined after it opened.
    #[error("Member {user_id} is not participating in period {period_id}")]
    ProgressRowNotFound { period_id: String, user_id: String },

    #[error("Entry date {date} falls outside period {period_id}")]
    EntryOutsidePeriod { period_id: String, date: NaiveDate },

    /// Adding `amount` to `total` would leave the representable range.
    #[error("Amount {amount} cannot be added to {total} without overflowing")]
    AmountOverflow { total: Decimal, amount: Decimal },

    #[error(
        "Invalid target amount {0}: targets must be greater than zero with at most 6 decimal places"
    )]
    InvalidTarget(Decimal),

    #[error("The period type of a group goal cannot be changed after creation")]
    PeriodTypeImmutable,

    #[error("Invalid period type '{0}'")]
    InvalidPeriodType(String),

    #[error("User {user_id} is not permitted to {action}")]
    NotPermitted { user_id: String, action: String },

    #[error("User {0} is not entitled to use group goals")]
    NotEntitled(String),
}
