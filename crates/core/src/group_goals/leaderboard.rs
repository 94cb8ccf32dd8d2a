//! Leaderboard ranking over a period's progress rows.
//!
//! Sort order, highest priority first:
//! 1. completed rows before incomplete ones
//! 2. higher uncapped progress ratio
//! 3. lower inherited penalty
//! 4. member id ascending
//!
//! Only rows equal on all four keys share a rank (standard competition
//! ranking, e.g. 1, 1, 3). Member ids are unique within a period, so in
//! practice every member gets a distinct rank.

use std::cmp::Ordering;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::group_goals_model::GroupGoalProgress;
use crate::errors::ValidationError;

/// Points awarded per rank: `first_place - step * (rank - 1)`, never below
/// `minimum`. Points strictly decrease with rank until they reach `minimum`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PointsScheme {
    pub first_place: u32,
    pub step: u32,
    pub minimum: u32,
}

impl Default for PointsScheme {
    fn default() -> Self {
        Self {
            first_place: 100,
            step: 10,
            minimum: 0,
        }
    }
}

impl PointsScheme {
    /// Rejects schemes that would award the same points to every rank.
    pub fn validate(&self) -> std::result::Result<(), ValidationError> {
        if self.step == 0 {
            return Err(ValidationError::InvalidInput(
                "points step must be greater than zero".to_string(),
            ));
        }
        if self.minimum > self.first_place {
            return Err(ValidationError::InvalidInput(format!(
                "minimum points {} exceed first place points {}",
                self.minimum, self.first_place
            )));
        }
        Ok(())
    }

    pub fn points_for_rank(&self, rank: u32) -> u32 {
        let drop = self.step.saturating_mul(rank.saturating_sub(1));
        self.first_place.saturating_sub(drop).max(self.minimum)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntry {
    pub rank: u32,
    pub user_id: String,
    pub current_amount: Decimal,
    pub target_amount: Decimal,
    pub penalty_carry_over: Decimal,
    /// Capped at 100 for display.
    pub progress_percentage: Decimal,
    pub progress_ratio: Decimal,
    pub is_completed: bool,
    pub points: u32,
}

fn compare_standing(a: &GroupGoalProgress, b: &GroupGoalProgress) -> Ordering {
    b.is_completed()
        .cmp(&a.is_completed())
        .then_with(|| b.progress_ratio().cmp(&a.progress_ratio()))
        .then_with(|| a.penalty_carry_over.cmp(&b.penalty_carry_over))
        .then_with(|| a.user_id.cmp(&b.user_id))
}

/// Ranks a snapshot of progress rows. Pure: the same input always yields the
/// same output.
pub fn rank(rows: &[GroupGoalProgress], scheme: &PointsScheme) -> Vec<LeaderboardEntry> {
    let mut ordered: Vec<&GroupGoalProgress> = rows.iter().collect();
    ordered.sort_by(|a, b| compare_standing(a, b));

    let mut entries: Vec<LeaderboardEntry> = Vec::with_capacity(ordered.len());
    for (index, row) in ordered.iter().enumerate() {
        let rank = match (index, entries.last()) {
            (i, Some(prev_entry)) if compare_standing(ordered[i - 1], row) == Ordering::Equal => {
                prev_entry.rank
            }
            _ => index as u32 + 1,
        };
        entries.push(LeaderboardEntry {
            rank,
            user_id: row.user_id.clone(),
            current_amount: row.current_amount,
            target_amount: row.target_amount,
            penalty_carry_over: row.penalty_carry_over,
            progress_percentage: row.progress_percentage(),
            progress_ratio: row.progress_ratio(),
            is_completed: row.is_completed(),
            points: scheme.points_for_rank(rank),
        });
    }
    entries
}
