//! Penalty carry-over between periods.

use std::collections::HashMap;

use rust_decimal::Decimal;

use super::group_goals_model::GroupGoalProgress;

/// Deficit carried from a finished row into the member's next target.
/// Overachievement never produces credit.
pub fn carry_over(row: &GroupGoalProgress) -> Decimal {
    (row.target_amount - row.current_amount).max(Decimal::ZERO)
}

/// Carry-over for every member of a finalized period, keyed by user id.
/// Members without a row are absent and therefore inherit nothing.
pub fn carry_over_by_member(rows: &[GroupGoalProgress]) -> HashMap<String, Decimal> {
    rows.iter()
        .map(|row| (row.user_id.clone(), carry_over(row)))
        .collect()
}

/// Total deficit carried out of a period, saturating at `Decimal::MAX`.
pub fn total_carry_over(rows: &[GroupGoalProgress]) -> Decimal {
    rows.iter()
        .fold(Decimal::ZERO, |acc, row| acc.saturating_add(carry_over(row)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn row(user: &str, target: Decimal, current: Decimal) -> GroupGoalProgress {
        GroupGoalProgress {
            id: format!("row-{}", user),
            period_id: "p1".to_string(),
            user_id: user.to_string(),
            target_amount: target,
            current_amount: current,
            penalty_carry_over: Decimal::ZERO,
            daily_entries: Vec::new(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn deficit_is_carried_over() {
        assert_eq!(carry_over(&row("x", dec!(10), dec!(8))), dec!(2));
    }

    #[test]
    fn overachievement_carries_nothing() {
        assert_eq!(carry_over(&row("y", dec!(10), dec!(12))), Decimal::ZERO);
        assert_eq!(carry_over(&row("z", dec!(10), dec!(10))), Decimal::ZERO);
    }

    #[test]
    fn carry_over_by_member_keys_every_row() {
        let rows = vec![row("x", dec!(10), dec!(8)), row("y", dec!(10), dec!(12))];
        let map = carry_over_by_member(&rows);
        assert_eq!(map.len(), 2);
        assert_eq!(map["x"], dec!(2));
        assert_eq!(map["y"], Decimal::ZERO);
        assert!(!map.contains_key("late-joiner"));
        assert_eq!(total_carry_over(&rows), dec!(2));
    }

    #[test]
    fn total_carry_over_saturates() {
        let rows = vec![
            row("x", Decimal::MAX, Decimal::ZERO),
            row("y", Decimal::MAX, dec!(1)),
        ];
        assert_eq!(total_carry_over(&rows), Decimal::MAX);
    }
}
