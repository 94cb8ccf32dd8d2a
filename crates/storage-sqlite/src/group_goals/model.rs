//! Database models for group goals, periods and progress rows.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use diesel::prelude::*;

use chainforge_core::group_goals::{
    DailyEntry, GroupGoal, GroupGoalPeriod, GroupGoalProgress, GroupGoalUpdate, NewGroupGoal,
    NewGroupGoalPeriod, NewProgressRow,
};
use chainforge_core::Result;

use crate::utils::{format_date, format_instant, parse_date, parse_decimal, parse_instant};

/// Database model for group goals
#[derive(Queryable, Identifiable, Insertable, Selectable, PartialEq, Debug, Clone)]
#[diesel(table_name = crate::schema::group_goals)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct GroupGoalDB {
    pub id: String,
    pub group_id: String,
    pub name: String,
    pub description: Option<String>,
    pub unit: String,
    pub period_type: String,
    pub base_target: String,
    pub is_active: bool,
    pub created_by: String,
    pub created_at: String,
    pub updated_at: String,
}

impl GroupGoalDB {
    pub fn from_new(id: String, new_goal: NewGroupGoal, now: DateTime<Utc>) -> Self {
        let timestamp = format_instant(now);
        Self {
            id,
            group_id: new_goal.group_id,
            name: new_goal.name.trim().to_string(),
            description: new_goal.description,
            unit: new_goal.unit.trim().to_string(),
            period_type: new_goal.period_type.as_str().to_string(),
            base_target: new_goal.base_target.to_string(),
            is_active: true,
            created_by: new_goal.created_by,
            created_at: timestamp.clone(),
            updated_at: timestamp,
        }
    }
}

impl TryFrom<GroupGoalDB> for GroupGoal {
    type Error = chainforge_core::Error;

    fn try_from(db: GroupGoalDB) -> Result<Self> {
        Ok(Self {
            period_type: db.period_type.parse()?,
            base_target: parse_decimal(&db.base_target)?,
            created_at: parse_instant(&db.created_at)?,
            updated_at: parse_instant(&db.updated_at)?,
            id: db.id,
            group_id: db.group_id,
            name: db.name,
            description: db.description,
            unit: db.unit,
            is_active: db.is_active,
            created_by: db.created_by,
        })
    }
}

/// Partial update of a goal row. `None` fields are left untouched.
#[derive(AsChangeset, Debug, Clone, Default)]
#[diesel(table_name = crate::schema::group_goals)]
pub struct GroupGoalChangeset {
    pub name: Option<String>,
    pub description: Option<String>,
    pub unit: Option<String>,
    pub is_active: Option<bool>,
    pub base_target: Option<String>,
    pub updated_at: Option<String>,
}

impl GroupGoalChangeset {
    pub fn from_update(update: GroupGoalUpdate, now: DateTime<Utc>) -> Self {
        Self {
            name: update.name.map(|n| n.trim().to_string()),
            description: update.description,
            unit: update.unit.map(|u| u.trim().to_string()),
            is_active: update.is_active,
            base_target: None,
            updated_at: Some(format_instant(now)),
        }
    }
}

/// Database model for goal periods
#[derive(Queryable, Identifiable, Insertable, Selectable, PartialEq, Debug, Clone)]
#[diesel(table_name = crate::schema::group_goal_periods)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct GroupGoalPeriodDB {
    pub id: String,
    pub group_goal_id: String,
    pub start_date: String,
    pub end_date: String,
    pub is_active: bool,
    pub created_at: String,
}

impl GroupGoalPeriodDB {
    pub fn from_new(period: &NewGroupGoalPeriod, now: DateTime<Utc>) -> Self {
        Self {
            id: period.id.clone(),
            group_goal_id: period.group_goal_id.clone(),
            start_date: format_instant(period.start_date),
            end_date: format_instant(period.end_date),
            is_active: true,
            created_at: format_instant(now),
        }
    }
}

impl TryFrom<GroupGoalPeriodDB> for GroupGoalPeriod {
    type Error = chainforge_core::Error;

    fn try_from(db: GroupGoalPeriodDB) -> Result<Self> {
        Ok(Self {
            start_date: parse_instant(&db.start_date)?,
            end_date: parse_instant(&db.end_date)?,
            created_at: parse_instant(&db.created_at)?,
            id: db.id,
            group_goal_id: db.group_goal_id,
            is_active: db.is_active,
        })
    }
}

/// Database model for per-member progress rows
#[derive(Queryable, Identifiable, Insertable, Selectable, PartialEq, Debug, Clone)]
#[diesel(table_name = crate::schema::group_goal_progress)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct GroupGoalProgressDB {
    pub id: String,
    pub period_id: String,
    pub user_id: String,
    pub target_amount: String,
    pub current_amount: String,
    pub penalty_carry_over: String,
    pub created_at: String,
    pub updated_at: String,
}

impl GroupGoalProgressDB {
    pub fn from_new(row: &NewProgressRow, now: DateTime<Utc>) -> Self {
        let timestamp = format_instant(now);
        Self {
            id: row.id.clone(),
            period_id: row.period_id.clone(),
            user_id: row.user_id.clone(),
            target_amount: row.target_amount.to_string(),
            current_amount: "0".to_string(),
            penalty_carry_over: row.penalty_carry_over.to_string(),
            created_at: timestamp.clone(),
            updated_at: timestamp,
        }
    }

    /// Builds the domain row from this record and its daily entries.
    pub fn into_domain(self, entries: Vec<ProgressEntryDB>) -> Result<GroupGoalProgress> {
        let mut daily_entries = entries
            .into_iter()
            .map(DailyEntry::try_from)
            .collect::<Result<Vec<_>>>()?;
        daily_entries.sort_by_key(|e| e.date);
        Ok(GroupGoalProgress {
            target_amount: parse_decimal(&self.target_amount)?,
            current_amount: parse_decimal(&self.current_amount)?,
            penalty_carry_over: parse_decimal(&self.penalty_carry_over)?,
            created_at: parse_instant(&self.created_at)?,
            updated_at: parse_instant(&self.updated_at)?,
            id: self.id,
            period_id: self.period_id,
            user_id: self.user_id,
            daily_entries,
        })
    }
}

/// Database model for one day of progress
#[derive(Queryable, Insertable, Selectable, PartialEq, Debug, Clone)]
#[diesel(table_name = crate::schema::group_goal_progress_entries)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct ProgressEntryDB {
    pub progress_id: String,
    pub entry_date: String,
    pub amount: String,
    pub note: Option<String>,
}

impl ProgressEntryDB {
    pub fn from_domain(progress_id: &str, entry: &DailyEntry) -> Self {
        Self {
            progress_id: progress_id.to_string(),
            entry_date: format_date(entry.date),
            amount: entry.amount.to_string(),
            note: entry.note.clone(),
        }
    }
}

impl TryFrom<ProgressEntryDB> for DailyEntry {
    type Error = chainforge_core::Error;

    fn try_from(db: ProgressEntryDB) -> Result<Self> {
        Ok(Self {
            date: parse_date(&db.entry_date)?,
            amount: parse_decimal(&db.amount)?,
            note: db.note,
        })
    }
}

/// Groups entry records by progress row id.
pub fn group_entries(entries: Vec<ProgressEntryDB>) -> HashMap<String, Vec<ProgressEntryDB>> {
    let mut by_row: HashMap<String, Vec<ProgressEntryDB>> = HashMap::new();
    for entry in entries {
        by_row
            .entry(entry.progress_id.clone())
            .or_default()
            .push(entry);
    }
    by_row
}
