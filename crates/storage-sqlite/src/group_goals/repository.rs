use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use diesel::prelude::*;
use diesel::SqliteConnection;
use log::debug;
use rust_decimal::Decimal;
use uuid::Uuid;

use chainforge_core::group_goals::progress_ledger::apply_entry;
use chainforge_core::group_goals::{
    GroupGoal, GroupGoalError, GroupGoalPeriod, GroupGoalProgress, GroupGoalRepositoryTrait,
    GroupGoalUpdate, NewGroupGoal, NewGroupGoalPeriod, NewProgressRow, ProgressEntry,
};
use chainforge_core::{Error, Result};

use super::model::{
    group_entries, GroupGoalChangeset, GroupGoalDB, GroupGoalPeriodDB, GroupGoalProgressDB,
    ProgressEntryDB,
};
use crate::db::{get_connection, DbPool, WriteHandle};
use crate::errors::{is_unique_violation, IntoCore, StorageError};
use crate::schema::{group_goal_periods, group_goal_progress, group_goal_progress_entries, group_goals};
use crate::utils::{chunk_for_sqlite, format_date, format_instant};

pub struct GroupGoalRepository {
    pool: Arc<DbPool>,
    writer: WriteHandle,
}

impl GroupGoalRepository {
    pub fn new(pool: Arc<DbPool>, writer: WriteHandle) -> Self {
        GroupGoalRepository { pool, writer }
    }
}

fn find_goal(conn: &mut SqliteConnection, goal_id: &str) -> Result<GroupGoal> {
    group_goals::table
        .find(goal_id)
        .select(GroupGoalDB::as_select())
        .first(conn)
        .optional()
        .into_core()?
        .ok_or_else(|| Error::from(GroupGoalError::GoalNotFound(goal_id.to_string())))?
        .try_into()
}

fn find_period(conn: &mut SqliteConnection, period_id: &str) -> Result<GroupGoalPeriod> {
    group_goal_periods::table
        .find(period_id)
        .select(GroupGoalPeriodDB::as_select())
        .first(conn)
        .optional()
        .into_core()?
        .ok_or_else(|| Error::from(GroupGoalError::PeriodNotFound(period_id.to_string())))?
        .try_into()
}

/// Loads progress records together with their daily entries.
fn attach_entries(
    conn: &mut SqliteConnection,
    records: Vec<GroupGoalProgressDB>,
) -> Result<Vec<GroupGoalProgress>> {
    let ids: Vec<String> = records.iter().map(|r| r.id.clone()).collect();
    let mut entries = Vec::new();
    for chunk in chunk_for_sqlite(&ids) {
        let loaded = group_goal_progress_entries::table
            .filter(group_goal_progress_entries::progress_id.eq_any(chunk))
            .select(ProgressEntryDB::as_select())
            .load(conn)
            .into_core()?;
        entries.extend(loaded);
    }
    let mut by_row = group_entries(entries);
    records
        .into_iter()
        .map(|record| {
            let row_entries = by_row.remove(&record.id).unwrap_or_default();
            record.into_domain(row_entries)
        })
        .collect()
}

fn load_rows(conn: &mut SqliteConnection, period_id: &str) -> Result<Vec<GroupGoalProgress>> {
    let records = group_goal_progress::table
        .filter(group_goal_progress::period_id.eq(period_id))
        .order(group_goal_progress::user_id.asc())
        .select(GroupGoalProgressDB::as_select())
        .load(conn)
        .into_core()?;
    attach_entries(conn, records)
}

fn load_row(
    conn: &mut SqliteConnection,
    period_id: &str,
    user_id: &str,
) -> Result<GroupGoalProgress> {
    let record = group_goal_progress::table
        .filter(group_goal_progress::period_id.eq(period_id))
        .filter(group_goal_progress::user_id.eq(user_id))
        .select(GroupGoalProgressDB::as_select())
        .first(conn)
        .optional()
        .into_core()?
        .ok_or_else(|| {
            Error::from(GroupGoalError::ProgressRowNotFound {
                period_id: period_id.to_string(),
                user_id: user_id.to_string(),
            })
        })?;
    attach_entries(conn, vec![record])?
        .pop()
        .ok_or_else(|| Error::Repository(format!("progress row of {} vanished", user_id)))
}

#[async_trait]
impl GroupGoalRepositoryTrait for GroupGoalRepository {
    fn get_goal(&self, goal_id: &str) -> Result<GroupGoal> {
        let mut conn = get_connection(&self.pool)?;
        find_goal(&mut conn, goal_id)
    }

    fn list_goals_for_group(&self, group_id: &str) -> Result<Vec<GroupGoal>> {
        let mut conn = get_connection(&self.pool)?;
        let records = group_goals::table
            .filter(group_goals::group_id.eq(group_id))
            .order(group_goals::created_at.asc())
            .select(GroupGoalDB::as_select())
            .load(&mut conn)
            .into_core()?;
        records.into_iter().map(GroupGoal::try_from).collect()
    }

    fn list_sweep_candidates(&self) -> Result<Vec<GroupGoal>> {
        let mut conn = get_connection(&self.pool)?;
        let with_open_period: Vec<String> = group_goal_periods::table
            .filter(group_goal_periods::is_active.eq(true))
            .select(group_goal_periods::group_goal_id)
            .load(&mut conn)
            .into_core()?;
        let records = group_goals::table
            .filter(
                group_goals::is_active
                    .eq(true)
                    .or(group_goals::id.eq_any(with_open_period)),
            )
            .order(group_goals::id.asc())
            .select(GroupGoalDB::as_select())
            .load(&mut conn)
            .into_core()?;
        records.into_iter().map(GroupGoal::try_from).collect()
    }

    async fn insert_goal(&self, new_goal: NewGroupGoal) -> Result<GroupGoal> {
        self.writer
            .exec(move |conn: &mut SqliteConnection| -> Result<GroupGoal> {
                let id = new_goal
                    .id
                    .clone()
                    .unwrap_or_else(|| Uuid::new_v4().to_string());
                let record = GroupGoalDB::from_new(id, new_goal, Utc::now());
                let inserted = diesel::insert_into(group_goals::table)
                    .values(&record)
                    .returning(GroupGoalDB::as_returning())
                    .get_result(conn)
                    .map_err(StorageError::from)?;
                inserted.try_into()
            })
            .await
    }

    async fn update_goal(&self, goal_id: &str, update: GroupGoalUpdate) -> Result<GroupGoal> {
        let goal_id = goal_id.to_string();
        self.writer
            .exec(move |conn: &mut SqliteConnection| -> Result<GroupGoal> {
                let changes = GroupGoalChangeset::from_update(update, Utc::now());
                let updated = diesel::update(group_goals::table.find(&goal_id))
                    .set(&changes)
                    .execute(conn)
                    .map_err(StorageError::from)?;
                if updated == 0 {
                    return Err(GroupGoalError::GoalNotFound(goal_id).into());
                }
                find_goal(conn, &goal_id)
            })
            .await
    }

    async fn set_base_target(&self, goal_id: &str, base_target: Decimal) -> Result<GroupGoal> {
        let goal_id = goal_id.to_string();
        self.writer
            .exec(move |conn: &mut SqliteConnection| -> Result<GroupGoal> {
                let changes = GroupGoalChangeset {
                    base_target: Some(base_target.to_string()),
                    updated_at: Some(format_instant(Utc::now())),
                    ..Default::default()
                };
                let updated = diesel::update(group_goals::table.find(&goal_id))
                    .set(&changes)
                    .execute(conn)
                    .map_err(StorageError::from)?;
                if updated == 0 {
                    return Err(GroupGoalError::GoalNotFound(goal_id).into());
                }
                find_goal(conn, &goal_id)
            })
            .await
    }

    fn get_period(&self, period_id: &str) -> Result<GroupGoalPeriod> {
        let mut conn = get_connection(&self.pool)?;
        find_period(&mut conn, period_id)
    }

    fn get_active_period(&self, goal_id: &str) -> Result<Option<GroupGoalPeriod>> {
        let mut conn = get_connection(&self.pool)?;
        group_goal_periods::table
            .filter(group_goal_periods::group_goal_id.eq(goal_id))
            .filter(group_goal_periods::is_active.eq(true))
            .select(GroupGoalPeriodDB::as_select())
            .first(&mut conn)
            .optional()
            .into_core()?
            .map(GroupGoalPeriod::try_from)
            .transpose()
    }

    fn get_latest_period(&self, goal_id: &str) -> Result<Option<GroupGoalPeriod>> {
        let mut conn = get_connection(&self.pool)?;
        group_goal_periods::table
            .filter(group_goal_periods::group_goal_id.eq(goal_id))
            .order(group_goal_periods::start_date.desc())
            .select(GroupGoalPeriodDB::as_select())
            .first(&mut conn)
            .optional()
            .into_core()?
            .map(GroupGoalPeriod::try_from)
            .transpose()
    }

    fn list_periods(&self, goal_id: &str) -> Result<Vec<GroupGoalPeriod>> {
        let mut conn = get_connection(&self.pool)?;
        group_goal_periods::table
            .filter(group_goal_periods::group_goal_id.eq(goal_id))
            .order(group_goal_periods::start_date.asc())
            .select(GroupGoalPeriodDB::as_select())
            .load(&mut conn)
            .into_core()?
            .into_iter()
            .map(GroupGoalPeriod::try_from)
            .collect()
    }

    fn list_progress(&self, period_id: &str) -> Result<Vec<GroupGoalProgress>> {
        let mut conn = get_connection(&self.pool)?;
        load_rows(&mut conn, period_id)
    }

    async fn open_period(
        &self,
        period: NewGroupGoalPeriod,
        rows: Vec<NewProgressRow>,
    ) -> Result<(GroupGoalPeriod, Vec<GroupGoalProgress>)> {
        self.writer
            .exec(
                move |conn: &mut SqliteConnection| -> Result<(GroupGoalPeriod, Vec<GroupGoalProgress>)> {
                    let start = format_instant(period.start_date);
                    let conflicting: i64 = group_goal_periods::table
                        .filter(group_goal_periods::group_goal_id.eq(&period.group_goal_id))
                        .filter(
                            group_goal_periods::is_active
                                .eq(true)
                                .or(group_goal_periods::start_date.eq(&start)),
                        )
                        .count()
                        .get_result(conn)
                        .map_err(StorageError::from)?;
                    if conflicting > 0 {
                        return Err(
                            GroupGoalError::PeriodAlreadyOpen(period.group_goal_id.clone()).into(),
                        );
                    }

                    let mut seen = HashSet::new();
                    if let Some(dup) = rows.iter().find(|r| !seen.insert(r.user_id.as_str())) {
                        return Err(GroupGoalError::DuplicateRow {
                            period_id: dup.period_id.clone(),
                            user_id: dup.user_id.clone(),
                        }
                        .into());
                    }

                    let now = Utc::now();
                    let period_record = GroupGoalPeriodDB::from_new(&period, now);
                    diesel::insert_into(group_goal_periods::table)
                        .values(&period_record)
                        .execute(conn)
                        .map_err(|e| {
                            if is_unique_violation(&e) {
                                Error::from(GroupGoalError::PeriodAlreadyOpen(
                                    period.group_goal_id.clone(),
                                ))
                            } else {
                                StorageError::from(e).into()
                            }
                        })?;

                    let row_records: Vec<GroupGoalProgressDB> = rows
                        .iter()
                        .map(|row| GroupGoalProgressDB::from_new(row, now))
                        .collect();
                    for chunk in row_records.chunks(100) {
                        diesel::insert_into(group_goal_progress::table)
                            .values(chunk)
                            .execute(conn)
                            .map_err(|e| {
                                if is_unique_violation(&e) {
                                    Error::from(GroupGoalError::DuplicateRow {
                                        period_id: period.id.clone(),
                                        user_id: chunk
                                            .first()
                                            .map(|r| r.user_id.clone())
                                            .unwrap_or_default(),
                                    })
                                } else {
                                    StorageError::from(e).into()
                                }
                            })?;
                    }

                    debug!(
                        "Opened period {} with {} progress rows",
                        period.id,
                        row_records.len()
                    );
                    let opened = find_period(conn, &period.id)?;
                    let seeded = load_rows(conn, &period.id)?;
                    Ok((opened, seeded))
                },
            )
            .await
    }

    async fn record_progress(
        &self,
        period_id: &str,
        user_id: &str,
        entry: ProgressEntry,
    ) -> Result<GroupGoalProgress> {
        let period_id = period_id.to_string();
        let user_id = user_id.to_string();
        self.writer
            .exec(move |conn: &mut SqliteConnection| -> Result<GroupGoalProgress> {
                let period = find_period(conn, &period_id)?;
                let mut row = load_row(conn, &period_id, &user_id)?;
                let now = Utc::now();
                apply_entry(&period, &mut row, &entry, now)?;

                diesel::update(group_goal_progress::table.find(&row.id))
                    .set((
                        group_goal_progress::current_amount.eq(row.current_amount.to_string()),
                        group_goal_progress::updated_at.eq(format_instant(now)),
                    ))
                    .execute(conn)
                    .map_err(StorageError::from)?;

                let merged = row
                    .daily_entries
                    .iter()
                    .find(|e| e.date == entry.date)
                    .ok_or_else(|| {
                        Error::Repository(format!(
                            "entry for {} missing after merge",
                            format_date(entry.date)
                        ))
                    })?;
                let record = ProgressEntryDB::from_domain(&row.id, merged);
                diesel::insert_into(group_goal_progress_entries::table)
                    .values(&record)
                    .on_conflict((
                        group_goal_progress_entries::progress_id,
                        group_goal_progress_entries::entry_date,
                    ))
                    .do_update()
                    .set((
                        group_goal_progress_entries::amount.eq(&record.amount),
                        group_goal_progress_entries::note.eq(&record.note),
                    ))
                    .execute(conn)
                    .map_err(StorageError::from)?;

                Ok(row)
            })
            .await
    }

    async fn finalize_period(&self, period_id: &str) -> Result<Vec<GroupGoalProgress>> {
        let period_id = period_id.to_string();
        self.writer
            .exec(move |conn: &mut SqliteConnection| -> Result<Vec<GroupGoalProgress>> {
                let period = find_period(conn, &period_id)?;
                if period.is_active {
                    diesel::update(group_goal_periods::table.find(&period_id))
                        .set(group_goal_periods::is_active.eq(false))
                        .execute(conn)
                        .map_err(StorageError::from)?;
                }
                load_rows(conn, &period_id)
            })
            .await
    }
}
