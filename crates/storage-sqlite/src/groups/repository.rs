use std::sync::Arc;

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel::SqliteConnection;

use chainforge_core::group_goals::{GroupMember, GroupMembershipTrait, MemberRole};
use chainforge_core::Result;

use super::model::{GroupDB, GroupMemberDB};
use crate::db::{get_connection, DbPool, WriteHandle};
use crate::errors::{IntoCore, StorageError};
use crate::schema::{group_members, groups};
use crate::utils::format_instant;

/// Membership lookups for the goal engine, plus the writes needed to seed
/// groups from the admin surface and tests.
pub struct GroupMembershipRepository {
    pool: Arc<DbPool>,
    writer: WriteHandle,
}

impl GroupMembershipRepository {
    pub fn new(pool: Arc<DbPool>, writer: WriteHandle) -> Self {
        GroupMembershipRepository { pool, writer }
    }

    pub async fn create_group(&self, id: &str, name: &str, now: DateTime<Utc>) -> Result<()> {
        let record = GroupDB {
            id: id.to_string(),
            name: name.to_string(),
            created_at: format_instant(now),
        };
        self.writer
            .exec(move |conn: &mut SqliteConnection| -> Result<()> {
                diesel::insert_into(groups::table)
                    .values(&record)
                    .execute(conn)
                    .map_err(StorageError::from)?;
                Ok(())
            })
            .await
    }

    /// Adds a member, or reactivates and updates an existing one.
    pub async fn add_member(
        &self,
        group_id: &str,
        user_id: &str,
        role: MemberRole,
        joined_at: DateTime<Utc>,
    ) -> Result<GroupMember> {
        let record = GroupMemberDB {
            group_id: group_id.to_string(),
            user_id: user_id.to_string(),
            role: role.as_str().to_string(),
            is_active: true,
            joined_at: format_instant(joined_at),
        };
        self.writer
            .exec(move |conn: &mut SqliteConnection| -> Result<GroupMember> {
                diesel::insert_into(group_members::table)
                    .values(&record)
                    .on_conflict((group_members::group_id, group_members::user_id))
                    .do_update()
                    .set((
                        group_members::role.eq(&record.role),
                        group_members::is_active.eq(true),
                        group_members::joined_at.eq(&record.joined_at),
                    ))
                    .execute(conn)
                    .map_err(StorageError::from)?;
                record.try_into()
            })
            .await
    }

    pub async fn deactivate_member(&self, group_id: &str, user_id: &str) -> Result<()> {
        let group_id = group_id.to_string();
        let user_id = user_id.to_string();
        self.writer
            .exec(move |conn: &mut SqliteConnection| -> Result<()> {
                diesel::update(
                    group_members::table
                        .filter(group_members::group_id.eq(&group_id))
                        .filter(group_members::user_id.eq(&user_id)),
                )
                .set(group_members::is_active.eq(false))
                .execute(conn)
                .map_err(StorageError::from)?;
                Ok(())
            })
            .await
    }
}

impl GroupMembershipTrait for GroupMembershipRepository {
    fn list_active_members(
        &self,
        group_id: &str,
        as_of: DateTime<Utc>,
    ) -> Result<Vec<GroupMember>> {
        let mut conn = get_connection(&self.pool)?;
        group_members::table
            .filter(group_members::group_id.eq(group_id))
            .filter(group_members::is_active.eq(true))
            .filter(group_members::joined_at.le(format_instant(as_of)))
            .order(group_members::user_id.asc())
            .select(GroupMemberDB::as_select())
            .load(&mut conn)
            .into_core()?
            .into_iter()
            .map(GroupMember::try_from)
            .collect()
    }

    fn get_member(&self, group_id: &str, user_id: &str) -> Result<Option<GroupMember>> {
        let mut conn = get_connection(&self.pool)?;
        group_members::table
            .filter(group_members::group_id.eq(group_id))
            .filter(group_members::user_id.eq(user_id))
            .select(GroupMemberDB::as_select())
            .first(&mut conn)
            .optional()
            .into_core()?
            .map(GroupMember::try_from)
            .transpose()
    }
}
