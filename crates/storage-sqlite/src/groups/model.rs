use diesel::prelude::*;

use chainforge_core::errors::ValidationError;
use chainforge_core::group_goals::GroupMember;
use chainforge_core::Result;

use crate::utils::parse_instant;

#[derive(Queryable, Identifiable, Insertable, Selectable, PartialEq, Debug, Clone)]
#[diesel(table_name = crate::schema::groups)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct GroupDB {
    pub id: String,
    pub name: String,
    pub created_at: String,
}

#[derive(Queryable, Insertable, Selectable, PartialEq, Debug, Clone)]
#[diesel(table_name = crate::schema::group_members)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct GroupMemberDB {
    pub group_id: String,
    pub user_id: String,
    pub role: String,
    pub is_active: bool,
    pub joined_at: String,
}

impl TryFrom<GroupMemberDB> for GroupMember {
    type Error = chainforge_core::Error;

    fn try_from(db: GroupMemberDB) -> Result<Self> {
        Ok(Self {
            role: db.role.parse().map_err(ValidationError::InvalidInput)?,
            joined_at: parse_instant(&db.joined_at)?,
            group_id: db.group_id,
            user_id: db.user_id,
            is_active: db.is_active,
        })
    }
}
