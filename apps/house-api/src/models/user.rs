use diesel::prelude::*;
use serde::Serialize;
use utoipa::ToSchema;

use crate::db::schema::users;

/// The slice of a user row the leveling pipeline reads and writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Queryable, Selectable, Serialize, ToSchema)]
#[diesel(table_name = users)]
pub struct UserLevelState {
    pub id: i64,
    pub exp: i64,
    pub level: i32,
}

/// Outcome of crediting experience to one user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LevelChange {
    pub user_id: i64,
    pub exp: i64,
    pub old_level: i32,
    pub new_level: i32,
}

impl LevelChange {
    pub fn leveled_up(&self) -> bool {
        self.new_level > self.old_level
    }
}
