use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use diesel::prelude::*;
use diesel_async::AsyncConnection;
use house_common::LevelTable;
use scoped_futures::ScopedFutureExt;

use crate::db::pool::DbPool;
use crate::db::schema::users;
use crate::error::StoreError;
use crate::models::user::{LevelChange, UserLevelState};

/// User storage as seen by the leveling processor.
#[async_trait]
pub trait LevelStore: Send + Sync {
    /// Add `amount` to the user's experience and bring their level in line
    /// with the new total, atomically.
    async fn apply_experience(&self, user_id: i64, amount: i64) -> Result<LevelChange, StoreError>;
}

// ---------------------------------------------------------------------------
// PostgreSQL implementation
// ---------------------------------------------------------------------------

pub struct PgLevelStore {
    db: DbPool,
    table: Arc<LevelTable>,
}

impl PgLevelStore {
    pub fn new(db: DbPool, table: Arc<LevelTable>) -> Self {
        Self { db, table }
    }
}

#[async_trait]
impl LevelStore for PgLevelStore {
    async fn apply_experience(&self, user_id: i64, amount: i64) -> Result<LevelChange, StoreError> {
        let mut conn = self.db.get().await?;
        let table = self.table.as_ref();

        conn.transaction::<_, StoreError, _>(|conn| {
            async move {
                // 1. Atomic add; the row lock is held until commit.
                let updated = diesel_async::RunQueryDsl::execute(
                    diesel::update(users::table.find(user_id)).set((
                        users::exp.eq(users::exp + amount),
                        users::updated_at.eq(Utc::now()),
                    )),
                    conn,
                )
                .await?;

                if updated == 0 {
                    return Err(StoreError::UserNotFound(user_id));
                }

                // 2. Re-read the total we just produced.
                let state: UserLevelState = diesel_async::RunQueryDsl::get_result(
                    users::table
                        .find(user_id)
                        .select(UserLevelState::as_select()),
                    conn,
                )
                .await?;

                // 3. Write the level only when it moved.
                let new_level = table.level_for(state.exp);
                if new_level != state.level {
                    diesel_async::RunQueryDsl::execute(
                        diesel::update(users::table.find(user_id)).set(users::level.eq(new_level)),
                        conn,
                    )
                    .await?;
                }

                Ok(LevelChange {
                    user_id,
                    exp: state.exp,
                    old_level: state.level,
                    new_level,
                })
            }
            .scope_boxed()
        })
        .await
    }
}

// ---------------------------------------------------------------------------
// In-memory implementation (for tests)
// ---------------------------------------------------------------------------

/// DashMap-backed user levels. The per-key shard lock stands in for the
/// database row lock, so concurrent credits to one user never lose updates.
pub struct MemoryLevelStore {
    users: DashMap<i64, UserLevelState>,
    table: Arc<LevelTable>,
    failures_remaining: AtomicUsize,
}

impl MemoryLevelStore {
    pub fn new(table: Arc<LevelTable>) -> Self {
        Self {
            users: DashMap::new(),
            table,
            failures_remaining: AtomicUsize::new(0),
        }
    }

    pub fn insert_user(&self, id: i64, exp: i64) {
        let level = self.table.level_for(exp);
        self.users.insert(id, UserLevelState { id, exp, level });
    }

    pub fn get(&self, id: i64) -> Option<UserLevelState> {
        self.users.get(&id).map(|u| *u)
    }

    /// Fail the next `count` calls as if storage were unreachable.
    pub fn fail_next(&self, count: usize) {
        self.failures_remaining.store(count, Ordering::SeqCst);
    }

    fn take_failure(&self) -> bool {
        self.failures_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl LevelStore for MemoryLevelStore {
    async fn apply_experience(&self, user_id: i64, amount: i64) -> Result<LevelChange, StoreError> {
        if self.take_failure() {
            return Err(StoreError::Database(diesel::result::Error::BrokenTransactionManager));
        }

        let mut user = self
            .users
            .get_mut(&user_id)
            .ok_or(StoreError::UserNotFound(user_id))?;

        let old_level = user.level;
        user.exp += amount;
        let new_level = self.table.level_for(user.exp);
        if new_level != old_level {
            user.level = new_level;
        }

        Ok(LevelChange {
            user_id,
            exp: user.exp,
            old_level,
            new_level,
        })
    }
}
