use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use diesel::prelude::*;
use diesel::sql_types::BigInt;
use parking_lot::Mutex;

use crate::db::pool::DbPool;
use crate::db::schema::messages;
use crate::error::StoreError;
use crate::models::message::{Message, NewMessage};

/// Durable store for private chat messages.
///
/// Backed by PostgreSQL in production and an in-memory list in tests.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Persist a message and return its id.
    async fn create_message(
        &self,
        sender_id: i64,
        receiver_id: i64,
        content: &str,
    ) -> Result<i64, StoreError>;

    /// One page (1-based) of the conversation between two users, newest
    /// first, plus the total message count of that conversation.
    async fn list_conversation(
        &self,
        user_id: i64,
        other_id: i64,
        page: i64,
        size: i64,
    ) -> Result<(Vec<Message>, i64), StoreError>;

    /// The latest message of every conversation `user_id` takes part in,
    /// newest first.
    async fn list_conversations(&self, user_id: i64) -> Result<Vec<Message>, StoreError>;

    async fn count_unread(&self, user_id: i64) -> Result<i64, StoreError>;

    /// Mark everything `sender_id` sent to `receiver_id` as read.
    async fn mark_read(&self, receiver_id: i64, sender_id: i64) -> Result<usize, StoreError>;
}

// ---------------------------------------------------------------------------
// PostgreSQL implementation
// ---------------------------------------------------------------------------

/// Newest row per counterpart of `$1`, newest conversation first.
const LATEST_PER_CONVERSATION: &str = "\
    SELECT id, sender_id, receiver_id, content, is_read, created_at FROM ( \
        SELECT DISTINCT ON (CASE WHEN sender_id = $1 THEN receiver_id ELSE sender_id END) * \
        FROM messages \
        WHERE sender_id = $1 OR receiver_id = $1 \
        ORDER BY CASE WHEN sender_id = $1 THEN receiver_id ELSE sender_id END, id DESC \
    ) latest \
    ORDER BY created_at DESC, id DESC";

pub struct PgMessageStore {
    db: DbPool,
}

impl PgMessageStore {
    pub fn new(db: DbPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl MessageStore for PgMessageStore {
    async fn create_message(
        &self,
        sender_id: i64,
        receiver_id: i64,
        content: &str,
    ) -> Result<i64, StoreError> {
        let mut conn = self.db.get().await?;

        let id: i64 = diesel_async::RunQueryDsl::get_result(
            diesel::insert_into(messages::table)
                .values(NewMessage {
                    sender_id,
                    receiver_id,
                    content,
                    is_read: false,
                    created_at: Utc::now(),
                })
                .returning(messages::id),
            &mut conn,
        )
        .await?;

        Ok(id)
    }

    async fn list_conversation(
        &self,
        user_id: i64,
        other_id: i64,
        page: i64,
        size: i64,
    ) -> Result<(Vec<Message>, i64), StoreError> {
        let mut conn = self.db.get().await?;

        let total: i64 = diesel_async::RunQueryDsl::get_result(
            messages::table
                .filter(
                    messages::sender_id
                        .eq(user_id)
                        .and(messages::receiver_id.eq(other_id))
                        .or(messages::sender_id.eq(other_id).and(messages::receiver_id.eq(user_id))),
                )
                .count(),
            &mut conn,
        )
        .await?;

        let rows: Vec<Message> = diesel_async::RunQueryDsl::load(
            messages::table
                .filter(
                    messages::sender_id
                        .eq(user_id)
                        .and(messages::receiver_id.eq(other_id))
                        .or(messages::sender_id.eq(other_id).and(messages::receiver_id.eq(user_id))),
                )
                .order((messages::created_at.desc(), messages::id.desc()))
                .offset((page - 1).saturating_mul(size))
                .limit(size)
                .select(Message::as_select()),
            &mut conn,
        )
        .await?;

        Ok((rows, total))
    }

    async fn list_conversations(&self, user_id: i64) -> Result<Vec<Message>, StoreError> {
        let mut conn = self.db.get().await?;

        let rows: Vec<Message> = diesel_async::RunQueryDsl::load(
            diesel::sql_query(LATEST_PER_CONVERSATION).bind::<BigInt, _>(user_id),
            &mut conn,
        )
        .await?;

        Ok(rows)
    }

    async fn count_unread(&self, user_id: i64) -> Result<i64, StoreError> {
        let mut conn = self.db.get().await?;

        let count: i64 = diesel_async::RunQueryDsl::get_result(
            messages::table
                .filter(messages::receiver_id.eq(user_id))
                .filter(messages::is_read.eq(false))
                .count(),
            &mut conn,
        )
        .await?;

        Ok(count)
    }

    async fn mark_read(&self, receiver_id: i64, sender_id: i64) -> Result<usize, StoreError> {
        let mut conn = self.db.get().await?;

        let updated = diesel_async::RunQueryDsl::execute(
            diesel::update(
                messages::table
                    .filter(messages::receiver_id.eq(receiver_id))
                    .filter(messages::sender_id.eq(sender_id))
                    .filter(messages::is_read.eq(false)),
            )
            .set(messages::is_read.eq(true)),
            &mut conn,
        )
        .await?;

        Ok(updated)
    }
}

// ---------------------------------------------------------------------------
// In-memory implementation (for tests and local runs without Postgres)
// ---------------------------------------------------------------------------

pub struct MemoryMessageStore {
    rows: Mutex<Vec<Message>>,
    next_id: AtomicI64,
    unavailable: AtomicBool,
}

impl MemoryMessageStore {
    pub fn new() -> Self {
        Self {
            rows: Mutex::new(Vec::new()),
            next_id: AtomicI64::new(1),
            unavailable: AtomicBool::new(false),
        }
    }

    /// Make every subsequent call fail as if the database were down.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn all(&self) -> Vec<Message> {
        self.rows.lock().clone()
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Database(diesel::result::Error::BrokenTransactionManager));
        }
        Ok(())
    }
}

impl Default for MemoryMessageStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MessageStore for MemoryMessageStore {
    async fn create_message(
        &self,
        sender_id: i64,
        receiver_id: i64,
        content: &str,
    ) -> Result<i64, StoreError> {
        self.check_available()?;
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.rows.lock().push(Message {
            id,
            sender_id,
            receiver_id,
            content: content.to_string(),
            is_read: false,
            created_at: Utc::now(),
        });
        Ok(id)
    }

    async fn list_conversation(
        &self,
        user_id: i64,
        other_id: i64,
        page: i64,
        size: i64,
    ) -> Result<(Vec<Message>, i64), StoreError> {
        self.check_available()?;
        let rows = self.rows.lock();
        let mut matching: Vec<Message> = rows
            .iter()
            .filter(|m| {
                (m.sender_id == user_id && m.receiver_id == other_id)
                    || (m.sender_id == other_id && m.receiver_id == user_id)
            })
            .cloned()
            .collect();
        let total = matching.len() as i64;
        matching.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));

        let skip = (page - 1).saturating_mul(size).max(0) as usize;
        let page_rows = matching.into_iter().skip(skip).take(size.max(0) as usize).collect();
        Ok((page_rows, total))
    }

    async fn list_conversations(&self, user_id: i64) -> Result<Vec<Message>, StoreError> {
        self.check_available()?;
        let rows = self.rows.lock();
        let mut latest: HashMap<i64, &Message> = HashMap::new();
        for m in rows.iter() {
            let other = if m.sender_id == user_id {
                m.receiver_id
            } else if m.receiver_id == user_id {
                m.sender_id
            } else {
                continue;
            };
            let entry = latest.entry(other).or_insert(m);
            if m.id > entry.id {
                *entry = m;
            }
        }

        let mut conversations: Vec<Message> = latest.into_values().cloned().collect();
        conversations.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));
        Ok(conversations)
    }

    async fn count_unread(&self, user_id: i64) -> Result<i64, StoreError> {
        self.check_available()?;
        let rows = self.rows.lock();
        Ok(rows
            .iter()
            .filter(|m| m.receiver_id == user_id && !m.is_read)
            .count() as i64)
    }

    async fn mark_read(&self, receiver_id: i64, sender_id: i64) -> Result<usize, StoreError> {
        self.check_available()?;
        let mut rows = self.rows.lock();
        let mut updated = 0;
        for m in rows
            .iter_mut()
            .filter(|m| m.receiver_id == receiver_id && m.sender_id == sender_id && !m.is_read)
        {
            m.is_read = true;
            updated += 1;
        }
        Ok(updated)
    }
}
