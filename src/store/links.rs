// Copyright 2025 BotForge contributors
//
//    Licensed under the Apache License, Version 2.0 (the "License");
//    you may not use this file except in compliance with the License.
//    You may obtain a copy of the License at
//
//        http://www.apache.org/licenses/LICENSE-2.0
//
//    Unless required by applicable law or agreed to in writing, software
//    distributed under the License is distributed on an "AS IS" BASIS,
//    WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
//    See the License for the specific language governing permissions and
//    limitations under the License.

//! Message-link log: the durable side of reply linkage.
//!
//! Rows are written once when a user message is forwarded into the owner
//! chat and never updated; they cascade away with their bot.

use chrono::{DateTime, Utc};

use super::{Store, ensure_real_bot_id};
use crate::errors::StoreError;

#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct MessageLink {
    pub admin_msg_id: i64,
    pub user_chat_id: i64,
    pub bot_id: i64,
    pub created_at: DateTime<Utc>,
}

impl Store {
    /// Record the `(admin message, original sender)` pair. Idempotent: the
    /// upstream may redeliver an update after a timeout.
    pub async fn insert_link(
        &self,
        admin_msg_id: i64,
        user_chat_id: i64,
        bot_id: i64,
    ) -> Result<(), StoreError> {
        ensure_real_bot_id(bot_id)?;

        sqlx::query(
            "INSERT INTO message_links (admin_msg_id, user_chat_id, bot_id) \
             VALUES ($1, $2, $3) ON CONFLICT DO NOTHING",
        )
        .bind(admin_msg_id)
        .bind(user_chat_id)
        .bind(bot_id)
        .execute(self.pool())
        .await?;

        Ok(())
    }

    /// `resolve(AdminMsgID, BotID) -> UserChatID | none` — the single-row
    /// indexed lookup behind owner replies.
    pub async fn resolve_link(
        &self,
        admin_msg_id: i64,
        bot_id: i64,
    ) -> Result<Option<i64>, StoreError> {
        ensure_real_bot_id(bot_id)?;

        let user = sqlx::query_scalar::<_, i64>(
            "SELECT user_chat_id FROM message_links WHERE admin_msg_id = $1 AND bot_id = $2",
        )
        .bind(admin_msg_id)
        .bind(bot_id)
        .fetch_optional(self.pool())
        .await?;

        Ok(user)
    }

    /// Whether the user has ever talked to this bot. Backs the session
    /// cache on a miss.
    pub async fn has_any_link(&self, bot_id: i64, user_chat_id: i64) -> Result<bool, StoreError> {
        ensure_real_bot_id(bot_id)?;

        let found = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM message_links WHERE bot_id = $1 AND user_chat_id = $2)",
        )
        .bind(bot_id)
        .bind(user_chat_id)
        .fetch_one(self.pool())
        .await?;

        Ok(found)
    }

    /// Distinct users that ever wrote to the bot — the broadcast audience.
    pub async fn link_recipients(&self, bot_id: i64) -> Result<Vec<i64>, StoreError> {
        ensure_real_bot_id(bot_id)?;

        let users = sqlx::query_scalar::<_, i64>(
            "SELECT DISTINCT user_chat_id FROM message_links WHERE bot_id = $1",
        )
        .bind(bot_id)
        .fetch_all(self.pool())
        .await?;

        Ok(users)
    }

    /// When the user first wrote to the bot (earliest link row). Rendered in
    /// the owner's `info` profile card.
    pub async fn first_contact(
        &self,
        bot_id: i64,
        user_chat_id: i64,
    ) -> Result<Option<DateTime<Utc>>, StoreError> {
        ensure_real_bot_id(bot_id)?;

        let first = sqlx::query_scalar::<_, Option<DateTime<Utc>>>(
            "SELECT MIN(created_at) FROM message_links WHERE bot_id = $1 AND user_chat_id = $2",
        )
        .bind(bot_id)
        .bind(user_chat_id)
        .fetch_one(self.pool())
        .await?;

        Ok(first)
    }
}
