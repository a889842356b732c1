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

//! Per-bot user bans.

use tracing::instrument;

use super::{Store, ensure_real_bot_id};
use crate::errors::StoreError;

impl Store {
    /// Insert-or-keep a ban row. Returns `true` when the row is new, so the
    /// caller can tell a fresh ban from a repeat of the verb.
    #[instrument(name = "Ban a user", skip(self))]
    pub async fn ban_user(
        &self,
        bot_id: i64,
        user_chat_id: i64,
        banned_by: i64,
    ) -> Result<bool, StoreError> {
        ensure_real_bot_id(bot_id)?;

        let inserted = sqlx::query(
            "INSERT INTO bans (bot_id, user_chat_id, banned_by) VALUES ($1, $2, $3) \
             ON CONFLICT (bot_id, user_chat_id) DO NOTHING",
        )
        .bind(bot_id)
        .bind(user_chat_id)
        .bind(banned_by)
        .execute(self.pool())
        .await?;

        Ok(inserted.rows_affected() > 0)
    }

    /// Remove a ban. Returns `true` when a row actually existed.
    #[instrument(name = "Unban a user", skip(self))]
    pub async fn unban_user(&self, bot_id: i64, user_chat_id: i64) -> Result<bool, StoreError> {
        ensure_real_bot_id(bot_id)?;

        let removed = sqlx::query("DELETE FROM bans WHERE bot_id = $1 AND user_chat_id = $2")
            .bind(bot_id)
            .bind(user_chat_id)
            .execute(self.pool())
            .await?;

        Ok(removed.rows_affected() > 0)
    }

    pub async fn is_banned(&self, bot_id: i64, user_chat_id: i64) -> Result<bool, StoreError> {
        ensure_real_bot_id(bot_id)?;

        let banned = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM bans WHERE bot_id = $1 AND user_chat_id = $2)",
        )
        .bind(bot_id)
        .bind(user_chat_id)
        .fetch_one(self.pool())
        .await?;

        Ok(banned)
    }
}
