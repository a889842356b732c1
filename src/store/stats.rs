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

//! Aggregate queries behind the owner and operator dashboards.
//!
//! "New user" is defined by the earliest message-link row: a user is new
//! within `[since, now]` when their first link falls inside the bound.

use chrono::{DateTime, Utc};

use super::{Store, ensure_real_bot_id};
use crate::errors::StoreError;

/// Per-bot counters rendered in the owner menu.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BotStats {
    pub total_users: i64,
    pub new_users: i64,
    pub messages: i64,
    pub bans: i64,
}

/// Fleet-wide counters for the operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GlobalStats {
    pub active_bots: i64,
    pub total_bots: i64,
    pub total_users: i64,
    pub total_messages: i64,
}

impl Store {
    pub async fn bot_stats(
        &self,
        bot_id: i64,
        since: DateTime<Utc>,
    ) -> Result<BotStats, StoreError> {
        ensure_real_bot_id(bot_id)?;

        let total_users = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(DISTINCT user_chat_id) FROM message_links WHERE bot_id = $1",
        )
        .bind(bot_id)
        .fetch_one(self.pool())
        .await?;

        let new_users = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM ( \
                 SELECT user_chat_id, MIN(created_at) AS first_seen \
                 FROM message_links WHERE bot_id = $1 GROUP BY user_chat_id \
             ) firsts WHERE first_seen >= $2",
        )
        .bind(bot_id)
        .bind(since)
        .fetch_one(self.pool())
        .await?;

        let messages = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM message_links WHERE bot_id = $1 AND created_at >= $2",
        )
        .bind(bot_id)
        .bind(since)
        .fetch_one(self.pool())
        .await?;

        let bans = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM bans WHERE bot_id = $1")
            .bind(bot_id)
            .fetch_one(self.pool())
            .await?;

        Ok(BotStats {
            total_users,
            new_users,
            messages,
            bans,
        })
    }

    /// Aggregates over live tenants only; soft-deleted bots and their
    /// cascaded rows are excluded by the join.
    pub async fn global_stats(&self) -> Result<GlobalStats, StoreError> {
        let (active_bots, total_bots) = sqlx::query_as::<_, (i64, i64)>(
            "SELECT COUNT(*) FILTER (WHERE active), COUNT(*) \
             FROM bots WHERE deleted_at IS NULL",
        )
        .fetch_one(self.pool())
        .await?;

        let (total_users, total_messages) = sqlx::query_as::<_, (i64, i64)>(
            "SELECT COUNT(DISTINCT (l.bot_id, l.user_chat_id)), COUNT(*) \
             FROM message_links l \
             JOIN bots b ON b.bot_id = l.bot_id AND b.deleted_at IS NULL",
        )
        .fetch_one(self.pool())
        .await?;

        Ok(GlobalStats {
            active_bots,
            total_bots,
            total_users,
            total_messages,
        })
    }
}
