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

//! Two-sided ban cache.
//!
//! # Description
//!
//! The positive side ("this user is banned") lives 24 hours because bans are
//! long-lived; the negative side ("checked, not banned") lives 5 minutes so
//! a fresh ban becomes visible quickly even if the negative entry is never
//! explicitly invalidated. Marking one side always deletes the other, so the
//! pair can never contradict itself.

use redis::AsyncCommands;

use super::{BAN_NEGATIVE_TTL, BAN_POSITIVE_TTL, CacheClient, ban_key, no_ban_key};
use crate::errors::CacheError;

impl CacheClient {
    pub async fn mark_banned(&self, credential: &str, user_id: i64) -> Result<(), CacheError> {
        let mut con = self.connection().await?;
        let _: () = con
            .set_ex(ban_key(credential, user_id), "1", BAN_POSITIVE_TTL)
            .await?;
        let _: () = con.del(no_ban_key(credential, user_id)).await?;

        Ok(())
    }

    pub async fn mark_not_banned(&self, credential: &str, user_id: i64) -> Result<(), CacheError> {
        let mut con = self.connection().await?;
        let _: () = con
            .set_ex(no_ban_key(credential, user_id), "0", BAN_NEGATIVE_TTL)
            .await?;
        let _: () = con.del(ban_key(credential, user_id)).await?;

        Ok(())
    }

    /// Tri-state read: `Some(true)` banned, `Some(false)` known not banned,
    /// `None` means the store must be asked.
    pub async fn ban_state(
        &self,
        credential: &str,
        user_id: i64,
    ) -> Result<Option<bool>, CacheError> {
        let mut con = self.connection().await?;

        let positive: bool = con.exists(ban_key(credential, user_id)).await?;
        if positive {
            return Ok(Some(true));
        }

        let negative: bool = con.exists(no_ban_key(credential, user_id)).await?;
        if negative {
            return Ok(Some(false));
        }

        Ok(None)
    }
}
