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

//! Session markers: "has this user ever interacted with this bot".
//!
//! No TTL — the mark lives until the tenant stops. On a miss the dispatcher
//! falls back to the message-link log, which is the authoritative record.

use redis::AsyncCommands;

use super::{CacheClient, session_key};
use crate::errors::CacheError;

impl CacheClient {
    pub async fn mark_session(&self, credential: &str, user_id: i64) -> Result<(), CacheError> {
        let mut con = self.connection().await?;
        let _: () = con.set(session_key(credential, user_id), "active").await?;

        Ok(())
    }

    pub async fn has_session(&self, credential: &str, user_id: i64) -> Result<bool, CacheError> {
        let mut con = self.connection().await?;
        let found: bool = con.exists(session_key(credential, user_id)).await?;

        Ok(found)
    }
}
