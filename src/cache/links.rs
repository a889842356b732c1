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

//! Message-link lookaside: `(credential, admin msg id) -> user chat id`.
//!
//! The write happens synchronously before the inbound handler returns, so
//! the mapping is in place long before a human owner can hit "reply".

use redis::AsyncCommands;

use super::{CacheClient, link_key};
use crate::errors::CacheError;

impl CacheClient {
    pub async fn set_link(
        &self,
        credential: &str,
        admin_msg_id: i64,
        user_chat_id: i64,
    ) -> Result<(), CacheError> {
        let mut con = self.connection().await?;
        let _: () = con
            .set_ex(
                link_key(credential, admin_msg_id),
                user_chat_id,
                self.link_ttl_secs(),
            )
            .await?;

        Ok(())
    }

    pub async fn get_link(
        &self,
        credential: &str,
        admin_msg_id: i64,
    ) -> Result<Option<i64>, CacheError> {
        let mut con = self.connection().await?;
        let user: Option<i64> = con.get(link_key(credential, admin_msg_id)).await?;

        Ok(user)
    }
}
