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

//! Sub-verified marks: cached proof that a user passed the
//! forced-subscription gate recently.

use redis::AsyncCommands;

use super::{CacheClient, SUB_VERIFIED_TTL, sub_verified_key};
use crate::errors::CacheError;

impl CacheClient {
    pub async fn mark_sub_verified(
        &self,
        credential: &str,
        user_id: i64,
    ) -> Result<(), CacheError> {
        let mut con = self.connection().await?;
        let _: () = con
            .set_ex(sub_verified_key(credential, user_id), "1", SUB_VERIFIED_TTL)
            .await?;

        Ok(())
    }

    pub async fn is_sub_verified(
        &self,
        credential: &str,
        user_id: i64,
    ) -> Result<bool, CacheError> {
        let mut con = self.connection().await?;
        let found: bool = con.exists(sub_verified_key(credential, user_id)).await?;

        Ok(found)
    }

    /// Adding or removing a forced channel voids every cached proof for the
    /// tenant.
    pub async fn clear_sub_verified(&self, credential: &str) -> Result<(), CacheError> {
        self.delete_matching(&format!("subok:{credential}:*"))
            .await?;

        Ok(())
    }
}
