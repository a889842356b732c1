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

//! Tenant feature-flag and text-setting caches.
//!
//! # Description
//!
//! Flag reads are tri-state so callers can tell "cached false" from "not
//! cached". A toggle never overwrites the entry — it deletes it, and the
//! next read refreshes from the store, which is the authoritative value.

use redis::AsyncCommands;

use super::{CacheClient, FLAG_TTL, flag_key, setting_key};
use crate::errors::CacheError;

impl CacheClient {
    pub async fn set_flag(
        &self,
        credential: &str,
        name: &str,
        value: bool,
    ) -> Result<(), CacheError> {
        let mut con = self.connection().await?;
        let _: () = con
            .set_ex(
                flag_key(credential, name),
                if value { "1" } else { "0" },
                FLAG_TTL,
            )
            .await?;

        Ok(())
    }

    /// `Some(v)` on a hit, `None` when the store must be consulted.
    pub async fn flag(&self, credential: &str, name: &str) -> Result<Option<bool>, CacheError> {
        let mut con = self.connection().await?;
        let raw: Option<String> = con.get(flag_key(credential, name)).await?;

        Ok(raw.map(|v| v == "1"))
    }

    /// Delete-on-toggle invalidation.
    pub async fn clear_flag(&self, credential: &str, name: &str) -> Result<(), CacheError> {
        let mut con = self.connection().await?;
        let _: () = con.del(flag_key(credential, name)).await?;

        Ok(())
    }

    pub async fn set_setting(
        &self,
        credential: &str,
        name: &str,
        value: &str,
    ) -> Result<(), CacheError> {
        let mut con = self.connection().await?;
        let _: () = con
            .set_ex(setting_key(credential, name), value, FLAG_TTL)
            .await?;

        Ok(())
    }

    pub async fn setting(
        &self,
        credential: &str,
        name: &str,
    ) -> Result<Option<String>, CacheError> {
        let mut con = self.connection().await?;
        let value: Option<String> = con.get(setting_key(credential, name)).await?;

        Ok(value)
    }

    pub async fn clear_setting(&self, credential: &str, name: &str) -> Result<(), CacheError> {
        let mut con = self.connection().await?;
        let _: () = con.del(setting_key(credential, name)).await?;

        Ok(())
    }
}
