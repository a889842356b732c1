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

//! Owner conversational state: flow tags, temp slots and the broadcast
//! handshake.
//!
//! # Description
//!
//! The owner-state tag names the interactive flow an owner is inside
//! (`add_auto_reply_trigger`, `set_start_message`, …); temp slots carry the
//! partial inputs a multi-step flow has collected so far. Both expire on
//! their own so an abandoned flow cannot wedge an owner, and both are
//! cleared explicitly when a flow completes.
//!
//! Broadcast-mode is a pair: the mode flag and the captured message id.
//! Confirm and cancel clear both; the TTL covers the owner who walks away.

use redis::AsyncCommands;

use super::{
    BROADCAST_TTL, CacheClient, OWNER_STATE_TTL, TEMP_SLOT_TTL, broadcast_mode_key,
    owner_state_key, pending_broadcast_key, temp_slot_key,
};
use crate::errors::CacheError;

impl CacheClient {
    pub async fn set_owner_state(
        &self,
        credential: &str,
        owner_id: i64,
        tag: &str,
    ) -> Result<(), CacheError> {
        let mut con = self.connection().await?;
        let _: () = con
            .set_ex(owner_state_key(credential, owner_id), tag, OWNER_STATE_TTL)
            .await?;

        Ok(())
    }

    pub async fn owner_state(
        &self,
        credential: &str,
        owner_id: i64,
    ) -> Result<Option<String>, CacheError> {
        let mut con = self.connection().await?;
        let tag: Option<String> = con.get(owner_state_key(credential, owner_id)).await?;

        Ok(tag)
    }

    pub async fn clear_owner_state(
        &self,
        credential: &str,
        owner_id: i64,
    ) -> Result<(), CacheError> {
        let mut con = self.connection().await?;
        let _: () = con.del(owner_state_key(credential, owner_id)).await?;

        Ok(())
    }

    pub async fn set_temp_slot(
        &self,
        credential: &str,
        owner_id: i64,
        slot: &str,
        value: &str,
    ) -> Result<(), CacheError> {
        let mut con = self.connection().await?;
        let _: () = con
            .set_ex(
                temp_slot_key(credential, owner_id, slot),
                value,
                TEMP_SLOT_TTL,
            )
            .await?;

        Ok(())
    }

    pub async fn temp_slot(
        &self,
        credential: &str,
        owner_id: i64,
        slot: &str,
    ) -> Result<Option<String>, CacheError> {
        let mut con = self.connection().await?;
        let value: Option<String> = con.get(temp_slot_key(credential, owner_id, slot)).await?;

        Ok(value)
    }

    /// Drop every temp slot an owner accumulated — flow completion.
    pub async fn clear_temp_slots(&self, credential: &str, owner_id: i64) -> Result<(), CacheError> {
        self.delete_matching(&format!("temp:{credential}:{owner_id}:*"))
            .await?;

        Ok(())
    }

    pub async fn set_broadcast_mode(
        &self,
        credential: &str,
        owner_id: i64,
    ) -> Result<(), CacheError> {
        let mut con = self.connection().await?;
        let _: () = con
            .set_ex(broadcast_mode_key(credential, owner_id), "true", BROADCAST_TTL)
            .await?;

        Ok(())
    }

    pub async fn broadcast_mode(
        &self,
        credential: &str,
        owner_id: i64,
    ) -> Result<bool, CacheError> {
        let mut con = self.connection().await?;
        let active: bool = con.exists(broadcast_mode_key(credential, owner_id)).await?;

        Ok(active)
    }

    pub async fn set_pending_broadcast(
        &self,
        credential: &str,
        owner_id: i64,
        msg_id: i32,
    ) -> Result<(), CacheError> {
        let mut con = self.connection().await?;
        let _: () = con
            .set_ex(
                pending_broadcast_key(credential, owner_id),
                msg_id,
                BROADCAST_TTL,
            )
            .await?;

        Ok(())
    }

    pub async fn pending_broadcast(
        &self,
        credential: &str,
        owner_id: i64,
    ) -> Result<Option<i32>, CacheError> {
        let mut con = self.connection().await?;
        let msg_id: Option<i32> = con.get(pending_broadcast_key(credential, owner_id)).await?;

        Ok(msg_id)
    }

    /// Leave broadcast mode: clears the flag and the captured message id.
    pub async fn clear_broadcast(&self, credential: &str, owner_id: i64) -> Result<(), CacheError> {
        let mut con = self.connection().await?;
        let _: () = con
            .del(vec![
                broadcast_mode_key(credential, owner_id),
                pending_broadcast_key(credential, owner_id),
            ])
            .await?;

        Ok(())
    }
}
