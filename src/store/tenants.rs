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

//! Hosted-bot rows: enrolment, lookup, settings and soft delete.
//!
//! # Description
//!
//! Every read in this module default-filters on `deleted_at IS NULL`; the
//! single exception is [Store::deleted_bot_by_credential], which feeds the
//! restore path. Credentials arrive and leave as plaintext — the sealing and
//! opening happens here, against the deterministic cipher, so the lookup by
//! credential stays an equality query over the ciphertext column.

use chrono::{DateTime, Utc};
use tracing::instrument;

use super::{Store, ensure_real_bot_id};
use crate::errors::StoreError;

/// A hosted bot, credential already decrypted.
#[derive(Debug, Clone, PartialEq)]
pub struct BotRecord {
    pub bot_id: i64,
    pub credential: String,
    pub owner_id: i64,
    pub username: String,
    pub active: bool,
    pub deleted_at: Option<DateTime<Utc>>,
    pub start_message: String,
    pub forward_auto_replies: bool,
    pub forced_sub_enabled: bool,
    pub show_sent_confirmation: bool,
    pub forced_sub_message: String,
    pub created_at: DateTime<Utc>,
}

/// Mirror of the `bots` table; `credential` still sealed.
#[derive(Debug, sqlx::FromRow)]
struct BotRow {
    bot_id: i64,
    credential: String,
    owner_id: i64,
    username: String,
    active: bool,
    deleted_at: Option<DateTime<Utc>>,
    start_message: String,
    forward_auto_replies: bool,
    forced_sub_enabled: bool,
    show_sent_confirmation: bool,
    forced_sub_message: String,
    created_at: DateTime<Utc>,
}

/// The three owner-togglable feature flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BotFlag {
    ForwardAutoReplies,
    ForcedSubEnabled,
    ShowSentConfirmation,
}

impl BotFlag {
    /// Column backing the flag. Also used as the cache key suffix.
    pub fn column(&self) -> &'static str {
        match self {
            BotFlag::ForwardAutoReplies => "forward_auto_replies",
            BotFlag::ForcedSubEnabled => "forced_sub_enabled",
            BotFlag::ShowSentConfirmation => "show_sent_confirmation",
        }
    }
}

const BOT_COLUMNS: &str = "bot_id, credential, owner_id, username, active, deleted_at, \
     start_message, forward_auto_replies, forced_sub_enabled, show_sent_confirmation, \
     forced_sub_message, created_at";

impl Store {
    fn decode_bot(&self, row: BotRow) -> Result<BotRecord, StoreError> {
        let credential = self.cipher().open(&row.credential)?;

        Ok(BotRecord {
            bot_id: row.bot_id,
            credential,
            owner_id: row.owner_id,
            username: row.username,
            active: row.active,
            deleted_at: row.deleted_at,
            start_message: row.start_message,
            forward_auto_replies: row.forward_auto_replies,
            forced_sub_enabled: row.forced_sub_enabled,
            show_sent_confirmation: row.show_sent_confirmation,
            forced_sub_message: row.forced_sub_message,
            created_at: row.created_at,
        })
    }

    /// Enrol a new bot. Fails with [StoreError::DuplicateCredential] when a
    /// live row already holds the credential.
    #[instrument(name = "Enrol a bot", skip(self, credential, username))]
    pub async fn create_bot(
        &self,
        credential: &str,
        owner_id: i64,
        username: &str,
    ) -> Result<BotRecord, StoreError> {
        let sealed = self.cipher().seal(credential)?;

        let row = sqlx::query_as::<_, BotRow>(&format!(
            "INSERT INTO bots (credential, owner_id, username) \
             VALUES ($1, $2, $3) RETURNING {BOT_COLUMNS}"
        ))
        .bind(&sealed)
        .bind(owner_id)
        .bind(username)
        .fetch_one(self.pool())
        .await
        .map_err(map_unique_violation)?;

        self.decode_bot(row)
    }

    /// Look up a live bot by its plaintext credential.
    pub async fn bot_by_credential(
        &self,
        credential: &str,
    ) -> Result<Option<BotRecord>, StoreError> {
        let sealed = self.cipher().seal(credential)?;

        let row = sqlx::query_as::<_, BotRow>(&format!(
            "SELECT {BOT_COLUMNS} FROM bots WHERE credential = $1 AND deleted_at IS NULL"
        ))
        .bind(&sealed)
        .fetch_optional(self.pool())
        .await?;

        row.map(|r| self.decode_bot(r)).transpose()
    }

    pub async fn bot_by_id(&self, bot_id: i64) -> Result<Option<BotRecord>, StoreError> {
        ensure_real_bot_id(bot_id)?;

        let row = sqlx::query_as::<_, BotRow>(&format!(
            "SELECT {BOT_COLUMNS} FROM bots WHERE bot_id = $1 AND deleted_at IS NULL"
        ))
        .bind(bot_id)
        .fetch_optional(self.pool())
        .await?;

        row.map(|r| self.decode_bot(r)).transpose()
    }

    /// The explicit "deleted" accessor backing the restore path.
    pub async fn deleted_bot_by_credential(
        &self,
        credential: &str,
    ) -> Result<Option<BotRecord>, StoreError> {
        let sealed = self.cipher().seal(credential)?;

        let row = sqlx::query_as::<_, BotRow>(&format!(
            "SELECT {BOT_COLUMNS} FROM bots WHERE credential = $1 AND deleted_at IS NOT NULL \
             ORDER BY deleted_at DESC LIMIT 1"
        ))
        .bind(&sealed)
        .fetch_optional(self.pool())
        .await?;

        row.map(|r| self.decode_bot(r)).transpose()
    }

    pub async fn bots_by_owner(&self, owner_id: i64) -> Result<Vec<BotRecord>, StoreError> {
        let rows = sqlx::query_as::<_, BotRow>(&format!(
            "SELECT {BOT_COLUMNS} FROM bots WHERE owner_id = $1 AND deleted_at IS NULL \
             ORDER BY created_at"
        ))
        .bind(owner_id)
        .fetch_all(self.pool())
        .await?;

        rows.into_iter().map(|r| self.decode_bot(r)).collect()
    }

    /// Every live bot flagged active — the fleet to resurrect at boot.
    pub async fn active_bots(&self) -> Result<Vec<BotRecord>, StoreError> {
        let rows = sqlx::query_as::<_, BotRow>(&format!(
            "SELECT {BOT_COLUMNS} FROM bots WHERE active AND deleted_at IS NULL \
             ORDER BY created_at"
        ))
        .fetch_all(self.pool())
        .await?;

        rows.into_iter().map(|r| self.decode_bot(r)).collect()
    }

    pub async fn set_bot_active(&self, bot_id: i64, active: bool) -> Result<(), StoreError> {
        ensure_real_bot_id(bot_id)?;

        sqlx::query("UPDATE bots SET active = $2 WHERE bot_id = $1 AND deleted_at IS NULL")
            .bind(bot_id)
            .bind(active)
            .execute(self.pool())
            .await?;

        Ok(())
    }

    /// Soft delete: the row becomes invisible to every default read and the
    /// bot is marked inactive. `BotID` is never reused afterwards.
    #[instrument(name = "Soft delete a bot", skip(self))]
    pub async fn soft_delete_bot(&self, bot_id: i64) -> Result<(), StoreError> {
        ensure_real_bot_id(bot_id)?;

        sqlx::query(
            "UPDATE bots SET deleted_at = now(), active = FALSE \
             WHERE bot_id = $1 AND deleted_at IS NULL",
        )
        .bind(bot_id)
        .execute(self.pool())
        .await?;

        Ok(())
    }

    /// Clear the soft-delete mark and re-enable the bot. The owner may be
    /// reassigned in the same step.
    #[instrument(name = "Restore a bot", skip(self))]
    pub async fn restore_bot(&self, bot_id: i64, new_owner: Option<i64>) -> Result<(), StoreError> {
        ensure_real_bot_id(bot_id)?;

        sqlx::query(
            "UPDATE bots SET deleted_at = NULL, active = TRUE, \
             owner_id = COALESCE($2, owner_id) \
             WHERE bot_id = $1 AND deleted_at IS NOT NULL",
        )
        .bind(bot_id)
        .bind(new_owner)
        .execute(self.pool())
        .await
        .map_err(map_unique_violation)?;

        Ok(())
    }

    pub async fn update_start_message(&self, bot_id: i64, text: &str) -> Result<(), StoreError> {
        ensure_real_bot_id(bot_id)?;

        sqlx::query("UPDATE bots SET start_message = $2 WHERE bot_id = $1 AND deleted_at IS NULL")
            .bind(bot_id)
            .bind(text)
            .execute(self.pool())
            .await?;

        Ok(())
    }

    pub async fn update_forced_sub_message(
        &self,
        bot_id: i64,
        text: &str,
    ) -> Result<(), StoreError> {
        ensure_real_bot_id(bot_id)?;

        sqlx::query(
            "UPDATE bots SET forced_sub_message = $2 WHERE bot_id = $1 AND deleted_at IS NULL",
        )
        .bind(bot_id)
        .bind(text)
        .execute(self.pool())
        .await?;

        Ok(())
    }

    /// Flip a feature flag and return the new value. The column name comes
    /// from a closed enum, never from input.
    #[instrument(name = "Toggle a bot flag", skip(self))]
    pub async fn toggle_bot_flag(&self, bot_id: i64, flag: BotFlag) -> Result<bool, StoreError> {
        ensure_real_bot_id(bot_id)?;
        let column = flag.column();

        let value = sqlx::query_scalar::<_, bool>(&format!(
            "UPDATE bots SET {column} = NOT {column} \
             WHERE bot_id = $1 AND deleted_at IS NULL RETURNING {column}"
        ))
        .bind(bot_id)
        .fetch_one(self.pool())
        .await?;

        Ok(value)
    }

    pub async fn bot_flag(&self, bot_id: i64, flag: BotFlag) -> Result<bool, StoreError> {
        ensure_real_bot_id(bot_id)?;
        let column = flag.column();

        let value = sqlx::query_scalar::<_, bool>(&format!(
            "SELECT {column} FROM bots WHERE bot_id = $1 AND deleted_at IS NULL"
        ))
        .bind(bot_id)
        .fetch_one(self.pool())
        .await?;

        Ok(value)
    }
}

fn map_unique_violation(e: sqlx::Error) -> StoreError {
    match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => StoreError::DuplicateCredential,
        _ => StoreError::Database(e),
    }
}
