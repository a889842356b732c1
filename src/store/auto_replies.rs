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

//! Keyword auto-replies and custom slash commands.
//!
//! # Description
//!
//! A trigger is unique per `(bot, trigger, type)`; re-adding an existing
//! trigger overwrites its response, which is what an owner editing a reply
//! expects. The enum columns travel as TEXT and are validated on the way
//! out — an unknown value in the table is an integrity fault, not a silent
//! default.

use tracing::instrument;

use super::{MediaPayload, Store, ensure_real_bot_id, media_from_columns};
use crate::errors::StoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AutoReplyKind {
    Keyword,
    Command,
}

impl AutoReplyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AutoReplyKind::Keyword => "keyword",
            AutoReplyKind::Command => "command",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "keyword" => Some(AutoReplyKind::Keyword),
            "command" => Some(AutoReplyKind::Command),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchMode {
    Exact,
    Contains,
}

impl MatchMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchMode::Exact => "exact",
            MatchMode::Contains => "contains",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "exact" => Some(MatchMode::Exact),
            "contains" => Some(MatchMode::Contains),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AutoReply {
    pub id: i64,
    pub bot_id: i64,
    pub trigger: String,
    pub kind: AutoReplyKind,
    pub match_mode: MatchMode,
    pub response: String,
    pub media: Option<MediaPayload>,
}

/// Input shape for creating or overwriting a reply.
#[derive(Debug, Clone)]
pub struct NewAutoReply {
    pub trigger: String,
    pub kind: AutoReplyKind,
    pub match_mode: MatchMode,
    pub response: String,
    pub media: Option<MediaPayload>,
}

#[derive(Debug, sqlx::FromRow)]
struct AutoReplyRow {
    id: i64,
    bot_id: i64,
    trigger_text: String,
    reply_type: String,
    match_mode: String,
    response: String,
    media_kind: Option<String>,
    media_file_id: Option<String>,
    media_caption: Option<String>,
}

impl TryFrom<AutoReplyRow> for AutoReply {
    type Error = StoreError;

    fn try_from(row: AutoReplyRow) -> Result<Self, Self::Error> {
        let kind =
            AutoReplyKind::parse(&row.reply_type).ok_or(StoreError::BadColumn("reply_type"))?;
        let match_mode =
            MatchMode::parse(&row.match_mode).ok_or(StoreError::BadColumn("match_mode"))?;
        let media = media_from_columns(row.media_kind, row.media_file_id, row.media_caption)?;

        Ok(AutoReply {
            id: row.id,
            bot_id: row.bot_id,
            trigger: row.trigger_text,
            kind,
            match_mode,
            response: row.response,
            media,
        })
    }
}

const AUTO_REPLY_COLUMNS: &str = "id, bot_id, trigger_text, reply_type, match_mode, response, \
     media_kind, media_file_id, media_caption";

impl Store {
    /// Create or overwrite a reply for `(bot, trigger, type)`.
    #[instrument(name = "Upsert an auto-reply", skip(self, reply))]
    pub async fn upsert_auto_reply(
        &self,
        bot_id: i64,
        reply: &NewAutoReply,
    ) -> Result<AutoReply, StoreError> {
        ensure_real_bot_id(bot_id)?;

        let (media_kind, media_file_id, media_caption) = match &reply.media {
            Some(media) => (
                Some(media.kind.as_str()),
                Some(media.file_id.as_str()),
                Some(media.caption.as_str()),
            ),
            None => (None, None, None),
        };

        let row = sqlx::query_as::<_, AutoReplyRow>(&format!(
            "INSERT INTO auto_replies \
             (bot_id, trigger_text, reply_type, match_mode, response, \
              media_kind, media_file_id, media_caption) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
             ON CONFLICT (bot_id, trigger_text, reply_type) DO UPDATE SET \
             match_mode = EXCLUDED.match_mode, response = EXCLUDED.response, \
             media_kind = EXCLUDED.media_kind, media_file_id = EXCLUDED.media_file_id, \
             media_caption = EXCLUDED.media_caption \
             RETURNING {AUTO_REPLY_COLUMNS}"
        ))
        .bind(bot_id)
        .bind(&reply.trigger)
        .bind(reply.kind.as_str())
        .bind(reply.match_mode.as_str())
        .bind(&reply.response)
        .bind(media_kind)
        .bind(media_file_id)
        .bind(media_caption)
        .fetch_one(self.pool())
        .await?;

        AutoReply::try_from(row)
    }

    /// Delete a reply; `true` when a row existed.
    pub async fn delete_auto_reply(
        &self,
        bot_id: i64,
        trigger: &str,
        kind: AutoReplyKind,
    ) -> Result<bool, StoreError> {
        ensure_real_bot_id(bot_id)?;

        let removed = sqlx::query(
            "DELETE FROM auto_replies \
             WHERE bot_id = $1 AND trigger_text = $2 AND reply_type = $3",
        )
        .bind(bot_id)
        .bind(trigger)
        .bind(kind.as_str())
        .execute(self.pool())
        .await?;

        Ok(removed.rows_affected() > 0)
    }

    /// All replies of one kind for a bot — the shape the cache back-fill
    /// wants.
    pub async fn auto_replies(
        &self,
        bot_id: i64,
        kind: AutoReplyKind,
    ) -> Result<Vec<AutoReply>, StoreError> {
        ensure_real_bot_id(bot_id)?;

        let rows = sqlx::query_as::<_, AutoReplyRow>(&format!(
            "SELECT {AUTO_REPLY_COLUMNS} FROM auto_replies \
             WHERE bot_id = $1 AND reply_type = $2 ORDER BY trigger_text"
        ))
        .bind(bot_id)
        .bind(kind.as_str())
        .fetch_all(self.pool())
        .await?;

        rows.into_iter().map(AutoReply::try_from).collect()
    }

    pub async fn all_auto_replies(&self, bot_id: i64) -> Result<Vec<AutoReply>, StoreError> {
        ensure_real_bot_id(bot_id)?;

        let rows = sqlx::query_as::<_, AutoReplyRow>(&format!(
            "SELECT {AUTO_REPLY_COLUMNS} FROM auto_replies \
             WHERE bot_id = $1 ORDER BY reply_type, trigger_text"
        ))
        .bind(bot_id)
        .fetch_all(self.pool())
        .await?;

        rows.into_iter().map(AutoReply::try_from).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn reply_kind_round_trips() {
        for kind in [AutoReplyKind::Keyword, AutoReplyKind::Command] {
            assert_eq!(AutoReplyKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(AutoReplyKind::parse("regex"), None);
    }

    #[test]
    fn unknown_reply_type_is_an_integrity_fault() {
        let row = AutoReplyRow {
            id: 1,
            bot_id: 2,
            trigger_text: "hello".to_owned(),
            reply_type: "regex".to_owned(),
            match_mode: "exact".to_owned(),
            response: "hi".to_owned(),
            media_kind: None,
            media_file_id: None,
            media_caption: None,
        };

        assert!(matches!(
            AutoReply::try_from(row),
            Err(StoreError::BadColumn("reply_type"))
        ));
    }
}
