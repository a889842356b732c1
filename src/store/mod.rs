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

//! Durable state backend.
//!
//! # Description
//!
//! The store exclusively owns the relational rows: hosted bots, the
//! message-link log, bans, auto-replies, forced channels and scheduled
//! messages. Everything the rest of the runtime reads through the cache is a
//! mirror of what lives here.
//!
//! Each entity gets its own submodule with typed operations; the `Store`
//! handle itself is cheap to clone and safe for concurrent use (the pool is
//! the backpressure boundary). Credentials are encrypted before they touch a
//! query and decrypted before a row is returned, so callers never see
//! ciphertext and the table never sees plaintext.

mod auto_replies;
mod bans;
mod channels;
mod links;
mod schedules;
mod stats;
mod tenants;

pub use auto_replies::{AutoReply, AutoReplyKind, MatchMode, NewAutoReply};
pub use channels::ForcedChannel;
pub use links::MessageLink;
pub use schedules::{NewSchedule, ScheduleKind, ScheduleStatus, ScheduledMessage};
pub use stats::{BotStats, GlobalStats};
pub use tenants::{BotFlag, BotRecord};

use sqlx::{PgPool, postgres::PgPoolOptions};
use tracing::{error, instrument, trace};

use crate::{configuration::DatabaseSettings, crypto::CredentialCipher, errors::StoreError};

/// Handle over the relational backend.
#[derive(Clone)]
pub struct Store {
    pool: PgPool,
    cipher: CredentialCipher,
}

impl Store {
    #[instrument(name = "Connect the DB backend", skip(settings, cipher))]
    pub async fn connect(
        settings: &DatabaseSettings,
        cipher: CredentialCipher,
    ) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(settings.pool_size())
            .connect_with(settings.connect_options())
            .await
            .map_err(|e| {
                error!("{e}");
                StoreError::Database(e)
            })?;

        trace!("Postgres server succesfully connected");

        Ok(Self::from_pool(pool, cipher))
    }

    /// Wrap an already-connected pool. Used by the test harness, which
    /// provisions its own throwaway database.
    pub fn from_pool(pool: PgPool, cipher: CredentialCipher) -> Self {
        Self { pool, cipher }
    }

    /// Apply the embedded migrations.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Database(sqlx::Error::Migrate(Box::new(e))))?;

        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub(crate) fn cipher(&self) -> &CredentialCipher {
        &self.cipher
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

/// Bot id 0 is the factory sentinel: it only exists in the manager registry
/// and must never reach a durable row.
pub(crate) fn ensure_real_bot_id(bot_id: i64) -> Result<(), StoreError> {
    if bot_id == 0 {
        Err(StoreError::ReservedBotId)
    } else {
        Ok(())
    }
}

/// Media attached to an auto-reply or scheduled payload. `file_id` is the
/// upstream platform's opaque handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaPayload {
    pub kind: MediaKind,
    pub file_id: String,
    pub caption: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Photo,
    Video,
    Audio,
    Voice,
    Document,
    Animation,
    VideoNote,
    Sticker,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Photo => "photo",
            MediaKind::Video => "video",
            MediaKind::Audio => "audio",
            MediaKind::Voice => "voice",
            MediaKind::Document => "document",
            MediaKind::Animation => "animation",
            MediaKind::VideoNote => "video_note",
            MediaKind::Sticker => "sticker",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "photo" => Some(MediaKind::Photo),
            "video" => Some(MediaKind::Video),
            "audio" => Some(MediaKind::Audio),
            "voice" => Some(MediaKind::Voice),
            "document" => Some(MediaKind::Document),
            "animation" => Some(MediaKind::Animation),
            "video_note" => Some(MediaKind::VideoNote),
            "sticker" => Some(MediaKind::Sticker),
            _ => None,
        }
    }
}

/// Assemble an optional media payload from the three nullable columns the
/// entity tables share.
pub(crate) fn media_from_columns(
    kind: Option<String>,
    file_id: Option<String>,
    caption: Option<String>,
) -> Result<Option<MediaPayload>, StoreError> {
    match (kind, file_id) {
        (Some(kind), Some(file_id)) => {
            let kind = MediaKind::parse(&kind).ok_or(StoreError::BadColumn("media_kind"))?;
            Ok(Some(MediaPayload {
                kind,
                file_id,
                caption: caption.unwrap_or_default(),
            }))
        }
        (None, None) => Ok(None),
        _ => Err(StoreError::BadColumn("media_file_id")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[rstest]
    #[case("photo", MediaKind::Photo)]
    #[case("video_note", MediaKind::VideoNote)]
    #[case("sticker", MediaKind::Sticker)]
    fn media_kind_round_trips(#[case] text: &str, #[case] kind: MediaKind) {
        assert_eq!(MediaKind::parse(text), Some(kind));
        assert_eq!(kind.as_str(), text);
    }

    #[test]
    fn unknown_media_kind_is_rejected() {
        assert_eq!(MediaKind::parse("hologram"), None);
    }

    #[test]
    fn media_columns_must_agree() {
        let half = media_from_columns(Some("photo".to_owned()), None, None);
        assert!(matches!(half, Err(StoreError::BadColumn(_))));

        let none = media_from_columns(None, None, None).unwrap();
        assert_eq!(none, None);
    }

    #[test]
    fn factory_bot_id_is_rejected() {
        assert!(ensure_real_bot_id(0).is_err());
        assert!(ensure_real_bot_id(7).is_ok());
    }
}
