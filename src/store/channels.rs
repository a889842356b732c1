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

//! Forced-subscription channels.

use tracing::instrument;

use super::{Store, ensure_real_bot_id};
use crate::errors::StoreError;

#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct ForcedChannel {
    pub bot_id: i64,
    pub channel_id: i64,
    pub username: String,
    pub title: String,
    pub invite_url: String,
}

impl ForcedChannel {
    /// URL a blocked user should follow: the stored invite link when one
    /// exists, otherwise the public t.me address.
    pub fn join_url(&self) -> String {
        if !self.invite_url.is_empty() {
            self.invite_url.clone()
        } else {
            format!("https://t.me/{}", self.username)
        }
    }
}

const CHANNEL_COLUMNS: &str = "bot_id, channel_id, username, title, invite_url";

impl Store {
    /// Add a channel to the gate, refreshing its metadata when re-added.
    #[instrument(name = "Add a forced channel", skip(self, channel))]
    pub async fn add_forced_channel(&self, channel: &ForcedChannel) -> Result<(), StoreError> {
        ensure_real_bot_id(channel.bot_id)?;

        sqlx::query(
            "INSERT INTO forced_channels (bot_id, channel_id, username, title, invite_url) \
             VALUES ($1, $2, $3, $4, $5) \
             ON CONFLICT (bot_id, channel_id) DO UPDATE SET \
             username = EXCLUDED.username, title = EXCLUDED.title, \
             invite_url = EXCLUDED.invite_url",
        )
        .bind(channel.bot_id)
        .bind(channel.channel_id)
        .bind(&channel.username)
        .bind(&channel.title)
        .bind(&channel.invite_url)
        .execute(self.pool())
        .await?;

        Ok(())
    }

    #[instrument(name = "Remove a forced channel", skip(self))]
    pub async fn remove_forced_channel(
        &self,
        bot_id: i64,
        channel_id: i64,
    ) -> Result<bool, StoreError> {
        ensure_real_bot_id(bot_id)?;

        let removed =
            sqlx::query("DELETE FROM forced_channels WHERE bot_id = $1 AND channel_id = $2")
                .bind(bot_id)
                .bind(channel_id)
                .execute(self.pool())
                .await?;

        Ok(removed.rows_affected() > 0)
    }

    pub async fn forced_channels(&self, bot_id: i64) -> Result<Vec<ForcedChannel>, StoreError> {
        ensure_real_bot_id(bot_id)?;

        let channels = sqlx::query_as::<_, ForcedChannel>(&format!(
            "SELECT {CHANNEL_COLUMNS} FROM forced_channels WHERE bot_id = $1 ORDER BY created_at"
        ))
        .bind(bot_id)
        .fetch_all(self.pool())
        .await?;

        Ok(channels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn join_url_prefers_the_stored_invite() {
        let channel = ForcedChannel {
            bot_id: 1,
            channel_id: -100,
            username: "updates".to_owned(),
            title: "Updates".to_owned(),
            invite_url: "https://t.me/+abcdef".to_owned(),
        };
        assert_eq!(channel.join_url(), "https://t.me/+abcdef");
    }

    #[test]
    fn join_url_falls_back_to_the_public_address() {
        let channel = ForcedChannel {
            bot_id: 1,
            channel_id: -100,
            username: "updates".to_owned(),
            title: "Updates".to_owned(),
            invite_url: String::new(),
        };
        assert_eq!(channel.join_url(), "https://t.me/updates");
    }
}
