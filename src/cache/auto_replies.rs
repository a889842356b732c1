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

//! Auto-reply dictionary cache.
//!
//! # Description
//!
//! One serialised entry per `(credential, type, trigger)`. Lookups prefer a
//! point GET; the bulk scan exists for the dispatcher's first-miss back-fill
//! and for `contains`-mode keyword matching, which has to walk the whole
//! dictionary anyway.

use redis::AsyncCommands;
use serde::{Deserialize, Serialize};

use super::{AUTO_REPLY_TTL, CacheClient, auto_reply_key};
use crate::{
    errors::CacheError,
    store::{AutoReply, MatchMode, MediaKind, MediaPayload},
};

/// Serialised form of a reply as it travels through the cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedReply {
    pub trigger: String,
    pub match_mode: String,
    pub response: String,
    pub media_kind: Option<String>,
    pub media_file_id: Option<String>,
    pub media_caption: Option<String>,
}

impl From<&AutoReply> for CachedReply {
    fn from(reply: &AutoReply) -> Self {
        CachedReply {
            trigger: reply.trigger.clone(),
            match_mode: reply.match_mode.as_str().to_owned(),
            response: reply.response.clone(),
            media_kind: reply.media.as_ref().map(|m| m.kind.as_str().to_owned()),
            media_file_id: reply.media.as_ref().map(|m| m.file_id.clone()),
            media_caption: reply.media.as_ref().map(|m| m.caption.clone()),
        }
    }
}

impl CachedReply {
    pub fn match_mode(&self) -> MatchMode {
        MatchMode::parse(&self.match_mode).unwrap_or(MatchMode::Exact)
    }

    pub fn media(&self) -> Option<MediaPayload> {
        let kind = MediaKind::parse(self.media_kind.as_deref()?)?;
        Some(MediaPayload {
            kind,
            file_id: self.media_file_id.clone()?,
            caption: self.media_caption.clone().unwrap_or_default(),
        })
    }
}

impl CacheClient {
    pub async fn cache_auto_reply(
        &self,
        credential: &str,
        kind: &str,
        reply: &CachedReply,
    ) -> Result<(), CacheError> {
        let mut con = self.connection().await?;
        let payload = serde_json::to_string(reply)?;
        let _: () = con
            .set_ex(
                auto_reply_key(credential, kind, &reply.trigger),
                payload,
                AUTO_REPLY_TTL,
            )
            .await?;

        Ok(())
    }

    pub async fn cached_auto_reply(
        &self,
        credential: &str,
        kind: &str,
        trigger: &str,
    ) -> Result<Option<CachedReply>, CacheError> {
        let mut con = self.connection().await?;
        let raw: Option<String> = con.get(auto_reply_key(credential, kind, trigger)).await?;

        match raw {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    /// Every cached reply of one type for a tenant.
    pub async fn cached_auto_replies(
        &self,
        credential: &str,
        kind: &str,
    ) -> Result<Vec<CachedReply>, CacheError> {
        let keys = self
            .scan_keys(&format!("areply:{credential}:{kind}:*"))
            .await?;
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let mut con = self.connection().await?;
        let mut replies = Vec::with_capacity(keys.len());
        for key in keys {
            // A key can expire between the scan and the read.
            let raw: Option<String> = con.get(&key).await?;
            if let Some(json) = raw {
                replies.push(serde_json::from_str(&json)?);
            }
        }

        Ok(replies)
    }

    pub async fn drop_auto_reply(
        &self,
        credential: &str,
        kind: &str,
        trigger: &str,
    ) -> Result<(), CacheError> {
        let mut con = self.connection().await?;
        let _: () = con.del(auto_reply_key(credential, kind, trigger)).await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn cached_reply_rebuilds_its_media_payload() {
        let cached = CachedReply {
            trigger: "pricelist".to_owned(),
            match_mode: "exact".to_owned(),
            response: String::new(),
            media_kind: Some("photo".to_owned()),
            media_file_id: Some("AgACAgIAAxkBA".to_owned()),
            media_caption: Some("Current prices".to_owned()),
        };

        let media = cached.media().expect("media payload expected");
        assert_eq!(media.kind, MediaKind::Photo);
        assert_eq!(media.file_id, "AgACAgIAAxkBA");
        assert_eq!(media.caption, "Current prices");
    }

    #[test]
    fn text_reply_has_no_media() {
        let cached = CachedReply {
            trigger: "hours".to_owned(),
            match_mode: "contains".to_owned(),
            response: "Open 9-17".to_owned(),
            media_kind: None,
            media_file_id: None,
            media_caption: None,
        };

        assert_eq!(cached.media(), None);
        assert_eq!(cached.match_mode(), MatchMode::Contains);
    }
}
