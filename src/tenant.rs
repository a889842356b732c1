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

//! Per-bot context bundle.
//!
//! # Description
//!
//! Every handler receives one immutable [TenantContext] at construction
//! time instead of capturing identity through closures: the upstream client
//! handle, the plaintext credential (which is also the registry key and the
//! cache key prefix), the durable bot id and the owner chat. The manager
//! never hands a dispatcher a view of its own registry entry — this bundle
//! is all a dispatcher ever knows about itself.

use teloxide::payloads::{
    SendAnimationSetters, SendAudioSetters, SendDocumentSetters, SendMessageSetters,
    SendPhotoSetters, SendVideoSetters, SendVoiceSetters,
};
use teloxide::prelude::*;
use teloxide::types::{ChatId, InputFile, ParseMode};

use crate::store::{MediaKind, MediaPayload};

/// The factory tenant has no durable identity.
pub const FACTORY_BOT_ID: i64 = 0;

#[derive(Clone)]
pub struct TenantContext {
    pub bot: Bot,
    pub credential: String,
    pub bot_id: i64,
    pub owner: ChatId,
    pub username: String,
}

impl TenantContext {
    pub fn new(credential: String, bot_id: i64, owner_id: i64, username: String) -> Self {
        TenantContext {
            bot: Bot::new(credential.clone()),
            credential,
            bot_id,
            owner: ChatId(owner_id),
            username,
        }
    }

    pub fn owner_id(&self) -> i64 {
        self.owner.0
    }

    pub fn is_owner_chat(&self, chat: ChatId) -> bool {
        chat == self.owner
    }

    /// Render a stored payload (text with Markdown, or media with an
    /// optional caption) into a chat.
    pub async fn send_payload(
        &self,
        chat: ChatId,
        body: &str,
        media: Option<&MediaPayload>,
    ) -> Result<(), teloxide::RequestError> {
        let Some(media) = media else {
            self.bot
                .send_message(chat, body)
                .parse_mode(ParseMode::Markdown)
                .await?;
            return Ok(());
        };

        let file = InputFile::file_id(media.file_id.clone());
        let caption = if media.caption.is_empty() {
            None
        } else {
            Some(media.caption.clone())
        };

        match media.kind {
            MediaKind::Photo => {
                let mut req = self.bot.send_photo(chat, file);
                if let Some(caption) = caption {
                    req = req.caption(caption).parse_mode(ParseMode::Markdown);
                }
                req.await?;
            }
            MediaKind::Video => {
                let mut req = self.bot.send_video(chat, file);
                if let Some(caption) = caption {
                    req = req.caption(caption).parse_mode(ParseMode::Markdown);
                }
                req.await?;
            }
            MediaKind::Audio => {
                let mut req = self.bot.send_audio(chat, file);
                if let Some(caption) = caption {
                    req = req.caption(caption).parse_mode(ParseMode::Markdown);
                }
                req.await?;
            }
            MediaKind::Voice => {
                let mut req = self.bot.send_voice(chat, file);
                if let Some(caption) = caption {
                    req = req.caption(caption).parse_mode(ParseMode::Markdown);
                }
                req.await?;
            }
            MediaKind::Document => {
                let mut req = self.bot.send_document(chat, file);
                if let Some(caption) = caption {
                    req = req.caption(caption).parse_mode(ParseMode::Markdown);
                }
                req.await?;
            }
            MediaKind::Animation => {
                let mut req = self.bot.send_animation(chat, file);
                if let Some(caption) = caption {
                    req = req.caption(caption).parse_mode(ParseMode::Markdown);
                }
                req.await?;
            }
            // No caption on these two upstream.
            MediaKind::VideoNote => {
                self.bot.send_video_note(chat, file).await?;
            }
            MediaKind::Sticker => {
                self.bot.send_sticker(chat, file).await?;
            }
        }

        Ok(())
    }
}
