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

//! Owner-side message handling: the menu, broadcast capture and the
//! reply-to-user path with its reserved verbs.

use teloxide::payloads::{SendMessageSetters, SetMessageReactionSetters};
use teloxide::prelude::*;
use teloxide::types::{ChatId, ReactionType};
use tracing::{debug, info, warn};

use super::Dispatcher;
use crate::{errors::HandlerResult, keyboards, store::BotFlag, texts};

/// Emoji applied to an owner's reply once it reached the user.
const SENT_REACTION: &str = "👍";

pub(super) async fn handle_owner_message(d: &Dispatcher, msg: &Message) -> HandlerResult {
    let text = msg.text().map(str::trim).unwrap_or_default();

    if text == "/start" || text == "/menu" {
        return send_owner_menu(d, msg).await;
    }

    let ctx = d.ctx();
    let credential = &ctx.credential;
    let owner_id = ctx.owner_id();

    // Broadcast capture: the first message after entering broadcast mode
    // becomes the pending broadcast, waiting for an inline confirmation.
    if d.cache().broadcast_mode(credential, owner_id).await? {
        let pending = d.cache().pending_broadcast(credential, owner_id).await?;
        if pending.is_none() {
            d.cache()
                .set_pending_broadcast(credential, owner_id, msg.id.0)
                .await?;
            ctx.bot
                .send_message(
                    msg.chat.id,
                    "Send this to every user of your bot?",
                )
                .reply_markup(keyboards::broadcast_confirm())
                .await?;
            return Ok(());
        }
        // A pending broadcast is already awaiting its buttons; fall through
        // so ordinary replies keep working.
    }

    handle_owner_reply(d, msg, text).await
}

async fn send_owner_menu(d: &Dispatcher, msg: &Message) -> HandlerResult {
    let forward = d.flag_value(BotFlag::ForwardAutoReplies).await;
    let forced = d.flag_value(BotFlag::ForcedSubEnabled).await;
    let confirm = d.flag_value(BotFlag::ShowSentConfirmation).await;

    d.ctx()
        .bot
        .send_message(msg.chat.id, "⚙️ Manage your bot:")
        .reply_markup(keyboards::owner_menu(forward, forced, confirm))
        .await?;

    Ok(())
}

/// §owner-reply: resolve the linkage, honour the reserved verbs, otherwise
/// copy the reply into the user's chat.
async fn handle_owner_reply(d: &Dispatcher, msg: &Message, text: &str) -> HandlerResult {
    let ctx = d.ctx();

    let Some(reply_to) = msg.reply_to_message() else {
        ctx.bot
            .send_message(msg.chat.id, texts::REPLY_GUIDANCE)
            .await?;
        return Ok(());
    };

    let Some(user_chat_id) = resolve_link(d, i64::from(reply_to.id.0)).await else {
        ctx.bot
            .send_message(msg.chat.id, texts::SENDER_NOT_FOUND)
            .await?;
        return Ok(());
    };

    match text.to_lowercase().as_str() {
        "info" => send_info_card(d, msg, user_chat_id).await,
        "ban" | "/ban" => ban_from_reply(d, msg, user_chat_id).await,
        "unban" | "/unban" => unban_from_reply(d, msg, user_chat_id).await,
        _ => copy_reply_to_user(d, msg, user_chat_id).await,
    }
}

/// Cache first, store on miss, optional back-fill on a store hit.
async fn resolve_link(d: &Dispatcher, admin_msg_id: i64) -> Option<i64> {
    let credential = &d.ctx().credential;

    match d.cache().get_link(credential, admin_msg_id).await {
        Ok(Some(user)) => return Some(user),
        Ok(None) => {}
        Err(e) => debug!("Link cache read failed: {e}"),
    }

    match d.store().resolve_link(admin_msg_id, d.ctx().bot_id).await {
        Ok(Some(user)) => {
            if let Err(e) = d.cache().set_link(credential, admin_msg_id, user).await {
                debug!("Link cache back-fill failed: {e}");
            }
            Some(user)
        }
        Ok(None) => None,
        Err(e) => {
            warn!("Link store read failed: {e}");
            None
        }
    }
}

async fn send_info_card(d: &Dispatcher, msg: &Message, user_chat_id: i64) -> HandlerResult {
    let ctx = d.ctx();

    // Names come from the upstream profile; the store only knows ids.
    let (full_name, username) = match ctx.bot.get_chat(ChatId(user_chat_id)).await {
        Ok(chat) => {
            let first = chat.first_name().unwrap_or_default().to_owned();
            let last = chat.last_name().unwrap_or_default();
            let full = if last.is_empty() {
                first
            } else {
                format!("{first} {last}")
            };
            (full, chat.username().map(str::to_owned))
        }
        Err(e) => {
            debug!("Chat profile lookup failed: {e}");
            ("Unknown".to_owned(), None)
        }
    };

    let first_contact = d
        .store()
        .first_contact(ctx.bot_id, user_chat_id)
        .await
        .unwrap_or_default();
    let banned = d
        .store()
        .is_banned(ctx.bot_id, user_chat_id)
        .await
        .unwrap_or(false);

    let card = texts::info_card(
        &full_name,
        username.as_deref(),
        user_chat_id,
        first_contact,
        banned,
    );
    ctx.bot.send_message(msg.chat.id, card).await?;

    Ok(())
}

/// The `ban` verb: persist, fix both cache sides, notify the user once,
/// confirm to the owner.
async fn ban_from_reply(d: &Dispatcher, msg: &Message, user_chat_id: i64) -> HandlerResult {
    let ctx = d.ctx();

    let newly_banned = d
        .store()
        .ban_user(ctx.bot_id, user_chat_id, ctx.owner_id())
        .await?;

    if let Err(e) = d.cache().mark_banned(&ctx.credential, user_chat_id).await {
        debug!("Ban cache update failed: {e}");
    }

    if newly_banned {
        info!("User banned by owner reply");
        if let Err(e) = ctx
            .bot
            .send_message(ChatId(user_chat_id), texts::BAN_NOTICE)
            .await
        {
            debug!("Ban notice could not be delivered: {e}");
        }
    }

    let confirmation = if newly_banned {
        "🚫 User banned. Their messages will be dropped silently."
    } else {
        "🚫 User was already banned."
    };
    ctx.bot.send_message(msg.chat.id, confirmation).await?;

    Ok(())
}

async fn unban_from_reply(d: &Dispatcher, msg: &Message, user_chat_id: i64) -> HandlerResult {
    let ctx = d.ctx();

    let removed = d.store().unban_user(ctx.bot_id, user_chat_id).await?;
    // Drops the positive side; the short-lived negative entry takes over.
    if let Err(e) = d
        .cache()
        .mark_not_banned(&ctx.credential, user_chat_id)
        .await
    {
        debug!("Unban cache update failed: {e}");
    }

    let confirmation = if removed {
        "✅ User unbanned."
    } else {
        "This user was not banned."
    };
    ctx.bot.send_message(msg.chat.id, confirmation).await?;

    Ok(())
}

/// Copy (not forward) the owner's reply into the user's chat, then react on
/// success when the tenant wants the acknowledgement.
async fn copy_reply_to_user(d: &Dispatcher, msg: &Message, user_chat_id: i64) -> HandlerResult {
    let ctx = d.ctx();

    if let Err(e) = ctx
        .bot
        .copy_message(ChatId(user_chat_id), msg.chat.id, msg.id)
        .await
    {
        warn!("Reply copy failed: {e}");
        ctx.bot
            .send_message(
                msg.chat.id,
                "⚠️ Could not deliver your reply. The user may have blocked the bot.",
            )
            .await?;
        return Ok(());
    }

    if d.flag_value(BotFlag::ShowSentConfirmation).await {
        let reaction = ReactionType::Emoji {
            emoji: SENT_REACTION.to_owned(),
        };
        if let Err(e) = ctx
            .bot
            .set_message_reaction(msg.chat.id, msg.id)
            .reaction(vec![reaction])
            .await
        {
            debug!("Acknowledgement reaction failed: {e}");
        }
    }

    Ok(())
}
