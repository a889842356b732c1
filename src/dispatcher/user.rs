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

//! The user-message pipeline: ban gate, forced subscription, auto-replies,
//! linkage and the forward to the owner.

use teloxide::payloads::SendMessageSetters;
use teloxide::prelude::*;
use teloxide::types::{ChatId, ParseMode, UserId};
use tracing::{debug, error, info, warn};

use super::Dispatcher;
use crate::{
    cache::CachedReply,
    errors::HandlerResult,
    keyboards,
    store::{AutoReplyKind, BotFlag, MatchMode},
    texts,
};

pub(super) async fn handle_user_message(d: &Dispatcher, msg: &Message) -> HandlerResult {
    let user_chat_id = msg.chat.id.0;

    // Banned users get no reaction at all, not even an error.
    if is_banned(d, user_chat_id).await {
        debug!("Dropped a message from a banned user");
        return Ok(());
    }

    if !subscription_gate(d, msg, user_chat_id).await? {
        return Ok(());
    }

    // `/start` renders the configured greeting instead of reaching the
    // owner.
    if msg.text().map(str::trim) == Some("/start") {
        let greeting = d.start_message().await;
        d.ctx()
            .bot
            .send_message(msg.chat.id, greeting)
            .parse_mode(ParseMode::Markdown)
            .await?;
        return Ok(());
    }

    let auto_replied = try_auto_reply(d, msg).await;
    if auto_replied && !d.flag_value(BotFlag::ForwardAutoReplies).await {
        return Ok(());
    }

    forward_to_owner(d, msg, user_chat_id).await
}

/// Cache-through ban check: positive side, negative side, then the store.
/// On a store hit the corresponding cache side is written back.
async fn is_banned(d: &Dispatcher, user_chat_id: i64) -> bool {
    let credential = &d.ctx().credential;

    match d.cache().ban_state(credential, user_chat_id).await {
        Ok(Some(banned)) => return banned,
        Ok(None) => {}
        Err(e) => debug!("Ban cache read failed: {e}"),
    }

    match d.store().is_banned(d.ctx().bot_id, user_chat_id).await {
        Ok(true) => {
            if let Err(e) = d.cache().mark_banned(credential, user_chat_id).await {
                debug!("Ban cache write failed: {e}");
            }
            true
        }
        Ok(false) => {
            if let Err(e) = d.cache().mark_not_banned(credential, user_chat_id).await {
                debug!("Ban cache write failed: {e}");
            }
            false
        }
        Err(e) => {
            // Both layers down: letting the message through is the lesser
            // failure.
            error!("Ban check fell back to allow: {e}");
            false
        }
    }
}

/// Forced-subscription gate. Returns `true` when the pipeline may proceed.
///
/// A membership lookup error is a lenient pass for that channel — losing
/// admin rights in one channel must not brick the tenant.
pub(crate) async fn subscription_gate(
    d: &Dispatcher,
    msg: &Message,
    user_chat_id: i64,
) -> Result<bool, Box<dyn std::error::Error + Send + Sync>> {
    if !d.flag_value(BotFlag::ForcedSubEnabled).await {
        return Ok(true);
    }

    let credential = &d.ctx().credential;
    if d.cache()
        .is_sub_verified(credential, user_chat_id)
        .await
        .unwrap_or(false)
    {
        return Ok(true);
    }

    let channels = match d.store().forced_channels(d.ctx().bot_id).await {
        Ok(channels) => channels,
        Err(e) => {
            error!("Channel list unavailable, gate passes leniently: {e}");
            return Ok(true);
        }
    };
    if channels.is_empty() {
        return Ok(true);
    }

    let mut missing = Vec::new();
    for channel in channels {
        match d
            .ctx()
            .bot
            .get_chat_member(ChatId(channel.channel_id), UserId(user_chat_id as u64))
            .await
        {
            Ok(member) => {
                let subscribed = member.kind.is_owner()
                    || member.kind.is_administrator()
                    || member.kind.is_member();
                if !subscribed {
                    missing.push(channel);
                }
            }
            Err(e) => {
                debug!("Membership lookup failed, lenient pass: {e}");
            }
        }
    }

    if missing.is_empty() {
        if let Err(e) = d.cache().mark_sub_verified(credential, user_chat_id).await {
            debug!("Sub-verified cache write failed: {e}");
        }
        return Ok(true);
    }

    let prompt = d.forced_sub_message().await;
    d.ctx()
        .bot
        .send_message(msg.chat.id, prompt)
        .reply_markup(keyboards::subscription_prompt(&missing))
        .await?;

    Ok(false)
}

/// Keyword and custom-command lookup. Returns `true` when a reply went out.
async fn try_auto_reply(d: &Dispatcher, msg: &Message) -> bool {
    let Some(text) = msg.text() else {
        return false;
    };
    let text = text.trim().to_lowercase();
    if text.is_empty() {
        return false;
    }

    let (kind, needle) = if let Some(rest) = text.strip_prefix('/') {
        let token = rest.split_whitespace().next().unwrap_or_default();
        // Commands may arrive as `/price@MyShopBot`.
        let token = token.split('@').next().unwrap_or_default();
        if token.is_empty() {
            return false;
        }
        (AutoReplyKind::Command, token.to_owned())
    } else {
        (AutoReplyKind::Keyword, text)
    };

    let Some(hit) = lookup_reply(d, kind, &needle).await else {
        return false;
    };

    info!("Auto-reply matched");
    let outcome = d
        .ctx()
        .send_payload(msg.chat.id, &hit.response, hit.media().as_ref())
        .await;

    match outcome {
        Ok(()) => true,
        Err(e) => {
            warn!("Auto-reply send failed: {e}");
            false
        }
    }
}

/// Prefer the cache; back-fill the whole dictionary from the store on the
/// first miss so `contains`-mode triggers can match too.
async fn lookup_reply(d: &Dispatcher, kind: AutoReplyKind, needle: &str) -> Option<CachedReply> {
    let credential = &d.ctx().credential;
    let kind_str = kind.as_str();

    // Point lookup covers the common exact-trigger case.
    if let Ok(Some(hit)) = d.cache().cached_auto_reply(credential, kind_str, needle).await {
        if hit.match_mode() == MatchMode::Exact {
            return Some(hit);
        }
    }

    let mut entries = match d.cache().cached_auto_replies(credential, kind_str).await {
        Ok(entries) => entries,
        Err(e) => {
            debug!("Auto-reply cache scan failed: {e}");
            Vec::new()
        }
    };

    if entries.is_empty() {
        let rows = match d.store().auto_replies(d.ctx().bot_id, kind).await {
            Ok(rows) => rows,
            Err(e) => {
                error!("Auto-reply store read failed: {e}");
                return None;
            }
        };

        entries = rows.iter().map(CachedReply::from).collect();
        for entry in &entries {
            if let Err(e) = d.cache().cache_auto_reply(credential, kind_str, entry).await {
                debug!("Auto-reply cache back-fill failed: {e}");
            }
        }
    }

    entries.into_iter().find(|entry| {
        let trigger = entry.trigger.to_lowercase();
        match entry.match_mode() {
            MatchMode::Exact => trigger == needle,
            MatchMode::Contains => needle.contains(&trigger),
        }
    })
}

/// Forward the message into the owner chat and persist the linkage.
async fn forward_to_owner(d: &Dispatcher, msg: &Message, user_chat_id: i64) -> HandlerResult {
    let ctx = d.ctx();
    let credential = &ctx.credential;

    // First-contact header, once per user.
    let seen = match d.cache().has_session(credential, user_chat_id).await {
        Ok(true) => true,
        Ok(false) => d
            .store()
            .has_any_link(ctx.bot_id, user_chat_id)
            .await
            .unwrap_or_else(|e| {
                debug!("Session fallback read failed: {e}");
                true
            }),
        Err(e) => {
            debug!("Session cache read failed: {e}");
            true
        }
    };

    if !seen {
        let (full_name, username) = match &msg.from {
            Some(user) => (user.full_name(), user.username.clone()),
            None => ("Unknown".to_owned(), None),
        };
        let header = texts::profile_header(&full_name, username.as_deref(), user_chat_id);
        if let Err(e) = ctx.bot.send_message(ctx.owner, header).await {
            warn!("Profile header send failed: {e}");
        }
    }

    let forwarded = match ctx
        .bot
        .forward_message(ctx.owner, msg.chat.id, msg.id)
        .await
    {
        Ok(forwarded) => forwarded,
        Err(e) => {
            warn!("Forward to owner failed: {e}");
            let _ = ctx
                .bot
                .send_message(msg.chat.id, texts::SEND_APOLOGY)
                .await;
            return Ok(());
        }
    };

    let admin_msg_id = i64::from(forwarded.id.0);

    // The cache write is what owner replies resolve against for 48 h; the
    // store write is the durable record. A store failure is logged but must
    // not block the flow — linkage then rides on the cache alone.
    if let Err(e) = d
        .store()
        .insert_link(admin_msg_id, user_chat_id, ctx.bot_id)
        .await
    {
        error!("Message-link store write failed: {e}");
    }
    if let Err(e) = d.cache().set_link(credential, admin_msg_id, user_chat_id).await {
        error!("Message-link cache write failed: {e}");
    }
    if let Err(e) = d.cache().mark_session(credential, user_chat_id).await {
        debug!("Session mark failed: {e}");
    }

    Ok(())
}
