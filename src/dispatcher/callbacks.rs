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

//! Callback-query routing for hosted bots.
//!
//! # Description
//!
//! Callback data is a short stable tag, optionally a `prefix:payload` pair
//! for buttons that carry dynamic data. [CallbackRoute::parse] splits the
//! two shapes apart; the route table below maps them onto handlers. Owner
//! controls check the caller against the tenant owner — buttons can be
//! pressed from forwarded messages by anyone.

use chrono::{Duration as ChronoDuration, Local, Utc};
use teloxide::payloads::{
    AnswerCallbackQuerySetters, EditMessageReplyMarkupSetters, SendMessageSetters,
};
use teloxide::prelude::*;
use teloxide::types::ChatId;
use tracing::{debug, info, warn};

use super::Dispatcher;
use crate::{broadcast, errors::HandlerResult, keyboards, scheduler, store::BotFlag, texts};

/// A parsed callback payload.
#[derive(Debug, PartialEq, Eq)]
pub enum CallbackRoute<'a> {
    Static(&'a str),
    Dynamic(&'a str, &'a str),
}

impl<'a> CallbackRoute<'a> {
    pub fn parse(data: &'a str) -> Self {
        match data.split_once(':') {
            Some((prefix, payload)) => CallbackRoute::Dynamic(prefix, payload),
            None => CallbackRoute::Static(data),
        }
    }
}

pub(super) async fn process(d: &Dispatcher, q: CallbackQuery) -> HandlerResult {
    let Some(data) = q.data.clone() else {
        return Ok(());
    };

    let from_owner = i64::try_from(q.from.id.0).unwrap_or_default() == d.ctx().owner_id();

    match CallbackRoute::parse(&data) {
        CallbackRoute::Static("checksub") => check_subscription(d, &q).await,
        route if !from_owner => {
            debug!("Ignored owner control {route:?} from a non-owner");
            d.ctx().bot.answer_callback_query(&q.id).await?;
            Ok(())
        }
        CallbackRoute::Static("broadcast") => enter_broadcast_mode(d, &q).await,
        CallbackRoute::Static("bcast_send") => confirm_broadcast(d, &q).await,
        CallbackRoute::Static("bcast_cancel") => cancel_broadcast(d, &q).await,
        CallbackRoute::Static("set_start") => {
            start_flow(d, &q, "set_start_message", "Send the new start message.").await
        }
        CallbackRoute::Static("add_reply") => {
            start_flow(
                d,
                &q,
                "add_reply_trigger",
                "Send the trigger: a keyword, or a /command.",
            )
            .await
        }
        CallbackRoute::Static("add_channel") => {
            start_flow(
                d,
                &q,
                "add_channel",
                "Send the channel @username. The bot must be an admin there.",
            )
            .await
        }
        CallbackRoute::Static("add_schedule") => {
            start_flow(d, &q, "add_schedule_text", "Send the message to schedule.").await
        }
        CallbackRoute::Static("schedules") => list_schedules(d, &q).await,
        CallbackRoute::Static("replies") => list_replies(d, &q).await,
        CallbackRoute::Static("channels") => list_channels(d, &q).await,
        CallbackRoute::Static("botstats") => send_bot_stats(d, &q).await,
        CallbackRoute::Dynamic("toggle", flag) => toggle_flag(d, &q, flag).await,
        CallbackRoute::Dynamic("rmreply", payload) => remove_reply(d, &q, payload).await,
        CallbackRoute::Dynamic("rmchannel", id) => remove_channel(d, &q, id).await,
        CallbackRoute::Dynamic("sched_pause", id) => pause_schedule(d, &q, id).await,
        CallbackRoute::Dynamic("sched_resume", id) => resume_schedule(d, &q, id).await,
        CallbackRoute::Dynamic("sched_cancel", id) => cancel_schedule(d, &q, id).await,
        route => {
            debug!("Unroutable callback {route:?}");
            d.ctx().bot.answer_callback_query(&q.id).await?;
            Ok(())
        }
    }
}

/// "I joined, check again" under the gate prompt.
async fn check_subscription(d: &Dispatcher, q: &CallbackQuery) -> HandlerResult {
    let Some(msg) = &q.message else {
        d.ctx().bot.answer_callback_query(&q.id).await?;
        return Ok(());
    };

    let user_chat_id = msg.chat().id.0;

    // Build a synthetic pass through the gate: on success the verified mark
    // is written and the prompt is replaced.
    let channels = d.store().forced_channels(d.ctx().bot_id).await?;
    let mut subscribed = true;
    for channel in &channels {
        match d
            .ctx()
            .bot
            .get_chat_member(ChatId(channel.channel_id), q.from.id)
            .await
        {
            Ok(member) => {
                if !(member.kind.is_owner()
                    || member.kind.is_administrator()
                    || member.kind.is_member())
                {
                    subscribed = false;
                }
            }
            Err(e) => debug!("Membership lookup failed, lenient pass: {e}"),
        }
    }

    if subscribed {
        if let Err(e) = d
            .cache()
            .mark_sub_verified(&d.ctx().credential, user_chat_id)
            .await
        {
            debug!("Sub-verified cache write failed: {e}");
        }
        let _ = d
            .ctx()
            .bot
            .edit_message_text(msg.chat().id, msg.id(), texts::SUBSCRIPTION_VERIFIED)
            .await;
        d.ctx().bot.answer_callback_query(&q.id).await?;
    } else {
        d.ctx()
            .bot
            .answer_callback_query(&q.id)
            .text(texts::SUBSCRIPTION_STILL_MISSING)
            .await?;
    }

    Ok(())
}

async fn enter_broadcast_mode(d: &Dispatcher, q: &CallbackQuery) -> HandlerResult {
    let ctx = d.ctx();
    d.cache()
        .set_broadcast_mode(&ctx.credential, ctx.owner_id())
        .await?;

    ctx.bot
        .send_message(
            ctx.owner,
            "📣 Broadcast mode. The next message you send here will be prepared \
             for every user of your bot.",
        )
        .await?;
    ctx.bot.answer_callback_query(&q.id).await?;

    Ok(())
}

async fn confirm_broadcast(d: &Dispatcher, q: &CallbackQuery) -> HandlerResult {
    let ctx = d.ctx();
    let pending = d
        .cache()
        .pending_broadcast(&ctx.credential, ctx.owner_id())
        .await?;

    let Some(msg_id) = pending else {
        d.cache()
            .clear_broadcast(&ctx.credential, ctx.owner_id())
            .await?;
        ctx.bot
            .answer_callback_query(&q.id)
            .text("This broadcast expired.")
            .await?;
        return Ok(());
    };

    // Clear both flags before the fan-out so a second confirm cannot fire
    // the same broadcast twice.
    d.cache()
        .clear_broadcast(&ctx.credential, ctx.owner_id())
        .await?;
    ctx.bot.answer_callback_query(&q.id).await?;

    let recipients = d.store().link_recipients(ctx.bot_id).await?;
    info!("Broadcast confirmed for {} recipients", recipients.len());

    let report = broadcast::copy_to_recipients(
        ctx,
        teloxide::types::MessageId(msg_id),
        &recipients,
        None,
    )
    .await;

    ctx.bot
        .send_message(ctx.owner, texts::broadcast_summary(&report))
        .await?;

    Ok(())
}

async fn cancel_broadcast(d: &Dispatcher, q: &CallbackQuery) -> HandlerResult {
    let ctx = d.ctx();
    d.cache()
        .clear_broadcast(&ctx.credential, ctx.owner_id())
        .await?;

    ctx.bot
        .answer_callback_query(&q.id)
        .text("Broadcast cancelled.")
        .await?;

    Ok(())
}

/// Enter an interactive flow: write the owner-state tag and prompt.
async fn start_flow(d: &Dispatcher, q: &CallbackQuery, tag: &str, prompt: &str) -> HandlerResult {
    let ctx = d.ctx();
    d.cache()
        .set_owner_state(&ctx.credential, ctx.owner_id(), tag)
        .await?;

    ctx.bot.send_message(ctx.owner, prompt).await?;
    ctx.bot.answer_callback_query(&q.id).await?;

    Ok(())
}

async fn toggle_flag(d: &Dispatcher, q: &CallbackQuery, flag_name: &str) -> HandlerResult {
    let ctx = d.ctx();
    let flag = match flag_name {
        "forward_auto_replies" => BotFlag::ForwardAutoReplies,
        "forced_sub_enabled" => BotFlag::ForcedSubEnabled,
        "show_sent_confirmation" => BotFlag::ShowSentConfirmation,
        _ => {
            warn!("Unknown flag in callback payload");
            ctx.bot.answer_callback_query(&q.id).await?;
            return Ok(());
        }
    };

    let new_value = d.store().toggle_bot_flag(ctx.bot_id, flag).await?;
    // Delete, don't overwrite: the next read refreshes authoritatively.
    d.cache().clear_flag(&ctx.credential, flag.column()).await?;

    ctx.bot
        .answer_callback_query(&q.id)
        .text(format!(
            "{} is now {}",
            flag.column(),
            if new_value { "on" } else { "off" }
        ))
        .await?;

    // Refresh the menu in place when we still can.
    if let Some(msg) = &q.message {
        let forward = d.flag_value(BotFlag::ForwardAutoReplies).await;
        let forced = d.flag_value(BotFlag::ForcedSubEnabled).await;
        let confirm = d.flag_value(BotFlag::ShowSentConfirmation).await;
        let _ = ctx
            .bot
            .edit_message_reply_markup(msg.chat().id, msg.id())
            .reply_markup(keyboards::owner_menu(forward, forced, confirm))
            .await;
    }

    Ok(())
}

async fn list_schedules(d: &Dispatcher, q: &CallbackQuery) -> HandlerResult {
    let ctx = d.ctx();
    let schedules = d.store().schedules_for_bot(ctx.bot_id).await?;

    if schedules.is_empty() {
        ctx.bot
            .answer_callback_query(&q.id)
            .text("No scheduled messages yet.")
            .await?;
        return Ok(());
    }

    let mut lines = vec!["🗓 Scheduled messages:".to_owned()];
    for schedule in &schedules {
        lines.push(format!(
            "#{} [{}] {} — next {}",
            schedule.id,
            schedule.status.as_str(),
            texts::preview(&schedule.body),
            schedule
                .next_fire_at
                .with_timezone(&Local)
                .format("%Y-%m-%d %H:%M"),
        ));
    }

    ctx.bot
        .send_message(ctx.owner, lines.join("\n"))
        .reply_markup(keyboards::schedule_list(&schedules))
        .await?;
    ctx.bot.answer_callback_query(&q.id).await?;

    Ok(())
}

async fn list_replies(d: &Dispatcher, q: &CallbackQuery) -> HandlerResult {
    let ctx = d.ctx();
    let replies = d.store().all_auto_replies(ctx.bot_id).await?;

    if replies.is_empty() {
        ctx.bot
            .answer_callback_query(&q.id)
            .text("No auto-replies yet.")
            .await?;
        return Ok(());
    }

    ctx.bot
        .send_message(ctx.owner, "💬 Auto-replies:")
        .reply_markup(keyboards::reply_list(&replies))
        .await?;
    ctx.bot.answer_callback_query(&q.id).await?;

    Ok(())
}

async fn remove_reply(d: &Dispatcher, q: &CallbackQuery, payload: &str) -> HandlerResult {
    let ctx = d.ctx();
    let Some((kind_str, trigger)) = payload.split_once(':') else {
        ctx.bot.answer_callback_query(&q.id).await?;
        return Ok(());
    };
    let Some(kind) = crate::store::AutoReplyKind::parse(kind_str) else {
        ctx.bot.answer_callback_query(&q.id).await?;
        return Ok(());
    };

    let removed = d
        .store()
        .delete_auto_reply(ctx.bot_id, trigger, kind)
        .await?;
    if let Err(e) = d
        .cache()
        .drop_auto_reply(&ctx.credential, kind_str, trigger)
        .await
    {
        debug!("Auto-reply cache drop failed: {e}");
    }

    ctx.bot
        .answer_callback_query(&q.id)
        .text(if removed {
            "Auto-reply removed."
        } else {
            "That auto-reply was already gone."
        })
        .await?;

    Ok(())
}

async fn list_channels(d: &Dispatcher, q: &CallbackQuery) -> HandlerResult {
    let ctx = d.ctx();
    let channels = d.store().forced_channels(ctx.bot_id).await?;

    if channels.is_empty() {
        ctx.bot
            .answer_callback_query(&q.id)
            .text("No forced channels configured.")
            .await?;
        return Ok(());
    }

    ctx.bot
        .send_message(ctx.owner, "📢 Forced channels:")
        .reply_markup(keyboards::channel_list(&channels))
        .await?;
    ctx.bot.answer_callback_query(&q.id).await?;

    Ok(())
}

async fn remove_channel(d: &Dispatcher, q: &CallbackQuery, id: &str) -> HandlerResult {
    let ctx = d.ctx();
    let Ok(channel_id) = id.parse::<i64>() else {
        ctx.bot.answer_callback_query(&q.id).await?;
        return Ok(());
    };

    let removed = d
        .store()
        .remove_forced_channel(ctx.bot_id, channel_id)
        .await?;
    // The gate changed; every cached pass is void.
    if let Err(e) = d.cache().clear_sub_verified(&ctx.credential).await {
        debug!("Sub-verified sweep failed: {e}");
    }

    ctx.bot
        .answer_callback_query(&q.id)
        .text(if removed {
            "Channel removed from the gate."
        } else {
            "That channel was already gone."
        })
        .await?;

    Ok(())
}

async fn send_bot_stats(d: &Dispatcher, q: &CallbackQuery) -> HandlerResult {
    let ctx = d.ctx();
    let since = Utc::now() - ChronoDuration::days(30);
    let stats = d.store().bot_stats(ctx.bot_id, since).await?;

    let card = format!(
        "📊 Last 30 days\nUsers total: {}\nNew users: {}\nMessages: {}\nBans: {}",
        stats.total_users, stats.new_users, stats.messages, stats.bans
    );
    ctx.bot.send_message(ctx.owner, card).await?;
    ctx.bot.answer_callback_query(&q.id).await?;

    Ok(())
}

async fn pause_schedule(d: &Dispatcher, q: &CallbackQuery, id: &str) -> HandlerResult {
    let ctx = d.ctx();
    let Ok(id) = id.parse::<i64>() else {
        ctx.bot.answer_callback_query(&q.id).await?;
        return Ok(());
    };

    let paused = d.store().pause_schedule(id, ctx.bot_id).await?;
    ctx.bot
        .answer_callback_query(&q.id)
        .text(if paused {
            "Schedule paused."
        } else {
            "Schedule is not pausable."
        })
        .await?;

    Ok(())
}

async fn resume_schedule(d: &Dispatcher, q: &CallbackQuery, id: &str) -> HandlerResult {
    let ctx = d.ctx();
    let Ok(id) = id.parse::<i64>() else {
        ctx.bot.answer_callback_query(&q.id).await?;
        return Ok(());
    };

    let Some(schedule) = d.store().schedule_by_id(id, ctx.bot_id).await? else {
        ctx.bot.answer_callback_query(&q.id).await?;
        return Ok(());
    };

    let next_fire = scheduler::compute_next_fire(
        schedule.kind,
        schedule.fire_at,
        schedule.time_of_day,
        schedule.day_of_week,
        Local::now(),
    );
    let resumed = d
        .store()
        .resume_schedule(id, ctx.bot_id, next_fire)
        .await?;

    ctx.bot
        .answer_callback_query(&q.id)
        .text(if resumed {
            "Schedule resumed."
        } else {
            "Schedule is not paused."
        })
        .await?;

    Ok(())
}

async fn cancel_schedule(d: &Dispatcher, q: &CallbackQuery, id: &str) -> HandlerResult {
    let ctx = d.ctx();
    let Ok(id) = id.parse::<i64>() else {
        ctx.bot.answer_callback_query(&q.id).await?;
        return Ok(());
    };

    let cancelled = d.store().cancel_schedule(id, ctx.bot_id).await?;
    ctx.bot
        .answer_callback_query(&q.id)
        .text(if cancelled {
            "Schedule cancelled."
        } else {
            "Schedule was already finished."
        })
        .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn bare_tags_parse_as_static() {
        assert_eq!(
            CallbackRoute::parse("checksub"),
            CallbackRoute::Static("checksub")
        );
    }

    #[test]
    fn prefixed_tags_parse_as_dynamic() {
        assert_eq!(
            CallbackRoute::parse("sched_pause:17"),
            CallbackRoute::Dynamic("sched_pause", "17")
        );
    }

    #[test]
    fn payloads_may_contain_separators() {
        assert_eq!(
            CallbackRoute::parse("bot:7512345678:AAHk"),
            CallbackRoute::Dynamic("bot", "7512345678:AAHk")
        );
    }
}
