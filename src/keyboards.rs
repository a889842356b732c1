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

//! Keyboards module
//!
//! # Description
//!
//! This module includes all the inline keyboards that are used within the
//! handlers of the runtime: the factory menu, the per-bot management rows,
//! the owner settings menu, the forced-subscription prompt and the broadcast
//! confirmation.
//!
//! Callback payloads follow the `tag` / `prefix:payload` convention the
//! dispatcher routes on; bot rows carry a short credential-prefix token,
//! never the credential itself.

use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup};
use url::Url;

use crate::store::{AutoReply, BotRecord, ForcedChannel, ScheduleStatus, ScheduledMessage};

/// Main factory menu. The stats row only renders for the operator.
pub fn factory_menu(show_stats: bool) -> InlineKeyboardMarkup {
    let mut keyboard = InlineKeyboardMarkup::default()
        .append_row([InlineKeyboardButton::callback("➕ Add bot", "addbot")])
        .append_row([InlineKeyboardButton::callback("🤖 My bots", "mybots")]);

    if show_stats {
        keyboard = keyboard.append_row([InlineKeyboardButton::callback("📊 Stats", "stats")]);
    }

    keyboard
}

/// One row per bot, running indicator first.
pub fn bot_list(bots: &[(BotRecord, bool)]) -> InlineKeyboardMarkup {
    let mut keyboard = InlineKeyboardMarkup::default();

    for (bot, running) in bots {
        let indicator = if *running { "🟢" } else { "🔴" };
        let label = format!("{indicator} @{}", bot.username);
        keyboard = keyboard.append_row([InlineKeyboardButton::callback(
            label,
            format!("bot:{}", credential_token(&bot.credential)),
        )]);
    }

    keyboard.append_row([InlineKeyboardButton::callback("« Back", "menu")])
}

/// Management row for one bot.
pub fn bot_details(credential: &str, running: bool) -> InlineKeyboardMarkup {
    let token = credential_token(credential);
    let toggle = if running {
        InlineKeyboardButton::callback("⏹ Stop", format!("stop:{token}"))
    } else {
        InlineKeyboardButton::callback("▶️ Start", format!("start:{token}"))
    };

    InlineKeyboardMarkup::default()
        .append_row([toggle])
        .append_row([InlineKeyboardButton::callback(
            "🗑 Delete",
            format!("delete:{token}"),
        )])
        .append_row([InlineKeyboardButton::callback("« Back", "mybots")])
}

pub fn confirm_delete(credential: &str) -> InlineKeyboardMarkup {
    let token = credential_token(credential);

    InlineKeyboardMarkup::default()
        .append_row([InlineKeyboardButton::callback(
            "⚠️ Yes, delete",
            format!("confirm_del:{token}"),
        )])
        .append_row([InlineKeyboardButton::callback(
            "« Back",
            format!("bot:{token}"),
        )])
}

/// Owner settings menu for a hosted bot.
pub fn owner_menu(
    forward_auto_replies: bool,
    forced_sub: bool,
    sent_confirmation: bool,
) -> InlineKeyboardMarkup {
    let mark = |on: bool| if on { "✅" } else { "☑️" };

    InlineKeyboardMarkup::default()
        .append_row([InlineKeyboardButton::callback("📣 Broadcast", "broadcast")])
        .append_row([
            InlineKeyboardButton::callback("✏️ Start message", "set_start"),
            InlineKeyboardButton::callback("💬 Add auto-reply", "add_reply"),
        ])
        .append_row([
            InlineKeyboardButton::callback("📢 Add channel", "add_channel"),
            InlineKeyboardButton::callback("⏰ Add schedule", "add_schedule"),
        ])
        .append_row([
            InlineKeyboardButton::callback("💬 Auto-replies", "replies"),
            InlineKeyboardButton::callback("📢 Channels", "channels"),
        ])
        .append_row([InlineKeyboardButton::callback("🗓 Schedules", "schedules")])
        .append_row([InlineKeyboardButton::callback(
            format!("{} Forward auto-replies", mark(forward_auto_replies)),
            "toggle:forward_auto_replies",
        )])
        .append_row([InlineKeyboardButton::callback(
            format!("{} Forced subscription", mark(forced_sub)),
            "toggle:forced_sub_enabled",
        )])
        .append_row([InlineKeyboardButton::callback(
            format!("{} Sent confirmation", mark(sent_confirmation)),
            "toggle:show_sent_confirmation",
        )])
        .append_row([InlineKeyboardButton::callback("📊 Stats", "botstats")])
}

/// Join links plus the "check subscription" callback for the gate prompt.
pub fn subscription_prompt(channels: &[ForcedChannel]) -> InlineKeyboardMarkup {
    let mut keyboard = InlineKeyboardMarkup::default();

    for channel in channels {
        if let Ok(url) = Url::parse(&channel.join_url()) {
            let title = if channel.title.is_empty() {
                format!("@{}", channel.username)
            } else {
                channel.title.clone()
            };
            keyboard = keyboard.append_row([InlineKeyboardButton::url(title, url)]);
        }
    }

    keyboard.append_row([InlineKeyboardButton::callback(
        "✅ I joined, check again",
        "checksub",
    )])
}

pub fn broadcast_confirm() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::default().append_row([
        InlineKeyboardButton::callback("✅ Send", "bcast_send"),
        InlineKeyboardButton::callback("❌ Cancel", "bcast_cancel"),
    ])
}

/// One row per schedule with pause/resume and cancel controls.
pub fn schedule_list(schedules: &[ScheduledMessage]) -> InlineKeyboardMarkup {
    let mut keyboard = InlineKeyboardMarkup::default();

    for schedule in schedules {
        let flip = match schedule.status {
            ScheduleStatus::Pending => {
                InlineKeyboardButton::callback("⏸", format!("sched_pause:{}", schedule.id))
            }
            ScheduleStatus::Paused => {
                InlineKeyboardButton::callback("▶️", format!("sched_resume:{}", schedule.id))
            }
            _ => InlineKeyboardButton::callback("·", "schedules"),
        };
        keyboard = keyboard.append_row([
            InlineKeyboardButton::callback(
                format!("#{} {}", schedule.id, schedule.kind.as_str()),
                "schedules",
            ),
            flip,
            InlineKeyboardButton::callback("🗑", format!("sched_cancel:{}", schedule.id)),
        ]);
    }

    keyboard
}

/// One row per forced channel with a remove control.
pub fn channel_list(channels: &[ForcedChannel]) -> InlineKeyboardMarkup {
    let mut keyboard = InlineKeyboardMarkup::default();

    for channel in channels {
        let label = if channel.title.is_empty() {
            format!("@{}", channel.username)
        } else {
            channel.title.clone()
        };
        keyboard = keyboard.append_row([
            InlineKeyboardButton::callback(label, "channels"),
            InlineKeyboardButton::callback("🗑", format!("rmchannel:{}", channel.channel_id)),
        ]);
    }

    keyboard
}

/// One row per auto-reply with a remove control. The payload re-encodes the
/// `(type, trigger)` pair the store is unique on.
pub fn reply_list(replies: &[AutoReply]) -> InlineKeyboardMarkup {
    let mut keyboard = InlineKeyboardMarkup::default();

    for reply in replies {
        let label = match reply.kind.as_str() {
            "command" => format!("/{}", reply.trigger),
            _ => reply.trigger.clone(),
        };
        keyboard = keyboard.append_row([
            InlineKeyboardButton::callback(label, "replies"),
            InlineKeyboardButton::callback(
                "🗑",
                format!("rmreply:{}:{}", reply.kind.as_str(), reply.trigger),
            ),
        ]);
    }

    keyboard
}

/// Length of the deterministic credential prefix carried in callback data.
/// Long enough to be unique within one owner's bot list, short enough to
/// stay inside the platform's 64-byte callback limit.
const CREDENTIAL_TOKEN_LEN: usize = 15;

pub fn credential_token(credential: &str) -> &str {
    match credential.char_indices().nth(CREDENTIAL_TOKEN_LEN) {
        Some((idx, _)) => &credential[..idx],
        None => credential,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn credential_token_is_a_prefix() {
        let cred = "7512345678:AAHk3vXq9yPzW0eRtY2uIoP1aSdF4gHj5kL";
        let token = credential_token(cred);
        assert_eq!(token.len(), 15);
        assert!(cred.starts_with(token));
    }

    #[test]
    fn short_credentials_are_returned_whole() {
        assert_eq!(credential_token("1:abc"), "1:abc");
    }
}
