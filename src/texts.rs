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

//! User-visible message texts.
//!
//! Templates with placeholders live in `data/templates`; everything short
//! enough to read inline stays here. Handlers should not format prose
//! themselves.

use chrono::{DateTime, Local, Utc};

use crate::broadcast::BroadcastReport;

pub const REPLY_GUIDANCE: &str =
    "To answer someone, use Telegram's reply function on the message I forwarded to you.";

pub const SENDER_NOT_FOUND: &str =
    "Could not find the original sender of that message. The link may have expired.";

pub const SEND_APOLOGY: &str = "Sorry, your message could not be delivered. Please try again later.";

pub const BAN_NOTICE: &str = "You have been banned from contacting this bot.";

pub const DEFAULT_START_MESSAGE: &str =
    "Hello! Write your message here and the owner will get back to you.";

pub const DEFAULT_FORCED_SUB_MESSAGE: &str =
    "Please join the channels below before writing, then press the button to continue.";

pub const SUBSCRIPTION_VERIFIED: &str = "Thank you! You can write your message now.";

pub const SUBSCRIPTION_STILL_MISSING: &str = "You have not joined all required channels yet.";

/// Factory welcome, `{}` = caller's first name.
pub fn factory_welcome(name: &str) -> String {
    format!(include_str!("../data/templates/factory_welcome.txt"), name)
}

/// One-time header shown to the owner before a new user's first forward.
pub fn profile_header(full_name: &str, username: Option<&str>, user_id: i64) -> String {
    let handle = match username {
        Some(u) => format!("@{u}"),
        None => "no username".to_owned(),
    };
    format!("👤 New user: {full_name} ({handle}, id {user_id})")
}

/// Profile card behind the owner's `info` verb.
pub fn info_card(
    full_name: &str,
    username: Option<&str>,
    user_id: i64,
    first_contact: Option<DateTime<Utc>>,
    banned: bool,
) -> String {
    let handle = match username {
        Some(u) => format!("@{u}"),
        None => "—".to_owned(),
    };
    let first_seen = match first_contact {
        Some(at) => at
            .with_timezone(&Local)
            .format("%Y-%m-%d %H:%M")
            .to_string(),
        None => "unknown".to_owned(),
    };
    let status = if banned { "banned" } else { "active" };

    format!(
        "👤 {full_name}\nUsername: {handle}\nID: {user_id}\nFirst message: {first_seen}\nStatus: {status}"
    )
}

pub fn broadcast_summary(report: &BroadcastReport) -> String {
    format!(
        "📣 Broadcast finished.\nAttempted: {}\nDelivered: {}\nBlocked the bot: {}\nFailed: {}",
        report.attempted(),
        report.success,
        report.blocked,
        report.failed
    )
}

pub fn schedule_summary(body_preview: &str, report: &BroadcastReport) -> String {
    format!(
        "⏰ Scheduled message \"{body_preview}\" went out.\nDelivered: {}\nBlocked: {}\nFailed: {}",
        report.success, report.blocked, report.failed
    )
}

/// Trim a payload body down to something that fits in a summary card.
pub fn preview(body: &str) -> String {
    const MAX: usize = 32;
    if body.chars().count() <= MAX {
        body.to_owned()
    } else {
        let cut: String = body.chars().take(MAX).collect();
        format!("{cut}…")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn preview_keeps_short_bodies() {
        assert_eq!(preview("morning"), "morning");
    }

    #[test]
    fn preview_truncates_on_char_boundaries() {
        let long = "а".repeat(40);
        let cut = preview(&long);
        assert!(cut.ends_with('…'));
        assert_eq!(cut.chars().count(), 33);
    }

    #[test]
    fn profile_header_handles_missing_username() {
        let header = profile_header("Ada Lovelace", None, 200);
        assert!(header.contains("Ada Lovelace"));
        assert!(header.contains("no username"));
        assert!(header.contains("200"));
    }
}
