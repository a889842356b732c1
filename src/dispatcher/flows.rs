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

//! Owner-state step processors.
//!
//! # Description
//!
//! The interactive flows are deliberately thin shells over the cache
//! primitives: a state tag names the step the owner is inside, temp slots
//! carry the inputs collected so far, and finishing (or abandoning — the
//! tags expire on their own) clears both. Each processor returns `true`
//! when it consumed the message.

use chrono::{Local, NaiveDate, NaiveTime, TimeZone, Utc};
use teloxide::prelude::*;
use teloxide::types::Recipient;
use tracing::{debug, info, warn};

use super::Dispatcher;
use crate::{
    scheduler,
    store::{
        AutoReplyKind, ForcedChannel, MatchMode, MediaKind, MediaPayload, NewAutoReply,
        NewSchedule, ScheduleKind,
    },
};

/// Route the owner's message into the flow named by their state tag.
/// Returns `true` when a flow consumed the message.
pub(super) async fn continue_flow(
    d: &Dispatcher,
    msg: &Message,
) -> Result<bool, Box<dyn std::error::Error + Send + Sync>> {
    let ctx = d.ctx();
    let Some(tag) = d
        .cache()
        .owner_state(&ctx.credential, ctx.owner_id())
        .await?
    else {
        return Ok(false);
    };

    let handled = match tag.as_str() {
        "set_start_message" => set_start_message(d, msg).await?,
        "add_reply_trigger" => add_reply_trigger(d, msg).await?,
        "add_reply_response" => add_reply_response(d, msg).await?,
        "add_channel" => add_channel(d, msg).await?,
        "add_schedule_text" => add_schedule_text(d, msg).await?,
        "add_schedule_time" => add_schedule_time(d, msg).await?,
        _ => {
            debug!("Stale owner-state tag '{tag}', clearing");
            d.cache()
                .clear_owner_state(&ctx.credential, ctx.owner_id())
                .await?;
            false
        }
    };

    Ok(handled)
}

async fn finish_flow(d: &Dispatcher) {
    let ctx = d.ctx();
    if let Err(e) = d
        .cache()
        .clear_owner_state(&ctx.credential, ctx.owner_id())
        .await
    {
        debug!("Owner-state clear failed: {e}");
    }
    if let Err(e) = d
        .cache()
        .clear_temp_slots(&ctx.credential, ctx.owner_id())
        .await
    {
        debug!("Temp-slot clear failed: {e}");
    }
}

async fn set_start_message(
    d: &Dispatcher,
    msg: &Message,
) -> Result<bool, Box<dyn std::error::Error + Send + Sync>> {
    let ctx = d.ctx();
    let Some(text) = msg.text() else {
        ctx.bot
            .send_message(ctx.owner, "The start message must be text. Try again.")
            .await?;
        return Ok(true);
    };

    d.store().update_start_message(ctx.bot_id, text).await?;
    d.cache()
        .set_setting(&ctx.credential, "start_message", text)
        .await?;
    finish_flow(d).await;

    info!("Start message updated");
    ctx.bot
        .send_message(ctx.owner, "✅ Start message updated.")
        .await?;

    Ok(true)
}

async fn add_reply_trigger(
    d: &Dispatcher,
    msg: &Message,
) -> Result<bool, Box<dyn std::error::Error + Send + Sync>> {
    let ctx = d.ctx();
    let Some(text) = msg.text() else {
        ctx.bot
            .send_message(ctx.owner, "The trigger must be text. Try again.")
            .await?;
        return Ok(true);
    };

    let trigger = text.trim().to_lowercase();
    if trigger.is_empty() {
        ctx.bot
            .send_message(ctx.owner, "The trigger cannot be empty.")
            .await?;
        return Ok(true);
    }

    d.cache()
        .set_temp_slot(&ctx.credential, ctx.owner_id(), "trigger", &trigger)
        .await?;
    d.cache()
        .set_owner_state(&ctx.credential, ctx.owner_id(), "add_reply_response")
        .await?;

    ctx.bot
        .send_message(
            ctx.owner,
            "Now send the response: text, or a photo/video/document with an \
             optional caption.",
        )
        .await?;

    Ok(true)
}

async fn add_reply_response(
    d: &Dispatcher,
    msg: &Message,
) -> Result<bool, Box<dyn std::error::Error + Send + Sync>> {
    let ctx = d.ctx();
    let Some(trigger) = d
        .cache()
        .temp_slot(&ctx.credential, ctx.owner_id(), "trigger")
        .await?
    else {
        // The trigger slot expired under the owner.
        finish_flow(d).await;
        ctx.bot
            .send_message(ctx.owner, "That took too long — start the auto-reply again.")
            .await?;
        return Ok(true);
    };

    let media = extract_media(msg);
    let response = msg.text().unwrap_or_default().to_owned();
    if response.is_empty() && media.is_none() {
        ctx.bot
            .send_message(ctx.owner, "Send text or a supported media type.")
            .await?;
        return Ok(true);
    }

    let kind = if trigger.starts_with('/') {
        AutoReplyKind::Command
    } else {
        AutoReplyKind::Keyword
    };
    let trigger = trigger.trim_start_matches('/').to_owned();

    let reply = NewAutoReply {
        trigger,
        kind,
        match_mode: MatchMode::Exact,
        response,
        media,
    };
    let stored = d.store().upsert_auto_reply(ctx.bot_id, &reply).await?;
    d.cache()
        .cache_auto_reply(&ctx.credential, kind.as_str(), &(&stored).into())
        .await?;
    finish_flow(d).await;

    info!("Auto-reply stored");
    ctx.bot
        .send_message(
            ctx.owner,
            format!("✅ Auto-reply for \"{}\" saved.", stored.trigger),
        )
        .await?;

    Ok(true)
}

async fn add_channel(
    d: &Dispatcher,
    msg: &Message,
) -> Result<bool, Box<dyn std::error::Error + Send + Sync>> {
    let ctx = d.ctx();
    let Some(text) = msg.text() else {
        ctx.bot
            .send_message(ctx.owner, "Send the channel as @username.")
            .await?;
        return Ok(true);
    };

    let Some(username) = channel_username(text) else {
        ctx.bot
            .send_message(ctx.owner, "That does not look like a channel username.")
            .await?;
        return Ok(true);
    };

    let chat = match ctx
        .bot
        .get_chat(Recipient::ChannelUsername(format!("@{username}")))
        .await
    {
        Ok(chat) => chat,
        Err(e) => {
            warn!("Channel resolve failed: {e}");
            ctx.bot
                .send_message(
                    ctx.owner,
                    "Could not access that channel. Make sure the bot is an admin there.",
                )
                .await?;
            return Ok(true);
        }
    };

    let channel = ForcedChannel {
        bot_id: ctx.bot_id,
        channel_id: chat.id.0,
        username: chat.username().unwrap_or(&username).to_owned(),
        title: chat.title().unwrap_or_default().to_owned(),
        invite_url: chat.invite_link().unwrap_or_default().to_owned(),
    };
    d.store().add_forced_channel(&channel).await?;
    // Every cached proof is void once the channel list changes.
    d.cache().clear_sub_verified(&ctx.credential).await?;
    finish_flow(d).await;

    info!("Forced channel added");
    ctx.bot
        .send_message(
            ctx.owner,
            format!("✅ Channel @{} added to the subscription gate.", channel.username),
        )
        .await?;

    Ok(true)
}

async fn add_schedule_text(
    d: &Dispatcher,
    msg: &Message,
) -> Result<bool, Box<dyn std::error::Error + Send + Sync>> {
    let ctx = d.ctx();
    let media = extract_media(msg);
    let body = msg.text().unwrap_or_default().to_owned();

    if body.is_empty() && media.is_none() {
        ctx.bot
            .send_message(ctx.owner, "Send the text or media to schedule.")
            .await?;
        return Ok(true);
    }

    d.cache()
        .set_temp_slot(&ctx.credential, ctx.owner_id(), "body", &body)
        .await?;
    if let Some(media) = &media {
        d.cache()
            .set_temp_slot(
                &ctx.credential,
                ctx.owner_id(),
                "media_kind",
                media.kind.as_str(),
            )
            .await?;
        d.cache()
            .set_temp_slot(
                &ctx.credential,
                ctx.owner_id(),
                "media_file_id",
                &media.file_id,
            )
            .await?;
        d.cache()
            .set_temp_slot(
                &ctx.credential,
                ctx.owner_id(),
                "media_caption",
                &media.caption,
            )
            .await?;
    }
    d.cache()
        .set_owner_state(&ctx.credential, ctx.owner_id(), "add_schedule_time")
        .await?;

    ctx.bot
        .send_message(
            ctx.owner,
            "When should it go out?\n\
             • daily: `14:30`\n\
             • weekly: `mon 14:30` (or `1 14:30`, 0 = Sunday)\n\
             • once: `2026-03-01 14:30`",
        )
        .await?;

    Ok(true)
}

async fn add_schedule_time(
    d: &Dispatcher,
    msg: &Message,
) -> Result<bool, Box<dyn std::error::Error + Send + Sync>> {
    let ctx = d.ctx();
    let Some(text) = msg.text() else {
        ctx.bot
            .send_message(ctx.owner, "Send the time as text.")
            .await?;
        return Ok(true);
    };

    let Some(spec) = parse_schedule_spec(text) else {
        ctx.bot
            .send_message(
                ctx.owner,
                "Could not parse that. Use `14:30`, `mon 14:30` or `2026-03-01 14:30`.",
            )
            .await?;
        return Ok(true);
    };

    let body = d
        .cache()
        .temp_slot(&ctx.credential, ctx.owner_id(), "body")
        .await?
        .unwrap_or_default();
    let media = match d
        .cache()
        .temp_slot(&ctx.credential, ctx.owner_id(), "media_kind")
        .await?
    {
        Some(kind_str) => {
            let file_id = d
                .cache()
                .temp_slot(&ctx.credential, ctx.owner_id(), "media_file_id")
                .await?
                .unwrap_or_default();
            let caption = d
                .cache()
                .temp_slot(&ctx.credential, ctx.owner_id(), "media_caption")
                .await?
                .unwrap_or_default();
            MediaKind::parse(&kind_str).map(|kind| MediaPayload {
                kind,
                file_id,
                caption,
            })
        }
        None => None,
    };

    let now = Local::now();
    let (kind, fire_at, time_of_day, day_of_week) = match spec {
        ScheduleSpec::Once(date, time) => {
            let local = match Local.from_local_datetime(&date.and_time(time)).earliest() {
                Some(at) => at,
                None => {
                    ctx.bot
                        .send_message(ctx.owner, "That local time does not exist.")
                        .await?;
                    return Ok(true);
                }
            };
            if local <= now {
                ctx.bot
                    .send_message(ctx.owner, "That time is already in the past.")
                    .await?;
                return Ok(true);
            }
            (
                ScheduleKind::Once,
                Some(local.with_timezone(&Utc)),
                None,
                None,
            )
        }
        ScheduleSpec::Daily(time) => (ScheduleKind::Daily, None, Some(time), None),
        ScheduleSpec::Weekly(day, time) => {
            (ScheduleKind::Weekly, None, Some(time), Some(i16::from(day)))
        }
    };

    let next_fire_at = scheduler::compute_next_fire(kind, fire_at, time_of_day, day_of_week, now);
    let schedule = NewSchedule {
        owner_id: ctx.owner_id(),
        body,
        media,
        kind,
        fire_at,
        time_of_day,
        day_of_week,
        next_fire_at,
    };
    let stored = d.store().create_schedule(ctx.bot_id, &schedule).await?;
    finish_flow(d).await;

    info!("Schedule #{} created", stored.id);
    ctx.bot
        .send_message(
            ctx.owner,
            format!(
                "✅ Scheduled. First send: {}.",
                stored
                    .next_fire_at
                    .with_timezone(&Local)
                    .format("%Y-%m-%d %H:%M")
            ),
        )
        .await?;

    Ok(true)
}

/// Pull the largest/only attachment out of a message.
fn extract_media(msg: &Message) -> Option<MediaPayload> {
    let caption = msg.caption().unwrap_or_default().to_owned();

    if let Some(photos) = msg.photo() {
        let largest = photos.iter().max_by_key(|p| p.width * p.height)?;
        return Some(MediaPayload {
            kind: MediaKind::Photo,
            file_id: largest.file.id.clone(),
            caption,
        });
    }
    if let Some(video) = msg.video() {
        return Some(MediaPayload {
            kind: MediaKind::Video,
            file_id: video.file.id.clone(),
            caption,
        });
    }
    if let Some(audio) = msg.audio() {
        return Some(MediaPayload {
            kind: MediaKind::Audio,
            file_id: audio.file.id.clone(),
            caption,
        });
    }
    if let Some(voice) = msg.voice() {
        return Some(MediaPayload {
            kind: MediaKind::Voice,
            file_id: voice.file.id.clone(),
            caption,
        });
    }
    if let Some(document) = msg.document() {
        return Some(MediaPayload {
            kind: MediaKind::Document,
            file_id: document.file.id.clone(),
            caption,
        });
    }
    if let Some(animation) = msg.animation() {
        return Some(MediaPayload {
            kind: MediaKind::Animation,
            file_id: animation.file.id.clone(),
            caption,
        });
    }
    if let Some(note) = msg.video_note() {
        return Some(MediaPayload {
            kind: MediaKind::VideoNote,
            file_id: note.file.id.clone(),
            caption,
        });
    }
    if let Some(sticker) = msg.sticker() {
        return Some(MediaPayload {
            kind: MediaKind::Sticker,
            file_id: sticker.file.id.clone(),
            caption,
        });
    }

    None
}

/// Normalise `@name`, `t.me/name` or a bare name into a username token.
fn channel_username(input: &str) -> Option<String> {
    let token = input
        .trim()
        .trim_start_matches("https://")
        .trim_start_matches("http://")
        .trim_start_matches("t.me/")
        .trim_start_matches('@');

    let token = token.split(['/', '?']).next().unwrap_or_default();
    if token.len() >= 5
        && token
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        Some(token.to_owned())
    } else {
        None
    }
}

/// Parsed form of the owner's schedule-time input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ScheduleSpec {
    Once(NaiveDate, NaiveTime),
    Daily(NaiveTime),
    Weekly(u8, NaiveTime),
}

pub(crate) fn parse_schedule_spec(input: &str) -> Option<ScheduleSpec> {
    let parts: Vec<&str> = input.split_whitespace().collect();

    match parts.as_slice() {
        [time] => {
            let time = parse_time(time)?;
            Some(ScheduleSpec::Daily(time))
        }
        [lead, time] => {
            let time = parse_time(time)?;
            if let Some(day) = parse_weekday(lead) {
                Some(ScheduleSpec::Weekly(day, time))
            } else {
                let date = NaiveDate::parse_from_str(lead, "%Y-%m-%d").ok()?;
                Some(ScheduleSpec::Once(date, time))
            }
        }
        _ => None,
    }
}

fn parse_time(input: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(input, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(input, "%H:%M:%S"))
        .ok()
}

/// Weekdays count from Sunday = 0.
fn parse_weekday(input: &str) -> Option<u8> {
    if let Ok(day) = input.parse::<u8>() {
        return (day <= 6).then_some(day);
    }

    match input.to_lowercase().as_str() {
        "sun" => Some(0),
        "mon" => Some(1),
        "tue" => Some(2),
        "wed" => Some(3),
        "thu" => Some(4),
        "fri" => Some(5),
        "sat" => Some(6),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[test]
    fn bare_time_is_daily() {
        assert_eq!(
            parse_schedule_spec("09:00"),
            Some(ScheduleSpec::Daily(
                NaiveTime::from_hms_opt(9, 0, 0).unwrap()
            ))
        );
    }

    #[rstest]
    #[case("2 10:00", 2)]
    #[case("tue 10:00", 2)]
    #[case("sun 10:00", 0)]
    fn weekday_forms_are_weekly(#[case] input: &str, #[case] day: u8) {
        assert_eq!(
            parse_schedule_spec(input),
            Some(ScheduleSpec::Weekly(
                day,
                NaiveTime::from_hms_opt(10, 0, 0).unwrap()
            ))
        );
    }

    #[test]
    fn date_form_is_once() {
        assert_eq!(
            parse_schedule_spec("2026-03-01 14:30"),
            Some(ScheduleSpec::Once(
                NaiveDate::from_ymd_opt(2026, 3, 1).unwrap(),
                NaiveTime::from_hms_opt(14, 30, 0).unwrap()
            ))
        );
    }

    #[rstest]
    #[case("7 10:00")]
    #[case("yesterday")]
    #[case("10:00 tue extra")]
    fn junk_is_rejected(#[case] input: &str) {
        assert_eq!(parse_schedule_spec(input), None);
    }

    #[rstest]
    #[case("@my_channel", Some("my_channel"))]
    #[case("https://t.me/my_channel", Some("my_channel"))]
    #[case("t.me/my_channel?start=x", Some("my_channel"))]
    #[case("@x", None)]
    #[case("not a channel!", None)]
    fn channel_usernames_normalise(#[case] input: &str, #[case] expected: Option<&str>) {
        assert_eq!(channel_username(input).as_deref(), expected);
    }
}
