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

//! Scheduled broadcasts: one-shot and recurring.
//!
//! # Description
//!
//! Status transitions are monotonic except the owner-initiated pair
//! `paused <-> pending` and `pending -> cancelled`; every transition query
//! carries the expected current status in its WHERE clause, so a stale
//! button press affects zero rows instead of rewinding a row's lifecycle.
//! The sweep (`pending_due`) is safe to run from parallel tickers because
//! the scheduler advances `next_fire_at` past `now` immediately after each
//! fan-out.

use chrono::{DateTime, NaiveTime, Utc};
use tracing::instrument;

use super::{MediaPayload, Store, ensure_real_bot_id, media_from_columns};
use crate::errors::StoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleKind {
    Once,
    Daily,
    Weekly,
}

impl ScheduleKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScheduleKind::Once => "once",
            ScheduleKind::Daily => "daily",
            ScheduleKind::Weekly => "weekly",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "once" => Some(ScheduleKind::Once),
            "daily" => Some(ScheduleKind::Daily),
            "weekly" => Some(ScheduleKind::Weekly),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleStatus {
    Pending,
    Sent,
    Failed,
    Paused,
    Cancelled,
}

impl ScheduleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScheduleStatus::Pending => "pending",
            ScheduleStatus::Sent => "sent",
            ScheduleStatus::Failed => "failed",
            ScheduleStatus::Paused => "paused",
            ScheduleStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(ScheduleStatus::Pending),
            "sent" => Some(ScheduleStatus::Sent),
            "failed" => Some(ScheduleStatus::Failed),
            "paused" => Some(ScheduleStatus::Paused),
            "cancelled" => Some(ScheduleStatus::Cancelled),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScheduledMessage {
    pub id: i64,
    pub bot_id: i64,
    pub owner_id: i64,
    pub body: String,
    pub media: Option<MediaPayload>,
    pub kind: ScheduleKind,
    pub fire_at: Option<DateTime<Utc>>,
    pub time_of_day: Option<NaiveTime>,
    pub day_of_week: Option<i16>,
    pub status: ScheduleStatus,
    pub last_sent_at: Option<DateTime<Utc>>,
    pub next_fire_at: DateTime<Utc>,
    pub failure_reason: Option<String>,
}

/// Input shape for creating a schedule. `next_fire_at` is computed by the
/// caller from the kind and time fields.
#[derive(Debug, Clone)]
pub struct NewSchedule {
    pub owner_id: i64,
    pub body: String,
    pub media: Option<MediaPayload>,
    pub kind: ScheduleKind,
    pub fire_at: Option<DateTime<Utc>>,
    pub time_of_day: Option<NaiveTime>,
    pub day_of_week: Option<i16>,
    pub next_fire_at: DateTime<Utc>,
}

#[derive(Debug, sqlx::FromRow)]
struct ScheduledMessageRow {
    id: i64,
    bot_id: i64,
    owner_id: i64,
    body: String,
    media_kind: Option<String>,
    media_file_id: Option<String>,
    media_caption: Option<String>,
    kind: String,
    fire_at: Option<DateTime<Utc>>,
    time_of_day: Option<NaiveTime>,
    day_of_week: Option<i16>,
    status: String,
    last_sent_at: Option<DateTime<Utc>>,
    next_fire_at: DateTime<Utc>,
    failure_reason: Option<String>,
}

impl TryFrom<ScheduledMessageRow> for ScheduledMessage {
    type Error = StoreError;

    fn try_from(row: ScheduledMessageRow) -> Result<Self, Self::Error> {
        let kind = ScheduleKind::parse(&row.kind).ok_or(StoreError::BadColumn("kind"))?;
        let status = ScheduleStatus::parse(&row.status).ok_or(StoreError::BadColumn("status"))?;
        let media = media_from_columns(row.media_kind, row.media_file_id, row.media_caption)?;

        Ok(ScheduledMessage {
            id: row.id,
            bot_id: row.bot_id,
            owner_id: row.owner_id,
            body: row.body,
            media,
            kind,
            fire_at: row.fire_at,
            time_of_day: row.time_of_day,
            day_of_week: row.day_of_week,
            status,
            last_sent_at: row.last_sent_at,
            next_fire_at: row.next_fire_at,
            failure_reason: row.failure_reason,
        })
    }
}

const SCHEDULE_COLUMNS: &str = "id, bot_id, owner_id, body, media_kind, media_file_id, \
     media_caption, kind, fire_at, time_of_day, day_of_week, status, last_sent_at, \
     next_fire_at, failure_reason";

impl Store {
    #[instrument(name = "Create a scheduled message", skip(self, schedule))]
    pub async fn create_schedule(
        &self,
        bot_id: i64,
        schedule: &NewSchedule,
    ) -> Result<ScheduledMessage, StoreError> {
        ensure_real_bot_id(bot_id)?;

        let (media_kind, media_file_id, media_caption) = match &schedule.media {
            Some(media) => (
                Some(media.kind.as_str()),
                Some(media.file_id.as_str()),
                Some(media.caption.as_str()),
            ),
            None => (None, None, None),
        };

        let row = sqlx::query_as::<_, ScheduledMessageRow>(&format!(
            "INSERT INTO scheduled_messages \
             (bot_id, owner_id, body, media_kind, media_file_id, media_caption, \
              kind, fire_at, time_of_day, day_of_week, next_fire_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11) \
             RETURNING {SCHEDULE_COLUMNS}"
        ))
        .bind(bot_id)
        .bind(schedule.owner_id)
        .bind(&schedule.body)
        .bind(media_kind)
        .bind(media_file_id)
        .bind(media_caption)
        .bind(schedule.kind.as_str())
        .bind(schedule.fire_at)
        .bind(schedule.time_of_day)
        .bind(schedule.day_of_week)
        .bind(schedule.next_fire_at)
        .fetch_one(self.pool())
        .await?;

        ScheduledMessage::try_from(row)
    }

    /// The sweep query: pending rows whose `next_fire_at` has passed,
    /// oldest first, capped at `limit`.
    pub async fn pending_due(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<ScheduledMessage>, StoreError> {
        let rows = sqlx::query_as::<_, ScheduledMessageRow>(&format!(
            "SELECT {SCHEDULE_COLUMNS} FROM scheduled_messages \
             WHERE status = 'pending' AND next_fire_at <= $1 \
             ORDER BY next_fire_at ASC LIMIT $2"
        ))
        .bind(now)
        .bind(limit)
        .fetch_all(self.pool())
        .await?;

        rows.into_iter().map(ScheduledMessage::try_from).collect()
    }

    /// Terminal transition for `once` schedules.
    pub async fn mark_schedule_sent(&self, id: i64, now: DateTime<Utc>) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE scheduled_messages SET status = 'sent', last_sent_at = $2, \
             failure_reason = NULL WHERE id = $1 AND status = 'pending'",
        )
        .bind(id)
        .bind(now)
        .execute(self.pool())
        .await?;

        Ok(())
    }

    /// As [Store::mark_schedule_sent], with a human-readable note (stored in
    /// `failure_reason`) explaining why the row finished early.
    pub async fn mark_schedule_sent_with_note(
        &self,
        id: i64,
        now: DateTime<Utc>,
        note: &str,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE scheduled_messages SET status = 'sent', last_sent_at = $2, \
             failure_reason = $3 WHERE id = $1 AND status = 'pending'",
        )
        .bind(id)
        .bind(now)
        .bind(note)
        .execute(self.pool())
        .await?;

        Ok(())
    }

    pub async fn mark_schedule_failed(&self, id: i64, reason: &str) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE scheduled_messages SET status = 'failed', failure_reason = $2 \
             WHERE id = $1 AND status = 'pending'",
        )
        .bind(id)
        .bind(reason)
        .execute(self.pool())
        .await?;

        Ok(())
    }

    /// Recurring advance: stays `pending`, records the send and moves the
    /// fire time strictly past now. This write is what makes parallel sweep
    /// ticks safe.
    pub async fn advance_schedule(
        &self,
        id: i64,
        last_sent_at: DateTime<Utc>,
        next_fire_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE scheduled_messages SET last_sent_at = $2, next_fire_at = $3, \
             failure_reason = NULL WHERE id = $1 AND status = 'pending'",
        )
        .bind(id)
        .bind(last_sent_at)
        .bind(next_fire_at)
        .execute(self.pool())
        .await?;

        Ok(())
    }

    /// Owner-initiated `pending -> paused`. Returns `false` when the row was
    /// not in a pausable state.
    pub async fn pause_schedule(&self, id: i64, bot_id: i64) -> Result<bool, StoreError> {
        ensure_real_bot_id(bot_id)?;

        let updated = sqlx::query(
            "UPDATE scheduled_messages SET status = 'paused' \
             WHERE id = $1 AND bot_id = $2 AND status = 'pending'",
        )
        .bind(id)
        .bind(bot_id)
        .execute(self.pool())
        .await?;

        Ok(updated.rows_affected() > 0)
    }

    /// Owner-initiated `paused -> pending`, with a fresh fire time so the
    /// row does not fire instantly for the missed window.
    pub async fn resume_schedule(
        &self,
        id: i64,
        bot_id: i64,
        next_fire_at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        ensure_real_bot_id(bot_id)?;

        let updated = sqlx::query(
            "UPDATE scheduled_messages SET status = 'pending', next_fire_at = $3 \
             WHERE id = $1 AND bot_id = $2 AND status = 'paused'",
        )
        .bind(id)
        .bind(bot_id)
        .bind(next_fire_at)
        .execute(self.pool())
        .await?;

        Ok(updated.rows_affected() > 0)
    }

    pub async fn cancel_schedule(&self, id: i64, bot_id: i64) -> Result<bool, StoreError> {
        ensure_real_bot_id(bot_id)?;

        let updated = sqlx::query(
            "UPDATE scheduled_messages SET status = 'cancelled' \
             WHERE id = $1 AND bot_id = $2 AND status IN ('pending', 'paused')",
        )
        .bind(id)
        .bind(bot_id)
        .execute(self.pool())
        .await?;

        Ok(updated.rows_affected() > 0)
    }

    pub async fn schedules_for_bot(&self, bot_id: i64) -> Result<Vec<ScheduledMessage>, StoreError> {
        ensure_real_bot_id(bot_id)?;

        let rows = sqlx::query_as::<_, ScheduledMessageRow>(&format!(
            "SELECT {SCHEDULE_COLUMNS} FROM scheduled_messages \
             WHERE bot_id = $1 AND status NOT IN ('cancelled') ORDER BY created_at"
        ))
        .bind(bot_id)
        .fetch_all(self.pool())
        .await?;

        rows.into_iter().map(ScheduledMessage::try_from).collect()
    }

    pub async fn schedule_by_id(
        &self,
        id: i64,
        bot_id: i64,
    ) -> Result<Option<ScheduledMessage>, StoreError> {
        ensure_real_bot_id(bot_id)?;

        let row = sqlx::query_as::<_, ScheduledMessageRow>(&format!(
            "SELECT {SCHEDULE_COLUMNS} FROM scheduled_messages WHERE id = $1 AND bot_id = $2"
        ))
        .bind(id)
        .bind(bot_id)
        .fetch_optional(self.pool())
        .await?;

        row.map(ScheduledMessage::try_from).transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn kind_and_status_round_trip() {
        for kind in [ScheduleKind::Once, ScheduleKind::Daily, ScheduleKind::Weekly] {
            assert_eq!(ScheduleKind::parse(kind.as_str()), Some(kind));
        }
        for status in [
            ScheduleStatus::Pending,
            ScheduleStatus::Sent,
            ScheduleStatus::Failed,
            ScheduleStatus::Paused,
            ScheduleStatus::Cancelled,
        ] {
            assert_eq!(ScheduleStatus::parse(status.as_str()), Some(status));
        }
    }

    #[test]
    fn unknown_status_is_an_integrity_fault() {
        let row = ScheduledMessageRow {
            id: 1,
            bot_id: 2,
            owner_id: 3,
            body: "hello".to_owned(),
            media_kind: None,
            media_file_id: None,
            media_caption: None,
            kind: "daily".to_owned(),
            fire_at: None,
            time_of_day: None,
            day_of_week: None,
            status: "snoozed".to_owned(),
            last_sent_at: None,
            next_fire_at: Utc::now(),
            failure_reason: None,
        };

        assert!(matches!(
            ScheduledMessage::try_from(row),
            Err(StoreError::BadColumn("status"))
        ));
    }
}
