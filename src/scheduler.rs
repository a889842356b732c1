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

//! Scheduled-broadcast engine.
//!
//! # Description
//!
//! One ticker task sweeps the store for due rows and spawns an independent
//! processor per row. A processor resolves the owning bot through the
//! manager, fans the payload out at the bounded rate and then *immediately*
//! advances the row — `next_fire_at` moves strictly past now (or the status
//! leaves `pending`) before the next tick's `pending_due` can re-select it,
//! which is what makes overlapping sweeps harmless.
//!
//! The next-fire math is pure and generic over the time zone; production
//! passes `Local::now()` (process-local schedule policy), the tests pin a
//! fixed offset.

use chrono::{DateTime, Datelike, Days, Local, NaiveTime, TimeZone, Utc};
use std::sync::Arc;
use teloxide::prelude::Requester;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::{
    broadcast,
    manager::Manager,
    store::{ScheduleKind, ScheduledMessage, Store},
    texts,
};

pub struct Scheduler {
    store: Store,
    manager: Arc<Manager>,
    interval: std::time::Duration,
    batch_limit: i64,
}

impl Scheduler {
    pub fn new(
        store: Store,
        manager: Arc<Manager>,
        interval: std::time::Duration,
        batch_limit: i64,
    ) -> Self {
        Scheduler {
            store,
            manager,
            interval,
            batch_limit,
        }
    }

    /// The ticker loop. Runs until cancelled.
    pub async fn run(&self, mut cancel: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!("Scheduler sweeping every {:?}", self.interval);
        loop {
            tokio::select! {
                _ = cancel.changed() => break,
                _ = ticker.tick() => self.sweep().await,
            }
        }
        info!("Scheduler stopped");
    }

    async fn sweep(&self) {
        let due = match self.store.pending_due(Utc::now(), self.batch_limit).await {
            Ok(due) => due,
            Err(e) => {
                error!("Due-schedule sweep failed: {e}");
                return;
            }
        };

        if due.is_empty() {
            return;
        }
        debug!("Sweep selected {} due schedules", due.len());

        for row in due {
            tokio::spawn(process_due(
                self.store.clone(),
                Arc::clone(&self.manager),
                row,
            ));
        }
    }
}

/// Handle one due row end to end.
async fn process_due(store: Store, manager: Arc<Manager>, row: ScheduledMessage) {
    let Some(ctx) = manager.context_by_bot_id(row.bot_id) else {
        warn!("Schedule #{} owned by a stopped bot", row.id);
        if let Err(e) = store.mark_schedule_failed(row.id, "bot not running").await {
            error!("Schedule #{} status write failed: {e}", row.id);
        }
        return;
    };

    let recipients = match store.link_recipients(row.bot_id).await {
        Ok(recipients) => recipients,
        Err(e) => {
            error!("Schedule #{} recipient query failed: {e}", row.id);
            if let Err(e) = store.mark_schedule_failed(row.id, "recipient query failed").await {
                error!("Schedule #{} status write failed: {e}", row.id);
            }
            return;
        }
    };

    if recipients.is_empty() {
        if let Err(e) = store
            .mark_schedule_sent_with_note(row.id, Utc::now(), "no recipients yet")
            .await
        {
            error!("Schedule #{} status write failed: {e}", row.id);
        }
        let _ = ctx
            .bot
            .send_message(
                teloxide::types::ChatId(row.owner_id),
                "⏰ Your scheduled message had nobody to go to yet.",
            )
            .await;
        return;
    }

    let report =
        broadcast::send_to_recipients(&ctx, &row.body, row.media.as_ref(), &recipients, None)
            .await;
    let now = Utc::now();

    // Advance before anything else so a parallel tick cannot double-fire.
    let advance = match row.kind {
        ScheduleKind::Once => store.mark_schedule_sent(row.id, now).await,
        ScheduleKind::Daily | ScheduleKind::Weekly => {
            let next = compute_next_fire(
                row.kind,
                row.fire_at,
                row.time_of_day,
                row.day_of_week,
                Local::now(),
            );
            store.advance_schedule(row.id, now, next).await
        }
    };
    if let Err(e) = advance {
        error!("Schedule #{} advance failed: {e}", row.id);
    }

    info!(
        "Schedule #{} fanned out: {} ok, {} blocked, {} failed",
        row.id, report.success, report.blocked, report.failed
    );
    let _ = ctx
        .bot
        .send_message(
            teloxide::types::ChatId(row.owner_id),
            texts::schedule_summary(&texts::preview(&row.body), &report),
        )
        .await;
}

/// Next fire time for a schedule's shape, evaluated at `now`.
pub fn compute_next_fire(
    kind: ScheduleKind,
    fire_at: Option<DateTime<Utc>>,
    time_of_day: Option<NaiveTime>,
    day_of_week: Option<i16>,
    now: DateTime<Local>,
) -> DateTime<Utc> {
    let time_of_day =
        time_of_day.unwrap_or_else(|| NaiveTime::from_hms_opt(0, 0, 0).expect("midnight exists"));

    match kind {
        ScheduleKind::Once => fire_at.unwrap_or_else(|| now.with_timezone(&Utc)),
        ScheduleKind::Daily => next_daily_fire(now, time_of_day).with_timezone(&Utc),
        ScheduleKind::Weekly => {
            let day = day_of_week.unwrap_or_default().clamp(0, 6) as u8;
            next_weekly_fire(now, time_of_day, day).with_timezone(&Utc)
        }
    }
}

/// Today at `time_of_day`; tomorrow when that already passed.
pub fn next_daily_fire<Tz: TimeZone>(now: DateTime<Tz>, time_of_day: NaiveTime) -> DateTime<Tz> {
    let tz = now.timezone();
    let today = now.date_naive();

    match tz.from_local_datetime(&today.and_time(time_of_day)).earliest() {
        Some(candidate) if candidate > now => candidate,
        _ => tz
            .from_local_datetime(&(today + Days::new(1)).and_time(time_of_day))
            .earliest()
            .unwrap_or_else(|| now.clone() + chrono::Duration::hours(24)),
    }
}

/// The coming `day_of_week` (Sunday = 0) at `time_of_day`; a full week out
/// when that lands on today with the time already passed.
pub fn next_weekly_fire<Tz: TimeZone>(
    now: DateTime<Tz>,
    time_of_day: NaiveTime,
    day_of_week: u8,
) -> DateTime<Tz> {
    let tz = now.timezone();
    let today = now.date_naive();
    let current = i64::from(now.weekday().num_days_from_sunday());
    let ahead = (i64::from(day_of_week) - current + 7) % 7;
    let target = today + Days::new(ahead as u64);

    match tz
        .from_local_datetime(&target.and_time(time_of_day))
        .earliest()
    {
        Some(candidate) if candidate > now => candidate,
        _ => tz
            .from_local_datetime(&(target + Days::new(7)).and_time(time_of_day))
            .earliest()
            .unwrap_or_else(|| now.clone() + chrono::Duration::days(7)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::FixedOffset;
    use pretty_assertions::assert_eq;

    fn tz() -> FixedOffset {
        FixedOffset::east_opt(0).unwrap()
    }

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<FixedOffset> {
        tz().with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    fn tod(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn daily_before_todays_slot_fires_today() {
        let now = at(2026, 2, 1, 8, 0);
        assert_eq!(next_daily_fire(now, tod(9, 0)), at(2026, 2, 1, 9, 0));
    }

    #[test]
    fn daily_after_todays_slot_fires_tomorrow() {
        // Created at 10:00 with a 09:00 slot: first send is the next
        // morning.
        let now = at(2026, 2, 1, 10, 0);
        assert_eq!(next_daily_fire(now, tod(9, 0)), at(2026, 2, 2, 9, 0));
    }

    #[test]
    fn daily_advance_after_fanout_moves_one_day() {
        // Right after the 09:00 fan-out the next slot is tomorrow 09:00.
        let now = at(2026, 2, 2, 9, 0);
        assert_eq!(next_daily_fire(now, tod(9, 0)), at(2026, 2, 3, 9, 0));
    }

    #[test]
    fn weekly_same_day_past_time_waits_a_full_week() {
        // 2026-02-03 is a Tuesday. Tuesday 16:00, slot Tuesday 10:00.
        let now = at(2026, 2, 3, 16, 0);
        let next = next_weekly_fire(now, tod(10, 0), 2);
        assert_eq!(next, at(2026, 2, 10, 10, 0));
    }

    #[test]
    fn weekly_same_day_future_time_fires_today() {
        let now = at(2026, 2, 3, 8, 0);
        let next = next_weekly_fire(now, tod(10, 0), 2);
        assert_eq!(next, at(2026, 2, 3, 10, 0));
    }

    #[test]
    fn weekly_other_day_fires_this_week() {
        // From Sunday (2026-02-01) to Wednesday (= 3).
        let now = at(2026, 2, 1, 12, 0);
        let next = next_weekly_fire(now, tod(10, 0), 3);
        assert_eq!(next, at(2026, 2, 4, 10, 0));
    }

    #[test]
    fn next_fire_is_always_strictly_future() {
        let now = at(2026, 2, 1, 9, 0);
        assert!(next_daily_fire(now.clone(), tod(9, 0)) > now);
        assert!(next_weekly_fire(now.clone(), tod(9, 0), 0) > now);
    }

    #[test]
    fn compute_next_fire_for_once_returns_the_fire_time() {
        let fire_at = Utc.with_ymd_and_hms(2026, 3, 1, 14, 30, 0).unwrap();
        let next = compute_next_fire(
            ScheduleKind::Once,
            Some(fire_at),
            None,
            None,
            Local::now(),
        );
        assert_eq!(next, fire_at);
    }
}
