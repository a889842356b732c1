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

use crate::helpers::{credential, store_over};
use botforge::store::{NewSchedule, ScheduleKind, ScheduleStatus, Store};
use chrono::{Duration, NaiveTime, Utc};
use pretty_assertions::assert_eq;
use sqlx::PgPool;

async fn seeded_bot(store: &Store, n: u32) -> i64 {
    store
        .create_bot(&credential(n), 100, "sched_bot")
        .await
        .expect("Failed to enrol the bot")
        .bot_id
}

fn daily(owner_id: i64, fire_in: Duration) -> NewSchedule {
    NewSchedule {
        owner_id,
        body: "morning".to_owned(),
        media: None,
        kind: ScheduleKind::Daily,
        fire_at: None,
        time_of_day: NaiveTime::from_hms_opt(9, 0, 0),
        day_of_week: None,
        next_fire_at: Utc::now() + fire_in,
    }
}

#[ignore = "requires a PostgreSQL instance"]
#[sqlx::test]
async fn pending_due_selects_ripe_rows_oldest_first(pool: PgPool) -> sqlx::Result<()> {
    let store = store_over(pool);
    let bot_id = seeded_bot(&store, 20).await;

    let late = store
        .create_schedule(bot_id, &daily(100, Duration::minutes(-30)))
        .await
        .unwrap();
    let later = store
        .create_schedule(bot_id, &daily(100, Duration::minutes(-5)))
        .await
        .unwrap();
    let future = store
        .create_schedule(bot_id, &daily(100, Duration::minutes(30)))
        .await
        .unwrap();

    let due = store.pending_due(Utc::now(), 50).await.unwrap();
    let ids: Vec<i64> = due.iter().map(|row| row.id).collect();

    assert_eq!(ids, vec![late.id, later.id]);
    assert!(!ids.contains(&future.id));

    Ok(())
}

#[ignore = "requires a PostgreSQL instance"]
#[sqlx::test]
async fn advance_keeps_recurring_rows_pending(pool: PgPool) -> sqlx::Result<()> {
    let store = store_over(pool);
    let bot_id = seeded_bot(&store, 21).await;

    let row = store
        .create_schedule(bot_id, &daily(100, Duration::minutes(-5)))
        .await
        .unwrap();

    let now = Utc::now();
    let next = now + Duration::hours(24);
    store.advance_schedule(row.id, now, next).await.unwrap();

    let after = store
        .schedule_by_id(row.id, bot_id)
        .await
        .unwrap()
        .expect("Row expected");
    assert_eq!(after.status, ScheduleStatus::Pending);
    assert_eq!(after.next_fire_at, next);
    assert!(after.last_sent_at.is_some());
    // Strictly past now: the next sweep cannot re-select it.
    assert!(after.next_fire_at > now);

    Ok(())
}

#[ignore = "requires a PostgreSQL instance"]
#[sqlx::test]
async fn once_rows_terminate_on_sent(pool: PgPool) -> sqlx::Result<()> {
    let store = store_over(pool);
    let bot_id = seeded_bot(&store, 22).await;

    let row = store
        .create_schedule(
            bot_id,
            &NewSchedule {
                owner_id: 100,
                body: "launch!".to_owned(),
                media: None,
                kind: ScheduleKind::Once,
                fire_at: Some(Utc::now() - Duration::minutes(1)),
                time_of_day: None,
                day_of_week: None,
                next_fire_at: Utc::now() - Duration::minutes(1),
            },
        )
        .await
        .unwrap();

    store.mark_schedule_sent(row.id, Utc::now()).await.unwrap();

    let after = store
        .schedule_by_id(row.id, bot_id)
        .await
        .unwrap()
        .expect("Row expected");
    assert_eq!(after.status, ScheduleStatus::Sent);

    // A sent row never comes back through the sweep.
    assert!(store.pending_due(Utc::now(), 50).await.unwrap().is_empty());

    Ok(())
}

#[ignore = "requires a PostgreSQL instance"]
#[sqlx::test]
async fn pause_resume_cancel_transitions(pool: PgPool) -> sqlx::Result<()> {
    let store = store_over(pool);
    let bot_id = seeded_bot(&store, 23).await;

    let row = store
        .create_schedule(bot_id, &daily(100, Duration::hours(1)))
        .await
        .unwrap();

    // pending -> paused -> pending.
    assert!(store.pause_schedule(row.id, bot_id).await.unwrap());
    assert!(!store.pause_schedule(row.id, bot_id).await.unwrap());
    assert!(
        store
            .resume_schedule(row.id, bot_id, Utc::now() + Duration::hours(2))
            .await
            .unwrap()
    );

    // pending -> cancelled is terminal.
    assert!(store.cancel_schedule(row.id, bot_id).await.unwrap());
    assert!(!store.pause_schedule(row.id, bot_id).await.unwrap());
    assert!(
        !store
            .resume_schedule(row.id, bot_id, Utc::now())
            .await
            .unwrap()
    );

    let after = store
        .schedule_by_id(row.id, bot_id)
        .await
        .unwrap()
        .expect("Row expected");
    assert_eq!(after.status, ScheduleStatus::Cancelled);

    Ok(())
}

#[ignore = "requires a PostgreSQL instance"]
#[sqlx::test]
async fn cascade_delete_takes_schedules_along(pool: PgPool) -> sqlx::Result<()> {
    let store = store_over(pool.clone());
    let bot_id = seeded_bot(&store, 24).await;

    store
        .create_schedule(bot_id, &daily(100, Duration::hours(1)))
        .await
        .unwrap();

    // Hard delete the tenant row; the FK cascade must clear its schedules.
    sqlx::query("DELETE FROM bots WHERE bot_id = $1")
        .bind(bot_id)
        .execute(&pool)
        .await?;

    let left: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM scheduled_messages WHERE bot_id = $1")
            .bind(bot_id)
            .fetch_one(&pool)
            .await?;
    assert_eq!(left, 0);

    Ok(())
}
