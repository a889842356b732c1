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
use botforge::store::{AutoReplyKind, MatchMode, NewAutoReply};
use chrono::{Duration, Utc};
use pretty_assertions::assert_eq;
use sqlx::PgPool;

#[ignore = "requires a PostgreSQL instance"]
#[sqlx::test]
async fn linkage_round_trip(pool: PgPool) -> sqlx::Result<()> {
    let store = store_over(pool);
    let bot = store
        .create_bot(&credential(10), 100, "link_bot")
        .await
        .expect("Failed to enrol the bot");

    // First contact: user 200's message became admin message 7.
    store
        .insert_link(7, 200, bot.bot_id)
        .await
        .expect("Failed to write the link");

    assert_eq!(store.resolve_link(7, bot.bot_id).await.unwrap(), Some(200));
    assert_eq!(store.resolve_link(8, bot.bot_id).await.unwrap(), None);
    assert!(store.has_any_link(bot.bot_id, 200).await.unwrap());
    assert!(!store.has_any_link(bot.bot_id, 201).await.unwrap());

    // Redelivery of the same update must not blow up.
    store
        .insert_link(7, 200, bot.bot_id)
        .await
        .expect("Duplicate link write should be a no-op");

    Ok(())
}

#[ignore = "requires a PostgreSQL instance"]
#[sqlx::test]
async fn recipients_are_distinct_users(pool: PgPool) -> sqlx::Result<()> {
    let store = store_over(pool);
    let bot = store
        .create_bot(&credential(11), 100, "audience_bot")
        .await
        .expect("Failed to enrol the bot");

    for (admin_msg, user) in [(1, 200), (2, 200), (3, 201), (4, 202)] {
        store.insert_link(admin_msg, user, bot.bot_id).await.unwrap();
    }

    let mut recipients = store.link_recipients(bot.bot_id).await.unwrap();
    recipients.sort();
    assert_eq!(recipients, vec![200, 201, 202]);

    Ok(())
}

#[ignore = "requires a PostgreSQL instance"]
#[sqlx::test]
async fn ban_is_idempotent_and_reversible(pool: PgPool) -> sqlx::Result<()> {
    let store = store_over(pool);
    let bot = store
        .create_bot(&credential(12), 100, "ban_bot")
        .await
        .expect("Failed to enrol the bot");

    assert!(store.ban_user(bot.bot_id, 200, 100).await.unwrap());
    // Second ban: same single row, reported as not-new.
    assert!(!store.ban_user(bot.bot_id, 200, 100).await.unwrap());
    assert!(store.is_banned(bot.bot_id, 200).await.unwrap());

    assert!(store.unban_user(bot.bot_id, 200).await.unwrap());
    assert!(!store.is_banned(bot.bot_id, 200).await.unwrap());
    assert!(!store.unban_user(bot.bot_id, 200).await.unwrap());

    Ok(())
}

#[ignore = "requires a PostgreSQL instance"]
#[sqlx::test]
async fn auto_reply_upsert_overwrites(pool: PgPool) -> sqlx::Result<()> {
    let store = store_over(pool);
    let bot = store
        .create_bot(&credential(13), 100, "reply_bot")
        .await
        .expect("Failed to enrol the bot");

    let reply = NewAutoReply {
        trigger: "hours".to_owned(),
        kind: AutoReplyKind::Keyword,
        match_mode: MatchMode::Exact,
        response: "Open 9-17".to_owned(),
        media: None,
    };
    store.upsert_auto_reply(bot.bot_id, &reply).await.unwrap();

    let updated = NewAutoReply {
        response: "Open 8-20".to_owned(),
        ..reply
    };
    store.upsert_auto_reply(bot.bot_id, &updated).await.unwrap();

    let all = store
        .auto_replies(bot.bot_id, AutoReplyKind::Keyword)
        .await
        .unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].response, "Open 8-20");

    assert!(
        store
            .delete_auto_reply(bot.bot_id, "hours", AutoReplyKind::Keyword)
            .await
            .unwrap()
    );
    assert!(
        store
            .auto_replies(bot.bot_id, AutoReplyKind::Keyword)
            .await
            .unwrap()
            .is_empty()
    );

    Ok(())
}

#[ignore = "requires a PostgreSQL instance"]
#[sqlx::test]
async fn new_user_stats_respect_the_since_bound(pool: PgPool) -> sqlx::Result<()> {
    let store = store_over(pool.clone());
    let bot = store
        .create_bot(&credential(14), 100, "stats_bot")
        .await
        .expect("Failed to enrol the bot");

    // User 200 is old (first link backdated), user 201 is new.
    store.insert_link(1, 200, bot.bot_id).await.unwrap();
    sqlx::query(
        "UPDATE message_links SET created_at = now() - interval '60 days' \
         WHERE admin_msg_id = 1",
    )
    .execute(&pool)
    .await?;
    store.insert_link(2, 200, bot.bot_id).await.unwrap();
    store.insert_link(3, 201, bot.bot_id).await.unwrap();

    let since = Utc::now() - Duration::days(30);
    let stats = store.bot_stats(bot.bot_id, since).await.unwrap();

    assert_eq!(stats.total_users, 2);
    // 200's earliest link predates the bound, so only 201 counts as new.
    assert_eq!(stats.new_users, 1);
    assert_eq!(stats.messages, 2);

    Ok(())
}
