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
use botforge::{
    errors::StoreError,
    store::BotFlag,
};
use pretty_assertions::assert_eq;
use sqlx::PgPool;

#[ignore = "requires a PostgreSQL instance"]
#[sqlx::test]
async fn credentials_are_encrypted_at_rest(pool: PgPool) -> sqlx::Result<()> {
    let store = store_over(pool.clone());
    let cred = credential(1);

    let bot = store
        .create_bot(&cred, 100, "first_bot")
        .await
        .expect("Failed to enrol the bot");
    assert_eq!(bot.credential, cred);

    // The raw column must hold ciphertext, not the token.
    let raw: String = sqlx::query_scalar("SELECT credential FROM bots WHERE bot_id = $1")
        .bind(bot.bot_id)
        .fetch_one(&pool)
        .await?;
    assert_ne!(raw, cred);
    assert!(!raw.contains(':'));

    // And the equality lookup still works because sealing is deterministic.
    let found = store
        .bot_by_credential(&cred)
        .await
        .expect("Failed to look up the bot")
        .expect("Bot expected");
    assert_eq!(found.bot_id, bot.bot_id);

    Ok(())
}

#[ignore = "requires a PostgreSQL instance"]
#[sqlx::test]
async fn duplicate_live_credentials_are_rejected(pool: PgPool) -> sqlx::Result<()> {
    let store = store_over(pool);
    let cred = credential(2);

    store
        .create_bot(&cred, 100, "first_bot")
        .await
        .expect("Failed to enrol the bot");

    let second = store.create_bot(&cred, 200, "second_bot").await;
    assert!(matches!(second, Err(StoreError::DuplicateCredential)));

    Ok(())
}

#[ignore = "requires a PostgreSQL instance"]
#[sqlx::test]
async fn soft_delete_hides_and_restore_reassigns(pool: PgPool) -> sqlx::Result<()> {
    let store = store_over(pool);
    let cred = credential(3);

    let bot = store
        .create_bot(&cred, 100, "ephemeral_bot")
        .await
        .expect("Failed to enrol the bot");

    store
        .soft_delete_bot(bot.bot_id)
        .await
        .expect("Failed to soft delete");

    // Invisible to every default read...
    assert!(store.bot_by_credential(&cred).await.unwrap().is_none());
    assert!(store.bot_by_id(bot.bot_id).await.unwrap().is_none());
    assert!(store.bots_by_owner(100).await.unwrap().is_empty());

    // ...except the explicit deleted accessor.
    let deleted = store
        .deleted_bot_by_credential(&cred)
        .await
        .unwrap()
        .expect("Deleted row expected");
    assert_eq!(deleted.bot_id, bot.bot_id);
    assert!(!deleted.active);

    // Restore with a new owner.
    store
        .restore_bot(bot.bot_id, Some(200))
        .await
        .expect("Failed to restore");
    let restored = store
        .bot_by_credential(&cred)
        .await
        .unwrap()
        .expect("Live row expected");
    assert_eq!(restored.owner_id, 200);
    assert!(restored.active);

    // Same credential may be enrolled again only while the old row is
    // deleted, never concurrently.
    let dup = store.create_bot(&cred, 300, "third_bot").await;
    assert!(matches!(dup, Err(StoreError::DuplicateCredential)));

    Ok(())
}

#[ignore = "requires a PostgreSQL instance"]
#[sqlx::test]
async fn flags_toggle_and_read_back(pool: PgPool) -> sqlx::Result<()> {
    let store = store_over(pool);
    let bot = store
        .create_bot(&credential(4), 100, "flag_bot")
        .await
        .expect("Failed to enrol the bot");

    // Defaults per the schema.
    assert!(store.bot_flag(bot.bot_id, BotFlag::ForwardAutoReplies).await.unwrap());
    assert!(!store.bot_flag(bot.bot_id, BotFlag::ForcedSubEnabled).await.unwrap());

    let flipped = store
        .toggle_bot_flag(bot.bot_id, BotFlag::ForcedSubEnabled)
        .await
        .expect("Failed to toggle");
    assert!(flipped);
    assert!(store.bot_flag(bot.bot_id, BotFlag::ForcedSubEnabled).await.unwrap());

    Ok(())
}

#[ignore = "requires a PostgreSQL instance"]
#[sqlx::test]
async fn factory_bot_id_never_reaches_rows(pool: PgPool) -> sqlx::Result<()> {
    let store = store_over(pool);

    let link = store.insert_link(1, 200, 0).await;
    assert!(matches!(link, Err(StoreError::ReservedBotId)));

    let ban = store.ban_user(0, 200, 100).await;
    assert!(matches!(ban, Err(StoreError::ReservedBotId)));

    Ok(())
}
