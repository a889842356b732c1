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

//! The factory: the one operator-facing bot that provisions all others.
//!
//! # Description
//!
//! The factory is a distinguished tenant with no durable identity. Any user
//! can enrol and manage their own bots through it; only the configured
//! operator sees the fleet-wide stats row. Credential-bearing buttons carry
//! a short deterministic prefix of the credential, never the credential
//! itself — the prefix resolves against the caller's own bot list, so one
//! caller can never address another caller's bot.

use std::sync::Arc;
use teloxide::payloads::{AnswerCallbackQuerySetters, SendMessageSetters};
use teloxide::prelude::*;
use teloxide::types::{ChatId, UpdateKind};
use teloxide::utils::command::BotCommands;
use tracing::{debug, error, info, warn};

use crate::{
    cache::CacheClient,
    dispatcher::callbacks::CallbackRoute,
    errors::{HandlerResult, ManagerError},
    keyboards::{self, credential_token},
    manager::Manager,
    store::{BotRecord, Store},
    tenant::TenantContext,
    texts,
};

/// Owner-state tag for a caller who was asked for a bot token.
const AWAIT_CREDENTIAL: &str = "factory_await_credential";

/// Commands of the factory bot.
#[derive(BotCommands, Clone)]
#[command(rename_rule = "lowercase", description = "Control bot commands:")]
pub enum FactoryCommand {
    #[command(description = "Open the menu")]
    Start,
}

pub struct FactoryBot {
    ctx: Arc<TenantContext>,
    store: Store,
    cache: CacheClient,
    manager: Arc<Manager>,
    operator_id: i64,
}

impl FactoryBot {
    pub fn new(
        ctx: Arc<TenantContext>,
        store: Store,
        cache: CacheClient,
        manager: Arc<Manager>,
        operator_id: i64,
    ) -> Self {
        FactoryBot {
            ctx,
            store,
            cache,
            manager,
            operator_id,
        }
    }

    pub async fn process(&self, update: Update) {
        let outcome: HandlerResult = match update.kind {
            UpdateKind::Message(msg) => self.process_message(&msg).await,
            UpdateKind::CallbackQuery(query) => self.process_callback(query).await,
            _ => Ok(()),
        };

        if let Err(e) = outcome {
            error!("Factory update handling failed: {e}");
        }
    }

    async fn process_message(&self, msg: &Message) -> HandlerResult {
        let caller = msg.chat.id.0;
        let text = msg.text().unwrap_or_default();

        if let Ok(FactoryCommand::Start) = FactoryCommand::parse(text, self.ctx.username.as_str()) {
            self.cache
                .clear_owner_state(&self.ctx.credential, caller)
                .await?;
            return self.send_menu(msg).await;
        }

        let state = self
            .cache
            .owner_state(&self.ctx.credential, caller)
            .await?;
        if state.as_deref() == Some(AWAIT_CREDENTIAL) {
            return self.handle_credential_submission(msg).await;
        }

        self.ctx
            .bot
            .send_message(msg.chat.id, "Use /start to open the menu.")
            .await?;
        Ok(())
    }

    async fn send_menu(&self, msg: &Message) -> HandlerResult {
        let name = msg
            .from
            .as_ref()
            .map(|user| user.first_name.clone())
            .unwrap_or_else(|| "there".to_owned());
        let show_stats = msg.chat.id.0 == self.operator_id;

        self.ctx
            .bot
            .send_message(msg.chat.id, texts::factory_welcome(&name))
            .reply_markup(keyboards::factory_menu(show_stats))
            .await?;

        Ok(())
    }

    /// A plausible token was promised; validate it, persist the bot and
    /// bring it up.
    async fn handle_credential_submission(&self, msg: &Message) -> HandlerResult {
        let caller = msg.chat.id.0;
        let Some(text) = msg.text() else {
            self.ctx
                .bot
                .send_message(msg.chat.id, "Send the token as text.")
                .await?;
            return Ok(());
        };
        let credential = text.trim();

        if !plausible_credential(credential) {
            self.ctx
                .bot
                .send_message(
                    msg.chat.id,
                    "That does not look like a bot token. It should be like \
                     `123456789:AA...` — try again or /start to abort.",
                )
                .await?;
            return Ok(());
        }

        // Uniqueness against live rows.
        if self.store.bot_by_credential(credential).await?.is_some() {
            self.cache
                .clear_owner_state(&self.ctx.credential, caller)
                .await?;
            self.ctx
                .bot
                .send_message(msg.chat.id, "That bot is already hosted here.")
                .await?;
            return Ok(());
        }

        // A soft-deleted row with this credential is restored instead of
        // recreated; the caller becomes the owner.
        if let Some(deleted) = self.store.deleted_bot_by_credential(credential).await? {
            return self.restore_bot(msg, deleted, caller).await;
        }

        // Validate by instantiating a throwaway client; this also yields
        // the canonical username.
        let probe = Bot::new(credential.to_owned());
        let me = match probe.get_me().await {
            Ok(me) => me,
            Err(e) => {
                debug!("Credential validation failed: {e}");
                self.ctx
                    .bot
                    .send_message(
                        msg.chat.id,
                        "Telegram rejected that token. Check it with @BotFather and \
                         try again.",
                    )
                    .await?;
                return Ok(());
            }
        };
        let username = me.username().to_owned();

        let record = self.store.create_bot(credential, caller, &username).await?;
        self.cache
            .clear_owner_state(&self.ctx.credential, caller)
            .await?;
        info!("Bot {} enrolled", record.bot_id);

        match self.manager.start_tenant(&record).await {
            Ok(()) => {
                self.ctx
                    .bot
                    .send_message(
                        msg.chat.id,
                        format!("✅ @{username} is live! Open it and send /start."),
                    )
                    .await?;
            }
            Err(e) => {
                // Persisted but not running: degraded success, the caller
                // can press Start later.
                warn!("Enrolled bot failed to start: {e}");
                self.ctx
                    .bot
                    .send_message(
                        msg.chat.id,
                        format!(
                            "⚠️ @{username} was saved but could not be started yet. \
                             Use My bots → Start to retry."
                        ),
                    )
                    .await?;
            }
        }

        Ok(())
    }

    async fn restore_bot(&self, msg: &Message, deleted: BotRecord, caller: i64) -> HandlerResult {
        self.store
            .restore_bot(deleted.bot_id, Some(caller))
            .await?;
        self.cache
            .clear_owner_state(&self.ctx.credential, caller)
            .await?;

        let Some(record) = self.store.bot_by_credential(&deleted.credential).await? else {
            self.ctx
                .bot
                .send_message(msg.chat.id, "Restore failed, please try again.")
                .await?;
            return Ok(());
        };

        info!("Bot {} restored", record.bot_id);
        match self.manager.start_tenant(&record).await {
            Ok(()) => {
                self.ctx
                    .bot
                    .send_message(
                        msg.chat.id,
                        format!("✅ @{} was restored and is live again.", record.username),
                    )
                    .await?;
            }
            Err(e) => {
                warn!("Restored bot failed to start: {e}");
                self.ctx
                    .bot
                    .send_message(
                        msg.chat.id,
                        "⚠️ The bot was restored but could not be started yet.",
                    )
                    .await?;
            }
        }

        Ok(())
    }

    async fn process_callback(&self, q: CallbackQuery) -> HandlerResult {
        let Some(data) = q.data.clone() else {
            return Ok(());
        };
        let caller = i64::try_from(q.from.id.0).unwrap_or_default();

        match CallbackRoute::parse(&data) {
            CallbackRoute::Static("menu") => {
                self.ctx.bot.answer_callback_query(&q.id).await?;
                self.send_menu_to(caller).await
            }
            CallbackRoute::Static("addbot") => self.prompt_for_credential(&q, caller).await,
            CallbackRoute::Static("mybots") => self.list_bots(&q, caller).await,
            CallbackRoute::Static("stats") => self.send_stats(&q, caller).await,
            CallbackRoute::Dynamic("bot", token) => self.bot_details(&q, caller, token).await,
            CallbackRoute::Dynamic("start", token) => self.start_bot(&q, caller, token).await,
            CallbackRoute::Dynamic("stop", token) => self.stop_bot(&q, caller, token).await,
            CallbackRoute::Dynamic("delete", token) => {
                self.confirm_delete_prompt(&q, caller, token).await
            }
            CallbackRoute::Dynamic("confirm_del", token) => {
                self.delete_bot(&q, caller, token).await
            }
            route => {
                debug!("Unroutable factory callback {route:?}");
                self.ctx.bot.answer_callback_query(&q.id).await?;
                Ok(())
            }
        }
    }

    async fn send_menu_to(&self, caller: i64) -> HandlerResult {
        self.ctx
            .bot
            .send_message(
                ChatId(caller),
                "What would you like to do?",
            )
            .reply_markup(keyboards::factory_menu(caller == self.operator_id))
            .await?;
        Ok(())
    }

    async fn prompt_for_credential(&self, q: &CallbackQuery, caller: i64) -> HandlerResult {
        self.cache
            .set_owner_state(&self.ctx.credential, caller, AWAIT_CREDENTIAL)
            .await?;

        self.ctx
            .bot
            .send_message(
                ChatId(caller),
                "Create a bot with @BotFather, then paste its token here.",
            )
            .await?;
        self.ctx.bot.answer_callback_query(&q.id).await?;

        Ok(())
    }

    async fn list_bots(&self, q: &CallbackQuery, caller: i64) -> HandlerResult {
        let bots = self.store.bots_by_owner(caller).await?;

        if bots.is_empty() {
            self.ctx
                .bot
                .answer_callback_query(&q.id)
                .text("You have no bots yet — add one first.")
                .await?;
            return Ok(());
        }

        let rows: Vec<(BotRecord, bool)> = bots
            .into_iter()
            .map(|bot| {
                let running = self.manager.is_running(&bot.credential);
                (bot, running)
            })
            .collect();

        self.ctx
            .bot
            .send_message(ChatId(caller), "Your bots:")
            .reply_markup(keyboards::bot_list(&rows))
            .await?;
        self.ctx.bot.answer_callback_query(&q.id).await?;

        Ok(())
    }

    /// Resolve a credential-prefix token against the caller's own bots.
    async fn resolve_token(&self, caller: i64, token: &str) -> Result<Option<BotRecord>, ManagerError> {
        if token.is_empty() {
            return Ok(None);
        }

        let bots = self.store.bots_by_owner(caller).await?;
        Ok(bots
            .into_iter()
            .find(|bot| credential_token(&bot.credential) == token))
    }

    async fn bot_details(&self, q: &CallbackQuery, caller: i64, token: &str) -> HandlerResult {
        let Some(bot) = self.resolve_token(caller, token).await? else {
            self.ctx
                .bot
                .answer_callback_query(&q.id)
                .text("That bot is gone.")
                .await?;
            return Ok(());
        };

        let running = self.manager.is_running(&bot.credential);
        let state = if running { "running 🟢" } else { "stopped 🔴" };
        let card = format!(
            "@{}\nState: {state}\nEnrolled: {}",
            bot.username,
            bot.created_at.format("%Y-%m-%d"),
        );

        self.ctx
            .bot
            .send_message(ChatId(caller), card)
            .reply_markup(keyboards::bot_details(&bot.credential, running))
            .await?;
        self.ctx.bot.answer_callback_query(&q.id).await?;

        Ok(())
    }

    async fn start_bot(&self, q: &CallbackQuery, caller: i64, token: &str) -> HandlerResult {
        let Some(bot) = self.resolve_token(caller, token).await? else {
            self.ctx
                .bot
                .answer_callback_query(&q.id)
                .text("That bot is gone.")
                .await?;
            return Ok(());
        };

        match self.manager.start_tenant(&bot).await {
            Ok(()) => {
                self.store.set_bot_active(bot.bot_id, true).await?;
                self.ctx
                    .bot
                    .answer_callback_query(&q.id)
                    .text(format!("@{} is running.", bot.username))
                    .await?;
            }
            Err(e) => {
                warn!("Manual start failed: {e}");
                self.ctx
                    .bot
                    .answer_callback_query(&q.id)
                    .text("Could not start the bot, try again later.")
                    .await?;
            }
        }

        Ok(())
    }

    async fn stop_bot(&self, q: &CallbackQuery, caller: i64, token: &str) -> HandlerResult {
        let Some(bot) = self.resolve_token(caller, token).await? else {
            self.ctx
                .bot
                .answer_callback_query(&q.id)
                .text("That bot is gone.")
                .await?;
            return Ok(());
        };

        match self.manager.stop_tenant(&bot.credential).await {
            Ok(()) | Err(ManagerError::NotRunning) => {
                self.store.set_bot_active(bot.bot_id, false).await?;
                self.ctx
                    .bot
                    .answer_callback_query(&q.id)
                    .text(format!("@{} stopped.", bot.username))
                    .await?;
            }
            Err(e) => {
                warn!("Manual stop failed: {e}");
                self.ctx
                    .bot
                    .answer_callback_query(&q.id)
                    .text("Could not stop the bot.")
                    .await?;
            }
        }

        Ok(())
    }

    async fn confirm_delete_prompt(
        &self,
        q: &CallbackQuery,
        caller: i64,
        token: &str,
    ) -> HandlerResult {
        let Some(bot) = self.resolve_token(caller, token).await? else {
            self.ctx
                .bot
                .answer_callback_query(&q.id)
                .text("That bot is gone.")
                .await?;
            return Ok(());
        };

        self.ctx
            .bot
            .send_message(
                ChatId(caller),
                format!(
                    "Delete @{}? Its users, auto-replies and schedules will \
                     stop working.",
                    bot.username
                ),
            )
            .reply_markup(keyboards::confirm_delete(&bot.credential))
            .await?;
        self.ctx.bot.answer_callback_query(&q.id).await?;

        Ok(())
    }

    async fn delete_bot(&self, q: &CallbackQuery, caller: i64, token: &str) -> HandlerResult {
        let Some(bot) = self.resolve_token(caller, token).await? else {
            self.ctx
                .bot
                .answer_callback_query(&q.id)
                .text("That bot is gone.")
                .await?;
            return Ok(());
        };

        if let Err(e) = self.manager.stop_tenant(&bot.credential).await {
            debug!("Delete of a non-running bot: {e}");
        }
        self.store.soft_delete_bot(bot.bot_id).await?;
        if let Err(e) = self.cache.purge_tenant(&bot.credential).await {
            warn!("Cache purge after delete failed: {e}");
        }

        info!("Bot {} soft-deleted", bot.bot_id);
        self.ctx
            .bot
            .answer_callback_query(&q.id)
            .text(format!("@{} deleted. Send its token again to restore it.", bot.username))
            .await?;

        Ok(())
    }

    /// Fleet aggregates; operator only.
    async fn send_stats(&self, q: &CallbackQuery, caller: i64) -> HandlerResult {
        if caller != self.operator_id {
            self.ctx
                .bot
                .answer_callback_query(&q.id)
                .text("Stats are for the operator.")
                .await?;
            return Ok(());
        }

        let stats = self.store.global_stats().await?;
        let card = format!(
            "🏭 Fleet\nBots: {} ({} active, {} running now)\nUsers: {}\nMessages: {}",
            stats.total_bots,
            stats.active_bots,
            self.manager.running_count(),
            stats.total_users,
            stats.total_messages,
        );

        self.ctx.bot.send_message(ChatId(caller), card).await?;
        self.ctx.bot.answer_callback_query(&q.id).await?;

        Ok(())
    }
}

/// Shape check for an upstream credential: `<digits>:<secret of ≥30 chars>`.
pub fn plausible_credential(input: &str) -> bool {
    match input.split_once(':') {
        Some((id, secret)) => {
            !id.is_empty() && id.chars().all(|c| c.is_ascii_digit()) && secret.len() >= 30
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("7512345678:AAHk3vXq9yPzW0eRtY2uIoP1aSdF4gHj5kL", true)]
    #[case("1:aaaaaaaaaaaaaaaaaaaaaaaaaaaaaa", true)]
    #[case("7512345678:short", false)]
    #[case("notdigits:AAHk3vXq9yPzW0eRtY2uIoP1aSdF4gHj5kL", false)]
    #[case(":AAHk3vXq9yPzW0eRtY2uIoP1aSdF4gHj5kL", false)]
    #[case("7512345678", false)]
    #[case("", false)]
    fn credential_shapes(#[case] input: &str, #[case] expected: bool) {
        assert_eq!(plausible_credential(input), expected);
    }
}
