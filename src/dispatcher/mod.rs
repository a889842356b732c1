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

//! Per-tenant update handling.
//!
//! # Description
//!
//! One [Dispatcher] per hosted bot. The manager feeds it updates through an
//! mpsc queue; [run_update_loop] is the supervised task that drains the
//! queue and spawns one short-lived processing task per update, so a slow
//! or panicking handler never blocks the queue and never takes the loop
//! down with it.
//!
//! Routing, in order: callback queries go to the callback table; messages
//! from the owner chat first get a chance to continue an interactive flow,
//! then fall into owner-reply handling; everything else is a user message
//! and walks the ban / subscription / auto-reply / forward pipeline.

pub mod callbacks;
pub mod flows;
mod owner;
mod user;

use std::sync::Arc;
use teloxide::prelude::*;
use teloxide::types::UpdateKind;
use tokio::sync::{Mutex, mpsc, watch};
use tracing::{debug, error};

use crate::{
    cache::CacheClient,
    errors::HandlerResult,
    factory::FactoryBot,
    recovery::safe_go,
    store::{BotFlag, Store},
    tenant::TenantContext,
    texts,
};

/// Update queue depth per tenant. Beyond this the webhook sheds load.
pub const UPDATE_QUEUE_DEPTH: usize = 256;

pub struct Dispatcher {
    ctx: Arc<TenantContext>,
    store: Store,
    cache: CacheClient,
}

impl Dispatcher {
    pub fn new(ctx: Arc<TenantContext>, store: Store, cache: CacheClient) -> Self {
        Dispatcher { ctx, store, cache }
    }

    pub(crate) fn ctx(&self) -> &TenantContext {
        &self.ctx
    }

    pub(crate) fn store(&self) -> &Store {
        &self.store
    }

    pub(crate) fn cache(&self) -> &CacheClient {
        &self.cache
    }

    pub async fn process(&self, update: Update) {
        let outcome: HandlerResult = match update.kind {
            UpdateKind::Message(msg) => self.process_message(msg).await,
            UpdateKind::CallbackQuery(query) => callbacks::process(self, query).await,
            // Edited messages, reactions and the rest carry nothing this
            // runtime acts on.
            _ => Ok(()),
        };

        if let Err(e) = outcome {
            error!("Update handling failed: {e}");
        }
    }

    async fn process_message(&self, msg: Message) -> HandlerResult {
        if self.ctx.is_owner_chat(msg.chat.id) {
            if flows::continue_flow(self, &msg).await? {
                return Ok(());
            }
            owner::handle_owner_message(self, &msg).await
        } else {
            user::handle_user_message(self, &msg).await
        }
    }

    /// Cache-through feature-flag read. A store fault falls back to the
    /// flag's safe default so one backend hiccup cannot brick the tenant.
    pub(crate) async fn flag_value(&self, flag: BotFlag) -> bool {
        let name = flag.column();

        match self.cache.flag(&self.ctx.credential, name).await {
            Ok(Some(value)) => return value,
            Ok(None) => {}
            Err(e) => debug!("Flag cache read failed: {e}"),
        }

        match self.store.bot_flag(self.ctx.bot_id, flag).await {
            Ok(value) => {
                if let Err(e) = self.cache.set_flag(&self.ctx.credential, name, value).await {
                    debug!("Flag cache write failed: {e}");
                }
                value
            }
            Err(e) => {
                error!("Flag read fell back to default: {e}");
                match flag {
                    BotFlag::ForwardAutoReplies => true,
                    BotFlag::ForcedSubEnabled => false,
                    BotFlag::ShowSentConfirmation => true,
                }
            }
        }
    }

    /// Cache-through start-message read.
    pub(crate) async fn start_message(&self) -> String {
        self.setting_value("start_message", texts::DEFAULT_START_MESSAGE)
            .await
    }

    pub(crate) async fn forced_sub_message(&self) -> String {
        self.setting_value("forced_sub_message", texts::DEFAULT_FORCED_SUB_MESSAGE)
            .await
    }

    async fn setting_value(&self, name: &str, default: &str) -> String {
        match self.cache.setting(&self.ctx.credential, name).await {
            Ok(Some(value)) if !value.is_empty() => return value,
            Ok(_) => {}
            Err(e) => debug!("Setting cache read failed: {e}"),
        }

        let stored = match self.store.bot_by_id(self.ctx.bot_id).await {
            Ok(Some(bot)) => match name {
                "start_message" => bot.start_message,
                _ => bot.forced_sub_message,
            },
            Ok(None) => String::new(),
            Err(e) => {
                error!("Setting read fell back to default: {e}");
                String::new()
            }
        };

        let value = if stored.is_empty() {
            default.to_owned()
        } else {
            stored
        };

        if let Err(e) = self
            .cache
            .set_setting(&self.ctx.credential, name, &value)
            .await
        {
            debug!("Setting cache write failed: {e}");
        }

        value
    }
}

/// A running bot's handler: an ordinary tenant or the factory.
pub enum BotHandler {
    Tenant(Dispatcher),
    Factory(FactoryBot),
}

impl BotHandler {
    pub async fn process(&self, update: Update) {
        match self {
            BotHandler::Tenant(dispatcher) => dispatcher.process(update).await,
            BotHandler::Factory(factory) => factory.process(update).await,
        }
    }
}

/// The supervised per-tenant loop.
///
/// The receiver sits behind an async mutex because a restart after a panic
/// re-enters the loop with the same queue; the lock is only ever contended
/// for the instant between death and restart.
pub async fn run_update_loop(
    handler: Arc<BotHandler>,
    queue: Arc<Mutex<mpsc::Receiver<Update>>>,
    mut cancel: watch::Receiver<bool>,
) {
    let mut rx = queue.lock().await;

    loop {
        tokio::select! {
            _ = cancel.changed() => break,
            received = rx.recv() => match received {
                Some(update) => {
                    let handler = Arc::clone(&handler);
                    safe_go("process-update", async move {
                        handler.process(update).await;
                    });
                }
                None => break,
            }
        }
    }
}
