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

//! The tenant registry: start, stop and supervise hosted bots.
//!
//! # Description
//!
//! The manager owns the only map from credential to running bot. Webhook
//! demux, the factory's start/stop buttons and the scheduler's bot lookup
//! all go through it. The map sits behind a reader/writer lock; no await
//! point ever runs under the lock — lookups copy out what they need
//! (a queue sender, a context handle) and release before any I/O.
//!
//! Each running bot is a supervised update loop (see [crate::recovery]) fed
//! by an mpsc queue the webhook endpoint pushes into. Stopping a bot
//! cancels its preload task, latches its restart controller and removes the
//! upstream webhook best-effort — a teardown failure there must never take
//! the manager down.

use std::collections::HashMap;
use std::sync::{Arc, RwLock, Weak};
use teloxide::prelude::*;
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, error, info, instrument, warn};
use url::Url;

use crate::{
    cache::CacheClient,
    dispatcher::{BotHandler, Dispatcher, UPDATE_QUEUE_DEPTH, run_update_loop},
    errors::ManagerError,
    recovery::{CancelHandle, RestartController, RestartPolicy, cancel_pair, is_cancelled, safe_go, supervise},
    store::{BotRecord, Store},
    tenant::TenantContext,
};

struct TenantHandle {
    ctx: Arc<TenantContext>,
    queue: mpsc::Sender<Update>,
    controller: RestartController,
    preload: Option<CancelHandle>,
}

pub struct Manager {
    registry: RwLock<HashMap<String, TenantHandle>>,
    store: Store,
    cache: CacheClient,
    webhook_base: String,
    weak_self: Weak<Manager>,
}

impl Manager {
    pub fn new(store: Store, cache: CacheClient, webhook_base: String) -> Arc<Self> {
        Arc::new_cyclic(|weak_self| Manager {
            registry: RwLock::new(HashMap::new()),
            store,
            cache,
            webhook_base: webhook_base.trim_end_matches('/').to_owned(),
            weak_self: weak_self.clone(),
        })
    }

    fn webhook_url(&self, credential: &str) -> Result<Url, ManagerError> {
        Ok(Url::parse(&format!(
            "{}/webhook/{credential}",
            self.webhook_base
        ))?)
    }

    /// Enrol an already-constructed bot (the factory) without durable
    /// identity or preload.
    pub async fn register_existing_bot(
        &self,
        ctx: Arc<TenantContext>,
        handler: BotHandler,
    ) -> Result<(), ManagerError> {
        if self.is_running(&ctx.credential) {
            return Ok(());
        }

        ctx.bot
            .set_webhook(self.webhook_url(&ctx.credential)?)
            .await
            .map_err(ManagerError::WebhookSetup)?;

        self.launch(ctx, handler, None);
        Ok(())
    }

    /// Start a hosted bot. Idempotent on a duplicate credential.
    ///
    /// Webhook registration failure is fatal for the call: the bot is not
    /// inserted and the error is returned.
    #[instrument(name = "Start tenant", skip_all, fields(bot_id = record.bot_id))]
    pub async fn start_tenant(&self, record: &BotRecord) -> Result<(), ManagerError> {
        if self.is_running(&record.credential) {
            debug!("Tenant already running");
            return Ok(());
        }

        let ctx = Arc::new(TenantContext::new(
            record.credential.clone(),
            record.bot_id,
            record.owner_id,
            record.username.clone(),
        ));

        ctx.bot
            .set_webhook(self.webhook_url(&ctx.credential)?)
            .await
            .map_err(ManagerError::WebhookSetup)?;

        let preload = self.spawn_preload(Arc::clone(&ctx), record);
        let dispatcher = Dispatcher::new(Arc::clone(&ctx), self.store.clone(), self.cache.clone());
        self.launch(ctx, BotHandler::Tenant(dispatcher), Some(preload));

        info!("Tenant started");
        Ok(())
    }

    /// Queue wiring and supervision for one bot, then registry insertion.
    fn launch(&self, ctx: Arc<TenantContext>, handler: BotHandler, preload: Option<CancelHandle>) {
        let (queue_tx, queue_rx) = mpsc::channel(UPDATE_QUEUE_DEPTH);
        let queue_rx = Arc::new(Mutex::new(queue_rx));
        let handler = Arc::new(handler);

        let loop_name = format!("dispatcher-{}", ctx.bot_id);
        let weak = self.weak_self.clone();
        let credential = ctx.credential.clone();
        let controller = supervise(
            loop_name,
            RestartPolicy::dispatcher(),
            move |cancel| {
                let handler = Arc::clone(&handler);
                let queue_rx = Arc::clone(&queue_rx);
                async move {
                    run_update_loop(handler, queue_rx, cancel).await;
                }
            },
            move || {
                // The dispatcher is abandoned; drop it from the registry so
                // the webhook answers 404 instead of queueing into a corpse.
                if let Some(manager) = weak.upgrade() {
                    tokio::spawn(async move {
                        let _ = manager.stop_tenant(&credential).await;
                    });
                }
            },
        );

        let handle = TenantHandle {
            ctx,
            queue: queue_tx,
            controller,
            preload,
        };

        let stale = {
            let mut registry = self.registry.write().unwrap();
            match registry.contains_key(&handle.ctx.credential) {
                // Lost a start race; the older entry wins.
                true => Some(handle),
                false => {
                    registry.insert(handle.ctx.credential.clone(), handle);
                    None
                }
            }
        };

        if let Some(handle) = stale {
            handle.controller.stop();
            if let Some(preload) = handle.preload {
                preload.cancel();
            }
        }
    }

    /// Warm the cache with the tenant's settings, flags and auto-replies.
    /// Cancellable: stopping the tenant mid-preload abandons the rest.
    fn spawn_preload(&self, ctx: Arc<TenantContext>, record: &BotRecord) -> CancelHandle {
        let (handle, cancel) = cancel_pair();
        let store = self.store.clone();
        let cache = self.cache.clone();
        let record = record.clone();

        safe_go("tenant-preload", async move {
            let credential = &ctx.credential;

            if !record.start_message.is_empty() {
                let _ = cache
                    .set_setting(credential, "start_message", &record.start_message)
                    .await;
            }
            if !record.forced_sub_message.is_empty() {
                let _ = cache
                    .set_setting(credential, "forced_sub_message", &record.forced_sub_message)
                    .await;
            }
            if is_cancelled(&cancel) {
                return;
            }

            for (name, value) in [
                ("forward_auto_replies", record.forward_auto_replies),
                ("forced_sub_enabled", record.forced_sub_enabled),
                ("show_sent_confirmation", record.show_sent_confirmation),
            ] {
                let _ = cache.set_flag(credential, name, value).await;
            }
            if is_cancelled(&cancel) {
                return;
            }

            match store.all_auto_replies(record.bot_id).await {
                Ok(replies) => {
                    for reply in &replies {
                        if is_cancelled(&cancel) {
                            return;
                        }
                        let _ = cache
                            .cache_auto_reply(credential, reply.kind.as_str(), &reply.into())
                            .await;
                    }
                    debug!("Preloaded {} auto-replies", replies.len());
                }
                Err(e) => warn!("Auto-reply preload failed: {e}"),
            }
        });

        handle
    }

    /// Stop one bot: cancel preload, latch the controller, remove the
    /// upstream webhook and purge the tenant's caches best-effort.
    #[instrument(name = "Stop tenant", skip_all)]
    pub async fn stop_tenant(&self, credential: &str) -> Result<(), ManagerError> {
        let handle = {
            let mut registry = self.registry.write().unwrap();
            registry.remove(credential)
        };
        let Some(handle) = handle else {
            return Err(ManagerError::NotRunning);
        };

        self.teardown(handle);
        info!("Tenant stopped");
        Ok(())
    }

    fn teardown(&self, handle: TenantHandle) {
        if let Some(preload) = handle.preload {
            preload.cancel();
        }
        handle.controller.stop();

        let cache = self.cache.clone();
        let ctx = handle.ctx;
        safe_go("webhook-teardown", async move {
            if let Err(e) = ctx.bot.delete_webhook().await {
                warn!("Webhook removal failed (ignored): {e}");
            }
            if let Err(e) = cache.purge_tenant(&ctx.credential).await {
                warn!("Cache purge failed (ignored): {e}");
            }
        });
    }

    /// Stop every bot. The registry is drained under the write lock; the
    /// per-bot teardown happens after release.
    pub async fn stop_all(&self) {
        let handles: Vec<TenantHandle> = {
            let mut registry = self.registry.write().unwrap();
            registry.drain().map(|(_, handle)| handle).collect()
        };

        info!("Stopping {} bots", handles.len());
        for handle in handles {
            self.teardown(handle);
        }
    }

    pub fn is_running(&self, credential: &str) -> bool {
        self.registry.read().unwrap().contains_key(credential)
    }

    pub fn running_count(&self) -> usize {
        self.registry.read().unwrap().len()
    }

    /// Queue sender for the webhook endpoint. Copy-out: the lock is gone
    /// before the caller awaits the send.
    pub fn queue_for(&self, credential: &str) -> Option<mpsc::Sender<Update>> {
        self.registry
            .read()
            .unwrap()
            .get(credential)
            .map(|handle| handle.queue.clone())
    }

    /// Context lookup for the scheduler. Bot id 0 is the factory and never
    /// resolves.
    pub fn context_by_bot_id(&self, bot_id: i64) -> Option<Arc<TenantContext>> {
        if bot_id == 0 {
            return None;
        }

        self.registry
            .read()
            .unwrap()
            .values()
            .find(|handle| handle.ctx.bot_id == bot_id)
            .map(|handle| Arc::clone(&handle.ctx))
    }

    /// Bring every active bot back up after a process restart.
    pub async fn resume_active_tenants(&self) -> Result<usize, ManagerError> {
        let records = self.store.active_bots().await?;
        let mut started = 0;

        for record in &records {
            match self.start_tenant(record).await {
                Ok(()) => started += 1,
                Err(e) => error!("Bot {} did not resume: {e}", record.bot_id),
            }
        }

        Ok(started)
    }
}
