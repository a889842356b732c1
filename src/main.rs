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

//! Main file of BotForge.

use botforge::{
    cache::CacheClient,
    configuration::Settings,
    crypto::CredentialCipher,
    dispatcher::BotHandler,
    factory::{FactoryBot, FactoryCommand},
    manager::Manager,
    recovery::cancel_pair,
    scheduler::Scheduler,
    store::Store,
    telemetry::{get_subscriber, init_subscriber},
    tenant::{FACTORY_BOT_ID, TenantContext},
    webhook,
};
use secrecy::ExposeSecret;
use std::{net::SocketAddr, str::FromStr, sync::Arc};
use teloxide::{prelude::*, utils::command::BotCommands};
use tokio::{net::TcpListener, signal};
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load the settings.
    let settings = Settings::new().expect("Failed to parse configuration files.");

    // Initialize the tracing subsystem.
    let subscriber = get_subscriber(settings.tracing_level.as_str());
    init_subscriber(subscriber);

    // A bad encryption key must stop the boot before anything touches the
    // credential column.
    let cipher = CredentialCipher::new(settings.security.encryption_key.expose_secret())?;

    // Backends: Postgres (with embedded migrations) and Valkey.
    let store = Store::connect(&settings.database, cipher).await?;
    store.migrate().await?;
    let cache = CacheClient::new(&settings.cache)?;
    cache.ping().await?;

    let manager = Manager::new(
        store.clone(),
        cache.clone(),
        settings.application.webhook_base_url.clone(),
    );

    // Bring up the factory bot first: without it nobody can manage tenants.
    let factory_credential = settings
        .application
        .factory_credential
        .expose_secret()
        .to_owned();
    let operator_id = settings.application.operator_user_id;

    let factory_ctx = {
        let probe = Bot::new(factory_credential.clone());
        let me = probe.get_me().await?;
        Arc::new(TenantContext::new(
            factory_credential,
            FACTORY_BOT_ID,
            operator_id,
            me.username().to_owned(),
        ))
    };
    factory_ctx
        .bot
        .set_my_commands(FactoryCommand::bot_commands())
        .await?;

    let factory = FactoryBot::new(
        Arc::clone(&factory_ctx),
        store.clone(),
        cache.clone(),
        Arc::clone(&manager),
        operator_id,
    );
    manager
        .register_existing_bot(factory_ctx, BotHandler::Factory(factory))
        .await?;

    // Resurrect the fleet.
    match manager.resume_active_tenants().await {
        Ok(resumed) => info!("Resumed {resumed} hosted bots"),
        Err(e) => error!("Fleet resume incomplete: {e}"),
    }

    // Scheduler ticker.
    let (scheduler_cancel, scheduler_rx) = cancel_pair();
    let scheduler = Scheduler::new(
        store.clone(),
        Arc::clone(&manager),
        settings.scheduler.interval(),
        settings.scheduler.batch_limit(),
    );
    tokio::spawn(async move {
        scheduler.run(scheduler_rx).await;
    });

    // The single HTTP surface.
    let http_server_address = SocketAddr::from_str(&format!(
        "{}:{}",
        &settings.application.http_server_host, settings.application.http_server_port
    ))
    .expect("Failed to build a socket using the configuration");

    let tcp_listener = TcpListener::bind(http_server_address)
        .await
        .expect("Failed to bind to the provided address");

    info!("Started BotForge server on {http_server_address}");

    let app = webhook::router(Arc::clone(&manager));
    axum::serve(tcp_listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Teardown order: bots first (webhooks removed, caches purged), then
    // the scheduler, then the pools.
    manager.stop_all().await;
    scheduler_cancel.cancel();
    store.close().await;

    info!("Gracefully closed BotForge server");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Unable to listen for shutdown signal: {e}");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => error!("Unable to install SIGTERM handler: {e}"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Signal ctrl-c received!"),
        _ = terminate => info!("SIGTERM received"),
    }
}
