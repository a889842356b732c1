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

//! Tracing setup for the runtime.

use tracing::subscriber::{Subscriber, set_global_default};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Build the subscriber for the whole process.
///
/// `RUST_LOG` wins when present; otherwise the configured level applies to
/// this crate and `teloxide` is kept at `warn` so per-update chatter from the
/// upstream client does not drown the runtime's own logs.
pub fn get_subscriber(tracing_level: &str) -> impl Subscriber + Send + Sync {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("botforge={tracing_level},teloxide=warn,sqlx=warn"))
    });

    FmtSubscriber::builder().with_env_filter(filter).finish()
}

pub fn init_subscriber(subscriber: impl Subscriber + Send + Sync) {
    set_global_default(subscriber).expect("Failed to set subscriber.");
}
