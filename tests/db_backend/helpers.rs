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

use botforge::{crypto::CredentialCipher, store::Store};
use once_cell::sync::Lazy;
use sqlx::PgPool;
use tracing::{Level, subscriber::set_global_default};
use tracing_subscriber::FmtSubscriber;

pub static TRACING: Lazy<()> = Lazy::new(|| {
    if std::env::var("TEST_LOG").is_ok() {
        let level = std::env::var("TEST_LOG").expect("Failed to read the content of TEST_LOG var");
        let level = match level.as_str() {
            "info" => Some(Level::INFO),
            "debug" => Some(Level::DEBUG),
            "warn" => Some(Level::WARN),
            "error" => Some(Level::ERROR),
            &_ => None,
        };

        if let Some(level) = level {
            let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
            set_global_default(subscriber).expect("Failed to set subscriber.");
        }
    }
});

const TEST_KEY: &str = "00112233445566778899aabbccddeeff00112233445566778899aabbccddeeff";

pub fn store_over(pool: PgPool) -> Store {
    Lazy::force(&TRACING);
    let cipher = CredentialCipher::new(TEST_KEY).expect("Failed to build the test cipher");
    Store::from_pool(pool, cipher)
}

/// A syntactically plausible credential, unique per `n`.
pub fn credential(n: u32) -> String {
    format!("{n}:AAHk3vXq9yPzW0eRtY2uIoP1aSdF4gHj5kL")
}
