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

//! Library of the BotForge crate.
//!
//! # Description
//!
//! BotForge hosts many independent Telegram bots ("tenants") behind one
//! process and one HTTP port. The module map mirrors the runtime's layers:
//!
//! - [store] — durable state over Postgres, credentials encrypted at rest;
//! - [cache] — ephemeral mirrors over Valkey with per-family TTLs;
//! - [recovery] — bounded-restart supervision for long-running tasks;
//! - [manager] — the credential → running-bot registry and its lifecycle;
//! - [webhook] — the single `POST /webhook/{credential}` inbound surface;
//! - [dispatcher] — per-tenant update handling (owner replies, user
//!   pipeline, callbacks, interactive flows);
//! - [scheduler] — recurring broadcast sweep and next-fire arithmetic;
//! - [broadcast] — the rate-limited fan-out engine;
//! - [factory] — the operator bot that provisions every other bot.

pub mod broadcast;
pub mod cache;
pub mod configuration;
pub mod crypto;
pub mod dispatcher;
pub mod errors;
pub mod factory;
pub mod keyboards;
pub mod manager;
pub mod recovery;
pub mod scheduler;
pub mod store;
pub mod telemetry;
pub mod tenant;
pub mod texts;
pub mod webhook;
