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

//! Store integration tests.
//!
//! These run against a real PostgreSQL instance (`DATABASE_URL` must point
//! at one with permission to create throwaway databases); `#[sqlx::test]`
//! provisions a fresh database per test and applies the embedded
//! migrations. They are `#[ignore]`d so a bare `cargo test` stays green on
//! machines without the backend: run them with `cargo test -- --ignored`.

mod helpers;
mod links;
mod schedules;
mod tenants;
