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

//! The single inbound HTTP surface: `POST /webhook/{credential}`.
//!
//! # Description
//!
//! The upstream platform calls one URL per hosted bot; the credential in the
//! path is the demux key. Resolution order matters: an unknown credential is
//! 404 before the body is even parsed, a malformed body is 400, and an
//! accepted update answers 200 as soon as it is queued — processing happens
//! on the tenant's own supervised loop, never on the HTTP task.

use axum::{
    Router,
    extract::{Path, State},
    http::StatusCode,
    routing::post,
};
use std::sync::Arc;
use teloxide::types::Update;
use tracing::{debug, warn};

use crate::{errors::WebhookError, manager::Manager};

pub fn router(manager: Arc<Manager>) -> Router {
    Router::new()
        .route("/webhook/{credential}", post(receive_update))
        .with_state(manager)
}

async fn receive_update(
    State(manager): State<Arc<Manager>>,
    Path(credential): Path<String>,
    body: String,
) -> Result<StatusCode, WebhookError> {
    // Registry lookup first: updates for unknown or stopped bots are not
    // worth a parse.
    let Some(queue) = manager.queue_for(&credential) else {
        debug!("Update for an unknown credential");
        return Err(WebhookError::UnknownCredential);
    };

    let update: Update = serde_json::from_str(&body).map_err(|e| {
        warn!("Malformed update payload: {e}");
        WebhookError::MalformedUpdate
    })?;

    queue.send(update).await.map_err(|_| {
        // The loop died between lookup and send; the supervisor is already
        // on it.
        warn!("Update queue closed underneath the webhook");
        WebhookError::InternalServerError
    })?;

    Ok(StatusCode::OK)
}
