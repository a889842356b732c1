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

//! Custom error types.
//!
//! # Description
//!
//! One enum per subsystem, plus [WebhookError] for the single HTTP surface.
//! The taxonomy matters for the handlers: validation errors become
//! user-visible replies, upstream send failures split into *transient*
//! (retryable, counted as `failed` during fan-outs) and *semantic* (the user
//! blocked the bot — never retried, counted as `blocked`), and integrity
//! faults (a credential that fails to decrypt) abort the operation without
//! ever exposing the ciphertext.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

/// Errors raised by the durable store.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database error")]
    Database(#[from] sqlx::Error),
    #[error("credential encryption failure")]
    Crypto(#[from] CryptoError),
    #[error("a live bot already exists for this credential")]
    DuplicateCredential,
    #[error("bot id 0 is reserved for the factory and never persisted")]
    ReservedBotId,
    #[error("row has an unrecognised value in column {0}")]
    BadColumn(&'static str),
}

/// Errors raised by the cache layer.
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("error from the Valkey server")]
    Valkey(#[from] redis::RedisError),
    #[error("serialisation error")]
    Serialisation(#[from] serde_json::Error),
}

/// Errors raised by the deterministic credential cipher.
#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("encryption key must be exactly 32 bytes")]
    BadKeyLength,
    #[error("ciphertext is not valid hex")]
    BadEncoding(#[from] hex::FromHexError),
    #[error("ciphertext is too short to carry a nonce")]
    Truncated,
    #[error("decryption failed: stored credential is corrupt")]
    Integrity,
    #[error("decrypted credential is not valid UTF-8")]
    BadPlaintext,
}

/// Errors raised while starting or stopping a hosted bot.
#[derive(Error, Debug)]
pub enum ManagerError {
    #[error("failed to register the webhook upstream")]
    WebhookSetup(#[source] teloxide::RequestError),
    #[error("webhook base URL does not compose")]
    BadBaseUrl(#[from] url::ParseError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("no running bot for this credential")]
    NotRunning,
}

/// Classification of an upstream send failure.
///
/// `Blocked` is recognised by substring because the upstream client surfaces
/// the platform's error description as text; everything else is transient as
/// far as fan-out accounting is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendFailure {
    Blocked,
    Failed,
}

pub fn classify_send_error(err: &teloxide::RequestError) -> SendFailure {
    classify_send_text(&err.to_string())
}

fn classify_send_text(text: &str) -> SendFailure {
    if text.contains("blocked") || text.contains("Forbidden") {
        SendFailure::Blocked
    } else {
        SendFailure::Failed
    }
}

/// Result alias used across the dispatcher handlers.
pub type HandlerResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

/// Errors surfaced by the webhook HTTP endpoint.
#[derive(Debug)]
pub enum WebhookError {
    UnknownCredential,
    MalformedUpdate,
    InternalServerError,
}

impl IntoResponse for WebhookError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            WebhookError::UnknownCredential => {
                (StatusCode::NOT_FOUND, "Unknown webhook credential")
            }
            WebhookError::MalformedUpdate => (StatusCode::BAD_REQUEST, "Malformed update payload"),
            WebhookError::InternalServerError => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal error")
            }
        };
        let body = Json(serde_json::json!({
            "error": error_message,
        }));
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blocked_description_buckets_as_blocked() {
        assert_eq!(
            classify_send_text("Forbidden: bot was blocked by the user"),
            SendFailure::Blocked
        );
    }

    #[test]
    fn forbidden_without_blocked_still_buckets_as_blocked() {
        assert_eq!(
            classify_send_text("Forbidden: user is deactivated"),
            SendFailure::Blocked
        );
    }

    #[test]
    fn generic_errors_bucket_as_failed() {
        assert_eq!(
            classify_send_text("connection reset by peer"),
            SendFailure::Failed
        );
    }
}
