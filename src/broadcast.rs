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

//! Rate-limited fan-out engine.
//!
//! # Description
//!
//! Both broadcast paths go through here: the owner-initiated "copy this
//! message to everyone" and the scheduler's payload fan-out. Sends are
//! sequential with a fixed gap so one tenant can never exceed the upstream
//! rate budget, and every failure is bucketed — `blocked` when the platform
//! says the user shut the bot out, `failed` for everything else. Neither
//! bucket aborts the run.

use teloxide::prelude::*;
use teloxide::types::{ChatId, MessageId};
use tokio::sync::watch;
use tokio::time::{Duration, sleep};
use tracing::{debug, warn};

use crate::{
    errors::{SendFailure, classify_send_error},
    recovery::is_cancelled,
    store::MediaPayload,
    tenant::TenantContext,
};

/// Gap between consecutive sends: 25 messages per second per tenant.
pub const SEND_GAP: Duration = Duration::from_millis(40);

/// Outcome tally of one fan-out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    pub success: u32,
    pub blocked: u32,
    pub failed: u32,
}

impl BroadcastReport {
    pub fn attempted(&self) -> u32 {
        self.success + self.blocked + self.failed
    }

    pub fn record(&mut self, outcome: Result<(), SendFailure>) {
        match outcome {
            Ok(()) => self.success += 1,
            Err(SendFailure::Blocked) => self.blocked += 1,
            Err(SendFailure::Failed) => self.failed += 1,
        }
    }
}

/// Copy one captured message to every recipient. The owner is skipped —
/// they authored the broadcast.
pub async fn copy_to_recipients(
    ctx: &TenantContext,
    source_msg_id: MessageId,
    recipients: &[i64],
    cancel: Option<&watch::Receiver<bool>>,
) -> BroadcastReport {
    let mut report = BroadcastReport::default();

    for &recipient in recipients {
        if recipient == ctx.owner_id() {
            continue;
        }
        if cancel.is_some_and(is_cancelled) {
            warn!("Broadcast cancelled after {} sends", report.attempted());
            break;
        }

        let outcome = ctx
            .bot
            .copy_message(ChatId(recipient), ctx.owner, source_msg_id)
            .await;

        match outcome {
            Ok(_) => report.record(Ok(())),
            Err(e) => {
                debug!("Broadcast copy to {recipient} failed: {e}");
                report.record(Err(classify_send_error(&e)));
            }
        }

        sleep(SEND_GAP).await;
    }

    report
}

/// Send a stored payload to every recipient, same pacing and accounting.
pub async fn send_to_recipients(
    ctx: &TenantContext,
    body: &str,
    media: Option<&MediaPayload>,
    recipients: &[i64],
    cancel: Option<&watch::Receiver<bool>>,
) -> BroadcastReport {
    let mut report = BroadcastReport::default();

    for &recipient in recipients {
        if recipient == ctx.owner_id() {
            continue;
        }
        if cancel.is_some_and(is_cancelled) {
            warn!("Fan-out cancelled after {} sends", report.attempted());
            break;
        }

        match ctx.send_payload(ChatId(recipient), body, media).await {
            Ok(()) => report.record(Ok(())),
            Err(e) => {
                debug!("Fan-out send to {recipient} failed: {e}");
                report.record(Err(classify_send_error(&e)));
            }
        }

        sleep(SEND_GAP).await;
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn report_buckets_every_outcome() {
        let mut report = BroadcastReport::default();
        report.record(Ok(()));
        report.record(Err(SendFailure::Blocked));
        report.record(Err(SendFailure::Failed));

        assert_eq!(report.success, 1);
        assert_eq!(report.blocked, 1);
        assert_eq!(report.failed, 1);
        assert_eq!(report.attempted(), 3);
    }

    #[test]
    fn send_gap_honours_the_rate_budget() {
        // 25 msg/s -> at least 40 ms between sends.
        assert!(SEND_GAP >= Duration::from_millis(40));
    }
}
