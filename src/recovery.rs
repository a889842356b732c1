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

//! Supervision primitives for long-running tasks.
//!
//! # Description
//!
//! A hosted bot's dispatcher loop must survive programmer errors in handler
//! code: a panic on one update must not take the tenant (or the process)
//! down. [supervise] runs a task factory under a bounded restart policy —
//! panic, wait, re-create — and gives the caller a [RestartController] that
//! both cancels the running task and latches the supervisor so no further
//! restart happens.
//!
//! Panics are observed at the `JoinHandle` boundary (`JoinError::is_panic`),
//! so the supervised future runs as its own task and never needs an unwind
//! guard of its own.

use std::future::Future;
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{error, info, warn};

/// Bounded-restart policy: at most `max_attempts` panics within a
/// `reset_window`, `backoff` between restarts.
#[derive(Debug, Clone, Copy)]
pub struct RestartPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
    pub reset_window: Duration,
}

impl RestartPolicy {
    /// Policy applied to every tenant dispatcher.
    pub fn dispatcher() -> Self {
        RestartPolicy {
            max_attempts: 3,
            backoff: Duration::from_secs(5),
            reset_window: Duration::from_secs(60),
        }
    }
}

/// Handle over a supervised task.
///
/// `stop()` latches: any panic-and-restart decision taken afterwards becomes
/// "do not restart", and the running task observes cancellation through the
/// watch channel its factory received.
pub struct RestartController {
    cancel_tx: watch::Sender<bool>,
    stopped: Arc<AtomicBool>,
}

impl RestartController {
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        // Receivers may already be gone when the task finished on its own.
        let _ = self.cancel_tx.send(true);
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

/// Run `factory`'s futures under `policy`.
///
/// The factory is invoked once per (re)start and receives the cancellation
/// receiver; the future it returns is spawned as its own task. When the task
/// finishes cleanly the supervision ends. When it panics, the supervisor
/// sleeps `backoff` and re-invokes the factory, unless the attempt budget
/// within the reset window is exhausted — then `on_exhaust` runs once and
/// the task is abandoned until somebody starts it afresh.
pub fn supervise<F, Fut>(
    name: String,
    policy: RestartPolicy,
    mut factory: F,
    on_exhaust: impl FnOnce() + Send + 'static,
) -> RestartController
where
    F: FnMut(watch::Receiver<bool>) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let (cancel_tx, cancel_rx) = watch::channel(false);
    let stopped = Arc::new(AtomicBool::new(false));
    let latch = Arc::clone(&stopped);

    tokio::spawn(async move {
        let mut attempts: u32 = 0;
        let mut last_panic: Option<Instant> = None;
        let mut backoff_rx = cancel_rx.clone();
        let mut on_exhaust = Some(on_exhaust);

        loop {
            if latch.load(Ordering::SeqCst) {
                break;
            }

            let task = tokio::spawn(factory(cancel_rx.clone()));
            match task.await {
                Ok(()) => {
                    info!("Task '{name}' finished");
                    break;
                }
                Err(e) if e.is_panic() => {
                    let now = Instant::now();
                    if let Some(prev) = last_panic {
                        if now.duration_since(prev) >= policy.reset_window {
                            attempts = 0;
                        }
                    }
                    last_panic = Some(now);
                    attempts += 1;

                    if latch.load(Ordering::SeqCst) {
                        warn!("Task '{name}' panicked after stop; not restarting");
                        break;
                    }

                    if attempts >= policy.max_attempts {
                        error!(
                            "CRITICAL: task '{name}' panicked {attempts} times within the \
                             reset window; abandoning it"
                        );
                        if let Some(on_exhaust) = on_exhaust.take() {
                            on_exhaust();
                        }
                        break;
                    }

                    warn!(
                        "Task '{name}' panicked (attempt {attempts}/{}), restarting in {:?}",
                        policy.max_attempts, policy.backoff
                    );

                    tokio::select! {
                        _ = tokio::time::sleep(policy.backoff) => {}
                        _ = backoff_rx.changed() => {
                            // Stop arrived mid-backoff.
                            break;
                        }
                    }
                }
                Err(_) => {
                    // Aborted from outside; nothing to restart.
                    break;
                }
            }
        }
    });

    RestartController { cancel_tx, stopped }
}

/// One-shot variant for best-effort background work (webhook teardown and
/// friends): run the future as its own task, log a panic, never restart.
pub fn safe_go<Fut>(name: &'static str, fut: Fut)
where
    Fut: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        if let Err(e) = tokio::spawn(fut).await {
            if e.is_panic() {
                error!("Background task '{name}' panicked");
            }
        }
    });
}

/// Cancellation pair for plain cancellable tasks (the preload warmer).
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }
}

pub fn cancel_pair() -> (CancelHandle, watch::Receiver<bool>) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle { tx }, rx)
}

/// Convenience used inside supervised loops: has cancellation been signalled?
pub fn is_cancelled(rx: &watch::Receiver<bool>) -> bool {
    *rx.borrow()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;
    use tokio::time::{Duration, sleep};

    fn quick_policy(max_attempts: u32) -> RestartPolicy {
        RestartPolicy {
            max_attempts,
            backoff: Duration::from_millis(10),
            reset_window: Duration::from_secs(60),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn panicking_task_restarts_until_exhausted() {
        let runs = Arc::new(AtomicU32::new(0));
        let exhausted = Arc::new(AtomicBool::new(false));

        let runs_in_task = Arc::clone(&runs);
        let exhausted_flag = Arc::clone(&exhausted);
        let _controller = supervise(
            "panicky".to_owned(),
            quick_policy(3),
            move |_cancel| {
                let runs = Arc::clone(&runs_in_task);
                async move {
                    runs.fetch_add(1, Ordering::SeqCst);
                    panic!("boom");
                }
            },
            move || {
                exhausted_flag.store(true, Ordering::SeqCst);
            },
        );

        // Paused time auto-advances through the backoffs.
        sleep(Duration::from_secs(5)).await;

        assert_eq!(runs.load(Ordering::SeqCst), 3);
        assert!(exhausted.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn clean_exit_is_not_restarted() {
        let runs = Arc::new(AtomicU32::new(0));

        let runs_in_task = Arc::clone(&runs);
        let _controller = supervise(
            "one-and-done".to_owned(),
            quick_policy(3),
            move |_cancel| {
                let runs = Arc::clone(&runs_in_task);
                async move {
                    runs.fetch_add(1, Ordering::SeqCst);
                }
            },
            || {},
        );

        sleep(Duration::from_secs(5)).await;

        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_latches_against_further_restarts() {
        let runs = Arc::new(AtomicU32::new(0));

        let runs_in_task = Arc::clone(&runs);
        let controller = supervise(
            "stoppable".to_owned(),
            quick_policy(10),
            move |mut cancel| {
                let runs = Arc::clone(&runs_in_task);
                async move {
                    runs.fetch_add(1, Ordering::SeqCst);
                    // Park until cancelled, then leave cleanly.
                    let _ = cancel.changed().await;
                }
            },
            || {},
        );

        sleep(Duration::from_millis(50)).await;
        controller.stop();
        sleep(Duration::from_secs(5)).await;

        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert!(controller.is_stopped());
    }

    #[tokio::test(start_paused = true)]
    async fn stop_during_backoff_prevents_the_next_attempt() {
        let runs = Arc::new(AtomicU32::new(0));

        let runs_in_task = Arc::clone(&runs);
        let controller = supervise(
            "mid-backoff".to_owned(),
            RestartPolicy {
                max_attempts: 10,
                backoff: Duration::from_secs(3600),
                reset_window: Duration::from_secs(7200),
            },
            move |_cancel| {
                let runs = Arc::clone(&runs_in_task);
                async move {
                    runs.fetch_add(1, Ordering::SeqCst);
                    panic!("boom");
                }
            },
            || {},
        );

        // Let the first run panic and enter its (hour-long) backoff.
        sleep(Duration::from_millis(50)).await;
        controller.stop();
        sleep(Duration::from_secs(7200)).await;

        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_pair_signals_receivers() {
        let (handle, mut rx) = cancel_pair();
        assert!(!is_cancelled(&rx));

        handle.cancel();
        rx.changed().await.expect("sender alive");
        assert!(is_cancelled(&rx));
    }
}
