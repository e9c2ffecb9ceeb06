//
// Copyright 2026 Hans W. Uhlig. All Rights Reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//

//! Cooperative single-task executor for wake-driven work.
//!
//! A [`Task`] reports progress through `iterate() -> bool`: `true` means
//! "call me again immediately", `false` means "quiescent until the next
//! wake". The [`TaskRunner`] owns one background task parked on a
//! [`Notify`]; [`wakeup`](TaskRunnerHandle::wakeup) sets a pending flag and
//! signals it, so wakes are coalesced rather than queued.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::trace;

/// A unit of wake-driven work.
#[async_trait]
pub trait Task: Send + Sync + 'static {
    /// Performs one cycle of work.
    ///
    /// Returns `true` when another cycle should run immediately.
    async fn iterate(&self) -> bool;
}

struct RunnerShared {
    notify: Notify,
    pending: AtomicBool,
    shutdown: AtomicBool,
}

/// Cloneable wake handle, safe to hold from inside the task itself.
#[derive(Clone)]
pub struct TaskRunnerHandle {
    shared: Arc<RunnerShared>,
}

impl TaskRunnerHandle {
    /// Requests another iterate cycle. Coalesces with pending wakes.
    pub fn wakeup(&self) {
        self.shared.pending.store(true, Ordering::SeqCst);
        self.shared.notify.notify_one();
    }
}

/// Owns the background task driving one [`Task`].
pub struct TaskRunner {
    shared: Arc<RunnerShared>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl TaskRunner {
    /// Spawns the runner task. The task starts parked; call
    /// [`wakeup`](TaskRunnerHandle::wakeup) to run the first cycle.
    pub fn new(task: Arc<dyn Task>) -> Self {
        let shared = Arc::new(RunnerShared {
            notify: Notify::new(),
            pending: AtomicBool::new(false),
            shutdown: AtomicBool::new(false),
        });
        let loop_shared = shared.clone();
        let handle = tokio::spawn(async move {
            while !loop_shared.shutdown.load(Ordering::SeqCst) {
                if loop_shared.pending.swap(false, Ordering::SeqCst) {
                    while task.iterate().await {
                        if loop_shared.shutdown.load(Ordering::SeqCst) {
                            return;
                        }
                    }
                    trace!("task settled");
                } else {
                    loop_shared.notify.notified().await;
                }
            }
        });
        Self {
            shared,
            handle: Mutex::new(Some(handle)),
        }
    }

    /// Returns a wake handle for this runner.
    pub fn handle(&self) -> TaskRunnerHandle {
        TaskRunnerHandle {
            shared: self.shared.clone(),
        }
    }

    /// Requests another iterate cycle.
    pub fn wakeup(&self) {
        self.handle().wakeup();
    }

    /// Stops the runner once the task settles and waits for the thread of
    /// control to exit.
    pub async fn shutdown(&self) {
        self.shared.shutdown.store(true, Ordering::SeqCst);
        self.shared.notify.notify_one();
        let handle = self.handle.lock().expect("runner handle lock").take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }

    /// Stops the runner, waiting at most `timeout` for the current cycle.
    ///
    /// Does not guarantee the task's iterate has completed: on timeout the
    /// background task is aborted mid-cycle.
    pub async fn shutdown_timeout(&self, timeout: Duration) {
        self.shared.shutdown.store(true, Ordering::SeqCst);
        self.shared.notify.notify_one();
        let handle = self.handle.lock().expect("runner handle lock").take();
        if let Some(handle) = handle {
            let abort = handle.abort_handle();
            if tokio::time::timeout(timeout, handle).await.is_err() {
                trace!("task runner shutdown timed out, aborting cycle");
                abort.abort();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    struct CountingTask {
        cycles: AtomicUsize,
        extra_cycles: AtomicUsize,
    }

    #[async_trait]
    impl Task for CountingTask {
        async fn iterate(&self) -> bool {
            self.cycles.fetch_add(1, Ordering::SeqCst);
            // Report progress for the first few cycles, then settle.
            self.extra_cycles
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |extra| {
                    extra.checked_sub(1)
                })
                .is_ok()
        }
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    #[tokio::test]
    async fn test_wakeup_runs_one_cycle() {
        let task = Arc::new(CountingTask {
            cycles: AtomicUsize::new(0),
            extra_cycles: AtomicUsize::new(0),
        });
        let runner = TaskRunner::new(task.clone());
        runner.wakeup();
        settle().await;
        assert_eq!(task.cycles.load(Ordering::SeqCst), 1);
        runner.shutdown().await;
    }

    #[tokio::test]
    async fn test_iterate_true_reruns_until_false() {
        let task = Arc::new(CountingTask {
            cycles: AtomicUsize::new(0),
            extra_cycles: AtomicUsize::new(3),
        });
        let runner = TaskRunner::new(task.clone());
        runner.wakeup();
        settle().await;
        assert_eq!(task.cycles.load(Ordering::SeqCst), 4);
        runner.shutdown().await;
    }

    #[tokio::test]
    async fn test_wakes_coalesce() {
        let task = Arc::new(CountingTask {
            cycles: AtomicUsize::new(0),
            extra_cycles: AtomicUsize::new(0),
        });
        let runner = TaskRunner::new(task.clone());
        runner.wakeup();
        runner.wakeup();
        runner.wakeup();
        settle().await;
        // All wakes arrived before the first cycle ran; they coalesce into
        // at most two cycles (one per flag observation), not three.
        assert!(task.cycles.load(Ordering::SeqCst) <= 2);
        runner.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_is_prompt_when_parked() {
        let task = Arc::new(CountingTask {
            cycles: AtomicUsize::new(0),
            extra_cycles: AtomicUsize::new(0),
        });
        let runner = TaskRunner::new(task);
        tokio::time::timeout(Duration::from_secs(1), runner.shutdown())
            .await
            .expect("shutdown should not hang");
    }

    struct StuckTask;

    #[async_trait]
    impl Task for StuckTask {
        async fn iterate(&self) -> bool {
            std::future::pending::<()>().await;
            false
        }
    }

    #[tokio::test]
    async fn test_shutdown_timeout_gives_up_on_stuck_task() {
        let runner = TaskRunner::new(Arc::new(StuckTask));
        runner.wakeup();
        tokio::time::sleep(Duration::from_millis(20)).await;
        tokio::time::timeout(
            Duration::from_secs(1),
            runner.shutdown_timeout(Duration::from_millis(50)),
        )
        .await
        .expect("timed shutdown must return");
    }
}
