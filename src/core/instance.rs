//! # Instance thread: one OS thread per running service instance.
//!
//! Each instance gets a named thread (`svc-<name>`) with its own single-threaded
//! tokio runtime driving [`runner::drive`]. A service that blocks inside
//! `iterate` (a camera read, an inference call) stalls only its own thread; the
//! supervisor and every other service keep running.
//!
//! ```text
//! slot actor (supervisor runtime)          instance thread
//!   spawn() ──────────────────────────────► current_thread runtime
//!                                             block_on(runner::drive)
//!   wait().await ◄──── oneshot ─────────────  InstanceExit
//! ```
//!
//! The slot never joins the thread itself: it awaits the oneshot, so a thread
//! that ignores cancellation can be abandoned without blocking anything.

use std::io;
use std::sync::Arc;
use std::thread;

use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use crate::core::runner::{self, RunExit};
use crate::services::{BoxService, HealthTracker};
use crate::subscribers::panic_message;

/// How an instance thread ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum InstanceExit {
    /// The run loop returned.
    Finished(RunExit),
    /// The run loop panicked outside an iteration, or the runtime could not start.
    Failed(String),
}

/// Completion handle of a spawned instance thread.
pub(crate) struct InstanceHandle {
    done: oneshot::Receiver<InstanceExit>,
}

impl InstanceHandle {
    /// Resolves when the instance thread has finished its run loop.
    ///
    /// Cancel-safe: dropping the future leaves the handle usable.
    pub(crate) async fn wait(&mut self) -> InstanceExit {
        (&mut self.done).await.unwrap_or_else(|_| {
            InstanceExit::Failed("instance thread ended without reporting".to_string())
        })
    }
}

/// Starts `service` on a dedicated thread.
pub(crate) fn spawn(
    name: &str,
    service: BoxService,
    health: Arc<HealthTracker>,
    token: CancellationToken,
) -> io::Result<InstanceHandle> {
    let (tx, rx) = oneshot::channel();

    thread::Builder::new()
        .name(format!("svc-{name}"))
        .spawn(move || {
            let exit = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(rt) => {
                    let ran = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                        rt.block_on(runner::drive(service, health, token))
                    }));
                    match ran {
                        Ok(exit) => InstanceExit::Finished(exit),
                        Err(panic) => InstanceExit::Failed(format!(
                            "run loop panicked: {}",
                            panic_message(&*panic)
                        )),
                    }
                }
                Err(e) => InstanceExit::Failed(format!("instance runtime: {e}")),
            };
            let _ = tx.send(exit);
        })?;

    Ok(InstanceHandle { done: rx })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ServiceError;
    use crate::services::Service;
    use async_trait::async_trait;
    use std::time::Duration;

    /// Blocks its thread on every iteration.
    struct Grinder;

    #[async_trait]
    impl Service for Grinder {
        fn name(&self) -> &str {
            "grinder"
        }

        async fn iterate(&mut self, _ctx: &CancellationToken) -> Result<(), ServiceError> {
            std::thread::sleep(Duration::from_millis(20));
            Ok(())
        }

        fn idle_interval(&self) -> Duration {
            Duration::from_millis(1)
        }
    }

    #[tokio::test(flavor = "current_thread")]
    async fn blocking_service_does_not_stall_the_caller() {
        let health = Arc::new(HealthTracker::new(3));
        let token = CancellationToken::new();
        let mut handle = spawn("grinder", Box::new(Grinder), health, token.clone()).unwrap();

        // Sharing this current_thread runtime, each tick would wait out a 20ms grind.
        let started = std::time::Instant::now();
        for _ in 0..20 {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        assert!(started.elapsed() < Duration::from_millis(300));

        token.cancel();
        let exit = tokio::time::timeout(Duration::from_secs(1), handle.wait())
            .await
            .expect("instance should stop after cancellation");
        assert_eq!(exit, InstanceExit::Finished(RunExit::Cancelled));
    }

    #[tokio::test]
    async fn waiting_again_after_a_dropped_wait_still_resolves() {
        let health = Arc::new(HealthTracker::new(3));
        let token = CancellationToken::new();
        let mut handle = spawn("grinder", Box::new(Grinder), health, token.clone()).unwrap();

        assert!(
            tokio::time::timeout(Duration::from_millis(5), handle.wait())
                .await
                .is_err()
        );
        token.cancel();
        assert_eq!(handle.wait().await, InstanceExit::Finished(RunExit::Cancelled));
    }
}
