//! # Drive one service instance until it is cancelled.
//!
//! The run loop belongs to the crate, not to service authors, so every instance
//! obeys the same contract:
//!
//! ```text
//! while !token.is_cancelled() {
//!     iterate(&token)  (panics caught at this boundary)
//!       ├─ Ok(())          → health.report_health()
//!       ├─ Err(Canceled)   → leave loop
//!       └─ Err(e) / panic  → log, health.report_error()
//!     idle_interval() or token.cancelled(), whichever first
//! }
//! on_stop()
//! ```
//!
//! ## Rules
//! - Each completed iteration produces **exactly one** health report.
//! - Faults never propagate past this function.
//! - The runner never restarts anything; the owning slot watches the
//!   [`HealthTracker`] and decides.

use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::error::ServiceError;
use crate::services::{BoxService, HealthTracker};
use crate::subscribers::panic_message;

/// Smallest idle wait the runner accepts.
const MIN_IDLE: Duration = Duration::from_millis(1);

/// Why [`drive`] returned.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum RunExit {
    /// The instance token was cancelled (restart or shutdown).
    Cancelled,
    /// The service returned [`ServiceError::Canceled`] while its token was still live.
    Returned,
}

/// Runs `service` until `token` is cancelled or the service asks to stop.
pub(crate) async fn drive(
    mut service: BoxService,
    health: Arc<HealthTracker>,
    token: CancellationToken,
) -> RunExit {
    let name = service.name().to_string();
    let idle = idle_interval(&name, service.idle_interval());
    let mut exit = RunExit::Cancelled;

    while !token.is_cancelled() {
        let outcome = std::panic::AssertUnwindSafe(service.iterate(&token))
            .catch_unwind()
            .await;

        match outcome {
            Ok(Ok(())) => health.report_health(),
            Ok(Err(ServiceError::Canceled)) => {
                if !token.is_cancelled() {
                    exit = RunExit::Returned;
                }
                break;
            }
            Ok(Err(e)) => {
                warn!(
                    service = %name,
                    error = %e,
                    label = e.as_label(),
                    consecutive = health.consecutive_errors() + 1,
                    "iteration failed"
                );
                health.report_error();
            }
            Err(panic) => {
                error!(service = %name, panic = %panic_message(&*panic), "iteration panicked");
                health.report_error();
            }
        }

        tokio::select! {
            _ = token.cancelled() => break,
            _ = time::sleep(idle) => {}
        }
    }

    if std::panic::AssertUnwindSafe(service.on_stop())
        .catch_unwind()
        .await
        .is_err()
    {
        error!(service = %name, "on_stop panicked");
    }
    debug!(service = %name, ?exit, "run loop finished");
    exit
}

fn idle_interval(name: &str, requested: Duration) -> Duration {
    debug_assert!(
        !requested.is_zero(),
        "service {name} declared a zero idle interval"
    );
    if requested < MIN_IDLE {
        warn!(service = name, ?requested, "idle interval below 1ms, clamping");
        return MIN_IDLE;
    }
    requested
}
