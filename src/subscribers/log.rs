//! # LogWriter: bus events as `tracing` records.
//!
//! Maps each [`EventKind`] to a log level so an operator reading the journal sees
//! the supervisor's decisions without subscribing to the bus:
//!
//! ```text
//! ServiceStarting / ServiceStopped / AllStoppedWithin        → debug / info
//! ServiceRestarted                                           → info
//! RestartRequested / ServiceExited / BackoffScheduled         → warn
//! RestartLeaked / SlotDead / Escalated / GraceExceeded       → error
//! ```
//!
//! The supervisor already logs at the point where each decision is made; this
//! subscriber exists for deployments that want one structured line per event
//! under the `watchkeeper::events` target.

use async_trait::async_trait;
use tracing::{debug, error, info, warn};

use crate::events::{Event, EventKind};
use crate::subscribers::Subscribe;

const TARGET: &str = "watchkeeper::events";

/// Event writer subscriber.
#[derive(Default)]
pub struct LogWriter;

impl LogWriter {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        let service = e.service.as_deref().unwrap_or("-");
        let reason = e.reason.as_deref().unwrap_or("");
        match e.kind {
            EventKind::ShutdownRequested => {
                info!(target: TARGET, seq = e.seq, "[shutdown-requested]");
            }
            EventKind::AllStoppedWithin => {
                info!(target: TARGET, seq = e.seq, "[all-stopped-within-grace]");
            }
            EventKind::GraceExceeded => {
                error!(target: TARGET, seq = e.seq, stuck = reason, "[grace-exceeded]");
            }
            EventKind::ServiceStarting => {
                debug!(target: TARGET, seq = e.seq, service, generation = ?e.generation, "[starting]");
            }
            EventKind::ServiceStopped => {
                debug!(target: TARGET, seq = e.seq, service, generation = ?e.generation, "[stopped]");
            }
            EventKind::ServiceExited => {
                warn!(target: TARGET, seq = e.seq, service, reason, "[exited]");
            }
            EventKind::ServiceRestarted => {
                info!(target: TARGET, seq = e.seq, service, restarts = ?e.restarts, "[restarted]");
            }
            EventKind::RestartRequested => {
                warn!(target: TARGET, seq = e.seq, service, reason, "[restart-requested]");
            }
            EventKind::RestartLeaked => {
                error!(target: TARGET, seq = e.seq, service, timeout_ms = ?e.timeout_ms, "[restart-leaked]");
            }
            EventKind::BackoffScheduled => {
                warn!(target: TARGET, seq = e.seq, service, delay_ms = ?e.delay_ms, restarts = ?e.restarts, "[backoff]");
            }
            EventKind::Escalated => {
                error!(target: TARGET, seq = e.seq, service, restarts = ?e.restarts, "[escalated]");
            }
            EventKind::SlotDead => {
                error!(target: TARGET, seq = e.seq, service, reason, "[slot-dead]");
            }
            EventKind::SubscriberOverflow => {
                warn!(target: TARGET, seq = e.seq, subscriber = service, reason, "[subscriber-overflow]");
            }
            EventKind::SubscriberPanicked => {
                warn!(target: TARGET, seq = e.seq, subscriber = service, reason, "[subscriber-panicked]");
            }
        }
    }

    fn name(&self) -> &'static str {
        "LogWriter"
    }
}
