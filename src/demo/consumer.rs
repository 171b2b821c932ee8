use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::ServiceError;
use crate::services::{BoxService, Service, ServiceContext};
use crate::state::{SharedQueue, Value, keys};

/// Drains `camera_frame_queue` one item per iteration.
///
/// An empty queue is not an error; the pop is bounded by `poll_timeout_ms`
/// and races the instance token.
///
/// Settings: `poll_timeout_ms` (default 1000), `interval_ms` (default 500).
pub struct DummyConsumer {
    queue: Arc<SharedQueue<Value>>,
    poll_timeout: Duration,
    interval: Duration,
    consumed: u64,
}

impl DummyConsumer {
    pub fn build(ctx: &ServiceContext) -> Result<BoxService, ServiceError> {
        let queue = ctx
            .state()
            .get_reference::<SharedQueue<Value>>(keys::CAMERA_FRAME_QUEUE)?;
        let settings = ctx.settings();
        let poll_ms = settings
            .get_or::<u64>("poll_timeout_ms", 1000)
            .map_err(|e| ServiceError::build(e.to_string()))?;
        let interval_ms = settings
            .get_or::<u64>("interval_ms", 500)
            .map_err(|e| ServiceError::build(e.to_string()))?;
        Ok(Box::new(Self {
            queue,
            poll_timeout: Duration::from_millis(poll_ms),
            interval: Duration::from_millis(interval_ms.max(1)),
            consumed: 0,
        }))
    }
}

#[async_trait]
impl Service for DummyConsumer {
    fn name(&self) -> &str {
        "consumer"
    }

    async fn iterate(&mut self, ctx: &CancellationToken) -> Result<(), ServiceError> {
        if let Some(item) = self.queue.pop(self.poll_timeout, ctx).await {
            self.consumed += 1;
            debug!(%item, consumed = self.consumed, "frame consumed");
        }
        Ok(())
    }

    fn idle_interval(&self) -> Duration {
        self.interval
    }
}
