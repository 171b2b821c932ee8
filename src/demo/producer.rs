use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::ServiceError;
use crate::services::{BoxService, Service, ServiceContext};
use crate::state::{SharedQueue, Value, keys};

/// Pushes an increasing counter onto `camera_frame_queue`.
///
/// Settings: `interval_ms` (default 1000).
pub struct DummyProducer {
    queue: Arc<SharedQueue<Value>>,
    counter: i64,
    interval: Duration,
}

impl DummyProducer {
    pub fn build(ctx: &ServiceContext) -> Result<BoxService, ServiceError> {
        let queue = ctx
            .state()
            .get_reference::<SharedQueue<Value>>(keys::CAMERA_FRAME_QUEUE)?;
        let interval_ms = ctx
            .settings()
            .get_or::<u64>("interval_ms", 1000)
            .map_err(|e| ServiceError::build(e.to_string()))?;
        Ok(Box::new(Self {
            queue,
            counter: 0,
            interval: Duration::from_millis(interval_ms.max(1)),
        }))
    }
}

#[async_trait]
impl Service for DummyProducer {
    fn name(&self) -> &str {
        "producer"
    }

    async fn iterate(&mut self, _ctx: &CancellationToken) -> Result<(), ServiceError> {
        self.counter += 1;
        self.queue.push(Value::Int(self.counter));
        debug!(counter = self.counter, "frame added");
        Ok(())
    }

    fn idle_interval(&self) -> Duration {
        self.interval
    }
}
