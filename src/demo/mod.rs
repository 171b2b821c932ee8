//! # Demo services.
//!
//! Small workers used by the `watchkeeper` binary and the integration tests to
//! exercise the supervisor end to end:
//!
//! | id              | reads                | writes                 |
//! |-----------------|----------------------|------------------------|
//! | `demo.sensor`   | -                    | `voltage`, `cpu_temp`  |
//! | `demo.producer` | -                    | `camera_frame_queue`   |
//! | `demo.consumer` | `camera_frame_queue` | -                      |

mod consumer;
mod producer;
mod sensor;

pub use consumer::DummyConsumer;
pub use producer::DummyProducer;
pub use sensor::SensorService;

use crate::registry::ServiceRegistry;

/// Registers every demo service under its `demo.*` identifier.
pub fn register(registry: &mut ServiceRegistry) -> &mut ServiceRegistry {
    registry
        .register("demo.sensor", SensorService::build)
        .register("demo.producer", DummyProducer::build)
        .register("demo.consumer", DummyConsumer::build)
}
