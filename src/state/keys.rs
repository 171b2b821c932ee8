//! # Well-known shared-state keys and their publication order.
//!
//! All volatile keys below are registered by [`SharedState::bootstrap`](crate::SharedState::bootstrap)
//! **before** the registry constructs any service, so a service may fetch any of them
//! during construction regardless of its position in the service list.
//!
//! | key                  | kind      | initial              | written by       | read by          |
//! |----------------------|-----------|----------------------|------------------|------------------|
//! | `voltage`            | value     | `0.0`                | sensor service   | any              |
//! | `cpu_temp`           | value     | `0.0`                | sensor service   | any              |
//! | `person_detected`    | value     | `false`              | inference        | audio            |
//! | `camera_frame_queue` | reference | `SharedQueue<Value>` | camera/producer  | inference/consumer |
//!
//! Persisted keys (written rarely):
//!
//! | key                       | section    | written by              |
//! |---------------------------|------------|-------------------------|
//! | `maintenance_mode_active` | resilience | operator tooling        |
//! | `reboot_error_count`      | resilience | supervisor escalation   |
//! | `eco_mode_active`         | settings   | operator tooling        |
//! | `total_people_assisted`   | metrics    | services                |
//! | `total_system_restarts`   | metrics    | supervisor escalation   |

pub const VOLTAGE: &str = "voltage";
pub const CPU_TEMP: &str = "cpu_temp";
pub const PERSON_DETECTED: &str = "person_detected";
pub const CAMERA_FRAME_QUEUE: &str = "camera_frame_queue";

pub const MAINTENANCE_MODE_ACTIVE: &str = "maintenance_mode_active";
pub const REBOOT_ERROR_COUNT: &str = "reboot_error_count";
pub const ECO_MODE_ACTIVE: &str = "eco_mode_active";
pub const TOTAL_PEOPLE_ASSISTED: &str = "total_people_assisted";
pub const TOTAL_SYSTEM_RESTARTS: &str = "total_system_restarts";
