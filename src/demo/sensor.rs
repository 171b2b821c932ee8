use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::error::ServiceError;
use crate::services::{BoxService, Service, ServiceContext};
use crate::state::{SharedState, keys};

const VOLTAGE_RANGE: (f64, f64) = (10.0, 14.4);
const CPU_TEMP_RANGE: (f64, f64) = (30.0, 85.0);

/// Simulated voltage/temperature hardware publishing `voltage` and `cpu_temp`.
///
/// Each read drifts the previous value by a small random step and clamps it to a
/// plausible range. Settings:
/// - `interval_ms` (default 1000)
/// - `seed`: fixed RNG seed for reproducible runs
/// - `fault_rate`: probability in `[0, 1]` that a read fails (default 0)
pub struct SensorService {
    state: Arc<SharedState>,
    rng: StdRng,
    voltage: f64,
    cpu_temp: f64,
    fault_rate: f64,
    interval: Duration,
    reads: u64,
}

impl SensorService {
    pub fn build(ctx: &ServiceContext) -> Result<BoxService, ServiceError> {
        let settings = ctx.settings();
        let invalid = |e: crate::error::ConfigError| ServiceError::build(e.to_string());

        let rng = match settings.get::<u64>("seed").map_err(invalid)? {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        let fault_rate = settings.get_or::<f64>("fault_rate", 0.0).map_err(invalid)?;
        let interval_ms = settings.get_or::<u64>("interval_ms", 1000).map_err(invalid)?;

        Ok(Box::new(Self {
            state: Arc::clone(ctx.state()),
            rng,
            voltage: 12.5,
            cpu_temp: 45.0,
            fault_rate: fault_rate.clamp(0.0, 1.0),
            interval: Duration::from_millis(interval_ms.max(1)),
            reads: 0,
        }))
    }
}

#[async_trait]
impl Service for SensorService {
    fn name(&self) -> &str {
        "sensor"
    }

    async fn iterate(&mut self, _ctx: &CancellationToken) -> Result<(), ServiceError> {
        if self.fault_rate > 0.0 && self.rng.random_bool(self.fault_rate) {
            return Err(ServiceError::fault("i2c read timed out"));
        }

        self.voltage = (self.voltage + self.rng.random_range(-0.1..=0.1))
            .clamp(VOLTAGE_RANGE.0, VOLTAGE_RANGE.1);
        self.cpu_temp = (self.cpu_temp + self.rng.random_range(-1.0..=1.0))
            .clamp(CPU_TEMP_RANGE.0, CPU_TEMP_RANGE.1);

        self.state.set_volatile(keys::VOLTAGE, round2(self.voltage))?;
        self.state.set_volatile(keys::CPU_TEMP, round2(self.cpu_temp))?;

        self.reads += 1;
        if self.reads % 30 == 1 {
            info!(voltage = round2(self.voltage), cpu_temp = round2(self.cpu_temp), "hardware status");
        }
        Ok(())
    }

    fn idle_interval(&self) -> Duration {
        self.interval
    }
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}
