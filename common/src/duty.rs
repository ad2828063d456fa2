use embedded_hal::delay::DelayNs;
use tracing::debug;

use crate::{config::ValveConfig, ports::VoltageSource};

/// Map averaged supply samples to the 8-bit PWM duty that puts
/// `target_voltage` across the actuator.
///
/// Returns 0 when the computed supply is not positive, so a dead sense line
/// never turns into full drive.
pub fn compute_duty(samples_mv: &[u32], divider_ratio: f32, target_voltage: f32) -> u8 {
    if samples_mv.is_empty() {
        return 0;
    }

    let sum: u64 = samples_mv.iter().map(|&mv| u64::from(mv)).sum();
    let avg_mv = sum / samples_mv.len() as u64;
    let supply_v = divider_ratio * avg_mv as f32 / 1000.0;

    if !supply_v.is_finite() || supply_v <= 0.0 {
        return 0;
    }

    let ratio = target_voltage / supply_v;
    if ratio.is_nan() {
        return 0;
    }
    let duty = (ratio.clamp(0.0, 1.0) * 255.0).round() as u8;

    debug!(avg_mv, supply_v, duty, "computed actuator duty");
    duty
}

/// Samples the supply rail through a [`VoltageSource`] and turns it into a
/// duty cycle. Settles for `sample_delay_ms` after every sample, so a
/// measurement blocks for `sample_count * sample_delay_ms`.
pub struct SupplySampler<V, D> {
    source: V,
    delay: D,
    sample_count: usize,
    sample_delay_ms: u32,
    divider_ratio: f32,
    target_voltage: f32,
}

impl<V: VoltageSource, D: DelayNs> SupplySampler<V, D> {
    pub fn new(source: V, delay: D, config: &ValveConfig) -> Self {
        Self {
            source,
            delay,
            sample_count: config.sample_count.max(1),
            sample_delay_ms: config.sample_delay_ms,
            divider_ratio: config.divider_ratio,
            target_voltage: config.target_voltage,
        }
    }

    pub fn measure_duty(&mut self) -> u8 {
        let mut samples = Vec::with_capacity(self.sample_count);
        for _ in 0..self.sample_count {
            samples.push(self.source.sample_millivolts());
            self.delay.delay_ms(self.sample_delay_ms);
        }
        compute_duty(&samples, self.divider_ratio, self.target_voltage)
    }

    pub fn source(&self) -> &V {
        &self.source
    }

    pub fn source_mut(&mut self) -> &mut V {
        &mut self.source
    }
}
