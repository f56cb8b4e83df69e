//! Configuration sections for the devices in this crate.
//!
//! Each section deserializes with `serde` from whatever format the application
//! uses, fills in defaults for omitted fields, and checks its ranges in
//! `validate()`. Construction from a section (`from_config`) validates first.

use serde::Deserialize;

use crate::{ConfigError, Result};

/// Longest pin description a configuration section accepts, including prefixes.
pub const PIN_DESC_LEN: usize = 24;

/// A pin description such as `^ext:PB3`. See [`crate::mcu::Pins`].
pub type PinDesc = heapless::String<PIN_DESC_LEN>;

pub(crate) fn ensure_positive(value: f64, field: &'static str) -> Result<()> {
    // Written so NaN fails too.
    if value > 0.0 && value.is_finite() {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange { field }.into())
    }
}

fn ensure_at_least_zero(value: f64, field: &'static str) -> Result<()> {
    if value >= 0.0 && value.is_finite() {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange { field }.into())
    }
}

fn ensure_fraction(value: f64, field: &'static str) -> Result<()> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange { field }.into())
    }
}

// ============================================================================
// PwmInConfig
// ============================================================================

const fn default_read_interval() -> f64 {
    0.1
}

const fn default_pwm_frequency() -> f64 {
    100.0
}

/// Settings for a [`PwmIn`](crate::pwm_in::PwmIn).
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct PwmInConfig {
    /// Input pin description.
    pub pin: PinDesc,
    /// Seconds between readings.
    #[serde(default = "default_read_interval")]
    pub read_interval: f64,
    /// Nominal signal frequency in Hz (pulses per second at 100% duty).
    #[serde(default = "default_pwm_frequency")]
    pub pwm_frequency: f64,
    /// Extra ticks added to the one-period watchdog bound.
    #[serde(default)]
    pub additional_timeout_ticks: u32,
}

impl PwmInConfig {
    /// A section for `pin` with every other field at its default.
    #[must_use]
    pub fn new(pin: PinDesc) -> Self {
        Self {
            pin,
            read_interval: default_read_interval(),
            pwm_frequency: default_pwm_frequency(),
            additional_timeout_ticks: 0,
        }
    }

    /// Checks that the interval and frequency are positive.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::OutOfRange`] naming the first bad field.
    pub fn validate(&self) -> Result<()> {
        ensure_positive(self.read_interval, "read_interval")?;
        ensure_positive(self.pwm_frequency, "pwm_frequency")
    }
}

// ============================================================================
// CounterConfig
// ============================================================================

const fn default_sample_time() -> f64 {
    0.1
}

const fn default_poll_time() -> f64 {
    0.0015
}

/// Settings for a [`FrequencyCounter`](crate::pulse_counter::FrequencyCounter).
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct CounterConfig {
    /// Input pin description.
    pub pin: PinDesc,
    /// Seconds between count reports.
    #[serde(default = "default_sample_time")]
    pub sample_time: f64,
    /// Seconds between pin polls on the microcontroller.
    #[serde(default = "default_poll_time")]
    pub poll_time: f64,
}

impl CounterConfig {
    /// A section for `pin` with every other field at its default.
    #[must_use]
    pub fn new(pin: PinDesc) -> Self {
        Self {
            pin,
            sample_time: default_sample_time(),
            poll_time: default_poll_time(),
        }
    }

    /// Checks that both times are positive.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::OutOfRange`] naming the first bad field.
    pub fn validate(&self) -> Result<()> {
        ensure_positive(self.sample_time, "sample_time")?;
        ensure_positive(self.poll_time, "poll_time")
    }
}

// ============================================================================
// FeedScalerConfig
// ============================================================================

const fn default_target_duty_cycle() -> f64 {
    0.75
}

const fn default_min_feedrate() -> f64 {
    0.1
}

const fn default_max_feedrate() -> f64 {
    64.0
}

const fn default_adjustment_accel() -> f64 {
    500.0
}

const fn default_kp() -> f64 {
    1.0
}

/// Settings for a [`FeedScaler`](crate::feed_scaling::FeedScaler).
#[derive(Clone, Copy, Debug, Deserialize, PartialEq)]
pub struct FeedScalerConfig {
    /// Duty cycle the controller steers toward, in `0.0..=1.0`.
    #[serde(default = "default_target_duty_cycle")]
    pub target_duty_cycle: f64,
    /// Feed rate at controller output 0, in mm/min.
    #[serde(default = "default_min_feedrate")]
    pub min_feedrate: f64,
    /// Feed rate at controller output 1, in mm/min.
    #[serde(default = "default_max_feedrate")]
    pub max_feedrate: f64,
    /// Acceleration applied with each speed change, in mm/s².
    #[serde(default = "default_adjustment_accel")]
    pub adjustment_accel: f64,
    /// Proportional gain.
    #[serde(default = "default_kp")]
    pub kp: f64,
    /// Integral gain.
    #[serde(default)]
    pub ki: f64,
    /// Derivative gain.
    #[serde(default)]
    pub kd: f64,
}

impl Default for FeedScalerConfig {
    fn default() -> Self {
        Self {
            target_duty_cycle: default_target_duty_cycle(),
            min_feedrate: default_min_feedrate(),
            max_feedrate: default_max_feedrate(),
            adjustment_accel: default_adjustment_accel(),
            kp: default_kp(),
            ki: 0.0,
            kd: 0.0,
        }
    }
}

impl FeedScalerConfig {
    /// Checks the target is a fraction, feed rates are not negative, and the
    /// acceleration is positive.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::OutOfRange`] naming the first bad field.
    pub fn validate(&self) -> Result<()> {
        ensure_fraction(self.target_duty_cycle, "target_duty_cycle")?;
        ensure_at_least_zero(self.min_feedrate, "min_feedrate")?;
        ensure_at_least_zero(self.max_feedrate, "max_feedrate")?;
        ensure_positive(self.adjustment_accel, "adjustment_accel")
    }
}
