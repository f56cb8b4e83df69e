//! Feed-rate scaling from a measured duty cycle.
//!
//! A spindle or cutter driven near its power limit reports its load as a PWM duty
//! cycle. [`FeedScaler`] steers that duty cycle toward a target by slowing or
//! speeding up the feed: a [`Pid`] maps the measured duty cycle to an output in
//! `0.0..=1.0`, which is scaled linearly between the configured feed rates.

use crate::config::FeedScalerConfig;
use crate::Result;

/// Stand-in time step for the first update, when there is no previous sample.
const FIRST_UPDATE_DT: f64 = 1e-16;

const OUTPUT_MIN: f64 = 0.0;
const OUTPUT_MAX: f64 = 1.0;

/// A PID controller with output and integral clamped to `0.0..=1.0`.
///
/// The derivative acts on the measurement, not the error, so moving the setpoint
/// does not kick the output.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Pid {
    kp: f64,
    ki: f64,
    kd: f64,
    setpoint: f64,
    integral: f64,
    last_input: Option<f64>,
    last_time: Option<f64>,
    last_output: Option<f64>,
}

impl Pid {
    /// A controller with the given gains, steering toward `setpoint`.
    #[must_use]
    pub const fn new(kp: f64, ki: f64, kd: f64, setpoint: f64) -> Self {
        Self {
            kp,
            ki,
            kd,
            setpoint,
            integral: 0.0,
            last_input: None,
            last_time: None,
            last_output: None,
        }
    }

    /// The value the controller steers toward.
    #[must_use]
    pub const fn setpoint(&self) -> f64 {
        self.setpoint
    }

    /// The output of the most recent [`update`](Self::update), if any since the last reset.
    #[must_use]
    pub const fn last_output(&self) -> Option<f64> {
        self.last_output
    }

    /// Feeds in a measurement taken at `now` (seconds) and returns the new output.
    pub fn update(&mut self, input: f64, now: f64) -> f64 {
        let dt = match self.last_time {
            Some(last_time) if now > last_time => now - last_time,
            _ => FIRST_UPDATE_DT,
        };
        let error = self.setpoint - input;
        let delta_input = input - self.last_input.unwrap_or(input);

        let proportional = self.kp * error;
        self.integral = (self.integral + self.ki * error * dt).clamp(OUTPUT_MIN, OUTPUT_MAX);
        let derivative = -self.kd * delta_input / dt;

        let output = (proportional + self.integral + derivative).clamp(OUTPUT_MIN, OUTPUT_MAX);
        self.last_input = Some(input);
        self.last_time = Some(now);
        self.last_output = Some(output);
        output
    }

    /// Clears the integral and the sample history.
    pub fn reset(&mut self) {
        self.integral = 0.0;
        self.last_input = None;
        self.last_time = None;
        self.last_output = None;
    }
}

/// A speed change for the motion planner.
#[derive(Clone, Copy, Debug, PartialEq, defmt::Format)]
pub struct SpeedAdjustment {
    /// Requested speed in mm/s.
    pub speed: f64,
    /// Acceleration to reach it, in mm/s².
    pub accel: f64,
}

/// Turns duty-cycle readings into feed-rate adjustments.
///
/// Enabled on creation. Re-enabling resets the controller, so stale integral or
/// derivative history from before a pause does not leak into the first move.
///
/// # Example
///
/// ```rust
/// use duty_envoy::config::FeedScalerConfig;
/// use duty_envoy::feed_scaling::FeedScaler;
///
/// # fn main() -> duty_envoy::Result<()> {
/// let mut feed_scaler = FeedScaler::new(FeedScalerConfig {
///     min_feedrate: 0.0,
///     max_feedrate: 600.0,
///     ..FeedScalerConfig::default()
/// })?;
///
/// // At 25% duty, 50 points under the 75% target: output 0.5, so 300 mm/min.
/// let adjustment = feed_scaler.scale(0.25, 0.0).expect("enabled");
/// assert!((adjustment.speed - 5.0).abs() < 1e-9);
///
/// feed_scaler.disable();
/// assert_eq!(feed_scaler.scale(0.25, 0.1), None);
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct FeedScaler {
    config: FeedScalerConfig,
    pid: Pid,
    enabled: bool,
}

impl FeedScaler {
    /// Creates an enabled scaler.
    ///
    /// # Errors
    ///
    /// Returns an error if `config` fails [`FeedScalerConfig::validate`].
    pub fn new(config: FeedScalerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            pid: Pid::new(config.kp, config.ki, config.kd, config.target_duty_cycle),
            config,
            enabled: true,
        })
    }

    /// Resumes scaling with a fresh controller.
    pub fn enable(&mut self) {
        self.pid.reset();
        self.enabled = true;
        log_info!("FeedScaler: enabled");
    }

    /// Stops scaling; [`scale`](Self::scale) returns `None` until re-enabled.
    pub fn disable(&mut self) {
        self.enabled = false;
        log_info!("FeedScaler: disabled");
    }

    /// Whether [`scale`](Self::scale) is producing adjustments.
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// The settings this scaler was built with.
    #[must_use]
    pub const fn config(&self) -> &FeedScalerConfig {
        &self.config
    }

    /// The speed to use for the next move, given the latest duty cycle.
    pub fn scale(&mut self, duty_cycle: f64, now: f64) -> Option<SpeedAdjustment> {
        if !self.enabled {
            return None;
        }
        let output = self.pid.update(duty_cycle, now);
        let feedrate =
            self.config.min_feedrate + output * (self.config.max_feedrate - self.config.min_feedrate);
        log_info!(
            "FeedScaler: duty cycle {}, output {}, feedrate {} mm/min",
            duty_cycle,
            output,
            feedrate
        );
        Some(SpeedAdjustment {
            speed: feedrate / 60.0,
            accel: self.config.adjustment_accel,
        })
    }
}
