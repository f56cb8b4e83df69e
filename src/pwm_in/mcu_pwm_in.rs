//! One pulse-width sampling channel on a microcontroller.
//!
//! See [`McuPwmIn`].

use portable_atomic::{AtomicBool, AtomicF64, Ordering};
use static_cell::StaticCell;

use crate::callback::CallbackSlot;
use crate::config::ensure_positive;
use crate::mcu::{
    ConfigHook, Mcu, McuCommand, McuResponse, Oid, PinName, PinRequest, PinResolver,
    ResponseHandler, ResponseKind,
};
use crate::{Error, Result};

/// Static resources for [`McuPwmIn`].
pub struct McuPwmInStatic {
    cell: StaticCell<McuPwmInShared>,
}

impl McuPwmInStatic {
    #[must_use]
    pub(crate) const fn new() -> Self {
        Self {
            cell: StaticCell::new(),
        }
    }
}

/// State shared between the channel handle and the controller's dispatch path.
struct McuPwmInShared {
    mcu: &'static dyn Mcu,
    oid: Oid,
    pin: PinName,
    pull_up: bool,
    interval: f64,
    timeout: f64,
    additional_timeout_ticks: u32,
    pwm_frequency: f64,
    configured: AtomicBool,
    duty_cycle: AtomicF64,
    callback: CallbackSlot<f64>,
}

/// A microcontroller channel that measures how long a pin stays high.
///
/// Every `interval` seconds the controller waits for the pin to go low, then high,
/// then low again, and reports the high time in ticks. If that takes longer than
/// the watchdog bound (`timeout` plus `additional_timeout_ticks`) it reports
/// anyway, so a signal stuck low still yields a 0% reading.
///
/// Each report becomes `duty_cycle = ticks_to_seconds(high_ticks) * pwm_frequency`.
/// The value is not clamped: a misconfigured frequency or a noisy signal can push
/// it outside `0.0..=1.0`, and that is passed through for diagnosis.
///
/// Most callers want the [`PwmIn`](super::PwmIn) facade, which derives the
/// timeout from the frequency.
pub struct McuPwmIn {
    shared: &'static McuPwmInShared,
}

impl McuPwmIn {
    /// Create [`McuPwmIn`] resources.
    #[must_use]
    pub const fn new_static() -> McuPwmInStatic {
        McuPwmInStatic::new()
    }

    /// Creates a channel on the controller that owns `pin`.
    ///
    /// Nothing is sent yet; the channel registers a hook that queues its commands
    /// when the controller is configured.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if `interval`, `timeout`, or `pwm_frequency` is not
    ///   positive, or the pin cannot be resolved with a pull-up available.
    /// - [`Error::McuAlreadyConfigured`] if the controller was already configured.
    /// - [`Error::StaticInUse`] if `mcu_pwm_in_static` was already handed to a
    ///   constructor.
    /// - [`Error::OidExhausted`] if the controller has no ids left.
    ///
    /// The pin is claimed only on success, so a failed call leaves it free.
    pub fn new(
        mcu_pwm_in_static: &'static McuPwmInStatic,
        pins: &mut impl PinResolver,
        pin: &str,
        interval: f64,
        timeout: f64,
        additional_timeout_ticks: u32,
        pwm_frequency: f64,
    ) -> Result<Self> {
        ensure_positive(interval, "interval")?;
        ensure_positive(timeout, "timeout")?;
        ensure_positive(pwm_frequency, "pwm_frequency")?;

        let pin_params = pins.resolve_pin(pin, PinRequest::PULLUP_INPUT)?;
        let mcu = pin_params.chip;
        if mcu.is_configured() {
            return Err(Error::McuAlreadyConfigured);
        }
        let slot = mcu_pwm_in_static.cell.try_uninit().ok_or(Error::StaticInUse)?;
        let oid = mcu.create_oid()?;

        let shared: &'static McuPwmInShared = slot.write(McuPwmInShared {
            mcu,
            oid,
            pin: pin_params.pin.clone(),
            pull_up: pin_params.pull_up,
            interval,
            timeout,
            additional_timeout_ticks,
            pwm_frequency,
            configured: AtomicBool::new(false),
            duty_cycle: AtomicF64::new(0.0),
            callback: CallbackSlot::new(),
        });
        mcu.register_config_callback(shared)?;
        pins.claim_pin(&pin_params);

        log_info!(
            "McuPwmIn: oid {} on {}:{} every {}s at {}Hz",
            oid,
            mcu.name(),
            shared.pin.as_str(),
            interval,
            pwm_frequency
        );
        Ok(Self { shared })
    }

    /// Installs the callback run on every report, replacing any previous one.
    pub fn set_callback(&self, callback: impl FnMut(f64) + Send + 'static) {
        self.shared.callback.set(callback);
    }

    /// The most recent duty cycle, or `0.0` before the first report.
    #[must_use]
    pub fn duty_cycle(&self) -> f64 {
        self.shared.duty_cycle.load(Ordering::Acquire)
    }

    /// This channel's object id.
    #[must_use]
    pub fn oid(&self) -> Oid {
        self.shared.oid
    }

    /// The controller pin being sampled.
    #[must_use]
    pub fn pin(&self) -> &str {
        self.shared.pin.as_str()
    }

    /// Whether the configuration hook has run.
    #[must_use]
    pub fn is_configured(&self) -> bool {
        self.shared.configured.load(Ordering::Acquire)
    }

    /// Ticks between samples.
    #[must_use]
    pub fn interval_ticks(&self) -> u32 {
        self.shared.interval_ticks()
    }

    /// Watchdog bound sent to the controller.
    #[must_use]
    pub fn max_task_ticks(&self) -> u32 {
        self.shared.max_task_ticks()
    }
}

impl McuPwmInShared {
    fn interval_ticks(&self) -> u32 {
        self.mcu.seconds_to_clock(self.interval)
    }

    fn max_task_ticks(&self) -> u32 {
        self.mcu
            .seconds_to_clock(self.timeout)
            .saturating_add(self.additional_timeout_ticks)
    }

    fn record(&self, high_ticks: u32) -> f64 {
        let pulse_width = self.mcu.ticks_to_seconds(high_ticks);
        let duty_cycle = pulse_width * self.pwm_frequency;
        log_trace!("McuPwmIn: oid {} high {} ticks, duty {}", self.oid, high_ticks, duty_cycle);
        self.duty_cycle.store(duty_cycle, Ordering::Release);
        self.callback.call(duty_cycle);
        duty_cycle
    }
}

impl ConfigHook for McuPwmInShared {
    fn build_config(&'static self) -> Result<()> {
        if self.configured.swap(true, Ordering::AcqRel) {
            return Err(Error::AlreadyConfigured { oid: self.oid });
        }
        self.mcu.add_config_cmd(
            McuCommand::ConfigPwmIn {
                oid: self.oid,
                pin: self.pin.clone(),
                pull_up: self.pull_up,
            },
            false,
        )?;
        let clock = self.mcu.get_query_slot(self.oid);
        self.mcu.add_config_cmd(
            McuCommand::QueryPwmIn {
                oid: self.oid,
                clock,
                interval: self.interval_ticks(),
                max_task_ticks: self.max_task_ticks(),
            },
            true,
        )?;
        self.mcu
            .register_response(self, ResponseKind::PwmInState, self.oid)
    }
}

impl ResponseHandler for McuPwmInShared {
    fn handle_response(&self, response: &McuResponse) {
        match *response {
            McuResponse::PwmInState { high_ticks, .. } => {
                self.record(high_ticks);
            }
            McuResponse::CounterState { .. } => {
                log_warn!("McuPwmIn: oid {} ignoring {}", self.oid, response.kind());
            }
        }
    }
}
