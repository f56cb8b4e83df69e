//! A device abstraction for reading the duty cycle of a PWM signal.
//!
//! See [`PwmIn`] for usage.

mod mcu_pwm_in;

use portable_atomic::{AtomicF64, Ordering};

pub use mcu_pwm_in::{McuPwmIn, McuPwmInStatic};

use crate::callback::CallbackSlot;
use crate::config::{PwmInConfig, ensure_positive};
use crate::mcu::{Oid, PinResolver};
use crate::Result;

/// Static resources for [`PwmIn`].
pub struct PwmInStatic {
    mcu_pwm_in_static: McuPwmInStatic,
    duty_cycle: AtomicF64,
    callback: CallbackSlot<f64>,
}

impl PwmInStatic {
    #[must_use]
    const fn new() -> Self {
        Self {
            mcu_pwm_in_static: McuPwmIn::new_static(),
            duty_cycle: AtomicF64::new(0.0),
            callback: CallbackSlot::new(),
        }
    }
}

/// Duty cycle of a PWM signal, measured by a microcontroller.
///
/// `PwmIn` takes the signal's nominal frequency and how often to read it, and
/// hides object ids, ticks, and commands. The microcontroller is given one period
/// (`1 / pwm_frequency`) plus `additional_timeout_ticks` to observe a full pulse
/// before it must report; a signal that never pulses reads as `0.0`.
///
/// [`duty_cycle`](Self::duty_cycle) returns the latest reading and never blocks.
/// [`set_callback`](Self::set_callback) installs a single subscriber that runs on
/// every new reading.
///
/// # Example
///
/// ```rust
/// use duty_envoy::mcu::{McuLink, McuResponse, Pins};
/// use duty_envoy::pwm_in::{PwmIn, PwmInStatic};
///
/// static MCU: McuLink = McuLink::new("mcu", 1_000_000.0);
/// static FAN_TACH_STATIC: PwmInStatic = PwmIn::new_static();
///
/// # fn main() -> duty_envoy::Result<()> {
/// let mut pins = Pins::<1>::new();
/// pins.register_chip(&MCU, true)?;
///
/// // Read a 100 Hz signal every 100 ms.
/// let fan_tach = PwmIn::new(&FAN_TACH_STATIC, &mut pins, "^PB4", 0.1, 100.0, 0)?;
/// assert_eq!(fan_tach.duty_cycle(), 0.0);
///
/// fan_tach.set_callback(|duty_cycle| {
///     assert_eq!(duty_cycle, 0.25);
/// });
///
/// MCU.build_config()?;
/// MCU.dispatch(&McuResponse::PwmInState {
///     oid: fan_tach.oid(),
///     high_ticks: 2_500,
/// })?;
/// assert_eq!(fan_tach.duty_cycle(), 0.25);
/// # Ok(())
/// # }
/// ```
pub struct PwmIn {
    mcu_pwm_in: McuPwmIn,
    duty_cycle: &'static AtomicF64,
    callback: &'static CallbackSlot<f64>,
    timeout: f64,
}

impl PwmIn {
    /// Create [`PwmIn`] resources.
    #[must_use]
    pub const fn new_static() -> PwmInStatic {
        PwmInStatic::new()
    }

    /// Creates a duty-cycle reader on `pin`.
    ///
    /// `read_interval` is in seconds, `pwm_frequency` in Hz.
    ///
    /// See the [PwmIn struct example](Self) for usage.
    ///
    /// # Errors
    ///
    /// See [`McuPwmIn::new`]. A non-positive `pwm_frequency` is rejected before
    /// the timeout is derived from it.
    pub fn new(
        pwm_in_static: &'static PwmInStatic,
        pins: &mut impl PinResolver,
        pin: &str,
        read_interval: f64,
        pwm_frequency: f64,
        additional_timeout_ticks: u32,
    ) -> Result<Self> {
        ensure_positive(pwm_frequency, "pwm_frequency")?;
        let timeout = 1.0 / pwm_frequency;
        let mcu_pwm_in = McuPwmIn::new(
            &pwm_in_static.mcu_pwm_in_static,
            pins,
            pin,
            read_interval,
            timeout,
            additional_timeout_ticks,
            pwm_frequency,
        )?;

        let duty_cycle = &pwm_in_static.duty_cycle;
        let callback = &pwm_in_static.callback;
        mcu_pwm_in.set_callback(move |value| {
            duty_cycle.store(value, Ordering::Release);
            callback.call(value);
        });

        Ok(Self {
            mcu_pwm_in,
            duty_cycle,
            callback,
            timeout,
        })
    }

    /// Creates a duty-cycle reader from a configuration section.
    ///
    /// # Errors
    ///
    /// Returns an error if the section fails [`PwmInConfig::validate`], or as
    /// [`new`](Self::new).
    pub fn from_config(
        pwm_in_static: &'static PwmInStatic,
        pins: &mut impl PinResolver,
        config: &PwmInConfig,
    ) -> Result<Self> {
        config.validate()?;
        Self::new(
            pwm_in_static,
            pins,
            config.pin.as_str(),
            config.read_interval,
            config.pwm_frequency,
            config.additional_timeout_ticks,
        )
    }

    /// The most recent duty cycle, or `0.0` before the first reading.
    ///
    /// Not clamped to `0.0..=1.0`.
    #[must_use]
    pub fn duty_cycle(&self) -> f64 {
        self.duty_cycle.load(Ordering::Acquire)
    }

    /// Installs the subscriber run on every reading, replacing any previous one.
    ///
    /// It runs synchronously on the controller's dispatch path and must not block.
    pub fn set_callback(&self, callback: impl FnMut(f64) + Send + 'static) {
        self.callback.set(callback);
    }

    /// Watchdog timeout in seconds: one period at the nominal frequency.
    #[must_use]
    pub const fn timeout(&self) -> f64 {
        self.timeout
    }

    /// Object id of the underlying channel.
    #[must_use]
    pub fn oid(&self) -> Oid {
        self.mcu_pwm_in.oid()
    }

    /// The underlying microcontroller channel.
    #[must_use]
    pub const fn mcu_pwm_in(&self) -> &McuPwmIn {
        &self.mcu_pwm_in
    }
}
