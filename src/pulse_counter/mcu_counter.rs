//! One edge-counting channel on a microcontroller.

use portable_atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use static_cell::StaticCell;

use crate::callback::CallbackSlot;
use crate::config::ensure_positive;
use crate::mcu::{
    ConfigHook, Mcu, McuCommand, McuResponse, Oid, PinName, PinRequest, PinResolver,
    ResponseHandler, ResponseKind,
};
use crate::{Error, Result};

/// One `counter_state` report, extended to 64 bits and converted to seconds.
#[derive(Clone, Copy, Debug, PartialEq, defmt::Format)]
pub struct CounterSample {
    /// When the sample was taken: the next poll's clock minus one poll interval.
    pub time: f64,
    /// Edges counted since the channel started.
    pub count: u64,
    /// When the most recent edge was seen.
    pub count_time: f64,
}

/// Static resources for [`McuCounter`].
pub struct McuCounterStatic {
    cell: StaticCell<McuCounterShared>,
}

impl McuCounterStatic {
    #[must_use]
    pub(crate) const fn new() -> Self {
        Self {
            cell: StaticCell::new(),
        }
    }
}

struct McuCounterShared {
    mcu: &'static dyn Mcu,
    oid: Oid,
    pin: PinName,
    pull_up: bool,
    sample_time: f64,
    poll_time: f64,
    poll_ticks: AtomicU32,
    last_count: AtomicU64,
    configured: AtomicBool,
    callback: CallbackSlot<CounterSample>,
}

/// A microcontroller channel that counts edges on a pin.
///
/// The controller polls the pin every `poll_time` seconds and reports its 32-bit
/// running count every `sample_time` seconds. `McuCounter` extends counts and
/// clocks to 64 bits, so wraps of the controller's counters are invisible to
/// subscribers.
pub struct McuCounter {
    shared: &'static McuCounterShared,
}

impl McuCounter {
    /// Create [`McuCounter`] resources.
    #[must_use]
    pub const fn new_static() -> McuCounterStatic {
        McuCounterStatic::new()
    }

    /// Creates a counter on the controller that owns `pin`.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if either time is not positive or the pin cannot be
    ///   resolved with a pull-up available.
    /// - [`Error::McuAlreadyConfigured`], [`Error::StaticInUse`], or
    ///   [`Error::OidExhausted`] as for
    ///   [`McuPwmIn::new`](crate::pwm_in::McuPwmIn::new).
    pub fn new(
        mcu_counter_static: &'static McuCounterStatic,
        pins: &mut impl PinResolver,
        pin: &str,
        sample_time: f64,
        poll_time: f64,
    ) -> Result<Self> {
        ensure_positive(sample_time, "sample_time")?;
        ensure_positive(poll_time, "poll_time")?;

        let pin_params = pins.resolve_pin(pin, PinRequest::PULLUP_INPUT)?;
        let mcu = pin_params.chip;
        if mcu.is_configured() {
            return Err(Error::McuAlreadyConfigured);
        }
        let slot = mcu_counter_static.cell.try_uninit().ok_or(Error::StaticInUse)?;
        let oid = mcu.create_oid()?;

        let shared: &'static McuCounterShared = slot.write(McuCounterShared {
            mcu,
            oid,
            pin: pin_params.pin.clone(),
            pull_up: pin_params.pull_up,
            sample_time,
            poll_time,
            poll_ticks: AtomicU32::new(0),
            last_count: AtomicU64::new(0),
            configured: AtomicBool::new(false),
            callback: CallbackSlot::new(),
        });
        mcu.register_config_callback(shared)?;
        pins.claim_pin(&pin_params);

        log_info!(
            "McuCounter: oid {} on {}:{} every {}s",
            oid,
            mcu.name(),
            shared.pin.as_str(),
            sample_time
        );
        Ok(Self { shared })
    }

    /// Installs the callback run on every report, replacing any previous one.
    pub fn set_callback(&self, callback: impl FnMut(CounterSample) + Send + 'static) {
        self.shared.callback.set(callback);
    }

    /// Edges counted so far.
    #[must_use]
    pub fn count(&self) -> u64 {
        self.shared.last_count.load(Ordering::Acquire)
    }

    /// This channel's object id.
    #[must_use]
    pub fn oid(&self) -> Oid {
        self.shared.oid
    }

    /// The controller pin being counted.
    #[must_use]
    pub fn pin(&self) -> &str {
        self.shared.pin.as_str()
    }

    /// Whether the configuration hook has run.
    #[must_use]
    pub fn is_configured(&self) -> bool {
        self.shared.configured.load(Ordering::Acquire)
    }
}

impl McuCounterShared {
    fn record(&self, next_clock: u32, count: u32, count_clock: u32) -> CounterSample {
        let poll_ticks = u64::from(self.poll_ticks.load(Ordering::Acquire));
        let next_clock = self.mcu.clock32_to_clock64(next_clock);
        let time = self
            .mcu
            .clock_to_seconds(next_clock.saturating_sub(poll_ticks));
        let count_time = self
            .mcu
            .clock_to_seconds(self.mcu.clock32_to_clock64(count_clock));

        // The controller's count is 32 bits; extend it across wraps.
        let last_count = self.last_count.load(Ordering::Acquire);
        #[expect(
            clippy::cast_possible_truncation,
            reason = "only the low 32 bits are compared with the controller's count"
        )]
        let delta_count = count.wrapping_sub(last_count as u32);
        let count = last_count.wrapping_add(u64::from(delta_count));
        self.last_count.store(count, Ordering::Release);

        let sample = CounterSample {
            time,
            count,
            count_time,
        };
        log_trace!("McuCounter: oid {} count {} at {}", self.oid, count, count_time);
        self.callback.call(sample);
        sample
    }
}

impl ConfigHook for McuCounterShared {
    fn build_config(&'static self) -> Result<()> {
        if self.configured.swap(true, Ordering::AcqRel) {
            return Err(Error::AlreadyConfigured { oid: self.oid });
        }
        self.mcu.add_config_cmd(
            McuCommand::ConfigCounter {
                oid: self.oid,
                pin: self.pin.clone(),
                pull_up: self.pull_up,
            },
            false,
        )?;
        let clock = self.mcu.get_query_slot(self.oid);
        let poll_ticks = self.mcu.seconds_to_clock(self.poll_time);
        self.poll_ticks.store(poll_ticks, Ordering::Release);
        let sample_ticks = self.mcu.seconds_to_clock(self.sample_time);
        self.mcu.add_config_cmd(
            McuCommand::QueryCounter {
                oid: self.oid,
                clock,
                poll_ticks,
                sample_ticks,
            },
            true,
        )?;
        self.mcu
            .register_response(self, ResponseKind::CounterState, self.oid)
    }
}

impl ResponseHandler for McuCounterShared {
    fn handle_response(&self, response: &McuResponse) {
        match *response {
            McuResponse::CounterState {
                next_clock,
                count,
                count_clock,
                ..
            } => {
                self.record(next_clock, count, count_clock);
            }
            McuResponse::PwmInState { .. } => {
                log_warn!("McuCounter: oid {} ignoring {}", self.oid, response.kind());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcu::{McuLink, Pins};

    #[test]
    fn count_extends_across_32_bit_wrap() {
        static MCU: McuLink = McuLink::new("mcu", 1_000_000.0);
        static COUNTER_STATIC: McuCounterStatic = McuCounter::new_static();

        let mut pins = Pins::<1>::new();
        pins.register_chip(&MCU, true).expect("room for chip");
        let counter = McuCounter::new(&COUNTER_STATIC, &mut pins, "PA3", 0.1, 0.001)
            .expect("valid counter");

        counter.shared.record(0, 0xFFFF_FFF0, 0);
        assert_eq!(counter.count(), 0xFFFF_FFF0);
        counter.shared.record(0, 0x0000_0005, 0);
        assert_eq!(counter.count(), 0x1_0000_0005);
    }

    #[test]
    fn sample_time_is_one_poll_before_next_clock() {
        static MCU: McuLink = McuLink::new("mcu", 1_000_000.0);
        static COUNTER_STATIC: McuCounterStatic = McuCounter::new_static();

        let mut pins = Pins::<1>::new();
        pins.register_chip(&MCU, true).expect("room for chip");
        let counter = McuCounter::new(&COUNTER_STATIC, &mut pins, "PA3", 0.1, 0.001)
            .expect("valid counter");
        MCU.build_config().expect("configures");

        let sample = counter.shared.record(2_001_000, 10, 1_900_000);
        assert!((sample.time - 2.0).abs() < 1e-5);
        assert!((sample.count_time - 1.9).abs() < 1e-5);
        assert_eq!(sample.count, 10);
    }
}
