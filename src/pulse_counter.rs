//! A device abstraction for measuring pulse frequency with a microcontroller edge counter.
//!
//! See [`FrequencyCounter`] for usage.

mod mcu_counter;

use core::cell::RefCell;

use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use portable_atomic::{AtomicF64, Ordering};

pub use mcu_counter::{CounterSample, McuCounter, McuCounterStatic};

use crate::callback::CallbackSlot;
use crate::config::CounterConfig;
use crate::mcu::{Oid, PinResolver};
use crate::Result;

/// A frequency reading, delivered to [`FrequencyCounter`] subscribers.
#[derive(Clone, Copy, Debug, PartialEq, defmt::Format)]
pub struct FrequencySample {
    /// When the underlying count was sampled, in seconds.
    pub time: f64,
    /// Edges per second since the previous reading.
    pub frequency: f64,
}

/// Running state behind [`FrequencyCounter`].
#[derive(Clone, Copy, Debug, PartialEq)]
struct FrequencyState {
    last_time: Option<f64>,
    last_count: u64,
}

impl FrequencyState {
    const fn new() -> Self {
        Self {
            last_time: None,
            last_count: 0,
        }
    }

    /// Folds in one counter sample. The first sample only sets the reference time.
    fn update(&mut self, sample: CounterSample) -> Option<f64> {
        let Some(last_time) = self.last_time else {
            self.last_time = Some(sample.time);
            self.last_count = sample.count;
            return None;
        };
        let delta_time = sample.count_time - last_time;
        let frequency = if delta_time > 0.0 {
            self.last_time = Some(sample.count_time);
            let delta_count = sample.count.saturating_sub(self.last_count);
            #[expect(
                clippy::cast_precision_loss,
                reason = "edges per sample stay far below 2^53"
            )]
            let edges = delta_count as f64;
            edges / delta_time
        } else {
            // No edges since the last sample.
            self.last_time = Some(sample.time);
            0.0
        };
        self.last_count = sample.count;
        Some(frequency)
    }
}

/// Static resources for [`FrequencyCounter`].
pub struct FrequencyCounterStatic {
    mcu_counter_static: McuCounterStatic,
    state: Mutex<CriticalSectionRawMutex, RefCell<FrequencyState>>,
    frequency: AtomicF64,
    callback: CallbackSlot<FrequencySample>,
}

impl FrequencyCounterStatic {
    #[must_use]
    const fn new() -> Self {
        Self {
            mcu_counter_static: McuCounter::new_static(),
            state: Mutex::new(RefCell::new(FrequencyState::new())),
            frequency: AtomicF64::new(0.0),
            callback: CallbackSlot::new(),
        }
    }
}

/// Frequency of pulses on a pin, from a microcontroller edge counter.
///
/// Each report is compared with the previous one: frequency is the number of new
/// edges divided by the time between the most recent edges. A report with no new
/// edges reads as `0.0` Hz. The first report only sets a reference, so
/// subscribers hear from the second report on.
///
/// # Example
///
/// ```rust
/// use duty_envoy::mcu::{McuLink, McuResponse, Pins};
/// use duty_envoy::pulse_counter::{FrequencyCounter, FrequencyCounterStatic};
///
/// static MCU: McuLink = McuLink::new("mcu", 1_000_000.0);
/// static TACH_STATIC: FrequencyCounterStatic = FrequencyCounter::new_static();
///
/// # fn main() -> duty_envoy::Result<()> {
/// let mut pins = Pins::<1>::new();
/// pins.register_chip(&MCU, true)?;
///
/// let tach = FrequencyCounter::new(&TACH_STATIC, &mut pins, "^PA8", 0.1, 0.0015)?;
/// MCU.build_config()?;
///
/// let oid = tach.oid();
/// // Polled every 1.5 ms, so this first report is stamped at 1.0 s.
/// MCU.dispatch(&McuResponse::CounterState { oid, next_clock: 1_001_500, count: 0, count_clock: 950_000 })?;
/// assert_eq!(tach.frequency(), 0.0);
///
/// // 50 edges, the last at 1.1 s.
/// MCU.dispatch(&McuResponse::CounterState { oid, next_clock: 1_101_500, count: 50, count_clock: 1_100_000 })?;
/// assert!((tach.frequency() - 500.0).abs() < 1e-3);
/// # Ok(())
/// # }
/// ```
pub struct FrequencyCounter {
    mcu_counter: McuCounter,
    frequency: &'static AtomicF64,
    callback: &'static CallbackSlot<FrequencySample>,
}

impl FrequencyCounter {
    /// Create [`FrequencyCounter`] resources.
    #[must_use]
    pub const fn new_static() -> FrequencyCounterStatic {
        FrequencyCounterStatic::new()
    }

    /// Creates a frequency counter on `pin`, reporting every `sample_time`
    /// seconds and polling every `poll_time` seconds.
    ///
    /// # Errors
    ///
    /// See [`McuCounter::new`].
    pub fn new(
        frequency_counter_static: &'static FrequencyCounterStatic,
        pins: &mut impl PinResolver,
        pin: &str,
        sample_time: f64,
        poll_time: f64,
    ) -> Result<Self> {
        let mcu_counter = McuCounter::new(
            &frequency_counter_static.mcu_counter_static,
            pins,
            pin,
            sample_time,
            poll_time,
        )?;

        let state = &frequency_counter_static.state;
        let frequency = &frequency_counter_static.frequency;
        let callback = &frequency_counter_static.callback;
        mcu_counter.set_callback(move |sample| {
            let Some(value) = state.lock(|state| state.borrow_mut().update(sample)) else {
                return;
            };
            frequency.store(value, Ordering::Release);
            callback.call(FrequencySample {
                time: sample.time,
                frequency: value,
            });
        });

        Ok(Self {
            mcu_counter,
            frequency,
            callback,
        })
    }

    /// Creates a frequency counter from a configuration section.
    ///
    /// # Errors
    ///
    /// Returns an error if the section fails [`CounterConfig::validate`], or as
    /// [`new`](Self::new).
    pub fn from_config(
        frequency_counter_static: &'static FrequencyCounterStatic,
        pins: &mut impl PinResolver,
        config: &CounterConfig,
    ) -> Result<Self> {
        config.validate()?;
        Self::new(
            frequency_counter_static,
            pins,
            config.pin.as_str(),
            config.sample_time,
            config.poll_time,
        )
    }

    /// The most recent frequency in Hz, or `0.0` before the second report.
    #[must_use]
    pub fn frequency(&self) -> f64 {
        self.frequency.load(Ordering::Acquire)
    }

    /// Installs the subscriber run on every new frequency, replacing any previous one.
    pub fn set_callback(&self, callback: impl FnMut(FrequencySample) + Send + 'static) {
        self.callback.set(callback);
    }

    /// Object id of the underlying counter.
    #[must_use]
    pub fn oid(&self) -> Oid {
        self.mcu_counter.oid()
    }

    /// The underlying microcontroller counter.
    #[must_use]
    pub const fn mcu_counter(&self) -> &McuCounter {
        &self.mcu_counter
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(time: f64, count: u64, count_time: f64) -> CounterSample {
        CounterSample {
            time,
            count,
            count_time,
        }
    }

    #[test]
    fn first_sample_only_sets_reference() {
        let mut state = FrequencyState::new();
        assert_eq!(state.update(sample(1.0, 5, 0.9)), None);
        assert_eq!(state.last_time, Some(1.0));
        assert_eq!(state.last_count, 5);
    }

    #[test]
    fn frequency_is_new_edges_over_edge_interval() {
        let mut state = FrequencyState::new();
        state.update(sample(1.0, 0, 0.95));
        let frequency = state.update(sample(1.1, 20, 1.05)).expect("second sample");
        // 20 edges between t=1.0 and the latest edge at t=1.05.
        assert!((frequency - 400.0).abs() < 1e-6);
        assert_eq!(state.last_time, Some(1.05));
    }

    #[test]
    fn no_new_edges_reads_zero_and_resets_reference() {
        let mut state = FrequencyState::new();
        state.update(sample(1.0, 20, 0.95));
        let frequency = state.update(sample(1.1, 20, 0.95)).expect("second sample");
        assert!(frequency.abs() < f64::EPSILON);
        assert_eq!(state.last_time, Some(1.1));
    }
}
