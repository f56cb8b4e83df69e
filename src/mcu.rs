//! The host's view of a microcontroller.
//!
//! Channels never talk to hardware directly. They ask an [`Mcu`] for an object id,
//! queue configuration commands, convert between seconds and clock ticks, and
//! register to receive the controller's periodic responses. [`McuLink`] is the
//! in-process implementation; [`Pins`] resolves pin descriptions to a controller.
//!
//! # Example
//!
//! ```rust
//! use duty_envoy::mcu::{McuLink, McuResponse, Pins};
//! use duty_envoy::pwm_in::{PwmIn, PwmInStatic};
//!
//! static MCU: McuLink = McuLink::new("mcu", 1_000_000.0);
//! static FAN_STATIC: PwmInStatic = PwmIn::new_static();
//!
//! # fn main() -> duty_envoy::Result<()> {
//! let mut pins = Pins::<1>::new();
//! pins.register_chip(&MCU, true)?;
//!
//! let fan = PwmIn::new(&FAN_STATIC, &mut pins, "^PA1", 0.1, 25.0, 0)?;
//! MCU.build_config()?;
//!
//! // A report from the microcontroller: 20 ms high at 25 Hz is 50% duty.
//! MCU.dispatch(&McuResponse::PwmInState { oid: fan.oid(), high_ticks: 20_000 })?;
//! assert!((fan.duty_cycle() - 0.5).abs() < 1e-6);
//! # Ok(())
//! # }
//! ```

mod link;
mod pins;

use portable_atomic::{AtomicBool, AtomicU8, Ordering};

pub use link::McuLink;
pub use pins::{PinParams, PinRequest, PinResolver, Pins};

use crate::{Error, Result};

/// Longest pin name (after the chip prefix) a controller accepts.
pub const PIN_NAME_LEN: usize = 16;

/// A controller pin name, such as `PA1` or `gpio7`.
pub type PinName = heapless::String<PIN_NAME_LEN>;

// ============================================================================
// Oid - object ids
// ============================================================================

/// Object id of one channel on one controller.
#[derive(
    Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, derive_more::Display, defmt::Format,
)]
pub struct Oid(u8);

impl Oid {
    /// Wraps a raw object id.
    #[must_use]
    pub const fn new(index: u8) -> Self {
        Self(index)
    }

    /// The raw object id.
    #[must_use]
    pub const fn index(self) -> u8 {
        self.0
    }
}

/// Hands out object ids for one controller, in order, each exactly once.
pub struct OidAllocator {
    next: AtomicU8,
    exhausted: AtomicBool,
}

impl OidAllocator {
    /// Creates an allocator starting at oid 0.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            next: AtomicU8::new(0),
            exhausted: AtomicBool::new(false),
        }
    }

    /// Allocates the next free oid.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OidExhausted`] once all 256 ids are in use.
    pub fn allocate(&self) -> Result<Oid> {
        if self.exhausted.load(Ordering::Acquire) {
            return Err(Error::OidExhausted);
        }
        let index = self.next.fetch_add(1, Ordering::AcqRel);
        if index == u8::MAX {
            self.exhausted.store(true, Ordering::Release);
        }
        Ok(Oid(index))
    }
}

impl Default for OidAllocator {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Protocol values
// ============================================================================

/// A command queued for the controller during its configuration phase.
#[derive(Clone, Debug, Eq, PartialEq, defmt::Format)]
pub enum McuCommand {
    /// Declares a pulse-width input channel on `pin`.
    ConfigPwmIn {
        /// Channel id.
        oid: Oid,
        /// Controller pin.
        pin: PinName,
        /// Enable the pin's pull-up.
        pull_up: bool,
    },
    /// Starts periodic high-time sampling on a pulse-width input.
    QueryPwmIn {
        /// Channel id.
        oid: Oid,
        /// Clock of the first sample (the channel's query slot).
        clock: u32,
        /// Ticks between samples.
        interval: u32,
        /// Watchdog bound: ticks one sample may take before reporting anyway.
        max_task_ticks: u32,
    },
    /// Declares an edge counter on `pin`.
    ConfigCounter {
        /// Channel id.
        oid: Oid,
        /// Controller pin.
        pin: PinName,
        /// Enable the pin's pull-up.
        pull_up: bool,
    },
    /// Starts polling and periodic reporting on an edge counter.
    QueryCounter {
        /// Channel id.
        oid: Oid,
        /// Clock of the first report (the channel's query slot).
        clock: u32,
        /// Ticks between pin polls.
        poll_ticks: u32,
        /// Ticks between reports.
        sample_ticks: u32,
    },
}

impl McuCommand {
    /// The channel this command addresses.
    #[must_use]
    pub const fn oid(&self) -> Oid {
        match self {
            Self::ConfigPwmIn { oid, .. }
            | Self::QueryPwmIn { oid, .. }
            | Self::ConfigCounter { oid, .. }
            | Self::QueryCounter { oid, .. } => *oid,
        }
    }
}

/// Kinds of periodic responses a channel can subscribe to.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, derive_more::Display, defmt::Format)]
pub enum ResponseKind {
    /// `pwm_in_state`: one high-time measurement.
    #[display("pwm_in_state")]
    PwmInState,
    /// `counter_state`: edge count snapshot.
    #[display("counter_state")]
    CounterState,
}

/// A decoded response from the controller.
#[derive(Clone, Copy, Debug, Eq, PartialEq, defmt::Format)]
pub enum McuResponse {
    /// Ticks the pin was high within one sampling window.
    ///
    /// Zero when the watchdog bound expired after seeing the pin low.
    PwmInState {
        /// Channel id.
        oid: Oid,
        /// Measured high time in ticks.
        high_ticks: u32,
    },
    /// Edge count snapshot.
    CounterState {
        /// Channel id.
        oid: Oid,
        /// Clock of the next scheduled poll (low 32 bits).
        next_clock: u32,
        /// Running edge count (low 32 bits).
        count: u32,
        /// Clock of the most recent edge (low 32 bits).
        count_clock: u32,
    },
}

impl McuResponse {
    /// Which handler table this response routes through.
    #[must_use]
    pub const fn kind(&self) -> ResponseKind {
        match self {
            Self::PwmInState { .. } => ResponseKind::PwmInState,
            Self::CounterState { .. } => ResponseKind::CounterState,
        }
    }

    /// The channel this response belongs to.
    #[must_use]
    pub const fn oid(&self) -> Oid {
        match self {
            Self::PwmInState { oid, .. } | Self::CounterState { oid, .. } => *oid,
        }
    }
}

// ============================================================================
// Collaborator traits
// ============================================================================

/// Runs once, during the controller's configuration phase.
pub trait ConfigHook: Sync {
    /// Queue this channel's configuration commands and register its handlers.
    ///
    /// # Errors
    ///
    /// Returns an error if the hook already ran or the controller rejects a
    /// command or registration.
    fn build_config(&'static self) -> Result<()>;
}

/// Receives the responses registered for it.
///
/// Called synchronously on the dispatch path; must not block.
pub trait ResponseHandler: Sync {
    /// Handle one response.
    fn handle_response(&self, response: &McuResponse);
}

/// Everything a channel needs from the controller it lives on.
pub trait Mcu: Sync {
    /// Chip name used in pin descriptions (`chip:pin`).
    fn name(&self) -> &str;

    /// Allocate a fresh object id.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OidExhausted`] when no ids remain.
    fn create_oid(&self) -> Result<Oid>;

    /// Convert seconds to clock ticks, truncating.
    fn seconds_to_clock(&self, seconds: f64) -> u32;

    /// Convert a tick count to seconds.
    fn ticks_to_seconds(&self, ticks: u32) -> f64;

    /// Extend a 32-bit clock value to the full 64-bit controller clock.
    fn clock32_to_clock64(&self, clock32: u32) -> u64;

    /// Convert an absolute 64-bit clock to seconds since the clock started.
    fn clock_to_seconds(&self, clock: u64) -> f64;

    /// Start clock for the periodic query owned by `oid`.
    fn get_query_slot(&self, oid: Oid) -> u32;

    /// Queue a configuration command. `is_init` commands run once at start-up.
    ///
    /// # Errors
    ///
    /// Returns an error if the controller no longer accepts commands.
    fn add_config_cmd(&self, command: McuCommand, is_init: bool) -> Result<()>;

    /// Whether the configuration phase has started. Hooks are no longer accepted
    /// once it has.
    fn is_configured(&self) -> bool;

    /// Register a hook to run once during the configuration phase.
    ///
    /// # Errors
    ///
    /// Returns [`Error::McuAlreadyConfigured`] if the phase already ran.
    fn register_config_callback(&self, hook: &'static dyn ConfigHook) -> Result<()>;

    /// Route responses of `kind` for `oid` to `handler`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateResponseHandler`] if the route is taken.
    fn register_response(
        &self,
        handler: &'static dyn ResponseHandler,
        kind: ResponseKind,
        oid: Oid,
    ) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn oids_are_sequential_and_unique() {
        let oids = OidAllocator::new();
        assert_eq!(oids.allocate(), Ok(Oid::new(0)));
        assert_eq!(oids.allocate(), Ok(Oid::new(1)));
        assert_eq!(oids.allocate(), Ok(Oid::new(2)));
    }

    #[test]
    fn oid_allocator_stops_after_last_id() {
        let oids = OidAllocator::new();
        for expected in 0..=u8::MAX {
            assert_eq!(oids.allocate(), Ok(Oid::new(expected)));
        }
        assert_eq!(oids.allocate(), Err(Error::OidExhausted));
        assert_eq!(oids.allocate(), Err(Error::OidExhausted));
    }

    #[test]
    fn response_routes_by_kind_and_oid() {
        let response = McuResponse::CounterState {
            oid: Oid::new(4),
            next_clock: 0,
            count: 0,
            count_clock: 0,
        };
        assert_eq!(response.kind(), ResponseKind::CounterState);
        assert_eq!(response.oid(), Oid::new(4));
    }
}
