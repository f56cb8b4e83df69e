//! In-process controller binding: id allocation, clock math, command queues, and
//! response routing for one microcontroller.

use alloc::vec::Vec;
use core::cell::RefCell;
use core::mem;

use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use portable_atomic::{AtomicU64, Ordering};

use super::{
    ConfigHook, Mcu, McuCommand, McuResponse, Oid, OidAllocator, ResponseHandler, ResponseKind,
};
use crate::{Error, Result};

/// Delay from start-up to the first query slot.
const QUERY_START_DELAY_SECONDS: f64 = 1.5;

/// Spacing between consecutive oids' query slots.
const QUERY_SLOT_SPACING_SECONDS: f64 = 0.01;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Phase {
    /// Channels are still being created.
    Collecting,
    /// Hooks are running.
    Configuring,
    /// Configuration is over.
    Ready,
}

struct Route {
    kind: ResponseKind,
    oid: Oid,
    handler: &'static dyn ResponseHandler,
}

struct LinkState {
    phase: Phase,
    config_hooks: Vec<&'static dyn ConfigHook>,
    config_cmds: Vec<McuCommand>,
    init_cmds: Vec<McuCommand>,
    routes: Vec<Route>,
}

/// Host-side bookkeeping for one microcontroller.
///
/// `McuLink` is const-constructible so it can live in a `static` and be shared,
/// read-only, by every channel on the controller. It collects configuration
/// hooks while channels are created, runs them once in [`build_config`](Self::build_config),
/// keeps the resulting config and init commands for transmission, and routes
/// decoded responses to their handlers with [`dispatch`](Self::dispatch).
///
/// Encoding commands for the wire and decoding responses is left to the
/// transport that owns the link.
///
/// See the [module example](super) for usage.
pub struct McuLink {
    name: &'static str,
    mcu_freq: f64,
    oids: OidAllocator,
    last_clock: AtomicU64,
    query_base_clock: AtomicU64,
    state: Mutex<CriticalSectionRawMutex, RefCell<LinkState>>,
}

impl McuLink {
    /// Creates a link to the controller `name`, clocked at `mcu_freq` ticks per second.
    #[must_use]
    #[expect(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        reason = "the query start delay is a small positive tick count"
    )]
    pub const fn new(name: &'static str, mcu_freq: f64) -> Self {
        Self {
            name,
            mcu_freq,
            oids: OidAllocator::new(),
            last_clock: AtomicU64::new(0),
            query_base_clock: AtomicU64::new((QUERY_START_DELAY_SECONDS * mcu_freq) as u64),
            state: Mutex::new(RefCell::new(LinkState {
                phase: Phase::Collecting,
                config_hooks: Vec::new(),
                config_cmds: Vec::new(),
                init_cmds: Vec::new(),
                routes: Vec::new(),
            })),
        }
    }

    /// Controller clock rate in ticks per second.
    #[must_use]
    pub const fn mcu_freq(&self) -> f64 {
        self.mcu_freq
    }

    /// Runs every registered configuration hook, once.
    ///
    /// After this returns (successfully or not) no further hooks or commands are
    /// accepted.
    ///
    /// # Errors
    ///
    /// Returns [`Error::McuAlreadyConfigured`] on a second call, or the first
    /// error a hook reports. A failed configuration is not retried.
    pub fn build_config(&self) -> Result<()> {
        let hooks = self.state.lock(|state| {
            let mut state = state.borrow_mut();
            if state.phase != Phase::Collecting {
                return Err(Error::McuAlreadyConfigured);
            }
            state.phase = Phase::Configuring;
            Ok(mem::take(&mut state.config_hooks))
        })?;

        log_info!("McuLink {}: configuring {} channels", self.name, hooks.len());
        let result = hooks.iter().try_for_each(|hook| hook.build_config());

        self.state.lock(|state| state.borrow_mut().phase = Phase::Ready);
        if let Err(error) = result {
            log_warn!("McuLink {}: configuration failed: {}", self.name, error);
        }
        result
    }

    /// Configuration commands queued so far, in order.
    #[must_use]
    pub fn config_cmds(&self) -> Vec<McuCommand> {
        self.state.lock(|state| state.borrow().config_cmds.clone())
    }

    /// Start-up (`is_init`) commands queued so far, in order.
    #[must_use]
    pub fn init_cmds(&self) -> Vec<McuCommand> {
        self.state.lock(|state| state.borrow().init_cmds.clone())
    }

    /// Routes a decoded response to the handler registered for its kind and oid.
    ///
    /// The handler runs synchronously on the caller's context.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoResponseHandler`] if nothing registered for the response.
    pub fn dispatch(&self, response: &McuResponse) -> Result<()> {
        let kind = response.kind();
        let oid = response.oid();
        let handler = self
            .state
            .lock(|state| {
                state
                    .borrow()
                    .routes
                    .iter()
                    .find(|route| route.kind == kind && route.oid == oid)
                    .map(|route| route.handler)
            })
            .ok_or(Error::NoResponseHandler { oid })?;
        handler.handle_response(response);
        Ok(())
    }

    /// Records the latest full 64-bit clock known to the host.
    ///
    /// 32-bit clocks in responses are extended relative to this value.
    pub fn set_last_clock(&self, clock: u64) {
        self.last_clock.store(clock, Ordering::Release);
    }

    /// Moves the reference clock that query slots are offset from.
    pub fn set_query_base_clock(&self, clock: u64) {
        self.query_base_clock.store(clock, Ordering::Release);
    }

    fn push_command(&self, command: McuCommand, is_init: bool) -> Result<()> {
        self.state.lock(|state| {
            let mut state = state.borrow_mut();
            if state.phase == Phase::Ready {
                return Err(Error::McuAlreadyConfigured);
            }
            if is_init {
                state.init_cmds.push(command);
            } else {
                state.config_cmds.push(command);
            }
            Ok(())
        })
    }
}

impl Mcu for McuLink {
    fn name(&self) -> &str {
        self.name
    }

    fn create_oid(&self) -> Result<Oid> {
        self.oids.allocate()
    }

    #[expect(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        reason = "controller durations are 32-bit tick counts; negative saturates to 0"
    )]
    fn seconds_to_clock(&self, seconds: f64) -> u32 {
        (seconds * self.mcu_freq) as u32
    }

    fn ticks_to_seconds(&self, ticks: u32) -> f64 {
        f64::from(ticks) / self.mcu_freq
    }

    fn clock32_to_clock64(&self, clock32: u32) -> u64 {
        let last_clock = self.last_clock.load(Ordering::Acquire);
        // Signed distance from the last known clock, so slightly stale values
        // land before it rather than a full wrap ahead.
        #[expect(
            clippy::cast_possible_truncation,
            clippy::cast_possible_wrap,
            reason = "the low 32 bits are compared modulo 2^32, then read as signed"
        )]
        let clock_diff = clock32.wrapping_sub(last_clock as u32) as i32;
        last_clock.wrapping_add_signed(i64::from(clock_diff))
    }

    #[expect(
        clippy::cast_precision_loss,
        reason = "exact below 2^53 ticks, which outlasts any session"
    )]
    fn clock_to_seconds(&self, clock: u64) -> f64 {
        clock as f64 / self.mcu_freq
    }

    fn get_query_slot(&self, oid: Oid) -> u32 {
        let slot = self.seconds_to_clock(f64::from(oid.index()) * QUERY_SLOT_SPACING_SECONDS);
        #[expect(
            clippy::cast_possible_truncation,
            reason = "query clocks are sent as the low 32 bits"
        )]
        let base = self.query_base_clock.load(Ordering::Acquire) as u32;
        base.wrapping_add(slot)
    }

    fn add_config_cmd(&self, command: McuCommand, is_init: bool) -> Result<()> {
        log_debug!(
            "McuLink {}: queue {} command for oid {}",
            self.name,
            if is_init { "init" } else { "config" },
            command.oid()
        );
        self.push_command(command, is_init)
    }

    fn is_configured(&self) -> bool {
        self.state.lock(|state| state.borrow().phase != Phase::Collecting)
    }

    fn register_config_callback(&self, hook: &'static dyn ConfigHook) -> Result<()> {
        self.state.lock(|state| {
            let mut state = state.borrow_mut();
            if state.phase != Phase::Collecting {
                return Err(Error::McuAlreadyConfigured);
            }
            state.config_hooks.push(hook);
            Ok(())
        })
    }

    fn register_response(
        &self,
        handler: &'static dyn ResponseHandler,
        kind: ResponseKind,
        oid: Oid,
    ) -> Result<()> {
        self.state.lock(|state| {
            let mut state = state.borrow_mut();
            if state
                .routes
                .iter()
                .any(|route| route.kind == kind && route.oid == oid)
            {
                return Err(Error::DuplicateResponseHandler { oid });
            }
            state.routes.push(Route { kind, oid, handler });
            Ok(())
        })
    }
}
