#![allow(missing_docs, reason = "integration test crate")]
//! Host-level tests for the controller link: phases, routing, and pins.

use duty_envoy::mcu::{
    ConfigHook, Mcu, McuLink, McuResponse, Oid, PinRequest, PinResolver, Pins, ResponseHandler,
    ResponseKind,
};
use duty_envoy::pwm_in::{PwmIn, PwmInStatic};
use duty_envoy::{ConfigError, Error, Result};
use portable_atomic::{AtomicU32, Ordering};

struct CountingHandler {
    calls: AtomicU32,
}

impl CountingHandler {
    const fn new() -> Self {
        Self {
            calls: AtomicU32::new(0),
        }
    }
}

impl ResponseHandler for CountingHandler {
    fn handle_response(&self, _response: &McuResponse) {
        self.calls.fetch_add(1, Ordering::Relaxed);
    }
}

struct FailingHook;

impl ConfigHook for FailingHook {
    fn build_config(&'static self) -> Result<()> {
        Err(ConfigError::OutOfRange { field: "test" }.into())
    }
}

#[test]
fn dispatch_routes_by_kind_and_oid() {
    static MCU: McuLink = McuLink::new("mcu", 1_000_000.0);
    static HANDLER: CountingHandler = CountingHandler::new();

    let oid = MCU.create_oid().expect("fresh oid");
    MCU.register_response(&HANDLER, ResponseKind::PwmInState, oid)
        .expect("route is free");

    MCU.dispatch(&McuResponse::PwmInState { oid, high_ticks: 1 })
        .expect("routed");
    assert_eq!(HANDLER.calls.load(Ordering::Relaxed), 1);

    // Same oid, different kind.
    let result = MCU.dispatch(&McuResponse::CounterState {
        oid,
        next_clock: 0,
        count: 0,
        count_clock: 0,
    });
    assert_eq!(result, Err(Error::NoResponseHandler { oid }));
    assert_eq!(HANDLER.calls.load(Ordering::Relaxed), 1);
}

#[test]
fn unknown_oid_has_no_handler() {
    static MCU: McuLink = McuLink::new("mcu", 1_000_000.0);

    let oid = Oid::new(42);
    assert_eq!(
        MCU.dispatch(&McuResponse::PwmInState { oid, high_ticks: 0 }),
        Err(Error::NoResponseHandler { oid })
    );
}

#[test]
fn duplicate_route_is_rejected() {
    static MCU: McuLink = McuLink::new("mcu", 1_000_000.0);
    static FIRST: CountingHandler = CountingHandler::new();
    static SECOND: CountingHandler = CountingHandler::new();

    let oid = Oid::new(0);
    MCU.register_response(&FIRST, ResponseKind::CounterState, oid)
        .expect("route is free");
    assert_eq!(
        MCU.register_response(&SECOND, ResponseKind::CounterState, oid),
        Err(Error::DuplicateResponseHandler { oid })
    );

    MCU.dispatch(&McuResponse::CounterState {
        oid,
        next_clock: 0,
        count: 0,
        count_clock: 0,
    })
    .expect("routed");
    assert_eq!(FIRST.calls.load(Ordering::Relaxed), 1);
    assert_eq!(SECOND.calls.load(Ordering::Relaxed), 0);
}

#[test]
fn channels_cannot_join_after_configuration() {
    static MCU: McuLink = McuLink::new("mcu", 1_000_000.0);
    static EARLY_STATIC: PwmInStatic = PwmIn::new_static();
    static LATE_STATIC: PwmInStatic = PwmIn::new_static();

    let mut pins = Pins::<1>::new();
    pins.register_chip(&MCU, true).expect("room for chip");
    let early = PwmIn::new(&EARLY_STATIC, &mut pins, "PA1", 0.1, 100.0, 0).expect("valid");
    MCU.build_config().expect("configures");
    assert!(MCU.is_configured());
    assert!(early.mcu_pwm_in().is_configured());

    let late = PwmIn::new(&LATE_STATIC, &mut pins, "PA2", 0.1, 100.0, 0);
    assert!(matches!(late, Err(Error::McuAlreadyConfigured)));
    assert_eq!(MCU.build_config(), Err(Error::McuAlreadyConfigured));
    assert_eq!(MCU.config_cmds().len(), 1);

    // The refused channel neither kept the pin nor spent an oid.
    assert!(pins.lookup_pin("PA2", PinRequest::PULLUP_INPUT).is_ok());
    assert_eq!(MCU.create_oid(), Ok(Oid::new(1)));
}

#[test]
fn failed_hook_ends_configuration() {
    static MCU: McuLink = McuLink::new("mcu", 1_000_000.0);
    static HOOK: FailingHook = FailingHook;

    MCU.register_config_callback(&HOOK).expect("collecting");
    assert_eq!(
        MCU.build_config(),
        Err(Error::Config(ConfigError::OutOfRange { field: "test" }))
    );
    assert!(MCU.is_configured());
    assert_eq!(
        MCU.register_config_callback(&HOOK),
        Err(Error::McuAlreadyConfigured)
    );
}

#[test]
fn pins_resolve_across_chips() {
    static MCU: McuLink = McuLink::new("mcu", 1_000_000.0);
    static EXT: McuLink = McuLink::new("ext", 1_000_000.0);

    let mut pins = Pins::<2>::new();
    pins.register_chip(&MCU, true).expect("room for chip");
    pins.register_chip(&EXT, false).expect("room for chip");

    let params = pins
        .lookup_pin("ext:PB3", PinRequest::PULLUP_INPUT)
        .expect("plain pin");
    assert_eq!(params.chip.name(), "ext");
    assert!(!params.pull_up);

    assert!(matches!(
        pins.lookup_pin("^ext:PB4", PinRequest::PULLUP_INPUT),
        Err(Error::Config(ConfigError::PullupNotSupported))
    ));
    assert!(matches!(
        pins.lookup_pin("ext:PB3", PinRequest::PULLUP_INPUT),
        Err(Error::Config(ConfigError::PinInUse))
    ));
    // Same pin name on another chip is a different pin.
    assert!(pins.lookup_pin("PB3", PinRequest::PULLUP_INPUT).is_ok());
    assert!(matches!(
        pins.lookup_pin("other:PB3", PinRequest::PULLUP_INPUT),
        Err(Error::Config(ConfigError::UnknownChip))
    ));
}
