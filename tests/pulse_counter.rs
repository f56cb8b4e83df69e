#![allow(missing_docs, reason = "integration test crate")]
//! Host-level tests for edge counting and frequency measurement.

use std::sync::{Arc, Mutex};

use duty_envoy::config::CounterConfig;
use duty_envoy::mcu::{McuCommand, McuLink, McuResponse, Oid, Pins};
use duty_envoy::pulse_counter::{FrequencyCounter, FrequencyCounterStatic, FrequencySample};
use duty_envoy::{ConfigError, Error};

const MCU_FREQ: f64 = 1_000_000.0;

fn pins_for(mcu: &'static McuLink) -> Pins<1> {
    let mut pins = Pins::new();
    pins.register_chip(mcu, true).expect("room for chip");
    pins
}

fn report(mcu: &McuLink, oid: Oid, next_clock: u32, count: u32, count_clock: u32) {
    mcu.dispatch(&McuResponse::CounterState {
        oid,
        next_clock,
        count,
        count_clock,
    })
    .expect("counter_state is routed");
}

#[test]
fn queued_commands_describe_the_counter() {
    static MCU: McuLink = McuLink::new("mcu", MCU_FREQ);
    static TACH_STATIC: FrequencyCounterStatic = FrequencyCounter::new_static();

    let mut pins = pins_for(&MCU);
    let tach = FrequencyCounter::new(&TACH_STATIC, &mut pins, "^PA8", 0.1, 0.0015).expect("valid");
    MCU.build_config().expect("configures");

    let oid = tach.oid();
    assert_eq!(
        MCU.config_cmds(),
        [McuCommand::ConfigCounter {
            oid,
            pin: "PA8".try_into().expect("short pin name"),
            pull_up: true,
        }]
    );
    assert_eq!(
        MCU.init_cmds(),
        [McuCommand::QueryCounter {
            oid,
            clock: 1_500_000,
            poll_ticks: 1_500,
            sample_ticks: 100_000,
        }]
    );
    assert!(tach.mcu_counter().is_configured());
}

#[test]
fn frequency_follows_edge_rate() {
    static MCU: McuLink = McuLink::new("mcu", MCU_FREQ);
    static TACH_STATIC: FrequencyCounterStatic = FrequencyCounter::new_static();

    let mut pins = pins_for(&MCU);
    let tach = FrequencyCounter::new(&TACH_STATIC, &mut pins, "PA8", 0.1, 0.001).expect("valid");
    MCU.build_config().expect("configures");
    let oid = tach.oid();

    let samples = Arc::new(Mutex::new(Vec::new()));
    {
        let samples = Arc::clone(&samples);
        tach.set_callback(move |sample| samples.lock().expect("lock").push(sample));
    }

    // Reference: sampled at 2.0 s.
    report(&MCU, oid, 2_001_000, 100, 1_990_000);
    assert_eq!(tach.frequency(), 0.0);
    // 30 edges, the last at 2.1 s.
    report(&MCU, oid, 2_101_000, 130, 2_100_000);
    assert!((tach.frequency() - 300.0).abs() < 1e-3);
    // 10 more edges, the last at 2.15 s.
    report(&MCU, oid, 2_201_000, 140, 2_150_000);
    assert!((tach.frequency() - 200.0).abs() < 1e-3);

    let samples = samples.lock().expect("lock");
    assert_eq!(samples.len(), 2);
    assert!(matches!(
        samples.as_slice(),
        [FrequencySample { time: first, .. }, FrequencySample { time: second, .. }]
            if (first - 2.1).abs() < 1e-6 && (second - 2.2).abs() < 1e-6
    ));
    assert_eq!(tach.mcu_counter().count(), 140);
}

#[test]
fn stalled_signal_reads_zero() {
    static MCU: McuLink = McuLink::new("mcu", MCU_FREQ);
    static TACH_STATIC: FrequencyCounterStatic = FrequencyCounter::new_static();

    let mut pins = pins_for(&MCU);
    let tach = FrequencyCounter::new(&TACH_STATIC, &mut pins, "PA8", 0.1, 0.001).expect("valid");
    MCU.build_config().expect("configures");
    let oid = tach.oid();

    report(&MCU, oid, 1_001_000, 0, 900_000);
    report(&MCU, oid, 1_101_000, 50, 1_100_000);
    assert!(tach.frequency() > 0.0);
    // No new edges: the last edge time does not move.
    report(&MCU, oid, 1_201_000, 50, 1_100_000);
    assert_eq!(tach.frequency(), 0.0);
}

#[test]
fn count_survives_controller_counter_wrap() {
    static MCU: McuLink = McuLink::new("mcu", MCU_FREQ);
    static TACH_STATIC: FrequencyCounterStatic = FrequencyCounter::new_static();

    let mut pins = pins_for(&MCU);
    let tach = FrequencyCounter::new(&TACH_STATIC, &mut pins, "PA8", 0.1, 0.001).expect("valid");
    MCU.build_config().expect("configures");
    let oid = tach.oid();

    report(&MCU, oid, 1_001_000, u32::MAX - 9, 1_000_000);
    report(&MCU, oid, 1_101_000, 10, 1_100_000);
    assert_eq!(tach.mcu_counter().count(), u64::from(u32::MAX) + 11);
    // 20 edges in 0.1 s, across the wrap.
    assert!((tach.frequency() - 200.0).abs() < 1e-3);
}

#[test]
fn pull_down_is_rejected() {
    static MCU: McuLink = McuLink::new("mcu", MCU_FREQ);
    static TACH_STATIC: FrequencyCounterStatic = FrequencyCounter::new_static();

    let mut pins = pins_for(&MCU);
    let result = FrequencyCounter::new(&TACH_STATIC, &mut pins, "~PA8", 0.1, 0.001);
    assert!(matches!(
        result,
        Err(Error::Config(ConfigError::PulldownNotSupported))
    ));
}

#[test]
fn from_config_rejects_zero_sample_time() {
    static MCU: McuLink = McuLink::new("mcu", MCU_FREQ);
    static TACH_STATIC: FrequencyCounterStatic = FrequencyCounter::new_static();

    let mut pins = pins_for(&MCU);
    let config = CounterConfig {
        sample_time: 0.0,
        ..CounterConfig::new("PA8".try_into().expect("short pin description"))
    };
    let result = FrequencyCounter::from_config(&TACH_STATIC, &mut pins, &config);
    assert!(matches!(
        result,
        Err(Error::Config(ConfigError::OutOfRange {
            field: "sample_time"
        }))
    ));
}

#[test]
fn retry_after_static_in_use_gets_the_pin_and_next_oid() {
    static MCU: McuLink = McuLink::new("mcu", MCU_FREQ);
    static USED_STATIC: FrequencyCounterStatic = FrequencyCounter::new_static();
    static FRESH_STATIC: FrequencyCounterStatic = FrequencyCounter::new_static();

    let mut pins = pins_for(&MCU);
    let first = FrequencyCounter::new(&USED_STATIC, &mut pins, "PA8", 0.1, 0.001).expect("valid");
    let result = FrequencyCounter::new(&USED_STATIC, &mut pins, "PA9", 0.1, 0.001);
    assert!(matches!(result, Err(Error::StaticInUse)));

    let retry = FrequencyCounter::new(&FRESH_STATIC, &mut pins, "PA9", 0.1, 0.001)
        .expect("failed attempt left PA9 free");
    assert_eq!(first.oid(), Oid::new(0));
    assert_eq!(retry.oid(), Oid::new(1));

    MCU.build_config().expect("configures");
    assert_eq!(MCU.config_cmds().len(), 2);
    assert_eq!(MCU.init_cmds().len(), 2);
}
