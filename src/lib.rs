//! Host-side drivers for microcontroller pulse inputs.
//!
//! The microcontroller does the timing; this crate configures it, listens for its
//! periodic reports, and turns raw clock ticks into physical quantities.
//!
//! # Glossary
//!
//! - **Oid:** object id. Each configured channel on a microcontroller gets one,
//!   unique per controller.
//! - **Tick:** the microcontroller's indivisible clock unit. Seconds convert to and
//!   from ticks at the controller's clock rate.
//! - **Query slot:** a start clock handed to periodic queries so that channels on
//!   one controller are staggered against a known reference.
//! - **Watchdog bound (`max_task_ticks`):** the most ticks the microcontroller may
//!   spend on one sampling task before it must report anyway. A stalled fan still
//!   produces a report (of 0% duty).
//! - **Duty cycle:** measured high time × nominal frequency.
#![cfg_attr(not(feature = "host"), no_std)]

extern crate alloc;

#[macro_use]
mod log;

mod callback;
pub mod config;
mod error;
pub mod feed_scaling;
pub mod mcu;
pub mod pulse_counter;
pub mod pwm_in;

// Re-export error types and result (used throughout)
pub use crate::error::{ConfigError, Error, Result};
