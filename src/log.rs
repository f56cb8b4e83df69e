//! Crate-internal logging macros.
//!
//! - Embedded (no `host` feature): `defmt`
//! - Host unit tests: `println!`
//! - Other host builds: no-op (arguments are still type-checked)
//!
//! Format strings must stay in the subset understood by both `defmt` and
//! `core::fmt`, i.e. plain `{}` placeholders.

macro_rules! log_info {
    ($($arg:tt)*) => {{
        #[cfg(not(feature = "host"))]
        ::defmt::info!($($arg)*);

        #[cfg(all(feature = "host", test))]
        ::std::println!("[INFO] {}", ::core::format_args!($($arg)*));

        #[cfg(all(feature = "host", not(test)))]
        {
            let _ = ::core::format_args!($($arg)*);
        }
    }};
}

macro_rules! log_warn {
    ($($arg:tt)*) => {{
        #[cfg(not(feature = "host"))]
        ::defmt::warn!($($arg)*);

        #[cfg(all(feature = "host", test))]
        ::std::println!("[WARN] {}", ::core::format_args!($($arg)*));

        #[cfg(all(feature = "host", not(test)))]
        {
            let _ = ::core::format_args!($($arg)*);
        }
    }};
}

macro_rules! log_debug {
    ($($arg:tt)*) => {{
        #[cfg(not(feature = "host"))]
        ::defmt::debug!($($arg)*);

        #[cfg(all(feature = "host", test))]
        ::std::println!("[DEBUG] {}", ::core::format_args!($($arg)*));

        #[cfg(all(feature = "host", not(test)))]
        {
            let _ = ::core::format_args!($($arg)*);
        }
    }};
}

macro_rules! log_trace {
    ($($arg:tt)*) => {{
        #[cfg(not(feature = "host"))]
        ::defmt::trace!($($arg)*);

        // Per-report chatter stays quiet on host, even under test.
        #[cfg(feature = "host")]
        {
            let _ = ::core::format_args!($($arg)*);
        }
    }};
}
