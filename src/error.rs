use derive_more::{Display, Error, From};

use crate::mcu::Oid;

/// Result type used throughout the crate.
pub type Result<T, E = Error> = core::result::Result<T, E>;

/// Errors returned by this crate.
///
/// Everything here is raised while building or configuring a channel. Handling a
/// report never fails.
#[derive(Clone, Copy, Debug, Display, Error, Eq, From, PartialEq, defmt::Format)]
pub enum Error {
    /// The channel could not be set up as requested.
    #[display("configuration error: {_0}")]
    #[from]
    Config(ConfigError),

    /// Every object id on the controller has been handed out.
    #[display("no object ids left on controller")]
    OidExhausted,

    /// A channel's configuration hook ran a second time.
    #[display("oid {oid} is already configured")]
    AlreadyConfigured {
        /// The channel that was configured twice.
        oid: Oid,
    },

    /// The controller's configuration phase already ran.
    #[display("controller is already configured")]
    McuAlreadyConfigured,

    /// A handler is already registered for this response kind and oid.
    #[display("duplicate response handler for oid {oid}")]
    DuplicateResponseHandler {
        /// The oid the response is keyed by.
        oid: Oid,
    },

    /// A response arrived that nothing registered for.
    #[display("no response handler for oid {oid}")]
    NoResponseHandler {
        /// The oid the response is keyed by.
        oid: Oid,
    },

    /// A `*Static` resource was handed to a second constructor.
    #[display("static resources are already in use")]
    StaticInUse,
}

/// Why a channel could not be configured.
///
/// All variants are fatal: nothing is sent to the controller and the channel is
/// not created.
#[derive(Clone, Copy, Debug, Display, Error, Eq, PartialEq, defmt::Format)]
pub enum ConfigError {
    /// The pin description names a chip that is not registered.
    #[display("unknown chip")]
    UnknownChip,

    /// The pin description is empty or too long.
    #[display("invalid pin name")]
    InvalidPin,

    /// A pull-up was requested where it is not available.
    #[display("pin does not support pullup")]
    PullupNotSupported,

    /// A pull-down was requested; these inputs only offer pull-ups.
    #[display("pin does not support pulldown")]
    PulldownNotSupported,

    /// An inverted pin was requested where inversion is not allowed.
    #[display("pin does not support invert")]
    InvertNotSupported,

    /// The pin is already claimed by another channel.
    #[display("pin used multiple times")]
    PinInUse,

    /// A numeric parameter is outside its allowed range.
    #[display("parameter `{field}` out of range")]
    OutOfRange {
        /// Name of the offending parameter.
        field: &'static str,
    },

    /// The chip registry is full.
    #[display("too many chips registered")]
    TooManyChips,
}
