//! Pin descriptions to controller pins.
//!
//! A pin description is `[^|~][!][chip:]pin`:
//!
//! - `^` enables the pull-up, `~` the pull-down.
//! - `!` inverts the pin.
//! - `chip:` selects the controller; without it the pin is on `mcu`.
//!
//! Whitespace around each part is ignored, so `"^ !  ext:PB3"` is valid.

use alloc::vec::Vec;

use super::{Mcu, PinName};
use crate::{ConfigError, Result};

/// Chip assumed when a pin description has no `chip:` prefix.
pub const DEFAULT_CHIP: &str = "mcu";

/// What the caller is prepared to accept for a pin.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, defmt::Format)]
pub struct PinRequest {
    /// A `^` (pull-up) prefix is allowed.
    pub can_pullup: bool,
    /// A `!` (invert) prefix is allowed.
    pub can_invert: bool,
}

impl PinRequest {
    /// Digital input that may use the pull-up, not invertible.
    pub const PULLUP_INPUT: Self = Self {
        can_pullup: true,
        can_invert: false,
    };
}

/// A resolved pin and the controller that owns it.
pub struct PinParams {
    /// The controller the pin lives on.
    pub chip: &'static dyn Mcu,
    /// Pin name on that controller.
    pub pin: PinName,
    /// Pull-up requested with `^`.
    pub pull_up: bool,
    /// Inversion requested with `!`.
    pub invert: bool,
}

/// Resolves pin descriptions and claims the pins it hands out.
///
/// Constructors resolve first and claim only once nothing else can fail, so a
/// rejected channel leaves its pin free.
pub trait PinResolver {
    /// Resolve `desc` for a caller that accepts `request`, without claiming it.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Config`] if the chip is unknown, the pin name is
    /// invalid or already claimed, or the requested electrical mode is not
    /// supported.
    fn resolve_pin(&self, desc: &str, request: PinRequest) -> Result<PinParams>;

    /// Mark a resolved pin as in use.
    fn claim_pin(&mut self, params: &PinParams);

    /// Resolve and claim in one step.
    ///
    /// # Errors
    ///
    /// As [`resolve_pin`](Self::resolve_pin).
    fn lookup_pin(&mut self, desc: &str, request: PinRequest) -> Result<PinParams> {
        let params = self.resolve_pin(desc, request)?;
        self.claim_pin(&params);
        Ok(params)
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Pull {
    None,
    Up,
    Down,
}

struct ChipEntry {
    mcu: &'static dyn Mcu,
    pullup_capable: bool,
}

/// Registry of up to `N` controllers and the pins claimed on them.
///
/// # Example
///
/// ```rust
/// use duty_envoy::mcu::{Mcu, McuLink, PinRequest, PinResolver, Pins};
///
/// static MCU: McuLink = McuLink::new("mcu", 16_000_000.0);
/// static EXT: McuLink = McuLink::new("ext", 48_000_000.0);
///
/// # fn main() -> duty_envoy::Result<()> {
/// let mut pins = Pins::<2>::new();
/// pins.register_chip(&MCU, true)?;
/// pins.register_chip(&EXT, true)?;
///
/// let params = pins.lookup_pin("^ext:PB3", PinRequest::PULLUP_INPUT)?;
/// assert_eq!(params.chip.name(), "ext");
/// assert_eq!(params.pin, "PB3");
/// assert!(params.pull_up);
/// # Ok(())
/// # }
/// ```
pub struct Pins<const N: usize> {
    chips: heapless::Vec<ChipEntry, N>,
    claimed: Vec<(&'static str, PinName)>,
}

impl<const N: usize> Pins<N> {
    /// Creates an empty registry.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            chips: heapless::Vec::new(),
            claimed: Vec::new(),
        }
    }

    /// Registers a controller. `pullup_capable` says whether its inputs have
    /// pull-up resistors.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::TooManyChips`] if `N` chips are already registered.
    pub fn register_chip(&mut self, mcu: &'static dyn Mcu, pullup_capable: bool) -> Result<()> {
        self.chips
            .push(ChipEntry {
                mcu,
                pullup_capable,
            })
            .map_err(|_| ConfigError::TooManyChips)?;
        Ok(())
    }

    fn chip(&self, name: &str) -> Option<&ChipEntry> {
        self.chips.iter().find(|entry| entry.mcu.name() == name)
    }

    fn is_claimed(&self, chip_name: &str, pin: &PinName) -> bool {
        self.claimed
            .iter()
            .any(|(claimed_chip, claimed_pin)| *claimed_chip == chip_name && claimed_pin == pin)
    }
}

impl<const N: usize> Default for Pins<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> PinResolver for Pins<N> {
    fn resolve_pin(&self, desc: &str, request: PinRequest) -> Result<PinParams> {
        let desc = desc.trim();
        let (pull, desc) = if let Some(rest) = desc.strip_prefix('^') {
            (Pull::Up, rest.trim_start())
        } else if let Some(rest) = desc.strip_prefix('~') {
            (Pull::Down, rest.trim_start())
        } else {
            (Pull::None, desc)
        };
        let (invert, desc) = match desc.strip_prefix('!') {
            Some(rest) => (true, rest.trim_start()),
            None => (false, desc),
        };
        let (chip_name, pin_name) = desc
            .split_once(':')
            .map_or((DEFAULT_CHIP, desc), |(chip, pin)| (chip.trim(), pin.trim()));

        let entry = self.chip(chip_name).ok_or(ConfigError::UnknownChip)?;
        let chip = entry.mcu;
        match pull {
            Pull::None => {}
            _ if !request.can_pullup => return Err(ConfigError::PullupNotSupported.into()),
            Pull::Down => return Err(ConfigError::PulldownNotSupported.into()),
            Pull::Up if !entry.pullup_capable => {
                return Err(ConfigError::PullupNotSupported.into());
            }
            Pull::Up => {}
        }
        if invert && !request.can_invert {
            return Err(ConfigError::InvertNotSupported.into());
        }
        if pin_name.is_empty() || pin_name.contains(char::is_whitespace) {
            return Err(ConfigError::InvalidPin.into());
        }
        let pin = PinName::try_from(pin_name).map_err(|()| ConfigError::InvalidPin)?;

        if self.is_claimed(chip.name(), &pin) {
            return Err(ConfigError::PinInUse.into());
        }

        Ok(PinParams {
            chip,
            pin,
            pull_up: pull == Pull::Up,
            invert,
        })
    }

    fn claim_pin(&mut self, params: &PinParams) {
        let chip: &'static dyn Mcu = params.chip;
        let chip_name = chip.name();
        if !self.is_claimed(chip_name, &params.pin) {
            self.claimed.push((chip_name, params.pin.clone()));
        }
    }
}
