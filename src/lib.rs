//! Qukeys: dual-role keys for keyboard firmware
//!
//! A qukey is a single physical key that carries two meanings.  Tapped on its
//! own, it sends its primary keycode.  Held past a timeout, or held while some
//! later key is pressed and released, it sends its alternate keycode (usually a
//! modifier, or a layer shift).
//!
//! The [`Qukeys`] engine sits in the firmware's key event pipeline.  Every key
//! transition is offered to [`Qukeys::handle_event`], and [`Qukeys::tick`] is
//! called once per scan cycle.  Presses whose meaning isn't known yet are held
//! back in a small queue, and replayed through the [`EventSink`] once they are
//! resolved.

#![cfg_attr(not(any(feature = "std", test)), no_std)]

use bitflags::bitflags;

pub use usbd_human_interface_device::page::Keyboard;

pub use config::{Config, ConfigError, GRACE_PERIOD_OFFSET, QUKEY_RELEASE_DELAY, TIMEOUT};
pub use key::{Key, Keymap, Qukey, QukeyTable};
pub use queue::{KeyQueue, QueueEntry, QUEUE_MAX};
pub use qukeys::{Qukeys, Role};

pub mod config;
pub mod key;
pub mod queue;
pub mod qukeys;

#[cfg(test)]
mod testlog;

cfg_if::cfg_if! {
    if #[cfg(feature = "defmt")] {
        mod log {
            pub use defmt::{debug, trace, warn};
        }
    } else if #[cfg(feature = "log")] {
        mod log {
            pub use log::{debug, trace, warn};
        }
    } else {
        mod log {
            // No logging backend, so drop the messages.
            macro_rules! discard {
                ($($arg:tt)*) => {{}};
            }
            pub(crate) use discard as debug;
            pub(crate) use discard as trace;
            pub(crate) use discard as warn;
        }
    }
}

/// Clock ticks.  The host's clock is expected to wrap, so elapsed times are
/// always computed with `wrapping_sub`.
pub type Ticks = u16;

/// The address of a physical key in the matrix.
#[derive(Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct KeyAddr(pub u8);

impl KeyAddr {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

bitflags! {
    /// The state of a keyswitch across the last two scans.
    #[derive(Clone, Copy, PartialEq, Eq, Debug)]
    pub struct KeyswitchState: u8 {
        /// Down during this scan.
        const PRESSED = 0b0000_0001;
        /// Down during the previous scan.
        const WAS_PRESSED = 0b0000_0010;
    }
}

impl KeyswitchState {
    pub fn toggled_on(&self) -> bool {
        self.contains(Self::PRESSED) && !self.contains(Self::WAS_PRESSED)
    }

    pub fn toggled_off(&self) -> bool {
        self.contains(Self::WAS_PRESSED) && !self.contains(Self::PRESSED)
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for KeyswitchState {
    fn format(&self, fmt: defmt::Formatter) {
        if self.toggled_on() {
            defmt::write!(fmt, "pressed")
        } else if self.toggled_off() {
            defmt::write!(fmt, "released")
        } else {
            defmt::write!(fmt, "{=u8:#x}", self.bits())
        }
    }
}

/// A single key transition travelling through the event pipeline.
#[derive(Clone, Copy, Eq, PartialEq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct KeyswitchEvent {
    pub addr: KeyAddr,
    pub key: Key,
    pub state: KeyswitchState,
}

impl KeyswitchEvent {
    pub fn press(addr: KeyAddr, key: Key) -> Self {
        KeyswitchEvent {
            addr,
            key,
            state: KeyswitchState::PRESSED,
        }
    }

    pub fn release(addr: KeyAddr, key: Key) -> Self {
        KeyswitchEvent {
            addr,
            key,
            state: KeyswitchState::WAS_PRESSED,
        }
    }

    pub fn is_press(&self) -> bool {
        self.state.toggled_on()
    }

    pub fn is_release(&self) -> bool {
        self.state.toggled_off()
    }
}

/// Who put an event into the pipeline.
///
/// Events replayed by the qukeys engine carry [`Origin::Qukeys`], so that when
/// the host runs them back through its handlers, the engine lets them pass
/// rather than queueing them a second time.
#[derive(Clone, Copy, Eq, PartialEq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Origin {
    /// A real transition from the key scanner.
    Scan,
    /// A press or release synthesized by the qukeys engine.
    Qukeys,
}

/// The host's event channel.
///
/// Resolved presses, and any releases the engine had to hold back, are sent
/// through here.  The return value is the host's own "keep propagating"
/// answer, which the engine doesn't need.
pub trait EventSink {
    fn dispatch(&mut self, event: KeyswitchEvent, origin: Origin) -> bool;
}
