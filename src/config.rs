//! Qukeys tunables
//!
//! The defaults here are the values the firmware ships with.  A keymap can
//! override them when building the engine, and they can be adjusted at
//! runtime, but every change is validated against the qukey table.

use thiserror::Error;

use crate::key::Qukey;
use crate::Ticks;

/// Ticks a qukey may be held alone before it resolves to its alternate.
pub const TIMEOUT: Ticks = 200;

/// Release delay given to a qukey that doesn't ask for one.
pub const QUKEY_RELEASE_DELAY: u8 = 0;

/// How far into the future a delayed release pushes the queue head's
/// timestamp.  The grace window closes once `release_delay` ticks of it have
/// passed.
pub const GRACE_PERIOD_OFFSET: Ticks = 4096;

#[derive(Clone, Copy, Eq, PartialEq, Debug, Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigError {
    #[error("timeout must be at least one tick")]
    ZeroTimeout,
    #[error("grace period offset {grace_period_offset} must exceed release delay {release_delay}")]
    GracePeriodTooShort {
        release_delay: u8,
        grace_period_offset: Ticks,
    },
    #[error("grace period offset {0} is more than half the clock range")]
    GracePeriodTooLong(Ticks),
    #[error("{0} qukeys defined, but only 256 can be addressed")]
    TooManyQukeys(usize),
}

#[derive(Clone, Copy, Eq, PartialEq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Config {
    pub timeout: Ticks,
    pub grace_period_offset: Ticks,
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    pub const fn new() -> Self {
        Config {
            timeout: TIMEOUT,
            grace_period_offset: GRACE_PERIOD_OFFSET,
        }
    }

    pub const fn with_timeout(mut self, timeout: Ticks) -> Self {
        self.timeout = timeout;
        self
    }

    pub const fn with_grace_period_offset(mut self, offset: Ticks) -> Self {
        self.grace_period_offset = offset;
        self
    }

    /// Check these settings against a qukey table.
    pub fn validate(&self, qukeys: &[Qukey]) -> Result<(), ConfigError> {
        if self.timeout == 0 {
            return Err(ConfigError::ZeroTimeout);
        }
        // Deadlines are compared as signed differences, so they can't be
        // further out than half the clock.
        if self.grace_period_offset > i16::MAX as Ticks {
            return Err(ConfigError::GracePeriodTooLong(self.grace_period_offset));
        }
        if qukeys.len() > u8::MAX as usize + 1 {
            return Err(ConfigError::TooManyQukeys(qukeys.len()));
        }
        if let Some(q) = qukeys
            .iter()
            .find(|q| Ticks::from(q.release_delay) >= self.grace_period_offset)
        {
            return Err(ConfigError::GracePeriodTooShort {
                release_delay: q.release_delay,
                grace_period_offset: self.grace_period_offset,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::Key;
    use crate::Keyboard;

    const SLOW: Qukey = Qukey::new(Key::Keyboard(Keyboard::J), Key::Layer(2)).with_release_delay(40);

    #[test]
    fn defaults_are_valid() {
        assert_eq!(Config::default().validate(&[SLOW]), Ok(()));
        assert_eq!(Config::default().timeout, 200);
        assert_eq!(Config::default().grace_period_offset, 4096);
    }

    #[test]
    fn rejects_bad_settings() {
        assert_eq!(
            Config::new().with_timeout(0).validate(&[]),
            Err(ConfigError::ZeroTimeout)
        );
        assert_eq!(
            Config::new().with_grace_period_offset(40).validate(&[SLOW]),
            Err(ConfigError::GracePeriodTooShort {
                release_delay: 40,
                grace_period_offset: 40,
            })
        );
        assert_eq!(
            Config::new().with_grace_period_offset(0x8000).validate(&[]),
            Err(ConfigError::GracePeriodTooLong(0x8000))
        );
        let many = [SLOW; 257];
        assert_eq!(
            Config::new().validate(&many),
            Err(ConfigError::TooManyQukeys(257))
        );
    }
}
