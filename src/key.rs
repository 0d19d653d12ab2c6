//! Keycodes and qukey definitions
//!
//! The keymap hands us a [`Key`] for every address.  Most keys are plain HID
//! keyboard codes.  A qukey is named in the keymap by the reserved
//! [`Key::Qukey`] value, whose index selects an entry of the [`QukeyTable`].

use usbd_human_interface_device::page::Keyboard;

use crate::config::QUKEY_RELEASE_DELAY;
use crate::KeyAddr;

/// A keycode.
#[derive(Clone, Copy, Eq, PartialEq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Key {
    /// Nothing mapped here.
    NoKey,
    /// An ordinary HID keyboard usage, including the modifiers.
    Keyboard(Keyboard),
    /// Shift to the given layer.  Layers are the host's business; to us this
    /// is only a value to send.
    Layer(u8),
    /// The dual-role key at this index of the qukey table.
    Qukey(u8),
}

impl Key {
    pub fn is_qukey(&self) -> bool {
        matches!(self, Key::Qukey(_))
    }
}

impl From<Keyboard> for Key {
    fn from(k: Keyboard) -> Self {
        Key::Keyboard(k)
    }
}

/// A dual-role key definition.
#[derive(Clone, Copy, Eq, PartialEq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Qukey {
    /// Sent when the key is tapped.
    pub primary: Key,
    /// Sent when the key is held, or rolled over another key.
    pub alternate: Key,
    /// Ticks to wait, after a release, for a quick re-press before the key is
    /// committed as a tap.  Zero commits on release.
    pub release_delay: u8,
}

impl Qukey {
    pub const fn new(primary: Key, alternate: Key) -> Self {
        Qukey {
            primary,
            alternate,
            release_delay: QUKEY_RELEASE_DELAY,
        }
    }

    pub const fn with_release_delay(mut self, release_delay: u8) -> Self {
        self.release_delay = release_delay;
        self
    }
}

/// Read-only access to the active keymap.
pub trait Keymap {
    fn lookup(&self, addr: KeyAddr) -> Key;
}

/// A flat keymap, indexed by address.  Addresses past the end map to
/// [`Key::NoKey`].
impl Keymap for [Key] {
    fn lookup(&self, addr: KeyAddr) -> Key {
        self.get(addr.index()).copied().unwrap_or(Key::NoKey)
    }
}

impl<const N: usize> Keymap for [Key; N] {
    fn lookup(&self, addr: KeyAddr) -> Key {
        self.as_slice().lookup(addr)
    }
}

impl<K: Keymap + ?Sized> Keymap for &K {
    fn lookup(&self, addr: KeyAddr) -> Key {
        (**self).lookup(addr)
    }
}

/// The table of qukey definitions, joined with the keymap that refers to it.
pub struct QukeyTable<'a, K> {
    qukeys: &'a [Qukey],
    keymap: K,
}

impl<'a, K: Keymap> QukeyTable<'a, K> {
    pub fn new(qukeys: &'a [Qukey], keymap: K) -> Self {
        QukeyTable { qukeys, keymap }
    }

    pub fn qukeys(&self) -> &'a [Qukey] {
        self.qukeys
    }

    /// The keymap's keycode at this address.
    pub fn key(&self, addr: KeyAddr) -> Key {
        self.keymap.lookup(addr)
    }

    /// Resolve a keycode to its qukey definition, if it names one that
    /// exists.
    pub fn lookup_key(&self, key: Key) -> Option<Qukey> {
        match key {
            Key::Qukey(index) => self.qukeys.get(index as usize).copied(),
            _ => None,
        }
    }

    /// The qukey definition for the key at this address, if it is one.
    pub fn lookup(&self, addr: KeyAddr) -> Option<Qukey> {
        self.lookup_key(self.key(addr))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    static QUKEYS: [Qukey; 2] = [
        Qukey::new(Key::Keyboard(Keyboard::A), Key::Keyboard(Keyboard::LeftShift)),
        Qukey::new(Key::Keyboard(Keyboard::F), Key::Layer(1)).with_release_delay(20),
    ];

    #[test]
    fn lookup_by_address() {
        let keymap = [
            Key::Qukey(0),
            Key::Keyboard(Keyboard::B),
            Key::Qukey(1),
            Key::Qukey(7),
        ];
        let table = QukeyTable::new(&QUKEYS, &keymap);

        assert_eq!(table.lookup(KeyAddr(0)), Some(QUKEYS[0]));
        assert_eq!(table.lookup(KeyAddr(1)), None);
        assert_eq!(table.lookup(KeyAddr(2)).map(|q| q.release_delay), Some(20));
        // Index past the end of the table isn't a qukey.
        assert_eq!(table.lookup(KeyAddr(3)), None);
        // Neither is an address past the end of the keymap.
        assert_eq!(table.key(KeyAddr(40)), Key::NoKey);
        assert_eq!(table.lookup(KeyAddr(40)), None);
    }
}
