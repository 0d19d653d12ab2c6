//! The qukeys resolution engine.
//!
//! A qukey press can't be reported when it happens, because we don't know yet
//! which of its two keycodes it stands for.  So the press is swallowed and put
//! in the [`KeyQueue`].  Any key pressed while the queue is non-empty is queued
//! behind it, to keep the host's view of the presses in order.
//!
//! The head of the queue is decided by one of three things:
//!
//! - Its own release.  Released before anything else was, it was a tap, and
//!   goes out as its primary keycode.
//! - The release of a key queued behind it.  That key went down and came back
//!   up while the head was held, so the head was being used as a modifier:
//!   it goes out as its alternate keycode.  This is the rollover case.
//! - Time.  Held alone for longer than the timeout, it goes out as its
//!   alternate keycode.
//!
//! A qukey with a release delay adds one more wrinkle.  When it is released,
//! the release itself is held back for `release_delay` ticks.  If the key comes
//! back down in that window, the release is forgotten, and the key carries on
//! as if it had been held the whole time.  If the window passes, the key is
//! sent as a tap, along with its release.
//!
//! Once the head is decided, it is sent to the host as a press tagged
//! [`Origin::Qukeys`], and any ordinary keys that were waiting directly behind
//! it follow straight away.

use crate::config::{Config, ConfigError};
use crate::key::{Key, Keymap, Qukey, QukeyTable};
use crate::log::{debug, trace, warn};
use crate::queue::{KeyQueue, QueueEntry, QUEUE_MAX};
use crate::{EventSink, KeyswitchEvent, Origin, Ticks};

/// Which of a qukey's keycodes to send.
#[derive(Clone, Copy, Eq, PartialEq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Role {
    Primary,
    Alternate,
}

/// The qukeys plugin.
pub struct Qukeys<'a, K, const N: usize = QUEUE_MAX> {
    table: QukeyTable<'a, K>,
    queue: KeyQueue<N>,
    config: Config,
    active: bool,
}

impl<'a, K: Keymap, const N: usize> Qukeys<'a, K, N> {
    /// Build the engine over a qukey table and the keymap that refers to it.
    /// The engine starts out active.
    pub fn new(qukeys: &'a [Qukey], keymap: K, config: Config) -> Result<Self, ConfigError> {
        config.validate(qukeys)?;
        Ok(Qukeys {
            table: QukeyTable::new(qukeys, keymap),
            queue: KeyQueue::new(),
            config,
            active: true,
        })
    }

    pub fn activate(&mut self) {
        self.active = true;
    }

    pub fn deactivate(&mut self) {
        self.active = false;
    }

    pub fn toggle(&mut self) {
        self.active = !self.active;
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn config(&self) -> Config {
        self.config
    }

    pub fn set_timeout(&mut self, timeout: Ticks) -> Result<(), ConfigError> {
        self.reconfigure(self.config.with_timeout(timeout))
    }

    pub fn set_grace_period_offset(&mut self, offset: Ticks) -> Result<(), ConfigError> {
        self.reconfigure(self.config.with_grace_period_offset(offset))
    }

    fn reconfigure(&mut self, config: Config) -> Result<(), ConfigError> {
        config.validate(self.table.qukeys())?;
        self.config = config;
        Ok(())
    }

    /// The presses currently held back.
    pub fn queue(&self) -> &KeyQueue<N> {
        &self.queue
    }

    /// Offer a key event to qukeys.
    ///
    /// Returns `true` if the event should carry on down the pipeline (its
    /// keycode may have been rewritten), or `false` if qukeys has taken it and
    /// will answer for it later through `sink`.
    pub fn handle_event(
        &mut self,
        event: &mut KeyswitchEvent,
        origin: Origin,
        now: Ticks,
        sink: &mut dyn EventSink,
    ) -> bool {
        if !self.active {
            // Anything left over from before deactivation goes out as taps,
            // so the host never sees a release ahead of its press.
            while !self.queue.is_empty() {
                self.commit_head_as_tap(sink);
            }
            if let Some(qukey) = self.table.lookup_key(event.key) {
                event.key = qukey.primary;
            }
            return true;
        }

        // Our own replays go straight through.
        if origin == Origin::Qukeys {
            return true;
        }

        if event.is_press() {
            self.handle_press(event, now, sink)
        } else if event.is_release() {
            self.handle_release(event, now, sink)
        } else {
            true
        }
    }

    fn handle_press(
        &mut self,
        event: &KeyswitchEvent,
        now: Ticks,
        sink: &mut dyn EventSink,
    ) -> bool {
        let addr = event.addr;

        // A quick re-press inside the grace window takes back the release.
        if let Some(head) = self.queue.front_mut() {
            if head.addr == addr && head.is_release_pending() {
                debug!("qukeys: {:?} pressed again, release cancelled", addr);
                head.cancel_release(now);
                return false;
            }
        }

        // Make room by resolving the head as a tap.  That may leave the queue
        // empty, in which case an ordinary key doesn't need to wait.
        if self.queue.is_full() {
            debug!("qukeys: queue full, committing {:?}", self.queue.front().map(|e| e.addr));
            self.commit_head_as_tap(sink);
        }

        // Whether a key is a qukey goes by the keycode on the event, the same
        // as when deactivated.
        if self.queue.is_empty() && self.table.lookup_key(event.key).is_none() {
            return true;
        }

        trace!("qukeys: queue {:?} at {}", addr, now);
        let pushed = self.queue.push_back(QueueEntry::new(addr, now), &self.table);
        debug_assert!(pushed.is_ok(), "qukeys queue full after commit");
        false
    }

    fn handle_release(
        &mut self,
        event: &mut KeyswitchEvent,
        now: Ticks,
        sink: &mut dyn EventSink,
    ) -> bool {
        let mut index = match self.queue.find(event.addr) {
            Some(index) => index,
            // Already sent, so the release belongs to the host.
            None => return true,
        };

        // The head was let go before this key was, so it was a tap.
        if index > 0 && self.queue.front().is_some_and(|e| e.is_release_pending()) {
            self.flush_delayed_release(sink);
            index -= 1;
        }

        // Everything still ahead of this key was held across its whole press.
        if index > 0 {
            debug!("qukeys: rollover on {:?}, {} held", event.addr, index);
            self.flush_up_to(index, Role::Alternate, sink);
        }

        if self.queue.release_delay() > 0 {
            let deadline = now.wrapping_add(self.config.grace_period_offset);
            if let Some(head) = self.queue.front_mut() {
                debug!("qukeys: {:?} released, waiting for re-press", head.addr);
                head.delay_release(deadline);
            }
            return false;
        }

        if let Some((_, key)) = self.flush_head(Role::Primary, sink) {
            event.key = key;
        }
        self.drain_non_dual_role_prefix(sink);
        true
    }

    /// Per scan cycle timeout handling.
    pub fn tick(&mut self, now: Ticks, sink: &mut dyn EventSink) {
        let head = match self.queue.front() {
            Some(head) => *head,
            None => return,
        };

        if head.is_release_pending() {
            let remaining = head.start_time.wrapping_sub(now) as i16;
            let window = (self.config.grace_period_offset
                - Ticks::from(self.queue.release_delay())) as i16;
            if remaining < window {
                debug!("qukeys: {:?} grace window closed", head.addr);
                self.flush_delayed_release(sink);
                self.drain_non_dual_role_prefix(sink);
            }
        }

        while let Some(head) = self.queue.front() {
            if head.is_release_pending()
                || now.wrapping_sub(head.start_time) <= self.config.timeout
            {
                break;
            }
            debug!("qukeys: {:?} held past timeout", head.addr);
            self.flush_head(Role::Alternate, sink);
            self.drain_non_dual_role_prefix(sink);
        }
    }

    /// Resolve the head as its primary keycode.  A head whose release is
    /// already pending is released as well.
    fn commit_head_as_tap(&mut self, sink: &mut dyn EventSink) {
        if self.queue.front().is_some_and(|e| e.is_release_pending()) {
            self.flush_delayed_release(sink);
        } else {
            self.flush_head(Role::Primary, sink);
        }
        self.drain_non_dual_role_prefix(sink);
    }

    /// Send the head of the queue to the host.  Returns the entry that was
    /// removed and the keycode it was sent as.
    fn flush_head(&mut self, role: Role, sink: &mut dyn EventSink) -> Option<(QueueEntry, Key)> {
        debug_assert!(!self.queue.is_empty(), "flush of empty qukeys queue");
        let (entry, qukey) = match self.queue.pop_front(&self.table) {
            Some(popped) => popped,
            None => {
                warn!("qukeys: flush with nothing queued");
                return None;
            }
        };

        let key = match (qukey, role) {
            (Some(qukey), Role::Primary) => qukey.primary,
            (Some(qukey), Role::Alternate) => qukey.alternate,
            (None, _) => self.table.key(entry.addr),
        };
        trace!("qukeys: send {:?} as {:?}", entry.addr, key);
        sink.dispatch(KeyswitchEvent::press(entry.addr, key), Origin::Qukeys);
        Some((entry, key))
    }

    /// Send the ordinary keys that have nothing left ahead of them.
    fn drain_non_dual_role_prefix(&mut self, sink: &mut dyn EventSink) {
        while !self.queue.is_empty() && self.queue.head_qukey().is_none() {
            self.flush_head(Role::Primary, sink);
        }
    }

    fn flush_up_to(&mut self, count: usize, role: Role, sink: &mut dyn EventSink) {
        for _ in 0..count {
            if self.flush_head(role, sink).is_none() {
                break;
            }
        }
    }

    /// Commit a head whose release was held back: the press as primary, and
    /// the release right after it.
    fn flush_delayed_release(&mut self, sink: &mut dyn EventSink) {
        if let Some((entry, key)) = self.flush_head(Role::Primary, sink) {
            sink.dispatch(KeyswitchEvent::release(entry.addr, key), Origin::Qukeys);
        }
    }
}
