//! Persisted sleep mode and the sleep pause timer.

use r2_packet::{SLEEP_MODE_STORAGE_ADDRESS, SLEEP_UNTIL_MESSAGE_RECEIVED};
use tracing::debug;

use crate::storage::{NonVolatileStorage, StorageError};

/// Whether a node sleeps between loop iterations, and for how many cycles.
///
/// Stored as one byte: `0x00` when disabled, otherwise the cycle count
/// (`0xFF` meaning "until a message arrives").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SleepState {
    /// Sleep enabled.
    pub enabled: bool,
    /// Wake cycles per sleep.
    pub cycles: u8,
}

impl SleepState {
    /// Load from storage.
    pub fn load(storage: &mut dyn NonVolatileStorage) -> Result<Self, StorageError> {
        let byte = storage.read(SLEEP_MODE_STORAGE_ADDRESS)?;
        Ok(SleepState {
            enabled: byte != 0,
            cycles: byte,
        })
    }

    /// Change and persist the sleep mode.
    ///
    /// Enabling with zero cycles means sleeping until a message arrives.
    /// Disabling clears the cycles, matching what a reload yields. The
    /// storage byte is only written when its value changes.
    pub fn set(
        &mut self,
        storage: &mut dyn NonVolatileStorage,
        enabled: bool,
        cycles: u8,
    ) -> Result<(), StorageError> {
        let cycles = match (enabled, cycles) {
            (false, _) => 0,
            (true, 0) => SLEEP_UNTIL_MESSAGE_RECEIVED,
            (true, cycles) => cycles,
        };
        if storage.update(SLEEP_MODE_STORAGE_ADDRESS, cycles)? {
            debug!(enabled, cycles, "sleep mode persisted");
        }
        self.enabled = enabled;
        self.cycles = cycles;
        Ok(())
    }

    /// Whether the node sleeps until woken by traffic.
    pub fn until_message(&self) -> bool {
        self.enabled && self.cycles == SLEEP_UNTIL_MESSAGE_RECEIVED
    }

    /// Wire representation `[enabled, cycles]`.
    pub fn to_content(&self) -> [u8; 2] {
        [self.enabled as u8, self.cycles]
    }
}

/// Defers sleeping for a while after traffic or an explicit pause.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SleepSchedule {
    paused_until: Option<u64>,
}

impl SleepSchedule {
    /// A schedule with no pause.
    pub fn new() -> Self {
        Self::default()
    }

    /// Pause for `seconds` (capped at `max_seconds`) from `now`. Zero cancels.
    pub fn pause(&mut self, now: u64, seconds: u8, max_seconds: u8) {
        if seconds == 0 {
            self.paused_until = None;
            return;
        }
        let seconds = seconds.min(max_seconds) as u64;
        self.paused_until = Some(now + seconds * 1000);
        debug!(seconds, "sleep paused");
    }

    /// Whether sleeping is currently paused. An expired pause is dropped.
    pub fn is_paused(&mut self, now: u64) -> bool {
        match self.paused_until {
            Some(until) if until > now => true,
            Some(_) => {
                self.paused_until = None;
                false
            }
            None => false,
        }
    }

    /// Milliseconds left on the pause.
    pub fn remaining(&self, now: u64) -> u64 {
        self.paused_until.map_or(0, |until| until.saturating_sub(now))
    }
}
