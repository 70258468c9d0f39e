use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// Three-hour intervals per calendar day.
pub const SLOT_COUNT: usize = 8;

/// Readings already observed for the current local day, one slot per
/// three-hour interval (slot 0 covers 00:00-02:59, slot 7 covers 21:00-23:59).
///
/// `last_write` is the region-local time of the latest reading, so its date
/// names the day the slots belong to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PartialDay {
    slots: [Option<f64>; SLOT_COUNT],
    last_write: Option<NaiveDateTime>,
}

impl PartialDay {
    pub fn from_slots(slots: [Option<f64>; SLOT_COUNT], last_write: Option<NaiveDateTime>) -> Self {
        Self { slots, last_write }
    }

    pub fn slot_for_hour(hour: u32) -> usize {
        (hour as usize / 3).min(SLOT_COUNT - 1)
    }

    /// Stores `temp` in the slot covering `hour`, replacing any older reading.
    pub fn record(mut self, hour: u32, temp: f64, at: NaiveDateTime) -> Self {
        self.slots[Self::slot_for_hour(hour)] = Some(temp);
        self.last_write = Some(at);
        self
    }

    /// The accumulator as seen from local `date`: slots left over from an
    /// earlier day are dropped.
    pub fn for_date(self, date: NaiveDate) -> Self {
        match self.last_write {
            Some(at) if at.date() != date => Self::cleared(),
            _ => self,
        }
    }

    pub fn slots(&self) -> &[Option<f64>; SLOT_COUNT] {
        &self.slots
    }

    pub fn last_write(&self) -> Option<NaiveDateTime> {
        self.last_write
    }

    pub fn is_complete(&self) -> bool {
        self.slots.iter().all(Option::is_some)
    }

    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(Option::is_none)
    }

    pub fn observed(&self) -> impl Iterator<Item = f64> + '_ {
        self.slots.iter().flatten().copied()
    }

    pub fn cleared() -> Self {
        Self::default()
    }
}
