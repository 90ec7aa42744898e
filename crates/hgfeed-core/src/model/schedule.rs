// ── Feeding schedule domain types ──

use std::fmt;

use chrono::{NaiveTime, Timelike, Weekday};
use serde::{Deserialize, Serialize};

/// Server-assigned identifier of a schedule slot.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScheduleId(String);

impl ScheduleId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ScheduleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ScheduleId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// Days a schedule fires on. Bit 0 is Monday, bit 6 is Sunday.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WeekdayMask(u8);

impl WeekdayMask {
    pub const EVERY_DAY: Self = Self(0x7f);
    pub const WEEKDAYS: Self = Self(0x1f);
    pub const WEEKENDS: Self = Self(0x60);

    pub const fn from_bits(bits: u8) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub fn from_days(days: impl IntoIterator<Item = Weekday>) -> Self {
        Self(
            days.into_iter()
                .fold(0, |mask, day| mask | 1 << day.num_days_from_monday()),
        )
    }

    pub fn contains(self, day: Weekday) -> bool {
        self.0 & (1 << day.num_days_from_monday()) != 0
    }

    /// At least one day set and nothing above Sunday.
    pub fn is_valid(self) -> bool {
        self.0 != 0 && self.0 & !Self::EVERY_DAY.0 == 0
    }
}

impl Default for WeekdayMask {
    fn default() -> Self {
        Self::EVERY_DAY
    }
}

impl fmt::Display for WeekdayMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == Self::EVERY_DAY {
            return f.write_str("daily");
        }
        let names: Vec<&str> = [
            Weekday::Mon,
            Weekday::Tue,
            Weekday::Wed,
            Weekday::Thu,
            Weekday::Fri,
            Weekday::Sat,
            Weekday::Sun,
        ]
        .into_iter()
        .filter(|d| self.contains(*d))
        .map(|d| match d {
            Weekday::Mon => "mon",
            Weekday::Tue => "tue",
            Weekday::Wed => "wed",
            Weekday::Thu => "thu",
            Weekday::Fri => "fri",
            Weekday::Sat => "sat",
            Weekday::Sun => "sun",
        })
        .collect();
        f.write_str(&names.join(","))
    }
}

/// A feeding plan stored on the device. `time_of_day` is UTC.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleEntry {
    pub id: ScheduleId,
    pub time_of_day: NaiveTime,
    pub portions: u8,
    pub enabled: bool,
    pub weekday_mask: WeekdayMask,
}

/// A schedule the caller wants stored. `id: None` creates a new slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleDraft {
    pub id: Option<ScheduleId>,
    pub time_of_day: NaiveTime,
    pub portions: u8,
    pub enabled: bool,
    pub weekday_mask: WeekdayMask,
}

impl ScheduleDraft {
    /// An enabled, every-day draft for a new slot.
    pub fn new(time_of_day: NaiveTime, portions: u8) -> Self {
        Self {
            id: None,
            time_of_day,
            portions,
            enabled: true,
            weekday_mask: WeekdayMask::EVERY_DAY,
        }
    }

    /// Target an existing slot.
    pub fn for_slot(mut self, id: ScheduleId) -> Self {
        self.id = Some(id);
        self
    }

    /// Draft that rewrites `entry` unchanged.
    pub fn from_entry(entry: &ScheduleEntry) -> Self {
        Self {
            id: Some(entry.id.clone()),
            time_of_day: entry.time_of_day,
            portions: entry.portions,
            enabled: entry.enabled,
            weekday_mask: entry.weekday_mask,
        }
    }

    /// Whether a stored entry carries every field of this draft.
    /// The id is only compared when the draft names one.
    pub fn matches(&self, entry: &ScheduleEntry) -> bool {
        self.id.as_ref().is_none_or(|id| *id == entry.id)
            && self.time_of_day == entry.time_of_day
            && self.portions == entry.portions
            && self.enabled == entry.enabled
            && self.weekday_mask == entry.weekday_mask
    }

    /// The device stores hour and minute only.
    pub fn has_minute_precision(&self) -> bool {
        self.time_of_day.second() == 0 && self.time_of_day.nanosecond() == 0
    }
}
