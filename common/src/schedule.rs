use chrono::{NaiveTime, Timelike};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

const MINUTES_PER_DAY: u16 = 24 * 60;

/// Daily window `[begin, end)` during which the valve may be opened.
///
/// A window whose end precedes its begin wraps past midnight. A window with
/// identical begin and end is empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleWindow {
    #[serde(rename = "beginHour")]
    pub begin_hour: u8,
    #[serde(rename = "beginMinute")]
    pub begin_minute: u8,
    #[serde(rename = "endHour")]
    pub end_hour: u8,
    #[serde(rename = "endMinute")]
    pub end_minute: u8,
}

impl Default for ScheduleWindow {
    fn default() -> Self {
        Self {
            begin_hour: 6,
            begin_minute: 0,
            end_hour: 23,
            end_minute: 0,
        }
    }
}

impl ScheduleWindow {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.begin_hour > 23 {
            return Err(ConfigError::out_of_range("beginHour", "must be 0-23"));
        }
        if self.end_hour > 23 {
            return Err(ConfigError::out_of_range("endHour", "must be 0-23"));
        }
        if self.begin_minute > 59 {
            return Err(ConfigError::out_of_range("beginMinute", "must be 0-59"));
        }
        if self.end_minute > 59 {
            return Err(ConfigError::out_of_range("endMinute", "must be 0-59"));
        }
        Ok(())
    }

    pub fn begin_minutes(&self) -> u16 {
        self.begin_hour as u16 * 60 + self.begin_minute as u16
    }

    pub fn end_minutes(&self) -> u16 {
        self.end_hour as u16 * 60 + self.end_minute as u16
    }

    pub fn contains(&self, time: NaiveTime) -> bool {
        let now = (time.hour() * 60 + time.minute()) as u16 % MINUTES_PER_DAY;
        let begin = self.begin_minutes();
        let end = self.end_minutes();

        if begin <= end {
            (begin..end).contains(&now)
        } else {
            now >= begin || now < end
        }
    }
}
