//! Session classification from the UTC clock, used when the feed omits it.

use chrono::{DateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};
use signal_core::Session;

/// Half-open `[start_hour, end_hour)` UTC window. Wraps past midnight when
/// `start_hour > end_hour`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HourWindow {
    pub start_hour: u32,
    pub end_hour: u32,
}

impl HourWindow {
    pub const fn new(start_hour: u32, end_hour: u32) -> Self {
        Self {
            start_hour,
            end_hour,
        }
    }

    pub fn contains(&self, hour: u32) -> bool {
        if self.start_hour <= self.end_hour {
            hour >= self.start_hour && hour < self.end_hour
        } else {
            hour >= self.start_hour || hour < self.end_hour
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionClock {
    pub london: HourWindow,
    pub new_york: HourWindow,
    pub asian: HourWindow,
}

impl Default for SessionClock {
    fn default() -> Self {
        Self {
            london: HourWindow::new(7, 16),
            new_york: HourWindow::new(12, 21),
            asian: HourWindow::new(23, 8),
        }
    }
}

impl SessionClock {
    /// First match in London, New York, Asian order; the London/NY overlap
    /// therefore reports London.
    pub fn classify(&self, at: DateTime<Utc>) -> Session {
        let hour = at.hour();
        [
            (Session::London, self.london),
            (Session::NewYork, self.new_york),
            (Session::Asian, self.asian),
        ]
        .into_iter()
        .find(|(_, window)| window.contains(hour))
        .map(|(session, _)| session)
        .unwrap_or(Session::Other)
    }
}
