use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which way the heating is about to be switched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HeatingSwitch {
    On,
    Off,
}

impl fmt::Display for HeatingSwitch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HeatingSwitch::On => write!(f, "on"),
            HeatingSwitch::Off => write!(f, "off"),
        }
    }
}

/// Half of the heating year. March through August is warm, when the
/// heating goes off; September through February is cold, when it goes on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Season {
    Warm,
    Cold,
}

impl Season {
    pub fn from_month(month: u32) -> Self {
        if (3..=8).contains(&month) {
            Season::Warm
        } else {
            Season::Cold
        }
    }

    pub fn of(date: NaiveDate) -> Self {
        Self::from_month(date.month())
    }

    pub fn direction(self) -> HeatingSwitch {
        match self {
            Season::Warm => HeatingSwitch::Off,
            Season::Cold => HeatingSwitch::On,
        }
    }

    /// Whether a daily mean counts towards the switch.
    pub fn matches(self, mean: f64, threshold: f64) -> bool {
        match self {
            Season::Warm => mean > threshold,
            Season::Cold => mean < threshold,
        }
    }
}
