use chrono::{Duration, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// Number of past daily means kept per region.
pub const HISTORY_LEN: usize = 5;

/// Most recent daily means of a region, ascending by date, distinct dates only.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HistoricalSeries {
    days: Vec<(NaiveDate, f64)>,
}

impl HistoricalSeries {
    /// Builds the series from stored rows in any order. A later row for an
    /// already seen date replaces the earlier one.
    pub fn from_rows<I>(rows: I) -> Self
    where
        I: IntoIterator<Item = (NaiveDate, f64)>,
    {
        rows.into_iter()
            .fold(Self::default(), |series, (date, mean)| series.with_day(date, mean))
    }

    /// Returns the series with `mean` recorded for `date`, evicting the oldest
    /// days once more than `HISTORY_LEN` are held.
    pub fn with_day(mut self, date: NaiveDate, mean: f64) -> Self {
        match self.days.binary_search_by_key(&date, |(d, _)| *d) {
            Ok(idx) => self.days[idx].1 = mean,
            Err(idx) => self.days.insert(idx, (date, mean)),
        }
        if self.days.len() > HISTORY_LEN {
            let excess = self.days.len() - HISTORY_LEN;
            self.days.drain(..excess);
        }
        self
    }

    pub fn days(&self) -> &[(NaiveDate, f64)] {
        &self.days
    }

    pub fn len(&self) -> usize {
        self.days.len()
    }

    pub fn is_empty(&self) -> bool {
        self.days.is_empty()
    }
}

/// Snapshot of one region for the duration of a run. Stages never mutate a
/// snapshot in place; they hand back an updated copy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Region {
    pub id: u32,
    /// Provider-side location key used in the forecast request.
    pub provider_key: String,
    /// Whole hours east of UTC. Daylight saving is not modelled.
    pub utc_offset: i32,
    pub tracking_complete: bool,
    pub history: HistoricalSeries,
    pub heating_date: Option<NaiveDate>,
    pub name: String,
    pub display_name: String,
}

impl Region {
    pub fn to_local(&self, utc: NaiveDateTime) -> NaiveDateTime {
        utc + Duration::hours(i64::from(self.utc_offset))
    }

    pub fn to_utc(&self, local: NaiveDateTime) -> NaiveDateTime {
        local - Duration::hours(i64::from(self.utc_offset))
    }

    pub fn with_history(self, history: HistoricalSeries) -> Self {
        Self { history, ..self }
    }

    pub fn with_heating_date(self, heating_date: Option<NaiveDate>) -> Self {
        Self { heating_date, ..self }
    }

    pub fn with_tracking_complete(self, tracking_complete: bool) -> Self {
        Self {
            tracking_complete,
            ..self
        }
    }
}

/// Parses offsets as stored by the region table: `UTC+3`, `UTC-5`, `+10`, `0`.
pub fn parse_utc_offset(raw: &str) -> Option<i32> {
    let trimmed = raw.trim();
    let digits = trimmed.strip_prefix("UTC").unwrap_or(trimmed).trim();
    if digits.is_empty() {
        return Some(0);
    }
    let digits = digits.strip_prefix('+').unwrap_or(digits);
    digits.parse().ok()
}

pub fn format_utc_offset(offset: i32) -> String {
    if offset < 0 {
        format!("UTC{}", offset)
    } else {
        format!("UTC+{}", offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 10, d).unwrap()
    }

    fn region(offset: i32) -> Region {
        Region {
            id: 1,
            provider_key: "524901".to_string(),
            utc_offset: offset,
            tracking_complete: false,
            history: HistoricalSeries::default(),
            heating_date: None,
            name: "Moscow".to_string(),
            display_name: "Москве".to_string(),
        }
    }

    #[test]
    fn history_never_exceeds_five_days() {
        let series =
            (1..=8).fold(HistoricalSeries::default(), |s, d| s.with_day(date(d), d as f64));
        assert_eq!(series.len(), HISTORY_LEN);
        assert_eq!(series.days()[0], (date(4), 4.0));
        assert_eq!(series.days()[4], (date(8), 8.0));
    }

    #[test]
    fn history_is_sorted_and_distinct() {
        let series = HistoricalSeries::from_rows(vec![
            (date(3), 3.0),
            (date(1), 1.0),
            (date(3), 3.5),
            (date(2), 2.0),
        ]);
        assert_eq!(series.days(), &[(date(1), 1.0), (date(2), 2.0), (date(3), 3.5)]);
    }

    #[test]
    fn local_time_round_trips_to_utc() {
        let utc = date(5).and_hms_opt(21, 0, 0).unwrap();
        for offset in [-11, -3, 0, 3, 7, 12] {
            let r = region(offset);
            assert_eq!(r.to_utc(r.to_local(utc)), utc);
        }
        assert_eq!(region(3).to_local(utc), date(6).and_hms_opt(0, 0, 0).unwrap());
    }

    #[test]
    fn utc_offsets_parse_from_stored_form() {
        assert_eq!(parse_utc_offset("UTC+3"), Some(3));
        assert_eq!(parse_utc_offset("UTC-5"), Some(-5));
        assert_eq!(parse_utc_offset("10"), Some(10));
        assert_eq!(parse_utc_offset("UTC"), Some(0));
        assert_eq!(parse_utc_offset("UTC+x"), None);
        assert_eq!(format_utc_offset(-5), "UTC-5");
        assert_eq!(parse_utc_offset(&format_utc_offset(12)), Some(12));
    }

    #[test]
    fn snapshot_updates_return_new_copies() {
        let before = region(3);
        let after = before
            .clone()
            .with_heating_date(Some(date(6)))
            .with_tracking_complete(true);

        assert_eq!(after.heating_date, Some(date(6)));
        assert!(after.tracking_complete);
        assert_eq!(before.heating_date, None);
        assert!(!before.tracking_complete);
        assert_eq!(after.history, before.history);
    }
}
