use chrono::{Duration, NaiveDate, NaiveDateTime, Timelike};
use log::{debug, info, warn};
use std::collections::BTreeMap;

use crate::data_sources::ForecastSample;
use crate::region::{HistoricalSeries, PartialDay, Region, SLOT_COUNT};

/// Date-keyed daily means in chronological order.
pub type BlendedSeries = BTreeMap<NaiveDate, f64>;

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

/// Result of folding one forecast into a region's daily picture.
#[derive(Debug, Clone, PartialEq)]
pub struct Aggregation {
    /// Local calendar date of the first forecast sample.
    pub today: NaiveDate,
    /// The first sample is the last three-hour interval of `today`.
    pub closing: bool,
    /// 0.0 when a closing day had unobserved intervals.
    pub same_day_mean: f64,
    /// Set when a closing day was complete and becomes history.
    pub history_entry: Option<(NaiveDate, f64)>,
    /// Means of later days that the forecast covers completely.
    pub future_means: BTreeMap<NaiveDate, f64>,
    /// Accumulator state to persist for the next run.
    pub partial_day: PartialDay,
}

impl Aggregation {
    /// Historical days as loaded for this run, then today, then future days.
    pub fn blend(&self, history: &HistoricalSeries) -> BlendedSeries {
        let mut blended: BlendedSeries = history.days().iter().copied().collect();
        blended.insert(self.today, self.same_day_mean);
        blended.extend(self.future_means.iter().map(|(d, m)| (*d, *m)));
        blended
    }

    /// Region snapshot with a completed day appended to its history.
    pub fn apply_to(&self, region: Region) -> Region {
        match self.history_entry {
            Some((date, mean)) => {
                let history = region.history.clone().with_day(date, mean);
                region.with_history(history)
            }
            None => region,
        }
    }
}

pub fn local_samples(region: &Region, samples: &[ForecastSample]) -> Vec<(NaiveDateTime, f64)> {
    samples
        .iter()
        .map(|s| (region.to_local(s.utc), s.temp))
        .collect()
}

/// True when the next three-hour step after `first` falls on another date.
pub fn is_closing_interval(first: NaiveDateTime) -> bool {
    (first + Duration::hours(3)).date() != first.date()
}

/// Means of dates after `today` with exactly eight samples, ascending.
pub fn future_means(
    local: &[(NaiveDateTime, f64)],
    today: NaiveDate,
) -> BTreeMap<NaiveDate, f64> {
    let mut by_date: BTreeMap<NaiveDate, Vec<f64>> = BTreeMap::new();
    for (at, temp) in local {
        if at.date() > today {
            by_date.entry(at.date()).or_default().push(*temp);
        }
    }
    by_date
        .into_iter()
        .filter(|(_, temps)| temps.len() == SLOT_COUNT)
        .filter_map(|(date, temps)| mean(&temps).map(|m| (date, round2(m))))
        .collect()
}

/// Folds a forecast into the region's partial day and computes the same-day
/// and future-day means. Slots stored for an earlier local day are discarded
/// before the first sample is recorded.
///
/// Returns `None` for an empty forecast.
pub fn aggregate(
    region: &Region,
    partial_day: PartialDay,
    samples: &[ForecastSample],
) -> Option<Aggregation> {
    let local = local_samples(region, samples);
    let &(first_at, first_temp) = local.first()?;
    let today = first_at.date();
    let closing = is_closing_interval(first_at);

    if !partial_day.is_empty() && partial_day.for_date(today).is_empty() {
        warn!(
            "Region {}: dropping intervals left over from before {}",
            region.id, today
        );
    }
    let partial_day = partial_day
        .for_date(today)
        .record(first_at.hour(), first_temp, first_at);
    debug!(
        "Region {}: recorded {:.2} for {} ({} intervals observed)",
        region.id,
        first_temp,
        first_at,
        partial_day.observed().count()
    );

    let (same_day_mean, history_entry, partial_day) = if closing {
        if partial_day.is_complete() {
            let observed: Vec<f64> = partial_day.observed().collect();
            let day_mean = mean(&observed).map(round2).unwrap_or_default();
            info!("Region {}: closing {} with mean {:.2}", region.id, today, day_mean);
            (day_mean, Some((today, day_mean)), PartialDay::cleared())
        } else {
            warn!(
                "Region {}: {} closed with {}/{} intervals observed, no mean recorded",
                region.id,
                today,
                partial_day.observed().count(),
                SLOT_COUNT
            );
            (0.0, None, PartialDay::cleared())
        }
    } else {
        let mut blended: Vec<f64> = partial_day.observed().collect();
        blended.extend(
            local
                .iter()
                .filter(|(at, _)| at.date() == today)
                .map(|(_, temp)| *temp),
        );
        let day_mean = mean(&blended).map(round2).unwrap_or_default();
        (day_mean, None, partial_day)
    };

    Some(Aggregation {
        today,
        closing,
        same_day_mean,
        history_entry,
        future_means: future_means(&local, today),
        partial_day,
    })
}
