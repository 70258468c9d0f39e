use chrono::NaiveDate;
use log::{debug, info};

use super::aggregator::BlendedSeries;
use super::season::Season;

/// Finds the day after the `streak`-th matching day of the series.
///
/// The counter is cumulative: a non-matching day does not reset it, so five
/// matching days anywhere in the series are enough.
pub fn detect(
    series: &BlendedSeries,
    season: Season,
    threshold: f64,
    streak: usize,
) -> Option<NaiveDate> {
    let mut matched = 0;
    for (date, mean) in series {
        if season.matches(*mean, threshold) {
            matched += 1;
            debug!("  {} ({:.2}) matches, count {}", date, mean, matched);
            if matched == streak {
                let heating_date = date.succ_opt()?;
                info!(
                    "Heating switches {} on {} ({} days past {:.1}°C)",
                    season.direction(),
                    heating_date,
                    streak,
                    threshold
                );
                return Some(heating_date);
            }
        }
    }
    None
}
