pub mod partial_day;
pub mod state;

pub use partial_day::{PartialDay, SLOT_COUNT};
pub use state::{format_utc_offset, parse_utc_offset, HistoricalSeries, Region, HISTORY_LEN};
