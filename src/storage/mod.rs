//! Persistence contract for region state.

pub mod sqlite_store;

pub use sqlite_store::SqliteStore;

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::error::StoreResult;
use crate::region::{PartialDay, Region};
use crate::signals::BlendedSeries;

/// Entries kept in the graph record.
pub const GRAPH_LEN: usize = 10;

/// Operator-supplied description of a region.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewRegion {
    pub id: u32,
    pub provider_key: String,
    pub utc_offset: i32,
    pub name: String,
    pub display_name: String,
}

/// Stored outcome for one region, as served to readers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionSummary {
    pub id: u32,
    pub name: String,
    pub display_name: String,
    pub heating_date: Option<NaiveDate>,
    pub heating_date_display: Option<String>,
    pub tracking_complete: bool,
}

pub trait RegionStore {
    /// Every region id in ascending order.
    fn region_ids(&self) -> StoreResult<Vec<u32>>;

    /// Region with its five most recent historical days.
    fn load_region(&self, id: u32) -> StoreResult<Region>;

    fn append_history(
        &self,
        id: u32,
        date: NaiveDate,
        mean: f64,
        written_at: NaiveDateTime,
    ) -> StoreResult<()>;

    fn load_partial_day(&self, id: u32) -> StoreResult<PartialDay>;

    fn save_partial_day(&self, id: u32, partial_day: &PartialDay) -> StoreResult<()>;

    /// Overwrites the graph record with the first `GRAPH_LEN` entries of `series`.
    fn save_graph(&self, id: u32, series: &BlendedSeries, written_at: NaiveDateTime)
        -> StoreResult<()>;

    fn load_graph(&self, id: u32) -> StoreResult<Vec<(NaiveDate, f64)>>;

    /// Stores the heating date together with its display form, or clears both.
    fn save_heating_date(&self, id: u32, heating_date: Option<NaiveDate>) -> StoreResult<()>;

    fn set_tracking_complete(&self, id: u32, complete: bool) -> StoreResult<()>;

    /// Marks every region as tracked again. Returns the number of regions touched.
    fn reset_tracking(&self) -> StoreResult<usize>;

    fn list_regions(&self) -> StoreResult<Vec<RegionSummary>>;

    fn upsert_region(&self, region: &NewRegion) -> StoreResult<()>;
}
