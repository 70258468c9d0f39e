use chrono::{Datelike, Local, NaiveDate, NaiveDateTime};
use log::{error, info, warn};
use std::path::PathBuf;

use crate::config::HeatcastConfig;
use crate::data_sources::{
    CallBudget, FetchOutcome, ForecastFetcher, ForecastPayload, ForecastSource,
};
use crate::error::{RunAbort, StoreError};
use crate::region::Region;
use crate::signals::{aggregate, detect, Season};
use crate::storage::RegionStore;
use crate::utils::{DiagnosticsLog, MisfireQueue};

/// Day-month pairs on which a new heating half-year starts.
const SEASON_STARTS: [(u32, u32); 2] = [(1, 4), (1, 9)];

pub fn is_season_start(date: NaiveDate) -> bool {
    SEASON_STARTS.contains(&(date.day(), date.month()))
}

#[derive(Debug, Default)]
pub struct RunSummary {
    pub visited: usize,
    pub processed: usize,
    pub detected: usize,
    pub misfired: Vec<u32>,
    pub aborted: Option<RunAbort>,
}

impl RunSummary {
    pub fn completed(&self) -> bool {
        self.aborted.is_none()
    }
}

enum RegionResult {
    Processed { detected: bool },
    Misfired,
}

pub struct RunCoordinator<S, F> {
    store: S,
    fetcher: ForecastFetcher<F>,
    budget: CallBudget,
    diagnostics: DiagnosticsLog,
    misfire_path: PathBuf,
    threshold: f64,
    streak: usize,
    clock: Box<dyn Fn() -> NaiveDateTime + Send + Sync>,
    last_reset: Option<NaiveDate>,
}

impl<S: RegionStore, F: ForecastSource> RunCoordinator<S, F> {
    pub fn new(config: &HeatcastConfig, store: S, source: F) -> Self {
        Self {
            store,
            fetcher: ForecastFetcher::new(source, config),
            budget: CallBudget::new(config.rate_limit_ceiling, config.rate_limit_cooldown),
            diagnostics: DiagnosticsLog::new(&config.errors_file),
            misfire_path: PathBuf::from(&config.misfire_file),
            threshold: config.heating_threshold,
            streak: config.heating_streak,
            clock: Box::new(|| Local::now().naive_local()),
            last_reset: None,
        }
    }

    /// Replaces the wall clock, for deterministic runs.
    pub fn with_clock(mut self, clock: impl Fn() -> NaiveDateTime + Send + Sync + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// On the first day of either heating half-year every region is tracked
    /// again. Runs at most once per calendar day.
    pub fn reset_if_season_start(&mut self) -> Result<bool, StoreError> {
        let today = (self.clock)().date();
        if !is_season_start(today) || self.last_reset == Some(today) {
            return Ok(false);
        }
        let touched = self.store.reset_tracking()?;
        self.last_reset = Some(today);
        info!("Season starts on {}: tracking reset for {} regions", today, touched);
        Ok(true)
    }

    /// Pending misfires if any, otherwise every region.
    fn iteration_set(&self) -> Result<(Vec<u32>, bool), RunAbort> {
        let queue = MisfireQueue::load(&self.misfire_path).unwrap_or_else(|e| {
            warn!("Could not read {}: {}", self.misfire_path.display(), e);
            MisfireQueue::default()
        });
        if !queue.is_empty() {
            info!("Retrying {} misfired regions", queue.len());
            return Ok((queue.ids(), true));
        }
        let ids = self
            .store
            .region_ids()
            .map_err(|source| RunAbort::Storage { region: 0, source })?;
        Ok((ids, false))
    }

    pub async fn run(&mut self) -> RunSummary {
        let mut summary = RunSummary::default();
        let (ids, from_queue) = match self.iteration_set() {
            Ok(set) => set,
            Err(abort) => {
                error!("Run aborted before start: {}", abort);
                summary.aborted = Some(abort);
                return summary;
            }
        };
        info!("Processing {} regions", ids.len());

        let mut misfires = MisfireQueue::default();
        for (idx, &id) in ids.iter().enumerate() {
            info!("Region {} ({}/{})", id, idx + 1, ids.len());
            summary.visited += 1;
            match self.process_region(id).await {
                Ok(RegionResult::Processed { detected }) => {
                    summary.processed += 1;
                    if detected {
                        summary.detected += 1;
                    }
                    info!("region {} completed successfully", id);
                }
                Ok(RegionResult::Misfired) => {
                    info!("{} misfired", id);
                    misfires.push(id);
                }
                Err(abort) => {
                    error!("Run aborted at region {}: {}", id, abort);
                    if from_queue {
                        // unresolved misfires stay queued
                        ids[idx..].iter().for_each(|&rest| misfires.push(rest));
                    }
                    summary.aborted = Some(abort);
                    break;
                }
            }
        }

        summary.misfired = misfires.ids();
        if let Err(e) = misfires.save(&self.misfire_path) {
            error!("Error writing {}: {}", self.misfire_path.display(), e);
        }
        info!(
            "Run finished: {} visited, {} processed, {} heating dates, {} misfired, {} API calls",
            summary.visited,
            summary.processed,
            summary.detected,
            summary.misfired.len(),
            self.budget.total_calls()
        );
        summary
    }

    async fn process_region(&mut self, id: u32) -> Result<RegionResult, RunAbort> {
        let region = self.store.load_region(id).map_err(|e| self.storage_abort(id, e))?;

        match self.fetcher.fetch(&mut self.budget, &region).await {
            FetchOutcome::Success(payload) => self.apply_forecast(region, payload),
            FetchOutcome::NotFound => Ok(RegionResult::Misfired),
            FetchOutcome::Rejected { code, message } => {
                self.diagnostics
                    .record_rejection(id, &code, &message, (self.clock)());
                Err(RunAbort::Rejected {
                    region: id,
                    code,
                    message,
                })
            }
            FetchOutcome::Exhausted { attempts } => {
                self.diagnostics
                    .record_exhausted(id, attempts, (self.clock)());
                Err(RunAbort::Exhausted {
                    region: id,
                    attempts,
                })
            }
        }
    }

    fn apply_forecast(
        &self,
        region: Region,
        payload: ForecastPayload,
    ) -> Result<RegionResult, RunAbort> {
        let id = region.id;
        let now = (self.clock)();
        let abort = |e: StoreError| self.storage_abort(id, e);

        let partial_day = self.store.load_partial_day(id).map_err(abort)?;
        let Some(aggregation) = aggregate(&region, partial_day, &payload.samples) else {
            return Ok(RegionResult::Misfired);
        };

        if let Some((date, mean)) = aggregation.history_entry {
            self.store.append_history(id, date, mean, now).map_err(abort)?;
        }
        self.store
            .save_partial_day(id, &aggregation.partial_day)
            .map_err(abort)?;

        let blended = aggregation.blend(&region.history);
        self.store.save_graph(id, &blended, now).map_err(abort)?;
        let region = aggregation.apply_to(region);

        if region.tracking_complete {
            info!("Region {} already switched, detection skipped", id);
            return Ok(RegionResult::Processed { detected: false });
        }

        let today = now.date();
        let region = region.with_heating_date(detect(
            &blended,
            Season::of(today),
            self.threshold,
            self.streak,
        ));
        self.store
            .save_heating_date(id, region.heating_date)
            .map_err(abort)?;

        let switches_today = region.heating_date == Some(today);
        let region = region.with_tracking_complete(switches_today);
        if region.tracking_complete {
            info!("Region {} switches today, tracking complete", id);
            self.store.set_tracking_complete(id, true).map_err(abort)?;
        }
        Ok(RegionResult::Processed {
            detected: region.heating_date.is_some(),
        })
    }

    fn storage_abort(&self, region: u32, source: StoreError) -> RunAbort {
        self.diagnostics
            .record_storage_failure(region, &source, (self.clock)());
        RunAbort::Storage { region, source }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_sources::forecast_fetcher::fake::ScriptedSource;
    use crate::region::PartialDay;
    use crate::storage::{NewRegion, SqliteStore};
    use chrono::Duration;
    use tempfile::TempDir;

    fn at(y: i32, m: u32, d: u32, h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, 0, 0)
            .unwrap()
    }

    /// Forty three-hour samples starting at `start` (UTC), all at `temp`.
    fn forecast_body(start: NaiveDateTime, temp: f64) -> String {
        let list: Vec<serde_json::Value> = (0..40)
            .map(|i| {
                let ts = start + Duration::hours(3 * i);
                serde_json::json!({
                    "dt": ts.and_utc().timestamp(),
                    "main": {"temp": temp},
                    "dt_txt": ts.format("%Y-%m-%d %H:%M:%S").to_string(),
                })
            })
            .collect();
        serde_json::json!({"cod": "200", "message": 0, "cnt": 40, "list": list}).to_string()
    }

    fn not_found() -> String {
        r#"{"cod":"404","message":"city not found"}"#.to_string()
    }

    struct Harness {
        dir: TempDir,
        config: HeatcastConfig,
    }

    impl Harness {
        fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            let mut config = HeatcastConfig::for_tests();
            config.misfire_file = dir.path().join("misfired.txt").display().to_string();
            config.errors_file = dir.path().join("errors.txt").display().to_string();
            Self { dir, config }
        }

        fn store(&self, regions: u32) -> SqliteStore {
            let store = SqliteStore::open_in_memory().unwrap();
            for id in 1..=regions {
                store
                    .upsert_region(&NewRegion {
                        id,
                        provider_key: format!("key{}", id),
                        utc_offset: 0,
                        name: format!("Region {}", id),
                        display_name: format!("Регионе {}", id),
                    })
                    .unwrap();
            }
            store
        }

        fn coordinator(
            &self,
            store: SqliteStore,
            source: ScriptedSource,
            now: NaiveDateTime,
        ) -> RunCoordinator<SqliteStore, ScriptedSource> {
            RunCoordinator::new(&self.config, store, source).with_clock(move || now)
        }

        fn misfire_file(&self) -> String {
            std::fs::read_to_string(self.dir.path().join("misfired.txt")).unwrap()
        }

        fn errors_file(&self) -> String {
            std::fs::read_to_string(self.dir.path().join("errors.txt")).unwrap_or_default()
        }
    }

    #[tokio::test]
    async fn processes_regions_and_queues_misfires() {
        let h = Harness::new();
        let now = at(2024, 10, 5, 12);
        let source = ScriptedSource::default()
            .reply("key1", Ok(forecast_body(now, 12.0)))
            .reply("key2", Ok(not_found()))
            .reply("key3", Ok(forecast_body(now, 12.0)));
        let mut coordinator = h.coordinator(h.store(3), source, now);

        let summary = coordinator.run().await;
        assert!(summary.completed());
        assert_eq!(summary.processed, 2);
        assert_eq!(summary.misfired, vec![2]);
        assert_eq!(h.misfire_file(), "2\n");

        let store = coordinator.store();
        let graph = store.load_graph(1).unwrap();
        // today plus four complete future days, no history yet
        assert_eq!(graph.len(), 5);
        assert_eq!(graph[0], (now.date(), 12.0));
        assert_eq!(store.load_partial_day(1).unwrap().slots()[4], Some(12.0));
        assert!(store.load_partial_day(2).unwrap().is_empty());
        // warm days in October never switch the heating on
        assert_eq!(store.load_region(1).unwrap().heating_date, None);
    }

    #[tokio::test]
    async fn misfire_queue_replaces_full_range_until_resolved() {
        let h = Harness::new();
        let now = at(2024, 10, 5, 12);
        std::fs::write(h.dir.path().join("misfired.txt"), "2\n").unwrap();

        let source = ScriptedSource::default()
            .reply("key1", Ok(forecast_body(now, 1.0)))
            .reply("key2", Ok(not_found()));
        let mut coordinator = h.coordinator(h.store(3), source, now);

        for _ in 0..2 {
            let summary = coordinator.run().await;
            assert_eq!(summary.visited, 1);
            assert_eq!(summary.misfired, vec![2]);
            assert_eq!(h.misfire_file(), "2\n");
        }
        assert_eq!(coordinator.fetcher_calls(), vec!["key2", "key2"]);

        // once data arrives the queue empties and the full range resumes
        let source = ScriptedSource::default()
            .reply("key1", Ok(forecast_body(now, 1.0)))
            .reply("key2", Ok(forecast_body(now, 1.0)))
            .reply("key3", Ok(forecast_body(now, 1.0)));
        let mut coordinator = h.coordinator(h.store(3), source, now);
        assert_eq!(coordinator.run().await.misfired, Vec::<u32>::new());
        assert_eq!(h.misfire_file(), "");
        assert_eq!(coordinator.run().await.visited, 3);
    }

    #[tokio::test]
    async fn quota_failure_aborts_the_batch() {
        let h = Harness::new();
        let now = at(2024, 10, 5, 12);
        let source = ScriptedSource::default()
            .reply("key1", Ok(not_found()))
            .reply("key2", Ok(r#"{"cod":429,"message":"Too many requests"}"#.into()))
            .reply("key3", Ok(forecast_body(now, 1.0)));
        let mut coordinator = h.coordinator(h.store(3), source, now);

        let summary = coordinator.run().await;
        assert!(matches!(
            summary.aborted,
            Some(RunAbort::Rejected { region: 2, ref code, .. }) if code == "429"
        ));
        assert_eq!(coordinator.fetcher_calls(), vec!["key1", "key2"]);
        assert_eq!(h.misfire_file(), "1\n");
        assert_eq!(
            h.errors_file(),
            "Region 2, error code 429: message Too many requests time 2024-10-05 12:00:00\n"
        );
    }

    #[tokio::test]
    async fn unreachable_provider_aborts_after_retries() {
        let h = Harness::new();
        let now = at(2024, 10, 5, 12);
        let source = ScriptedSource::default().reply("key1", Err("connection refused".into()));
        let mut coordinator = h.coordinator(h.store(2), source, now);

        let summary = coordinator.run().await;
        assert!(matches!(
            summary.aborted,
            Some(RunAbort::Exhausted {
                region: 1,
                attempts: 4
            })
        ));
        assert_eq!(summary.processed, 0);
        assert_eq!(coordinator.fetcher_calls().len(), 4);
        assert!(h
            .errors_file()
            .starts_with("Region 1, server is not responding after 4 attempts."));
    }

    #[tokio::test]
    async fn aborted_queue_run_keeps_unvisited_misfires() {
        let h = Harness::new();
        let now = at(2024, 10, 5, 12);
        std::fs::write(h.dir.path().join("misfired.txt"), "1\n2\n3\n").unwrap();
        let source = ScriptedSource::default()
            .reply("key1", Ok(forecast_body(now, 1.0)))
            .reply("key2", Ok(r#"{"cod":401,"message":"Invalid API key"}"#.into()));
        let mut coordinator = h.coordinator(h.store(3), source, now);

        coordinator.run().await;
        assert_eq!(h.misfire_file(), "2\n3\n");
    }

    #[tokio::test]
    async fn detection_marks_tracking_complete_on_the_day() {
        let h = Harness::new();
        let now = at(2024, 10, 5, 12);
        let store = h.store(1);
        // five cold days ending yesterday
        for d in 0..5 {
            let date = at(2024, 9, 30, 0).date() + Duration::days(d);
            store.append_history(1, date, 3.0, now).unwrap();
        }
        let source = ScriptedSource::default().reply("key1", Ok(forecast_body(now, 15.0)));
        let mut coordinator = h.coordinator(store, source, now);

        let summary = coordinator.run().await;
        assert_eq!(summary.detected, 1);
        let region = coordinator.store().load_region(1).unwrap();
        assert_eq!(region.heating_date, Some(now.date()));
        assert!(region.tracking_complete);
        assert_eq!(coordinator.store().load_graph(1).unwrap().len(), 10);
    }

    #[tokio::test]
    async fn completed_regions_skip_detection() {
        let h = Harness::new();
        let now = at(2024, 10, 5, 12);
        let store = h.store(1);
        store.save_heating_date(1, Some(now.date())).unwrap();
        store.set_tracking_complete(1, true).unwrap();
        let source = ScriptedSource::default().reply("key1", Ok(forecast_body(now, 15.0)));
        let mut coordinator = h.coordinator(store, source, now);

        coordinator.run().await;
        let region = coordinator.store().load_region(1).unwrap();
        assert_eq!(region.heating_date, Some(now.date()));
        // the forecast is still folded in
        assert_eq!(coordinator.store().load_graph(1).unwrap().len(), 5);
    }

    #[tokio::test]
    async fn closing_run_moves_full_day_into_history() {
        let h = Harness::new();
        let now = at(2024, 10, 5, 21);
        let store = h.store(1);
        let partial = (0..7).fold(PartialDay::default(), |d, i| d.record(i * 3, 4.0, now));
        store.save_partial_day(1, &partial).unwrap();
        let source = ScriptedSource::default().reply("key1", Ok(forecast_body(now, 6.0)));
        let mut coordinator = h.coordinator(store, source, now);

        coordinator.run().await;
        let store = coordinator.store();
        assert!(store.load_partial_day(1).unwrap().is_empty());
        assert_eq!(store.load_region(1).unwrap().history.days(), &[(now.date(), 4.25)]);
    }

    #[test]
    fn season_reset_runs_once_per_day() {
        let h = Harness::new();
        let store = h.store(2);
        store.set_tracking_complete(1, true).unwrap();
        store.set_tracking_complete(2, true).unwrap();

        let mut coordinator = h.coordinator(store, ScriptedSource::default(), at(2024, 9, 1, 23));
        assert!(coordinator.reset_if_season_start().unwrap());
        assert!(!coordinator.store().load_region(1).unwrap().tracking_complete);

        coordinator.store().set_tracking_complete(1, true).unwrap();
        assert!(!coordinator.reset_if_season_start().unwrap());
        assert!(coordinator.store().load_region(1).unwrap().tracking_complete);
    }

    #[test]
    fn season_start_dates() {
        assert!(is_season_start(at(2025, 4, 1, 0).date()));
        assert!(is_season_start(at(2025, 9, 1, 0).date()));
        assert!(!is_season_start(at(2025, 1, 4, 0).date()));
        assert!(!is_season_start(at(2025, 9, 2, 0).date()));
    }

    impl RunCoordinator<SqliteStore, ScriptedSource> {
        fn fetcher_calls(&self) -> Vec<String> {
            self.fetcher.source().calls()
        }
    }
}
