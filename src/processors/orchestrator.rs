use crate::client::{FetchParams, FetchRequest, WeatherFetcher};
use crate::error::{IngestError, Result};
use crate::models::{Location, Mode, ObservationRecord, PartitionKey, PartitionRow, TriggerPayload};
use crate::processors::data_merger::DataMerger;
use crate::processors::normalizer::{NormalizeContext, RecordNormalizer};
use crate::processors::partition_router::PartitionRouter;
use crate::storage::StorageGateway;
use crate::utils::constants::{
    DEFAULT_FORECAST_HOURS, DEFAULT_MAX_CONFLICT_RETRIES, DEFAULT_REQUEST_SPACING_MS,
    DEFAULT_UTC_OFFSET_HOURS,
};
use crate::utils::progress::ProgressReporter;
use crate::utils::timestamps::{acquisition_instant, Clock, SystemClock};
use chrono::{Days, FixedOffset, NaiveDate, Offset, Utc};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};
use validator::Validate;

/// What the orchestrator needs from the settings
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub mode: Mode,
    pub forecast_hours: u32,
    /// Minimum gap between the start of consecutive API requests
    pub request_spacing: Duration,
    pub max_conflict_retries: u32,
    pub utc_offset: FixedOffset,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            mode: Mode::Forecast,
            forecast_hours: DEFAULT_FORECAST_HOURS,
            request_spacing: Duration::from_millis(DEFAULT_REQUEST_SPACING_MS),
            max_conflict_retries: DEFAULT_MAX_CONFLICT_RETRIES,
            utc_offset: FixedOffset::east_opt(DEFAULT_UTC_OFFSET_HOURS * 3600)
                .unwrap_or_else(|| Utc.fix()),
        }
    }
}

impl PipelineConfig {
    pub fn with_mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_request_spacing(mut self, spacing: Duration) -> Self {
        self.request_spacing = spacing;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LocationState {
    Pending,
    Fetching,
    Normalizing,
    Merging { completed: usize, total: usize },
    Done,
    Failed,
}

impl fmt::Display for LocationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LocationState::Pending => write!(f, "PENDING"),
            LocationState::Fetching => write!(f, "FETCHING"),
            LocationState::Normalizing => write!(f, "NORMALIZING"),
            LocationState::Merging { completed, total } => {
                write!(f, "MERGING({}/{})", completed, total)
            }
            LocationState::Done => write!(f, "DONE"),
            LocationState::Failed => write!(f, "FAILED"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LocationReport {
    pub point_name: String,
    pub state: LocationState,
    pub fetched_records: usize,
    pub malformed_records: usize,
    pub partitions_written: usize,
    pub partitions_unchanged: usize,
    pub rows_appended: usize,
    /// HTTP status of a failed upstream fetch, when it carried one
    pub upstream_status: Option<u16>,
    pub errors: Vec<String>,
}

impl LocationReport {
    fn new(point_name: &str) -> Self {
        Self {
            point_name: point_name.to_string(),
            state: LocationState::Pending,
            fetched_records: 0,
            malformed_records: 0,
            partitions_written: 0,
            partitions_unchanged: 0,
            rows_appended: 0,
            upstream_status: None,
            errors: Vec::new(),
        }
    }

    fn transition(&mut self, state: LocationState) {
        debug!(point = %self.point_name, from = %self.state, to = %state, "Location state change");
        self.state = state;
    }

    fn fail(&mut self, err: &IngestError) {
        error!(point = %self.point_name, "{}", error_chain(err));
        self.errors.push(error_chain(err));
        self.transition(LocationState::Failed);
    }

    pub fn is_failed(&self) -> bool {
        self.state == LocationState::Failed
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RunStatus {
    Completed,
    CompletedWithErrors,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub mode: Mode,
    pub status: RunStatus,
    pub locations: Vec<LocationReport>,
}

impl RunReport {
    pub fn failed(&self) -> usize {
        self.locations.iter().filter(|l| l.is_failed()).count()
    }

    pub fn rows_appended(&self) -> usize {
        self.locations.iter().map(|l| l.rows_appended).sum()
    }

    pub fn summary(&self) -> String {
        let written: usize = self.locations.iter().map(|l| l.partitions_written).sum();
        let unchanged: usize = self.locations.iter().map(|l| l.partitions_unchanged).sum();
        format!(
            "{} run: {} location(s), {} failed; {} row(s) appended, \
             {} partition(s) written, {} unchanged",
            self.mode,
            self.locations.len(),
            self.failed(),
            self.rows_appended(),
            written,
            unchanged
        )
    }

    /// `Err(RunCompletedWithErrors)` when any location failed
    pub fn into_result(self) -> Result<Self> {
        match self.status {
            RunStatus::Completed => Ok(self),
            RunStatus::CompletedWithErrors => Err(IngestError::RunCompletedWithErrors {
                failed: self.failed(),
                total: self.locations.len(),
            }),
        }
    }
}

enum PartitionOutcome {
    Written { appended: usize },
    Unchanged,
}

/// Drives fetch → normalize → route → merge → write for each location
pub struct FetchOrchestrator<F: WeatherFetcher> {
    config: PipelineConfig,
    fetcher: F,
    gateway: StorageGateway,
    normalizer: RecordNormalizer,
    router: PartitionRouter,
    merger: DataMerger,
    clock: Arc<dyn Clock>,
}

impl<F: WeatherFetcher> FetchOrchestrator<F> {
    pub fn new(config: PipelineConfig, fetcher: F, gateway: StorageGateway) -> Self {
        let router = PartitionRouter::for_mode(config.mode);
        Self {
            config,
            fetcher,
            gateway,
            normalizer: RecordNormalizer::new(),
            router,
            merger: DataMerger::new(),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn gateway(&self) -> &StorageGateway {
        &self.gateway
    }

    /// Process every location of the trigger in order.
    ///
    /// An invalid payload fails before anything is fetched; after that,
    /// failures are confined to their location and reported.
    pub async fn run(
        &self,
        payload: &TriggerPayload,
        progress: Option<&ProgressReporter>,
    ) -> Result<RunReport> {
        payload.validate()?;
        if self.gateway.mode() != self.config.mode {
            return Err(IngestError::Config(format!(
                "storage gateway is configured for {} but the pipeline runs {}",
                self.gateway.mode(),
                self.config.mode
            )));
        }

        let target_date = payload.date.unwrap_or_else(|| self.today());
        info!(
            mode = %self.config.mode,
            locations = payload.locations.len(),
            target_date = %target_date,
            "Starting run"
        );

        let mut reports = Vec::with_capacity(payload.locations.len());
        let mut last_request: Option<Instant> = None;

        for location in &payload.locations {
            if let Some(progress) = progress {
                progress.set_message(&format!("Processing {}", location.point_name));
            }

            if let Some(last) = last_request {
                let elapsed = last.elapsed();
                if elapsed < self.config.request_spacing {
                    tokio::time::sleep(self.config.request_spacing - elapsed).await;
                }
            }
            last_request = Some(Instant::now());

            let report = self.process_location(location, target_date).await;
            info!(
                point = %report.point_name,
                state = %report.state,
                appended = report.rows_appended,
                "Location finished"
            );
            reports.push(report);

            if let Some(progress) = progress {
                progress.increment(1);
            }
        }

        let status = if reports.iter().any(LocationReport::is_failed) {
            RunStatus::CompletedWithErrors
        } else {
            RunStatus::Completed
        };

        let report = RunReport {
            mode: self.config.mode,
            status,
            locations: reports,
        };
        info!("{}", report.summary());
        Ok(report)
    }

    async fn process_location(
        &self,
        location: &Location,
        target_date: NaiveDate,
    ) -> LocationReport {
        let mut report = LocationReport::new(&location.point_name);

        report.transition(LocationState::Fetching);
        let request = self.request_for(location, target_date);
        let payload = match self.fetcher.fetch(&request).await {
            Ok(payload) => payload,
            Err(source) => {
                report.upstream_status = source.status().map(|s| s.as_u16());
                report.fail(&IngestError::Fetch {
                    point: location.point_name.clone(),
                    source,
                });
                return report;
            }
        };
        let acquired = acquisition_instant(self.clock.now(), self.config.utc_offset);

        report.transition(LocationState::Normalizing);
        let ctx = NormalizeContext::new(location, acquired).with_offset(self.config.utc_offset);
        let batch = self
            .normalizer
            .normalize_batch(&payload, ctx, self.day_filter(target_date));
        report.fetched_records = batch.records.len();
        report.malformed_records = batch.malformed;

        let groups = self.router.group(batch.records);
        let total = groups.len();
        for (completed, (key, records)) in groups.into_iter().enumerate() {
            report.transition(LocationState::Merging { completed, total });
            match self.merge_partition(&key, location, &records).await {
                Ok(PartitionOutcome::Written { appended }) => {
                    report.partitions_written += 1;
                    report.rows_appended += appended;
                }
                Ok(PartitionOutcome::Unchanged) => report.partitions_unchanged += 1,
                Err(err) => {
                    error!(point = %location.point_name, partition = %key, "{}", error_chain(&err));
                    report.errors.push(error_chain(&err));
                }
            }
        }

        if report.errors.is_empty() {
            report.transition(LocationState::Done);
        } else {
            report.transition(LocationState::Failed);
        }
        report
    }

    /// Read, merge and conditionally write one partition, re-reading on conflict
    async fn merge_partition(
        &self,
        key: &PartitionKey,
        location: &Location,
        records: &[ObservationRecord],
    ) -> Result<PartitionOutcome> {
        let incoming: Vec<PartitionRow> =
            records.iter().map(|r| self.config.mode.to_row(r)).collect();

        let mut retries = 0;
        loop {
            let (existing, version) = match self.gateway.read(key, location).await? {
                Some(snapshot) => (snapshot.rows, Some(snapshot.version)),
                None => (Vec::new(), None),
            };

            let outcome = self.merger.merge(existing, incoming.clone());
            if outcome.is_noop() {
                debug!(
                    partition = %key,
                    duplicates = outcome.duplicates,
                    "Nothing new, skipping write"
                );
                return Ok(PartitionOutcome::Unchanged);
            }

            match self.gateway.write(key, &outcome.merged, version.as_ref()).await {
                Ok(()) => {
                    info!(
                        partition = %key,
                        appended = outcome.appended,
                        duplicates = outcome.duplicates,
                        total = outcome.merged.len(),
                        "Merged partition"
                    );
                    return Ok(PartitionOutcome::Written {
                        appended: outcome.appended,
                    });
                }
                Err(err) if err.is_conflict() && retries < self.config.max_conflict_retries => {
                    retries += 1;
                    warn!(
                        partition = %key,
                        "Partition changed concurrently, retrying ({}/{})",
                        retries,
                        self.config.max_conflict_retries
                    );
                }
                Err(err) => return Err(err),
            }
        }
    }

    fn request_for(&self, location: &Location, target_date: NaiveDate) -> FetchRequest {
        let params = match self.config.mode {
            Mode::Forecast => FetchParams::Forecast {
                hours: self.config.forecast_hours,
            },
            // the API reads dates as UTC, so widen the window and filter locally
            Mode::History => FetchParams::History {
                start_date: target_date
                    .checked_sub_days(Days::new(2))
                    .unwrap_or(target_date),
                end_date: target_date,
            },
        };

        FetchRequest {
            latitude: location.latitude,
            longitude: location.longitude,
            params,
        }
    }

    // History ingests the local day before the target date.
    fn day_filter(&self, target_date: NaiveDate) -> Option<NaiveDate> {
        match self.config.mode {
            Mode::History => target_date.pred_opt(),
            Mode::Forecast => None,
        }
    }

    fn today(&self) -> NaiveDate {
        self.clock
            .now()
            .with_timezone(&self.config.utc_offset)
            .date_naive()
    }
}

fn error_chain(err: &IngestError) -> String {
    let mut text = err.to_string();
    let mut source = std::error::Error::source(err);
    while let Some(cause) = source {
        text.push_str(": ");
        text.push_str(&cause.to_string());
        source = std::error::Error::source(cause);
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::FetchError;
    use async_trait::async_trait;
    use chrono::{DateTime, TimeZone};
    use object_store::memory::InMemory;
    use serde_json::{json, Value};
    use std::collections::VecDeque;
    use std::sync::Mutex;

    struct FixedClock(DateTime<Utc>);

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.0
        }
    }

    #[derive(Default)]
    struct ScriptedFetcher {
        responses: Mutex<VecDeque<std::result::Result<Value, FetchError>>>,
        calls: Mutex<Vec<(FetchRequest, Instant)>>,
    }

    impl ScriptedFetcher {
        fn with(responses: Vec<std::result::Result<Value, FetchError>>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
                calls: Mutex::default(),
            }
        }
    }

    #[async_trait]
    impl WeatherFetcher for ScriptedFetcher {
        async fn fetch(&self, request: &FetchRequest) -> std::result::Result<Value, FetchError> {
            self.calls.lock().unwrap().push((request.clone(), Instant::now()));
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(json!({"data": []})))
        }
    }

    fn forecast_payload(hours: &[&str]) -> Value {
        let data: Vec<Value> = hours
            .iter()
            .map(|h| json!({"timestamp_local": h, "temp": 2.5}))
            .collect();
        json!({"city_name": "Koga", "country_code": "JP", "data": data})
    }

    fn orchestrator(
        mode: Mode,
        fetcher: Arc<ScriptedFetcher>,
    ) -> FetchOrchestrator<Arc<ScriptedFetcher>> {
        let gateway = StorageGateway::new(Arc::new(InMemory::new()), "weather-data", mode);
        let config = PipelineConfig::default()
            .with_mode(mode)
            .with_request_spacing(Duration::ZERO);
        FetchOrchestrator::new(config, fetcher, gateway).with_clock(Arc::new(FixedClock(
            Utc.with_ymd_and_hms(2026, 1, 9, 12, 0, 0).unwrap(),
        )))
    }

    fn payload(points: &[&str]) -> TriggerPayload {
        TriggerPayload::new(
            points
                .iter()
                .map(|p| Location::new(*p, 36.1833, 139.7167))
                .collect(),
        )
    }

    #[tokio::test]
    async fn test_fetch_failure_does_not_abort_run() {
        let fetcher = Arc::new(ScriptedFetcher::with(vec![
            Err(FetchError::Timeout {
                url: "https://api.example.test".to_string(),
            }),
            Ok(forecast_payload(&["2026-01-10T00:00:00"])),
        ]));
        let orch = orchestrator(Mode::Forecast, fetcher);

        let report = orch.run(&payload(&["Broken", "Koga"]), None).await.unwrap();

        assert_eq!(report.status, RunStatus::CompletedWithErrors);
        assert_eq!(report.locations[0].state, LocationState::Failed);
        assert!(report.locations[0].errors[0].contains("timed out"));
        assert_eq!(report.locations[0].upstream_status, None);
        assert_eq!(report.locations[1].state, LocationState::Done);
        assert_eq!(report.locations[1].rows_appended, 1);
        assert!(report.into_result().is_err());
    }

    #[tokio::test]
    async fn test_rejected_fetch_reports_upstream_status() {
        let fetcher = Arc::new(ScriptedFetcher::with(vec![Err(FetchError::HttpStatus {
            url: "https://api.example.test/forecast/hourly".to_string(),
            status: reqwest::StatusCode::FORBIDDEN,
            body: "API key not valid".to_string(),
        })]));
        let orch = orchestrator(Mode::Forecast, fetcher);

        let report = orch.run(&payload(&["Koga"]), None).await.unwrap();

        let koga = &report.locations[0];
        assert_eq!(koga.state, LocationState::Failed);
        assert_eq!(koga.upstream_status, Some(403));
        assert!(koga.errors[0].contains("403"));
    }

    #[tokio::test]
    async fn test_redelivery_skips_write() {
        let batch = forecast_payload(&["2026-01-10T00:00:00", "2026-01-10T01:00:00"]);
        let fetcher = Arc::new(ScriptedFetcher::with(vec![Ok(batch.clone()), Ok(batch)]));
        let orch = orchestrator(Mode::Forecast, fetcher);

        let first = orch.run(&payload(&["Koga"]), None).await.unwrap();
        let second = orch.run(&payload(&["Koga"]), None).await.unwrap();

        assert_eq!(first.rows_appended(), 2);
        assert_eq!(second.rows_appended(), 0);
        assert_eq!(second.locations[0].partitions_unchanged, 1);
        assert_eq!(second.status, RunStatus::Completed);
    }

    #[tokio::test]
    async fn test_history_request_window_and_filter() {
        let fetcher = Arc::new(ScriptedFetcher::with(vec![Ok(forecast_payload(&[
            "2026-01-08T23:00:00",
            "2026-01-09T00:00:00",
            "2026-01-09T12:00:00",
            "2026-01-10T00:00:00",
        ]))]));
        let orch = orchestrator(Mode::History, fetcher.clone());

        let trigger = payload(&["Koga"]).with_date(NaiveDate::from_ymd_opt(2026, 1, 10));
        let report = orch.run(&trigger, None).await.unwrap();

        let calls = fetcher.calls.lock().unwrap();
        assert_eq!(
            calls[0].0.params,
            FetchParams::History {
                start_date: NaiveDate::from_ymd_opt(2026, 1, 8).unwrap(),
                end_date: NaiveDate::from_ymd_opt(2026, 1, 10).unwrap(),
            }
        );
        assert_eq!(report.locations[0].rows_appended, 2);
        assert_eq!(report.locations[0].partitions_written, 1);
    }

    #[tokio::test]
    async fn test_history_defaults_to_today_in_offset() {
        let fetcher = Arc::new(ScriptedFetcher::default());
        let orch = orchestrator(Mode::History, fetcher.clone());

        orch.run(&payload(&["Koga"]), None).await.unwrap();

        // 12:00 UTC on the 9th is 21:00 JST on the 9th
        let calls = fetcher.calls.lock().unwrap();
        match &calls[0].0.params {
            FetchParams::History { end_date, .. } => {
                assert_eq!(*end_date, NaiveDate::from_ymd_opt(2026, 1, 9).unwrap())
            }
            other => panic!("unexpected params {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_request_spacing() {
        let fetcher = Arc::new(ScriptedFetcher::default());
        let gateway = StorageGateway::new(Arc::new(InMemory::new()), "wx", Mode::Forecast);
        let config = PipelineConfig::default().with_request_spacing(Duration::from_millis(1000));
        let orch = FetchOrchestrator::new(config, fetcher.clone(), gateway);

        orch.run(&payload(&["A", "B", "C"]), None).await.unwrap();

        let calls = fetcher.calls.lock().unwrap();
        assert_eq!(calls.len(), 3);
        for pair in calls.windows(2) {
            assert!(pair[1].1 - pair[0].1 >= Duration::from_millis(1000));
        }
    }

    #[tokio::test]
    async fn test_invalid_payload_fetches_nothing() {
        let fetcher = Arc::new(ScriptedFetcher::default());
        let orch = orchestrator(Mode::Forecast, fetcher.clone());

        let result = orch.run(&TriggerPayload::new(vec![]), None).await;
        assert!(matches!(result, Err(IngestError::Validation(_))));
        assert!(fetcher.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_schema_mismatch_fails_location_only() {
        let store = Arc::new(InMemory::new());
        let gateway = StorageGateway::new(store.clone(), "wx", Mode::Forecast);
        let key = PartitionKey::for_date(
            "Koga",
            NaiveDate::from_ymd_opt(2026, 1, 10).unwrap(),
            crate::models::Granularity::Day,
        );
        object_store::ObjectStore::put(
            store.as_ref(),
            &gateway.object_path(&key),
            object_store::PutPayload::from_static(b"old,header\r\n"),
        )
        .await
        .unwrap();

        let fetcher = Arc::new(ScriptedFetcher::with(vec![
            Ok(forecast_payload(&["2026-01-10T00:00:00", "2026-01-11T00:00:00"])),
        ]));
        let config = PipelineConfig::default().with_request_spacing(Duration::ZERO);
        let orch = FetchOrchestrator::new(config, fetcher, gateway);

        let report = orch.run(&payload(&["Koga"]), None).await.unwrap();
        let koga = &report.locations[0];
        assert_eq!(koga.state, LocationState::Failed);
        assert_eq!(koga.partitions_written, 1);
        assert!(koga.errors[0].contains("header"));
    }
}
