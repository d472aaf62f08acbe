use crate::models::observation::{IdentityKey, ObservationRecord, PartitionRow};
use crate::models::partition::{Granularity, PartitionKey};
use crate::utils::constants::{
    ACQUISITION_COLUMN, FORECAST_FILE_PREFIX, HISTORY_FILE_PREFIX, MEASUREMENT_COLUMNS,
    PARTITION_EXTENSION, VALID_TIME_COLUMN,
};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Which upstream data set a run ingests.
///
/// The mode owns everything that differs between the two pipelines: row
/// schema, partition granularity, identity-key shape and file naming.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    History,
    Forecast,
}

impl Mode {
    pub fn header(&self) -> Vec<&'static str> {
        let mut header = Vec::with_capacity(MEASUREMENT_COLUMNS.len() + 1);
        if self.has_acquisition_column() {
            header.push(ACQUISITION_COLUMN);
        }
        header.extend_from_slice(&MEASUREMENT_COLUMNS);
        header
    }

    pub fn column_count(&self) -> usize {
        self.header().len()
    }

    pub fn has_acquisition_column(&self) -> bool {
        matches!(self, Mode::Forecast)
    }

    pub fn granularity(&self) -> Granularity {
        match self {
            Mode::History => Granularity::Month,
            Mode::Forecast => Granularity::Day,
        }
    }

    pub fn identity_key(&self, record: &ObservationRecord) -> IdentityKey {
        let acquisition = self
            .has_acquisition_column()
            .then(|| record.acquisition_text());
        IdentityKey::new(
            acquisition,
            record.valid_time_text(),
            record.latitude,
            record.longitude,
        )
    }

    /// Lay a record out in this mode's column order
    pub fn to_row(&self, record: &ObservationRecord) -> PartitionRow {
        let mut values = Vec::with_capacity(self.column_count());
        if self.has_acquisition_column() {
            values.push(record.acquisition_text());
        }
        values.extend(record.measurements.iter().cloned());
        PartitionRow::new(self.identity_key(record), values)
    }

    /// Rebuild a row read back from a partition; `None` if the width is wrong.
    ///
    /// Coordinates are not stored, so the caller supplies those of the
    /// location owning the partition.
    pub fn row_from_values(
        &self,
        values: Vec<String>,
        latitude: f64,
        longitude: f64,
    ) -> Option<PartitionRow> {
        if values.len() != self.column_count() {
            return None;
        }

        let offset = usize::from(self.has_acquisition_column());
        let valid_idx = offset
            + MEASUREMENT_COLUMNS
                .iter()
                .position(|c| *c == VALID_TIME_COLUMN)
                .unwrap_or(0);

        let acquisition = self.has_acquisition_column().then(|| values[0].clone());
        let key = IdentityKey::new(acquisition, values[valid_idx].clone(), latitude, longitude);
        Some(PartitionRow::new(key, values))
    }

    /// Object name relative to `{prefix}/{point}/{YYYY}/{MM}`
    pub fn file_name(&self, key: &PartitionKey) -> String {
        match self {
            Mode::History => format!(
                "{}_{:04}_{:02}.{}",
                HISTORY_FILE_PREFIX, key.year, key.month, PARTITION_EXTENSION
            ),
            Mode::Forecast => format!(
                "{}_{}.{}",
                FORECAST_FILE_PREFIX,
                key.period_stamp(),
                PARTITION_EXTENSION
            ),
        }
    }

    /// Full object path: `{prefix}/{point}/{YYYY}/{MM}/{file}`
    pub fn object_path(&self, prefix: &str, key: &PartitionKey) -> String {
        let prefix = prefix.trim_end_matches('/');
        let tail = format!(
            "{}/{:04}/{:02}/{}",
            key.location_id,
            key.year,
            key.month,
            self.file_name(key)
        );
        if prefix.is_empty() {
            tail
        } else {
            format!("{}/{}", prefix, tail)
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::History => "history",
            Mode::Forecast => "forecast",
        }
    }
}

impl FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "history" => Ok(Mode::History),
            "forecast" => Ok(Mode::Forecast),
            other => Err(format!(
                "unknown mode '{}', expected 'history' or 'forecast'",
                other
            )),
        }
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, NaiveDate, TimeZone};

    fn record() -> ObservationRecord {
        let jst = FixedOffset::east_opt(9 * 3600).unwrap();
        let mut measurements = vec![String::new(); MEASUREMENT_COLUMNS.len()];
        measurements[4] = "2026-01-09T03:00:00+09:00".to_string();
        ObservationRecord {
            location_id: "Koga".to_string(),
            latitude: 36.1833,
            longitude: 139.7167,
            acquisition_time: jst.with_ymd_and_hms(2026, 1, 8, 21, 0, 0).unwrap(),
            valid_time: jst.with_ymd_and_hms(2026, 1, 9, 3, 0, 0).unwrap(),
            measurements,
        }
    }

    #[test]
    fn test_forecast_header_prepends_acquisition() {
        let header = Mode::Forecast.header();
        assert_eq!(header[0], "acquisition_date");
        assert_eq!(header[1], "city_name");
        assert_eq!(header.len(), 29);
        assert_eq!(Mode::History.header()[0], "city_name");
        assert_eq!(Mode::History.column_count(), 28);
    }

    #[test]
    fn test_identity_key_shape() {
        let r = record();
        let forecast = Mode::Forecast.identity_key(&r);
        let history = Mode::History.identity_key(&r);
        assert_eq!(forecast.acquisition_time.as_deref(), Some("2026-01-08T21:00:00+09:00"));
        assert!(history.acquisition_time.is_none());
        assert_eq!(forecast.valid_time, history.valid_time);
    }

    #[test]
    fn test_row_round_trip_key() {
        let r = record();
        let row = Mode::Forecast.to_row(&r);
        let rebuilt = Mode::Forecast
            .row_from_values(row.values.clone(), r.latitude, r.longitude)
            .unwrap();
        assert_eq!(rebuilt, row);
    }

    #[test]
    fn test_row_with_wrong_width_rejected() {
        assert!(Mode::History.row_from_values(vec!["x".to_string()], 0.0, 0.0).is_none());
    }

    #[test]
    fn test_object_paths() {
        let date = NaiveDate::from_ymd_opt(2026, 1, 9).unwrap();
        let day = PartitionKey::for_date("Koga", date, Granularity::Day);
        let month = PartitionKey::for_date("Koga", date, Granularity::Month);

        assert_eq!(
            Mode::Forecast.object_path("weather-data/", &day),
            "weather-data/Koga/2026/01/wbfc_20260109.csv"
        );
        assert_eq!(
            Mode::History.object_path("weather-data", &month),
            "weather-data/Koga/2026/01/wb_2026_01.csv"
        );
        assert_eq!(Mode::History.object_path("", &month), "Koga/2026/01/wb_2026_01.csv");
    }

    #[test]
    fn test_mode_from_str() {
        assert_eq!("Forecast".parse::<Mode>().unwrap(), Mode::Forecast);
        assert_eq!("history".parse::<Mode>().unwrap(), Mode::History);
        assert!("hourly".parse::<Mode>().is_err());
    }
}
