use crate::utils::constants::MEASUREMENT_COLUMNS;
use crate::utils::timestamps::render_timestamp;
use chrono::{DateTime, FixedOffset, NaiveDate};
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

/// One normalized upstream element
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservationRecord {
    pub location_id: String,
    pub latitude: f64,
    pub longitude: f64,

    /// When the fetch that produced this record happened
    pub acquisition_time: DateTime<FixedOffset>,

    /// Instant the measurements apply to, in the location's offset
    pub valid_time: DateTime<FixedOffset>,

    /// Values in `MEASUREMENT_COLUMNS` order, verbatim from the payload
    pub measurements: Vec<String>,
}

impl ObservationRecord {
    /// Calendar date of the valid time in the location's civil calendar
    pub fn valid_date(&self) -> NaiveDate {
        self.valid_time.date_naive()
    }

    pub fn measurement(&self, column: &str) -> Option<&str> {
        MEASUREMENT_COLUMNS
            .iter()
            .position(|c| *c == column)
            .and_then(|idx| self.measurements.get(idx))
            .map(String::as_str)
    }

    pub fn acquisition_text(&self) -> String {
        render_timestamp(&self.acquisition_time)
    }

    pub fn valid_time_text(&self) -> String {
        render_timestamp(&self.valid_time)
    }
}

/// Fields that decide whether two rows describe the same fact.
///
/// History partitions carry no acquisition column, so their keys leave
/// `acquisition_time` empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IdentityKey {
    pub acquisition_time: Option<String>,
    pub valid_time: String,
    pub latitude: OrderedFloat<f64>,
    pub longitude: OrderedFloat<f64>,
}

impl IdentityKey {
    pub fn new(
        acquisition_time: Option<String>,
        valid_time: impl Into<String>,
        latitude: f64,
        longitude: f64,
    ) -> Self {
        Self {
            acquisition_time,
            valid_time: valid_time.into(),
            latitude: OrderedFloat(latitude),
            longitude: OrderedFloat(longitude),
        }
    }
}

/// A stored (or about to be stored) row with its identity key
#[derive(Debug, Clone, PartialEq)]
pub struct PartitionRow {
    pub key: IdentityKey,
    pub values: Vec<String>,
}

impl PartitionRow {
    pub fn new(key: IdentityKey, values: Vec<String>) -> Self {
        Self { key, values }
    }
}
