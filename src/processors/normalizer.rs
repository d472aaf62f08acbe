use crate::error::{IngestError, Result};
use crate::models::{Location, ObservationRecord};
use crate::utils::constants::MEASUREMENT_COLUMNS;
use crate::utils::timestamps::{from_unix_seconds, parse_timestamp, render_timestamp, NaiveZone};
use chrono::{DateTime, FixedOffset, NaiveDate};
use serde_json::Value;
use tracing::{debug, warn};

/// Per-fetch facts every record of a batch shares
#[derive(Debug, Clone)]
pub struct NormalizeContext {
    pub location_id: String,
    pub latitude: f64,
    pub longitude: f64,
    pub acquisition_time: DateTime<FixedOffset>,
    pub city_name: String,
    pub country_code: String,
    pub offset: FixedOffset,
}

impl NormalizeContext {
    pub fn new(location: &Location, acquisition_time: DateTime<FixedOffset>) -> Self {
        Self {
            location_id: location.point_name.clone(),
            latitude: location.latitude,
            longitude: location.longitude,
            acquisition_time,
            city_name: String::new(),
            country_code: String::new(),
            offset: *acquisition_time.offset(),
        }
    }

    pub fn with_offset(mut self, offset: FixedOffset) -> Self {
        self.offset = offset;
        self
    }

    pub fn with_city(
        mut self,
        city_name: impl Into<String>,
        country_code: impl Into<String>,
    ) -> Self {
        self.city_name = city_name.into();
        self.country_code = country_code.into();
        self
    }

    fn malformed(&self, reason: impl Into<String>) -> IngestError {
        IngestError::MalformedUpstreamRecord {
            point: self.location_id.clone(),
            reason: reason.into(),
        }
    }
}

/// Normalized survivors of one API response
#[derive(Debug, Clone, Default)]
pub struct NormalizedBatch {
    pub records: Vec<ObservationRecord>,
    pub malformed: usize,
    /// Valid records dropped by the history day filter
    pub out_of_range: usize,
}

pub struct RecordNormalizer;

impl RecordNormalizer {
    pub fn new() -> Self {
        Self
    }

    /// Map one element of the response `data` array onto the row schema
    pub fn normalize(&self, element: &Value, ctx: &NormalizeContext) -> Result<ObservationRecord> {
        let object = element
            .as_object()
            .ok_or_else(|| ctx.malformed("element is not a JSON object"))?;

        if !valid_coordinates(ctx.latitude, ctx.longitude) {
            return Err(ctx.malformed(format!(
                "coordinates ({}, {}) are not valid decimal degrees",
                ctx.latitude, ctx.longitude
            )));
        }

        let valid_time = resolve_valid_time(element, ctx.offset)
            .ok_or_else(|| ctx.malformed("no parseable timestamp_local, timestamp_utc or ts"))?;

        let weather = object.get("weather").filter(|w| w.is_object());
        let measurements = MEASUREMENT_COLUMNS
            .iter()
            .map(|column| match *column {
                "city_name" => ctx.city_name.clone(),
                "country_code" => ctx.country_code.clone(),
                "timestamp_local" => render_timestamp(&valid_time),
                "timestamp_utc" => {
                    reformat_timestamp(object.get("timestamp_utc"), NaiveZone::Utc, ctx.offset)
                }
                "weather_code" => value_text(weather.and_then(|w| w.get("code"))),
                "weather_description" => value_text(weather.and_then(|w| w.get("description"))),
                "weather_icon" => value_text(weather.and_then(|w| w.get("icon"))),
                other => value_text(object.get(other)),
            })
            .collect();

        Ok(ObservationRecord {
            location_id: ctx.location_id.clone(),
            latitude: ctx.latitude,
            longitude: ctx.longitude,
            acquisition_time: ctx.acquisition_time,
            valid_time,
            measurements,
        })
    }

    /// Normalize a whole response, skipping malformed elements.
    ///
    /// Survivors are stable-sorted by valid time. With `only_date` set, records
    /// whose local calendar date differs are dropped.
    pub fn normalize_batch(
        &self,
        payload: &Value,
        ctx: NormalizeContext,
        only_date: Option<NaiveDate>,
    ) -> NormalizedBatch {
        let ctx = ctx.with_city(
            value_text(payload.get("city_name")),
            value_text(payload.get("country_code")),
        );

        let elements: &[Value] = match payload.get("data").and_then(Value::as_array) {
            Some(elements) => elements.as_slice(),
            None => {
                warn!(point = %ctx.location_id, "Response has no data array");
                &[]
            }
        };

        let mut batch = NormalizedBatch::default();
        for (idx, element) in elements.iter().enumerate() {
            match self.normalize(element, &ctx) {
                Ok(record) => {
                    if only_date.is_some_and(|date| record.valid_date() != date) {
                        batch.out_of_range += 1;
                        continue;
                    }
                    batch.records.push(record);
                }
                Err(e) => {
                    warn!(point = %ctx.location_id, index = idx, "Skipping record: {}", e);
                    batch.malformed += 1;
                }
            }
        }

        batch.records.sort_by_key(|r| r.valid_time);

        debug!(
            point = %ctx.location_id,
            received = elements.len(),
            kept = batch.records.len(),
            malformed = batch.malformed,
            out_of_range = batch.out_of_range,
            "Normalized batch"
        );
        batch
    }
}

impl Default for RecordNormalizer {
    fn default() -> Self {
        Self::new()
    }
}

fn valid_coordinates(latitude: f64, longitude: f64) -> bool {
    latitude.is_finite()
        && longitude.is_finite()
        && (-90.0..=90.0).contains(&latitude)
        && (-180.0..=180.0).contains(&longitude)
}

// timestamp_local, then timestamp_utc, then Unix seconds in ts
fn resolve_valid_time(element: &Value, offset: FixedOffset) -> Option<DateTime<FixedOffset>> {
    let from_text = |field: &str, zone: NaiveZone| {
        element
            .get(field)
            .and_then(Value::as_str)
            .and_then(|raw| parse_timestamp(raw, zone, offset))
    };

    from_text("timestamp_local", NaiveZone::Local)
        .or_else(|| from_text("timestamp_utc", NaiveZone::Utc))
        .or_else(|| {
            let ts = element.get("ts")?;
            let seconds = ts
                .as_i64()
                .or_else(|| ts.as_f64().map(|f| f as i64))
                .or_else(|| ts.as_str().and_then(|s| s.trim().parse().ok()))?;
            from_unix_seconds(seconds, offset)
        })
}

fn reformat_timestamp(value: Option<&Value>, zone: NaiveZone, offset: FixedOffset) -> String {
    let raw = value_text(value);
    if raw.is_empty() {
        return raw;
    }
    match parse_timestamp(&raw, zone, offset) {
        Some(dt) => render_timestamp(&dt),
        None => {
            warn!("Failed to parse timestamp '{}', keeping it verbatim", raw);
            raw
        }
    }
}

/// Textual form of a JSON value as written to a partition; numbers keep
/// their received digits
fn value_text(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}
