use crate::error::{IngestError, Result};
use chrono::NaiveDate;
use serde::{de, Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::path::Path;
use validator::{Validate, ValidationError};

/// A configured point to fetch weather data for
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct Location {
    #[serde(alias = "lat", deserialize_with = "lenient_coordinate")]
    #[validate(range(min = -90.0, max = 90.0))]
    pub latitude: f64,

    #[serde(alias = "lon", deserialize_with = "lenient_coordinate")]
    #[validate(range(min = -180.0, max = 180.0))]
    pub longitude: f64,

    #[serde(alias = "point")]
    #[validate(length(min = 1), custom(function = "validate_point_name"))]
    pub point_name: String,
}

impl Location {
    pub fn new(point_name: impl Into<String>, latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
            point_name: point_name.into(),
        }
    }
}

// Triggers written by hand or by other tools may quote coordinates.
fn lenient_coordinate<'de, D>(deserializer: D) -> std::result::Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = match Value::deserialize(deserializer)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        other => {
            return Err(de::Error::custom(format!(
                "expected a number or numeric string for a coordinate, found {}",
                other
            )))
        }
    };

    value
        .filter(|v| v.is_finite())
        .ok_or_else(|| de::Error::custom("coordinate is not a finite number"))
}

// Point names become a path segment of every partition key.
fn validate_point_name(name: &str) -> std::result::Result<(), ValidationError> {
    if name.contains('/') || name.trim() != name || name == "." || name == ".." {
        return Err(ValidationError::new("point_name_not_a_path_segment"));
    }
    Ok(())
}

/// Inbound trigger: which points to process and, for history runs, which day
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct TriggerPayload {
    #[validate(length(min = 1), nested)]
    pub locations: Vec<Location>,

    /// History target date; the previous local day is ingested
    #[serde(default)]
    pub date: Option<NaiveDate>,
}

impl TriggerPayload {
    pub fn new(locations: Vec<Location>) -> Self {
        Self {
            locations,
            date: None,
        }
    }

    pub fn with_date(mut self, date: Option<NaiveDate>) -> Self {
        self.date = date;
        self
    }

    /// Parse and validate a JSON trigger; nothing is fetched for an invalid payload
    pub fn from_json(json: &str) -> Result<Self> {
        let payload: TriggerPayload = serde_json::from_str(json)
            .map_err(|e| IngestError::InvalidTrigger(e.to_string()))?;
        payload.validate()?;
        Ok(payload)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }
}
