/// Weatherbit API
pub const WEATHERBIT_BASE_URL: &str = "https://api.weatherbit.io/v2.0";
pub const HISTORY_ENDPOINT: &str = "history/hourly";
pub const FORECAST_ENDPOINT: &str = "forecast/hourly";

/// HTTP retry policy
pub const DEFAULT_HTTP_MAX_RETRIES: u32 = 3;
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;
pub const RETRY_DELAY_BASE_MS: u64 = 1000;

/// Forecast window bounds (hours)
pub const MIN_FORECAST_HOURS: u32 = 1;
pub const MAX_FORECAST_HOURS: u32 = 240;
pub const DEFAULT_FORECAST_HOURS: u32 = 72;

/// Run pacing and storage retries
pub const DEFAULT_REQUEST_SPACING_MS: u64 = 1000;
pub const DEFAULT_MAX_CONFLICT_RETRIES: u32 = 3;

/// Local civil time of the configured points (JST)
pub const DEFAULT_UTC_OFFSET_HOURS: i32 = 9;

/// Configuration sources
pub const CONFIG_FILE: &str = "config.json";
pub const KEY_FILE: &str = "key.txt";
pub const DEFAULT_LOCAL_OUTPUT_DIR: &str = "./output";
pub const DEFAULT_S3_PREFIX: &str = "weather-data";
pub const API_KEY_LENGTH: usize = 32;

/// Partition file naming
pub const HISTORY_FILE_PREFIX: &str = "wb";
pub const FORECAST_FILE_PREFIX: &str = "wbfc";
pub const PARTITION_EXTENSION: &str = "csv";

/// Forecast-only leading column
pub const ACQUISITION_COLUMN: &str = "acquisition_date";

/// Column holding the valid time, shared by both schemas
pub const VALID_TIME_COLUMN: &str = "timestamp_local";

/// Columns copied from each upstream element, in storage order
pub const MEASUREMENT_COLUMNS: [&str; 28] = [
    "city_name",
    "country_code",
    "datetime",
    "timestamp_utc",
    "timestamp_local",
    "ts",
    "temp",
    "app_temp",
    "rh",
    "dewpt",
    "pres",
    "slp",
    "clouds",
    "vis",
    "wind_spd",
    "wind_dir",
    "wind_gust_spd",
    "precip",
    "snow",
    "uv",
    "solar_rad",
    "ghi",
    "dni",
    "dhi",
    "pod",
    "weather_code",
    "weather_description",
    "weather_icon",
];
