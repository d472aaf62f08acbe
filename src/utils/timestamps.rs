use chrono::{
    DateTime, FixedOffset, NaiveDateTime, SecondsFormat, TimeZone, Timelike, Utc,
};

/// How to interpret a timestamp that carries no offset of its own
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NaiveZone {
    /// Wall-clock time at the location
    Local,
    Utc,
}

const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// Parse an upstream timestamp and express it in the location's offset.
///
/// Accepts RFC 3339 (`Z` or explicit offset) as well as bare
/// `YYYY-MM-DDTHH:MM:SS`, which is read according to `naive_zone`.
pub fn parse_timestamp(
    raw: &str,
    naive_zone: NaiveZone,
    offset: FixedOffset,
) -> Option<DateTime<FixedOffset>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&offset));
    }

    let naive = NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())?;

    match naive_zone {
        NaiveZone::Local => offset.from_local_datetime(&naive).single(),
        NaiveZone::Utc => Some(Utc.from_utc_datetime(&naive).with_timezone(&offset)),
    }
}

/// Convert Unix seconds into the location's offset
pub fn from_unix_seconds(seconds: i64, offset: FixedOffset) -> Option<DateTime<FixedOffset>> {
    DateTime::from_timestamp(seconds, 0).map(|dt| dt.with_timezone(&offset))
}

/// Canonical textual form used in partition files, e.g. `2026-01-09T03:00:00+09:00`
pub fn render_timestamp(dt: &DateTime<FixedOffset>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Secs, false)
}

/// Current instant in the location's offset, truncated to whole seconds
pub fn acquisition_instant(now: DateTime<Utc>, offset: FixedOffset) -> DateTime<FixedOffset> {
    let local = now.with_timezone(&offset);
    local.with_nanosecond(0).unwrap_or(local)
}

/// Source of "now" for acquisition timestamps
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
