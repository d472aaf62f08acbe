use crate::models::{Granularity, Mode, ObservationRecord, PartitionKey};
use std::collections::HashMap;

/// Maps records to the partition their valid time falls in
#[derive(Debug, Clone, Copy)]
pub struct PartitionRouter {
    granularity: Granularity,
}

impl PartitionRouter {
    pub fn new(granularity: Granularity) -> Self {
        Self { granularity }
    }

    pub fn for_mode(mode: Mode) -> Self {
        Self::new(mode.granularity())
    }

    pub fn route(&self, record: &ObservationRecord) -> PartitionKey {
        PartitionKey::for_date(&record.location_id, record.valid_date(), self.granularity)
    }

    /// Group records by partition, in first-seen partition order and
    /// delivered order within each group
    pub fn group(
        &self,
        records: Vec<ObservationRecord>,
    ) -> Vec<(PartitionKey, Vec<ObservationRecord>)> {
        let mut groups: Vec<(PartitionKey, Vec<ObservationRecord>)> = Vec::new();
        let mut index: HashMap<PartitionKey, usize> = HashMap::new();

        for record in records {
            let key = self.route(&record);
            match index.get(&key) {
                Some(&idx) => groups[idx].1.push(record),
                None => {
                    index.insert(key.clone(), groups.len());
                    groups.push((key, vec![record]));
                }
            }
        }

        groups
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::constants::MEASUREMENT_COLUMNS;
    use chrono::{FixedOffset, TimeZone};

    fn record(day: u32, hour: u32, temp: &str) -> ObservationRecord {
        let jst = FixedOffset::east_opt(9 * 3600).unwrap();
        let mut measurements = vec![String::new(); MEASUREMENT_COLUMNS.len()];
        measurements[6] = temp.to_string();
        ObservationRecord {
            location_id: "Koga".to_string(),
            latitude: 36.1833,
            longitude: 139.7167,
            acquisition_time: jst.with_ymd_and_hms(2026, 1, 8, 21, 0, 0).unwrap(),
            valid_time: jst.with_ymd_and_hms(2026, 1, day, hour, 0, 0).unwrap(),
            measurements,
        }
    }

    #[test]
    fn test_route_ignores_measurements() {
        let router = PartitionRouter::for_mode(Mode::Forecast);
        assert_eq!(router.route(&record(9, 3, "1.0")), router.route(&record(9, 3, "8.0")));
    }

    #[test]
    fn test_route_uses_local_calendar_date() {
        // 23:00 JST on the 9th is 14:00 UTC on the 9th; 00:00 JST on the 10th
        // is still the 9th in UTC
        let router = PartitionRouter::for_mode(Mode::Forecast);
        assert_eq!(router.route(&record(9, 23, "")).day, Some(9));
        assert_eq!(router.route(&record(10, 0, "")).day, Some(10));
    }

    #[test]
    fn test_group_preserves_order() {
        let router = PartitionRouter::for_mode(Mode::Forecast);
        let groups = router.group(vec![
            record(10, 1, "a"),
            record(9, 22, "b"),
            record(10, 2, "c"),
            record(9, 23, "d"),
        ]);

        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].0.day, Some(10));
        let temps: Vec<_> = groups[0].1.iter().map(|r| r.measurements[6].as_str()).collect();
        assert_eq!(temps, vec!["a", "c"]);
        assert_eq!(groups[1].1.len(), 2);
    }

    #[test]
    fn test_month_granularity_collapses_days() {
        let router = PartitionRouter::for_mode(Mode::History);
        let groups = router.group(vec![record(9, 1, ""), record(10, 1, "")]);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].0.to_string(), "Koga/2026-01");
    }
}
