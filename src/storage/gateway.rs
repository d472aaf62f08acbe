use crate::error::{IngestError, Result};
use crate::models::{Location, Mode, PartitionKey, PartitionRow};
use crate::readers::{DecodedPartition, PartitionReader};
use crate::writers::PartitionWriter;
use bytes::Bytes;
use object_store::path::Path;
use object_store::{ObjectStore, PutMode, PutOptions, PutPayload, UpdateVersion};
use std::sync::Arc;
use tracing::{debug, info};

/// How `write` guards against a concurrent writer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Create-if-absent or update-if-version-matches
    Conditional,
    /// Create-if-absent, then plain overwrite. Single-writer backends only.
    Overwrite,
}

/// The "before" state of a partition
#[derive(Debug, Clone)]
pub struct PartitionSnapshot {
    pub rows: Vec<PartitionRow>,
    pub version: UpdateVersion,
}

/// Read-then-write access to partition files in an object store
pub struct StorageGateway {
    store: Arc<dyn ObjectStore>,
    prefix: String,
    mode: Mode,
    write_mode: WriteMode,
    writer: PartitionWriter,
}

impl StorageGateway {
    pub fn new(store: Arc<dyn ObjectStore>, prefix: impl Into<String>, mode: Mode) -> Self {
        Self {
            store,
            prefix: prefix.into(),
            mode,
            write_mode: WriteMode::Conditional,
            writer: PartitionWriter::new(),
        }
    }

    pub fn with_write_mode(mut self, write_mode: WriteMode) -> Self {
        self.write_mode = write_mode;
        self
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn write_mode(&self) -> WriteMode {
        self.write_mode
    }

    pub fn object_path(&self, key: &PartitionKey) -> Path {
        Path::from(self.mode.object_path(&self.prefix, key))
    }

    pub async fn exists(&self, key: &PartitionKey) -> Result<bool> {
        match self.store.head(&self.object_path(key)).await {
            Ok(_) => Ok(true),
            Err(object_store::Error::NotFound { .. }) => Ok(false),
            Err(source) => Err(unavailable(key, source)),
        }
    }

    /// Read a partition's rows and version; `None` when it does not exist yet.
    ///
    /// Stored rows carry no coordinates, so their identity keys take those
    /// of `location`.
    pub async fn read(
        &self,
        key: &PartitionKey,
        location: &Location,
    ) -> Result<Option<PartitionSnapshot>> {
        let Some((decoded, version)) = self.fetch(key).await? else {
            debug!(partition = %key, "Partition not found");
            return Ok(None);
        };

        let rows = if decoded.is_empty() {
            Vec::new()
        } else {
            self.check_header(key, &decoded.header)?;
            self.rows_from(key, decoded.records, location)?
        };

        debug!(partition = %key, rows = rows.len(), "Read partition");
        Ok(Some(PartitionSnapshot { rows, version }))
    }

    /// Raw header and rows without schema checks
    pub async fn read_raw(&self, key: &PartitionKey) -> Result<Option<DecodedPartition>> {
        Ok(self.fetch(key).await?.map(|(decoded, _)| decoded))
    }

    /// Rewrite the whole partition.
    ///
    /// `expected` is the version observed by the preceding `read`, or `None`
    /// when the partition did not exist. A changed or newly created object
    /// yields `StorageConflict`.
    pub async fn write(
        &self,
        key: &PartitionKey,
        rows: &[PartitionRow],
        expected: Option<&UpdateVersion>,
    ) -> Result<()> {
        let body = self.writer.encode(&self.mode.header(), rows)?;
        let size = body.len();

        let mode = match (self.write_mode, expected) {
            (_, None) => PutMode::Create,
            (WriteMode::Conditional, Some(version)) => PutMode::Update(version.clone()),
            (WriteMode::Overwrite, Some(_)) => PutMode::Overwrite,
        };

        let path = self.object_path(key);
        self.store
            .put_opts(
                &path,
                PutPayload::from_bytes(Bytes::from(body)),
                PutOptions {
                    mode,
                    ..Default::default()
                },
            )
            .await
            .map_err(|source| match source {
                object_store::Error::Precondition { .. }
                | object_store::Error::AlreadyExists { .. }
                | object_store::Error::NotFound { .. } => IngestError::StorageConflict {
                    key: key.to_string(),
                },
                source => unavailable(key, source),
            })?;

        info!(partition = %key, path = %path, rows = rows.len(), bytes = size, "Wrote partition");
        Ok(())
    }

    async fn fetch(&self, key: &PartitionKey) -> Result<Option<(DecodedPartition, UpdateVersion)>> {
        let result = match self.store.get(&self.object_path(key)).await {
            Ok(result) => result,
            Err(object_store::Error::NotFound { .. }) => return Ok(None),
            Err(source) => return Err(unavailable(key, source)),
        };

        let version = UpdateVersion {
            e_tag: result.meta.e_tag.clone(),
            version: result.meta.version.clone(),
        };
        let bytes: Bytes = result.bytes().await.map_err(|source| unavailable(key, source))?;

        let decoded =
            tokio::task::spawn_blocking(move || PartitionReader::new().decode(&bytes))
                .await?
                .map_err(|e| IngestError::CorruptPartition {
                    key: key.to_string(),
                    reason: e.to_string(),
                })?;

        Ok(Some((decoded, version)))
    }

    fn check_header(&self, key: &PartitionKey, header: &[String]) -> Result<()> {
        let expected = self.mode.header();
        if header.iter().map(String::as_str).eq(expected.iter().copied()) {
            return Ok(());
        }

        Err(IngestError::SchemaMismatch {
            key: key.to_string(),
            mode: self.mode.to_string(),
            expected: expected.len(),
            found: header.len(),
        })
    }

    fn rows_from(
        &self,
        key: &PartitionKey,
        records: Vec<Vec<String>>,
        location: &Location,
    ) -> Result<Vec<PartitionRow>> {
        records
            .into_iter()
            .enumerate()
            .map(|(idx, values)| {
                let width = values.len();
                self.mode
                    .row_from_values(values, location.latitude, location.longitude)
                    .ok_or_else(|| IngestError::CorruptPartition {
                        key: key.to_string(),
                        reason: format!(
                            "row {} has {} fields, expected {}",
                            idx + 1,
                            width,
                            self.mode.column_count()
                        ),
                    })
            })
            .collect()
    }
}

fn unavailable(key: &PartitionKey, source: object_store::Error) -> IngestError {
    IngestError::StorageUnavailable {
        key: key.to_string(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Granularity, IdentityKey};
    use crate::utils::constants::MEASUREMENT_COLUMNS;
    use chrono::NaiveDate;
    use object_store::memory::InMemory;

    fn koga() -> Location {
        Location::new("Koga", 36.1833, 139.7167)
    }

    fn key() -> PartitionKey {
        PartitionKey::for_date(
            "Koga",
            NaiveDate::from_ymd_opt(2026, 1, 9).unwrap(),
            Granularity::Month,
        )
    }

    fn row(valid_time: &str) -> PartitionRow {
        let mut values = vec![String::new(); MEASUREMENT_COLUMNS.len()];
        values[0] = "古河".to_string();
        values[4] = valid_time.to_string();
        PartitionRow::new(IdentityKey::new(None, valid_time, 36.1833, 139.7167), values)
    }

    fn gateway(store: Arc<dyn ObjectStore>) -> StorageGateway {
        StorageGateway::new(store, "weather-data", Mode::History)
    }

    #[tokio::test]
    async fn test_missing_partition_reads_none() {
        let gateway = gateway(Arc::new(InMemory::new()));
        assert!(gateway.read(&key(), &koga()).await.unwrap().is_none());
        assert!(!gateway.exists(&key()).await.unwrap());
    }

    #[tokio::test]
    async fn test_create_then_read_back() {
        let gateway = gateway(Arc::new(InMemory::new()));
        let rows = vec![row("2026-01-09T00:00:00+09:00"), row("2026-01-09T01:00:00+09:00")];

        gateway.write(&key(), &rows, None).await.unwrap();

        let snapshot = gateway.read(&key(), &koga()).await.unwrap().unwrap();
        assert_eq!(snapshot.rows, rows);
        assert_eq!(
            gateway.object_path(&key()).as_ref(),
            "weather-data/Koga/2026/01/wb_2026_01.csv"
        );
    }

    #[tokio::test]
    async fn test_create_over_existing_is_conflict() {
        let gateway = gateway(Arc::new(InMemory::new()));
        gateway.write(&key(), &[row("2026-01-09T00:00:00+09:00")], None).await.unwrap();

        let err = gateway
            .write(&key(), &[row("2026-01-09T01:00:00+09:00")], None)
            .await
            .unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn test_stale_version_is_conflict() {
        let gateway = gateway(Arc::new(InMemory::new()));
        gateway.write(&key(), &[row("2026-01-09T00:00:00+09:00")], None).await.unwrap();

        let stale = gateway.read(&key(), &koga()).await.unwrap().unwrap();
        let fresh = gateway.read(&key(), &koga()).await.unwrap().unwrap();

        let mut concurrent = fresh.rows.clone();
        concurrent.push(row("2026-01-09T01:00:00+09:00"));
        gateway.write(&key(), &concurrent, Some(&fresh.version)).await.unwrap();

        let mut ours = stale.rows.clone();
        ours.push(row("2026-01-09T02:00:00+09:00"));
        let err = gateway.write(&key(), &ours, Some(&stale.version)).await.unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn test_header_mismatch_refuses_partition() {
        let store: Arc<dyn ObjectStore> = Arc::new(InMemory::new());
        let gateway = gateway(store.clone());
        store
            .put(&gateway.object_path(&key()), PutPayload::from_static(b"a,b\r\n1,2\r\n"))
            .await
            .unwrap();

        let err = gateway.read(&key(), &koga()).await.unwrap_err();
        assert!(matches!(
            err,
            IngestError::SchemaMismatch { expected: 28, found: 2, .. }
        ));
    }

    #[tokio::test]
    async fn test_short_row_is_corrupt() {
        let store: Arc<dyn ObjectStore> = Arc::new(InMemory::new());
        let gateway = gateway(store.clone());
        let body = format!("{}\r\ntoo,short\r\n", Mode::History.header().join(","));
        store
            .put(&gateway.object_path(&key()), PutPayload::from(body.into_bytes()))
            .await
            .unwrap();

        let err = gateway.read(&key(), &koga()).await.unwrap_err();
        assert!(matches!(err, IngestError::CorruptPartition { .. }));
    }

    #[tokio::test]
    async fn test_overwrite_mode_ignores_version() {
        let gateway = gateway(Arc::new(InMemory::new())).with_write_mode(WriteMode::Overwrite);
        gateway.write(&key(), &[row("2026-01-09T00:00:00+09:00")], None).await.unwrap();

        let stale = UpdateVersion {
            e_tag: Some("stale".to_string()),
            version: None,
        };
        gateway
            .write(&key(), &[row("2026-01-09T01:00:00+09:00")], Some(&stale))
            .await
            .unwrap();

        let raw = gateway.read_raw(&key()).await.unwrap().unwrap();
        assert_eq!(raw.records.len(), 1);
    }
}
