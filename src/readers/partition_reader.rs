use crate::error::Result;
use encoding_rs::SHIFT_JIS;
use tracing::warn;

/// Raw contents of one partition file
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecodedPartition {
    pub header: Vec<String>,
    pub records: Vec<Vec<String>>,
}

impl DecodedPartition {
    pub fn is_empty(&self) -> bool {
        self.header.is_empty() && self.records.is_empty()
    }
}

/// Decodes Shift_JIS CSV partition files
pub struct PartitionReader;

impl PartitionReader {
    pub fn new() -> Self {
        Self
    }

    /// Decode a partition body into its header and rows.
    ///
    /// Rows are returned as stored; width checks belong to the caller, which
    /// knows the expected schema.
    pub fn decode(&self, bytes: &[u8]) -> Result<DecodedPartition> {
        let (text, _, had_errors) = SHIFT_JIS.decode(bytes);
        if had_errors {
            warn!("Partition contains bytes that are not valid Shift_JIS; replaced");
        }

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(text.as_bytes());

        let header = reader.headers()?.iter().map(str::to_string).collect();

        let mut records = Vec::new();
        for record in reader.records() {
            let record = record?;
            records.push(record.iter().map(str::to_string).collect());
        }

        Ok(DecodedPartition { header, records })
    }
}

impl Default for PartitionReader {
    fn default() -> Self {
        Self::new()
    }
}
