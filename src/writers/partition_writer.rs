use crate::error::Result;
use crate::models::PartitionRow;
use encoding_rs::SHIFT_JIS;
use tracing::warn;

/// Encodes partition rows as Shift_JIS CSV with CRLF line endings
pub struct PartitionWriter {
    terminator: csv::Terminator,
}

impl PartitionWriter {
    pub fn new() -> Self {
        Self {
            terminator: csv::Terminator::CRLF,
        }
    }

    /// Serialize the header followed by every row, header exactly once
    pub fn encode(&self, header: &[&str], rows: &[PartitionRow]) -> Result<Vec<u8>> {
        let mut writer = csv::WriterBuilder::new()
            .terminator(self.terminator)
            .from_writer(Vec::with_capacity(rows.len() * 256));

        writer.write_record(header)?;
        for row in rows {
            writer.write_record(&row.values)?;
        }

        let text = writer
            .into_inner()
            .map_err(|e| std::io::Error::other(e.to_string()))?;
        let text = String::from_utf8(text).map_err(|e| {
            std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string())
        })?;

        let (encoded, _, had_unmappable) = SHIFT_JIS.encode(&text);
        if had_unmappable {
            warn!("Characters without a Shift_JIS mapping were replaced");
        }
        Ok(encoded.into_owned())
    }
}

impl Default for PartitionWriter {
    fn default() -> Self {
        Self::new()
    }
}
