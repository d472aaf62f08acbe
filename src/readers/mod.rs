pub mod partition_reader;

pub use partition_reader::{DecodedPartition, PartitionReader};
