pub mod backend;
pub mod gateway;

pub use backend::{build_object_store, gateway_from_settings};
pub use gateway::{PartitionSnapshot, StorageGateway, WriteMode};
