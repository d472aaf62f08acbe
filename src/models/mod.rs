pub mod location;
pub mod mode;
pub mod observation;
pub mod partition;

pub use location::{Location, TriggerPayload};
pub use mode::Mode;
pub use observation::{IdentityKey, ObservationRecord, PartitionRow};
pub use partition::{Granularity, PartitionKey};
