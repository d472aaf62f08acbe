pub mod data_merger;
pub mod normalizer;
pub mod orchestrator;
pub mod partition_router;

pub use data_merger::{DataMerger, MergeOutcome};
pub use normalizer::{NormalizeContext, NormalizedBatch, RecordNormalizer};
pub use orchestrator::{
    FetchOrchestrator, LocationReport, LocationState, PipelineConfig, RunReport, RunStatus,
};
pub use partition_router::PartitionRouter;
