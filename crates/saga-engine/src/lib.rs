pub mod branch_manager;
pub mod config;
pub mod engine;
pub mod merge;
pub mod publish;
pub mod recorder;
pub mod version_store;

pub use branch_manager::{BranchLocks, BranchManager};
pub use config::EngineConfig;
pub use engine::{CommitRequest, Committed, Engine, MergeRequest, RevertRequest};
pub use publish::{
    CollectPublisher, EventPublisher, FanoutPublisher, NullPublisher, TracingPublisher,
};
pub use tokio_util::sync::CancellationToken;
pub use version_store::{Ancestors, VersionStore};
