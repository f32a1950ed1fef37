pub mod artifact;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod storage;
pub mod trace;

pub use artifact::{AccessCondition, Address, DossierId, EncryptedArtifact};
pub use config::CommitConfig;
pub use error::{CommitError, Result};
pub use pipeline::{commit_to_single_backend, CommitPipeline, CommitResult};
pub use trace::{TraceBuilder, TraceRecord};
