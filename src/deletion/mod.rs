//! The account deletion orchestration engine.
//!
//! - [`policy`]: pure eligibility and retention classification
//! - [`eraser`]: per-account atomic erasure (documents, storage, identity)
//! - [`batch`]: the eligible-account scan with per-account failure isolation
//! - [`worker`]: the interval trigger adapter for deployments without an
//!   external scheduler
//!
//! The engine embeds no scheduling logic and takes `now` as a parameter;
//! triggers (cron via the `run` subcommand, or the interval worker) are thin
//! adapters around [`DeletionBatchProcessor::run_batch`].

pub mod batch;
pub mod eraser;
pub mod policy;
pub mod worker;

pub use batch::{DeletionBatchProcessor, RunError};
pub use eraser::{AccountDataEraser, EraseError, ErasedAccount};
pub use policy::{CollectionClass, RetentionPolicy};
pub use worker::start_deletion_worker;
