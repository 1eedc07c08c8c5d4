//! ShardFS test & validation infrastructure.
//!
//! Integration suites exercising the client adapter end to end over the
//! in-memory binding: session lifecycle, file-handle I/O flows, and the
//! batched directory-listing protocol.

pub mod harness;
pub mod listing_tests;

pub use harness::{started_session, storage_env, test_config, StorageEnv};
