//! Database layer for the gateway
//!
//! Provides the [`DocumentStore`] seam with a MongoDB implementation and an
//! in-memory one for development mode and tests.

pub mod memory;
pub mod mongo;
pub mod query;
pub mod schemas;
pub mod store;

pub use memory::MemoryStore;
pub use mongo::{MongoClient, MongoStore};
pub use store::{DocumentStore, FindSpec, SharedStore, TransferPlan, UpdateOutcome};
