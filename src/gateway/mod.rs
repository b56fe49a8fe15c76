//! Generic collection gateway
//!
//! A whitelisted create/get/update/delete pass-through over the domain
//! collections, with per-collection business rules on the write paths.

pub mod dispatcher;
pub mod policy;
pub mod rules;

pub use dispatcher::{
    CreateOutcome, CreateRequest, DeleteRequest, Gateway, GetRequest, UpdateRequest,
};
pub use policy::{CollectionPolicy, ALLOWED_COLLECTIONS};
pub use rules::{PreparedDocument, RuleInjector};
