//! Coop gateway - data gateway for the cooperative loan and savings app
//!
//! Exposes a whitelisted create/get/update/delete pass-through over the
//! loan, member, deposit, share and dividend collections, and an atomic
//! ledger transfer between deposit accounts.

pub mod config;
pub mod db;
pub mod gateway;
pub mod ledger;
pub mod routes;
pub mod server;
pub mod types;

pub use config::Args;
pub use server::{run, AppState};
pub use types::{GatewayError, Result};
