// Issue Engagement Engine - API Core
//
// This crate assigns sequential issue numbers, tracks votes and follows with
// idempotent writes, keeps an append-only status ledger, and fans change
// events out to live clients.

pub mod common;
pub mod config;
pub mod domains;
pub mod kernel;
pub mod server;

pub use config::*;
