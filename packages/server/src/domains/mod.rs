// Business domains
pub mod counters;
pub mod engagement;
pub mod issues;
pub mod status_ledger;
