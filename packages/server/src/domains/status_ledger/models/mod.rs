pub mod status_log_entry;

pub use status_log_entry::*;
