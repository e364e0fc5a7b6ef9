// Common types shared across the application

pub mod entity_ids;
pub mod error;
pub mod id;

pub use entity_ids::*;
pub use error::{EngineError, EngineResult};
pub use id::Id;
