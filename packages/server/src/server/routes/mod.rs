// HTTP routes
pub mod health;
pub mod issues;
pub mod stream;

pub use health::*;
pub use issues::*;
pub use stream::*;
