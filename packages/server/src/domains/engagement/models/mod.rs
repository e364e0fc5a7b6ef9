pub mod follow;
pub mod upvote;

pub use follow::*;
pub use upvote::*;
