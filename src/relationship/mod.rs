/// Relationship engine
///
/// Follow requests, follower/following edges, blocks and the visibility
/// rules every content read and write is checked against.

mod engine;
mod visibility;

pub use engine::{
    FollowOutcome, IncomingRequest, RelationshipEngine, RelationshipStatus, ReviewDecision,
};
pub use visibility::{can_interact, can_view, is_blocked_between, Relations};
