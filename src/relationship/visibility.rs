/// Visibility rules between two accounts
use serde::Serialize;
use std::collections::BTreeSet;

/// Snapshot of an account's privacy flag and relationship sets
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Relations {
    pub id: String,
    pub is_private: bool,
    pub followers: BTreeSet<String>,
    pub following: BTreeSet<String>,
    pub blocked: BTreeSet<String>,
}

impl Relations {
    pub fn has_blocked(&self, other: &str) -> bool {
        self.blocked.contains(other)
    }

    pub fn is_followed_by(&self, other: &str) -> bool {
        self.followers.contains(other)
    }
}

/// Whether either side has blocked the other
pub fn is_blocked_between(viewer: &Relations, owner: &Relations) -> bool {
    owner.has_blocked(&viewer.id) || viewer.has_blocked(&owner.id)
}

/// Whether `viewer` may see `owner`'s content.
///
/// Blocks win over everything except looking at yourself; public accounts
/// are open, private ones only to their followers.
pub fn can_view(viewer: &Relations, owner: &Relations) -> bool {
    if viewer.id == owner.id {
        return true;
    }

    if is_blocked_between(viewer, owner) {
        return false;
    }

    !owner.is_private || owner.is_followed_by(&viewer.id)
}

/// Whether `viewer` may like, comment on or reply to `owner`'s content
pub fn can_interact(viewer: &Relations, owner: &Relations) -> bool {
    can_view(viewer, owner)
}
