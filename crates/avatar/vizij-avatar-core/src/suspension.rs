//! Priority-based suspension as a max-priority multiset.
//!
//! Each live token contributes its priority; the effective floor is the maximum
//! (0 when empty). Tokens compose by max, never by sum.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Identity of one live suspension token. Orders tokens that share a priority
/// by issue order.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct TokenId(pub u32);

/// Lease returned by [`SuspensionSet::insert`]. Not `Clone`: it is released
/// exactly once by handing it back to its owner.
#[must_use = "a dropped token keeps its suspension alive until disposal"]
#[derive(Debug, PartialEq, Eq)]
pub struct SuspensionToken {
    id: TokenId,
    priority: i32,
}

impl SuspensionToken {
    pub fn id(&self) -> TokenId {
        self.id
    }

    pub fn priority(&self) -> i32 {
        self.priority
    }
}

/// Live tokens ordered by `(priority, id)`, so the floor is the last entry.
#[derive(Default, Debug)]
pub struct SuspensionSet {
    next_id: u32,
    live: BTreeSet<(i32, TokenId)>,
}

impl SuspensionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, priority: i32) -> SuspensionToken {
        let id = TokenId(self.next_id);
        self.next_id = self.next_id.wrapping_add(1);
        self.live.insert((priority, id));
        SuspensionToken { id, priority }
    }

    /// Release a token. Returns false if it was already cleared.
    pub fn remove(&mut self, token: SuspensionToken) -> bool {
        self.live.remove(&(token.priority, token.id))
    }

    /// Maximum priority among live tokens, 0 if none.
    pub fn floor(&self) -> i32 {
        self.live.last().map_or(0, |&(priority, _)| priority)
    }

    /// Whether a clip of `priority` is held off: some token is live and the
    /// floor reaches the clip's priority.
    pub fn suspends(&self, priority: i32) -> bool {
        self.live.last().is_some_and(|&(floor, _)| floor >= priority)
    }

    pub fn len(&self) -> usize {
        self.live.len()
    }

    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }

    pub fn clear(&mut self) {
        self.live.clear();
    }
}
