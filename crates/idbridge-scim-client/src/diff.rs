//! Membership diff between the remote and the desired member sets.

use std::collections::BTreeSet;

/// Remote ids to add and remove so the remote set equals the desired one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MembershipDiff {
    pub to_add: Vec<String>,
    pub to_remove: Vec<String>,
}

impl MembershipDiff {
    /// `to_add = desired \ current`, `to_remove = current \ desired`.
    ///
    /// Output is sorted so repeated calls produce identical requests.
    #[must_use]
    pub fn compute(current: &BTreeSet<String>, desired: &BTreeSet<String>) -> Self {
        Self {
            to_add: desired.difference(current).cloned().collect(),
            to_remove: current.difference(desired).cloned().collect(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.to_add.is_empty() && self.to_remove.is_empty()
    }
}
