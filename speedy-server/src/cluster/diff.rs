//! Membership diff - set comparison of current against desired node ids

use crate::core::NodeInfo;
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    /// Present locally and in the desired set
    Synced,
    /// Only in the desired set
    Added,
    /// Only present locally
    Removed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeDiff {
    pub node: NodeInfo,
    pub state: NodeState,
}

/// Compare `current` membership against `desired`.
///
/// Every current node starts out `Removed`; each desired node then either
/// flips its entry to `Synced` or is recorded as `Added`.
pub fn diff(current: &[NodeInfo], desired: &[NodeInfo]) -> HashMap<String, NodeDiff> {
    let mut result: HashMap<String, NodeDiff> = current
        .iter()
        .map(|node| {
            (
                node.id.clone(),
                NodeDiff {
                    node: node.clone(),
                    state: NodeState::Removed,
                },
            )
        })
        .collect();

    let known: HashSet<&str> = current.iter().map(|n| n.id.as_str()).collect();

    for node in desired {
        let state = if known.contains(node.id.as_str()) {
            NodeState::Synced
        } else {
            NodeState::Added
        };

        result.insert(
            node.id.clone(),
            NodeDiff {
                node: node.clone(),
                state,
            },
        );
    }

    result
}
