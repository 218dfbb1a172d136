//! Visibility propagation over a loaded subtree.
//!
//! # Invariants
//! - A location is invisible iff it or any ancestor is hidden.
//! - Input nodes are sorted by path string, so every parent precedes its
//!   children.
//! - Only nodes whose `is_invisible` flag actually changes are reported.

use std::collections::HashMap;

/// Visibility-relevant slice of one location row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubtreeNode {
    pub id: i64,
    pub parent_id: Option<i64>,
    pub is_hidden: bool,
    pub is_invisible: bool,
}

/// New `is_invisible` value for one location.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VisibilityUpdate {
    pub id: i64,
    pub is_invisible: bool,
}

/// Marks every node of the subtree invisible.
pub fn hide_subtree(nodes: &[SubtreeNode]) -> Vec<VisibilityUpdate> {
    nodes
        .iter()
        .filter(|node| !node.is_invisible)
        .map(|node| VisibilityUpdate {
            id: node.id,
            is_invisible: true,
        })
        .collect()
}

/// Recomputes invisibility of the subtree rooted at `root_id`.
///
/// `root_hidden` is the root's (possibly new) hidden flag and
/// `parent_invisible` the invisibility of the root's parent in its current
/// position. Descent stops below any still-hidden descendant: that node and
/// everything under it keep their flags.
pub fn recompute_subtree(
    nodes: &[SubtreeNode],
    root_id: i64,
    root_hidden: bool,
    parent_invisible: bool,
) -> Vec<VisibilityUpdate> {
    let mut resolved: HashMap<i64, bool> = HashMap::with_capacity(nodes.len());
    let mut updates = Vec::new();

    for node in nodes {
        let invisible = if node.id == root_id {
            root_hidden || parent_invisible
        } else {
            let Some(&parent_invisible) = node.parent_id.and_then(|id| resolved.get(&id)) else {
                // Parent was pruned (hidden branch) or lies outside the subtree.
                continue;
            };
            if node.is_hidden {
                // Hidden descendant: stays invisible, its branch is not visited.
                if !node.is_invisible {
                    updates.push(VisibilityUpdate {
                        id: node.id,
                        is_invisible: true,
                    });
                }
                continue;
            }
            parent_invisible
        };

        if invisible != node.is_invisible {
            updates.push(VisibilityUpdate {
                id: node.id,
                is_invisible: invisible,
            });
        }
        resolved.insert(node.id, invisible);
    }

    updates
}
