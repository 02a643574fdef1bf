//! Assembles flat comment rows into a forest of nested nodes.
//!
//! Rows live in an arena (one slot per input row) and are linked by slot index.
//! A parent owns its children's slots; the child-to-parent back-reference is only
//! kept while linking so that cyclic parent chains can be cut.

use std::collections::HashMap;

use crate::models::comment::{CommentNode, CommentRow};

/// Slot-indexed parent/child links for one batch of rows.
struct Links {
    parent: Vec<Option<usize>>,
    children: Vec<Vec<usize>>,
    roots: Vec<usize>,
}

/// Builds the forest for `rows`.
///
/// * A row whose parent is 0, negative, or absent from `rows` becomes a root.
/// * Every other row is appended to its parent's children in input order.
/// * Roots keep input order.
/// * With duplicate ids the last row wins the id lookup; every row still lands
///   exactly once in the output.
/// * Rows caught in a parent cycle are cut loose at the first row (in input order)
///   of the cycle, which becomes a root.
pub fn build_forest(rows: Vec<CommentRow>) -> Vec<CommentNode> {
    let links = link(&rows);

    let mut built: Vec<Option<CommentNode>> = rows.into_iter().map(|row| Some(row.into())).collect();

    // Post-order over each tree so that children are complete before their parent takes them.
    for &root in &links.roots {
        let mut stack = vec![(root, false)];
        while let Some((slot, expanded)) = stack.pop() {
            if expanded {
                let children: Vec<CommentNode> = links.children[slot]
                    .iter()
                    .filter_map(|&child| built[child].take())
                    .collect();
                if let Some(node) = built[slot].as_mut() {
                    node.children = children;
                }
            } else {
                stack.push((slot, true));
                stack.extend(links.children[slot].iter().rev().map(|&child| (child, false)));
            }
        }
    }

    links
        .roots
        .into_iter()
        .filter_map(|slot| built[slot].take())
        .collect()
}

fn link(rows: &[CommentRow]) -> Links {
    let mut index: HashMap<i64, usize> = HashMap::with_capacity(rows.len());
    for (slot, row) in rows.iter().enumerate() {
        index.insert(row.id, slot);
    }

    let mut links = Links {
        parent: vec![None; rows.len()],
        children: vec![Vec::new(); rows.len()],
        roots: Vec::new(),
    };

    for (slot, row) in rows.iter().enumerate() {
        match row.parent_id().and_then(|id| index.get(&id).copied()) {
            Some(parent) => {
                links.parent[slot] = Some(parent);
                links.children[parent].push(slot);
            }
            None => links.roots.push(slot),
        }
    }

    break_cycles(&mut links);
    links
}

/// Anything not reachable from a root sits on (or under) a parent cycle.
fn break_cycles(links: &mut Links) {
    let mut reached = vec![false; links.parent.len()];
    for &root in &links.roots {
        mark_subtree(root, &links.children, &mut reached);
    }

    let mut promoted = false;
    for slot in 0..reached.len() {
        if reached[slot] {
            continue;
        }
        if let Some(parent) = links.parent[slot].take() {
            links.children[parent].retain(|&child| child != slot);
        }
        tracing::warn!(slot, "comment parent chain forms a cycle, promoting to root");
        links.roots.push(slot);
        mark_subtree(slot, &links.children, &mut reached);
        promoted = true;
    }

    if promoted {
        links.roots.sort_unstable();
    }
}

fn mark_subtree(start: usize, children: &[Vec<usize>], reached: &mut [bool]) {
    let mut stack = vec![start];
    while let Some(slot) = stack.pop() {
        if reached[slot] {
            continue;
        }
        reached[slot] = true;
        stack.extend(children[slot].iter().copied());
    }
}
