//! Achievement chain analysis.
//!
//! `chained_from` links form a forest of tiered achievements (e.g. 1, 5,
//! 25 completed courses). Links are informational by default. When the
//! deployment enables gating, an achievement is only evaluated once its
//! predecessor is completed, which makes evaluation order matter.
//!
//! Definitions are admin-authored, so the links may be broken (pointing
//! at an inactive achievement) or cyclic. Broken links are treated as
//! roots; cycle members are reported so the caller can warn and ignore
//! their links.

use std::collections::{BTreeMap, BTreeSet};

use crate::types::DbId;

/// The chain-relevant slice of an achievement definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainLink {
    pub id: DbId,
    pub chained_from: Option<DbId>,
}

/// Ids of achievements that sit on a `chained_from` cycle.
pub fn find_cycles(links: &[ChainLink]) -> BTreeSet<DbId> {
    let parent: BTreeMap<DbId, DbId> = links
        .iter()
        .filter_map(|l| l.chained_from.map(|p| (l.id, p)))
        .collect();

    let mut on_cycle = BTreeSet::new();
    for link in links {
        // Walk at most `links.len()` steps; returning to the start means a cycle.
        let mut cursor = parent.get(&link.id).copied();
        for _ in 0..links.len() {
            match cursor {
                Some(id) if id == link.id => {
                    on_cycle.insert(link.id);
                    break;
                }
                Some(id) => cursor = parent.get(&id).copied(),
                None => break,
            }
        }
    }
    on_cycle
}

/// Order in which achievements should be evaluated: every predecessor
/// before its successors, ties broken by id. Cycle members come last.
pub fn evaluation_order(links: &[ChainLink]) -> Vec<DbId> {
    let known: BTreeSet<DbId> = links.iter().map(|l| l.id).collect();
    let cyclic = find_cycles(links);
    let children = children_of(links, &known, &cyclic);

    let mut order = Vec::with_capacity(links.len());
    for root in roots(links, &known, &cyclic) {
        push_subtree(root, &children, &mut order);
    }
    order.extend(cyclic.iter().copied());
    order
}

/// Display groups: each chain root followed by its successors, depth first.
///
/// Achievements that are neither linked to nor from anything are not
/// chains and are omitted. Cycle members are omitted.
pub fn group_chains(links: &[ChainLink]) -> Vec<Vec<DbId>> {
    let known: BTreeSet<DbId> = links.iter().map(|l| l.id).collect();
    let cyclic = find_cycles(links);
    let children = children_of(links, &known, &cyclic);

    roots(links, &known, &cyclic)
        .into_iter()
        .filter(|root| children.contains_key(root))
        .map(|root| {
            let mut group = Vec::new();
            push_subtree(root, &children, &mut group);
            group
        })
        .collect()
}

/// Achievements with no usable predecessor, in id order.
fn roots(links: &[ChainLink], known: &BTreeSet<DbId>, cyclic: &BTreeSet<DbId>) -> Vec<DbId> {
    let mut roots: Vec<DbId> = links
        .iter()
        .filter(|l| !cyclic.contains(&l.id))
        .filter(|l| match l.chained_from {
            None => true,
            Some(p) => !known.contains(&p) || cyclic.contains(&p),
        })
        .map(|l| l.id)
        .collect();
    roots.sort_unstable();
    roots
}

/// Successor lists keyed by predecessor, each sorted by id.
fn children_of(
    links: &[ChainLink],
    known: &BTreeSet<DbId>,
    cyclic: &BTreeSet<DbId>,
) -> BTreeMap<DbId, Vec<DbId>> {
    let mut children: BTreeMap<DbId, Vec<DbId>> = BTreeMap::new();
    for link in links {
        if cyclic.contains(&link.id) {
            continue;
        }
        if let Some(p) = link.chained_from {
            if known.contains(&p) && !cyclic.contains(&p) {
                children.entry(p).or_default().push(link.id);
            }
        }
    }
    for list in children.values_mut() {
        list.sort_unstable();
    }
    children
}

fn push_subtree(root: DbId, children: &BTreeMap<DbId, Vec<DbId>>, out: &mut Vec<DbId>) {
    let mut stack = vec![root];
    while let Some(id) = stack.pop() {
        out.push(id);
        if let Some(next) = children.get(&id) {
            stack.extend(next.iter().rev().copied());
        }
    }
}
