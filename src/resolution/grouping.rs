//! Transitive closure of duplicate pairs into candidate groups

use petgraph::unionfind::UnionFind;
use std::collections::{BTreeMap, HashMap};

/// Close `pairs` transitively into disjoint groups of two or more ids.
///
/// Members of each group are sorted, and groups are ordered by their first
/// member, so the output does not depend on the order pairs were found in.
pub fn close_pairs(pairs: &[(String, String)]) -> Vec<Vec<String>> {
    let mut index: HashMap<&str, usize> = HashMap::new();
    let mut ids: Vec<&str> = Vec::new();
    for (a, b) in pairs {
        for id in [a.as_str(), b.as_str()] {
            index.entry(id).or_insert_with(|| {
                ids.push(id);
                ids.len() - 1
            });
        }
    }

    let mut sets = UnionFind::<usize>::new(ids.len());
    for (a, b) in pairs {
        sets.union(index[a.as_str()], index[b.as_str()]);
    }

    let mut groups: BTreeMap<usize, Vec<String>> = BTreeMap::new();
    for (i, id) in ids.iter().enumerate() {
        groups.entry(sets.find(i)).or_default().push(id.to_string());
    }

    let mut groups: Vec<Vec<String>> = groups
        .into_values()
        .filter(|g| g.len() > 1)
        .map(|mut g| {
            g.sort();
            g.dedup();
            g
        })
        .filter(|g| g.len() > 1)
        .collect();
    groups.sort();
    groups
}
