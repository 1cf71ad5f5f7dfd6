//! Tarjan's strongly connected components, shared by the type-constructor
//! and value-binding dependency analyses.

use std::collections::HashMap;
use std::hash::Hash;

/// Components of the graph over nodes `0..n`, where `edges(v)` lists the
/// nodes `v` depends on. Components are returned dependencies first; nodes
/// within a component keep their input order. Edges to nodes `>= n` are
/// ignored.
pub fn strongly_connected<F, I>(n: usize, mut edges: F) -> Vec<Vec<usize>>
where
    F: FnMut(usize) -> I,
    I: IntoIterator<Item = usize>,
{
    let succs: Vec<Vec<usize>> = (0..n)
        .map(|v| edges(v).into_iter().filter(|&w| w < n).collect())
        .collect();

    let mut index: Vec<Option<usize>> = vec![None; n];
    let mut low = vec![0; n];
    let mut on_stack = vec![false; n];
    let mut stack = Vec::new();
    let mut next_index = 0;
    let mut components = Vec::new();

    for root in 0..n {
        if index[root].is_some() {
            continue;
        }
        index[root] = Some(next_index);
        low[root] = next_index;
        next_index += 1;
        stack.push(root);
        on_stack[root] = true;
        let mut calls: Vec<(usize, usize)> = vec![(root, 0)];

        while let Some(&mut (v, ref mut pos)) = calls.last_mut() {
            if let Some(&w) = succs[v].get(*pos) {
                *pos += 1;
                match index[w] {
                    None => {
                        index[w] = Some(next_index);
                        low[w] = next_index;
                        next_index += 1;
                        stack.push(w);
                        on_stack[w] = true;
                        calls.push((w, 0));
                    }
                    Some(iw) if on_stack[w] => low[v] = low[v].min(iw),
                    Some(_) => {}
                }
                continue;
            }

            calls.pop();
            if let Some(&(u, _)) = calls.last() {
                low[u] = low[u].min(low[v]);
            }
            if Some(low[v]) == index[v] {
                let mut component = Vec::new();
                while let Some(w) = stack.pop() {
                    on_stack[w] = false;
                    component.push(w);
                    if w == v {
                        break;
                    }
                }
                component.sort_unstable();
                components.push(component);
            }
        }
    }
    components
}

/// [`strongly_connected`] over arbitrary node handles.
pub fn strongly_connected_by<K, F>(nodes: &[K], mut deps: F) -> Vec<Vec<K>>
where
    K: Copy + Eq + Hash,
    F: FnMut(K) -> Vec<K>,
{
    let position: HashMap<K, usize> = nodes.iter().enumerate().map(|(i, &k)| (k, i)).collect();
    strongly_connected(nodes.len(), |v| {
        deps(nodes[v])
            .into_iter()
            .filter_map(|k| position.get(&k).copied())
            .collect::<Vec<_>>()
    })
    .into_iter()
    .map(|component| component.into_iter().map(|i| nodes[i]).collect())
    .collect()
}
