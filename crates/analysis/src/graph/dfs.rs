use pureflow_util::index_containers::IndexSet;

use crate::graph::Node;

/// Search a directed graph depth-first from `start`, calling `pre` when a node is first reached
/// and `post` once every node reachable through it has been finished.
///
/// `pre` returns the successors of the node it is given, they are explored in the order
/// returned. Each node is visited at most once, so cycles are fine.
pub fn depth_first_search<N, I>(start: N, mut pre: impl FnMut(N) -> I, mut post: impl FnMut(N))
where
    N: Node,
    I: IntoIterator<Item = N>,
{
    depth_first_search_with(&mut (), [start], move |_, n| pre(n), move |_, n| post(n));
}

/// A version of `depth_first_search` that threads a mutable state through every callback, and
/// that searches from several roots in turn.
///
/// Roots that were already reached from an earlier root are skipped, so the result is a
/// depth-first forest covering everything reachable from any root.
pub fn depth_first_search_with<S, N, I>(
    state: &mut S,
    roots: impl IntoIterator<Item = N>,
    mut pre: impl FnMut(&mut S, N) -> I,
    mut post: impl FnMut(&mut S, N),
) where
    N: Node,
    I: IntoIterator<Item = N>,
{
    let mut stack = Vec::new();
    let mut visited = IndexSet::new();

    for root in roots {
        if !visited.insert(root.index()) {
            continue;
        }
        stack.push((root, pre(state, root).into_iter()));

        while let Some((node, iter)) = stack.last_mut() {
            if let Some(next) = iter.next() {
                if visited.insert(next.index()) {
                    stack.push((next, pre(state, next).into_iter()))
                }
            } else {
                post(state, *node);
                stack.pop();
            }
        }
    }
}

/// Accumulate nodes reachable from `roots` in DFS post-order.
pub fn dfs_post_order<N, I>(
    roots: impl IntoIterator<Item = N>,
    successors: impl Fn(N) -> I,
) -> Vec<N>
where
    N: Node,
    I: IntoIterator<Item = N>,
{
    let mut post_order = Vec::new();
    depth_first_search_with(
        &mut post_order,
        roots,
        |_, n| successors(n),
        |post_order, n| post_order.push(n),
    );
    post_order
}

/// The reverse of `dfs_post_order`, a topological sorting of the acyclic part of the graph.
pub fn topological_order<N, I>(start: N, successors: impl Fn(N) -> I) -> Vec<N>
where
    N: Node,
    I: IntoIterator<Item = N>,
{
    let mut v = dfs_post_order([start], successors);
    v.reverse();
    v
}

#[cfg(test)]
mod tests {
    use pureflow_util::index_containers::IndexMap;

    use super::*;

    fn diamond() -> IndexMap<Vec<usize>> {
        let mut successors = IndexMap::new();
        successors.insert(1, vec![2, 3]);
        successors.insert(2, vec![4]);
        successors.insert(3, vec![4]);
        successors.insert(4, vec![1]);
        successors.insert(5, vec![4]);
        successors
    }

    #[test]
    fn test_dfs() {
        let successors = diamond();

        let mut pre = Vec::new();
        let mut post = Vec::new();

        depth_first_search(
            1,
            |i| {
                pre.push(i);
                successors[i].iter().copied()
            },
            |i| post.push(i),
        );

        assert_eq!(pre, [1, 2, 4, 3]);
        assert_eq!(post, [4, 2, 3, 1]);
    }

    #[test]
    fn test_forest_skips_reached_roots() {
        let successors = diamond();
        let order = dfs_post_order([2, 5, 1], |i| successors[i].iter().copied());
        assert_eq!(order, [3, 1, 4, 2, 5]);

        let topo = topological_order(1, |i| successors[i].iter().copied());
        assert_eq!(topo, [1, 3, 2, 4]);
    }
}
