use ahash::AHashSet;

use crate::{
    cancel::{self, CancelToken},
    errors::Result,
    registry::EdgeRef,
    store::Session,
};

/// Resolves one hop: every id reachable over `edge` from any of `sources`,
/// de-duplicated and in ascending (insertion) order.
pub(crate) fn step(
    session: &Session<'_>,
    edge: &EdgeRef,
    sources: &[i64],
    token: Option<&CancelToken>,
) -> Result<Vec<i64>> {
    let mut seen = AHashSet::new();
    let mut next = Vec::new();
    for source in sources {
        cancel::check(token)?;
        for neighbor in session.neighbors(&edge.key, edge.direction, *source)? {
            if seen.insert(neighbor) {
                next.push(neighbor);
            }
        }
    }
    next.sort_unstable();
    Ok(next)
}

/// Folds [`step`] over a path of edges. An empty frontier short-circuits.
pub(crate) fn chain(
    session: &Session<'_>,
    start: &[i64],
    path: &[EdgeRef],
    token: Option<&CancelToken>,
) -> Result<Vec<i64>> {
    let mut current = start.to_vec();
    for edge in path {
        if current.is_empty() {
            break;
        }
        current = step(session, edge, &current, token)?;
    }
    Ok(current)
}
