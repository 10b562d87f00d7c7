//! Fan-out and result reconciliation shared by the composite routers.

use futures::stream::{FuturesUnordered, StreamExt};
use meridian_core::{PeerAddrInfo, Routing, RoutingError};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use crate::registry::RouterEntry;

/// Collapse the member errors of a read that found nothing.
///
/// `NotSupported` carries no opinion. If any member answered `NotFound`, or
/// nobody had an opinion, the aggregate is `NotFound`; only when every
/// opinionated member failed for real do we surface `AllFailed`.
pub(crate) fn reconcile_read_errors(errors: Vec<RoutingError>) -> RoutingError {
    let mut failures = Vec::new();
    let mut answered_not_found = false;
    for err in errors {
        if err.is_not_found() {
            answered_not_found = true;
        } else if !err.is_not_supported() {
            failures.push(err);
        }
    }
    if answered_not_found || failures.is_empty() {
        RoutingError::NotFound
    } else {
        RoutingError::AllFailed(failures)
    }
}

/// Collapse the member results of a write.
///
/// One success is enough. Members that do not support the write are skipped,
/// so a write nobody supports is a no-op.
pub(crate) fn reconcile_writes(
    entries: &[RouterEntry],
    results: Vec<Result<(), RoutingError>>,
    op: &'static str,
) -> Result<(), RoutingError> {
    let mut succeeded = false;
    let mut failures = Vec::new();
    for (entry, result) in entries.iter().zip(results) {
        match result {
            Ok(()) => succeeded = true,
            Err(e) if e.is_not_supported() => {}
            Err(e) => {
                tracing::debug!(router = %entry.name(), op, error = %e, "router write failed");
                failures.push(e);
            }
        }
    }
    if succeeded || failures.is_empty() {
        Ok(())
    } else {
        Err(RoutingError::AllFailed(failures))
    }
}

/// Run `op` on every member concurrently; results come back in member order.
pub(crate) async fn all_settled<T, F, Fut>(
    entries: &[RouterEntry],
    op: F,
) -> Vec<Result<T, RoutingError>>
where
    F: Fn(Arc<dyn Routing>) -> Fut + Send,
    Fut: Future<Output = Result<T, RoutingError>> + Send,
    T: Send,
{
    futures::future::join_all(entries.iter().map(|e| op(e.router.clone()))).await
}

/// Run `op` on every member concurrently and return the result of the
/// most-preferred member that succeeds.
///
/// A member's success is returned as soon as every member ahead of it has
/// finished without success; slower, less-preferred members are dropped.
pub(crate) async fn first_by_priority<T, F, Fut>(
    entries: &[RouterEntry],
    op: F,
) -> Result<T, RoutingError>
where
    F: Fn(Arc<dyn Routing>) -> Fut + Send,
    Fut: Future<Output = Result<T, RoutingError>> + Send,
    T: Send,
{
    let mut pending: FuturesUnordered<_> = entries
        .iter()
        .enumerate()
        .map(|(i, e)| {
            let fut = op(e.router.clone());
            async move { (i, fut.await) }
        })
        .collect();

    let mut slots: Vec<Option<Result<T, RoutingError>>> =
        std::iter::repeat_with(|| None).take(entries.len()).collect();
    let mut errors = Vec::new();
    let mut next = 0;

    while let Some((i, result)) = pending.next().await {
        slots[i] = Some(result);
        while next < slots.len() {
            match slots[next].take() {
                None => break,
                Some(Ok(value)) => {
                    tracing::trace!(router = %entries[next].name(), "routing answer selected");
                    return Ok(value);
                }
                Some(Err(e)) => {
                    if !e.is_not_found() && !e.is_not_supported() {
                        tracing::debug!(router = %entries[next].name(), error = %e, "router lookup failed");
                    }
                    errors.push(e);
                    next += 1;
                }
            }
        }
    }

    Err(reconcile_read_errors(errors))
}

/// Merge provider lists in order, de-duplicating peers and capping at `limit`
/// distinct peers (`0` = unlimited).
pub(crate) fn merge_providers<I>(lists: I, limit: usize) -> Vec<PeerAddrInfo>
where
    I: IntoIterator<Item = Vec<PeerAddrInfo>>,
{
    let mut merged: Vec<PeerAddrInfo> = Vec::new();
    let mut index = HashMap::new();
    for list in lists {
        for info in list {
            if let Some(&pos) = index.get(&info.peer_id) {
                let existing: &mut PeerAddrInfo = &mut merged[pos];
                existing.merge(info);
            } else if limit == 0 || merged.len() < limit {
                index.insert(info.peer_id, merged.len());
                merged.push(info);
            }
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use libp2p::{Multiaddr, PeerId};

    fn addr(s: &str) -> Multiaddr {
        s.parse().unwrap()
    }

    #[test]
    fn test_reconcile_read_errors() {
        assert!(reconcile_read_errors(vec![]).is_not_found());
        assert!(reconcile_read_errors(vec![RoutingError::NotSupported]).is_not_found());
        assert!(
            reconcile_read_errors(vec![RoutingError::Offline, RoutingError::NotFound])
                .is_not_found()
        );
        match reconcile_read_errors(vec![RoutingError::Offline, RoutingError::NotSupported]) {
            RoutingError::AllFailed(errs) => assert_eq!(errs.len(), 1),
            other => panic!("unexpected: {other}"),
        }
    }

    #[test]
    fn test_merge_providers_dedups_and_limits() {
        let p1 = PeerId::random();
        let p2 = PeerId::random();
        let p3 = PeerId::random();

        let merged = merge_providers(
            vec![
                vec![PeerAddrInfo::new(p1, vec![addr("/ip4/1.1.1.1/tcp/1")])],
                vec![
                    PeerAddrInfo::new(p2, vec![]),
                    PeerAddrInfo::new(p1, vec![addr("/ip4/9.9.9.9/tcp/9")]),
                ],
                vec![PeerAddrInfo::new(p3, vec![])],
            ],
            2,
        );

        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].peer_id, p1);
        assert_eq!(merged[0].addrs.len(), 2);
        assert_eq!(merged[1].peer_id, p2);
    }

    #[test]
    fn test_merge_providers_unlimited() {
        let lists: Vec<Vec<PeerAddrInfo>> = (0..5)
            .map(|_| vec![PeerAddrInfo::new(PeerId::random(), vec![])])
            .collect();
        assert_eq!(merge_providers(lists, 0).len(), 5);
    }
}
