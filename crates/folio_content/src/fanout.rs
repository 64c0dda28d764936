//! The single bounded fan-out primitive.
//!
//! Every place the engine resolves independent reads concurrently - sibling
//! fields, array rows, junction-joined targets, multi-id file lookups -
//! goes through [`resolve_ordered`]. One primitive, one concurrency bound,
//! and output order always equals input order.

use futures::stream::{self, StreamExt};
use std::future::Future;

/// Run `f` over `items` with at most `limit` futures in flight, collecting
/// results in input order.
///
/// A limit of zero is treated as one; the bound caps pool pressure, it
/// never disables the work.
pub async fn resolve_ordered<T, U, F, Fut>(items: Vec<T>, limit: usize, f: F) -> Vec<U>
where
    F: Fn(T) -> Fut,
    Fut: Future<Output = U>,
{
    stream::iter(items)
        .map(f)
        .buffered(limit.max(1))
        .collect()
        .await
}
