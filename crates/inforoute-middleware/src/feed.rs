//! The road feed seam.
//!
//! The coordinator never talks HTTP itself.  It asks a [`RoadFeed`] for the
//! current list of road items; [`HttpFeed`][crate::fetcher::HttpFeed] is the
//! production implementation, tests plug in scripted feeds.

use async_trait::async_trait;
use inforoute_types::{FetchError, RoadItem};

/// Source of road advisories.
///
/// # Contract
///
/// * One call performs exactly one upstream fetch, without retries.
/// * On success the returned list contains no point-geometry item and keeps
///   the upstream order.
/// * On failure no partial result is returned.
#[async_trait]
pub trait RoadFeed: Send + Sync {
    async fn fetch(&self) -> Result<Vec<RoadItem>, FetchError>;
}
