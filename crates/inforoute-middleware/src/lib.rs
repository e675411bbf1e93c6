//! `inforoute-middleware` – transport between the feed, the coordinator and
//! external observers.
//!
//! # Modules
//!
//! - [`feed`] – the [`RoadFeed`] trait the coordinator fetches through.
//! - [`fetcher`] – [`HttpFeed`], the bounded-timeout HTTP implementation.
//! - [`bus`] – topic-based publish/subscribe event bus built on Tokio
//!   broadcast channels.

pub mod bus;
pub mod feed;
pub mod fetcher;

pub use bus::{EventBus, Topic, TopicReceiver};
pub use feed::RoadFeed;
pub use fetcher::{DEFAULT_API_URL, FETCH_TIMEOUT, HttpFeed, parse_feed};
