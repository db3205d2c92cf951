//! Feed retrieval and normalization.
//!
//! - **Fetching**: browser-like HTTP retrieval, optionally through a relay
//! - **Parsing**: RSS 2.0 and Atom into a single [`FeedPage`] shape
//! - **Pagination**: `start-index`/`max-results` windows for Blogger-style feeds
//! - **Thumbnails**: canonical sizing for Google-hosted images
//!
//! # Architecture
//!
//! - [`fetcher`] - HTTP retrieval with a size cap and error taxonomy
//! - [`parser`] - field resolution over a generic XML tree
//! - [`loader`] - fetch → parse behind the page cache
//!
//! # Example
//!
//! ```ignore
//! let loader = CachedFeedLoader::new(fetcher, cache, DEFAULT_PAGE_TTL);
//! let (page, status) = loader.load(url, PageRequest::first(25)).await?;
//! ```

mod error;
pub mod fetcher;
pub mod loader;
mod model;
mod pagination;
pub mod parser;
mod thumbnail;
mod xml_tree;

pub use error::FeedError;
pub use fetcher::{FeedFetcher, FetchedBody, FetcherSettings, DEFAULT_USER_AGENT};
pub use loader::{CacheStatus, CachedFeedLoader, FeedSource};
pub use model::{Article, Channel, FeedPage};
pub use pagination::{page_url, supports_pagination, PageRequest, PAGINATED_PATH_FRAGMENT};
pub use parser::parse_feed;
pub use thumbnail::{normalize_thumbnail, ThumbnailSize};
