//! URL handling module for Surface-Scout
//!
//! This module provides link normalization, origin comparison and the
//! static-asset filter that together decide which discovered links the
//! crawler may enqueue.

mod asset;
mod domain;
mod normalize;

use ::url::Url;

// Re-export main functions
pub use asset::{is_static_asset, STATIC_EXTENSIONS};
pub use domain::{netloc, same_origin};
pub use normalize::normalize_url;

/// Decides whether a discovered link may enter the crawl frontier
///
/// A link is crawlable when it uses HTTP(S), shares scheme, host and port
/// with the start URL, and does not name a static asset. Visited-set
/// membership is checked by the frontier itself.
///
/// # Examples
///
/// ```
/// use url::Url;
/// use surface_scout::url::is_crawlable;
///
/// let start = Url::parse("http://test.com/").unwrap();
/// assert!(is_crawlable(&Url::parse("http://test.com/path").unwrap(), &start));
/// assert!(!is_crawlable(&Url::parse("http://google.com/").unwrap(), &start));
/// assert!(!is_crawlable(&Url::parse("http://test.com/image.png").unwrap(), &start));
/// ```
pub fn is_crawlable(link: &Url, start: &Url) -> bool {
    matches!(link.scheme(), "http" | "https")
        && same_origin(link, start)
        && !is_static_asset(link.path())
}
