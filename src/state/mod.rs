//! State module for tracking crawl progress
//!
//! # Components
//!
//! - `CrawlState`: lifecycle of a crawl session (idle, running, completed, interrupted)
//! - `Frontier`: the breadth-first work queue and visited set

mod crawl_state;
mod frontier;

// Re-export main types
pub use crawl_state::CrawlState;
pub use frontier::Frontier;
