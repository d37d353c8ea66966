//! API prefix inference
//!
//! Given a traffic log, decide the single base URL and path prefix under
//! which the application's API lives.

mod content_type;
mod prefix;

pub use content_type::{is_api_content_type, API_CONTENT_TYPES};
pub use prefix::{infer_prefix, infer_prefix_with_threshold, InferredPrefix, SEGMENT_THRESHOLD};

use crate::traffic::{TrafficError, TrafficLog};
use std::path::Path;

/// Loads a HAR file and infers the API prefix from it
///
/// # Arguments
///
/// * `har_path` - Path to the traffic log
/// * `hint_domain` - Optional `host[:port]` (or URL) of the intended target
///
/// # Returns
///
/// * `Ok(Some(prefix))` - The inferred API base
/// * `Ok(None)` - The log contains no API-like traffic
/// * `Err(TrafficError)` - The file is missing or is not a HAR document
pub fn detect_api_prefix(
    har_path: &Path,
    hint_domain: Option<&str>,
) -> Result<Option<InferredPrefix>, TrafficError> {
    tracing::info!("Analyzing traffic log {}", har_path.display());
    let log = TrafficLog::load(har_path)?;

    let prefix = infer_prefix(&log, hint_domain);
    match &prefix {
        Some(p) => tracing::info!("Detected API prefix: {}", p),
        None => tracing::info!("Could not detect an API prefix"),
    }
    Ok(prefix)
}
