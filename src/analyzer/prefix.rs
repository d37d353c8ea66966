use crate::analyzer::content_type::is_api_content_type;
use crate::traffic::TrafficLog;
use crate::url::netloc;
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use url::Url;

/// Fraction of base-matching API requests a segment must appear in to be
/// accepted into the prefix
///
/// The fraction is always taken against the full base-matching count, never
/// the narrowing subset, so `/api` survives even when `/api/v1` and
/// `/api/v2` each fall below the threshold on their own.
pub const SEGMENT_THRESHOLD: f64 = 0.6;

/// The believed API base: scheme, network location and path prefix
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InferredPrefix {
    pub scheme: String,
    pub netloc: String,
    pub segments: Vec<String>,
}

impl InferredPrefix {
    /// `scheme://netloc` without any path
    pub fn base_url(&self) -> String {
        format!("{}://{}", self.scheme, self.netloc)
    }

    /// The accepted path prefix, `""` when no segment was accepted
    pub fn path(&self) -> String {
        if self.segments.is_empty() {
            String::new()
        } else {
            format!("/{}", self.segments.join("/"))
        }
    }
}

impl fmt::Display for InferredPrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.base_url(), self.path())
    }
}

/// Infers the dominant API base URL from a traffic log
///
/// # Algorithm
///
/// 1. Keep entries whose response MIME type is on the API allow-list
/// 2. If `hint_domain` is given, keep only entries on that host; if none
///    match, fall back to all API entries rather than giving up
/// 3. Pick the most frequent `(scheme, netloc)` pair (ties go to the pair
///    seen first)
/// 4. Walk path segments level by level, accepting the most frequent
///    segment while it covers at least [`SEGMENT_THRESHOLD`] of all
///    base-matching requests
///
/// Returns `None` when the log contains no API-like traffic.
///
/// # Examples
///
/// ```
/// use surface_scout::analyzer::infer_prefix;
/// use surface_scout::traffic::{TrafficEntry, TrafficLog};
///
/// let log: TrafficLog = vec![
///     TrafficEntry::new("https://api.example.com/v1/users", "GET", "application/json", 200),
///     TrafficEntry::new("https://api.example.com/v1/posts", "GET", "application/json", 200),
/// ]
/// .into_iter()
/// .collect();
///
/// let prefix = infer_prefix(&log, None).unwrap();
/// assert_eq!(prefix.to_string(), "https://api.example.com/v1");
/// ```
pub fn infer_prefix(log: &TrafficLog, hint_domain: Option<&str>) -> Option<InferredPrefix> {
    infer_prefix_with_threshold(log, hint_domain, SEGMENT_THRESHOLD)
}

/// [`infer_prefix`] with an explicit segment acceptance threshold
pub fn infer_prefix_with_threshold(
    log: &TrafficLog,
    hint_domain: Option<&str>,
    threshold: f64,
) -> Option<InferredPrefix> {
    let api_urls: Vec<Url> = log
        .entries()
        .iter()
        .filter(|entry| is_api_content_type(&entry.content_type))
        .filter_map(|entry| match Url::parse(&entry.url) {
            Ok(url) if url.host_str().is_some() => Some(url),
            _ => {
                tracing::debug!("Skipping unparseable traffic URL: {}", entry.url);
                None
            }
        })
        .collect();

    if api_urls.is_empty() {
        tracing::info!("No API traffic detected in traffic log");
        return None;
    }

    let candidates = restrict_to_hint(api_urls, hint_domain);

    let origins = candidates
        .iter()
        .filter_map(|url| Some((url.scheme().to_string(), netloc(url)?)));
    let ((scheme, host), _) = stable_mode(origins)?;

    let segment_lists: Vec<Vec<String>> = candidates
        .iter()
        .filter(|url| url.scheme() == scheme && netloc(url).as_deref() == Some(host.as_str()))
        .map(|url| split_segments(url.path()))
        .collect();

    let segments = common_segments(&segment_lists, threshold);

    Some(InferredPrefix {
        scheme,
        netloc: host,
        segments,
    })
}

/// Narrows API URLs to the hinted host, reverting to all of them on no match
fn restrict_to_hint(api_urls: Vec<Url>, hint_domain: Option<&str>) -> Vec<Url> {
    let Some(hint) = hint_domain.map(hint_netloc) else {
        return api_urls;
    };

    let matching: Vec<Url> = api_urls
        .iter()
        .filter(|url| netloc(url).as_deref() == Some(hint.as_str()))
        .cloned()
        .collect();

    if matching.is_empty() {
        tracing::info!(
            "No API calls matched {}, falling back to all captured traffic",
            hint
        );
        api_urls
    } else {
        tracing::info!("Filtered to {} API calls matching {}", matching.len(), hint);
        matching
    }
}

/// Accepts either a bare `host[:port]` or a full URL as the hint
fn hint_netloc(hint: &str) -> String {
    if hint.contains("://") {
        if let Some(n) = Url::parse(hint).ok().as_ref().and_then(netloc) {
            return n;
        }
    }
    hint.trim().trim_end_matches('/').to_lowercase()
}

/// Splits a URL path into segments, ignoring leading and trailing slashes
fn split_segments(path: &str) -> Vec<String> {
    let trimmed = path.trim_matches('/');
    if trimmed.is_empty() {
        return Vec::new();
    }
    trimmed.split('/').map(str::to_string).collect()
}

/// Level-by-level walk keeping the dominant segment while it clears the threshold
fn common_segments(segment_lists: &[Vec<String>], threshold: f64) -> Vec<String> {
    let total = segment_lists.len();
    if total == 0 {
        return Vec::new();
    }

    let mut accepted = Vec::new();
    let mut alive: Vec<&Vec<String>> = segment_lists.iter().collect();
    let mut depth = 0;

    loop {
        let at_depth = alive.iter().filter_map(|segments| segments.get(depth));
        let Some((segment, count)) = stable_mode(at_depth) else {
            break;
        };

        if segment.is_empty() || (count as f64) / (total as f64) < threshold {
            break;
        }

        let segment = segment.clone();
        alive.retain(|segments| segments.get(depth) == Some(&segment));
        accepted.push(segment);
        depth += 1;
    }

    accepted
}

/// Most frequent item with its count; ties go to the item seen first
fn stable_mode<T, I>(items: I) -> Option<(T, usize)>
where
    T: Eq + Hash + Clone,
    I: IntoIterator<Item = T>,
{
    let mut counts: HashMap<T, usize> = HashMap::new();
    let mut first_seen: Vec<T> = Vec::new();

    for item in items {
        let count = counts.entry(item.clone()).or_insert(0);
        if *count == 0 {
            first_seen.push(item);
        }
        *count += 1;
    }

    let mut best: Option<(T, usize)> = None;
    for item in first_seen {
        let count = counts[&item];
        if best.as_ref().map_or(true, |(_, best_count)| count > *best_count) {
            best = Some((item, count));
        }
    }
    best
}
