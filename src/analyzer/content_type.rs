/// MIME types whose responses are treated as API traffic
///
/// Matching is a case-insensitive substring test, so parameters such as
/// `; charset=utf-8` do not prevent a match.
pub const API_CONTENT_TYPES: &[&str] = &[
    "application/json",
    "application/xml",
    "text/xml",
    "application/hal+json",
    "application/vnd.api+json",
    "text/html",
    "application/x-www-form-urlencoded",
    "multipart/form-data",
    "text/plain",
];

/// Returns true if a response MIME type looks like API traffic
pub fn is_api_content_type(mime_type: &str) -> bool {
    let lower = mime_type.to_ascii_lowercase();
    API_CONTENT_TYPES.iter().any(|t| lower.contains(t))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_types() {
        assert!(is_api_content_type("application/json"));
        assert!(is_api_content_type("Application/JSON; charset=utf-8"));
        assert!(is_api_content_type("text/html"));
        assert!(is_api_content_type("application/x-www-form-urlencoded"));
        assert!(is_api_content_type("text/plain"));
        assert!(is_api_content_type("text/xml"));
    }

    #[test]
    fn test_non_api_types() {
        assert!(!is_api_content_type(""));
        assert!(!is_api_content_type("image/png"));
        assert!(!is_api_content_type("text/css"));
        assert!(!is_api_content_type("application/javascript"));
        assert!(!is_api_content_type("font/woff2"));
    }
}
