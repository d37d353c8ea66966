/// Path suffixes of resources that never expose API behaviour
pub const STATIC_EXTENSIONS: &[&str] = &[
    ".jpg", ".jpeg", ".png", ".gif", ".css", ".js", ".ico", ".svg", ".woff", ".woff2", ".ttf",
    ".eot", ".mp4", ".mp3", ".pdf",
];

/// Returns true if a URL path names a static asset (case-insensitive)
pub fn is_static_asset(path: &str) -> bool {
    let lower = path.to_ascii_lowercase();
    STATIC_EXTENSIONS.iter().any(|ext| lower.ends_with(ext))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_assets() {
        assert!(is_static_asset("/image.png"));
        assert!(is_static_asset("/static/app.JS"));
        assert!(is_static_asset("/Fonts/Body.WOFF2"));
        assert!(is_static_asset("/docs/manual.pdf"));
    }

    #[test]
    fn test_non_assets() {
        assert!(!is_static_asset("/"));
        assert!(!is_static_asset("/api/users"));
        assert!(!is_static_asset("/json"));
        assert!(!is_static_asset("/page.html"));
    }
}
