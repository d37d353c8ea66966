use url::Url;

/// Returns the network location (`host` or `host:port`) of a URL
///
/// Default ports are omitted, so `https://example.com:443/` and
/// `https://example.com/` share a netloc.
///
/// # Examples
///
/// ```
/// use url::Url;
/// use surface_scout::url::netloc;
///
/// let url = Url::parse("http://127.0.0.1:8080/api").unwrap();
/// assert_eq!(netloc(&url), Some("127.0.0.1:8080".to_string()));
/// ```
pub fn netloc(url: &Url) -> Option<String> {
    let host = url.host_str()?.to_lowercase();
    Some(match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host,
    })
}

/// Returns true if both URLs share scheme, host and port
pub fn same_origin(a: &Url, b: &Url) -> bool {
    a.scheme() == b.scheme() && netloc(a) == netloc(b)
}
