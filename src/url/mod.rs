//! URL handling for reaper
//!
//! Absolute/relative URL composition, host and page extraction, the
//! cross-domain test, and derivation of the local filesystem path a page is
//! archived at. Everything here is a pure byte/str operation over bounded
//! strings; determinism of [`make_local_url`] for a fixed archive root is
//! what lets the crawler treat "file exists on disk" as "already archived".

use std::path::{Path, PathBuf};

/// Extracts the host portion of a URL: everything after the scheme up to the
/// next `/` or the end of the string. A `host:port` suffix is kept.
pub fn parse_host(url: &str) -> &str {
    let rest = strip_scheme(url);
    match rest.find('/') {
        Some(i) => &rest[..i],
        None => rest,
    }
}

/// Extracts the page (path) portion of a URL.
///
/// One trailing slash is dropped first, then the path is everything from the
/// first `/` after the host; a URL with no path yields `"/"`.
pub fn parse_page(url: &str) -> String {
    let url = url.strip_suffix('/').unwrap_or(url);
    let rest = strip_scheme(url);
    match rest.find('/') {
        Some(i) => rest[i..].to_string(),
        None => "/".to_string(),
    }
}

/// Composes an absolute URL from a link found in a page.
///
/// Resolution rules, in order:
/// 1. `http://` / `https://` links pass through unchanged;
/// 2. `//host/...` adopts the caller's scheme;
/// 3. `/...` resolves against `host`;
/// 4. anything else resolves against the directory portion of `page`.
pub fn make_full_url(secure: bool, host: &str, page: &str, link: &str) -> String {
    let scheme = if secure { "https://" } else { "http://" };

    if link.starts_with("http://") || link.starts_with("https://") {
        return link.to_string();
    }

    if let Some(rest) = link.strip_prefix("//") {
        return format!("{scheme}{rest}");
    }

    let host = host.strip_suffix('/').unwrap_or(host);

    if link.starts_with('/') {
        return format!("{scheme}{host}{link}");
    }

    let dir = match page.rfind('/') {
        Some(i) => &page[..=i],
        None => "/",
    };
    format!("{scheme}{host}{dir}{link}")
}

/// Derives the filesystem path a URL is archived at:
/// `<root>/<host>/<path>` with `?` replaced by `_` and `.html` appended when
/// the final segment carries no extension. The root page maps to
/// `index.html`.
///
/// Returns `None` for a URL with no host.
pub fn make_local_url(root: &Path, url: &str) -> Option<PathBuf> {
    let host = parse_host(url);
    if host.is_empty() {
        return None;
    }

    let page = parse_page(url);
    let mut rel = page.replace('?', "_");

    if rel == "/" {
        rel = "/index.html".to_string();
    } else {
        let filename = rel.rsplit('/').next().unwrap_or("");
        if !filename.contains('.') {
            rel.push_str(".html");
        }
    }

    Some(root.join(host).join(rel.trim_start_matches('/')))
}

/// Returns true when `url` names a different host than the crawl origin.
/// Relative URLs are never cross-domain.
pub fn is_xdomain(host: &str, url: &str) -> bool {
    if !url.starts_with("http://") && !url.starts_with("https://") {
        return false;
    }
    parse_host(url) != host
}

/// Returns true when the page a URL maps to is already present on disk.
pub fn local_archive_exists(root: &Path, url: &str) -> bool {
    match make_local_url(root, url) {
        Some(path) => path.exists(),
        None => false,
    }
}

fn strip_scheme(url: &str) -> &str {
    url.strip_prefix("http://")
        .or_else(|| url.strip_prefix("https://"))
        .unwrap_or(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_host() {
        assert_eq!(parse_host("http://t.test/a/b"), "t.test");
        assert_eq!(parse_host("https://t.test"), "t.test");
        assert_eq!(parse_host("http://t.test:8080/a"), "t.test:8080");
        assert_eq!(parse_host("t.test/a"), "t.test");
    }

    #[test]
    fn test_parse_page() {
        assert_eq!(parse_page("http://t.test/a/b"), "/a/b");
        assert_eq!(parse_page("http://t.test/a/"), "/a");
        assert_eq!(parse_page("http://t.test/"), "/");
        assert_eq!(parse_page("http://t.test"), "/");
    }

    #[test]
    fn test_host_page_round_trip() {
        for url in ["http://t.test/a/b", "http://t.test/x", "http://t.test"] {
            let rebuilt = format!("http://{}{}", parse_host(url), parse_page(url));
            assert_eq!(rebuilt.trim_end_matches('/'), url.trim_end_matches('/'));
        }
    }

    #[test]
    fn test_make_full_url_absolute_passthrough() {
        assert_eq!(
            make_full_url(false, "t.test", "/", "https://other.test/x"),
            "https://other.test/x"
        );
    }

    #[test]
    fn test_make_full_url_scheme_relative() {
        assert_eq!(
            make_full_url(false, "t.test", "/", "//cdn.test/lib.js"),
            "http://cdn.test/lib.js"
        );
        assert_eq!(
            make_full_url(true, "t.test", "/", "//cdn.test/lib.js"),
            "https://cdn.test/lib.js"
        );
    }

    #[test]
    fn test_make_full_url_host_relative() {
        assert_eq!(
            make_full_url(false, "t.test", "/a/b", "/c"),
            "http://t.test/c"
        );
    }

    #[test]
    fn test_make_full_url_directory_relative() {
        assert_eq!(
            make_full_url(false, "t.test", "/a/b", "c.html"),
            "http://t.test/a/c.html"
        );
        assert_eq!(
            make_full_url(false, "t.test", "/", "c.html"),
            "http://t.test/c.html"
        );
    }

    #[test]
    fn test_make_local_url_basic() {
        let root = Path::new("/tmp/mirror");
        assert_eq!(
            make_local_url(root, "http://t.test/a/b.html").unwrap(),
            PathBuf::from("/tmp/mirror/t.test/a/b.html")
        );
    }

    #[test]
    fn test_make_local_url_appends_extension() {
        let root = Path::new("/tmp/mirror");
        assert_eq!(
            make_local_url(root, "http://t.test/a").unwrap(),
            PathBuf::from("/tmp/mirror/t.test/a.html")
        );
    }

    #[test]
    fn test_make_local_url_root_page() {
        let root = Path::new("/tmp/mirror");
        assert_eq!(
            make_local_url(root, "http://t.test/").unwrap(),
            PathBuf::from("/tmp/mirror/t.test/index.html")
        );
    }

    #[test]
    fn test_make_local_url_query_replaced() {
        let root = Path::new("/tmp/mirror");
        assert_eq!(
            make_local_url(root, "http://t.test/p?id=1").unwrap(),
            PathBuf::from("/tmp/mirror/t.test/p_id=1.html")
        );
    }

    #[test]
    fn test_make_local_url_deterministic() {
        let root = Path::new("/tmp/mirror");
        let a = make_local_url(root, "http://t.test/a/b");
        let b = make_local_url(root, "http://t.test/a/b");
        assert_eq!(a, b);
    }

    #[test]
    fn test_is_xdomain() {
        assert!(is_xdomain("t.test", "http://other.test/x"));
        assert!(!is_xdomain("t.test", "http://t.test/x"));
        assert!(!is_xdomain("t.test", "/relative"));
    }
}
