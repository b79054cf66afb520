//! Link extraction and rewriting
//!
//! Both passes walk the same fixed table of URL-bearing attributes. The
//! extract pass offers every candidate to the frontier; the rewrite pass
//! splices the archived local path over the original link in place. The
//! splice reallocates the buffer, so both passes carry their cursors as
//! offsets.

use crate::buf::Buf;
use crate::config::Config;
use crate::frontier::{Frontier, FrontierPair};
use crate::http::HTTP_URL_MAX;
use crate::url::{is_xdomain, local_archive_exists, make_full_url, make_local_url};
use std::path::Path;

/// One URL-bearing attribute: the prefix that introduces it and the quote
/// that ends it.
struct UrlType {
    prefix: &'static [u8],
    delim: u8,
}

const URL_TYPES: [UrlType; 4] = [
    UrlType {
        prefix: b"href=\"",
        delim: b'"',
    },
    UrlType {
        prefix: b"href='",
        delim: b'\'',
    },
    UrlType {
        prefix: b"src=\"",
        delim: b'"',
    },
    UrlType {
        prefix: b"src='",
        delim: b'\'',
    },
];

/// Substrings that disqualify a candidate URL outright.
const DISALLOWED_TOKENS: [&str; 5] = ["javascript:", "data:image", ".exe", ".dll", "cgi-"];

/// Extensions whose pages are never scanned for links.
const NO_PARSE_EXTENSIONS: [&str; 9] = [
    ".jpg", ".jpeg", ".png", ".gif", ".js", ".css", ".pdf", ".svg", ".ico",
];

/// Candidates at or beyond this length are rejected by the acceptability
/// test before they reach the frontier.
const URL_ACCEPT_MAX: usize = 256;

/// True when a URL names a page worth scanning for links.
pub fn url_parseable(url: &str) -> bool {
    !NO_PARSE_EXTENSIONS.iter().any(|ext| url.contains(ext))
}

/// The frontier admission test.
///
/// A candidate is accepted only if it is short enough, not yet archived on
/// disk, fragment-free, free of disallowed tokens, on the origin host (or
/// cross-domain crawling is enabled), and absent from the draining
/// generation's tree.
pub fn url_acceptable(
    full_url: &str,
    origin_host: &str,
    config: &Config,
    draining: &Frontier,
) -> bool {
    if full_url.len() >= URL_ACCEPT_MAX {
        return false;
    }

    if local_archive_exists(&config.archive_root, full_url) {
        return false;
    }

    if full_url.contains('#') {
        return false;
    }

    if DISALLOWED_TOKENS.iter().any(|t| full_url.contains(t)) {
        return false;
    }

    if is_xdomain(origin_host, full_url) && !config.allow_xdomain() {
        return false;
    }

    !draining.contains(full_url)
}

/// Extract pass: sweeps the response body for each URL attribute, composes
/// absolute URLs and inserts the acceptable ones into the filling frontier.
/// Returns how many URLs were inserted.
pub fn extract_links(
    buf: &Buf,
    secure: bool,
    host: &str,
    page: &str,
    origin_host: &str,
    config: &Config,
    pair: &mut FrontierPair,
) -> usize {
    let mut inserted = 0;
    let mut type_idx = 0;
    let mut savep = 0usize;

    while type_idx < URL_TYPES.len() {
        let ut = &URL_TYPES[type_idx];

        let Some(p) = buf.find_from(savep, ut.prefix) else {
            type_idx += 1;
            savep = 0;
            continue;
        };
        let url_start = p + ut.prefix.len();
        let Some(url_end) = buf.find_from(url_start, &[ut.delim]) else {
            type_idx += 1;
            savep = 0;
            continue;
        };

        let range = url_end - url_start;
        if range == 0 || range >= HTTP_URL_MAX {
            savep = url_end + 1;
            continue;
        }

        let candidate = String::from_utf8_lossy(&buf.as_slice()[url_start..url_end]).into_owned();
        let full = make_full_url(secure, host, page, &candidate);

        if url_acceptable(&full, origin_host, config, pair.draining())
            && pair.filling_mut().insert(&full)
        {
            inserted += 1;
        }

        savep = url_end + 1;
    }

    inserted
}

/// Rewrite pass: splices `file://<local path>` over every rewritable link.
///
/// Absolute `http(s)://` links, already rewritten `file://` links, empty
/// spans and over-long spans are left untouched, which also makes a second
/// pass over the same body a no-op. The cursor and span bounds are offsets;
/// `collapse` and `shift` may both reallocate the buffer mid-splice.
pub fn rewrite_links(buf: &mut Buf, secure: bool, host: &str, page: &str, root: &Path) {
    let mut type_idx = 0;
    let mut savep = 0usize;

    while type_idx < URL_TYPES.len() {
        let ut = &URL_TYPES[type_idx];

        let Some(p) = buf.find_from(savep, ut.prefix) else {
            type_idx += 1;
            savep = 0;
            continue;
        };
        let url_start = p + ut.prefix.len();
        let Some(url_end) = buf.find_from(url_start, &[ut.delim]) else {
            type_idx += 1;
            savep = 0;
            continue;
        };

        let range = url_end - url_start;
        if range == 0 || range >= HTTP_URL_MAX {
            savep = url_end + 1;
            continue;
        }

        let span = &buf.as_slice()[url_start..url_end];
        if span.starts_with(b"http://")
            || span.starts_with(b"https://")
            || span.starts_with(b"file://")
        {
            savep = url_end + 1;
            continue;
        }

        let candidate = String::from_utf8_lossy(span).into_owned();
        let full = make_full_url(secure, host, page, &candidate);
        let Some(local) = make_local_url(root, &full) else {
            savep = url_end + 1;
            continue;
        };
        let local = format!("file://{}", local.display());

        buf.collapse(url_start, range);
        buf.shift(url_start, local.len());
        buf.write_at(url_start, local.as_bytes());

        savep = url_start + local.len() + 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontier::FrontierPair;
    use std::path::PathBuf;

    fn test_config() -> Config {
        Config::new(
            "http://t.test/".to_string(),
            1,
            0,
            false,
            false,
            Some(PathBuf::from("/nonexistent/reaper-test-mirror")),
            true,
        )
    }

    fn body_buf(body: &str) -> Buf {
        let mut buf = Buf::new();
        buf.append(body);
        buf
    }

    #[test]
    fn test_url_parseable() {
        assert!(url_parseable("http://t.test/page"));
        assert!(!url_parseable("http://t.test/logo.png"));
        assert!(!url_parseable("http://t.test/style.css"));
    }

    #[test]
    fn test_extract_same_origin_links() {
        let config = test_config();
        let mut pair = FrontierPair::new(8);
        let buf = body_buf(r#"<a href="/a">A</a> <a href="/b">B</a>"#);

        let n = extract_links(&buf, false, "t.test", "/", "t.test", &config, &mut pair);
        assert_eq!(n, 2);
        assert!(pair.filling().contains("http://t.test/a"));
        assert!(pair.filling().contains("http://t.test/b"));
    }

    #[test]
    fn test_extract_all_attribute_forms() {
        let config = test_config();
        let mut pair = FrontierPair::new(8);
        let buf = body_buf("<a href=\"/a\"> <a href='/b'> <img src=\"/c\"> <img src='/d'>");

        let n = extract_links(&buf, false, "t.test", "/", "t.test", &config, &mut pair);
        assert_eq!(n, 4);
    }

    #[test]
    fn test_extract_rejects_javascript_scheme() {
        let config = test_config();
        let mut pair = FrontierPair::new(8);
        let buf = body_buf(r#"<a href="javascript:void(0)">x</a>"#);

        let n = extract_links(&buf, false, "t.test", "/", "t.test", &config, &mut pair);
        assert_eq!(n, 0);
        assert!(pair.filling().is_empty());
    }

    #[test]
    fn test_extract_rejects_fragments_and_tokens() {
        let config = test_config();
        let mut pair = FrontierPair::new(8);
        let buf = body_buf(
            r#"<a href="/page#section">x</a> <a href="/setup.exe">y</a> <a href="/cgi-bin/q">z</a>"#,
        );

        let n = extract_links(&buf, false, "t.test", "/", "t.test", &config, &mut pair);
        assert_eq!(n, 0);
    }

    #[test]
    fn test_extract_rejects_cross_domain_by_default() {
        let config = test_config();
        let mut pair = FrontierPair::new(8);
        let buf = body_buf(r#"<a href="http://other.test/x">x</a>"#);

        let n = extract_links(&buf, false, "t.test", "/", "t.test", &config, &mut pair);
        assert_eq!(n, 0);
    }

    #[test]
    fn test_extract_accepts_cross_domain_when_enabled() {
        let config = Config::new(
            "http://t.test/".to_string(),
            1,
            0,
            true,
            false,
            Some(PathBuf::from("/nonexistent/reaper-test-mirror")),
            true,
        );
        let mut pair = FrontierPair::new(8);
        let buf = body_buf(r#"<a href="http://other.test/x">x</a>"#);

        let n = extract_links(&buf, false, "t.test", "/", "t.test", &config, &mut pair);
        assert_eq!(n, 1);
    }

    #[test]
    fn test_extract_skips_draining_duplicates() {
        let config = test_config();
        let mut pair = FrontierPair::new(8);
        pair.draining_mut().insert("http://t.test/a");
        let buf = body_buf(r#"<a href="/a">A</a> <a href="/b">B</a>"#);

        let n = extract_links(&buf, false, "t.test", "/", "t.test", &config, &mut pair);
        assert_eq!(n, 1);
        assert!(!pair.filling().contains("http://t.test/a"));
    }

    #[test]
    fn test_rewrite_splices_local_path() {
        let root = PathBuf::from("/tmp/mirror");
        let mut buf = body_buf(r#"<a href="/a">A</a>"#);

        rewrite_links(&mut buf, false, "t.test", "/", &root);

        let out = String::from_utf8_lossy(buf.as_slice()).into_owned();
        assert!(out.contains(r#"href="file:///tmp/mirror/t.test/a.html""#));
    }

    #[test]
    fn test_rewrite_leaves_absolute_urls() {
        let root = PathBuf::from("/tmp/mirror");
        let original = r#"<a href="http://other.test/x">x</a>"#;
        let mut buf = body_buf(original);

        rewrite_links(&mut buf, false, "t.test", "/", &root);
        assert_eq!(buf.as_slice(), original.as_bytes());
    }

    #[test]
    fn test_rewrite_is_idempotent() {
        let root = PathBuf::from("/tmp/mirror");
        let mut buf = body_buf(
            r#"<html><body><a href="/a">A</a> <img src='pic'> <a href="/b?x=1">B</a></body></html>"#,
        );

        rewrite_links(&mut buf, false, "t.test", "/", &root);
        let first = buf.as_slice().to_vec();

        rewrite_links(&mut buf, false, "t.test", "/", &root);
        assert_eq!(buf.as_slice(), first.as_slice());
    }

    #[test]
    fn test_rewrite_handles_many_links() {
        let root = PathBuf::from("/tmp/mirror");
        let mut body = String::from("<body>");
        for i in 0..50 {
            body.push_str(&format!(r#"<a href="/page/{i}">p{i}</a>"#));
        }
        body.push_str("</body>");
        let mut buf = body_buf(&body);

        rewrite_links(&mut buf, false, "t.test", "/", &root);

        let out = String::from_utf8_lossy(buf.as_slice()).into_owned();
        for i in 0..50 {
            assert!(out.contains(&format!("file:///tmp/mirror/t.test/page/{i}.html")));
        }
    }
}
