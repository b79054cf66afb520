//! Request construction, response reception and the HEAD-then-GET cycle.

use super::{
    HeaderEntry, Outcome, Verb, EOH_SENTINEL, HTTP_ACCEPT, HTTP_HNAME_MAX, HTTP_HVALUE_MAX,
    HTTP_USER_AGENT, MAX_CHUNK_STR, SMALL_READ_BLOCK,
};
use crate::buf::Buf;
use crate::cache::SlotCache;
use crate::net::Connection;
use crate::url::{local_archive_exists, parse_host, parse_page};
use crate::{ReaperError, Result, UrlError};
use std::path::Path;

/// HTTP client state for one crawled origin.
///
/// `host` may drift across redirects; `primary_host` stays pinned to the
/// seed origin so a failed redirect can be backed out of.
pub struct Client {
    pub host: String,
    pub page: String,
    pub full_url: String,
    pub primary_host: String,
    pub conn: Connection,
    pub rbuf: Buf,
    pub wbuf: Buf,
    hcache: SlotCache<HeaderEntry>,
    /// Verb of the request most recently sent; a HEAD response carries no
    /// body regardless of its framing headers.
    last_verb: Verb,
}

impl Client {
    /// Connects to the host named by `seed_url`.
    pub fn new(seed_url: &str, secure: bool) -> Result<Self> {
        let host = parse_host(seed_url).to_string();
        if host.is_empty() {
            return Err(UrlError::MissingHost(seed_url.to_string()).into());
        }
        let page = parse_page(seed_url);
        let conn = Connection::open(&host, secure)?;

        Ok(Self {
            primary_host: host.clone(),
            host,
            page,
            full_url: seed_url.to_string(),
            conn,
            rbuf: Buf::with_capacity(SMALL_READ_BLOCK * 16),
            wbuf: Buf::with_capacity(SMALL_READ_BLOCK),
            hcache: SlotCache::new(8, HeaderEntry::vacant),
            last_verb: Verb::Get,
        })
    }

    pub fn is_secure(&self) -> bool {
        self.conn.is_secure()
    }

    /// Re-derives the host from `full_url` and reconnects when it changed.
    pub fn check_host(&mut self) -> Result<()> {
        let host = parse_host(&self.full_url).to_string();
        if host.is_empty() {
            return Err(UrlError::MissingHost(self.full_url.clone()).into());
        }
        if host != self.host {
            self.host = host;
            let target = self.host.clone();
            self.conn.reconnect(&target)?;
        }
        Ok(())
    }

    /// Reconnects to the current host.
    pub fn reconnect(&mut self) -> Result<()> {
        let target = self.host.clone();
        self.conn.reconnect(&target)
    }

    /// Points `host` back at the seed origin.
    pub fn restore_primary_host(&mut self) {
        self.host = self.primary_host.clone();
    }

    /// Tears the plain session down and reopens the current host over TLS.
    pub fn upgrade_to_tls(&mut self) -> Result<()> {
        self.conn.close();
        self.conn = Connection::open(&self.host, true)?;
        Ok(())
    }

    /// Assembles the request into the write buffer and sends it.
    ///
    /// Fixed shape: request line, `User-Agent`, `Accept`, `Host` (trailing
    /// slash stripped), `Connection: keep-alive`, blank line.
    pub fn send_request(&mut self, verb: Verb) -> Result<()> {
        self.last_verb = verb;
        let host = self.host.strip_suffix('/').unwrap_or(&self.host);

        self.wbuf.clear();
        self.wbuf.append(&format!(
            "{verb} {target} HTTP/1.1\r\n\
             User-Agent: {HTTP_USER_AGENT}\r\n\
             Accept: {HTTP_ACCEPT}\r\n\
             Host: {host}\r\n\
             Connection: keep-alive\r\n\r\n",
            target = self.page,
        ));

        self.conn.send(&self.wbuf)
    }

    /// Receives one response into the read buffer.
    ///
    /// Framing selection: a `Transfer-Encoding: chunked` header enters the
    /// chunked reader; otherwise `Content-Length` drives a counted read;
    /// otherwise the reader keeps going until `</body` appears. On success
    /// the buffer holds the header and the decoded body with all chunk
    /// metadata removed.
    pub fn recv_response(&mut self) -> Result<()> {
        self.rbuf.clear();

        let eoh = self.read_until_eoh()?;
        let body_start = eoh + EOH_SENTINEL.len();

        // A HEAD response ends at the header whatever framing it advertises.
        if self.last_verb == Verb::Head {
            return Ok(());
        }

        if let Some(te) = self.fetch_header("Transfer-Encoding", 0) {
            if te.value.starts_with("chunked") {
                return self.recv_chunked(body_start);
            }
        }

        if let Some(cl) = self.fetch_header("Content-Length", 0) {
            let clen: usize = cl
                .value
                .trim()
                .parse()
                .map_err(|_| ReaperError::Protocol(format!("bad Content-Length: {}", cl.value)))?;

            let overread = self.rbuf.len() - body_start;
            if overread < clen {
                let mut remaining = clen - overread;
                while remaining > 0 {
                    let n = self.conn.recv_into(&mut self.rbuf, remaining)?;
                    if n == 0 {
                        return Err(ReaperError::Protocol(
                            "peer closed mid-body".to_string(),
                        ));
                    }
                    remaining -= n;
                }
            }
            return Ok(());
        }

        // Neither framing header: read until the body close tag shows up.
        loop {
            if self.rbuf.find_from(eoh, b"</body").is_some() {
                return Ok(());
            }
            let n = self.conn.recv_into(&mut self.rbuf, SMALL_READ_BLOCK)?;
            if n == 0 {
                return Err(ReaperError::Protocol(
                    "connection closed before </body".to_string(),
                ));
            }
        }
    }

    /// Reads in small blocks until the header terminator is buffered.
    fn read_until_eoh(&mut self) -> Result<usize> {
        loop {
            if let Some(p) = self.rbuf.find(EOH_SENTINEL) {
                return Ok(p);
            }
            let n = self.conn.recv_into(&mut self.rbuf, SMALL_READ_BLOCK)?;
            if n == 0 {
                return Err(ReaperError::Protocol(
                    "end-of-header sentinel not found".to_string(),
                ));
            }
        }
    }

    /// Decodes a chunked body in place.
    ///
    /// Walks the buffer from the end of the header: parses each hex size
    /// line, collapses the line and its CRLF so the chunk data becomes
    /// contiguous with the body so far, reads any deficit, and skips the
    /// chunk's trailing CRLF. The cursor is an offset throughout; the
    /// buffer is free to reallocate under it during reads.
    fn recv_chunked(&mut self, body_start: usize) -> Result<()> {
        let mut p = body_start;
        self.collapse_crlf_at(p);

        loop {
            let e = loop {
                self.collapse_crlf_at(p);
                let window_end = (p + MAX_CHUNK_STR).min(self.rbuf.len());
                match self.rbuf.find_from(p, b"\r") {
                    Some(e) if e < window_end => break e,
                    _ => {
                        if self.rbuf.len() >= p + MAX_CHUNK_STR {
                            return Err(ReaperError::Protocol(
                                "no CR terminating chunk size".to_string(),
                            ));
                        }
                        let n = self.conn.recv_into(&mut self.rbuf, MAX_CHUNK_STR)?;
                        if n == 0 {
                            return Err(ReaperError::Protocol(
                                "connection closed inside chunk framing".to_string(),
                            ));
                        }
                    }
                }
            };

            let size_str = String::from_utf8_lossy(&self.rbuf.as_slice()[p..e]).into_owned();
            let chunk_size = usize::from_str_radix(size_str.trim(), 16)
                .map_err(|_| ReaperError::Protocol(format!("bad chunk size: {size_str:?}")))?;

            if chunk_size == 0 {
                // Zero chunk: everything from here on is framing and trailers.
                let tail = self.rbuf.len() - p;
                self.rbuf.collapse(p, tail);
                return Ok(());
            }

            // Strip the size line and its CRLF; chunk data now starts at p.
            let mut q = e;
            let bytes = self.rbuf.as_slice();
            while q < bytes.len() && (bytes[q] == b'\r' || bytes[q] == b'\n') {
                q += 1;
            }
            self.rbuf.collapse(p, q - p);

            let chunk_start = p;
            let overread = self.rbuf.len() - chunk_start;
            if overread < chunk_size {
                let mut remaining = chunk_size - overread;
                while remaining > 0 {
                    let n = self.conn.recv_into(&mut self.rbuf, remaining)?;
                    if n == 0 {
                        return Err(ReaperError::Protocol(
                            "connection closed mid-chunk".to_string(),
                        ));
                    }
                    remaining -= n;
                }
                // Pull in some of the next size line; the final CRLFs may
                // already be buffered, so EOF here is not an error yet.
                let _ = self.conn.recv_into(&mut self.rbuf, MAX_CHUNK_STR)?;
            }

            p = chunk_start + chunk_size;
            self.collapse_crlf_at(p);
        }
    }

    /// Collapses any run of CR/LF bytes starting at `p`.
    fn collapse_crlf_at(&mut self, p: usize) {
        let bytes = self.rbuf.as_slice();
        let mut q = p;
        while q < bytes.len() && (bytes[q] == b'\r' || bytes[q] == b'\n') {
            q += 1;
        }
        if q > p {
            self.rbuf.collapse(p, q - p);
        }
    }

    /// Numeric status code of the buffered response.
    pub fn status_code(&self) -> Result<u16> {
        status_code(&self.rbuf)
    }

    /// Finds a header at or after `from`, copying it out through the header
    /// arena. `Set-Cookie` is normalised to `Cookie` on return.
    pub fn fetch_header(&mut self, name: &str, from: usize) -> Option<HeaderEntry> {
        let hend = self.rbuf.find(EOH_SENTINEL)?;
        let hay = &self.rbuf.as_slice()[..hend];
        let (name_range, value_range) = scan_header(hay, name, from)?;

        let id = self.hcache.alloc();
        {
            let raw_name = &hay[name_range];
            let raw_value = &hay[value_range];
            let entry = self.hcache.get_mut(id);
            if raw_name == b"Set-Cookie" {
                entry.name.push_str("Cookie");
            } else {
                let take = raw_name.len().min(HTTP_HNAME_MAX);
                entry
                    .name
                    .push_str(&String::from_utf8_lossy(&raw_name[..take]));
            }
            let take = raw_value.len().min(HTTP_HVALUE_MAX);
            entry
                .value
                .push_str(&String::from_utf8_lossy(&raw_value[..take]));
        }

        let copy = self.hcache.get(id).clone();
        self.hcache.dealloc(id);
        Some(copy)
    }

    /// True when the buffered response announced `Connection: close`.
    pub fn connection_closed(&mut self) -> bool {
        self.fetch_header("Connection", 0)
            .map(|h| h.value.eq_ignore_ascii_case("close"))
            .unwrap_or(false)
    }

    /// One full request cycle for `full_url`.
    ///
    /// Sends HEAD first to save bandwidth; a non-200 HEAD status is final.
    /// An already archived page short-circuits before the GET. A peer that
    /// closed after the HEAD is reconnected, then the GET status is
    /// returned.
    pub fn do_request(&mut self, archive_root: &Path) -> Result<Outcome> {
        self.send_request(Verb::Head)?;
        if let Some(outcome) = Self::timeout_outcome(self.recv_response())? {
            return Ok(outcome);
        }

        let status = self.status_code()?;
        if status != 200 {
            return Ok(Outcome::Status(status));
        }

        if local_archive_exists(archive_root, &self.full_url) {
            return Ok(Outcome::AlreadyExists);
        }

        if self.connection_closed() {
            tracing::debug!(host = %self.host, "peer closed after HEAD, reconnecting");
            self.reconnect()?;
        }

        self.send_request(Verb::Get)?;
        if let Some(outcome) = Self::timeout_outcome(self.recv_response())? {
            return Ok(outcome);
        }

        Ok(Outcome::Status(self.status_code()?))
    }

    /// Maps a stalled-socket receive error to [`Outcome::Timeout`]; every
    /// other error propagates.
    fn timeout_outcome(result: Result<()>) -> Result<Option<Outcome>> {
        match result {
            Ok(()) => Ok(None),
            Err(ReaperError::Io(e))
                if matches!(
                    e.kind(),
                    std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock
                ) =>
            {
                Ok(Some(Outcome::Timeout))
            }
            Err(e) => Err(e),
        }
    }
}

/// Extracts the numeric code from the status line: the token between the
/// first two spaces.
pub fn status_code(buf: &Buf) -> Result<u16> {
    let bytes = buf.as_slice();
    let first = bytes
        .iter()
        .position(|&b| b == b' ')
        .ok_or_else(|| ReaperError::Protocol("malformed status line".to_string()))?;
    let rest = &bytes[first + 1..];
    let second = rest
        .iter()
        .position(|&b| b == b' ')
        .ok_or_else(|| ReaperError::Protocol("malformed status line".to_string()))?;

    std::str::from_utf8(&rest[..second])
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| ReaperError::Protocol("non-numeric status code".to_string()))
}

/// Locates `name` in the header bytes at or after `from`, returning the
/// byte ranges of the header name and its value.
fn scan_header(hay: &[u8], name: &str, from: usize) -> Option<(std::ops::Range<usize>, std::ops::Range<usize>)> {
    if from >= hay.len() {
        return None;
    }
    let pos = hay[from..]
        .windows(name.len())
        .position(|w| w == name.as_bytes())?
        + from;

    let colon = hay[pos..].iter().position(|&b| b == b':')? + pos;

    let mut v = colon + 1;
    while v < hay.len() && (hay[v] == b' ' || hay[v] == b'\t') {
        v += 1;
    }
    let vend = hay[v..]
        .iter()
        .position(|&b| b == b'\r')
        .map(|i| v + i)
        .unwrap_or(hay.len());

    Some((pos..colon, v..vend))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::TcpListener;

    #[test]
    fn test_status_code_extraction() {
        let mut buf = Buf::new();
        buf.append("HTTP/1.1 200 OK\r\nHost: x\r\n\r\n");
        assert_eq!(status_code(&buf).unwrap(), 200);

        let mut buf = Buf::new();
        buf.append("HTTP/1.1 404 Not Found\r\n\r\n");
        assert_eq!(status_code(&buf).unwrap(), 404);
    }

    #[test]
    fn test_status_code_malformed() {
        let mut buf = Buf::new();
        buf.append("garbage");
        assert!(status_code(&buf).is_err());
    }

    #[test]
    fn test_scan_header() {
        let hay = b"HTTP/1.1 200 OK\r\nContent-Length: 42\r\nServer: x\r";
        let (name, value) = scan_header(hay, "Content-Length", 0).unwrap();
        assert_eq!(&hay[name], b"Content-Length");
        assert_eq!(&hay[value], b"42");
    }

    #[test]
    fn test_scan_header_from_offset() {
        let hay = b"X: 1\r\nX: 2\r";
        let (_, first) = scan_header(hay, "X", 0).unwrap();
        assert_eq!(&hay[first], b"1");
        let (_, second) = scan_header(hay, "X", 2).unwrap();
        assert_eq!(&hay[second], b"2");
    }

    #[test]
    fn test_scan_header_missing() {
        assert!(scan_header(b"HTTP/1.1 200 OK\r\n", "Cookie", 0).is_none());
    }

    /// Serves one canned response per accepted connection.
    fn one_shot_server(response: &'static [u8]) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        std::thread::spawn(move || {
            if let Ok((mut sock, _)) = listener.accept() {
                let mut req = [0u8; 1024];
                let _ = sock.read(&mut req);
                let _ = sock.write_all(response);
            }
        });
        format!("127.0.0.1:{port}")
    }

    #[test]
    fn test_recv_content_length() {
        let host = one_shot_server(
            b"HTTP/1.1 200 OK\r\nContent-Length: 11\r\n\r\nhello world",
        );
        let mut client = Client::new(&format!("http://{host}/"), false).unwrap();
        client.send_request(Verb::Get).unwrap();
        client.recv_response().unwrap();

        assert_eq!(client.status_code().unwrap(), 200);
        let body_start = client.rbuf.find(EOH_SENTINEL).unwrap() + 4;
        assert_eq!(&client.rbuf.as_slice()[body_start..], b"hello world");
    }

    #[test]
    fn test_recv_chunked_strips_framing() {
        let host = one_shot_server(
            b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n\
              5\r\nhello\r\na\r\n 0123456_\n\r\n0\r\n\r\n",
        );
        let mut client = Client::new(&format!("http://{host}/"), false).unwrap();
        client.send_request(Verb::Get).unwrap();
        client.recv_response().unwrap();

        let body_start = client.rbuf.find(EOH_SENTINEL).unwrap() + 4;
        let body = &client.rbuf.as_slice()[body_start..];
        assert_eq!(body.len(), 15);
        assert_eq!(body, b"hello 0123456_\n");
    }

    #[test]
    fn test_recv_sentinel_mode() {
        let host = one_shot_server(
            b"HTTP/1.1 200 OK\r\nServer: ancient\r\n\r\n<html><body>x</body></html>",
        );
        let mut client = Client::new(&format!("http://{host}/"), false).unwrap();
        client.send_request(Verb::Get).unwrap();
        client.recv_response().unwrap();
        assert!(client.rbuf.find(b"</body").is_some());
    }

    #[test]
    fn test_fetch_header_normalises_set_cookie() {
        let host = one_shot_server(
            b"HTTP/1.1 200 OK\r\nSet-Cookie: id=1\r\nContent-Length: 0\r\n\r\n",
        );
        let mut client = Client::new(&format!("http://{host}/"), false).unwrap();
        client.send_request(Verb::Get).unwrap();
        client.recv_response().unwrap();

        let cookie = client.fetch_header("Set-Cookie", 0).unwrap();
        assert_eq!(cookie.name, "Cookie");
        assert_eq!(cookie.value, "id=1");
    }

    #[test]
    fn test_connection_closed_detection() {
        let host = one_shot_server(
            b"HTTP/1.1 200 OK\r\nConnection: close\r\nContent-Length: 0\r\n\r\n",
        );
        let mut client = Client::new(&format!("http://{host}/"), false).unwrap();
        client.send_request(Verb::Head).unwrap();
        client.recv_response().unwrap();
        assert!(client.connection_closed());
    }
}
