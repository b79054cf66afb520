//! Growable byte buffer
//!
//! `Buf` backs both sides of an HTTP exchange: requests are assembled into
//! one, responses are received into another, and the link rewriter splices
//! local paths into a response body in place. Reads append at the tail and
//! may reallocate, so any position held across a read or a splice must be
//! kept as an offset, never as a borrow.

use std::io::{Read, Write};

/// A growable, contiguous byte buffer with in-place editing operations.
#[derive(Debug, Default)]
pub struct Buf {
    data: Vec<u8>,
}

impl Buf {
    /// Creates an empty buffer.
    pub fn new() -> Self {
        Self { data: Vec::new() }
    }

    /// Creates an empty buffer with at least `cap` bytes reserved.
    pub fn with_capacity(cap: usize) -> Self {
        Self {
            data: Vec::with_capacity(cap),
        }
    }

    /// Number of bytes currently held.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns true when the buffer holds no bytes.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// The buffer contents as a byte slice.
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    /// Appends a string to the tail.
    pub fn append(&mut self, s: &str) {
        self.data.extend_from_slice(s.as_bytes());
    }

    /// Appends raw bytes to the tail.
    pub fn append_slice(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
    }

    /// Discards all contents.
    pub fn clear(&mut self) {
        self.data.clear();
    }

    /// Removes `n` bytes from the tail.
    pub fn snip(&mut self, n: usize) {
        let keep = self.data.len().saturating_sub(n);
        self.data.truncate(keep);
    }

    /// Removes `n` bytes starting at `offset`, closing the gap.
    pub fn collapse(&mut self, offset: usize, n: usize) {
        let end = (offset + n).min(self.data.len());
        self.data.drain(offset..end);
    }

    /// Opens an `n`-byte zeroed gap at `offset`, pushing the tail out.
    pub fn shift(&mut self, offset: usize, n: usize) {
        self.data
            .splice(offset..offset, std::iter::repeat(0u8).take(n));
    }

    /// Overwrites bytes starting at `offset`. The destination range must
    /// already exist (open it with [`shift`](Self::shift) first).
    pub fn write_at(&mut self, offset: usize, bytes: &[u8]) {
        self.data[offset..offset + bytes.len()].copy_from_slice(bytes);
    }

    /// Finds the first occurrence of `needle`, returning its offset.
    pub fn find(&self, needle: &[u8]) -> Option<usize> {
        find_sub(&self.data, needle)
    }

    /// Finds the first occurrence of `needle` at or after `from`.
    pub fn find_from(&self, from: usize, needle: &[u8]) -> Option<usize> {
        if from > self.data.len() {
            return None;
        }
        find_sub(&self.data[from..], needle).map(|i| from + i)
    }

    /// Reads up to `max` bytes from `reader`, appending at the tail.
    ///
    /// Returns the number of bytes read; zero means the peer closed the
    /// stream. The backing storage may reallocate, so offsets survive this
    /// call but borrows do not.
    pub fn read_from<R: Read>(&mut self, reader: &mut R, max: usize) -> std::io::Result<usize> {
        let start = self.data.len();
        self.data.resize(start + max, 0);
        let n = match reader.read(&mut self.data[start..]) {
            Ok(n) => n,
            Err(e) => {
                self.data.truncate(start);
                return Err(e);
            }
        };
        self.data.truncate(start + n);
        Ok(n)
    }

    /// Writes the entire contents to `writer`.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
        writer.write_all(&self.data)
    }
}

/// Naive substring search over byte slices.
fn find_sub(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || needle.len() > haystack.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_and_len() {
        let mut buf = Buf::new();
        buf.append("hello");
        buf.append_slice(b" world");
        assert_eq!(buf.len(), 11);
        assert_eq!(buf.as_slice(), b"hello world");
    }

    #[test]
    fn test_snip() {
        let mut buf = Buf::new();
        buf.append("hello/");
        buf.snip(1);
        assert_eq!(buf.as_slice(), b"hello");
    }

    #[test]
    fn test_collapse_middle() {
        let mut buf = Buf::new();
        buf.append("abcXYZdef");
        buf.collapse(3, 3);
        assert_eq!(buf.as_slice(), b"abcdef");
    }

    #[test]
    fn test_collapse_to_end() {
        let mut buf = Buf::new();
        buf.append("abcdef");
        buf.collapse(3, 100);
        assert_eq!(buf.as_slice(), b"abc");
    }

    #[test]
    fn test_shift_opens_gap() {
        let mut buf = Buf::new();
        buf.append("abdef");
        buf.shift(2, 1);
        buf.write_at(2, b"c");
        assert_eq!(buf.as_slice(), b"abcdef");
    }

    #[test]
    fn test_collapse_then_shift_replaces_span() {
        let mut buf = Buf::new();
        buf.append("a long-token b");
        buf.collapse(2, 10);
        buf.shift(2, 5);
        buf.write_at(2, b"short");
        assert_eq!(buf.as_slice(), b"a short b");
    }

    #[test]
    fn test_find() {
        let mut buf = Buf::new();
        buf.append("HTTP/1.1 200 OK\r\n\r\nbody");
        assert_eq!(buf.find(b"\r\n\r\n"), Some(15));
        assert_eq!(buf.find(b"missing"), None);
    }

    #[test]
    fn test_find_from() {
        let mut buf = Buf::new();
        buf.append("aXbXc");
        assert_eq!(buf.find_from(0, b"X"), Some(1));
        assert_eq!(buf.find_from(2, b"X"), Some(3));
        assert_eq!(buf.find_from(4, b"X"), None);
    }

    #[test]
    fn test_read_from_appends() {
        let mut buf = Buf::new();
        buf.append("head");
        let mut src: &[u8] = b"tail";
        let n = buf.read_from(&mut src, 16).unwrap();
        assert_eq!(n, 4);
        assert_eq!(buf.as_slice(), b"headtail");
    }

    #[test]
    fn test_read_from_eof() {
        let mut buf = Buf::new();
        let mut src: &[u8] = b"";
        let n = buf.read_from(&mut src, 16).unwrap();
        assert_eq!(n, 0);
        assert!(buf.is_empty());
    }
}
