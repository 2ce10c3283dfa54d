// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use crate::{Result, TryVec};
use std::io::Read;

const CHUNK: usize = 4096;

/// Wraps a reader to allow looking ahead without consuming.
///
/// Peeked bytes are kept and handed out again by `read` before
/// anything more is pulled from the inner reader.
pub struct PeekReader<R> {
    inner: R,
    buf: TryVec<u8>,
    pos: usize,
    eof: bool,
}

impl<R: Read> PeekReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            buf: TryVec::new(),
            pos: 0,
            eof: false,
        }
    }

    /// Return up to `n` upcoming bytes without consuming them.
    ///
    /// The slice is shorter than `n` only when the stream ends first.
    pub fn peek(&mut self, n: usize) -> Result<&[u8]> {
        let mut chunk = [0u8; CHUNK];
        while self.buf.len() - self.pos < n && !self.eof {
            let want = (n - (self.buf.len() - self.pos)).min(CHUNK);
            match self.inner.read(&mut chunk[..want]) {
                Ok(0) => self.eof = true,
                Ok(len) => self.buf.extend_from_slice(&chunk[..len])?,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {},
                Err(e) => return Err(e.into()),
            }
        }
        let end = self.buf.len().min(self.pos + n);
        Ok(&self.buf[self.pos..end])
    }
}

impl<R: Read> Read for PeekReader<R> {
    fn read(&mut self, out: &mut [u8]) -> std::io::Result<usize> {
        let buffered = &self.buf[self.pos..];
        if buffered.is_empty() {
            return self.inner.read(out);
        }
        let n = buffered.len().min(out.len());
        out[..n].copy_from_slice(&buffered[..n]);
        self.pos += n;
        Ok(n)
    }
}

#[test]
fn peek_does_not_consume() {
    let mut r = PeekReader::new(&b"GIF89a\x01\x00"[..]);
    assert_eq!(r.peek(3).unwrap(), b"GIF");
    assert_eq!(r.peek(6).unwrap(), b"GIF89a");
    assert_eq!(r.peek(100).unwrap().len(), 8);

    let mut all = std::vec::Vec::new();
    r.read_to_end(&mut all).unwrap();
    assert_eq!(all, b"GIF89a\x01\x00");
}

#[test]
fn read_mixes_buffer_and_inner() {
    let mut r = PeekReader::new(&b"abcdef"[..]);
    assert_eq!(r.peek(2).unwrap(), b"ab");
    let mut out = [0u8; 4];
    r.read_exact(&mut out).unwrap();
    assert_eq!(&out, b"abcd");
    assert_eq!(r.peek(8).unwrap(), b"ef");
}
