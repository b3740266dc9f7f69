// Copyright (c) The gtest-runner Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Expect-style matching over the output of a test process.

use crate::errors::ExpectError;
use bytes::{Buf, BytesMut};
use regex::bytes::Regex;
use std::{future::Future, io, time::Duration};
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::debug;

/// A live stream of console output from a test process.
///
/// Implementations buffer output and let the caller wait for the next occurrence of one of several
/// patterns. Text consumed up to a match is available as the match's "before" text. If the stream
/// ends or times out, the unmatched buffered text is available through [`Self::before`].
pub trait ProcessStream {
    /// Waits until one of `patterns` matches the buffered output, or fails after `timeout`.
    ///
    /// If several patterns match, the match that starts earliest in the buffer wins, with ties
    /// going to the pattern listed first. Output up to the end of the match is consumed.
    ///
    /// [`ExpectMatch::index`] must be an index into `patterns`. A timeout too large to represent
    /// as a deadline means waiting indefinitely.
    fn expect_next(
        &mut self,
        patterns: &[Regex],
        timeout: Duration,
    ) -> impl Future<Output = Result<ExpectMatch, ExpectError>>;

    /// Text preceding the most recent match, or the unmatched text after an end-of-stream or
    /// timeout.
    fn before(&self) -> &str;

    /// Text of the most recent match. Empty after an end-of-stream or timeout.
    fn after(&self) -> &str;

    /// Closes the stream, releasing the underlying process handle. Closing an already-closed
    /// stream does nothing.
    fn close(&mut self);
}

/// A successful match returned by [`ProcessStream::expect_next`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ExpectMatch {
    index: usize,
    groups: Vec<Option<String>>,
    before: String,
}

impl ExpectMatch {
    /// Creates a new match.
    ///
    /// `groups` holds capture groups starting from group 1.
    pub fn new(index: usize, groups: Vec<Option<String>>, before: impl Into<String>) -> Self {
        Self {
            index,
            groups,
            before: before.into(),
        }
    }

    /// The index of the pattern that matched.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Returns capture group `n`, where group 1 is the first explicit group.
    pub fn group(&self, n: usize) -> Option<&str> {
        let index = n.checked_sub(1)?;
        self.groups.get(index)?.as_deref()
    }

    /// Text consumed between the previous match and this one.
    pub fn before(&self) -> &str {
        &self.before
    }
}

/// The size of each read from the underlying reader, and the size at which the buffer grows.
///
/// This size is not totally arbitrary, but rather the (normal) page size on most linux, windows,
/// and macos systems.
const CHUNK_SIZE: usize = 4 * 1024;

/// A [`ProcessStream`] over any tokio reader: typically the output of a process forwarded from a
/// device.
///
/// Matches are searched for line by line: a pattern match must not span a newline, except for a
/// newline that ends the match. After each read, only the last partial line and the new output are
/// searched again.
#[derive(Debug)]
pub struct ExpectStream<R> {
    // None once closed.
    reader: Option<R>,
    buf: BytesMut,
    before: String,
    after: String,
    eof: bool,
}

impl<R: AsyncRead + Unpin> ExpectStream<R> {
    /// Creates a new stream reading from `reader`.
    pub fn new(reader: R) -> Self {
        Self {
            reader: Some(reader),
            buf: BytesMut::with_capacity(CHUNK_SIZE),
            before: String::new(),
            after: String::new(),
            eof: false,
        }
    }

    /// Returns true if [`ProcessStream::close`] has been called.
    pub fn is_closed(&self) -> bool {
        self.reader.is_none()
    }

    async fn expect_impl(
        &mut self,
        patterns: &[Regex],
        timeout: Duration,
    ) -> Result<ExpectMatch, ExpectError> {
        // None if the timeout is too far in the future to represent.
        let deadline = tokio::time::Instant::now().checked_add(timeout);
        // Matches can't start before this offset: everything before it was already searched.
        let mut scan_from = 0;

        loop {
            if let Some(found) = self.try_match(patterns, scan_from) {
                return Ok(found);
            }
            scan_from = self.last_line_start(scan_from);

            if self.eof {
                self.take_unmatched();
                return Err(ExpectError::Eof);
            }

            let Some(reader) = self.reader.as_mut() else {
                return Err(ExpectError::Closed);
            };

            if self.buf.capacity() - self.buf.len() < CHUNK_SIZE {
                self.buf.reserve(CHUNK_SIZE);
            }

            let read = match deadline {
                Some(deadline) => {
                    tokio::time::timeout_at(deadline, reader.read_buf(&mut self.buf)).await
                }
                None => Ok(reader.read_buf(&mut self.buf).await),
            };
            match read {
                Ok(Ok(0)) => {
                    debug!("test process output reached end of stream");
                    self.eof = true;
                }
                Ok(Ok(_)) => {}
                Ok(Err(error)) if error.kind() == io::ErrorKind::Interrupted => {}
                Ok(Err(error)) => {
                    self.take_unmatched();
                    return Err(ExpectError::Read(error));
                }
                Err(_elapsed) => {
                    // Unlike end-of-stream, a timeout leaves the buffer in place.
                    self.before = String::from_utf8_lossy(&self.buf).into_owned();
                    self.after.clear();
                    return Err(ExpectError::Timeout { timeout });
                }
            }
        }
    }

    fn try_match(&mut self, patterns: &[Regex], scan_from: usize) -> Option<ExpectMatch> {
        let (index, groups, before, after, end) = {
            let (_, index, captures) = patterns
                .iter()
                .enumerate()
                .filter_map(|(index, regex)| {
                    // captures_at keeps the preceding bytes as context for `^` and `\b`.
                    let captures = regex.captures_at(&self.buf, scan_from)?;
                    let start = captures.get(0)?.start();
                    Some((start, index, captures))
                })
                .min_by_key(|(start, index, _)| (*start, *index))?;

            let whole = captures.get(0)?;
            let groups = captures
                .iter()
                .skip(1)
                .map(|group| group.map(|m| String::from_utf8_lossy(m.as_bytes()).into_owned()))
                .collect();
            (
                index,
                groups,
                String::from_utf8_lossy(&self.buf[..whole.start()]).into_owned(),
                String::from_utf8_lossy(whole.as_bytes()).into_owned(),
                whole.end(),
            )
        };

        self.buf.advance(end);
        self.before.clone_from(&before);
        self.after = after;

        Some(ExpectMatch::new(index, groups, before))
    }

    // Returns the start of the last line in the buffer, looking no earlier than `scan_from`.
    fn last_line_start(&self, scan_from: usize) -> usize {
        self.buf[scan_from..]
            .iter()
            .rposition(|&b| b == b'\n')
            .map_or(scan_from, |pos| scan_from + pos + 1)
    }

    // Moves everything that's buffered into `before`.
    fn take_unmatched(&mut self) {
        self.before = String::from_utf8_lossy(&self.buf).into_owned();
        self.after.clear();
        self.buf.clear();
    }
}

impl<R: AsyncRead + Unpin> ProcessStream for ExpectStream<R> {
    async fn expect_next(
        &mut self,
        patterns: &[Regex],
        timeout: Duration,
    ) -> Result<ExpectMatch, ExpectError> {
        self.expect_impl(patterns, timeout).await
    }

    fn before(&self) -> &str {
        &self.before
    }

    fn after(&self) -> &str {
        &self.after
    }

    fn close(&mut self) {
        if self.reader.take().is_some() {
            debug!("closed test process stream");
        }
    }
}
