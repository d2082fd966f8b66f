//! Forward-only concatenation of readers.

use std::collections::VecDeque;
use std::fmt;
use std::io::{self, Read, Seek, SeekFrom};
use std::mem;

use super::seek::{self, Discard};
use crate::config::defaults;

/// One entry of a [`ForwardMultiReader`].
enum Source<R> {
    Leaf(R),
    Nested(ForwardMultiReader<R>),
}

impl<R: Read> Read for Source<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Source::Leaf(reader) => reader.read(buf),
            Source::Nested(multi) => multi.read(buf),
        }
    }
}

/// The logical concatenation of several readers, seekable forward only.
///
/// Sources are read in order and dropped as soon as they report end of data;
/// end of data is only reported once no sources remain. A reader whose only
/// remaining source is another `ForwardMultiReader` adopts that reader's
/// sources directly instead of delegating through it.
///
/// Seeking reads and discards until the target offset (or the end of all
/// sources) is reached. Seeking backward or from the end fails.
///
/// Mix reader types by choosing `R = Box<dyn Read + Send>` (the default).
pub struct ForwardMultiReader<R = Box<dyn Read + Send>> {
    sources: VecDeque<Source<R>>,
    pos: u64,
    scratch: Vec<u8>,
}

impl<R> ForwardMultiReader<R> {
    /// Concatenate `readers` in iteration order.
    pub fn new<I>(readers: I) -> Self
    where
        I: IntoIterator<Item = R>,
    {
        Self::with_seek_chunk(readers, defaults::SEEK_CHUNK)
    }

    /// Concatenate `readers`, discarding at most `chunk` bytes per read while seeking.
    pub fn with_seek_chunk<I>(readers: I, chunk: usize) -> Self
    where
        I: IntoIterator<Item = R>,
    {
        Self {
            sources: readers.into_iter().map(Source::Leaf).collect(),
            pos: 0,
            scratch: vec![0; chunk.max(1)],
        }
    }

    /// Start counting positions at `offset` instead of zero.
    ///
    /// Used when the first source is the tail of a stream that has already
    /// been partly consumed.
    pub fn starting_at(mut self, offset: u64) -> Self {
        self.pos = offset;
        self
    }

    /// Append a reader.
    pub fn push(&mut self, reader: R) {
        self.sources.push_back(Source::Leaf(reader));
    }

    /// Append another multi-reader; its sources are adopted once it is the last one left.
    pub fn push_nested(&mut self, nested: ForwardMultiReader<R>) {
        self.sources.push_back(Source::Nested(nested));
    }

    /// Current logical position.
    pub fn position(&self) -> u64 {
        self.pos
    }

    /// Number of sources not yet exhausted.
    pub fn remaining_sources(&self) -> usize {
        self.sources.len()
    }

    /// Adopt the sources of a lone nested reader.
    fn flatten(&mut self) {
        while self.sources.len() == 1 {
            match self.sources.pop_front() {
                Some(Source::Nested(nested)) => self.sources = nested.sources,
                Some(leaf) => {
                    self.sources.push_front(leaf);
                    break;
                }
                None => break,
            }
        }
    }
}

impl<R: Read> Read for ForwardMultiReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        loop {
            self.flatten();
            let Some(front) = self.sources.front_mut() else {
                return Ok(0);
            };
            let n = front.read(buf)?;
            if n == 0 {
                // Exhausted: release it and move on within the same call.
                self.sources.pop_front();
                continue;
            }
            self.pos += n as u64;
            return Ok(n);
        }
    }
}

impl<R: Read> Seek for ForwardMultiReader<R> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = seek::forward_target(pos, self.pos)?;

        let mut scratch = mem::take(&mut self.scratch);
        let result = seek::discard(self, &mut scratch, target - self.pos, Discard::UntilEof);
        self.scratch = scratch;

        result?;
        Ok(self.pos)
    }

    fn stream_position(&mut self) -> io::Result<u64> {
        Ok(self.pos)
    }
}

impl<R> Default for ForwardMultiReader<R> {
    fn default() -> Self {
        Self::new(std::iter::empty())
    }
}

impl<R> fmt::Debug for ForwardMultiReader<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ForwardMultiReader")
            .field("pos", &self.pos)
            .field("sources", &self.sources.len())
            .finish()
    }
}
