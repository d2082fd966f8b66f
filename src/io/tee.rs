//! Tee reader with forward seeking.

use std::io::{self, Read, Seek, SeekFrom, Write};
use std::mem;

use log::trace;

use super::seek::{self, Discard};
use crate::config::defaults;

/// A reader that writes to a sink everything it reads from its source.
///
/// Every read is matched by a write of the same bytes to the sink before the
/// read returns; there is no internal buffering. A failed sink write is
/// reported as a read error even though the bytes already left the source.
///
/// Both halves are taken by value. Pass `&mut` references to keep ownership
/// with the caller.
///
/// Seeking only moves forward: the gap is read through the tee (and so also
/// lands in the sink) and then dropped.
pub struct TeeReader<R, W> {
    source: R,
    sink: W,
    pos: u64,
    scratch: Vec<u8>,
}

impl<R: Read, W: Write> TeeReader<R, W> {
    /// Create a tee with the default seek chunk.
    pub fn new(source: R, sink: W) -> Self {
        Self::with_seek_chunk(source, sink, defaults::SEEK_CHUNK)
    }

    /// Create a tee that discards at most `chunk` bytes per read while seeking.
    pub fn with_seek_chunk(source: R, sink: W, chunk: usize) -> Self {
        Self {
            source,
            sink,
            pos: 0,
            scratch: vec![0; chunk.max(1)],
        }
    }
}

impl<R, W> TeeReader<R, W> {
    /// Number of bytes read from the source so far.
    pub fn position(&self) -> u64 {
        self.pos
    }

    /// Borrow the source.
    pub fn get_ref(&self) -> &R {
        &self.source
    }

    /// Borrow the capture sink.
    pub fn sink(&self) -> &W {
        &self.sink
    }

    /// Mutably borrow the capture sink.
    pub fn sink_mut(&mut self) -> &mut W {
        &mut self.sink
    }

    /// Split the tee back into its source and sink.
    pub fn into_parts(self) -> (R, W) {
        (self.source, self.sink)
    }
}

impl<R: Read, W: Write> Read for TeeReader<R, W> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.source.read(buf)?;
        self.pos += n as u64;
        if n > 0 {
            self.sink.write_all(&buf[..n])?;
        }
        Ok(n)
    }
}

impl<R: Read, W: Write> Seek for TeeReader<R, W> {
    /// Seek forward, stopping early at the first short read.
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = seek::forward_target(pos, self.pos)?;
        let gap = target - self.pos;

        let mut scratch = mem::take(&mut self.scratch);
        let result = seek::discard(self, &mut scratch, gap, Discard::UntilShortRead);
        self.scratch = scratch;

        let dropped = result?;
        trace!("tee seek: skipped {} of {} bytes, now at {}", dropped, gap, self.pos);
        Ok(self.pos)
    }

    fn stream_position(&mut self) -> io::Result<u64> {
        Ok(self.pos)
    }
}
