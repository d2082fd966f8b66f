//! Replayable reader over a forward-only source.

use std::fmt;
use std::io::{self, Cursor, Read, Seek, SeekFrom};
use std::mem;

use log::{debug, trace};

use super::multi::ForwardMultiReader;
use super::seek;
use super::tee::TeeReader;
use crate::common::TeaseError;
use crate::config::{defaults, TeaseConfig};

/// What a committed reader is stitched together from.
enum Segment<R> {
    Captured(Cursor<Vec<u8>>),
    Live(R),
}

impl<R: Read> Read for Segment<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Segment::Captured(captured) => captured.read(buf),
            Segment::Live(source) => source.read(buf),
        }
    }
}

enum State<R> {
    /// Everything read so far is kept; any offset can be revisited.
    Buffering(TeeReader<R, Vec<u8>>),
    /// Forward-only view over `[unread capture, source]`.
    Committed(ForwardMultiReader<Segment<R>>),
    Closed,
}

/// A reader that can rewind a forward-only source while a decision is pending.
///
/// While buffering, every byte pulled from the source is captured, so `seek`
/// may move anywhere within what has been read and `read_at` may ask for any
/// offset; reaching past the capture pulls more bytes from the source first.
///
/// [`commit`](Self::commit) ends the buffering. From then on the reader is a
/// forward-only stream of the not yet consumed capture followed by the live
/// source, and nothing new is captured.
///
/// ```
/// use std::io::{Read, Seek, SeekFrom};
/// use conn_tease::io::ReplayReader;
///
/// let mut reader = ReplayReader::new(&b"GET / HTTP/1.1\r\n"[..]);
/// let mut magic = [0u8; 3];
/// reader.read_exact(&mut magic).unwrap();
/// assert_eq!(&magic, b"GET");
///
/// // Not what we were after; look again from the start.
/// reader.seek(SeekFrom::Start(0)).unwrap();
/// reader.commit();
///
/// let mut all = String::new();
/// reader.read_to_string(&mut all).unwrap();
/// assert_eq!(all, "GET / HTTP/1.1\r\n");
/// ```
pub struct ReplayReader<R> {
    state: State<R>,
    pos: u64,
    seek_chunk: usize,
}

impl<R: Read> ReplayReader<R> {
    /// Wrap `source` with the default seek chunk.
    pub fn new(source: R) -> Self {
        Self::with_seek_chunk(source, defaults::SEEK_CHUNK)
    }

    /// Wrap `source` using the seek chunk from `config`.
    pub fn with_config(source: R, config: &TeaseConfig) -> Self {
        Self::with_seek_chunk(source, config.seek_chunk)
    }

    /// Wrap `source`, discarding at most `chunk` bytes per read while seeking.
    pub fn with_seek_chunk(source: R, chunk: usize) -> Self {
        Self {
            state: State::Buffering(TeeReader::with_seek_chunk(source, Vec::new(), chunk)),
            pos: 0,
            seek_chunk: chunk,
        }
    }

    /// Read into `buf` starting at `offset`, without moving the cursor.
    ///
    /// While buffering this fills the capture up to `offset + buf.len()` if
    /// needed. After commit, `offset` must not lie behind the cursor, and the
    /// cursor moves to the end of the bytes returned.
    pub fn read_at(&mut self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        match &mut self.state {
            State::Buffering(tee) => fill_and_copy(tee, buf, offset),
            State::Committed(live) => {
                if offset < self.pos {
                    return Err(TeaseError::BackwardSeek {
                        position: self.pos,
                        target: offset,
                    }
                    .into());
                }
                let reached = live.seek(SeekFrom::Start(offset))?;
                self.pos = reached;
                if reached != offset {
                    return Ok(0);
                }
                let n = live.read(buf)?;
                self.pos = live.position();
                Ok(n)
            }
            State::Closed => Err(TeaseError::ReaderClosed.into()),
        }
    }

    /// Switch to forward-only mode. Calling it again does nothing.
    pub fn commit(&mut self) {
        let tee = match mem::replace(&mut self.state, State::Closed) {
            State::Buffering(tee) => tee,
            other => {
                self.state = other;
                return;
            }
        };

        let (source, mut captured) = tee.into_parts();
        let consumed = (self.pos as usize).min(captured.len());
        captured.drain(..consumed);
        debug!(
            "replay reader committed at {} with {} captured bytes pending",
            self.pos,
            captured.len()
        );

        let live = ForwardMultiReader::with_seek_chunk(
            [Segment::Captured(Cursor::new(captured)), Segment::Live(source)],
            self.seek_chunk,
        )
        .starting_at(self.pos);
        self.state = State::Committed(live);
    }
}

impl<R> ReplayReader<R> {
    /// Current read position.
    pub fn position(&self) -> u64 {
        self.pos
    }

    /// Whether [`commit`](ReplayReader::commit) has been called.
    pub fn is_committed(&self) -> bool {
        matches!(self.state, State::Committed(_))
    }

    /// Everything captured so far, while still buffering.
    pub fn captured(&self) -> Option<&[u8]> {
        match &self.state {
            State::Buffering(tee) => Some(tee.sink().as_slice()),
            _ => None,
        }
    }

    /// Drop the capture and the source. Later reads fail.
    pub fn close(&mut self) {
        self.state = State::Closed;
        self.pos = 0;
    }
}

/// Serve `buf` from the capture at `offset`, pulling from the source first if
/// the capture is too short.
fn fill_and_copy<R: Read>(
    tee: &mut TeeReader<R, Vec<u8>>,
    buf: &mut [u8],
    offset: u64,
) -> io::Result<usize> {
    let end = offset.saturating_add(buf.len() as u64);
    let fill = if end > tee.position() {
        tee.seek(SeekFrom::Start(end)).map(|_| ())
    } else {
        Ok(())
    };

    let captured = tee.sink().as_slice();
    if offset >= captured.len() as u64 {
        return fill.map(|_| 0);
    }
    if let Err(e) = &fill {
        // Still hand out what we have; the error resurfaces on the next fill.
        trace!("replay reader fill failed after partial capture: {}", e);
    }

    let start = offset as usize;
    let n = buf.len().min(captured.len() - start);
    buf[..n].copy_from_slice(&captured[start..start + n]);
    Ok(n)
}

impl<R: Read> Read for ReplayReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match &mut self.state {
            State::Buffering(tee) => {
                let n = fill_and_copy(tee, buf, self.pos)?;
                self.pos += n as u64;
                Ok(n)
            }
            State::Committed(live) => {
                let n = live.read(buf)?;
                self.pos = live.position();
                Ok(n)
            }
            State::Closed => Err(TeaseError::ReaderClosed.into()),
        }
    }
}

impl<R: Read> Seek for ReplayReader<R> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        match &mut self.state {
            State::Buffering(tee) => {
                let target = seek::absolute(pos, self.pos)?;
                self.pos = if target > tee.position() {
                    tee.seek(SeekFrom::Start(target))?
                } else {
                    target
                };
                Ok(self.pos)
            }
            State::Committed(live) => {
                self.pos = live.seek(pos)?;
                Ok(self.pos)
            }
            State::Closed => Err(TeaseError::ReaderClosed.into()),
        }
    }

    fn stream_position(&mut self) -> io::Result<u64> {
        Ok(self.pos)
    }
}

impl<R> fmt::Debug for ReplayReader<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (state, captured) = match &self.state {
            State::Buffering(tee) => ("buffering", tee.sink().len()),
            State::Committed(_) => ("committed", 0),
            State::Closed => ("closed", 0),
        };
        f.debug_struct("ReplayReader")
            .field("state", &state)
            .field("pos", &self.pos)
            .field("captured", &captured)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Hands out at most `chunk` bytes per read and counts the reads.
    struct Trickle {
        data: Cursor<Vec<u8>>,
        chunk: usize,
        reads: usize,
    }

    impl Trickle {
        fn new(data: &[u8], chunk: usize) -> Self {
            Self {
                data: Cursor::new(data.to_vec()),
                chunk,
                reads: 0,
            }
        }
    }

    impl Read for Trickle {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.reads += 1;
            let len = buf.len().min(self.chunk);
            self.data.read(&mut buf[..len])
        }
    }

    #[test]
    fn test_reread_after_seeking_back() {
        let mut reader = ReplayReader::new(Cursor::new(b"abcdef".to_vec()));
        let mut first = [0u8; 3];
        let mut second = [0u8; 3];

        reader.read_exact(&mut first).unwrap();
        assert_eq!(reader.seek(SeekFrom::Start(0)).unwrap(), 0);
        reader.read_exact(&mut second).unwrap();

        assert_eq!(&first, b"abc");
        assert_eq!(first, second);
        assert_eq!(reader.captured(), Some(&b"abc"[..]));
    }

    #[test]
    fn test_seek_forward_past_capture_pulls_source() {
        let mut reader = ReplayReader::new(Cursor::new(b"0123456789".to_vec()));
        assert_eq!(reader.seek(SeekFrom::Start(6)).unwrap(), 6);
        assert_eq!(reader.captured().unwrap().len(), 6);

        let mut buf = [0u8; 2];
        reader.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"67");

        // Back inside the capture.
        reader.seek(SeekFrom::Current(-5)).unwrap();
        reader.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"34");
    }

    #[test]
    fn test_read_at_does_not_move_cursor() {
        let mut reader = ReplayReader::new(Cursor::new(b"hello world".to_vec()));
        let mut buf = [0u8; 5];

        assert_eq!(reader.read_at(&mut buf, 6).unwrap(), 5);
        assert_eq!(&buf, b"world");
        assert_eq!(reader.position(), 0);

        reader.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"hello");
    }

    #[test]
    fn test_read_at_past_end_returns_zero() {
        let mut reader = ReplayReader::new(Cursor::new(b"abc".to_vec()));
        let mut buf = [0u8; 4];
        assert_eq!(reader.read_at(&mut buf, 10).unwrap(), 0);
        assert_eq!(reader.read_at(&mut buf, 1).unwrap(), 2);
        assert_eq!(&buf[..2], b"bc");
    }

    #[test]
    fn test_read_at_near_u64_max_returns_zero() {
        let mut reader = ReplayReader::new(Cursor::new(b"abc".to_vec()));
        let mut buf = [0u8; 4];
        assert_eq!(reader.read_at(&mut buf, u64::MAX - 1).unwrap(), 0);

        // The whole source was captured on the way; earlier offsets still work.
        assert_eq!(reader.read_at(&mut buf, 0).unwrap(), 3);
        assert_eq!(&buf[..3], b"abc");
    }

    #[test]
    fn test_seek_rejects_end_and_negative() {
        let mut reader = ReplayReader::new(Cursor::new(b"abc".to_vec()));
        assert_eq!(
            reader.seek(SeekFrom::End(0)).unwrap_err().kind(),
            io::ErrorKind::Unsupported
        );
        assert!(reader.seek(SeekFrom::Current(-1)).is_err());
        assert_eq!(reader.position(), 0);
    }

    #[test]
    fn test_commit_keeps_unread_capture() {
        let mut reader = ReplayReader::new(Trickle::new(b"abcdefgh", 3));
        let mut buf = [0u8; 3];
        reader.read_exact(&mut buf).unwrap();
        reader.seek(SeekFrom::Start(1)).unwrap();
        reader.commit();
        assert!(reader.is_committed());
        assert_eq!(reader.captured(), None);

        let mut rest = String::new();
        reader.read_to_string(&mut rest).unwrap();
        assert_eq!(rest, "bcdefgh");
        assert_eq!(reader.position(), 8);
    }

    #[test]
    fn test_commit_is_idempotent() {
        let mut reader = ReplayReader::new(Cursor::new(b"abcdef".to_vec()));
        let mut buf = [0u8; 2];
        reader.read_exact(&mut buf).unwrap();
        reader.commit();
        reader.read_exact(&mut buf).unwrap();
        reader.commit();

        reader.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"ef");
    }

    #[test]
    fn test_no_backward_motion_after_commit() {
        let mut reader = ReplayReader::new(Cursor::new(b"abcdef".to_vec()));
        let mut buf = [0u8; 3];
        reader.read_exact(&mut buf).unwrap();
        reader.commit();

        let err = reader.seek(SeekFrom::Start(2)).unwrap_err();
        assert!(matches!(
            TeaseError::from_io(&err),
            Some(TeaseError::BackwardSeek { position: 3, target: 2 })
        ));
        let err = reader.read_at(&mut buf, 0).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);

        // Forward still works.
        assert_eq!(reader.seek(SeekFrom::Start(4)).unwrap(), 4);
        assert_eq!(reader.read_at(&mut buf[..1], 5).unwrap(), 1);
        assert_eq!(buf[0], b'f');
    }

    #[test]
    fn test_commit_stops_capturing() {
        let mut reader = ReplayReader::new(Trickle::new(&[7u8; 64], 64));
        reader.commit();

        let mut sink = Vec::new();
        reader.read_to_end(&mut sink).unwrap();
        assert_eq!(sink.len(), 64);
        assert!(reader.seek(SeekFrom::Start(0)).is_err());
    }

    #[test]
    fn test_close_releases_everything() {
        let mut reader = ReplayReader::new(Cursor::new(b"abc".to_vec()));
        let mut buf = [0u8; 2];
        reader.read_exact(&mut buf).unwrap();
        reader.close();

        assert_eq!(reader.position(), 0);
        let err = reader.read(&mut buf).unwrap_err();
        assert!(matches!(TeaseError::from_io(&err), Some(TeaseError::ReaderClosed)));
    }

    #[test]
    fn test_chunked_reads_see_same_prefix() {
        let data = b"the quick brown fox";
        let mut reader = ReplayReader::new(Trickle::new(data, 4));

        let mut whole = vec![0u8; data.len()];
        reader.read_exact(&mut whole).unwrap();

        for chunk in [1usize, 2, 5, 7] {
            reader.seek(SeekFrom::Start(0)).unwrap();
            let mut again = Vec::new();
            let mut buf = vec![0u8; chunk];
            while again.len() < data.len() {
                let n = reader.read(&mut buf).unwrap();
                assert!(n > 0);
                again.extend_from_slice(&buf[..n]);
            }
            assert_eq!(again, whole);
        }
    }
}
