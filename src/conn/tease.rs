//! The generic connection wrapper.

use std::fmt;
use std::io::{self, Read, Write};
use std::marker::PhantomData;
use std::mem;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError, TryLockError};
use std::time::Duration;

use bytes::{Buf, BytesMut};
use log::{debug, trace, warn};

use super::direction::{ClientSide, Direction, ServerSide};
use super::state::{Fault, Mode};
use super::Conn;
use crate::common::{Result, TeaseError};
use crate::config::{defaults, TeaseConfig};

/// Wrapper for an accepted connection: input is retained for replay and
/// output is held back until [`Tease::pipe`].
pub type Server<S> = Tease<S, ServerSide>;

/// Wrapper for a dialed connection: output is sent at once and retained so
/// it can be sent again over a replacement connection.
pub type Client<S> = Tease<S, ClientSide>;

/// Detection-phase bookkeeping, guarded by the wrapper's lock.
#[derive(Debug)]
struct Buffers {
    mode: Mode,
    /// Bytes read from the stream and kept for replay.
    input: BytesMut,
    /// How much of `input` the caller has already been given.
    input_pos: usize,
    /// Bytes written by the caller while detecting.
    output: BytesMut,
    /// How much of `output` reached the stream.
    output_sent: usize,
}

impl Buffers {
    fn new() -> Self {
        Self {
            mode: Mode::Detecting,
            input: BytesMut::new(),
            input_pos: 0,
            output: BytesMut::new(),
            output_sent: 0,
        }
    }

    /// Send `output[output_sent..]`, advancing `output_sent` as bytes go out.
    fn flush_unsent<C: Conn + ?Sized>(&mut self, conn: &C) -> io::Result<()> {
        while self.output_sent < self.output.len() {
            match conn.write(&self.output[self.output_sent..]) {
                Ok(0) => return Err(io::Error::from(io::ErrorKind::WriteZero)),
                Ok(n) => self.output_sent += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}

/// A connection that can be sniffed, rewound and finally handed over.
///
/// While detecting, reads and writes go through a pair of bounded buffers
/// whose behaviour depends on the direction `D`. After [`pipe`](Self::pipe)
/// the wrapper is a passthrough to the stream `S` and costs one atomic load
/// per call.
///
/// All I/O takes `&self`, so a piped wrapper can be shared by a reading and
/// a writing thread. `&Tease` implements [`Read`] and [`Write`].
///
/// Faults other than a detection-phase close are final: the wrapper keeps
/// returning the same error and `ReadAfterWrite` or `BufferExceeded` also
/// close the stream. Errors from the stream itself are passed through and
/// do not fault the wrapper.
///
/// A piped server read that still holds retained bytes returns only those
/// bytes, even if `buf` has room for more. The stream is read directly from
/// the next call on, so a short read never blocks on the transport.
pub struct Tease<S, D> {
    conn: S,
    inner: Mutex<Buffers>,
    /// Mirrors `mode == Piped`.
    piped: AtomicBool,
    /// Piped and no retained input left.
    drained: AtomicBool,
    max_buffer: usize,
    _direction: PhantomData<fn() -> D>,
}

impl<S: Conn, D: Direction> Tease<S, D> {
    /// Wrap `conn` with the default buffer ceiling.
    pub fn new(conn: S) -> Self {
        Self::with_max_buffer(conn, defaults::MAX_BUFFER)
    }

    /// Wrap `conn`, allowing at most `max_buffer` bytes of retained input or output.
    pub fn with_max_buffer(conn: S, max_buffer: usize) -> Self {
        Self {
            conn,
            inner: Mutex::new(Buffers::new()),
            piped: AtomicBool::new(false),
            drained: AtomicBool::new(false),
            max_buffer,
            _direction: PhantomData,
        }
    }

    /// Wrap `conn` using the limits from `config`.
    pub fn with_config(conn: S, config: &TeaseConfig) -> Self {
        Self::with_max_buffer(conn, config.max_buffer)
    }

    /// Commit to the current protocol.
    ///
    /// Drops input the caller has already seen, sends any output the stream
    /// has not received yet and switches to passthrough. Retained input the
    /// caller has not seen is still returned by the next reads. Calling it
    /// again is a no-op.
    ///
    /// The wrapper is piped even when flushing fails; the flush error is
    /// returned.
    pub fn pipe(&self) -> Result<()> {
        let mut state = self.lock();
        match state.mode {
            Mode::Piped => return Ok(()),
            Mode::Faulted(fault) => return Err(fault.to_error(self.max_buffer)),
            Mode::Detecting => {}
        }

        let consumed = state.input_pos;
        state.input.advance(consumed);
        state.input_pos = 0;

        let flushed = state.flush_unsent(&self.conn);
        let sent = state.output_sent;
        state.output.clear();
        state.output_sent = 0;

        state.mode = Mode::Piped;
        self.piped.store(true, Ordering::Release);
        if state.input.is_empty() {
            self.drained.store(true, Ordering::Release);
        }

        debug!(
            "tease_{}: piped, {} bytes retained, {} bytes flushed",
            D::LABEL,
            state.input.len(),
            sent
        );
        flushed.map_err(TeaseError::from)
    }

    /// Rewind so another detector sees the same exchange.
    ///
    /// A server forgets buffered output and serves retained input from the
    /// start again. A client forgets read input and marks all output as
    /// unsent. Clears a detection-phase close.
    pub fn replay(&self) -> Result<()> {
        let mut state = self.lock();
        match state.mode {
            Mode::Piped => return Err(TeaseError::AlreadyPiped),
            Mode::Faulted(Fault::Closed) => state.mode = Mode::Detecting,
            Mode::Faulted(fault) => return Err(fault.to_error(self.max_buffer)),
            Mode::Detecting => {}
        }

        if D::RETAINS_INPUT {
            state.output.clear();
        } else {
            state.input.clear();
            state.output_sent = 0;
        }
        state.input_pos = 0;

        trace!("tease_{}: replay, {} bytes retained", D::LABEL, state.input.len());
        Ok(())
    }

    /// Current mode.
    pub fn mode(&self) -> Mode {
        self.lock().mode
    }

    /// Whether [`pipe`](Self::pipe) has run.
    pub fn is_piped(&self) -> bool {
        self.piped.load(Ordering::Acquire)
    }

    /// Buffer ceiling in bytes.
    pub fn max_buffer(&self) -> usize {
        self.max_buffer
    }

    /// Change the buffer ceiling. Bytes already buffered are kept.
    pub fn set_max_buffer(&mut self, max_buffer: usize) {
        self.max_buffer = max_buffer;
    }

    /// Borrow the wrapped stream.
    pub fn get_ref(&self) -> &S {
        &self.conn
    }

    fn lock(&self) -> MutexGuard<'_, Buffers> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record a fault and build the error for it.
    fn fail(&self, state: &mut Buffers, fault: Fault) -> TeaseError {
        state.mode = Mode::Faulted(fault);
        let err = fault.to_error(self.max_buffer);
        warn!("tease_{}: {}", D::LABEL, err);

        if fault.closes_stream() {
            if let Err(e) = self.conn.close() {
                debug!("tease_{}: closing faulted stream: {}", D::LABEL, e);
            }
        }
        err
    }

    fn read_conn(&self, buf: &mut [u8]) -> io::Result<usize> {
        if self.drained.load(Ordering::Acquire) {
            return self.conn.read(buf);
        }
        if D::RETAINS_INPUT {
            return self.read_retained(buf);
        }

        if let Mode::Faulted(fault) = self.lock().mode {
            return Err(fault.to_error(self.max_buffer).into());
        }
        self.conn.read(buf)
    }

    /// Read path of a wrapper that keeps its input.
    fn read_retained(&self, buf: &mut [u8]) -> io::Result<usize> {
        let mut state = self.lock();
        match state.mode {
            Mode::Faulted(fault) => return Err(fault.to_error(self.max_buffer).into()),
            Mode::Piped => {
                if state.input.is_empty() {
                    self.drained.store(true, Ordering::Release);
                    drop(state);
                    return self.conn.read(buf);
                }
                let n = buf.len().min(state.input.len());
                buf[..n].copy_from_slice(&state.input[..n]);
                state.input.advance(n);
                if state.input.is_empty() {
                    self.drained.store(true, Ordering::Release);
                }
                return Ok(n);
            }
            Mode::Detecting => {}
        }

        if !state.output.is_empty() {
            return Err(self.fail(&mut state, Fault::ReadAfterWrite).into());
        }
        if buf.is_empty() {
            return Ok(0);
        }

        let pos = state.input_pos;
        if pos < state.input.len() {
            let n = buf.len().min(state.input.len() - pos);
            buf[..n].copy_from_slice(&state.input[pos..pos + n]);
            state.input_pos += n;
            return Ok(n);
        }

        if pos + buf.len() > self.max_buffer {
            return Err(self.fail(&mut state, Fault::BufferExceeded).into());
        }

        // The lock is held across the stream read: detection is serialized.
        let n = self.conn.read(buf)?;
        state.input.extend_from_slice(&buf[..n]);
        state.input_pos += n;
        Ok(n)
    }

    fn write_conn(&self, buf: &[u8]) -> io::Result<usize> {
        if self.piped.load(Ordering::Acquire) {
            return self.conn.write(buf);
        }

        let mut state = self.lock();
        match state.mode {
            Mode::Piped => {
                drop(state);
                return self.conn.write(buf);
            }
            Mode::Faulted(fault) => return Err(fault.to_error(self.max_buffer).into()),
            Mode::Detecting => {}
        }

        if state.output.len() + buf.len() > self.max_buffer {
            return Err(self.fail(&mut state, Fault::BufferExceeded).into());
        }

        state.output.extend_from_slice(buf);
        if D::FORWARDS_OUTPUT {
            // Bytes that fail to go out stay queued for `pipe` or a new stream.
            state.flush_unsent(&self.conn)?;
        }
        Ok(buf.len())
    }

    fn close_conn(&self) -> io::Result<()> {
        if self.piped.load(Ordering::Acquire) {
            return self.conn.close();
        }

        let mut state = self.lock();
        match state.mode {
            Mode::Piped => {
                drop(state);
                self.conn.close()
            }
            Mode::Detecting => {
                state.mode = Mode::Faulted(Fault::Closed);
                debug!("tease_{}: closed during detection, stream left open", D::LABEL);
                Ok(())
            }
            Mode::Faulted(_) => Ok(()),
        }
    }
}

impl<S: Conn> Tease<S, ClientSide> {
    /// Swap in a new stream and send it everything written so far.
    ///
    /// The old stream is closed. Fails on a piped wrapper or one with a
    /// final fault.
    pub fn set_new_conn(&mut self, conn: S) -> Result<()> {
        let state = self.inner.get_mut().unwrap_or_else(PoisonError::into_inner);
        match state.mode {
            Mode::Piped => return Err(TeaseError::AlreadyPiped),
            Mode::Faulted(fault) if fault != Fault::Closed => {
                return Err(fault.to_error(self.max_buffer));
            }
            _ => {}
        }

        let old = mem::replace(&mut self.conn, conn);
        if let Err(e) = old.close() {
            debug!("tease_client: closing replaced stream: {}", e);
        }

        state.output_sent = 0;
        state.flush_unsent(&self.conn)?;
        debug!("tease_client: new stream, resent {} bytes", state.output_sent);
        Ok(())
    }
}

impl<S: Conn, D: Direction> Conn for Tease<S, D> {
    fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        self.read_conn(buf)
    }

    fn write(&self, buf: &[u8]) -> io::Result<usize> {
        self.write_conn(buf)
    }

    /// Closes the stream once piped. During detection the stream stays
    /// open and the wrapper refuses I/O until [`Tease::replay`].
    fn close(&self) -> io::Result<()> {
        self.close_conn()
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        self.conn.local_addr()
    }

    fn peer_addr(&self) -> io::Result<SocketAddr> {
        self.conn.peer_addr()
    }

    fn set_read_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
        self.conn.set_read_timeout(timeout)
    }

    fn set_write_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
        self.conn.set_write_timeout(timeout)
    }
}

impl<S: Conn, D: Direction> Read for Tease<S, D> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.read_conn(buf)
    }
}

impl<S: Conn, D: Direction> Read for &Tease<S, D> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.read_conn(buf)
    }
}

impl<S: Conn, D: Direction> Write for Tease<S, D> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.write_conn(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<S: Conn, D: Direction> Write for &Tease<S, D> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.write_conn(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<S, D: Direction> fmt::Display for Tease<S, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let piped = self.piped.load(Ordering::Acquire);
        let state = match self.inner.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
            Err(TryLockError::WouldBlock) => {
                return write!(f, "tease_{}{{piped: {}, busy}}", D::LABEL, piped);
            }
        };

        write!(
            f,
            "tease_{}{{piped: {}, read: {}, buffered_in: {}, ",
            D::LABEL,
            piped,
            state.input_pos,
            state.input.len()
        )?;
        if D::FORWARDS_OUTPUT {
            write!(f, "sent: {}, ", state.output_sent)?;
        }
        write!(f, "buffered_out: {}}}", state.output.len())
    }
}

impl<S, D: Direction> fmt::Debug for Tease<S, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tease")
            .field("direction", &D::LABEL)
            .field("max_buffer", &self.max_buffer)
            .field("state", &self.inner)
            .finish()
    }
}
