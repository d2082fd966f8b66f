//! Forward seek helpers shared by the readers.

use std::io::{self, Read, SeekFrom};

use crate::common::TeaseError;

/// When a discarding seek gives up before reaching its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Discard {
    /// Stop at the first read that returns fewer bytes than asked for.
    UntilShortRead,
    /// Keep reading until the target is reached or the source is exhausted.
    UntilEof,
}

/// Resolve `pos` against `current`.
///
/// Streams here never know their length, so `SeekFrom::End` is rejected.
pub(crate) fn absolute(pos: SeekFrom, current: u64) -> Result<u64, TeaseError> {
    match pos {
        SeekFrom::Start(offset) => Ok(offset),
        SeekFrom::Current(delta) => current
            .checked_add_signed(delta)
            .ok_or(TeaseError::UnsupportedSeek("position before start of stream")),
        SeekFrom::End(_) => Err(TeaseError::UnsupportedSeek(
            "seek from end of a stream of unknown length",
        )),
    }
}

/// Resolve `pos` for a reader that can only move forward.
pub(crate) fn forward_target(pos: SeekFrom, current: u64) -> Result<u64, TeaseError> {
    let target = absolute(pos, current)?;
    if target < current {
        return Err(TeaseError::BackwardSeek {
            position: current,
            target,
        });
    }
    Ok(target)
}

/// Read and drop up to `gap` bytes from `reader` through `scratch`.
///
/// Returns how many bytes were dropped. Position bookkeeping is left to the
/// reader's own `read`.
pub(crate) fn discard<R: Read + ?Sized>(
    reader: &mut R,
    scratch: &mut [u8],
    mut gap: u64,
    policy: Discard,
) -> io::Result<u64> {
    let mut dropped = 0u64;
    while gap > 0 && !scratch.is_empty() {
        let want = gap.min(scratch.len() as u64) as usize;
        let n = match reader.read(&mut scratch[..want]) {
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        dropped += n as u64;
        gap -= n as u64;
        if n == 0 || (policy == Discard::UntilShortRead && n < want) {
            break;
        }
    }
    Ok(dropped)
}
