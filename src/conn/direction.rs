//! Direction policies for [`Tease`](super::Tease).

/// Which side of a wrapped connection is held back during detection.
///
/// Only the two policies in this module exist; the trait is the seam that
/// lets one state machine serve both ends of a connection.
pub trait Direction: Send + Sync + 'static {
    /// Short name used in logs and `Display` output.
    const LABEL: &'static str;

    /// Reads are served from a retained input buffer that `replay` rewinds.
    const RETAINS_INPUT: bool;

    /// Writes are forwarded to the stream immediately (and kept for resending)
    /// instead of being held until `pipe`.
    const FORWARDS_OUTPUT: bool;
}

/// Accepting side: sniff what the peer sends, say nothing until piped.
#[derive(Debug)]
pub enum ServerSide {}

/// Dialing side: send a probe, read the answer, resend the probe elsewhere if needed.
#[derive(Debug)]
pub enum ClientSide {}

impl Direction for ServerSide {
    const LABEL: &'static str = "server";
    const RETAINS_INPUT: bool = true;
    const FORWARDS_OUTPUT: bool = false;
}

impl Direction for ClientSide {
    const LABEL: &'static str = "client";
    const RETAINS_INPUT: bool = false;
    const FORWARDS_OUTPUT: bool = true;
}
