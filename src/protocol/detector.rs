//! Protocol detector implementation
//!
//! This module defines the detector seam and the TLS detector. A detector
//! reads as few bytes as it needs from the stream it is given; the caller is
//! responsible for making those bytes available again afterwards.

use std::fmt;
use std::io::{self, Read};

use log::{debug, trace};

use crate::common::Result;

/// TLS handshake record type
const TLS_HANDSHAKE: u8 = 0x16;

/// Largest TLS plaintext record (2^14)
const TLS_MAX_RECORD: usize = 16384;

/// Protocol detection result
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DetectionResult {
    /// The stream speaks the detector's protocol
    Matched(ProtocolInfo),
    /// The stream does not speak the detector's protocol
    NotMatched(String),
    /// The stream ended before a decision could be made
    NeedMoreData,
}

/// Protocol information
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtocolInfo {
    /// Protocol name
    pub name: String,
    /// Protocol version (if available)
    pub version: Option<String>,
}

impl ProtocolInfo {
    /// Info with a name and no version
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: None,
        }
    }
}

impl fmt::Display for ProtocolInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.version {
            Some(version) => write!(f, "{} ({})", self.name, version),
            None => write!(f, "{}", self.name),
        }
    }
}

/// Protocol detector trait
///
/// This trait defines the interface for protocol detection.
pub trait ProtocolDetector: Send + Sync {
    /// Name used in logs
    fn name(&self) -> &str;

    /// Detect the protocol from the start of `stream`
    ///
    /// Reads may block; a timeout configured on the underlying connection
    /// surfaces as an I/O error.
    ///
    /// # Parameters
    ///
    /// * `stream` - The connection, positioned at its first byte
    ///
    /// # Returns
    ///
    /// Returns a result containing the detection result
    fn detect(&self, stream: &mut dyn Read) -> Result<DetectionResult>;
}

/// Append bytes from `stream` to `buf` until it holds `len` bytes or the stream ends.
///
/// Never asks for more than is missing, so a detector does not block on
/// bytes the peer has no reason to send yet.
pub fn read_up_to(stream: &mut dyn Read, buf: &mut Vec<u8>, len: usize) -> io::Result<()> {
    let mut chunk = [0u8; 64];
    while buf.len() < len {
        let want = (len - buf.len()).min(chunk.len());
        match stream.read(&mut chunk[..want]) {
            Ok(0) => break,
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

/// TLS protocol detector
///
/// This detector reads the five byte record header of a connection and
/// checks it looks like the start of a TLS handshake: record type 0x16, a
/// known protocol version and a plausible record length.
#[derive(Debug, Clone)]
pub struct TlsDetector {
    /// Bytes read before deciding
    header_len: usize,
}

impl Default for TlsDetector {
    fn default() -> Self {
        Self { header_len: 5 }
    }
}

impl TlsDetector {
    /// Create a TLS detector
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if data appears to be a TLS record header
    ///
    /// # Parameters
    ///
    /// * `data` - Data to examine
    ///
    /// # Returns
    ///
    /// Returns the detection result
    pub fn check_protocol(&self, data: &[u8]) -> DetectionResult {
        let Some(&first) = data.first() else {
            return DetectionResult::NeedMoreData;
        };
        if first != TLS_HANDSHAKE {
            let reason = format!("first byte is {:#04x}, expected 0x16", first);
            trace!("Not TLS: {}", reason);
            return DetectionResult::NotMatched(reason);
        }

        // Not enough data to determine protocol
        if data.len() < self.header_len {
            trace!("Not enough data to determine protocol: got {} bytes, need {}", data.len(), self.header_len);
            return DetectionResult::NeedMoreData;
        }

        // Check TLS version (major.minor); 3.0 is SSLv3
        let major = data[1];
        let minor = data[2];
        if major != 0x03 || minor > 0x04 {
            trace!("Invalid TLS version: {}.{}", major, minor);
            return DetectionResult::NotMatched(format!("invalid TLS version: {}.{}", major, minor));
        }

        let record_length = ((data[3] as usize) << 8) | (data[4] as usize);
        if !(4..=TLS_MAX_RECORD).contains(&record_length) {
            trace!("Invalid TLS record length: {}", record_length);
            return DetectionResult::NotMatched(format!("invalid TLS record length: {}", record_length));
        }

        let info = ProtocolInfo {
            name: "TLS".to_string(),
            version: Self::extract_tls_version(data),
        };
        debug!("TLS protocol detected: {}", info);
        DetectionResult::Matched(info)
    }

    /// Record-layer version of a TLS header
    fn extract_tls_version(data: &[u8]) -> Option<String> {
        if data.len() < 3 {
            return None;
        }

        let version = match (data[1], data[2]) {
            (0x03, 0x00) => "SSLv3".to_string(),
            (0x03, 0x01) => "TLSv1.0".to_string(),
            (0x03, 0x02) => "TLSv1.1".to_string(),
            (0x03, 0x03) => "TLSv1.2".to_string(),
            (0x03, 0x04) => "TLSv1.3".to_string(),
            (major, minor) => format!("Unknown ({}.{})", major, minor),
        };
        Some(version)
    }
}

impl ProtocolDetector for TlsDetector {
    fn name(&self) -> &str {
        "tls"
    }

    fn detect(&self, stream: &mut dyn Read) -> Result<DetectionResult> {
        let mut header = Vec::with_capacity(self.header_len);

        // The first byte alone rules most protocols out.
        read_up_to(stream, &mut header, 1)?;
        if let result @ DetectionResult::NotMatched(_) = self.check_protocol(&header) {
            return Ok(result);
        }

        read_up_to(stream, &mut header, self.header_len)?;
        trace!("Read {} header bytes: {:02X?}", header.len(), header);
        Ok(self.check_protocol(&header))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const CLIENT_HELLO: [u8; 17] = [
        0x16, 0x03, 0x01, 0x00, 0x31, // TLS record header (type, version, length)
        0x01, 0x00, 0x00, 0x2d, 0x03, 0x03, // Handshake header
        0x00, 0x00, 0x00, 0x00, 0x00, 0x00, // Random (truncated)
    ];

    #[test]
    fn test_tls_detection() {
        let detector = TlsDetector::default();
        let mut stream = Cursor::new(CLIENT_HELLO.to_vec());

        let result = detector.detect(&mut stream).unwrap();
        assert_eq!(
            result,
            DetectionResult::Matched(ProtocolInfo {
                name: "TLS".to_string(),
                version: Some("TLSv1.0".to_string()),
            })
        );
        // Only the header was consumed.
        assert_eq!(stream.position(), 5);
    }

    #[test]
    fn test_non_tls_detection_reads_one_byte() {
        let detector = TlsDetector::default();
        let mut stream = Cursor::new(b"GET / HTTP/1.1\r\nHost: example.com\r\n\r\n".to_vec());

        match detector.detect(&mut stream).unwrap() {
            DetectionResult::NotMatched(reason) => assert!(reason.contains("0x47")),
            other => panic!("Expected NotMatched, got {:?}", other),
        }
        assert_eq!(stream.position(), 1);
    }

    #[test]
    fn test_need_more_data() {
        let detector = TlsDetector::default();
        let mut stream = Cursor::new(vec![0x16, 0x03]);
        assert_eq!(detector.detect(&mut stream).unwrap(), DetectionResult::NeedMoreData);

        let mut empty = Cursor::new(Vec::new());
        assert_eq!(detector.detect(&mut empty).unwrap(), DetectionResult::NeedMoreData);
    }

    #[test]
    fn test_invalid_version_and_length() {
        let detector = TlsDetector::default();
        assert!(matches!(
            detector.check_protocol(&[0x16, 0x02, 0x00, 0x00, 0x10]),
            DetectionResult::NotMatched(_)
        ));
        assert!(matches!(
            detector.check_protocol(&[0x16, 0x03, 0x03, 0xff, 0xff]),
            DetectionResult::NotMatched(_)
        ));
    }

    #[test]
    fn test_read_up_to_handles_trickle() {
        struct OneByte<'a>(&'a [u8]);

        impl Read for OneByte<'_> {
            fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
                let data = self.0;
                match data.split_first() {
                    Some((&b, rest)) if !buf.is_empty() => {
                        buf[0] = b;
                        self.0 = rest;
                        Ok(1)
                    }
                    _ => Ok(0),
                }
            }
        }

        let mut buf = Vec::new();
        read_up_to(&mut OneByte(b"abcdef"), &mut buf, 4).unwrap();
        assert_eq!(buf, b"abcd");
    }

    #[test]
    fn test_protocol_info_display() {
        assert_eq!(ProtocolInfo::named("HTTP").to_string(), "HTTP");
        let tls = ProtocolInfo {
            name: "TLS".to_string(),
            version: Some("TLSv1.2".to_string()),
        };
        assert_eq!(tls.to_string(), "TLS (TLSv1.2)");
    }
}
