//! Ordered detection over a server wrapper

use log::{debug, trace};

use super::detector::{DetectionResult, ProtocolDetector, ProtocolInfo, TlsDetector};
use super::prefix::PrefixDetector;
use crate::common::{Result, TeaseError};
use crate::conn::{Conn, Server};

/// Runs detectors against a [`Server`] until one matches.
///
/// Each detector starts from the first byte of the connection. On a match
/// the wrapper is rewound and piped, so whoever reads it next sees the
/// connection from the start, and the remaining detectors are skipped. When no
/// detector matches the wrapper is left replayed and still detecting, so the
/// caller can pipe it to a fallback.
///
/// A read timeout on the connection counts as "not this protocol".
#[derive(Default)]
pub struct Sniffer {
    detectors: Vec<Box<dyn ProtocolDetector>>,
}

impl Sniffer {
    /// A sniffer with no detectors.
    pub fn new() -> Self {
        Self::default()
    }

    /// TLS first, then HTTP.
    pub fn standard() -> Self {
        Self::new()
            .with_detector(TlsDetector::new())
            .with_detector(PrefixDetector::http())
    }

    /// Append a detector.
    pub fn with_detector<T: ProtocolDetector + 'static>(mut self, detector: T) -> Self {
        self.add(Box::new(detector));
        self
    }

    /// Append a boxed detector.
    pub fn add(&mut self, detector: Box<dyn ProtocolDetector>) {
        self.detectors.push(detector);
    }

    /// Number of detectors.
    pub fn len(&self) -> usize {
        self.detectors.len()
    }

    /// Whether no detector is registered.
    pub fn is_empty(&self) -> bool {
        self.detectors.is_empty()
    }

    /// Identify the protocol spoken on `server`.
    ///
    /// Returns the matching protocol with the wrapper piped, or `None` with
    /// the wrapper rewound. Wrapper faults and transport errors other than
    /// timeouts are returned as errors.
    pub fn sniff<S: Conn>(&self, server: &Server<S>) -> Result<Option<ProtocolInfo>> {
        for detector in &self.detectors {
            let mut stream = server;
            match detector.detect(&mut stream) {
                Ok(DetectionResult::Matched(info)) => {
                    // Hand over everything, including the bytes the detector read.
                    server.replay()?;
                    server.pipe()?;
                    debug!("{} matched {}", detector.name(), info);
                    return Ok(Some(info));
                }
                Ok(DetectionResult::NotMatched(reason)) => {
                    trace!("{} did not match: {}", detector.name(), reason);
                }
                Ok(DetectionResult::NeedMoreData) => {
                    trace!("{} ran out of data", detector.name());
                }
                Err(TeaseError::Io(e)) if is_timeout(&e) => {
                    debug!("{} timed out: {}", detector.name(), e);
                }
                Err(e) => return Err(e),
            }
            server.replay()?;
        }

        debug!("No detector matched ({} tried)", self.detectors.len());
        Ok(None)
    }
}

fn is_timeout(err: &std::io::Error) -> bool {
    matches!(
        err.kind(),
        std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conn::Mode;
    use std::io::{self, Cursor, Read};
    use std::net::SocketAddr;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Replays a script of reads; `None` entries time out.
    struct Script {
        steps: Mutex<Vec<Option<Vec<u8>>>>,
    }

    impl Script {
        fn new(steps: Vec<Option<&[u8]>>) -> Self {
            let mut steps: Vec<_> = steps.into_iter().map(|s| s.map(<[u8]>::to_vec)).collect();
            steps.reverse();
            Self {
                steps: Mutex::new(steps),
            }
        }

        fn bytes(data: &[u8]) -> Self {
            Self::new(vec![Some(data)])
        }
    }

    impl Conn for Script {
        fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
            let mut steps = self.steps.lock().unwrap();
            match steps.pop() {
                None => Ok(0),
                Some(None) => Err(io::ErrorKind::WouldBlock.into()),
                Some(Some(chunk)) => {
                    let mut cursor = Cursor::new(chunk);
                    let n = cursor.read(buf)?;
                    let rest = cursor.into_inner().split_off(n);
                    if !rest.is_empty() {
                        steps.push(Some(rest));
                    }
                    Ok(n)
                }
            }
        }

        fn write(&self, buf: &[u8]) -> io::Result<usize> {
            Ok(buf.len())
        }

        fn close(&self) -> io::Result<()> {
            Ok(())
        }

        fn local_addr(&self) -> io::Result<SocketAddr> {
            Ok(SocketAddr::from(([127, 0, 0, 1], 1)))
        }

        fn peer_addr(&self) -> io::Result<SocketAddr> {
            Ok(SocketAddr::from(([127, 0, 0, 1], 2)))
        }

        fn set_read_timeout(&self, _timeout: Option<Duration>) -> io::Result<()> {
            Ok(())
        }

        fn set_write_timeout(&self, _timeout: Option<Duration>) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_http_after_tls_miss() {
        let server = Server::new(Script::bytes(b"GET /health HTTP/1.1\r\n\r\n"));
        let info = Sniffer::standard().sniff(&server).unwrap();

        assert_eq!(info, Some(ProtocolInfo::named("HTTP")));
        assert!(server.is_piped());

        // The request is intact from its first byte.
        let mut request = String::new();
        (&server).read_to_string(&mut request).unwrap();
        assert_eq!(request, "GET /health HTTP/1.1\r\n\r\n");
    }

    #[test]
    fn test_tls_matches_first() {
        let hello = [0x16, 0x03, 0x01, 0x00, 0x31, 0x01, 0x00];
        let server = Server::new(Script::bytes(&hello));
        let info = Sniffer::standard().sniff(&server).unwrap().unwrap();

        assert_eq!(info.name, "TLS");
        let mut forwarded = Vec::new();
        (&server).read_to_end(&mut forwarded).unwrap();
        assert_eq!(forwarded, hello);
    }

    #[test]
    fn test_no_match_leaves_wrapper_rewound() {
        let server = Server::new(Script::bytes(b"SSH-2.0-OpenSSH\r\n"));
        assert_eq!(Sniffer::standard().sniff(&server).unwrap(), None);
        assert_eq!(server.mode(), Mode::Detecting);

        server.pipe().unwrap();
        let mut line = String::new();
        (&server).read_to_string(&mut line).unwrap();
        assert_eq!(line, "SSH-2.0-OpenSSH\r\n");
    }

    #[test]
    fn test_timeout_means_no_match() {
        let server = Server::new(Script::new(vec![Some(&b"GE"[..]), None]));
        let sniffer = Sniffer::new().with_detector(PrefixDetector::http());

        assert_eq!(sniffer.sniff(&server).unwrap(), None);
        assert!(!server.is_piped());
    }

    #[test]
    fn test_wrapper_fault_is_returned() {
        let server = Server::with_max_buffer(Script::bytes(b"OPTIONS * HTTP/1.1\r\n"), 6);
        let err = Sniffer::standard().sniff(&server).unwrap_err();
        assert!(matches!(err, TeaseError::BufferExceeded { limit: 6 }));
    }

    #[test]
    fn test_empty_sniffer() {
        let server = Server::new(Script::bytes(b"x"));
        let sniffer = Sniffer::new();
        assert!(sniffer.is_empty());
        assert_eq!(sniffer.sniff(&server).unwrap(), None);
        assert_eq!(Sniffer::standard().len(), 2);
    }
}
